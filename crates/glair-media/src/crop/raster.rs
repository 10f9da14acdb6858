//! Rasterizes a [`CropPlan`] from a live frame into a JPEG screenshot.

use image::imageops::{self, FilterType};
use image::{DynamicImage, RgbaImage};

use super::{CropPlan, CropSpec, CropTarget};
use crate::codec::{JPEG_MIME, MediaBlob, to_data_url};
use crate::error::MediaError;
use crate::frame::FrameSource;

/// JPEG quality used for screenshots (0-100).
pub const DEFAULT_SCREENSHOT_QUALITY: u8 = 92;

/// A captured still image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Screenshot {
    pub width: u32,
    pub height: u32,
    /// Encoded JPEG bytes.
    pub jpeg: Vec<u8>,
}

impl Screenshot {
    /// `data:image/jpeg;base64,...` URL of the image.
    pub fn data_url(&self) -> String {
        to_data_url(JPEG_MIME, &self.jpeg)
    }

    /// The image as a wire `media` payload.
    pub fn media_blob(&self) -> MediaBlob {
        MediaBlob::jpeg(&self.jpeg)
    }
}

/// Produces framed, optionally mirrored screenshots from a frame source.
///
/// Stateless apart from the JPEG quality; every capture allocates its own
/// raster buffer.
#[derive(Debug, Clone, Copy)]
pub struct FrameCropper {
    quality: u8,
}

impl Default for FrameCropper {
    fn default() -> Self {
        Self::new(DEFAULT_SCREENSHOT_QUALITY)
    }
}

impl FrameCropper {
    #[must_use]
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.clamp(1, 100),
        }
    }

    #[must_use]
    pub const fn quality(&self) -> u8 {
        self.quality
    }

    /// Capture the source's latest frame according to `target`.
    ///
    /// Fails with [`MediaError::CaptureUnavailable`] if the source has not
    /// produced a frame yet, instead of returning a blank image.
    pub fn capture(&self, source: &dyn FrameSource, target: CropTarget) -> Result<Screenshot, MediaError> {
        let frame = source.latest_frame().ok_or(MediaError::CaptureUnavailable)?;
        self.capture_frame(&frame, target)
    }

    /// Capture from an already-grabbed frame.
    pub fn capture_frame(&self, frame: &RgbaImage, target: CropTarget) -> Result<Screenshot, MediaError> {
        let (width, height) = frame.dimensions();
        let plan = CropSpec::new(width, height, target).plan()?;
        let raster = render(frame, &plan);
        let jpeg = encode_jpeg(&raster, self.quality)?;

        tracing::debug!(
            source_width = width,
            source_height = height,
            width = plan.output_width,
            height = plan.output_height,
            mirrored = plan.mirrored,
            bytes = jpeg.len(),
            "Captured screenshot"
        );

        Ok(Screenshot {
            width: plan.output_width,
            height: plan.output_height,
            jpeg,
        })
    }
}

/// Crop, scale and (if mirrored) flip a frame according to `plan`.
pub fn render(frame: &RgbaImage, plan: &CropPlan) -> RgbaImage {
    let (fw, fh) = frame.dimensions();
    let (x, y, w, h) = plan.source.to_pixels(fw, fh);
    let cropped = imageops::crop_imm(frame, x, y, w, h).to_image();

    let scaled = if (w, h) == (plan.output_width, plan.output_height) {
        cropped
    } else {
        imageops::resize(&cropped, plan.output_width, plan.output_height, FilterType::Triangle)
    };

    if plan.mirrored {
        imageops::flip_horizontal(&scaled)
    } else {
        scaled
    }
}

/// Encode an RGBA raster as JPEG (alpha dropped).
pub fn encode_jpeg(raster: &RgbaImage, quality: u8) -> Result<Vec<u8>, MediaError> {
    let rgb = DynamicImage::ImageRgba8(raster.clone()).to_rgb8();
    let mut jpeg = Vec::new();
    let mut encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut jpeg, quality);
    encoder
        .encode_image(&rgb)
        .map_err(|e| MediaError::Encode(format!("JPEG: {e}")))?;
    Ok(jpeg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crop::Region;
    use crate::frame::StillFrameSource;
    use image::Rgba;

    const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);
    const BLUE: Rgba<u8> = Rgba([0, 0, 255, 255]);

    /// Left half red, right half blue.
    fn split_frame(width: u32, height: u32) -> RgbaImage {
        RgbaImage::from_fn(width, height, |x, _| if x < width / 2 { RED } else { BLUE })
    }

    fn plan_for(frame: &RgbaImage, target: CropTarget) -> CropPlan {
        let (w, h) = frame.dimensions();
        CropSpec::new(w, h, target).plan().unwrap()
    }

    #[test]
    fn render_matches_output_size() {
        let frame = split_frame(192, 108);
        let raster = render(&frame, &plan_for(&frame, CropTarget::new(48, 48)));
        assert_eq!(raster.dimensions(), (48, 48));
    }

    #[test]
    fn mirroring_moves_marker_to_other_side() {
        let frame = split_frame(160, 90);
        let plain = render(&frame, &plan_for(&frame, CropTarget::new(64, 64)));
        let mirrored = render(&frame, &plan_for(&frame, CropTarget::new(64, 64).mirrored(true)));

        assert_eq!(*plain.get_pixel(2, 32), RED);
        assert_eq!(*plain.get_pixel(61, 32), BLUE);
        assert_eq!(*mirrored.get_pixel(2, 32), BLUE);
        assert_eq!(*mirrored.get_pixel(61, 32), RED);
    }

    #[test]
    fn mirrored_region_captures_what_was_on_screen() {
        let frame = split_frame(100, 100);
        // Left 40% of the mirrored display shows the sensor's right side.
        let target = CropTarget::new(100, 100)
            .mirrored(true)
            .with_region(Region::new(0.0, 0.0, 40.0, 100.0));
        let raster = render(&frame, &plan_for(&frame, target));
        assert_eq!(raster.dimensions(), (40, 100));
        assert!(raster.pixels().all(|p| *p == BLUE));
    }

    #[test]
    fn capture_without_frame_fails_fast() {
        let source = StillFrameSource::empty();
        let err = FrameCropper::default().capture(&source, CropTarget::new(480, 480));
        assert!(matches!(err, Err(MediaError::CaptureUnavailable)));
    }

    #[test]
    fn capture_encodes_jpeg_data_url() {
        let source = StillFrameSource::new(split_frame(320, 180));
        let shot = FrameCropper::default()
            .capture(&source, CropTarget::new(64, 48))
            .unwrap();
        assert_eq!((shot.width, shot.height), (64, 48));
        assert_eq!(&shot.jpeg[..2], &[0xFF, 0xD8]);
        assert!(shot.data_url().starts_with("data:image/jpeg;base64,/9j/"));

        let decoded = image::load_from_memory(&shot.jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (64, 48));
    }
}
