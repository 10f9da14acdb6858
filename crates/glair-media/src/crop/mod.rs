//! Screenshot geometry: center-crop, mirroring and sub-region insets.
//!
//! A capture request is turned into a [`CropPlan`] before any pixels are
//! touched:
//!
//! ```text
//!   sensor frame ──center-crop──▶ target aspect ──region inset──▶ output
//!   (1920×1080)                   (1080×1080)                     (480×480)
//! ```
//!
//! All rectangles in a plan are in *sensor* coordinates. When the feed is
//! shown mirrored, the region's X offset is reflected so that the region the
//! user framed on screen is the one that gets captured; the rasterizer then
//! flips the result so the image matches the display.

mod raster;

pub use raster::{DEFAULT_SCREENSHOT_QUALITY, FrameCropper, Screenshot};

use serde::{Deserialize, Serialize};

use crate::error::MediaError;

/// A percentage-based sub-region of the center-cropped frame.
///
/// All values are percentages (0–100) of the post-crop frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Region {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    /// Whether the widget draws an overlay around the region. Has no effect
    /// on the captured pixels.
    #[serde(default)]
    pub enable_overlay: bool,
}

impl Region {
    #[must_use]
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
            enable_overlay: false,
        }
    }

    /// Clamp the region so it stays inside the frame.
    ///
    /// Offsets are clamped to 0–100, then each extent is shrunk so that
    /// `x + width <= 100` and `y + height <= 100`.
    #[must_use]
    pub fn clamped(self) -> Self {
        let x = clamp_percent(self.x);
        let y = clamp_percent(self.y);
        Self {
            x,
            y,
            width: clamp_percent(self.width).min(100.0 - x),
            height: clamp_percent(self.height).min(100.0 - y),
            enable_overlay: self.enable_overlay,
        }
    }

    /// The same region as seen on the horizontally flipped image.
    #[must_use]
    pub fn reflected(self) -> Self {
        Self {
            x: 100.0 - self.x - self.width,
            ..self
        }
    }
}

fn clamp_percent(value: f64) -> f64 {
    if value.is_nan() { 0.0 } else { value.clamp(0.0, 100.0) }
}

/// Per-call capture request: what the caller wants out.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CropTarget {
    pub target_width: u32,
    pub target_height: u32,
    /// The feed is presented mirrored; the capture must match the display.
    #[serde(default)]
    pub mirrored: bool,
    #[serde(default)]
    pub region: Option<Region>,
}

impl CropTarget {
    #[must_use]
    pub const fn new(target_width: u32, target_height: u32) -> Self {
        Self {
            target_width,
            target_height,
            mirrored: false,
            region: None,
        }
    }

    #[must_use]
    pub const fn mirrored(mut self, mirrored: bool) -> Self {
        self.mirrored = mirrored;
        self
    }

    #[must_use]
    pub const fn with_region(mut self, region: Region) -> Self {
        self.region = Some(region);
        self
    }
}

/// Complete crop inputs: the source's intrinsic size plus the request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CropSpec {
    pub source_width: u32,
    pub source_height: u32,
    pub target_width: u32,
    pub target_height: u32,
    pub mirrored: bool,
    pub region: Option<Region>,
}

impl CropSpec {
    /// Combine an intrinsic source size with a capture request.
    #[must_use]
    pub const fn new(source_width: u32, source_height: u32, target: CropTarget) -> Self {
        Self {
            source_width,
            source_height,
            target_width: target.target_width,
            target_height: target.target_height,
            mirrored: target.mirrored,
            region: target.region,
        }
    }

    /// Compute the source rectangle and output size for this crop.
    pub fn plan(&self) -> Result<CropPlan, MediaError> {
        if self.target_width == 0 || self.target_height == 0 {
            return Err(MediaError::InvalidTarget {
                width: self.target_width,
                height: self.target_height,
            });
        }
        if self.source_width == 0 || self.source_height == 0 {
            return Err(MediaError::CaptureUnavailable);
        }

        let base = center_crop(
            self.source_width,
            self.source_height,
            self.target_width,
            self.target_height,
        );

        let Some(region) = self.region else {
            return Ok(CropPlan {
                source: base,
                output_width: self.target_width,
                output_height: self.target_height,
                mirrored: self.mirrored,
                region: None,
            });
        };

        let region = region.clamped();
        // The region was framed on the displayed image; find it on the sensor.
        let sensor_region = if self.mirrored {
            region.reflected()
        } else {
            region
        };

        let source = Rect {
            x: base.x + base.width * sensor_region.x / 100.0,
            y: base.y + base.height * sensor_region.y / 100.0,
            width: base.width * sensor_region.width / 100.0,
            height: base.height * sensor_region.height / 100.0,
        };
        let output_width = scale_dimension(self.target_width, region.width);
        let output_height = scale_dimension(self.target_height, region.height);

        Ok(CropPlan {
            source,
            output_width,
            output_height,
            mirrored: self.mirrored,
            region: Some(region),
        })
    }
}

fn scale_dimension(target: u32, percent: f64) -> u32 {
    ((f64::from(target) * percent / 100.0).round() as u32).max(1)
}

/// The largest rectangle of the target aspect ratio centred in the source.
fn center_crop(source_width: u32, source_height: u32, target_width: u32, target_height: u32) -> Rect {
    let (sw, sh) = (f64::from(source_width), f64::from(source_height));
    let (tw, th) = (f64::from(target_width), f64::from(target_height));

    // Compare aspect ratios by cross-multiplying to stay in exact integers.
    if u64::from(source_width) * u64::from(target_height)
        > u64::from(source_height) * u64::from(target_width)
    {
        // Source is wider: trim left and right.
        let width = sh * tw / th;
        Rect {
            x: (sw - width) / 2.0,
            y: 0.0,
            width,
            height: sh,
        }
    } else {
        // Source is taller (or equal): trim top and bottom.
        let height = sw * th / tw;
        Rect {
            x: 0.0,
            y: (sh - height) / 2.0,
            width: sw,
            height,
        }
    }
}

/// An axis-aligned rectangle in source pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    /// Integer pixel bounds `(x, y, width, height)` clamped to the source
    /// and at least one pixel in each dimension.
    #[must_use]
    pub fn to_pixels(&self, source_width: u32, source_height: u32) -> (u32, u32, u32, u32) {
        let x = (self.x.round().max(0.0) as u32).min(source_width.saturating_sub(1));
        let y = (self.y.round().max(0.0) as u32).min(source_height.saturating_sub(1));
        let width = (self.width.round() as u32).clamp(1, source_width - x);
        let height = (self.height.round() as u32).clamp(1, source_height - y);
        (x, y, width, height)
    }
}

/// Result of [`CropSpec::plan`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CropPlan {
    /// Rectangle to read from the sensor frame.
    pub source: Rect,
    /// Output image width in pixels.
    pub output_width: u32,
    /// Output image height in pixels.
    pub output_height: u32,
    /// Flip the output horizontally.
    pub mirrored: bool,
    /// The effective (clamped) region, as framed on the display.
    pub region: Option<Region>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan(sw: u32, sh: u32, target: CropTarget) -> CropPlan {
        CropSpec::new(sw, sh, target).plan().unwrap()
    }

    #[test]
    fn square_target_from_landscape_source() {
        let p = plan(1920, 1080, CropTarget::new(480, 480));
        assert_eq!(
            p.source,
            Rect {
                x: 420.0,
                y: 0.0,
                width: 1080.0,
                height: 1080.0
            }
        );
        assert_eq!((p.output_width, p.output_height), (480, 480));
    }

    #[test]
    fn four_by_three_target_letterboxes_sides_equally() {
        let p = plan(1920, 1080, CropTarget::new(640, 480));
        assert_eq!(p.source.width, 1440.0);
        assert_eq!(p.source.height, 1080.0);
        assert_eq!(p.source.x, 240.0);
        assert_eq!(1920.0 - p.source.x - p.source.width, p.source.x);
    }

    #[test]
    fn portrait_source_crops_top_and_bottom() {
        let p = plan(1080, 1920, CropTarget::new(480, 480));
        assert_eq!(p.source.x, 0.0);
        assert_eq!(p.source.y, 420.0);
        assert_eq!(p.source.width, 1080.0);
        assert_eq!(p.source.height, 1080.0);
    }

    #[test]
    fn output_matches_target_without_region() {
        for (tw, th) in [(480, 480), (640, 480), (1, 1), (1280, 720), (300, 900)] {
            let p = plan(1920, 1080, CropTarget::new(tw, th));
            assert_eq!((p.output_width, p.output_height), (tw, th));
        }
    }

    #[test]
    fn overflowing_region_is_clamped() {
        let region = Region::new(50.0, 0.0, 60.0, 100.0);
        let p = plan(1920, 1080, CropTarget::new(480, 480).with_region(region));
        assert_eq!(p.region, Some(Region::new(50.0, 0.0, 50.0, 100.0)));
        assert_eq!((p.output_width, p.output_height), (240, 480));
        // Right half of the centred 1080×1080 square.
        assert_eq!(p.source.x, 420.0 + 540.0);
        assert_eq!(p.source.width, 540.0);
    }

    #[test]
    fn clamped_region_stays_in_bounds() {
        let r = Region::new(80.0, 95.0, 40.0, 30.0).clamped();
        assert!(r.x + r.width <= 100.0);
        assert!(r.y + r.height <= 100.0);

        let r = Region::new(-10.0, 120.0, 50.0, 50.0).clamped();
        assert_eq!(r.x, 0.0);
        assert_eq!(r.y, 100.0);
        assert_eq!(r.height, 0.0);
    }

    #[test]
    fn mirrored_region_reflects_x_offset() {
        let region = Region::new(0.0, 0.0, 25.0, 100.0);
        let p = plan(
            1920,
            1080,
            CropTarget::new(480, 480).mirrored(true).with_region(region),
        );
        // Left quarter on screen is the right quarter of the sensor square.
        assert_eq!(p.source.x, 420.0 + 810.0);
        assert_eq!(p.source.width, 270.0);
        assert!(p.mirrored);
    }

    #[test]
    fn zero_target_is_rejected() {
        let err = CropSpec::new(1920, 1080, CropTarget::new(0, 480)).plan();
        assert!(matches!(err, Err(MediaError::InvalidTarget { width: 0, height: 480 })));
    }

    #[test]
    fn zero_source_is_capture_unavailable() {
        let err = CropSpec::new(0, 0, CropTarget::new(480, 480)).plan();
        assert!(matches!(err, Err(MediaError::CaptureUnavailable)));
    }

    #[test]
    fn rect_pixels_stay_inside_source() {
        let rect = Rect {
            x: 1919.6,
            y: -2.0,
            width: 10.0,
            height: 2000.0,
        };
        assert_eq!(rect.to_pixels(1920, 1080), (1919, 0, 1, 1080));
    }
}
