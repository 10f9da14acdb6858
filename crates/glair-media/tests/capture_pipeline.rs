//! End-to-end screenshot capture: image file → frame source → cropped JPEG.

use glair_media::codec::parse_data_url;
use glair_media::image::{self, Rgba, RgbaImage};
use glair_media::{CropTarget, FrameCropper, MediaError, Region, StillFrameSource};

const RED: Rgba<u8> = Rgba([220, 20, 20, 255]);
const GREEN: Rgba<u8> = Rgba([20, 200, 20, 255]);

/// 200×100, left half red, right half green.
fn split_source() -> (tempfile::TempDir, StillFrameSource) {
    let frame = RgbaImage::from_fn(200, 100, |x, _| if x < 100 { RED } else { GREEN });
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("frame.png");
    frame.save(&path).unwrap();
    let source = StillFrameSource::open(&path).unwrap();
    (dir, source)
}

fn decode(data_url: &str) -> image::RgbaImage {
    let (mime, bytes) = parse_data_url(data_url).unwrap();
    assert_eq!(mime, "image/jpeg");
    image::load_from_memory(&bytes).unwrap().to_rgba8()
}

fn is_green(px: &Rgba<u8>) -> bool {
    px[1] > 150 && px[0] < 80
}

fn is_red(px: &Rgba<u8>) -> bool {
    px[0] > 150 && px[1] < 80
}

#[test]
fn region_selects_right_half_of_center_crop() {
    let (_dir, source) = split_source();
    let target = CropTarget::new(100, 100).with_region(Region::new(50.0, 0.0, 50.0, 100.0));

    let shot = FrameCropper::default().capture(&source, target).unwrap();
    assert_eq!((shot.width, shot.height), (50, 100));

    let pixels = decode(&shot.data_url());
    assert_eq!(pixels.dimensions(), (50, 100));
    assert!(is_green(pixels.get_pixel(25, 50)));
}

#[test]
fn mirrored_region_is_reflected_before_cropping() {
    let (_dir, source) = split_source();
    let target = CropTarget::new(100, 100)
        .mirrored(true)
        .with_region(Region::new(50.0, 0.0, 50.0, 100.0));

    let shot = FrameCropper::default().capture(&source, target).unwrap();
    let pixels = decode(&shot.data_url());
    assert!(is_red(pixels.get_pixel(25, 50)));
}

#[test]
fn empty_source_reports_capture_unavailable() {
    let source = StillFrameSource::empty();
    let err = FrameCropper::default()
        .capture(&source, CropTarget::new(480, 480))
        .unwrap_err();
    assert!(matches!(err, MediaError::CaptureUnavailable));
}
