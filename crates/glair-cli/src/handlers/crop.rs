//! `glair crop`: one screenshot from a still image.

use anyhow::Result;
use glair_media::{CropTarget, FrameCropper, LiveSettings, StillFrameSource};

use crate::commands::CropArgs;
use crate::error::CliError;

/// Execute the crop command.
///
/// Prints a `data:image/jpeg;base64,…` URL, or writes the JPEG to
/// `--output` when given.
pub fn execute(settings: &LiveSettings, args: CropArgs) -> Result<()> {
    let source = StillFrameSource::open(&args.image).map_err(CliError::from)?;

    let mut target = CropTarget::new(
        args.width.unwrap_or(settings.screenshot_width),
        args.height.unwrap_or(settings.screenshot_height),
    )
    .mirrored(args.mirror);
    if let Some(region) = args.region {
        target = target.with_region(region);
    }

    let cropper = FrameCropper::new(args.quality.unwrap_or(settings.screenshot_jpeg_quality));
    let shot = cropper.capture(&source, target).map_err(CliError::from)?;
    tracing::debug!(
        width = shot.width,
        height = shot.height,
        bytes = shot.jpeg.len(),
        quality = cropper.quality(),
        "Screenshot captured"
    );

    match args.output {
        Some(path) => {
            std::fs::write(&path, &shot.jpeg).map_err(CliError::from)?;
            println!("✓ Wrote {}x{} JPEG to {}", shot.width, shot.height, path.display());
        }
        None => println!("{}", shot.data_url()),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use glair_media::image::{self, Rgba, RgbaImage};

    fn args(image: std::path::PathBuf, output: std::path::PathBuf) -> CropArgs {
        CropArgs {
            image,
            width: Some(120),
            height: Some(90),
            mirror: true,
            region: None,
            output: Some(output),
            quality: Some(80),
        }
    }

    #[test]
    fn writes_jpeg_of_requested_size() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("frame.png");
        let output = dir.path().join("shot.jpg");
        RgbaImage::from_pixel(320, 180, Rgba([40, 120, 200, 255]))
            .save(&input)
            .unwrap();

        execute(&LiveSettings::default(), args(input, output.clone())).unwrap();

        let decoded = image::open(&output).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (120, 90));
    }

    #[test]
    fn missing_image_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = execute(
            &LiveSettings::default(),
            args(dir.path().join("absent.png"), dir.path().join("out.jpg")),
        )
        .unwrap_err();
        let err = err.downcast_ref::<CliError>();
        assert!(matches!(err, Some(CliError::Io(_))), "got {err:?}");
        assert_eq!(err.map(CliError::exit_code), Some(74));
    }
}
