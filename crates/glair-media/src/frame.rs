//! Video frame sources.

use std::path::Path;
use std::sync::{Arc, RwLock};

use image::RgbaImage;

use crate::error::MediaError;

/// A readable live video source.
///
/// Frames are returned at the feed's intrinsic resolution, not the size it is
/// displayed at.
pub trait FrameSource: Send + Sync {
    /// The most recent decoded frame, or `None` if the source has not produced
    /// one yet.
    fn latest_frame(&self) -> Option<RgbaImage>;

    /// Intrinsic `(width, height)` of the feed; `(0, 0)` before the first frame.
    fn intrinsic_size(&self) -> (u32, u32) {
        self.latest_frame()
            .map_or((0, 0), |frame| frame.dimensions())
    }
}

/// A frame source holding a single still image that can be swapped at runtime.
///
/// Used for still-image cameras and as the frame store that a device adapter
/// writes into.
#[derive(Debug, Clone, Default)]
pub struct StillFrameSource {
    frame: Arc<RwLock<Option<RgbaImage>>>,
}

impl StillFrameSource {
    /// A source with no frame yet.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// A source that always yields `frame`.
    #[must_use]
    pub fn new(frame: RgbaImage) -> Self {
        Self {
            frame: Arc::new(RwLock::new(Some(frame))),
        }
    }

    /// Load a still image from disk.
    pub fn open(path: &Path) -> Result<Self, MediaError> {
        let img = image::open(path).map_err(|e| match e {
            image::ImageError::IoError(io) => MediaError::Io(io),
            e => MediaError::Decode(format!("{}: {e}", path.display())),
        })?;
        tracing::debug!(path = %path.display(), width = img.width(), height = img.height(), "Loaded still frame");
        Ok(Self::new(img.to_rgba8()))
    }

    /// Replace the current frame.
    pub fn push(&self, frame: RgbaImage) {
        if let Ok(mut guard) = self.frame.write() {
            *guard = Some(frame);
        }
    }
}

impl FrameSource for StillFrameSource {
    fn latest_frame(&self) -> Option<RgbaImage> {
        self.frame.read().ok().and_then(|guard| guard.clone())
    }

    fn intrinsic_size(&self) -> (u32, u32) {
        self.frame
            .read()
            .ok()
            .and_then(|guard| guard.as_ref().map(RgbaImage::dimensions))
            .unwrap_or((0, 0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_source_has_zero_size() {
        let source = StillFrameSource::empty();
        assert!(source.latest_frame().is_none());
        assert_eq!(source.intrinsic_size(), (0, 0));
    }

    #[test]
    fn push_replaces_frame_for_all_clones() {
        let source = StillFrameSource::empty();
        let reader = source.clone();
        source.push(RgbaImage::new(4, 3));
        assert_eq!(reader.intrinsic_size(), (4, 3));
    }

    #[test]
    fn open_separates_missing_files_from_bad_images() {
        let dir = tempfile::tempdir().unwrap();
        let missing = StillFrameSource::open(&dir.path().join("absent.png"));
        assert!(matches!(missing, Err(MediaError::Io(_))));

        let garbage = dir.path().join("garbage.png");
        std::fs::write(&garbage, b"not an image").unwrap();
        assert!(matches!(StillFrameSource::open(&garbage), Err(MediaError::Decode(_))));
    }
}
