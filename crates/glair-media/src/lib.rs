//! Media primitives shared by the GLAIR widgets.
//!
//! - [`crop`]: center-crop / mirror / sub-region screenshot capture from a
//!   live video frame, exported as JPEG.
//! - [`codec`]: base64, PCM16 and data-URL payload codecs used on the wire.
//! - [`settings`]: session and capture configuration with validation.
//! - [`error`]: the error taxonomy shared by every crate in the workspace.

pub mod codec;
pub mod crop;
pub mod error;
pub mod frame;
pub mod settings;

// Re-exported so downstream crates share one `image` version for frames.
pub use image;

// Re-export key types for convenience
pub use codec::{MediaBlob, decode_base64, decode_pcm16, downsample, encode_base64, encode_pcm16};
pub use crop::{CropPlan, CropSpec, CropTarget, FrameCropper, Rect, Region, Screenshot};
pub use error::{DeviceErrorKind, MediaError};
pub use frame::{FrameSource, StillFrameSource};
pub use settings::{LiveSettings, SettingsError, SettingsUpdate, validate_settings};
