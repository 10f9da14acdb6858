//! CLI-specific error types and exit codes.

use glair_media::{MediaError, SettingsError};
use thiserror::Error;

/// CLI-specific error type.
#[derive(Debug, Error)]
pub enum CliError {
    /// Argument parsing error.
    #[error("Invalid arguments: {0}")]
    Arguments(String),

    /// IO error (file not found, permission denied, etc.).
    #[error("IO error: {0}")]
    Io(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Capture or encoding error.
    #[error("Media error: {0}")]
    Media(String),

    /// The realtime session failed.
    #[error("Session error: {0}")]
    Session(String),
}

impl CliError {
    /// Map error to an exit code (see sysexits.h).
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Arguments(_) => 2, // EX_USAGE
            Self::Io(_) => 74,       // EX_IOERR
            Self::Config(_) => 78,   // EX_CONFIG
            Self::Media(_) => 65,    // EX_DATAERR
            Self::Session(_) => 69,  // EX_UNAVAILABLE
        }
    }
}

impl From<MediaError> for CliError {
    fn from(err: MediaError) -> Self {
        match err {
            MediaError::Io(e) => Self::Io(e.to_string()),
            MediaError::InvalidTarget { .. } | MediaError::UnsupportedResample { .. } => {
                Self::Arguments(err.to_string())
            }
            MediaError::CaptureUnavailable
            | MediaError::Encode(_)
            | MediaError::Decode(_)
            | MediaError::PermissionDenied(_)
            | MediaError::DeviceUnavailable { .. } => Self::Media(err.to_string()),
            MediaError::ConnectionError(_)
            | MediaError::ConnectionClosed(_)
            | MediaError::OutboundFull(_)
            | MediaError::HandshakeTimeout(_)
            | MediaError::AlreadyActive
            | MediaError::NotOpen => Self::Session(err.to_string()),
        }
    }
}

impl From<SettingsError> for CliError {
    fn from(err: SettingsError) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
