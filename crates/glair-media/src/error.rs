//! Media error types.

use std::time::Duration;

/// Errors that can occur while capturing, encoding or streaming media.
#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    /// Camera or microphone access was refused by the user or the platform.
    ///
    /// Recoverable by the user: change the permission and retry capture.
    #[error("Device access denied: {0}")]
    PermissionDenied(String),

    /// A capture device failed for a reason other than permission.
    #[error("Capture device unavailable ({kind}): {message}")]
    DeviceUnavailable {
        kind: DeviceErrorKind,
        message: String,
    },

    /// The video source has not produced a frame yet.
    #[error("No video frame available to capture")]
    CaptureUnavailable,

    /// The remote session failed to open or errored mid-session.
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// The remote session was closed.
    #[error("Connection closed: {0}")]
    ConnectionClosed(String),

    /// The outbound buffer has no room for a message that must not be dropped.
    #[error("Outbound buffer full, {0} not queued")]
    OutboundFull(&'static str),

    /// The remote handshake did not complete in time.
    #[error("Remote handshake timed out after {0:?}")]
    HandshakeTimeout(Duration),

    /// Requested output dimensions are not usable.
    #[error("Invalid capture target {width}x{height}: dimensions must be > 0")]
    InvalidTarget { width: u32, height: u32 },

    /// Failed to encode an image or audio payload.
    #[error("Encoding failed: {0}")]
    Encode(String),

    /// Failed to decode an inbound payload.
    #[error("Decoding failed: {0}")]
    Decode(String),

    /// Resampling was asked to raise the sample rate.
    #[error("Cannot resample from {from} Hz up to {to} Hz")]
    UnsupportedResample { from: u32, to: u32 },

    /// The session is already connecting or connected.
    #[error("Session is already active")]
    AlreadyActive,

    /// The operation needs an open session.
    #[error("Session is not open")]
    NotOpen,

    /// IO error (config files, image files).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl MediaError {
    /// Build the right error for a raw device failure message.
    ///
    /// Permission failures map to [`MediaError::PermissionDenied`] so callers
    /// can prompt for a permission retry instead of a connection retry.
    pub fn from_device_message(message: impl Into<String>) -> Self {
        let message = message.into();
        match DeviceErrorKind::classify(&message) {
            DeviceErrorKind::PermissionDenied => Self::PermissionDenied(message),
            kind => Self::DeviceUnavailable { kind, message },
        }
    }

    /// Whether this error is a device permission problem.
    #[must_use]
    pub const fn is_permission_denied(&self) -> bool {
        matches!(self, Self::PermissionDenied(_))
    }
}

/// Category of a device acquisition failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeviceErrorKind {
    /// The platform has no media capture support.
    NotSupported,
    /// Access was refused.
    PermissionDenied,
    /// The device exists but could not be read (busy, hardware fault).
    NotReadable,
    /// No matching device was found.
    NotFound,
    /// Anything else.
    Other,
}

impl DeviceErrorKind {
    /// Classify a device error message by the names platforms report.
    #[must_use]
    pub fn classify(message: &str) -> Self {
        if message.contains("Permission") || message.contains("NotAllowedError") {
            Self::PermissionDenied
        } else if message.contains("notSupported") || message.contains("NotSupportedError") {
            Self::NotSupported
        } else if message.contains("NotReadableError") {
            Self::NotReadable
        } else if message.contains("NotFoundError") {
            Self::NotFound
        } else {
            Self::Other
        }
    }
}

impl std::fmt::Display for DeviceErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::NotSupported => "NOT_SUPPORTED",
            Self::PermissionDenied => "PERMISSION_DENIED",
            Self::NotReadable => "NOT_READABLE",
            Self::NotFound => "NOT_FOUND",
            Self::Other => "DEFAULT_ERROR",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_known_device_errors() {
        assert_eq!(
            DeviceErrorKind::classify("NotAllowedError: Permission denied"),
            DeviceErrorKind::PermissionDenied
        );
        assert_eq!(
            DeviceErrorKind::classify("NotReadableError: Could not start video source"),
            DeviceErrorKind::NotReadable
        );
        assert_eq!(
            DeviceErrorKind::classify("NotFoundError: Requested device not found"),
            DeviceErrorKind::NotFound
        );
        assert_eq!(DeviceErrorKind::classify("boom"), DeviceErrorKind::Other);
    }

    #[test]
    fn permission_message_becomes_permission_denied() {
        let err = MediaError::from_device_message("NotAllowedError");
        assert!(err.is_permission_denied());

        let err = MediaError::from_device_message("NotFoundError");
        assert!(matches!(
            err,
            MediaError::DeviceUnavailable {
                kind: DeviceErrorKind::NotFound,
                ..
            }
        ));
    }
}
