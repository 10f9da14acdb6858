//! Inbound events, UI-facing session events and the session state enum.

use serde::{Deserialize, Serialize};

use glair_media::{MediaBlob, MediaError};

use crate::protocol::FunctionCall;

/// Identifier of one scheduled playback source.
pub type SourceId = u64;

// ── Session state machine ──────────────────────────────────────────

/// Connection / capture state of a [`RealtimeSession`](crate::RealtimeSession).
///
/// ```text
///   Idle → Connecting → Open ⇄ Capturing
///            │           │        │
///            ▼           ▼        ▼
///          Error       Closed / Error
/// ```
///
/// `Closed` and `Error` are terminal for the connection; calling
/// [`connect`](crate::RealtimeSession::connect) again starts a new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    /// No connection has been attempted.
    Idle,

    /// Waiting for the remote handshake.
    Connecting,

    /// Connected, local capture not running.
    Open,

    /// Connected and streaming microphone audio and camera frames.
    Capturing,

    /// The connection was closed by either side.
    Closed,

    /// The connection failed or the remote reported an error.
    Error,
}

impl SessionState {
    /// Whether the remote connection is usable.
    #[must_use]
    pub const fn is_connected(self) -> bool {
        matches!(self, Self::Open | Self::Capturing)
    }
}

// ── Inbound ────────────────────────────────────────────────────────

/// A synthesized audio chunk as received, before decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioChunk {
    /// Base64 PCM16 LE payload and its MIME type.
    pub blob: MediaBlob,
}

impl From<MediaBlob> for AudioChunk {
    fn from(blob: MediaBlob) -> Self {
        Self { blob }
    }
}

/// Everything the session reacts to, funnelled through
/// [`RealtimeSession::dispatch`](crate::RealtimeSession::dispatch).
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    /// The remote acknowledged the handshake.
    Opened,

    /// A synthesized audio chunk to play.
    AudioChunk(AudioChunk),

    /// A fragment of the spoken-output transcript.
    Transcript(String),

    /// The user spoke over the model; flush playback.
    Interrupted,

    /// The model finished its turn.
    TurnComplete,

    /// The model requested one or more tool calls.
    ToolCallRequested(Vec<FunctionCall>),

    /// The remote reported an error.
    ErrorOccurred(String),

    /// The connection was closed.
    Closed { reason: String },

    /// A scheduled source finished playing on its own.
    PlaybackEnded(SourceId),
}

// ── Events emitted to the UI layer ─────────────────────────────────

/// Events emitted by the session to the UI / application layer.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Session state changed.
    StateChanged(SessionState),

    /// The visible caption changed (empty string = cleared).
    CaptionChanged(String),

    /// Human-readable progress message.
    Status(String),

    /// A connection-level error (retry the connection).
    Error(String),

    /// Camera or microphone permission was refused (retry the permission).
    AccessDenied(String),

    /// Microphone level (0.0–1.0), for visualisation.
    InputLevel(f32),

    /// Level of the chunk just scheduled for playback (0.0–1.0).
    OutputLevel(f32),

    /// A tool response was sent for these call names.
    ToolResponded(Vec<String>),

    /// Microphone or camera mute toggled.
    MuteChanged { audio_enabled: bool, video_enabled: bool },
}

impl SessionEvent {
    /// Map a capture failure to the event the UI should show.
    pub fn from_capture_error(err: &MediaError) -> Self {
        if err.is_permission_denied() {
            Self::AccessDenied(err.to_string())
        } else {
            Self::Error(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connected_states() {
        assert!(SessionState::Open.is_connected());
        assert!(SessionState::Capturing.is_connected());
        assert!(!SessionState::Connecting.is_connected());
        assert!(!SessionState::Closed.is_connected());
    }

    #[test]
    fn permission_errors_map_to_access_denied() {
        let denied = MediaError::PermissionDenied("NotAllowedError".into());
        assert!(matches!(
            SessionEvent::from_capture_error(&denied),
            SessionEvent::AccessDenied(_)
        ));

        let other = MediaError::ConnectionError("reset".into());
        assert!(matches!(
            SessionEvent::from_capture_error(&other),
            SessionEvent::Error(_)
        ));
    }
}
