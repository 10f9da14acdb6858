//! Realtime voice + camera session with a remote multimodal model.
//!
//! # Architecture
//!
//! ```text
//!  MediaDevices ──► CaptureHandle ──► Transport ──► remote
//!   (mic, camera)    PCM16 blocks        ▲
//!                    JPEG snapshots      │ ToolResponse
//!                                        │
//!  remote ──► InboundEvent ──► RealtimeSession::dispatch
//!                                 ├─► PlaybackScheduler ──► AudioOutput
//!                                 ├─► captions (deferred to playback)
//!                                 └─► ToolRegistry
//! ```
//!
//! The remote transport is pluggable through [`Connector`]; the crate ships
//! an in-memory [`LoopbackConnector`] for tests and scripted replays.

pub mod capture;
pub mod event;
pub mod playback;
pub mod protocol;
pub mod session;
pub mod tools;
pub mod transport;

pub use capture::{CaptureConfig, CaptureHandle, MediaConstraints, MediaDevices, MediaStream, SyntheticDevices};
pub use event::{AudioChunk, InboundEvent, SessionEvent, SessionState, SourceId};
pub use playback::{AudioBuffer, AudioOutput, PlaybackDoneCallback, PlaybackScheduler, ScheduledChunk, VirtualOutput};
pub use protocol::{
    Behavior, ClientMessage, FunctionCall, FunctionDeclaration, FunctionResponse, Scheduling, ServerMessage,
    SetupRequest, ToolResult,
};
pub use session::RealtimeSession;
pub use tools::{ToolHandler, ToolRegistry, WEATHER_TOOL, WeatherTool};
pub use transport::{ChannelTransport, Connection, Connector, LoopbackConnector, RemoteEnd, Transport};

pub use glair_media::{LiveSettings, MediaError};
