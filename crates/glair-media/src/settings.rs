//! Session and capture settings.
//!
//! All fields have defaults matching the reference widget behaviour, so an
//! empty JSON object is a valid settings file.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::MediaError;

/// Model requested from the inference service.
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash-preview-native-audio-dialog";

/// Prebuilt voice used for synthesized speech.
pub const DEFAULT_VOICE: &str = "Orus";

/// Microphone sample rate sent upstream.
pub const DEFAULT_INPUT_SAMPLE_RATE: u32 = 16_000;

/// Sample rate of synthesized audio received from the service.
pub const DEFAULT_OUTPUT_SAMPLE_RATE: u32 = 24_000;

/// Samples per outbound microphone block.
pub const DEFAULT_AUDIO_BLOCK_SIZE: usize = 256;

/// Camera snapshot cadence.
pub const DEFAULT_FRAME_INTERVAL_MS: u64 = 1_000;

/// JPEG quality for streamed camera snapshots.
pub const DEFAULT_FRAME_JPEG_QUALITY: u8 = 70;

/// Artificial delay before answering a known tool call.
pub const DEFAULT_TOOL_DELAY_MS: u64 = 10_000;

/// Upper bound on the remote handshake.
pub const DEFAULT_HANDSHAKE_TIMEOUT_MS: u64 = 15_000;

/// Realtime session settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LiveSettings {
    /// Model identifier passed to the service at setup.
    pub model: String,

    /// Prebuilt voice name for synthesized audio.
    pub voice_name: String,

    /// Sample rate of outbound microphone PCM (Hz).
    pub input_sample_rate: u32,

    /// Sample rate of inbound synthesized PCM (Hz).
    pub output_sample_rate: u32,

    /// Samples per outbound microphone block.
    pub audio_block_size: usize,

    /// Interval between camera snapshots (ms).
    pub frame_interval_ms: u64,

    /// JPEG quality of streamed camera snapshots (1-100).
    pub frame_jpeg_quality: u8,

    /// JPEG quality of on-demand screenshots (1-100).
    pub screenshot_jpeg_quality: u8,

    /// Default screenshot width in pixels.
    pub screenshot_width: u32,

    /// Default screenshot height in pixels.
    pub screenshot_height: u32,

    /// Delay before a known tool call is answered (ms).
    pub tool_delay_ms: u64,

    /// Maximum time to wait for the remote handshake (ms).
    pub handshake_timeout_ms: u64,
}

impl Default for LiveSettings {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl LiveSettings {
    /// Create settings with the reference defaults.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            voice_name: DEFAULT_VOICE.to_string(),
            input_sample_rate: DEFAULT_INPUT_SAMPLE_RATE,
            output_sample_rate: DEFAULT_OUTPUT_SAMPLE_RATE,
            audio_block_size: DEFAULT_AUDIO_BLOCK_SIZE,
            frame_interval_ms: DEFAULT_FRAME_INTERVAL_MS,
            frame_jpeg_quality: DEFAULT_FRAME_JPEG_QUALITY,
            screenshot_jpeg_quality: crate::crop::DEFAULT_SCREENSHOT_QUALITY,
            screenshot_width: 480,
            screenshot_height: 480,
            tool_delay_ms: DEFAULT_TOOL_DELAY_MS,
            handshake_timeout_ms: DEFAULT_HANDSHAKE_TIMEOUT_MS,
        }
    }

    #[must_use]
    pub const fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }

    #[must_use]
    pub const fn tool_delay(&self) -> Duration {
        Duration::from_millis(self.tool_delay_ms)
    }

    #[must_use]
    pub const fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    /// Load and validate settings from a JSON file.
    pub fn load(path: &Path) -> Result<Self, MediaError> {
        let raw = std::fs::read_to_string(path)?;
        let settings: Self = serde_json::from_str(&raw).map_err(|e| {
            MediaError::Decode(format!("invalid settings file {}: {e}", path.display()))
        })?;
        validate_settings(&settings)
            .map_err(|e| MediaError::Decode(format!("{}: {e}", path.display())))?;
        tracing::debug!(path = %path.display(), "Loaded settings");
        Ok(settings)
    }

    /// Write settings to a JSON file.
    pub fn save(&self, path: &Path) -> Result<(), MediaError> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| MediaError::Encode(format!("settings: {e}")))?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Merge a partial update, only touching fields that are `Some`.
    pub fn merge(&mut self, other: &SettingsUpdate) {
        if let Some(ref model) = other.model {
            self.model.clone_from(model);
        }
        if let Some(ref voice) = other.voice_name {
            self.voice_name.clone_from(voice);
        }
        if let Some(interval) = other.frame_interval_ms {
            self.frame_interval_ms = interval;
        }
        if let Some(quality) = other.frame_jpeg_quality {
            self.frame_jpeg_quality = quality;
        }
        if let Some(quality) = other.screenshot_jpeg_quality {
            self.screenshot_jpeg_quality = quality;
        }
        if let Some(delay) = other.tool_delay_ms {
            self.tool_delay_ms = delay;
        }
        if let Some(timeout) = other.handshake_timeout_ms {
            self.handshake_timeout_ms = timeout;
        }
    }
}

/// Partial settings update. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SettingsUpdate {
    pub model: Option<String>,
    pub voice_name: Option<String>,
    pub frame_interval_ms: Option<u64>,
    pub frame_jpeg_quality: Option<u8>,
    pub screenshot_jpeg_quality: Option<u8>,
    pub tool_delay_ms: Option<u64>,
    pub handshake_timeout_ms: Option<u64>,
}

/// Settings validation error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SettingsError {
    #[error("Sample rate must be between 8000 and 96000 Hz, got {0}")]
    InvalidSampleRate(u32),

    #[error("Audio block size must be a power of two between 256 and 16384, got {0}")]
    InvalidBlockSize(usize),

    #[error("JPEG quality must be between 1 and 100, got {0}")]
    InvalidQuality(u8),

    #[error("Frame interval must be at least 100 ms, got {0}")]
    InvalidFrameInterval(u64),

    #[error("Screenshot dimensions must be > 0, got {0}x{1}")]
    InvalidScreenshotSize(u32, u32),

    #[error("Handshake timeout must be > 0")]
    ZeroHandshakeTimeout,

    #[error("Model name cannot be empty")]
    EmptyModel,
}

/// Validate settings values.
pub fn validate_settings(settings: &LiveSettings) -> Result<(), SettingsError> {
    for rate in [settings.input_sample_rate, settings.output_sample_rate] {
        if !(8_000..=96_000).contains(&rate) {
            return Err(SettingsError::InvalidSampleRate(rate));
        }
    }

    // Same constraint as a ScriptProcessor buffer size.
    let block = settings.audio_block_size;
    if !(256..=16_384).contains(&block) || !block.is_power_of_two() {
        return Err(SettingsError::InvalidBlockSize(block));
    }

    for quality in [settings.frame_jpeg_quality, settings.screenshot_jpeg_quality] {
        if !(1..=100).contains(&quality) {
            return Err(SettingsError::InvalidQuality(quality));
        }
    }

    if settings.frame_interval_ms < 100 {
        return Err(SettingsError::InvalidFrameInterval(settings.frame_interval_ms));
    }

    if settings.screenshot_width == 0 || settings.screenshot_height == 0 {
        return Err(SettingsError::InvalidScreenshotSize(
            settings.screenshot_width,
            settings.screenshot_height,
        ));
    }

    if settings.handshake_timeout_ms == 0 {
        return Err(SettingsError::ZeroHandshakeTimeout);
    }

    if settings.model.trim().is_empty() {
        return Err(SettingsError::EmptyModel);
    }

    Ok(())
}
