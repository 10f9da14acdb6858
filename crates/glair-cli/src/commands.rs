//! Available commands and their arguments.

use std::path::PathBuf;

use clap::{Args, Subcommand};
use glair_media::{Region, SettingsUpdate};

/// Available commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Center-crop an image to a target size and export it as JPEG
    Crop(CropArgs),

    /// Run a scripted session against the in-memory remote
    Replay(ReplayArgs),

    /// View or change live session settings
    Settings {
        #[command(subcommand)]
        command: Option<SettingsCommand>,
    },
}

/// Arguments of `glair crop`.
#[derive(Args, Debug)]
pub struct CropArgs {
    /// Source image (any format the `image` crate decodes)
    pub image: PathBuf,
    /// Output width in pixels (defaults to the configured screenshot width)
    #[arg(long)]
    pub width: Option<u32>,
    /// Output height in pixels (defaults to the configured screenshot height)
    #[arg(long)]
    pub height: Option<u32>,
    /// Mirror the output horizontally, like a front-facing camera preview
    #[arg(long)]
    pub mirror: bool,
    /// Sub-region in percent of the crop, as x,y,width,height
    #[arg(long, value_parser = parse_region)]
    pub region: Option<Region>,
    /// Write the JPEG here instead of printing a data URL
    #[arg(short, long)]
    pub output: Option<PathBuf>,
    /// JPEG quality, 1-100 (defaults to the configured screenshot quality)
    #[arg(short, long)]
    pub quality: Option<u8>,
}

/// Arguments of `glair replay`.
#[derive(Args, Debug)]
pub struct ReplayArgs {
    /// JSON-lines script of server messages; `{"delayMs": N}` lines pause
    pub script: PathBuf,
    /// Image served as the camera feed while capturing
    #[arg(long)]
    pub camera: Option<PathBuf>,
    /// Frequency of the synthetic microphone tone
    #[arg(long, default_value_t = 440.0)]
    pub tone_hz: f32,
    /// Seconds to keep capturing after the script ends (0 disables capture)
    #[arg(long, default_value_t = 2)]
    pub capture_secs: u64,
}

/// Settings command variants.
#[derive(Subcommand, Debug)]
pub enum SettingsCommand {
    /// Show the effective settings as JSON
    Show,
    /// Update settings in the config file
    Set(SettingsSetArgs),
    /// Write default settings to the config file
    Reset,
}

/// Fields accepted by `glair settings set`.
#[derive(Args, Debug, Default)]
pub struct SettingsSetArgs {
    /// Model identifier sent at setup
    #[arg(long)]
    pub model: Option<String>,
    /// Prebuilt voice name
    #[arg(long)]
    pub voice_name: Option<String>,
    /// Camera snapshot interval in ms (>= 100)
    #[arg(long)]
    pub frame_interval_ms: Option<u64>,
    /// JPEG quality of streamed camera snapshots (1-100)
    #[arg(long)]
    pub frame_jpeg_quality: Option<u8>,
    /// JPEG quality of screenshots (1-100)
    #[arg(long)]
    pub screenshot_jpeg_quality: Option<u8>,
    /// Delay before tool calls are answered, in ms
    #[arg(long)]
    pub tool_delay_ms: Option<u64>,
    /// Handshake timeout in ms (> 0)
    #[arg(long)]
    pub handshake_timeout_ms: Option<u64>,
}

impl SettingsSetArgs {
    /// Whether any field was given.
    pub const fn is_empty(&self) -> bool {
        self.model.is_none()
            && self.voice_name.is_none()
            && self.frame_interval_ms.is_none()
            && self.frame_jpeg_quality.is_none()
            && self.screenshot_jpeg_quality.is_none()
            && self.tool_delay_ms.is_none()
            && self.handshake_timeout_ms.is_none()
    }
}

impl From<SettingsSetArgs> for SettingsUpdate {
    fn from(args: SettingsSetArgs) -> Self {
        Self {
            model: args.model,
            voice_name: args.voice_name,
            frame_interval_ms: args.frame_interval_ms,
            frame_jpeg_quality: args.frame_jpeg_quality,
            screenshot_jpeg_quality: args.screenshot_jpeg_quality,
            tool_delay_ms: args.tool_delay_ms,
            handshake_timeout_ms: args.handshake_timeout_ms,
        }
    }
}

/// Parse `x,y,width,height` percentages.
fn parse_region(raw: &str) -> Result<Region, String> {
    let values = raw
        .split(',')
        .map(|part| part.trim().parse::<f64>().map_err(|e| format!("'{part}': {e}")))
        .collect::<Result<Vec<_>, _>>()?;

    match values.as_slice() {
        [x, y, width, height] => {
            if values.iter().any(|v| !v.is_finite() || *v < 0.0) {
                return Err("region values must be non-negative percentages".into());
            }
            Ok(Region::new(*x, *y, *width, *height))
        }
        _ => Err(format!("expected x,y,width,height, got {} values", values.len())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn region_needs_four_values() {
        assert!(parse_region("1,2,3").is_err());
        assert!(parse_region("1,2,3,x").is_err());
        assert!(parse_region("-1,0,10,10").is_err());
        let region = parse_region(" 25, 0, 50 ,100").unwrap();
        assert_eq!(region.width, 50.0);
    }
}
