//! Wire payload codecs.
//!
//! The realtime session exchanges audio as base64-wrapped PCM16 LE and video
//! as base64-wrapped JPEG. Screenshots are handed to callers as data URLs.
//!
//! | Direction | Format | Rate | Channels |
//! |---|---|---|---|
//! | Microphone → remote | PCM16 LE | 16 000 Hz | 1 (mono) |
//! | Remote → speaker | PCM16 LE | 24 000 Hz | 1 (mono) |

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

use crate::error::MediaError;

/// MIME type of JPEG payloads.
pub const JPEG_MIME: &str = "image/jpeg";

/// MIME prefix of raw PCM payloads (`audio/pcm;rate=<hz>`).
pub const PCM_MIME_PREFIX: &str = "audio/pcm";

/// Encode bytes as standard base64.
pub fn encode_base64(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Decode standard base64 into bytes.
pub fn decode_base64(data: &str) -> Result<Vec<u8>, MediaError> {
    STANDARD
        .decode(data.trim())
        .map_err(|e| MediaError::Decode(format!("invalid base64: {e}")))
}

/// Encode f32 samples (range −1.0 … 1.0) to PCM16 LE bytes.
///
/// Each sample is scaled by 32768 and rounded. Values outside [−1, 1] are
/// clamped first, and the positive full-scale sample saturates at
/// `i16::MAX`, so out-of-range input never wraps around.
pub fn encode_pcm16(samples: &[f32]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(samples.len() * 2);
    for &s in samples {
        let clamped = if s.is_nan() { 0.0 } else { s.clamp(-1.0, 1.0) };
        let scaled = (f64::from(clamped) * 32_768.0).round();
        let i16_val = scaled.clamp(f64::from(i16::MIN), f64::from(i16::MAX)) as i16;
        buf.extend_from_slice(&i16_val.to_le_bytes());
    }
    buf
}

/// Decode interleaved PCM16 LE bytes into one f32 buffer per channel.
pub fn decode_pcm16(bytes: &[u8], channels: u16) -> Result<Vec<Vec<f32>>, MediaError> {
    if channels == 0 {
        return Err(MediaError::Decode("channel count must be > 0".into()));
    }
    if bytes.len() % 2 != 0 {
        return Err(MediaError::Decode(format!(
            "PCM16 payload has odd length {}",
            bytes.len()
        )));
    }

    let channels = usize::from(channels);
    let frames = bytes.len() / 2 / channels;
    let mut out = vec![Vec::with_capacity(frames); channels];
    for (index, pair) in bytes.chunks_exact(2).enumerate() {
        let value = i16::from_le_bytes([pair[0], pair[1]]);
        out[index % channels].push(f32::from(value) / 32_768.0);
    }
    Ok(out)
}

/// Downsample mono audio by averaging the input samples in each output window.
///
/// Equal rates return the input unchanged. Raising the rate is not supported.
pub fn downsample(input: &[f32], input_rate: u32, target_rate: u32) -> Result<Vec<f32>, MediaError> {
    if target_rate == input_rate {
        return Ok(input.to_vec());
    }
    if target_rate > input_rate || target_rate == 0 {
        return Err(MediaError::UnsupportedResample {
            from: input_rate,
            to: target_rate,
        });
    }

    let ratio = f64::from(input_rate) / f64::from(target_rate);
    let new_len = (input.len() as f64 / ratio).round() as usize;
    let mut result = Vec::with_capacity(new_len);

    let mut offset = 0.0_f64;
    for _ in 0..new_len {
        let start = offset.floor() as usize;
        let end = ((offset + ratio).floor() as usize).min(input.len());
        let window = input.get(start..end).unwrap_or_default();
        let avg = if window.is_empty() {
            0.0
        } else {
            window.iter().sum::<f32>() / window.len() as f32
        };
        result.push(avg);
        offset += ratio;
    }
    Ok(result)
}

/// Root-mean-square level of a block of samples, clamped to 0.0–1.0.
pub fn rms_level(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f32 = samples.iter().map(|s| s * s).sum();
    (sum / samples.len() as f32).sqrt().min(1.0)
}

/// Build a `data:` URL from a MIME type and raw bytes.
pub fn to_data_url(mime_type: &str, bytes: &[u8]) -> String {
    format!("data:{mime_type};base64,{}", encode_base64(bytes))
}

/// Split a base64 `data:` URL into its MIME type and decoded bytes.
pub fn parse_data_url(url: &str) -> Result<(String, Vec<u8>), MediaError> {
    let rest = url
        .strip_prefix("data:")
        .ok_or_else(|| MediaError::Decode("not a data URL".into()))?;
    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| MediaError::Decode("data URL has no payload".into()))?;
    let mime_type = header
        .strip_suffix(";base64")
        .ok_or_else(|| MediaError::Decode("only base64 data URLs are supported".into()))?;
    Ok((mime_type.to_string(), decode_base64(payload)?))
}

/// A base64 payload tagged with its MIME type, as carried in `media` fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaBlob {
    /// Base64-encoded payload.
    pub data: String,
    /// MIME type, e.g. `audio/pcm;rate=16000` or `image/jpeg`.
    pub mime_type: String,
}

impl MediaBlob {
    /// Encode microphone samples as a PCM16 blob at `sample_rate`.
    pub fn pcm(samples: &[f32], sample_rate: u32) -> Self {
        Self {
            data: encode_base64(&encode_pcm16(samples)),
            mime_type: format!("{PCM_MIME_PREFIX};rate={sample_rate}"),
        }
    }

    /// Wrap already-encoded JPEG bytes.
    pub fn jpeg(bytes: &[u8]) -> Self {
        Self {
            data: encode_base64(bytes),
            mime_type: JPEG_MIME.to_string(),
        }
    }

    /// Whether the payload is raw PCM audio.
    pub fn is_pcm(&self) -> bool {
        self.mime_type.starts_with(PCM_MIME_PREFIX)
    }

    /// The `rate=` parameter of a PCM MIME type, if present.
    pub fn sample_rate(&self) -> Option<u32> {
        self.mime_type
            .split(';')
            .skip(1)
            .filter_map(|param| param.trim().strip_prefix("rate="))
            .find_map(|rate| rate.parse().ok())
    }

    /// Decode the base64 payload.
    pub fn bytes(&self) -> Result<Vec<u8>, MediaError> {
        decode_base64(&self.data)
    }
}
