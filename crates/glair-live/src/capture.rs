//! Local capture: microphone blocks and camera snapshots streamed upstream.
//!
//! Two independent cadences run while capturing:
//!
//! - **Audio**: device blocks are downsampled to the input rate, cut into
//!   fixed-size blocks, PCM16-encoded and sent as soon as each block is full.
//! - **Video**: every `frame_interval` the latest camera frame is JPEG-encoded
//!   at its intrinsic size and sent. Missed ticks are skipped, so frames never
//!   queue up.
//!
//! Neither path blocks on the network: [`Transport::send`] is non-blocking and
//! anything it refuses is dropped.
//!
//! Device ownership is scoped to a [`CaptureHandle`]: acquiring a stream
//! starts the pumps, and [`CaptureHandle::stop`] (or dropping the handle)
//! aborts them and stops every device track.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use glair_media::codec::rms_level;
use glair_media::{CropTarget, FrameCropper, FrameSource, LiveSettings, MediaBlob, MediaError, StillFrameSource, downsample};

use crate::event::SessionEvent;
use crate::protocol::ClientMessage;
use crate::transport::Transport;

// ── Device abstraction ─────────────────────────────────────────────

/// Which devices to request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaConstraints {
    pub audio: bool,
    pub video: bool,
}

impl Default for MediaConstraints {
    fn default() -> Self {
        Self {
            audio: true,
            video: true,
        }
    }
}

/// A granted capture stream.
pub trait MediaStream: Send {
    /// Receiver of raw mono microphone blocks. Can be taken once.
    fn take_audio(&mut self) -> Option<mpsc::Receiver<Vec<f32>>>;

    /// Sample rate of the microphone blocks.
    fn audio_sample_rate(&self) -> u32;

    /// The camera feed, if video was requested.
    fn video(&self) -> Option<Arc<dyn FrameSource>>;

    /// Stop every device track. Must be idempotent.
    fn stop_tracks(&mut self);
}

/// Grants access to the camera and microphone.
#[async_trait]
pub trait MediaDevices: Send + Sync {
    /// Ask for the devices in `constraints`. Waits for the permission
    /// decision; refusal is [`MediaError::PermissionDenied`].
    async fn acquire(&self, constraints: MediaConstraints) -> Result<Box<dyn MediaStream>, MediaError>;
}

// ── Capture pipeline ───────────────────────────────────────────────

/// Capture parameters, usually derived from [`LiveSettings`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureConfig {
    /// Outbound PCM rate (Hz).
    pub sample_rate: u32,
    /// Samples per outbound block.
    pub block_size: usize,
    /// Camera snapshot cadence.
    pub frame_interval: Duration,
    /// JPEG quality of snapshots.
    pub frame_quality: u8,
}

impl From<&LiveSettings> for CaptureConfig {
    fn from(settings: &LiveSettings) -> Self {
        Self {
            sample_rate: settings.input_sample_rate,
            block_size: settings.audio_block_size.max(1),
            frame_interval: settings.frame_interval(),
            frame_quality: settings.frame_jpeg_quality,
        }
    }
}

/// Running capture: owns the device stream and both pump tasks.
pub struct CaptureHandle {
    stream: Box<dyn MediaStream>,
    audio_task: Option<JoinHandle<()>>,
    video_task: Option<JoinHandle<()>>,
    audio_enabled: Arc<AtomicBool>,
    video_enabled: Arc<AtomicBool>,
    stopped: bool,
}

impl CaptureHandle {
    /// Start pumping `stream` to `transport`. Must be called inside a tokio
    /// runtime.
    pub fn start(
        mut stream: Box<dyn MediaStream>,
        transport: Arc<dyn Transport>,
        config: CaptureConfig,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) -> Self {
        let audio_enabled = Arc::new(AtomicBool::new(true));
        let video_enabled = Arc::new(AtomicBool::new(true));

        let audio_task = stream.take_audio().map(|rx| {
            tokio::spawn(pump_audio(
                rx,
                stream.audio_sample_rate(),
                config,
                Arc::clone(&transport),
                Arc::clone(&audio_enabled),
                events,
            ))
        });

        let video_task = stream.video().map(|source| {
            tokio::spawn(pump_video(
                source,
                config,
                Arc::clone(&transport),
                Arc::clone(&video_enabled),
            ))
        });

        tracing::info!(
            audio = audio_task.is_some(),
            video = video_task.is_some(),
            block_size = config.block_size,
            "Capture started"
        );

        Self {
            stream,
            audio_task,
            video_task,
            audio_enabled,
            video_enabled,
            stopped: false,
        }
    }

    /// Stop both pumps and release the devices. Safe to call repeatedly.
    pub fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        if let Some(task) = self.audio_task.take() {
            task.abort();
        }
        if let Some(task) = self.video_task.take() {
            task.abort();
        }
        self.stream.stop_tracks();
        tracing::info!("Capture stopped");
    }

    #[must_use]
    pub const fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Enable or mute the microphone track. Muted blocks are discarded.
    pub fn set_audio_enabled(&self, enabled: bool) {
        self.audio_enabled.store(enabled, Ordering::SeqCst);
    }

    /// Enable or blank the camera track. No snapshots are sent while off.
    pub fn set_video_enabled(&self, enabled: bool) {
        self.video_enabled.store(enabled, Ordering::SeqCst);
    }

    #[must_use]
    pub fn audio_enabled(&self) -> bool {
        self.audio_enabled.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn video_enabled(&self) -> bool {
        self.video_enabled.load(Ordering::SeqCst)
    }
}

impl Drop for CaptureHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn pump_audio(
    mut rx: mpsc::Receiver<Vec<f32>>,
    device_rate: u32,
    config: CaptureConfig,
    transport: Arc<dyn Transport>,
    enabled: Arc<AtomicBool>,
    events: mpsc::UnboundedSender<SessionEvent>,
) {
    let block_size = config.block_size;
    let mut pending: Vec<f32> = Vec::with_capacity(block_size * 2);

    while let Some(raw) = rx.recv().await {
        if !enabled.load(Ordering::SeqCst) {
            continue;
        }

        let samples = match downsample(&raw, device_rate, config.sample_rate) {
            Ok(samples) => samples,
            Err(e) => {
                tracing::warn!(error = %e, "Microphone rate unusable, audio capture halted");
                return;
            }
        };
        pending.extend_from_slice(&samples);

        while pending.len() >= block_size {
            let block: Vec<f32> = pending.drain(..block_size).collect();
            let _ = events.send(SessionEvent::InputLevel(rms_level(&block)));

            let media = MediaBlob::pcm(&block, config.sample_rate);
            if let Err(e) = transport.send(ClientMessage::RealtimeInput { media }) {
                tracing::debug!(error = %e, "Dropping microphone block");
            }
        }
    }

    tracing::debug!("Microphone stream ended");
}

async fn pump_video(
    source: Arc<dyn FrameSource>,
    config: CaptureConfig,
    transport: Arc<dyn Transport>,
    enabled: Arc<AtomicBool>,
) {
    let cropper = FrameCropper::new(config.frame_quality);
    let mut ticker = tokio::time::interval(config.frame_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // The first tick completes immediately; snapshots start one interval in.
    ticker.tick().await;

    loop {
        ticker.tick().await;
        if !enabled.load(Ordering::SeqCst) {
            continue;
        }

        let Some(frame) = source.latest_frame() else {
            tracing::debug!("Camera has no frame yet, skipping snapshot");
            continue;
        };
        let (width, height) = frame.dimensions();
        match cropper.capture_frame(&frame, CropTarget::new(width, height)) {
            Ok(shot) => {
                let media = shot.media_blob();
                if let Err(e) = transport.send(ClientMessage::RealtimeInput { media }) {
                    tracing::debug!(error = %e, "Dropping camera snapshot");
                }
            }
            Err(e) => tracing::warn!(error = %e, "Camera snapshot failed"),
        }
    }
}

// ── Synthetic devices ──────────────────────────────────────────────

/// Headless devices: a sine-tone microphone and a still-image camera.
///
/// Counts open streams so callers can verify every acquisition was released.
#[derive(Clone)]
pub struct SyntheticDevices {
    tone_hz: f32,
    sample_rate: u32,
    block_len: usize,
    camera: Option<StillFrameSource>,
    deny: Option<String>,
    open_streams: Arc<AtomicUsize>,
}

impl SyntheticDevices {
    /// A 440 Hz tone at 48 kHz in 10 ms blocks, with no camera.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tone_hz: 440.0,
            sample_rate: 48_000,
            block_len: 480,
            camera: None,
            deny: None,
            open_streams: Arc::new(AtomicUsize::new(0)),
        }
    }

    #[must_use]
    pub const fn tone(mut self, hz: f32) -> Self {
        self.tone_hz = hz;
        self
    }

    /// Microphone rate and block length of the generated audio.
    #[must_use]
    pub const fn microphone(mut self, sample_rate: u32, block_len: usize) -> Self {
        self.sample_rate = sample_rate;
        self.block_len = block_len;
        self
    }

    #[must_use]
    pub fn camera(mut self, camera: StillFrameSource) -> Self {
        self.camera = Some(camera);
        self
    }

    /// Refuse every acquisition as a permission denial.
    #[must_use]
    pub fn deny_permission(mut self, message: impl Into<String>) -> Self {
        self.deny = Some(message.into());
        self
    }

    /// Streams acquired and not yet stopped.
    #[must_use]
    pub fn open_streams(&self) -> usize {
        self.open_streams.load(Ordering::SeqCst)
    }
}

impl Default for SyntheticDevices {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MediaDevices for SyntheticDevices {
    async fn acquire(&self, constraints: MediaConstraints) -> Result<Box<dyn MediaStream>, MediaError> {
        if let Some(ref message) = self.deny {
            return Err(MediaError::from_device_message(message.clone()));
        }

        let (audio_rx, generator) = if constraints.audio {
            let (tx, rx) = mpsc::channel(32);
            let task = tokio::spawn(generate_tone(tx, self.tone_hz, self.sample_rate, self.block_len));
            (Some(rx), Some(task))
        } else {
            (None, None)
        };
        let video = if constraints.video {
            self.camera
                .clone()
                .map(|camera| Arc::new(camera) as Arc<dyn FrameSource>)
        } else {
            None
        };

        self.open_streams.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(audio = constraints.audio, video = video.is_some(), "Synthetic devices granted");

        Ok(Box::new(SyntheticStream {
            audio_rx,
            generator,
            video,
            sample_rate: self.sample_rate,
            open_streams: Arc::clone(&self.open_streams),
            stopped: false,
        }))
    }
}

struct SyntheticStream {
    audio_rx: Option<mpsc::Receiver<Vec<f32>>>,
    generator: Option<JoinHandle<()>>,
    video: Option<Arc<dyn FrameSource>>,
    sample_rate: u32,
    open_streams: Arc<AtomicUsize>,
    stopped: bool,
}

impl MediaStream for SyntheticStream {
    fn take_audio(&mut self) -> Option<mpsc::Receiver<Vec<f32>>> {
        self.audio_rx.take()
    }

    fn audio_sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn video(&self) -> Option<Arc<dyn FrameSource>> {
        self.video.clone()
    }

    fn stop_tracks(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        if let Some(task) = self.generator.take() {
            task.abort();
        }
        self.open_streams.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Drop for SyntheticStream {
    fn drop(&mut self) {
        self.stop_tracks();
    }
}

/// Emit sine blocks in real time until the receiver goes away.
async fn generate_tone(tx: mpsc::Sender<Vec<f32>>, hz: f32, sample_rate: u32, block_len: usize) {
    let block_len = block_len.max(1);
    let period = Duration::from_secs_f64(block_len as f64 / f64::from(sample_rate.max(1)));
    let mut ticker = tokio::time::interval(period);
    let step = std::f32::consts::TAU * hz / sample_rate.max(1) as f32;
    let mut phase = 0.0_f32;

    loop {
        ticker.tick().await;
        let block: Vec<f32> = (0..block_len)
            .map(|_| {
                let s = 0.25 * phase.sin();
                phase = (phase + step) % std::f32::consts::TAU;
                s
            })
            .collect();
        match tx.try_send(block) {
            Ok(()) | Err(mpsc::error::TrySendError::Full(_)) => {}
            Err(mpsc::error::TrySendError::Closed(_)) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::ChannelTransport;
    use glair_media::image::RgbaImage;

    fn config() -> CaptureConfig {
        CaptureConfig {
            sample_rate: 16_000,
            block_size: 256,
            frame_interval: Duration::from_secs(1),
            frame_quality: 70,
        }
    }

    fn media_of(message: ClientMessage) -> MediaBlob {
        match message {
            ClientMessage::RealtimeInput { media } => media,
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn microphone_blocks_are_downsampled_and_sent() {
        let devices = SyntheticDevices::new();
        let stream = devices.acquire(MediaConstraints { audio: true, video: false }).await.unwrap();
        let (transport, mut rx) = ChannelTransport::new();
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();

        let mut capture = CaptureHandle::start(stream, Arc::new(transport), config(), events_tx);

        // 48 kHz / 10 ms blocks → 160 samples each at 16 kHz; 2 blocks give one 256 block.
        tokio::time::sleep(Duration::from_millis(35)).await;
        let media = media_of(rx.recv().await.unwrap());
        assert_eq!(media.mime_type, "audio/pcm;rate=16000");
        assert_eq!(media.bytes().unwrap().len(), 256 * 2);
        assert!(matches!(events_rx.try_recv(), Ok(SessionEvent::InputLevel(level)) if level > 0.0));

        capture.stop();
        assert_eq!(devices.open_streams(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn camera_snapshot_sent_each_interval() {
        let camera = StillFrameSource::new(RgbaImage::new(64, 48));
        let devices = SyntheticDevices::new().camera(camera);
        let stream = devices.acquire(MediaConstraints { audio: false, video: true }).await.unwrap();
        let (transport, mut rx) = ChannelTransport::new();
        let (events_tx, _events_rx) = mpsc::unbounded_channel();

        let _capture = CaptureHandle::start(stream, Arc::new(transport), config(), events_tx);

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(rx.try_recv().is_err());

        tokio::time::sleep(Duration::from_millis(600)).await;
        let media = media_of(rx.recv().await.unwrap());
        assert_eq!(media.mime_type, "image/jpeg");
        let jpeg = media.bytes().unwrap();
        let decoded = glair_media::image::load_from_memory(&jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (64, 48));
    }

    #[tokio::test(start_paused = true)]
    async fn muted_microphone_sends_nothing() {
        let devices = SyntheticDevices::new();
        let stream = devices.acquire(MediaConstraints { audio: true, video: false }).await.unwrap();
        let (transport, mut rx) = ChannelTransport::new();
        let (events_tx, _events_rx) = mpsc::unbounded_channel();

        let capture = CaptureHandle::start(stream, Arc::new(transport), config(), events_tx);
        capture.set_audio_enabled(false);
        assert!(!capture.audio_enabled());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn stop_is_idempotent_and_releases_once() {
        let devices = SyntheticDevices::new();
        let stream = devices.acquire(MediaConstraints::default()).await.unwrap();
        assert_eq!(devices.open_streams(), 1);
        let (transport, _rx) = ChannelTransport::new();
        let (events_tx, _events_rx) = mpsc::unbounded_channel();

        let mut capture = CaptureHandle::start(stream, Arc::new(transport), config(), events_tx);
        capture.stop();
        capture.stop();
        assert!(capture.is_stopped());
        drop(capture);
        assert_eq!(devices.open_streams(), 0);
    }

    #[tokio::test]
    async fn denied_permission_is_reported() {
        let devices = SyntheticDevices::new().deny_permission("NotAllowedError: Permission denied");
        let result = devices.acquire(MediaConstraints::default()).await;
        assert!(matches!(result, Err(MediaError::PermissionDenied(_))));
        assert_eq!(devices.open_streams(), 0);
    }
}
