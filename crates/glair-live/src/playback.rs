//! Gapless playback scheduling for streamed synthesized audio.
//!
//! Chunks arrive one at a time from the remote service. Each one is placed
//! on a single playback cursor so consecutive chunks play back-to-back:
//!
//! ```text
//!   start_i = max(cursor, now)      cursor ← start_i + duration_i
//! ```
//!
//! Every scheduled source is tracked in an active set until it either ends
//! naturally (its completion callback reports the id back) or is stopped by
//! an interruption. Either path removes it exactly once.

use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use glair_media::codec::{decode_pcm16, rms_level};
use glair_media::MediaError;

use crate::event::SourceId;

/// Callback invoked when a source finishes playing naturally.
pub type PlaybackDoneCallback = Box<dyn FnOnce() + Send + 'static>;

// ── Audio buffer ───────────────────────────────────────────────────

/// Decoded, playable audio.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    /// One sample vector per channel.
    pub channels: Vec<Vec<f32>>,
    pub sample_rate: u32,
}

impl AudioBuffer {
    #[must_use]
    pub fn mono(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            channels: vec![samples],
            sample_rate,
        }
    }

    /// Decode interleaved PCM16 LE bytes.
    pub fn from_pcm16(bytes: &[u8], sample_rate: u32, channels: u16) -> Result<Self, MediaError> {
        if sample_rate == 0 {
            return Err(MediaError::Decode("sample rate must be > 0".into()));
        }
        Ok(Self {
            channels: decode_pcm16(bytes, channels)?,
            sample_rate,
        })
    }

    /// Number of sample frames.
    #[must_use]
    pub fn frames(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    /// Playback length in seconds.
    #[must_use]
    pub fn duration(&self) -> f64 {
        self.frames() as f64 / f64::from(self.sample_rate)
    }

    /// RMS level of the first channel.
    #[must_use]
    pub fn level(&self) -> f32 {
        self.channels.first().map_or(0.0, |c| rms_level(c))
    }
}

// ── Output abstraction ─────────────────────────────────────────────

/// An audio output with its own playback clock.
///
/// Times are seconds on the output's clock. `start` must not block; the
/// output plays the buffer at `at` (immediately if `at` is in the past) and
/// calls `on_ended` once it finishes. A source halted by `stop` must not
/// call `on_ended`.
pub trait AudioOutput: Send {
    /// Current position of the playback clock, in seconds.
    fn current_time(&self) -> f64;

    /// Schedule `buffer` to start at `at`.
    fn start(
        &mut self,
        id: SourceId,
        buffer: AudioBuffer,
        at: f64,
        on_ended: PlaybackDoneCallback,
    ) -> Result<(), MediaError>;

    /// Stop a scheduled or playing source. Unknown ids are ignored.
    fn stop(&mut self, id: SourceId);
}

// ── Scheduler ──────────────────────────────────────────────────────

/// Where a chunk landed on the playback timeline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledChunk {
    pub id: SourceId,
    pub start_at: f64,
    pub duration: f64,
}

/// Owns the playback cursor and the set of active sources.
///
/// Not shared: the session owning it is the only writer, so no locking is
/// involved.
pub struct PlaybackScheduler<O: AudioOutput> {
    output: O,
    next_start_time: f64,
    active: BTreeSet<SourceId>,
    next_id: SourceId,
    ended_tx: mpsc::UnboundedSender<SourceId>,
    closed: bool,
}

impl<O: AudioOutput> PlaybackScheduler<O> {
    /// Create a scheduler over `output`.
    ///
    /// Returns the scheduler and a receiver of ids of sources that ended
    /// naturally; feed them back through [`on_ended`](Self::on_ended).
    pub fn new(output: O) -> (Self, mpsc::UnboundedReceiver<SourceId>) {
        let (ended_tx, ended_rx) = mpsc::unbounded_channel();
        let scheduler = Self {
            output,
            next_start_time: 0.0,
            active: BTreeSet::new(),
            next_id: 1,
            ended_tx,
            closed: false,
        };
        (scheduler, ended_rx)
    }

    /// Schedule a buffer right after everything already queued.
    ///
    /// Returns `Ok(None)` once the scheduler is closed.
    pub fn schedule(&mut self, buffer: AudioBuffer) -> Result<Option<ScheduledChunk>, MediaError> {
        if self.closed {
            tracing::debug!("Playback closed, dropping audio chunk");
            return Ok(None);
        }

        let start_at = self.next_start_time.max(self.output.current_time());
        let duration = buffer.duration();
        let id = self.next_id;
        self.next_id += 1;

        let ended_tx = self.ended_tx.clone();
        self.output.start(
            id,
            buffer,
            start_at,
            Box::new(move || {
                // Receiver gone means the session is being torn down.
                let _ = ended_tx.send(id);
            }),
        )?;

        self.next_start_time = start_at + duration;
        self.active.insert(id);

        tracing::debug!(id, start_at, duration, active = self.active.len(), "Scheduled audio chunk");
        Ok(Some(ScheduledChunk {
            id,
            start_at,
            duration,
        }))
    }

    /// Record that a source ended naturally.
    ///
    /// Returns `false` if the source was already removed (e.g. by an
    /// interruption that raced its completion).
    pub fn on_ended(&mut self, id: SourceId) -> bool {
        self.active.remove(&id)
    }

    /// Stop every active source, clear the set and reset the cursor to zero.
    ///
    /// Returns how many sources were stopped.
    pub fn interrupt(&mut self) -> usize {
        let stopped = std::mem::take(&mut self.active);
        for id in &stopped {
            self.output.stop(*id);
        }
        self.next_start_time = 0.0;
        if !stopped.is_empty() {
            tracing::debug!(stopped = stopped.len(), "Playback interrupted");
        }
        stopped.len()
    }

    /// Prepare for a new connection: cursor moves to the output clock and
    /// scheduling is allowed again.
    pub fn reset(&mut self) {
        self.interrupt();
        self.next_start_time = self.output.current_time();
        self.closed = false;
    }

    /// Stop everything and refuse further chunks until [`reset`](Self::reset).
    pub fn close(&mut self) {
        self.interrupt();
        self.closed = true;
    }

    /// Earliest time the next chunk may start.
    #[must_use]
    pub const fn cursor(&self) -> f64 {
        self.next_start_time
    }

    /// Seconds of queued audio ahead of the playback clock.
    #[must_use]
    pub fn queued_ahead(&self) -> f64 {
        (self.next_start_time - self.output.current_time()).max(0.0)
    }

    #[must_use]
    pub fn current_time(&self) -> f64 {
        self.output.current_time()
    }

    #[must_use]
    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    #[must_use]
    pub fn is_active(&self, id: SourceId) -> bool {
        self.active.contains(&id)
    }

    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.closed
    }

    #[must_use]
    pub const fn output(&self) -> &O {
        &self.output
    }
}

// ── Virtual output ─────────────────────────────────────────────────

/// A playback timeline driven by the tokio clock.
///
/// Models a device that renders each buffer at its scheduled time without
/// producing sound; completion fires when the buffer's end time is reached.
/// Used headless and in tests (with a paused tokio clock). Must be used from
/// within a tokio runtime.
pub struct VirtualOutput {
    origin: Instant,
    sources: HashMap<SourceId, JoinHandle<()>>,
}

impl Default for VirtualOutput {
    fn default() -> Self {
        Self::new()
    }
}

impl VirtualOutput {
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            sources: HashMap::new(),
        }
    }

    /// Sources that are scheduled or playing.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.sources.values().filter(|h| !h.is_finished()).count()
    }
}

impl AudioOutput for VirtualOutput {
    fn current_time(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }

    fn start(
        &mut self,
        id: SourceId,
        buffer: AudioBuffer,
        at: f64,
        on_ended: PlaybackDoneCallback,
    ) -> Result<(), MediaError> {
        self.sources.retain(|_, handle| !handle.is_finished());

        let end = (at + buffer.duration()).max(0.0);
        let deadline = self.origin + Duration::from_secs_f64(end);
        let handle = tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            on_ended();
        });
        self.sources.insert(id, handle);
        Ok(())
    }

    fn stop(&mut self, id: SourceId) {
        if let Some(handle) = self.sources.remove(&id) {
            handle.abort();
        }
    }
}

impl Drop for VirtualOutput {
    fn drop(&mut self) {
        for (_, handle) in self.sources.drain() {
            handle.abort();
        }
    }
}
