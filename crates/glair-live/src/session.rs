//! The realtime session: one connection, local capture and gapless playback.
//!
//! [`RealtimeSession`] is the single owner of the connection, the capture
//! handle and the playback scheduler. Everything the remote sends goes
//! through [`RealtimeSession::dispatch`], so the whole state machine can be
//! driven deterministically without a live connection.
//!
//! ## Captions
//!
//! Transcript fragments describe audio that may still be queued. Each
//! fragment is held until the playback clock reaches the cursor it arrived
//! at, so the caption follows what is audible. Turn completion clears the
//! caption the same way, once the turn's audio has played out. Interruption,
//! remote errors and close clear it immediately.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use glair_media::{LiveSettings, MediaError};

use crate::capture::{CaptureConfig, CaptureHandle, MediaConstraints, MediaDevices};
use crate::event::{AudioChunk, InboundEvent, SessionEvent, SessionState, SourceId};
use crate::playback::{AudioBuffer, AudioOutput, PlaybackScheduler};
use crate::protocol::{ClientMessage, FunctionCall, SetupRequest};
use crate::tools::ToolRegistry;
use crate::transport::{Connector, Transport};

/// Synthesized audio is mono.
const OUTPUT_CHANNELS: u16 = 1;

/// Wait before retrying a tool response refused by a full outbound buffer.
const TOOL_RESPONSE_RETRY: Duration = Duration::from_millis(20);

/// A caption change waiting for its audio.
#[derive(Debug, Clone, PartialEq)]
enum CaptionOp {
    Append(String),
    Clear,
}

/// A realtime voice + camera session with a remote model.
pub struct RealtimeSession<O: AudioOutput> {
    settings: LiveSettings,
    connector: Arc<dyn Connector>,
    devices: Arc<dyn MediaDevices>,
    tools: Arc<ToolRegistry>,

    playback: PlaybackScheduler<O>,
    ended_rx: Option<mpsc::UnboundedReceiver<SourceId>>,

    transport: Option<Arc<dyn Transport>>,
    inbound: Option<mpsc::Receiver<InboundEvent>>,
    capture: Option<CaptureHandle>,
    tool_tasks: Vec<JoinHandle<()>>,

    state: SessionState,
    caption: String,
    pending_captions: VecDeque<(f64, CaptionOp)>,
    audio_enabled: bool,
    video_enabled: bool,

    events: mpsc::UnboundedSender<SessionEvent>,
}

impl<O: AudioOutput> RealtimeSession<O> {
    /// Create an idle session.
    ///
    /// Returns the session and a receiver of [`SessionEvent`]s for the UI.
    pub fn new(
        settings: LiveSettings,
        connector: Arc<dyn Connector>,
        devices: Arc<dyn MediaDevices>,
        output: O,
        tools: ToolRegistry,
    ) -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (events, events_rx) = mpsc::unbounded_channel();
        let (playback, ended_rx) = PlaybackScheduler::new(output);

        let session = Self {
            settings,
            connector,
            devices,
            tools: Arc::new(tools),
            playback,
            ended_rx: Some(ended_rx),
            transport: None,
            inbound: None,
            capture: None,
            tool_tasks: Vec::new(),
            state: SessionState::Idle,
            caption: String::new(),
            pending_captions: VecDeque::new(),
            audio_enabled: true,
            video_enabled: true,
            events,
        };
        (session, events_rx)
    }

    // ── Accessors ──────────────────────────────────────────────────

    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// The caption currently visible.
    #[must_use]
    pub fn caption(&self) -> &str {
        &self.caption
    }

    #[must_use]
    pub const fn playback(&self) -> &PlaybackScheduler<O> {
        &self.playback
    }

    #[must_use]
    pub const fn settings(&self) -> &LiveSettings {
        &self.settings
    }

    #[must_use]
    pub const fn is_capturing(&self) -> bool {
        self.capture.is_some()
    }

    /// The setup message sent on connect.
    #[must_use]
    pub fn setup_request(&self) -> SetupRequest {
        SetupRequest {
            model: self.settings.model.clone(),
            response_modalities: vec!["AUDIO".to_string()],
            voice_name: self.settings.voice_name.clone(),
            output_audio_transcription: true,
            tools: self.tools.declarations(),
        }
    }

    // ── Connection lifecycle ───────────────────────────────────────

    /// Open a connection and wait for the remote to acknowledge it.
    ///
    /// Both the transport open and the handshake share one deadline of
    /// `handshake_timeout_ms`. On failure the session is left in
    /// [`SessionState::Error`] with an [`SessionEvent::Error`] emitted.
    pub async fn connect(&mut self) -> Result<(), MediaError> {
        if matches!(
            self.state,
            SessionState::Connecting | SessionState::Open | SessionState::Capturing
        ) {
            return Err(MediaError::AlreadyActive);
        }

        self.release_connection();
        self.playback.reset();
        self.clear_caption();
        self.set_state(SessionState::Connecting);
        self.status("Connecting…");

        let timeout = self.settings.handshake_timeout();
        let deadline = tokio::time::Instant::now() + timeout;
        let setup = self.setup_request();

        let connection = match tokio::time::timeout_at(deadline, self.connector.connect(setup)).await {
            Ok(Ok(connection)) => connection,
            Ok(Err(e)) => {
                let err = if matches!(e, MediaError::ConnectionError(_)) {
                    e
                } else {
                    MediaError::ConnectionError(e.to_string())
                };
                self.fail(&err);
                return Err(err);
            }
            Err(_) => {
                let err = MediaError::HandshakeTimeout(timeout);
                self.fail(&err);
                return Err(err);
            }
        };

        self.transport = Some(connection.transport);
        let mut inbound = connection.inbound;

        while self.state == SessionState::Connecting {
            match tokio::time::timeout_at(deadline, inbound.recv()).await {
                Ok(Some(event)) => self.dispatch(event),
                Ok(None) => self.dispatch(InboundEvent::Closed {
                    reason: "connection dropped during handshake".into(),
                }),
                Err(_) => {
                    let err = MediaError::HandshakeTimeout(timeout);
                    self.fail(&err);
                    return Err(err);
                }
            }
        }

        match self.state {
            SessionState::Open => {
                self.inbound = Some(inbound);
                Ok(())
            }
            SessionState::Closed => Err(MediaError::ConnectionClosed("closed during handshake".into())),
            _ => Err(MediaError::ConnectionError("handshake failed".into())),
        }
    }

    /// Close the connection and release every device. Idempotent.
    pub fn close(&mut self) {
        if matches!(self.state, SessionState::Idle | SessionState::Closed) {
            self.release_connection();
            return;
        }
        tracing::info!("Closing realtime session");
        self.teardown(SessionState::Closed);
    }

    /// Close, then connect again with fresh playback state.
    pub async fn reset(&mut self) -> Result<(), MediaError> {
        self.close();
        self.connect().await
    }

    // ── Capture ────────────────────────────────────────────────────

    /// Acquire the camera and microphone and start streaming them.
    ///
    /// A refused permission emits [`SessionEvent::AccessDenied`] and leaves
    /// the session `Open`.
    pub async fn start_capture(&mut self) -> Result<(), MediaError> {
        match self.state {
            SessionState::Capturing => return Ok(()),
            SessionState::Open => {}
            _ => return Err(MediaError::NotOpen),
        }
        let Some(transport) = self.transport.clone() else {
            return Err(MediaError::NotOpen);
        };

        let stream = match self.devices.acquire(MediaConstraints::default()).await {
            Ok(stream) => stream,
            Err(e) => {
                tracing::warn!(error = %e, "Device acquisition failed");
                let _ = self.events.send(SessionEvent::from_capture_error(&e));
                return Err(e);
            }
        };

        let handle = CaptureHandle::start(
            stream,
            transport,
            CaptureConfig::from(&self.settings),
            self.events.clone(),
        );
        handle.set_audio_enabled(self.audio_enabled);
        handle.set_video_enabled(self.video_enabled);
        self.capture = Some(handle);

        self.set_state(SessionState::Capturing);
        self.status("Capturing");
        Ok(())
    }

    /// Stop streaming and release the devices. Safe to call at any time.
    pub fn stop_capture(&mut self) {
        if let Some(mut capture) = self.capture.take() {
            capture.stop();
        }
        if self.state == SessionState::Capturing {
            self.set_state(SessionState::Open);
        }
    }

    /// Flip the microphone mute. Returns whether audio is now enabled.
    pub fn toggle_microphone_mute(&mut self) -> bool {
        self.audio_enabled = !self.audio_enabled;
        if let Some(ref capture) = self.capture {
            capture.set_audio_enabled(self.audio_enabled);
        }
        self.emit_mute();
        self.audio_enabled
    }

    /// Flip the camera mute. Returns whether video is now enabled.
    pub fn toggle_video_mute(&mut self) -> bool {
        self.video_enabled = !self.video_enabled;
        if let Some(ref capture) = self.capture {
            capture.set_video_enabled(self.video_enabled);
        }
        self.emit_mute();
        self.video_enabled
    }

    // ── Inbound ────────────────────────────────────────────────────

    /// Apply one inbound event.
    ///
    /// `TurnComplete` clears the caption once the turn's queued audio has
    /// played, not at the moment the message arrives.
    pub fn dispatch(&mut self, event: InboundEvent) {
        match event {
            InboundEvent::Opened => {
                if self.state == SessionState::Connecting {
                    self.set_state(SessionState::Open);
                    self.status("Connected");
                } else {
                    tracing::debug!(state = ?self.state, "Ignoring late handshake acknowledgement");
                }
            }
            InboundEvent::Transcript(text) => {
                if self.state.is_connected() {
                    self.defer_caption(CaptionOp::Append(text));
                }
            }
            InboundEvent::AudioChunk(chunk) => self.play_chunk(&chunk),
            InboundEvent::Interrupted => {
                let stopped = self.playback.interrupt();
                tracing::info!(stopped, "Model interrupted, playback flushed");
                self.clear_caption();
            }
            InboundEvent::TurnComplete => {
                tracing::debug!("Turn complete");
                self.defer_caption(CaptionOp::Clear);
            }
            InboundEvent::ToolCallRequested(calls) => self.answer_tool_calls(calls),
            InboundEvent::ErrorOccurred(message) => {
                self.fail(&MediaError::ConnectionError(message));
            }
            InboundEvent::Closed { reason } => {
                if matches!(self.state, SessionState::Closed | SessionState::Error) {
                    return;
                }
                tracing::info!(%reason, "Remote closed the session");
                self.status(&format!("Connection closed: {reason}"));
                self.teardown(SessionState::Closed);
            }
            InboundEvent::PlaybackEnded(id) => {
                if !self.playback.on_ended(id) {
                    tracing::trace!(id, "Playback end for a source already stopped");
                }
            }
        }
    }

    /// Dispatch every event already waiting, without blocking.
    ///
    /// Returns how many events were applied.
    pub fn process_pending(&mut self) -> usize {
        let mut applied = 0;

        if let Some(mut ended) = self.ended_rx.take() {
            while let Ok(id) = ended.try_recv() {
                self.dispatch(InboundEvent::PlaybackEnded(id));
                applied += 1;
            }
            self.ended_rx = Some(ended);
        }

        if let Some(mut inbound) = self.inbound.take() {
            loop {
                match inbound.try_recv() {
                    Ok(event) => {
                        self.dispatch(event);
                        applied += 1;
                    }
                    Err(mpsc::error::TryRecvError::Empty) => {
                        if !matches!(self.state, SessionState::Closed | SessionState::Error) {
                            self.inbound = Some(inbound);
                        }
                        break;
                    }
                    Err(mpsc::error::TryRecvError::Disconnected) => {
                        self.dispatch(InboundEvent::Closed {
                            reason: "connection dropped".into(),
                        });
                        applied += 1;
                        break;
                    }
                }
            }
        }

        self.flush_due_captions();
        applied
    }

    /// Drive the session until the connection closes or fails.
    ///
    /// Processes inbound events, playback completions and deferred captions.
    pub async fn run(&mut self) -> Result<(), MediaError> {
        let Some(mut inbound) = self.inbound.take() else {
            return Err(MediaError::NotOpen);
        };
        let Some(mut ended) = self.ended_rx.take() else {
            self.inbound = Some(inbound);
            return Err(MediaError::NotOpen);
        };

        while self.state.is_connected() {
            let next_caption = self.next_caption_delay();

            tokio::select! {
                event = inbound.recv() => match event {
                    Some(event) => self.dispatch(event),
                    None => self.dispatch(InboundEvent::Closed {
                        reason: "connection dropped".into(),
                    }),
                },
                Some(id) = ended.recv() => self.dispatch(InboundEvent::PlaybackEnded(id)),
                () = tokio::time::sleep(next_caption.unwrap_or_default()), if next_caption.is_some() => {
                    self.flush_due_captions();
                }
            }
        }

        self.ended_rx = Some(ended);
        tracing::debug!(state = ?self.state, "Session loop finished");
        Ok(())
    }

    /// Apply every deferred caption change whose audio has started.
    pub fn flush_due_captions(&mut self) {
        let now = self.playback.current_time();
        let mut changed = false;

        while let Some((release_at, _)) = self.pending_captions.front() {
            if *release_at > now {
                break;
            }
            if let Some((_, op)) = self.pending_captions.pop_front() {
                changed |= self.apply_caption(op);
            }
        }

        if changed {
            let _ = self.events.send(SessionEvent::CaptionChanged(self.caption.clone()));
        }
    }

    // ── Internals ──────────────────────────────────────────────────

    fn play_chunk(&mut self, chunk: &AudioChunk) {
        if !self.state.is_connected() || self.playback.is_closed() {
            tracing::debug!(state = ?self.state, "Dropping audio chunk outside an open session");
            return;
        }

        let rate = chunk
            .blob
            .sample_rate()
            .unwrap_or(self.settings.output_sample_rate);
        let buffer = match chunk
            .blob
            .bytes()
            .and_then(|bytes| AudioBuffer::from_pcm16(&bytes, rate, OUTPUT_CHANNELS))
        {
            Ok(buffer) => buffer,
            Err(e) => {
                tracing::warn!(error = %e, "Undecodable audio chunk dropped");
                return;
            }
        };

        let level = buffer.level();
        match self.playback.schedule(buffer) {
            Ok(Some(_)) => {
                let _ = self.events.send(SessionEvent::OutputLevel(level));
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, "Audio output refused chunk"),
        }
    }

    fn answer_tool_calls(&mut self, calls: Vec<FunctionCall>) {
        let Some(transport) = self.transport.clone() else {
            tracing::warn!(count = calls.len(), "Tool call without a connection, ignored");
            return;
        };

        let tools = Arc::clone(&self.tools);
        let events = self.events.clone();
        self.tool_tasks.retain(|task| !task.is_finished());
        self.tool_tasks.push(tokio::spawn(async move {
            let responses = tools.respond_all(&calls).await;
            let names: Vec<String> = responses.iter().map(|r| r.name.clone()).collect();
            let message = ClientMessage::ToolResponse {
                function_responses: responses,
            };
            loop {
                match transport.send(message.clone()) {
                    Ok(()) => {
                        let _ = events.send(SessionEvent::ToolResponded(names));
                        break;
                    }
                    Err(MediaError::OutboundFull(_)) => {
                        tracing::debug!("Outbound buffer full, retrying tool response");
                        tokio::time::sleep(TOOL_RESPONSE_RETRY).await;
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Tool response not delivered");
                        break;
                    }
                }
            }
        }));
    }

    /// Queue a caption change for when the audio queued so far starts.
    fn defer_caption(&mut self, op: CaptionOp) {
        let release_at = self.playback.cursor();
        if self.pending_captions.is_empty() && release_at <= self.playback.current_time() {
            if self.apply_caption(op) {
                let _ = self.events.send(SessionEvent::CaptionChanged(self.caption.clone()));
            }
        } else {
            self.pending_captions.push_back((release_at, op));
        }
    }

    fn apply_caption(&mut self, op: CaptionOp) -> bool {
        match op {
            CaptionOp::Append(text) => {
                self.caption.push_str(&text);
                !text.is_empty()
            }
            CaptionOp::Clear => {
                let changed = !self.caption.is_empty();
                self.caption.clear();
                changed
            }
        }
    }

    fn next_caption_delay(&self) -> Option<Duration> {
        let (release_at, _) = self.pending_captions.front()?;
        let wait = (release_at - self.playback.current_time()).max(0.0);
        Some(Duration::from_secs_f64(wait))
    }

    fn clear_caption(&mut self) {
        self.pending_captions.clear();
        if !self.caption.is_empty() {
            self.caption.clear();
            let _ = self.events.send(SessionEvent::CaptionChanged(String::new()));
        }
    }

    fn fail(&mut self, err: &MediaError) {
        tracing::error!(error = %err, "Realtime session failed");
        let _ = self.events.send(SessionEvent::Error(err.to_string()));
        self.teardown(SessionState::Error);
    }

    fn teardown(&mut self, state: SessionState) {
        self.stop_capture();
        self.release_connection();
        self.playback.close();
        self.clear_caption();
        self.set_state(state);
    }

    fn release_connection(&mut self) {
        for task in self.tool_tasks.drain(..) {
            task.abort();
        }
        if let Some(transport) = self.transport.take() {
            transport.close();
        }
        self.inbound = None;
    }

    fn set_state(&mut self, state: SessionState) {
        if self.state != state {
            tracing::info!(from = ?self.state, to = ?state, "Session state changed");
            self.state = state;
            let _ = self.events.send(SessionEvent::StateChanged(state));
        }
    }

    fn status(&self, message: &str) {
        let _ = self.events.send(SessionEvent::Status(message.to_string()));
    }

    fn emit_mute(&self) {
        let _ = self.events.send(SessionEvent::MuteChanged {
            audio_enabled: self.audio_enabled,
            video_enabled: self.video_enabled,
        });
    }
}

impl<O: AudioOutput> Drop for RealtimeSession<O> {
    fn drop(&mut self) {
        if let Some(mut capture) = self.capture.take() {
            capture.stop();
        }
        self.release_connection();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::SyntheticDevices;
    use crate::playback::VirtualOutput;
    use crate::transport::{LoopbackConnector, RemoteEnd};
    use glair_media::MediaBlob;

    fn session() -> (
        RealtimeSession<VirtualOutput>,
        mpsc::UnboundedReceiver<SessionEvent>,
        mpsc::UnboundedReceiver<RemoteEnd>,
    ) {
        let (connector, remotes) = LoopbackConnector::new();
        let (session, events) = RealtimeSession::new(
            LiveSettings::default(),
            Arc::new(connector),
            Arc::new(SyntheticDevices::new()),
            VirtualOutput::new(),
            ToolRegistry::new(),
        );
        (session, events, remotes)
    }

    fn chunk(seconds: f64) -> InboundEvent {
        let samples = vec![0.1; (seconds * 24_000.0) as usize];
        InboundEvent::AudioChunk(AudioChunk::from(MediaBlob::pcm(&samples, 24_000)))
    }

    #[tokio::test(start_paused = true)]
    async fn connect_reaches_open() {
        let (mut session, _events, _remotes) = session();
        session.connect().await.unwrap();
        assert_eq!(session.state(), SessionState::Open);
        assert!(matches!(session.connect().await, Err(MediaError::AlreadyActive)));
    }

    #[tokio::test(start_paused = true)]
    async fn caption_waits_for_its_audio() {
        let (mut session, _events, _remotes) = session();
        session.connect().await.unwrap();

        session.dispatch(chunk(1.0));
        session.dispatch(InboundEvent::Transcript("Hello".into()));
        assert_eq!(session.caption(), "");

        tokio::time::advance(Duration::from_millis(1_001)).await;
        session.flush_due_captions();
        assert_eq!(session.caption(), "Hello");
    }

    #[tokio::test(start_paused = true)]
    async fn turn_complete_clears_after_audio() {
        let (mut session, _events, _remotes) = session();
        session.connect().await.unwrap();

        session.dispatch(InboundEvent::Transcript("Hi".into()));
        assert_eq!(session.caption(), "Hi");
        session.dispatch(chunk(0.5));
        session.dispatch(InboundEvent::TurnComplete);
        assert_eq!(session.caption(), "Hi");

        tokio::time::advance(Duration::from_millis(600)).await;
        session.flush_due_captions();
        assert_eq!(session.caption(), "");
    }

    #[tokio::test(start_paused = true)]
    async fn interruption_flushes_playback_and_caption() {
        let (mut session, _events, _remotes) = session();
        session.connect().await.unwrap();

        session.dispatch(InboundEvent::Transcript("Partial".into()));
        session.dispatch(chunk(0.5));
        session.dispatch(chunk(0.5));
        assert_eq!(session.playback().active_count(), 2);

        session.dispatch(InboundEvent::Interrupted);
        assert_eq!(session.playback().active_count(), 0);
        assert_eq!(session.playback().cursor(), 0.0);
        assert_eq!(session.caption(), "");
    }

    #[tokio::test(start_paused = true)]
    async fn remote_error_enters_error_state() {
        let (mut session, mut events, _remotes) = session();
        session.connect().await.unwrap();
        session.dispatch(InboundEvent::Transcript("stale".into()));

        session.dispatch(InboundEvent::ErrorOccurred("quota exceeded".into()));
        assert_eq!(session.state(), SessionState::Error);
        assert_eq!(session.caption(), "");

        let mut saw_error = false;
        while let Ok(event) = events.try_recv() {
            saw_error |= matches!(event, SessionEvent::Error(ref m) if m.contains("quota exceeded"));
        }
        assert!(saw_error);
    }

    #[tokio::test]
    async fn capture_requires_open_connection() {
        let (mut session, _events, _remotes) = session();
        assert!(matches!(session.start_capture().await, Err(MediaError::NotOpen)));
        session.stop_capture();
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn mute_toggles_are_reported() {
        let (mut session, mut events, _remotes) = session();
        assert!(!session.toggle_microphone_mute());
        assert!(!session.toggle_video_mute());
        assert!(session.toggle_microphone_mute());

        let mut last = None;
        while let Ok(event) = events.try_recv() {
            last = Some(event);
        }
        assert_eq!(
            last,
            Some(SessionEvent::MuteChanged {
                audio_enabled: true,
                video_enabled: false
            })
        );
    }
}
