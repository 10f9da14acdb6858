//! Connection seam between the session and the remote inference service.
//!
//! The session only needs two things from a connection: a non-blocking way
//! to send [`ClientMessage`]s and a stream of [`InboundEvent`]s. [`Connector`]
//! opens one; the real SDK-backed connector lives outside this crate.
//!
//! [`LoopbackConnector`] provides an in-memory connection whose far end
//! ([`RemoteEnd`]) is driven by tests or by the CLI's replay mode.
//!
//! ## Channel failure handling
//!
//! * **Outbound full**: realtime media is dropped with a warning, as it is
//!   only useful while fresh. Control messages (setup, tool responses) are
//!   refused with [`MediaError::OutboundFull`] so the caller can retry.
//! * **Outbound closed**: the remote end was dropped; `send` returns
//!   [`MediaError::ConnectionClosed`].
//! * **Inbound closed**: the session treats it as a remote close.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use glair_media::MediaError;

use crate::event::InboundEvent;
use crate::protocol::{ClientMessage, ServerMessage, SetupRequest};

/// Outbound buffer, ~1–2 s of microphone blocks plus snapshots.
const OUTBOUND_CAPACITY: usize = 64;

/// Inbound buffer of decoded server events.
const INBOUND_CAPACITY: usize = 256;

/// Sending half of an open connection.
///
/// `send` must never block: realtime capture calls it from its hot path.
pub trait Transport: Send + Sync {
    /// Queue a message for the remote.
    ///
    /// `Ok` means the message was queued, except for realtime media, which
    /// may be dropped when the buffer is full.
    fn send(&self, message: ClientMessage) -> Result<(), MediaError>;

    /// Close the connection. Idempotent.
    fn close(&self);

    /// Whether `send` can still succeed.
    fn is_open(&self) -> bool;
}

/// An established connection.
pub struct Connection {
    pub transport: Arc<dyn Transport>,
    pub inbound: mpsc::Receiver<InboundEvent>,
}

/// Opens connections to the remote service.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a connection and send `setup`. Resolves once the transport is up;
    /// the service's acknowledgement arrives later as [`InboundEvent::Opened`].
    async fn connect(&self, setup: SetupRequest) -> Result<Connection, MediaError>;
}

// ── Channel transport ──────────────────────────────────────────────

/// Transport backed by a bounded `mpsc` channel.
pub struct ChannelTransport {
    tx: mpsc::Sender<ClientMessage>,
    open: AtomicBool,
}

impl ChannelTransport {
    /// Create a transport and the receiver its messages arrive on.
    #[must_use]
    pub fn new() -> (Self, mpsc::Receiver<ClientMessage>) {
        let (tx, rx) = mpsc::channel(OUTBOUND_CAPACITY);
        let transport = Self {
            tx,
            open: AtomicBool::new(true),
        };
        (transport, rx)
    }
}

impl Transport for ChannelTransport {
    fn send(&self, message: ClientMessage) -> Result<(), MediaError> {
        if !self.is_open() {
            return Err(MediaError::ConnectionClosed("transport closed".into()));
        }
        match self.tx.try_send(message) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(message)) => {
                if matches!(message, ClientMessage::RealtimeInput { .. }) {
                    tracing::warn!(kind = message.kind(), "Outbound buffer full, dropping message");
                    Ok(())
                } else {
                    Err(MediaError::OutboundFull(message.kind()))
                }
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.open.store(false, Ordering::SeqCst);
                Err(MediaError::ConnectionClosed("remote end dropped".into()))
            }
        }
    }

    fn close(&self) {
        if self.open.swap(false, Ordering::SeqCst) {
            tracing::debug!("Channel transport closed");
        }
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst) && !self.tx.is_closed()
    }
}

// ── Loopback connector ─────────────────────────────────────────────

/// The far side of a loopback connection.
pub struct RemoteEnd {
    /// Messages the session sent.
    pub outbound: mpsc::Receiver<ClientMessage>,
    inbound: mpsc::Sender<InboundEvent>,
}

impl RemoteEnd {
    /// Deliver one event to the session.
    pub async fn send_event(&self, event: InboundEvent) -> Result<(), MediaError> {
        self.inbound
            .send(event)
            .await
            .map_err(|_| MediaError::ConnectionClosed("session dropped".into()))
    }

    /// Deliver every event of a server message.
    pub async fn send_message(&self, message: ServerMessage) -> Result<(), MediaError> {
        for event in message.into_events() {
            self.send_event(event).await?;
        }
        Ok(())
    }

    /// Next message from the session, if the connection is still up.
    pub async fn recv(&mut self) -> Option<ClientMessage> {
        self.outbound.recv().await
    }

    /// Close the connection from the remote side.
    pub async fn close(self, reason: &str) {
        let _ = self
            .inbound
            .send(InboundEvent::Closed {
                reason: reason.to_string(),
            })
            .await;
    }
}

/// In-memory [`Connector`]; each successful `connect` hands a [`RemoteEnd`]
/// to the receiver returned by [`LoopbackConnector::new`].
pub struct LoopbackConnector {
    remotes: mpsc::UnboundedSender<RemoteEnd>,
    auto_open: bool,
    handshake_delay: Duration,
    failure: Option<String>,
}

impl LoopbackConnector {
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<RemoteEnd>) {
        let (remotes, rx) = mpsc::unbounded_channel();
        let connector = Self {
            remotes,
            auto_open: true,
            handshake_delay: Duration::ZERO,
            failure: None,
        };
        (connector, rx)
    }

    /// Acknowledge the handshake immediately (default `true`).
    #[must_use]
    pub const fn auto_open(mut self, auto_open: bool) -> Self {
        self.auto_open = auto_open;
        self
    }

    /// Delay before the transport comes up.
    #[must_use]
    pub const fn handshake_delay(mut self, delay: Duration) -> Self {
        self.handshake_delay = delay;
        self
    }

    /// Make every connect attempt fail with `message`.
    #[must_use]
    pub fn failing(mut self, message: impl Into<String>) -> Self {
        self.failure = Some(message.into());
        self
    }
}

#[async_trait]
impl Connector for LoopbackConnector {
    async fn connect(&self, setup: SetupRequest) -> Result<Connection, MediaError> {
        if !self.handshake_delay.is_zero() {
            tokio::time::sleep(self.handshake_delay).await;
        }
        if let Some(ref message) = self.failure {
            return Err(MediaError::ConnectionError(message.clone()));
        }

        let (transport, outbound) = ChannelTransport::new();
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_CAPACITY);

        transport.send(ClientMessage::Setup(setup))?;
        if self.auto_open {
            inbound_tx
                .send(InboundEvent::Opened)
                .await
                .map_err(|_| MediaError::ConnectionError("loopback closed during setup".into()))?;
        }

        self.remotes
            .send(RemoteEnd {
                outbound,
                inbound: inbound_tx,
            })
            .map_err(|_| MediaError::ConnectionError("no loopback listener".into()))?;

        tracing::debug!("Loopback connection established");
        Ok(Connection {
            transport: Arc::new(transport),
            inbound: inbound_rx,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glair_media::MediaBlob;

    fn media() -> ClientMessage {
        ClientMessage::RealtimeInput {
            media: MediaBlob::pcm(&[0.0; 4], 16_000),
        }
    }

    #[test]
    fn full_buffer_drops_instead_of_blocking() {
        let (transport, mut rx) = ChannelTransport::new();
        for _ in 0..OUTBOUND_CAPACITY + 10 {
            transport.send(media()).unwrap();
        }
        let mut received = 0;
        while rx.try_recv().is_ok() {
            received += 1;
        }
        assert_eq!(received, OUTBOUND_CAPACITY);
    }

    #[test]
    fn full_buffer_refuses_control_messages() {
        let (transport, mut rx) = ChannelTransport::new();
        for _ in 0..OUTBOUND_CAPACITY {
            transport.send(media()).unwrap();
        }
        let response = ClientMessage::ToolResponse {
            function_responses: vec![],
        };
        assert!(matches!(
            transport.send(response.clone()),
            Err(MediaError::OutboundFull("toolResponse"))
        ));

        rx.try_recv().unwrap();
        transport.send(response).unwrap();
    }

    #[test]
    fn closed_transport_refuses_sends() {
        let (transport, _rx) = ChannelTransport::new();
        transport.close();
        transport.close();
        assert!(matches!(transport.send(media()), Err(MediaError::ConnectionClosed(_))));

        let (transport, rx) = ChannelTransport::new();
        drop(rx);
        assert!(matches!(transport.send(media()), Err(MediaError::ConnectionClosed(_))));
        assert!(!transport.is_open());
    }

    #[tokio::test]
    async fn loopback_sends_setup_and_opens() {
        let (connector, mut remotes) = LoopbackConnector::new();
        let setup = SetupRequest {
            model: "m".into(),
            response_modalities: vec!["AUDIO".into()],
            voice_name: "Orus".into(),
            output_audio_transcription: true,
            tools: vec![],
        };
        let mut conn = connector.connect(setup.clone()).await.unwrap();
        let mut remote = remotes.recv().await.unwrap();

        assert_eq!(remote.recv().await, Some(ClientMessage::Setup(setup)));
        assert_eq!(conn.inbound.recv().await, Some(InboundEvent::Opened));
    }

    #[tokio::test]
    async fn failing_loopback_reports_connection_error() {
        let (connector, _remotes) = LoopbackConnector::new();
        let connector = connector.failing("service unavailable");
        let setup = SetupRequest {
            model: "m".into(),
            response_modalities: vec![],
            voice_name: "Orus".into(),
            output_audio_transcription: false,
            tools: vec![],
        };
        assert!(matches!(
            connector.connect(setup).await,
            Err(MediaError::ConnectionError(_))
        ));
    }
}
