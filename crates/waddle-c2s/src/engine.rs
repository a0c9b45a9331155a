//! Contract between a session and the stream engine driving it.
//!
//! An engine consumes one transport, runs the XMPP stream state machine and
//! reports what happens through an ordered event channel. Sessions only ever
//! talk to engines through [`StreamEngine`] and [`EngineFactory`].

use tokio::sync::mpsc;

use crate::error::{SessionError, StreamErrorCondition, TransportErrorKind};
use crate::logger::Logger;
use crate::packet::Packet;
use crate::transport::Transport;

/// Events raised by a stream engine, in the order they happened.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// A complete inbound stanza was parsed.
    StanzaReceived(Packet),
    /// The stream is closed for good. Raised exactly once, last.
    Disconnected,
    /// Stream negotiation finished; the stream accepts stanzas.
    Connected,
    /// A transport or protocol failure occurred.
    Error(SessionError),
}

impl EngineEvent {
    /// Event name for tracing.
    pub fn name(&self) -> &'static str {
        match self {
            EngineEvent::StanzaReceived(_) => "stanza-received",
            EngineEvent::Disconnected => "disconnected",
            EngineEvent::Connected => "connected",
            EngineEvent::Error(_) => "error",
        }
    }
}

/// Sending half of an engine's event channel.
#[derive(Debug, Clone)]
pub struct EngineEventSender {
    tx: mpsc::UnboundedSender<EngineEvent>,
}

impl EngineEventSender {
    /// Raise an event. Never blocks.
    ///
    /// Returns `false` when the session side is gone.
    pub fn emit(&self, event: EngineEvent) -> bool {
        self.tx.send(event).is_ok()
    }

    /// Whether the receiving session has been dropped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Receiving half of an engine's event channel.
#[derive(Debug)]
pub struct EngineEventReceiver {
    rx: mpsc::UnboundedReceiver<EngineEvent>,
}

impl EngineEventReceiver {
    /// Wait for the next event.
    ///
    /// Returns `None` once every sender is gone and the queue is drained.
    pub async fn recv(&mut self) -> Option<EngineEvent> {
        self.rx.recv().await
    }

    /// Take an already queued event without waiting.
    pub fn try_recv(&mut self) -> Option<EngineEvent> {
        self.rx.try_recv().ok()
    }
}

/// Create the ordered event channel between an engine and its session.
///
/// The channel is unbounded so an engine never stalls on a slow consumer.
pub fn event_channel() -> (EngineEventSender, EngineEventReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EngineEventSender { tx }, EngineEventReceiver { rx })
}

/// Operations a session performs on its engine.
pub trait StreamEngine: Send + 'static {
    /// Serialize and transmit a packet.
    ///
    /// Failures are reported later through an `Error` event.
    fn send_packet(&mut self, packet: Packet);

    /// Begin an orderly shutdown of the stream and transport.
    ///
    /// The engine raises `Disconnected` exactly once afterwards. Calls after
    /// the stream has ended are ignored.
    fn disconnect(&mut self);

    /// Transport error code of the most recent transport-level `Error` event.
    fn socket_error(&self) -> TransportErrorKind;

    /// Stream condition of the most recent protocol-level `Error` event.
    fn stream_error(&self) -> StreamErrorCondition;
}

/// Builds an engine bound to one transport.
pub trait EngineFactory<T: Transport> {
    /// The engine type produced.
    type Engine: StreamEngine;

    /// Bind a new engine to `transport`.
    ///
    /// `prefetched` holds bytes already read from the transport; the engine
    /// must consume them before reading anything else from it. Events are
    /// raised on `events`, diagnostics go to `logger`.
    fn bind(
        &self,
        transport: T,
        prefetched: Vec<u8>,
        events: EngineEventSender,
        logger: Logger,
    ) -> Self::Engine;
}
