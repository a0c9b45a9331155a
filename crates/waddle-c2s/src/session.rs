//! Session adapter for one accepted client connection.
//!
//! A [`Session`] binds a connected transport, plus any bytes already read
//! from it, to exactly one stream engine and republishes the engine's events
//! unchanged. The owning server talks to the connection only through the
//! session: send stanzas, disconnect, and query the last error.

use std::net::SocketAddr;

use tracing::{debug, trace};
use uuid::Uuid;

use crate::engine::{event_channel, EngineEvent, EngineEventReceiver, EngineFactory, StreamEngine};
use crate::error::{SessionError, StreamErrorCondition, TransportErrorKind};
use crate::logger::Logger;
use crate::metrics;
use crate::packet::Packet;
use crate::transport::Transport;
use crate::types::TransportKind;

/// Notifications published by a session.
///
/// Each variant is the engine event of the same name, relayed as is.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// A complete inbound stanza is available.
    StanzaReceived(Packet),
    /// The session is closed for good.
    Disconnected,
    /// Negotiation completed; the session is usable for sending.
    Connected,
    /// A transport or protocol error occurred.
    Error(SessionError),
}

impl From<EngineEvent> for SessionEvent {
    fn from(event: EngineEvent) -> Self {
        match event {
            EngineEvent::StanzaReceived(packet) => SessionEvent::StanzaReceived(packet),
            EngineEvent::Disconnected => SessionEvent::Disconnected,
            EngineEvent::Connected => SessionEvent::Connected,
            EngineEvent::Error(error) => SessionEvent::Error(error),
        }
    }
}

/// Callbacks for [`Session::run`]. All default to doing nothing.
///
/// Callbacks get the session back so they can answer stanzas or disconnect.
pub trait SessionObserver<E: StreamEngine> {
    fn stanza_received(&mut self, _session: &mut Session<E>, _packet: Packet) {}

    fn connected(&mut self, _session: &mut Session<E>) {}

    fn disconnected(&mut self, _session: &mut Session<E>) {}

    fn error(&mut self, _session: &mut Session<E>, _error: SessionError) {}
}

/// One client connection, as seen by the server.
pub struct Session<E: StreamEngine> {
    id: Uuid,
    engine: E,
    events: EngineEventReceiver,
    logger: Logger,
    peer_addr: Option<SocketAddr>,
    transport_kind: TransportKind,
}

impl<E: StreamEngine> Session<E> {
    /// Bind `transport` to a new engine built by `factory`.
    ///
    /// `prefetched` are bytes already read from the transport; the engine
    /// consumes them before anything else. Without a `logger` the session
    /// uses [`Logger::global`]. Nothing is written to the transport here.
    ///
    /// # Panics
    ///
    /// Panics if the transport is not connected.
    pub fn create<T, F>(
        factory: &F,
        transport: T,
        prefetched: impl Into<Vec<u8>>,
        logger: Option<Logger>,
    ) -> Self
    where
        T: Transport,
        F: EngineFactory<T, Engine = E>,
    {
        assert!(
            transport.is_connected(),
            "session transport must be connected before it is handed over"
        );

        let id = Uuid::new_v4();
        let logger = logger.unwrap_or_else(Logger::global);
        let peer_addr = transport.peer_addr();
        let transport_kind = transport.kind();
        let prefetched = prefetched.into();

        logger.in_scope(|| {
            debug!(
                session_id = %id,
                peer = ?peer_addr,
                transport = %transport_kind,
                prefetched = prefetched.len(),
                "Creating session"
            )
        });

        let (events_tx, events) = event_channel();
        let engine = factory.bind(transport, prefetched, events_tx, logger.clone());
        metrics::record_session_created(transport_kind);

        Self {
            id,
            engine,
            events,
            logger,
            peer_addr,
            transport_kind,
        }
    }

    /// Hand a stanza to the engine for transmission.
    ///
    /// Failures surface later as an [`SessionEvent::Error`].
    pub fn send_packet(&mut self, packet: Packet) {
        self.logger.in_scope(|| {
            trace!(session_id = %self.id, stanza_type = packet.name(), "Sending stanza")
        });
        self.engine.send_packet(packet);
    }

    /// Request an orderly shutdown of the stream and transport.
    ///
    /// [`SessionEvent::Disconnected`] follows exactly once.
    pub fn disconnect(&mut self) {
        self.logger
            .in_scope(|| debug!(session_id = %self.id, "Disconnect requested"));
        self.engine.disconnect();
    }

    /// Transport error code of the last transport-level error.
    ///
    /// Only meaningful after an `Error(SessionError::Transport(_))` event.
    pub fn socket_error(&self) -> TransportErrorKind {
        self.engine.socket_error()
    }

    /// Stream condition of the last protocol-level error.
    ///
    /// Only meaningful after an `Error(SessionError::Protocol(_))` event.
    pub fn stream_error(&self) -> StreamErrorCondition {
        self.engine.stream_error()
    }

    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    /// Replace the session's logger. The engine keeps the one it was bound with.
    pub fn set_logger(&mut self, logger: Logger) {
        self.logger = logger;
    }

    /// Wait for the next notification.
    ///
    /// Events come out in the order the engine raised them. Returns `None`
    /// once the engine is gone and every event has been delivered.
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        let event = self.events.recv().await?;
        self.logger.in_scope(|| {
            trace!(session_id = %self.id, event = event.name(), "Relaying engine event")
        });
        Some(event.into())
    }

    /// Deliver notifications to `observer` until the session disconnects.
    pub async fn run<O>(&mut self, observer: &mut O)
    where
        O: SessionObserver<E> + ?Sized,
    {
        while let Some(event) = self.next_event().await {
            match event {
                SessionEvent::StanzaReceived(packet) => observer.stanza_received(self, packet),
                SessionEvent::Connected => observer.connected(self),
                SessionEvent::Error(error) => observer.error(self, error),
                SessionEvent::Disconnected => {
                    observer.disconnected(self);
                    break;
                }
            }
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }

    pub fn transport_kind(&self) -> TransportKind {
        self.transport_kind
    }

    /// The bound engine.
    pub fn engine(&self) -> &E {
        &self.engine
    }
}

impl<E: StreamEngine> Drop for Session<E> {
    fn drop(&mut self) {
        metrics::record_session_dropped(self.transport_kind);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_events_map_one_to_one() {
        let error = SessionError::Protocol(StreamErrorCondition::NotWellFormed);

        assert!(matches!(
            SessionEvent::from(EngineEvent::Connected),
            SessionEvent::Connected
        ));
        assert!(matches!(
            SessionEvent::from(EngineEvent::Disconnected),
            SessionEvent::Disconnected
        ));
        assert!(matches!(
            SessionEvent::from(EngineEvent::Error(error)),
            SessionEvent::Error(e) if e == error
        ));
    }
}
