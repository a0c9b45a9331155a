//! # waddle-c2s
//!
//! XMPP client-to-server sessions for Waddle Social.
//!
//! Each accepted client connection becomes a [`Session`]: a connected
//! transport bound to one stream engine, whose events the session relays to
//! the owning server unchanged.
//!
//! ## Architecture
//!
//! - **Transport**: connected byte stream (TCP, direct TLS, in-memory pipe)
//! - **Stream Engine**: task owning the transport, running RFC 6120
//!   negotiation and stanza framing, reporting through an ordered event channel
//! - **Session**: binds transport and engine, exposes send / disconnect /
//!   error queries, and republishes engine events
//! - **Server**: TCP listener handing every connection to a [`ConnectionHandler`]
//!
//! ## Errors
//!
//! Failures reach the server as exactly one [`SessionEvent::Error`] followed
//! by exactly one [`SessionEvent::Disconnected`]. The error is either
//! transport-level ([`TransportErrorKind`]) or protocol-level
//! ([`StreamErrorCondition`]).

pub mod config;
pub mod engine;
pub mod logger;
pub mod metrics;
pub mod packet;
pub mod parser;
pub mod server;
pub mod session;
pub mod stream;
pub mod transport;

mod error;
mod types;

pub use config::{ServerConfig, StreamConfig};
pub use engine::{EngineEvent, EngineFactory, StreamEngine};
pub use error::{
    generate_stream_error, C2sError, SessionError, StreamErrorCondition, TransportErrorKind,
};
pub use logger::Logger;
pub use packet::Packet;
pub use parser::{ns, StreamHeader};
pub use server::{start, C2sServer, ConnectionHandler};
pub use session::{Session, SessionEvent, SessionObserver};
pub use stream::{Authenticator, StaticAuthenticator, XmppEngineFactory, XmppStreamEngine};
pub use transport::Transport;
pub use types::*;
