//! Transport handles a session can be bound to.
//!
//! A transport is a connected byte stream. TLS, when used, is already
//! established by the time the transport reaches a session.

use std::net::SocketAddr;

use tokio::io::{AsyncRead, AsyncWrite, DuplexStream};
use tokio::net::TcpStream;
use tokio_rustls::server::TlsStream;

use crate::types::TransportKind;

/// A connected byte stream carrying one XMPP session.
///
/// The stream engine bound to the transport owns it exclusively and shuts it
/// down through [`tokio::io::AsyncWriteExt::shutdown`].
pub trait Transport: AsyncRead + AsyncWrite + Unpin + Send + 'static {
    /// Whether the transport is currently connected.
    fn is_connected(&self) -> bool;

    /// What kind of transport this is, for logs and metrics.
    fn kind(&self) -> TransportKind;

    /// Remote address, if the transport has one.
    fn peer_addr(&self) -> Option<SocketAddr> {
        None
    }
}

impl Transport for TcpStream {
    fn is_connected(&self) -> bool {
        TcpStream::peer_addr(self).is_ok()
    }

    fn kind(&self) -> TransportKind {
        TransportKind::Tcp
    }

    fn peer_addr(&self) -> Option<SocketAddr> {
        TcpStream::peer_addr(self).ok()
    }
}

impl Transport for TlsStream<TcpStream> {
    fn is_connected(&self) -> bool {
        self.get_ref().0.peer_addr().is_ok()
    }

    fn kind(&self) -> TransportKind {
        TransportKind::TcpTls
    }

    fn peer_addr(&self) -> Option<SocketAddr> {
        self.get_ref().0.peer_addr().ok()
    }
}

/// In-process pipe, used for embedding and tests.
///
/// A duplex half cannot observe its peer, so it reports itself connected for
/// as long as it exists; a dropped peer surfaces as EOF on read.
impl Transport for DuplexStream {
    fn is_connected(&self) -> bool {
        true
    }

    fn kind(&self) -> TransportKind {
        TransportKind::Memory
    }
}
