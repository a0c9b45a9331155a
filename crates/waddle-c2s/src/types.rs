//! Common types for C2S sessions.

use serde::{Deserialize, Serialize};

/// Connection state in the XMPP stream lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Initial state, waiting for stream header
    Initial,
    /// Stream opened, SASL offered
    Negotiating,
    /// SASL exchange being verified
    Authenticating,
    /// Authenticated, waiting for the stream restart
    Authenticated,
    /// Restarted stream, resource binding offered
    Binding,
    /// Fully established session
    Established,
    /// Connection closed
    Closed,
}

impl ConnectionState {
    /// Whether the stream is still negotiating (not yet established or closed).
    pub fn is_negotiating(&self) -> bool {
        !matches!(self, Self::Established | Self::Closed)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ConnectionState::Initial => "initial",
            ConnectionState::Negotiating => "negotiating",
            ConnectionState::Authenticating => "authenticating",
            ConnectionState::Authenticated => "authenticated",
            ConnectionState::Binding => "binding",
            ConnectionState::Established => "established",
            ConnectionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Transport type for the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransportKind {
    /// Plain TCP
    Tcp,
    /// TCP with direct TLS
    TcpTls,
    /// In-process pipe
    Memory,
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportKind::Tcp => write!(f, "tcp"),
            TransportKind::TcpTls => write!(f, "tcp+tls"),
            TransportKind::Memory => write!(f, "memory"),
        }
    }
}
