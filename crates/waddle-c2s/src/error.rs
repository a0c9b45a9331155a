//! Error types for C2S sessions.
//!
//! Two layers live here:
//! - [`C2sError`]: the internal error type returned by fallible operations.
//! - [`SessionError`]: the stable classification surfaced to the owning
//!   server through the session's `Error` notification.

use std::fmt;
use std::io;

use thiserror::Error;

use crate::parser::ns;

/// C2S errors.
#[derive(Debug, Error)]
pub enum C2sError {
    /// IO error (network, file)
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// TLS error
    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    /// XML parsing error
    #[error("XML parse error: {0}")]
    XmlParse(String),

    /// Authentication failed
    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    /// The local side detected a stream-level protocol violation.
    #[error("Stream error <{condition}>: {text}")]
    Protocol {
        /// Condition reported to the peer
        condition: StreamErrorCondition,
        /// Human readable description
        text: String,
    },

    /// The peer closed the stream with a `<stream:error/>`.
    #[error("Peer sent stream error <{0}>")]
    RemoteStreamError(StreamErrorCondition),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl C2sError {
    /// Create a new XML parse error.
    pub fn xml_parse(msg: impl Into<String>) -> Self {
        Self::XmlParse(msg.into())
    }

    /// Create a new authentication error.
    pub fn auth_failed(msg: impl Into<String>) -> Self {
        Self::AuthFailed(msg.into())
    }

    /// Create a new stream-level protocol error.
    pub fn protocol(condition: StreamErrorCondition, text: impl Into<String>) -> Self {
        Self::Protocol {
            condition,
            text: text.into(),
        }
    }

    /// Create a new configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Map this error onto the two-branch session taxonomy.
    pub fn classify(&self) -> SessionError {
        match self {
            Self::Io(e) => SessionError::Transport(TransportErrorKind::from(e)),
            Self::Tls(_) => SessionError::Transport(TransportErrorKind::Tls),
            Self::XmlParse(_) => SessionError::Protocol(StreamErrorCondition::NotWellFormed),
            Self::AuthFailed(_) => SessionError::Protocol(StreamErrorCondition::NotAuthorized),
            Self::Protocol { condition, .. } => SessionError::Protocol(*condition),
            Self::RemoteStreamError(condition) => SessionError::Protocol(*condition),
            Self::Config(_) | Self::Internal(_) => {
                SessionError::Protocol(StreamErrorCondition::InternalServerError)
            }
        }
    }

    /// Whether a `<stream:error/>` should be written to the peer for this error.
    ///
    /// Transport failures leave nothing to write to, and a peer-initiated
    /// stream error must not be echoed back.
    pub fn needs_stream_error(&self) -> bool {
        !matches!(
            self,
            Self::Io(_) | Self::Tls(_) | Self::RemoteStreamError(_)
        )
    }
}

/// Error classification delivered with the session `Error` notification.
///
/// Exactly one branch is meaningful per notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum SessionError {
    /// The underlying byte stream failed.
    #[error("transport error: {0}")]
    Transport(TransportErrorKind),
    /// The XML stream violated protocol expectations.
    #[error("stream error: {0}")]
    Protocol(StreamErrorCondition),
}

impl SessionError {
    /// Short label for the branch, used in metrics and logs.
    pub fn branch(&self) -> &'static str {
        match self {
            Self::Transport(_) => "transport",
            Self::Protocol(_) => "protocol",
        }
    }

    /// The code carried by the active branch.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Transport(kind) => kind.as_str(),
            Self::Protocol(condition) => condition.as_str(),
        }
    }
}

/// Transport failure codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TransportErrorKind {
    /// The peer refused the connection
    ConnectionRefused,
    /// The peer closed or reset the connection
    RemoteHostClosed,
    /// The peer address could not be resolved
    HostNotFound,
    /// An operation on the socket timed out
    Timeout,
    /// Generic network failure (unreachable, not connected, ...)
    Network,
    /// TLS record or handshake failure
    Tls,
    /// Anything else
    #[default]
    Unknown,
}

impl TransportErrorKind {
    /// Stable code for this failure kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ConnectionRefused => "connection-refused",
            Self::RemoteHostClosed => "remote-host-closed",
            Self::HostNotFound => "host-not-found",
            Self::Timeout => "timeout",
            Self::Network => "network",
            Self::Tls => "tls",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&io::Error> for TransportErrorKind {
    fn from(e: &io::Error) -> Self {
        use io::ErrorKind;

        match e.kind() {
            ErrorKind::ConnectionRefused => Self::ConnectionRefused,
            ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe
            | ErrorKind::UnexpectedEof => Self::RemoteHostClosed,
            ErrorKind::TimedOut | ErrorKind::WouldBlock => Self::Timeout,
            ErrorKind::NotConnected | ErrorKind::AddrNotAvailable | ErrorKind::AddrInUse => {
                Self::Network
            }
            // tokio-rustls reports record and handshake failures as InvalidData
            ErrorKind::InvalidData => Self::Tls,
            _ => Self::Unknown,
        }
    }
}

/// XMPP stream error conditions (RFC 6120 Section 4.9.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StreamErrorCondition {
    /// Bad format
    BadFormat,
    /// Bad namespace prefix
    BadNamespacePrefix,
    /// Conflict (resource already connected)
    Conflict,
    /// Connection timeout
    ConnectionTimeout,
    /// Host gone
    HostGone,
    /// Host unknown
    HostUnknown,
    /// Improper addressing
    ImproperAddressing,
    /// Internal server error
    InternalServerError,
    /// Invalid from
    InvalidFrom,
    /// Invalid namespace
    InvalidNamespace,
    /// Invalid XML
    InvalidXml,
    /// Not authorized
    NotAuthorized,
    /// Not well-formed
    NotWellFormed,
    /// Policy violation
    PolicyViolation,
    /// Remote connection failed
    RemoteConnectionFailed,
    /// Reset
    Reset,
    /// Resource constraint
    ResourceConstraint,
    /// Restricted XML
    RestrictedXml,
    /// See other host
    SeeOtherHost,
    /// System shutdown
    SystemShutdown,
    /// Undefined condition
    #[default]
    UndefinedCondition,
    /// Unsupported encoding
    UnsupportedEncoding,
    /// Unsupported feature
    UnsupportedFeature,
    /// Unsupported stanza type
    UnsupportedStanzaType,
    /// Unsupported version
    UnsupportedVersion,
}

impl StreamErrorCondition {
    const ALL: [Self; 25] = [
        Self::BadFormat,
        Self::BadNamespacePrefix,
        Self::Conflict,
        Self::ConnectionTimeout,
        Self::HostGone,
        Self::HostUnknown,
        Self::ImproperAddressing,
        Self::InternalServerError,
        Self::InvalidFrom,
        Self::InvalidNamespace,
        Self::InvalidXml,
        Self::NotAuthorized,
        Self::NotWellFormed,
        Self::PolicyViolation,
        Self::RemoteConnectionFailed,
        Self::Reset,
        Self::ResourceConstraint,
        Self::RestrictedXml,
        Self::SeeOtherHost,
        Self::SystemShutdown,
        Self::UndefinedCondition,
        Self::UnsupportedEncoding,
        Self::UnsupportedFeature,
        Self::UnsupportedStanzaType,
        Self::UnsupportedVersion,
    ];

    /// Get the element name for this condition.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BadFormat => "bad-format",
            Self::BadNamespacePrefix => "bad-namespace-prefix",
            Self::Conflict => "conflict",
            Self::ConnectionTimeout => "connection-timeout",
            Self::HostGone => "host-gone",
            Self::HostUnknown => "host-unknown",
            Self::ImproperAddressing => "improper-addressing",
            Self::InternalServerError => "internal-server-error",
            Self::InvalidFrom => "invalid-from",
            Self::InvalidNamespace => "invalid-namespace",
            Self::InvalidXml => "invalid-xml",
            Self::NotAuthorized => "not-authorized",
            Self::NotWellFormed => "not-well-formed",
            Self::PolicyViolation => "policy-violation",
            Self::RemoteConnectionFailed => "remote-connection-failed",
            Self::Reset => "reset",
            Self::ResourceConstraint => "resource-constraint",
            Self::RestrictedXml => "restricted-xml",
            Self::SeeOtherHost => "see-other-host",
            Self::SystemShutdown => "system-shutdown",
            Self::UndefinedCondition => "undefined-condition",
            Self::UnsupportedEncoding => "unsupported-encoding",
            Self::UnsupportedFeature => "unsupported-feature",
            Self::UnsupportedStanzaType => "unsupported-stanza-type",
            Self::UnsupportedVersion => "unsupported-version",
        }
    }

    /// Look up a condition by its element name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == name)
    }
}

impl fmt::Display for StreamErrorCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Generate a stream error and close tag.
///
/// Stream errors are fatal and must be followed by closing the stream.
pub fn generate_stream_error(condition: StreamErrorCondition, text: Option<&str>) -> String {
    let mut error = format!(
        "<stream:error><{} xmlns='{}'/>",
        condition.as_str(),
        ns::STREAMS_ERRORS
    );

    if let Some(t) = text {
        error.push_str(&format!(
            "<text xmlns='{}' xml:lang='en'>{}</text>",
            ns::STREAMS_ERRORS,
            crate::parser::escape(t)
        ));
    }

    error.push_str("</stream:error></stream:stream>");
    error
}
