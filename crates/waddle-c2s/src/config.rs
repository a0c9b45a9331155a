//! Configuration for C2S streams and the listener.
//!
//! Both structs deserialize with defaults for every missing field, and can
//! be loaded from environment variables.
//!
//! # Environment Variables
//!
//! - `WADDLE_C2S_DOMAIN`: served XMPP domain. Default: `localhost`
//! - `WADDLE_C2S_ADDR`: listen address. Default: `0.0.0.0:5223`
//! - `WADDLE_C2S_TLS_CERT` / `WADDLE_C2S_TLS_KEY`: PEM files enabling direct TLS
//! - `WADDLE_C2S_MAX_STANZA_SIZE`: largest accepted stanza in bytes
//! - `WADDLE_C2S_NEGOTIATION_TIMEOUT_SECS`: time allowed to finish negotiation
//! - `WADDLE_C2S_MAX_AUTH_ATTEMPTS`: SASL attempts before the stream is closed
//! - `WADDLE_C2S_WRITE_TIMEOUT_MS`: how long a single write may stall
//! - `WADDLE_C2S_MAX_PENDING_STANZAS`: outbound stanzas queued before binding
//! - `WADDLE_C2S_PREFETCH_TIMEOUT_MS`: how long to wait for the first bytes

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::C2sError;

/// Per-stream protocol settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Served domain, used as `from` in our stream header
    pub domain: String,
    /// Size of a single transport read
    pub read_buffer_size: usize,
    /// Largest stanza accepted before the stream fails with `policy-violation`
    pub max_stanza_size: usize,
    /// Seconds allowed between stream open and resource binding
    pub negotiation_timeout_secs: u64,
    /// SASL attempts allowed before the stream fails with `policy-violation`
    pub max_auth_attempts: u32,
    /// Milliseconds a single write may take before the peer is considered gone
    pub write_timeout_ms: u64,
    /// Outbound stanzas held back until the session is established
    pub max_pending_stanzas: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            domain: "localhost".to_string(),
            read_buffer_size: 8192,
            max_stanza_size: 256 * 1024,
            negotiation_timeout_secs: 30,
            max_auth_attempts: 3,
            write_timeout_ms: 10_000,
            max_pending_stanzas: 256,
        }
    }
}

impl StreamConfig {
    /// Negotiation timeout as a `Duration`.
    pub fn negotiation_timeout(&self) -> Duration {
        Duration::from_secs(self.negotiation_timeout_secs)
    }

    /// Write timeout as a `Duration`.
    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    /// Load stream settings from environment variables.
    pub fn from_env() -> Result<Self, C2sError> {
        let defaults = Self::default();
        Ok(Self {
            domain: std::env::var("WADDLE_C2S_DOMAIN").unwrap_or(defaults.domain),
            read_buffer_size: defaults.read_buffer_size,
            max_stanza_size: env_parse("WADDLE_C2S_MAX_STANZA_SIZE")?
                .unwrap_or(defaults.max_stanza_size),
            negotiation_timeout_secs: env_parse("WADDLE_C2S_NEGOTIATION_TIMEOUT_SECS")?
                .unwrap_or(defaults.negotiation_timeout_secs),
            max_auth_attempts: env_parse("WADDLE_C2S_MAX_AUTH_ATTEMPTS")?
                .unwrap_or(defaults.max_auth_attempts),
            write_timeout_ms: env_parse("WADDLE_C2S_WRITE_TIMEOUT_MS")?
                .unwrap_or(defaults.write_timeout_ms),
            max_pending_stanzas: env_parse("WADDLE_C2S_MAX_PENDING_STANZAS")?
                .unwrap_or(defaults.max_pending_stanzas),
        })
    }

    /// Check the settings for values the engine cannot work with.
    pub fn validate(&self) -> Result<(), C2sError> {
        if self.domain.trim().is_empty() {
            return Err(C2sError::config("domain must not be empty"));
        }
        if self.read_buffer_size == 0 {
            return Err(C2sError::config("read_buffer_size must be positive"));
        }
        if self.max_stanza_size < 1024 {
            return Err(C2sError::config("max_stanza_size must be at least 1024 bytes"));
        }
        if self.max_auth_attempts == 0 {
            return Err(C2sError::config("max_auth_attempts must be at least 1"));
        }
        if self.negotiation_timeout_secs == 0 {
            return Err(C2sError::config("negotiation_timeout_secs must be positive"));
        }
        if self.write_timeout_ms == 0 {
            return Err(C2sError::config("write_timeout_ms must be positive"));
        }
        Ok(())
    }
}

/// Listener settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind for C2S connections
    pub c2s_addr: SocketAddr,
    /// TLS certificate path (PEM format). Direct TLS is enabled when both
    /// paths are set.
    pub tls_cert_path: Option<PathBuf>,
    /// TLS private key path (PEM format)
    pub tls_key_path: Option<PathBuf>,
    /// Milliseconds to wait for the first bytes of a new connection
    pub prefetch_timeout_ms: u64,
    /// Settings handed to every stream engine
    pub stream: StreamConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            c2s_addr: SocketAddr::from(([0, 0, 0, 0], 5223)),
            tls_cert_path: None,
            tls_key_path: None,
            prefetch_timeout_ms: 500,
            stream: StreamConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Load listener settings from environment variables.
    pub fn from_env() -> Result<Self, C2sError> {
        let defaults = Self::default();
        let config = Self {
            c2s_addr: env_parse("WADDLE_C2S_ADDR")?.unwrap_or(defaults.c2s_addr),
            tls_cert_path: std::env::var_os("WADDLE_C2S_TLS_CERT").map(PathBuf::from),
            tls_key_path: std::env::var_os("WADDLE_C2S_TLS_KEY").map(PathBuf::from),
            prefetch_timeout_ms: env_parse("WADDLE_C2S_PREFETCH_TIMEOUT_MS")?
                .unwrap_or(defaults.prefetch_timeout_ms),
            stream: StreamConfig::from_env()?,
        };

        info!(
            addr = %config.c2s_addr,
            domain = %config.stream.domain,
            tls = config.tls_enabled(),
            "C2S configuration loaded"
        );

        Ok(config)
    }

    /// Whether direct TLS is configured.
    pub fn tls_enabled(&self) -> bool {
        self.tls_cert_path.is_some() && self.tls_key_path.is_some()
    }

    /// Prefetch timeout as a `Duration`.
    pub fn prefetch_timeout(&self) -> Duration {
        Duration::from_millis(self.prefetch_timeout_ms)
    }

    /// Check the settings for values the listener cannot work with.
    pub fn validate(&self) -> Result<(), C2sError> {
        if self.tls_cert_path.is_some() != self.tls_key_path.is_some() {
            return Err(C2sError::config(
                "tls_cert_path and tls_key_path must be set together",
            ));
        }
        self.stream.validate()
    }
}

fn env_parse<T>(name: &str) -> Result<Option<T>, C2sError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| C2sError::config(format!("{}: {}", name, e))),
        Err(_) => Ok(None),
    }
}
