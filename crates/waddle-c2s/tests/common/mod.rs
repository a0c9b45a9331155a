//! Test utilities for C2S session testing.
//!
//! Provides a scriptable mock engine, an XMPP client speaking raw XML over
//! any byte stream, and TLS credential generation.

#![allow(dead_code)]

use std::io;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;

use base64::prelude::*;
use rcgen::{generate_simple_self_signed, CertifiedKey};
use rustls::pki_types::{CertificateDer, ServerName};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, DuplexStream, ReadBuf};
use tokio::time::timeout;
use tokio_rustls::rustls::{ClientConfig, RootCertStore};
use tokio_rustls::TlsConnector;
use waddle_c2s::engine::EngineEventSender;
use waddle_c2s::{
    EngineEvent, EngineFactory, Packet, SessionError, StaticAuthenticator, StreamConfig,
    StreamEngine, StreamErrorCondition, Transport, TransportErrorKind, TransportKind,
    XmppEngineFactory,
};

/// Default timeout for test operations.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

pub const TEST_DOMAIN: &str = "localhost";
pub const TEST_USER: &str = "alice";
pub const TEST_PASSWORD: &str = "secret";

/// Install a fmt subscriber once per test binary. `RUST_LOG` controls output.
pub fn init_tracing() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Install the ring crypto provider for rustls.
/// Must be called once before any TLS operations.
pub fn install_crypto_provider() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

// ============================================================================
// Mock engine
// ============================================================================

/// Observation point shared between a test and the mock engine it scripts.
#[derive(Default)]
pub struct Script {
    prefetched: Mutex<Option<Vec<u8>>>,
    events: Mutex<Option<EngineEventSender>>,
    sent: Mutex<Vec<Packet>>,
    disconnects: AtomicUsize,
    closed: AtomicBool,
    socket_error: Mutex<TransportErrorKind>,
    stream_error: Mutex<StreamErrorCondition>,
}

impl Script {
    /// Raise an event the way a stream engine would.
    ///
    /// Error state is updated before the event goes out. Nothing is raised
    /// after `Disconnected`.
    pub fn raise(&self, event: EngineEvent) {
        if self.closed.load(Ordering::SeqCst) {
            return;
        }

        match &event {
            EngineEvent::Error(SessionError::Transport(kind)) => {
                *self.socket_error.lock().unwrap() = *kind;
            }
            EngineEvent::Error(SessionError::Protocol(condition)) => {
                *self.stream_error.lock().unwrap() = *condition;
            }
            EngineEvent::Disconnected => self.closed.store(true, Ordering::SeqCst),
            _ => {}
        }

        self.events
            .lock()
            .unwrap()
            .as_ref()
            .expect("engine was never bound")
            .emit(event);
    }

    /// Bytes handed to the engine at bind time, `None` before binding.
    pub fn prefetched(&self) -> Option<Vec<u8>> {
        self.prefetched.lock().unwrap().clone()
    }

    pub fn is_bound(&self) -> bool {
        self.events.lock().unwrap().is_some()
    }

    /// Packets the session handed to the engine, in order.
    pub fn sent(&self) -> Vec<Packet> {
        self.sent.lock().unwrap().clone()
    }

    pub fn disconnects(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }
}

/// Engine that records calls and raises whatever the test scripts.
pub struct MockEngine {
    script: Arc<Script>,
    _transport: Box<dyn Transport>,
}

impl StreamEngine for MockEngine {
    fn send_packet(&mut self, packet: Packet) {
        self.script.sent.lock().unwrap().push(packet);
    }

    fn disconnect(&mut self) {
        self.script.disconnects.fetch_add(1, Ordering::SeqCst);
        self.script.raise(EngineEvent::Disconnected);
    }

    fn socket_error(&self) -> TransportErrorKind {
        *self.script.socket_error.lock().unwrap()
    }

    fn stream_error(&self) -> StreamErrorCondition {
        *self.script.stream_error.lock().unwrap()
    }
}

/// Factory producing [`MockEngine`]s wired to one [`Script`].
#[derive(Clone, Default)]
pub struct MockFactory {
    pub script: Arc<Script>,
}

impl<T: Transport> EngineFactory<T> for MockFactory {
    type Engine = MockEngine;

    fn bind(
        &self,
        transport: T,
        prefetched: Vec<u8>,
        events: EngineEventSender,
        _logger: waddle_c2s::Logger,
    ) -> MockEngine {
        *self.script.prefetched.lock().unwrap() = Some(prefetched);
        *self.script.events.lock().unwrap() = Some(events);
        MockEngine {
            script: Arc::clone(&self.script),
            _transport: Box::new(transport),
        }
    }
}

/// Transport that reports itself as not connected.
pub struct ClosedTransport(pub DuplexStream);

impl AsyncRead for ClosedTransport {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.0).poll_read(cx, buf)
    }
}

impl AsyncWrite for ClosedTransport {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.0).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.0).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.0).poll_shutdown(cx)
    }
}

impl Transport for ClosedTransport {
    fn is_connected(&self) -> bool {
        false
    }

    fn kind(&self) -> TransportKind {
        TransportKind::Memory
    }
}

// ============================================================================
// Real engine
// ============================================================================

/// Stream settings for the test domain.
pub fn stream_config() -> StreamConfig {
    StreamConfig {
        domain: TEST_DOMAIN.to_string(),
        ..StreamConfig::default()
    }
}

/// Authenticator knowing the single test user.
pub fn authenticator() -> Arc<StaticAuthenticator> {
    Arc::new(StaticAuthenticator::new(TEST_DOMAIN).with_user(TEST_USER, TEST_PASSWORD))
}

/// Engine factory with the test user and the given settings.
pub fn engine_factory(config: StreamConfig) -> XmppEngineFactory<StaticAuthenticator> {
    XmppEngineFactory::new(config, authenticator())
}

/// Parse a stanza written as XML into a [`Packet`].
pub fn packet(xml: &str) -> Packet {
    let element: minidom::Element = xml.parse().expect("invalid test stanza");
    Packet::try_from(element).expect("not a stanza")
}

// ============================================================================
// Raw client
// ============================================================================

/// XMPP client writing and reading raw XML.
pub struct RawClient<S> {
    stream: S,
    buffer: String,
}

impl<S: AsyncRead + AsyncWrite + Unpin> RawClient<S> {
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            buffer: String::new(),
        }
    }

    /// Send raw data.
    pub async fn send(&mut self, data: &str) -> io::Result<()> {
        self.stream.write_all(data.as_bytes()).await?;
        self.stream.flush().await
    }

    /// Read once with timeout. Returns the bytes read; empty on EOF.
    pub async fn read(&mut self, timeout_dur: Duration) -> io::Result<String> {
        let mut buf = [0u8; 4096];
        let n = timeout(timeout_dur, self.stream.read(&mut buf))
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "Timeout"))??;

        let data = String::from_utf8_lossy(&buf[..n]).to_string();
        self.buffer.push_str(&data);
        Ok(data)
    }

    /// Read until pattern found.
    pub async fn read_until(&mut self, pattern: &str, timeout_dur: Duration) -> io::Result<String> {
        let start = std::time::Instant::now();
        while !self.buffer.contains(pattern) {
            let remaining = timeout_dur.saturating_sub(start.elapsed());
            if remaining.is_zero() {
                return Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("Timeout waiting for {:?} in {:?}", pattern, self.buffer),
                ));
            }
            if self.read(remaining).await?.is_empty() {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("Closed while waiting for {:?} in {:?}", pattern, self.buffer),
                ));
            }
        }
        Ok(self.buffer.clone())
    }

    /// Read until the peer closes, returning everything received.
    pub async fn read_to_close(&mut self, timeout_dur: Duration) -> io::Result<String> {
        let start = std::time::Instant::now();
        loop {
            let remaining = timeout_dur.saturating_sub(start.elapsed());
            if remaining.is_zero() {
                return Err(io::Error::new(io::ErrorKind::TimedOut, "Peer never closed"));
            }
            match self.read(remaining).await {
                Ok(data) if data.is_empty() => return Ok(self.buffer.clone()),
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::TimedOut => return Err(e),
                // A reset after the close is still a close
                Err(_) => return Ok(self.buffer.clone()),
            }
        }
    }

    /// Take the buffer.
    pub fn take_buffer(&mut self) -> String {
        std::mem::take(&mut self.buffer)
    }

    pub async fn send_stream_header(&mut self) -> io::Result<()> {
        self.send(&stream_header(TEST_DOMAIN)).await
    }

    /// Run stream negotiation up to a bound resource. Returns the bound JID.
    pub async fn negotiate(&mut self, resource: Option<&str>) -> io::Result<String> {
        self.send_stream_header().await?;
        self.read_until("</stream:features>", DEFAULT_TIMEOUT).await?;
        self.take_buffer();
        self.negotiate_after_header(resource).await
    }

    /// Negotiation from the SASL step on, for streams whose header was
    /// already answered.
    pub async fn negotiate_after_header(&mut self, resource: Option<&str>) -> io::Result<String> {
        self.send(&sasl_plain_auth(TEST_USER, TEST_PASSWORD)).await?;
        self.read_until("<success", DEFAULT_TIMEOUT).await?;
        self.take_buffer();

        self.send_stream_header().await?;
        self.read_until("</stream:features>", DEFAULT_TIMEOUT).await?;
        self.take_buffer();

        self.send(&bind_request(resource)).await?;
        let response = self.read_until("</iq>", DEFAULT_TIMEOUT).await?;
        self.take_buffer();

        extract_bound_jid(&response).ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidData, format!("No JID in {:?}", response))
        })
    }

    pub fn into_inner(self) -> S {
        self.stream
    }
}

/// Client stream header for `domain`.
pub fn stream_header(domain: &str) -> String {
    format!(
        "<?xml version='1.0'?>\
        <stream:stream xmlns='jabber:client' \
        xmlns:stream='http://etherx.jabber.org/streams' \
        to='{}' version='1.0'>",
        domain
    )
}

/// SASL PLAIN `<auth/>` element.
pub fn sasl_plain_auth(user: &str, password: &str) -> String {
    format!(
        "<auth xmlns='urn:ietf:params:xml:ns:xmpp-sasl' mechanism='PLAIN'>{}</auth>",
        encode_sasl_plain(user, password)
    )
}

/// Resource binding request.
pub fn bind_request(resource: Option<&str>) -> String {
    let resource = resource
        .map(|r| format!("<resource>{}</resource>", r))
        .unwrap_or_default();
    format!(
        "<iq type='set' id='bind_1'><bind xmlns='urn:ietf:params:xml:ns:xmpp-bind'>{}</bind></iq>",
        resource
    )
}

/// Helper to encode SASL PLAIN credentials.
pub fn encode_sasl_plain(user: &str, password: &str) -> String {
    let data = format!("\0{}\0{}", user, password);
    BASE64_STANDARD.encode(data.as_bytes())
}

/// Extract a JID from a bind result.
pub fn extract_bound_jid(response: &str) -> Option<String> {
    let start = response.find("<jid>")?;
    let end = response.find("</jid>")?;
    Some(response[start + 5..end].to_string())
}

// ============================================================================
// TLS
// ============================================================================

/// Generated TLS credentials for testing.
pub struct TestTlsCredentials {
    pub cert_pem: String,
    pub key_pem: String,
    pub cert_der: CertificateDer<'static>,
}

impl TestTlsCredentials {
    /// Generate self-signed TLS credentials for testing.
    pub fn generate(domain: &str) -> Self {
        let subject_alt_names = vec![domain.to_string(), "localhost".to_string()];
        let CertifiedKey { cert, key_pair } = generate_simple_self_signed(subject_alt_names)
            .expect("Failed to generate test certificate");

        Self {
            cert_pem: cert.pem(),
            key_pem: key_pair.serialize_pem(),
            cert_der: CertificateDer::from(cert.der().to_vec()),
        }
    }

    /// Write the PEM files into `dir`, returning (cert, key) paths.
    pub fn write_to(&self, dir: &std::path::Path) -> (PathBuf, PathBuf) {
        let cert_path = dir.join("cert.pem");
        let key_path = dir.join("key.pem");
        std::fs::write(&cert_path, &self.cert_pem).expect("Failed to write cert");
        std::fs::write(&key_path, &self.key_pem).expect("Failed to write key");
        (cert_path, key_path)
    }

    /// Create a TLS connector (client-side) that trusts this certificate.
    pub fn tls_connector(&self) -> TlsConnector {
        let mut root_store = RootCertStore::empty();
        root_store.add(self.cert_der.clone()).expect("Failed to add cert");

        let client_config = ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth();

        TlsConnector::from(Arc::new(client_config))
    }
}

/// Server name for a TLS client connection.
pub fn server_name(domain: &str) -> ServerName<'static> {
    ServerName::try_from(domain.to_string()).expect("Invalid server name")
}
