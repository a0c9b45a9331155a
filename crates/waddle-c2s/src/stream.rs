//! XML stream engine for client connections.
//!
//! [`XmppStreamEngine`] is a handle to a task that owns the transport and
//! runs RFC 6120 stream negotiation (stream header, SASL PLAIN, resource
//! binding) followed by stanza exchange. Everything the task observes is
//! reported through the engine event channel.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use base64::prelude::*;
use jid::{BareJid, FullJid};
use minidom::Element;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, info_span, instrument, warn, Instrument, Span};

use crate::config::StreamConfig;
use crate::engine::{EngineEvent, EngineEventSender, EngineFactory, StreamEngine};
use crate::error::{
    generate_stream_error, C2sError, SessionError, StreamErrorCondition, TransportErrorKind,
};
use crate::logger::Logger;
use crate::metrics;
use crate::packet::Packet;
use crate::parser::{escape, ns, ParsedStanza, StreamHeader, XmlParser};
use crate::transport::Transport;
use crate::types::ConnectionState;

/// Verifies SASL PLAIN credentials.
pub trait Authenticator: Send + Sync + 'static {
    /// Check `password` for the authentication identity `authcid`.
    ///
    /// `authcid` is what the client sent: either a local part or a bare JID.
    /// Returns the bare JID the stream is authenticated as.
    fn authenticate(
        &self,
        authcid: &str,
        password: &str,
    ) -> impl Future<Output = Result<BareJid, C2sError>> + Send;
}

/// In-memory credential store for a single domain.
#[derive(Debug, Clone, Default)]
pub struct StaticAuthenticator {
    domain: String,
    users: HashMap<String, String>,
}

impl StaticAuthenticator {
    /// Create an empty store for `domain`.
    pub fn new(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            users: HashMap::new(),
        }
    }

    /// Add a user.
    pub fn with_user(mut self, localpart: impl Into<String>, password: impl Into<String>) -> Self {
        self.users.insert(localpart.into(), password.into());
        self
    }

    fn check(&self, authcid: &str, password: &str) -> Result<BareJid, C2sError> {
        let localpart = match authcid.split_once('@') {
            Some((local, domain)) if domain.eq_ignore_ascii_case(&self.domain) => local,
            Some(_) => return Err(C2sError::auth_failed("Unknown domain")),
            None => authcid,
        };

        match self.users.get(localpart) {
            Some(expected) if expected == password => format!("{}@{}", localpart, self.domain)
                .parse::<BareJid>()
                .map_err(|e| C2sError::auth_failed(format!("Invalid JID: {}", e))),
            _ => Err(C2sError::auth_failed("Invalid credentials")),
        }
    }
}

impl Authenticator for StaticAuthenticator {
    fn authenticate(
        &self,
        authcid: &str,
        password: &str,
    ) -> impl Future<Output = Result<BareJid, C2sError>> + Send {
        let result = self.check(authcid, password);
        async move { result }
    }
}

/// Builds [`XmppStreamEngine`]s for any transport.
pub struct XmppEngineFactory<A> {
    config: StreamConfig,
    authenticator: Arc<A>,
}

impl<A> Clone for XmppEngineFactory<A> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            authenticator: Arc::clone(&self.authenticator),
        }
    }
}

impl<A: Authenticator> XmppEngineFactory<A> {
    /// Create a factory sharing one authenticator between all engines.
    pub fn new(config: StreamConfig, authenticator: Arc<A>) -> Self {
        Self {
            config,
            authenticator,
        }
    }

    /// The stream settings handed to every engine.
    pub fn config(&self) -> &StreamConfig {
        &self.config
    }
}

impl<T: Transport, A: Authenticator> EngineFactory<T> for XmppEngineFactory<A> {
    type Engine = XmppStreamEngine;

    fn bind(
        &self,
        transport: T,
        prefetched: Vec<u8>,
        events: EngineEventSender,
        logger: Logger,
    ) -> XmppStreamEngine {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Mutex::new(SharedState::default()));

        // Bytes read before the hand-off start the stream; they go first.
        let mut parser = XmlParser::new(self.config.max_stanza_size);
        parser.feed(&prefetched);

        let span = logger.in_scope(|| {
            info_span!(
                "xmpp.c2s.stream",
                peer = ?transport.peer_addr(),
                transport = %transport.kind(),
                prefetched = prefetched.len(),
                jid = tracing::field::Empty,
            )
        });

        let task = StreamTask {
            transport,
            parser,
            config: self.config.clone(),
            authenticator: Arc::clone(&self.authenticator),
            events,
            commands: commands_rx,
            shared: Arc::clone(&shared),
            span: span.clone(),
            state: ConnectionState::Initial,
            stream_id: String::new(),
            header_sent: false,
            auth_failures: 0,
            authenticated: None,
            pending: VecDeque::new(),
            deadline: Instant::now() + self.config.negotiation_timeout(),
            stalled: false,
        };

        let handle = tokio::spawn(logger.attach(task.run().instrument(span)));

        XmppStreamEngine {
            commands: commands_tx,
            shared,
            task: handle,
        }
    }
}

/// State readable from the engine handle while the task runs.
#[derive(Debug)]
struct SharedState {
    socket_error: TransportErrorKind,
    stream_error: StreamErrorCondition,
    state: ConnectionState,
    stream_id: String,
    jid: Option<FullJid>,
}

impl Default for SharedState {
    fn default() -> Self {
        Self {
            socket_error: TransportErrorKind::default(),
            stream_error: StreamErrorCondition::default(),
            state: ConnectionState::Initial,
            stream_id: String::new(),
            jid: None,
        }
    }
}

fn lock(shared: &Mutex<SharedState>) -> MutexGuard<'_, SharedState> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

enum EngineCommand {
    Send(Packet),
    Disconnect,
}

/// Handle to a running client stream.
///
/// Dropping the handle aborts the stream task, which releases the
/// transport without writing anything to it.
#[derive(Debug)]
pub struct XmppStreamEngine {
    commands: mpsc::UnboundedSender<EngineCommand>,
    shared: Arc<Mutex<SharedState>>,
    task: JoinHandle<()>,
}

impl XmppStreamEngine {
    /// Full JID bound to the stream, once resource binding succeeded.
    pub fn jid(&self) -> Option<FullJid> {
        lock(&self.shared).jid.clone()
    }

    /// Current negotiation state.
    pub fn state(&self) -> ConnectionState {
        lock(&self.shared).state
    }

    /// ID of the current stream (changes on every stream restart).
    pub fn stream_id(&self) -> String {
        lock(&self.shared).stream_id.clone()
    }

    /// Whether the stream task has ended.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl StreamEngine for XmppStreamEngine {
    fn send_packet(&mut self, packet: Packet) {
        if self.commands.send(EngineCommand::Send(packet)).is_err() {
            debug!("Stream already closed, dropping outbound stanza");
        }
    }

    fn disconnect(&mut self) {
        if self.commands.send(EngineCommand::Disconnect).is_err() {
            debug!("Stream already closed, ignoring disconnect");
        }
    }

    fn socket_error(&self) -> TransportErrorKind {
        lock(&self.shared).socket_error
    }

    fn stream_error(&self) -> StreamErrorCondition {
        lock(&self.shared).stream_error
    }
}

impl Drop for XmppStreamEngine {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// The task side of an engine. Owns the transport.
struct StreamTask<T, A> {
    transport: T,
    parser: XmlParser,
    config: StreamConfig,
    authenticator: Arc<A>,
    events: EngineEventSender,
    commands: mpsc::UnboundedReceiver<EngineCommand>,
    shared: Arc<Mutex<SharedState>>,
    span: Span,
    state: ConnectionState,
    stream_id: String,
    header_sent: bool,
    auth_failures: u32,
    authenticated: Option<BareJid>,
    /// Outbound stanzas submitted before the session was established
    pending: VecDeque<Packet>,
    /// Negotiation must finish before this instant
    deadline: Instant,
    /// Set once a write timed out; the transport is not touched again
    stalled: bool,
}

impl<T: Transport, A: Authenticator> StreamTask<T, A> {
    async fn run(mut self) {
        debug!("Stream engine started");

        if let Err(e) = self.drive().await {
            self.fail(e).await;
        }

        self.set_state(ConnectionState::Closed);
        if !self.stalled {
            match tokio::time::timeout(self.config.write_timeout(), self.transport.shutdown()).await
            {
                Ok(Ok(())) => {}
                Ok(Err(e)) => debug!(error = %e, "Transport shutdown failed"),
                Err(_) => debug!("Transport shutdown timed out"),
            }
        }

        self.events.emit(EngineEvent::Disconnected);
        info!("Stream closed");
    }

    /// Main loop: inbound bytes, outbound commands and the negotiation deadline.
    async fn drive(&mut self) -> Result<(), C2sError> {
        self.process_buffered().await?;

        let deadline = self.deadline;
        let mut buf = vec![0u8; self.config.read_buffer_size];

        while self.state != ConnectionState::Closed {
            let negotiating = self.state.is_negotiating();

            tokio::select! {
                read = self.transport.read(&mut buf) => {
                    let n = read?;
                    if n == 0 {
                        return Err(C2sError::Io(io::Error::new(
                            io::ErrorKind::UnexpectedEof,
                            "Peer closed the connection without closing the stream",
                        )));
                    }
                    self.parser.feed(&buf[..n]);
                    self.process_buffered().await?;
                }
                command = self.commands.recv() => match command {
                    Some(EngineCommand::Send(packet)) => self.send(packet).await?,
                    Some(EngineCommand::Disconnect) | None => {
                        debug!("Disconnect requested");
                        self.close_stream().await?;
                    }
                },
                _ = tokio::time::sleep_until(deadline), if negotiating => {
                    return Err(C2sError::protocol(
                        StreamErrorCondition::ConnectionTimeout,
                        "Stream negotiation timed out",
                    ));
                }
            }
        }

        Ok(())
    }

    /// Handle every complete item currently buffered.
    async fn process_buffered(&mut self) -> Result<(), C2sError> {
        while self.state != ConnectionState::Closed {
            match self.parser.next_stanza()? {
                Some(item) => self.handle_item(item).await?,
                None => break,
            }
        }
        Ok(())
    }

    async fn handle_item(&mut self, item: ParsedStanza) -> Result<(), C2sError> {
        match item {
            ParsedStanza::StreamStart(header) => self.handle_stream_start(header).await,
            ParsedStanza::StreamEnd => {
                debug!("Peer closed the stream");
                self.close_stream().await
            }
            ParsedStanza::StreamError(condition) => Err(C2sError::RemoteStreamError(condition)),
            ParsedStanza::SaslAuth { mechanism, data } => {
                self.handle_sasl_auth(&mechanism, &data).await
            }
            ParsedStanza::Iq(element) if self.state == ConnectionState::Binding => {
                self.handle_bind(element).await
            }
            ParsedStanza::Message(element)
            | ParsedStanza::Presence(element)
            | ParsedStanza::Iq(element) => self.handle_stanza(element).await,
            ParsedStanza::Unknown(element) => Err(C2sError::protocol(
                StreamErrorCondition::UnsupportedStanzaType,
                format!("Unsupported element <{}/>", element.name()),
            )),
        }
    }

    #[instrument(skip(self, header), name = "xmpp.stream.open", fields(to = ?header.to))]
    async fn handle_stream_start(&mut self, header: StreamHeader) -> Result<(), C2sError> {
        // Our header goes out first so that any stream error is well framed
        self.stream_id = uuid::Uuid::new_v4().to_string();
        lock(&self.shared).stream_id = self.stream_id.clone();
        self.send_stream_header().await?;

        header.validate()?;

        if let Some(ref to) = header.to {
            if !to.eq_ignore_ascii_case(&self.config.domain) {
                return Err(C2sError::protocol(
                    StreamErrorCondition::HostUnknown,
                    format!("This server does not serve {}", to),
                ));
            }
        }

        debug!(
            from = ?header.from,
            version = ?header.version,
            restart = self.authenticated.is_some(),
            "Received stream header"
        );

        if self.authenticated.is_some() {
            self.send_features_bind().await?;
            self.set_state(ConnectionState::Binding);
        } else {
            self.send_features_sasl().await?;
            self.set_state(ConnectionState::Negotiating);
        }

        Ok(())
    }

    /// Send the server's stream header.
    async fn send_stream_header(&mut self) -> Result<(), C2sError> {
        let response = format!(
            "<?xml version='1.0'?>\
            <stream:stream xmlns='{}' \
            xmlns:stream='{}' \
            id='{}' from='{}' version='1.0' xml:lang='en'>",
            ns::JABBER_CLIENT,
            ns::STREAM,
            self.stream_id,
            escape(&self.config.domain)
        );

        self.write_raw(&response).await?;
        self.header_sent = true;

        debug!(stream_id = %self.stream_id, "Sent stream header");
        Ok(())
    }

    /// Send stream features advertising SASL mechanisms.
    async fn send_features_sasl(&mut self) -> Result<(), C2sError> {
        let features = format!(
            "<stream:features>\
                <mechanisms xmlns='{}'>\
                    <mechanism>PLAIN</mechanism>\
                </mechanisms>\
            </stream:features>",
            ns::SASL
        );

        self.write_raw(&features).await?;
        debug!("Sent SASL features");
        Ok(())
    }

    /// Send stream features for resource binding.
    async fn send_features_bind(&mut self) -> Result<(), C2sError> {
        let features = format!(
            "<stream:features>\
                <bind xmlns='{}'/>\
                <session xmlns='{}'>\
                    <optional/>\
                </session>\
            </stream:features>",
            ns::BIND,
            ns::SESSION
        );

        self.write_raw(&features).await?;
        debug!("Sent bind features");
        Ok(())
    }

    /// Handle a SASL `<auth/>` element.
    #[instrument(skip(self, data), name = "xmpp.stream.authenticate")]
    async fn handle_sasl_auth(&mut self, mechanism: &str, data: &str) -> Result<(), C2sError> {
        if self.state != ConnectionState::Negotiating {
            return Err(C2sError::protocol(
                StreamErrorCondition::PolicyViolation,
                "SASL is not offered at this point",
            ));
        }

        if mechanism != "PLAIN" {
            metrics::record_auth_attempt(mechanism, false);
            self.send_sasl_failure("invalid-mechanism").await?;
            return self.count_auth_failure();
        }

        let Some((authcid, password)) = parse_sasl_plain(data) else {
            metrics::record_auth_attempt(mechanism, false);
            self.send_sasl_failure("malformed-request").await?;
            return self.count_auth_failure();
        };

        self.set_state(ConnectionState::Authenticating);
        let result = self.authenticator.authenticate(&authcid, &password).await;

        match result {
            Ok(jid) => {
                metrics::record_auth_attempt(mechanism, true);
                self.write_raw(&format!("<success xmlns='{}'/>", ns::SASL))
                    .await?;

                info!(jid = %jid, "Authentication successful");
                self.authenticated = Some(jid);
                self.parser.restart();
                self.set_state(ConnectionState::Authenticated);
                Ok(())
            }
            Err(e) => {
                metrics::record_auth_attempt(mechanism, false);
                warn!(error = %e, authcid = %authcid, "Authentication failed");

                let condition = match e {
                    C2sError::AuthFailed(_) => "not-authorized",
                    _ => "temporary-auth-failure",
                };
                self.set_state(ConnectionState::Negotiating);
                self.send_sasl_failure(condition).await?;
                self.count_auth_failure()
            }
        }
    }

    fn count_auth_failure(&mut self) -> Result<(), C2sError> {
        self.auth_failures += 1;
        if self.auth_failures >= self.config.max_auth_attempts {
            return Err(C2sError::protocol(
                StreamErrorCondition::PolicyViolation,
                "Too many failed authentication attempts",
            ));
        }
        Ok(())
    }

    /// Send SASL failure response.
    async fn send_sasl_failure(&mut self, condition: &str) -> Result<(), C2sError> {
        let failure = format!("<failure xmlns='{}'><{}/></failure>", ns::SASL, condition);
        self.write_raw(&failure).await
    }

    /// Handle resource binding.
    #[instrument(skip(self, element), name = "xmpp.stream.bind")]
    async fn handle_bind(&mut self, element: Element) -> Result<(), C2sError> {
        let id = element.attr("id").unwrap_or("bind_1").to_string();
        let bind = element.get_child("bind", ns::BIND);

        if element.attr("type") != Some("set") || bind.is_none() {
            return Err(C2sError::protocol(
                StreamErrorCondition::NotAuthorized,
                "Resource binding is required before other stanzas",
            ));
        }

        let bare_jid = self
            .authenticated
            .clone()
            .ok_or_else(|| C2sError::internal("Binding without an authenticated identity"))?;

        let resource = bind
            .and_then(|b| b.get_child("resource", ns::BIND))
            .map(|r| r.text().trim().to_string())
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| {
                format!("waddle-{}", &uuid::Uuid::new_v4().simple().to_string()[..8])
            });

        let full_jid = match bare_jid.with_resource_str(&resource) {
            Ok(jid) => jid,
            Err(e) => {
                debug!(error = %e, "Rejected resource");
                let error = format!(
                    "<iq type='error' id='{}'>\
                        <error type='modify'><bad-request xmlns='{}'/></error>\
                    </iq>",
                    escape(&id),
                    ns::STANZAS
                );
                return self.write_raw(&error).await;
            }
        };

        let result = format!(
            "<iq type='result' id='{}'>\
                <bind xmlns='{}'>\
                    <jid>{}</jid>\
                </bind>\
            </iq>",
            escape(&id),
            ns::BIND,
            escape(&full_jid.to_string())
        );
        self.write_raw(&result).await?;

        self.span.record("jid", tracing::field::display(&full_jid));
        lock(&self.shared).jid = Some(full_jid.clone());
        self.set_state(ConnectionState::Established);
        info!(jid = %full_jid, "Session established");

        self.events.emit(EngineEvent::Connected);
        self.flush_pending().await
    }

    /// Handle a stanza on an established stream.
    async fn handle_stanza(&mut self, element: Element) -> Result<(), C2sError> {
        if self.state != ConnectionState::Established {
            return Err(C2sError::protocol(
                StreamErrorCondition::NotAuthorized,
                format!(
                    "<{}/> received before the session was established",
                    element.name()
                ),
            ));
        }

        if is_session_request(&element) {
            let id = element.attr("id").unwrap_or_default();
            return self
                .write_raw(&format!("<iq type='result' id='{}'/>", escape(id)))
                .await;
        }

        let packet = Packet::try_from(element)?;
        metrics::record_stanza(packet.name(), "inbound");
        debug!(stanza_type = packet.name(), "Stanza received");

        self.events.emit(EngineEvent::StanzaReceived(packet));
        Ok(())
    }

    async fn send(&mut self, packet: Packet) -> Result<(), C2sError> {
        if self.state != ConnectionState::Established {
            if self.pending.len() >= self.config.max_pending_stanzas {
                return Err(C2sError::protocol(
                    StreamErrorCondition::ResourceConstraint,
                    "Too many stanzas queued before the session was established",
                ));
            }
            debug!(stanza_type = packet.name(), "Queueing stanza until the session is established");
            self.pending.push_back(packet);
            return Ok(());
        }
        self.write_packet(&packet).await
    }

    async fn flush_pending(&mut self) -> Result<(), C2sError> {
        while let Some(packet) = self.pending.pop_front() {
            self.write_packet(&packet).await?;
        }
        Ok(())
    }

    async fn write_packet(&mut self, packet: &Packet) -> Result<(), C2sError> {
        let xml = packet.to_xml()?;
        self.write_raw(&xml).await?;
        metrics::record_stanza(packet.name(), "outbound");
        Ok(())
    }

    /// Close our side of the stream.
    async fn close_stream(&mut self) -> Result<(), C2sError> {
        if self.header_sent {
            self.write_raw("</stream:stream>").await?;
        }
        self.set_state(ConnectionState::Closed);
        Ok(())
    }

    /// Report a failure: stream error to the peer where possible, then
    /// record and raise the classification.
    async fn fail(&mut self, error: C2sError) {
        let classification = error.classify();
        warn!(
            error = %error,
            kind = classification.branch(),
            code = classification.code(),
            state = %self.state,
            "Stream failed"
        );

        if let (true, SessionError::Protocol(condition)) =
            (error.needs_stream_error(), classification)
        {
            let text = match &error {
                C2sError::Protocol { text, .. } => Some(text.as_str()),
                _ => None,
            };
            let payload = generate_stream_error(condition, text);

            let written = if self.stalled {
                Ok(())
            } else if self.header_sent {
                self.write_raw(&payload).await
            } else {
                self.stream_id = uuid::Uuid::new_v4().to_string();
                match self.send_stream_header().await {
                    Ok(()) => self.write_raw(&payload).await,
                    Err(e) => Err(e),
                }
            };
            if let Err(e) = written {
                debug!(error = %e, "Could not deliver stream error");
            }
        }

        {
            let mut shared = lock(&self.shared);
            match classification {
                SessionError::Transport(kind) => shared.socket_error = kind,
                SessionError::Protocol(condition) => shared.stream_error = condition,
            }
        }

        metrics::record_session_error(&classification);
        self.events.emit(EngineEvent::Error(classification));
    }

    /// Write and flush `xml`, giving up after the write timeout or at the
    /// negotiation deadline, whichever comes first.
    async fn write_raw(&mut self, xml: &str) -> Result<(), C2sError> {
        if self.stalled {
            return Err(C2sError::Io(io::Error::new(
                io::ErrorKind::TimedOut,
                "Transport stalled",
            )));
        }

        let now = Instant::now();
        let mut limit = now + self.config.write_timeout();
        let negotiation_bound =
            self.state.is_negotiating() && self.deadline > now && self.deadline < limit;
        if negotiation_bound {
            limit = self.deadline;
        }

        let transport = &mut self.transport;
        let write = async move {
            transport.write_all(xml.as_bytes()).await?;
            transport.flush().await
        };

        match tokio::time::timeout_at(limit, write).await {
            Ok(result) => Ok(result?),
            Err(_) => {
                self.stalled = true;
                warn!(bytes = xml.len(), "Peer stopped reading");
                if negotiation_bound {
                    Err(C2sError::protocol(
                        StreamErrorCondition::ConnectionTimeout,
                        "Stream negotiation timed out",
                    ))
                } else {
                    Err(C2sError::Io(io::Error::new(
                        io::ErrorKind::TimedOut,
                        "Write to peer timed out",
                    )))
                }
            }
        }
    }

    fn set_state(&mut self, state: ConnectionState) {
        self.state = state;
        lock(&self.shared).state = state;
        debug!(state = %state, "Stream state changed");
    }
}

/// Parse SASL PLAIN data (RFC 4616): `[authzid] NUL authcid NUL passwd`.
fn parse_sasl_plain(data: &str) -> Option<(String, String)> {
    let decoded = BASE64_STANDARD.decode(data.trim()).ok()?;

    let parts: Vec<&[u8]> = decoded.split(|&b| b == 0).collect();
    let [_authzid, authcid, password] = parts.as_slice() else {
        return None;
    };

    let authcid = std::str::from_utf8(authcid).ok()?;
    let password = std::str::from_utf8(password).ok()?;
    if authcid.is_empty() {
        return None;
    }

    Some((authcid.to_string(), password.to_string()))
}

/// Whether `element` is an RFC 3921 session establishment request.
fn is_session_request(element: &Element) -> bool {
    element.name() == "iq"
        && element.attr("type") == Some("set")
        && element.has_child("session", ns::SESSION)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain(authzid: &str, authcid: &str, password: &str) -> String {
        BASE64_STANDARD.encode(format!("{}\0{}\0{}", authzid, authcid, password))
    }

    #[test]
    fn test_parse_sasl_plain() {
        assert_eq!(
            parse_sasl_plain(&plain("", "alice", "secret")),
            Some(("alice".to_string(), "secret".to_string()))
        );
        assert_eq!(
            parse_sasl_plain(&plain("alice@localhost", "alice", "pw")),
            Some(("alice".to_string(), "pw".to_string()))
        );
        assert_eq!(parse_sasl_plain("not base64!"), None);
        assert_eq!(parse_sasl_plain(&BASE64_STANDARD.encode("alice\0secret")), None);
        assert_eq!(parse_sasl_plain(&plain("", "", "secret")), None);
    }

    #[tokio::test]
    async fn test_static_authenticator() {
        let auth = StaticAuthenticator::new("localhost").with_user("alice", "secret");

        let jid = auth.authenticate("alice", "secret").await.unwrap();
        assert_eq!(jid.to_string(), "alice@localhost");

        let jid = auth.authenticate("alice@localhost", "secret").await.unwrap();
        assert_eq!(jid.to_string(), "alice@localhost");

        assert!(matches!(
            auth.authenticate("alice", "wrong").await,
            Err(C2sError::AuthFailed(_))
        ));
        assert!(auth.authenticate("alice@elsewhere", "secret").await.is_err());
        assert!(auth.authenticate("bob", "secret").await.is_err());
    }

    #[test]
    fn test_session_request_detection() {
        let session: Element = "<iq xmlns='jabber:client' type='set' id='s1'><session xmlns='urn:ietf:params:xml:ns:xmpp-session'/></iq>"
            .parse()
            .unwrap();
        let ping: Element = "<iq xmlns='jabber:client' type='get' id='p1'><ping xmlns='urn:xmpp:ping'/></iq>"
            .parse()
            .unwrap();

        assert!(is_session_request(&session));
        assert!(!is_session_request(&ping));
    }
}
