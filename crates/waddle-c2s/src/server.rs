//! C2S listener.
//!
//! Accepts TCP connections (optionally wrapped in direct TLS), reads the
//! first bytes the client sends, and hands each connection to a
//! [`ConnectionHandler`] as a ready [`Session`].

use std::fs::File;
use std::future::Future;
use std::io::BufReader;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_rustls::rustls;
use tokio_rustls::TlsAcceptor;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::config::ServerConfig;
use crate::session::Session;
use crate::stream::{Authenticator, XmppEngineFactory, XmppStreamEngine};
use crate::transport::Transport;
use crate::types::TransportKind;
use crate::C2sError;

/// Receives every accepted connection.
pub trait ConnectionHandler: Send + Sync + 'static {
    /// Drive `session` until it is done. Runs on the connection's own task.
    fn handle(&self, session: Session<XmppStreamEngine>) -> impl Future<Output = ()> + Send;
}

/// XMPP client-to-server listener.
pub struct C2sServer<A> {
    config: ServerConfig,
    listener: TcpListener,
    tls_acceptor: Option<TlsAcceptor>,
    factory: XmppEngineFactory<A>,
    shutdown: CancellationToken,
}

impl<A: Authenticator> C2sServer<A> {
    /// Validate `config`, load TLS material and bind the listening socket.
    pub async fn bind(
        config: ServerConfig,
        authenticator: Arc<A>,
        shutdown: CancellationToken,
    ) -> Result<Self, C2sError> {
        config.validate()?;

        let tls_acceptor = match (&config.tls_cert_path, &config.tls_key_path) {
            (Some(cert), Some(key)) => Some(load_tls_acceptor(cert, key)?),
            _ => None,
        };

        let listener = TcpListener::bind(config.c2s_addr).await?;
        info!(
            addr = %listener.local_addr()?,
            domain = %config.stream.domain,
            tls = tls_acceptor.is_some(),
            "XMPP C2S server listening"
        );

        let factory = XmppEngineFactory::new(config.stream.clone(), authenticator);

        Ok(Self {
            config,
            listener,
            tls_acceptor,
            factory,
            shutdown,
        })
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, C2sError> {
        Ok(self.listener.local_addr()?)
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Accept connections until the shutdown token fires.
    pub async fn run<H: ConnectionHandler>(self, handler: Arc<H>) -> Result<(), C2sError> {
        let transport = if self.tls_acceptor.is_some() {
            TransportKind::TcpTls
        } else {
            TransportKind::Tcp
        };

        loop {
            let (stream, peer_addr) = tokio::select! {
                _ = self.shutdown.cancelled() => {
                    info!("C2S listener shutting down");
                    return Ok(());
                }
                accepted = self.listener.accept() => match accepted {
                    Ok(conn) => conn,
                    Err(e) => {
                        warn!(error = %e, "Failed to accept C2S connection");
                        continue;
                    }
                },
            };

            let connection = Connection {
                tls_acceptor: self.tls_acceptor.clone(),
                factory: self.factory.clone(),
                handler: Arc::clone(&handler),
                prefetch_timeout: self.config.prefetch_timeout(),
                prefetch_size: self.config.stream.read_buffer_size,
            };

            tokio::spawn(
                async move {
                    if let Err(e) = connection.handle(stream).await {
                        warn!(error = %e, "Connection error");
                    }
                }
                .instrument(info_span!(
                    "xmpp.c2s.connection",
                    client_ip = %peer_addr,
                    transport = %transport,
                )),
            );
        }
    }
}

/// Bind a server and run it on a new task.
///
/// Returns the bound address along with the listener task.
pub async fn start<A, H>(
    config: ServerConfig,
    authenticator: Arc<A>,
    handler: Arc<H>,
    shutdown: CancellationToken,
) -> Result<(SocketAddr, JoinHandle<Result<(), C2sError>>), C2sError>
where
    A: Authenticator,
    H: ConnectionHandler,
{
    let server = C2sServer::bind(config, authenticator, shutdown).await?;
    let addr = server.local_addr()?;
    Ok((addr, tokio::spawn(server.run(handler))))
}

/// Everything one accepted connection needs.
struct Connection<A, H> {
    tls_acceptor: Option<TlsAcceptor>,
    factory: XmppEngineFactory<A>,
    handler: Arc<H>,
    prefetch_timeout: Duration,
    prefetch_size: usize,
}

impl<A: Authenticator, H: ConnectionHandler> Connection<A, H> {
    async fn handle(self, stream: TcpStream) -> Result<(), C2sError> {
        stream.set_nodelay(true)?;

        match self.tls_acceptor.clone() {
            Some(acceptor) => {
                let tls_stream = acceptor.accept(stream).await?;
                debug!("TLS handshake completed");
                self.serve(tls_stream).await
            }
            None => self.serve(stream).await,
        }
    }

    async fn serve<T: Transport>(self, mut transport: T) -> Result<(), C2sError> {
        let prefetched = prefetch(&mut transport, self.prefetch_timeout, self.prefetch_size).await?;

        if !transport.is_connected() {
            debug!("Peer went away before the session was created");
            return Ok(());
        }

        let session = Session::create(&self.factory, transport, prefetched, None);
        debug!(session_id = %session.id(), "Session created");

        self.handler.handle(session).await;
        Ok(())
    }
}

/// Read whatever the client has already sent, waiting at most `wait`.
async fn prefetch<T: Transport>(
    transport: &mut T,
    wait: Duration,
    size: usize,
) -> Result<Vec<u8>, C2sError> {
    let mut buf = vec![0u8; size];
    match tokio::time::timeout(wait, transport.read(&mut buf)).await {
        Ok(read) => {
            let n = read?;
            buf.truncate(n);
            debug!(bytes = n, "Prefetched stream prefix");
            Ok(buf)
        }
        Err(_) => Ok(Vec::new()),
    }
}

/// Load TLS configuration from PEM certificate and key files.
pub fn load_tls_acceptor(cert_path: &Path, key_path: &Path) -> Result<TlsAcceptor, C2sError> {
    let cert_file = File::open(cert_path).map_err(|e| {
        C2sError::config(format!(
            "Failed to open cert file {}: {}",
            cert_path.display(),
            e
        ))
    })?;
    let key_file = File::open(key_path).map_err(|e| {
        C2sError::config(format!(
            "Failed to open key file {}: {}",
            key_path.display(),
            e
        ))
    })?;

    let certs = rustls_pemfile::certs(&mut BufReader::new(cert_file))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| C2sError::config(format!("Invalid certificate file: {}", e)))?;
    if certs.is_empty() {
        return Err(C2sError::config("No certificate found"));
    }

    let key = rustls_pemfile::private_key(&mut BufReader::new(key_file))
        .map_err(|e| C2sError::config(format!("Invalid key file: {}", e)))?
        .ok_or_else(|| C2sError::config("No private key found"))?;

    let server_config = rustls::ServerConfig::builder_with_provider(Arc::new(
        rustls::crypto::ring::default_provider(),
    ))
    .with_safe_default_protocol_versions()?
    .with_no_client_auth()
    .with_single_cert(certs, key)?;

    Ok(TlsAcceptor::from(Arc::new(server_config)))
}
