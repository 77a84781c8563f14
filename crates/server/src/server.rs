//! TLS-only challenge server
//!
//! Serves the TLS-ALPN-01 listener. Every connection is TLS: there is no
//! plaintext fallback and no certificate is ever read from disk, because
//! [`ChallengeCertIssuer`] supplies one per handshake. Keep-alive is disabled
//! so each validation attempt is a fresh, independently observable handshake.

use std::convert::Infallible;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::{header, Request, Response, StatusCode};
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::{TokioIo, TokioTimer};
use rustls::server::{Acceptor, ClientHello, NoServerSessionStorage};
use rustls::ServerConfig;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tokio::time::timeout;
use tokio_rustls::LazyConfigAcceptor;
use tracing::{debug, error, info, trace};

use challtestsrv_config::TlsAlpnConfig;

use crate::tlsalpn::{
    crypto_provider, is_tls_alpn_challenge, ChallengeCertIssuer, ACME_TLS_1_PROTOCOL,
};

/// Pause after a failed accept so fd exhaustion does not spin the loop
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(50);

/// Server errors
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: io::Error,
    },

    #[error("Failed to build TLS configuration: {0}")]
    TlsConfig(#[from] rustls::Error),

    #[error("TLS handshake failed: {0}")]
    Handshake(#[source] io::Error),

    #[error("{stage} timed out after {timeout:?}")]
    Timeout {
        stage: &'static str,
        timeout: Duration,
    },

    #[error("HTTP error: {0}")]
    Http(#[from] hyper::Error),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Answers HTTP requests that follow a non-challenge handshake
pub trait RequestHandler: Send + Sync + 'static {
    fn handle(&self, request: Request<Incoming>) -> Response<Full<Bytes>>;
}

/// Handler that answers every request with 404
#[derive(Debug, Default, Clone, Copy)]
pub struct NotFoundHandler;

impl RequestHandler for NotFoundHandler {
    fn handle(&self, request: Request<Incoming>) -> Response<Full<Bytes>> {
        trace!(method = %request.method(), path = %request.uri().path(), "No handler for request");
        text_response(StatusCode::NOT_FOUND, "not found\n")
    }
}

pub(crate) fn text_response(status: StatusCode, body: &'static str) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from_static(body.as_bytes())));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}

/// Build the rustls configuration for the challenge listener
///
/// The issuer is installed as the certificate resolver. Session resumption
/// is disabled, because a resumed session would skip certificate selection.
pub fn build_server_config(
    issuer: Arc<ChallengeCertIssuer>,
    alpn_protocols: Vec<Vec<u8>>,
) -> Result<ServerConfig, ServerError> {
    let mut config = ServerConfig::builder_with_provider(crypto_provider())
        .with_safe_default_protocol_versions()?
        .with_no_client_auth()
        .with_cert_resolver(issuer);

    config.alpn_protocols = alpn_protocols;
    config.session_storage = Arc::new(NoServerSessionStorage {});
    config.send_tls13_tickets = 0;

    debug!(
        alpn_protocols = ?config
            .alpn_protocols
            .iter()
            .map(|p| String::from_utf8_lossy(p).into_owned())
            .collect::<Vec<_>>(),
        "TLS-ALPN server configuration built"
    );

    Ok(config)
}

/// Per-handshake rustls configuration
///
/// rustls aborts a handshake whose ALPN offer shares nothing with the
/// server's list, before any certificate is chosen. The server list is
/// therefore narrowed to the overlap with each ClientHello: an exact
/// `acme-tls/1` offer gets `["acme-tls/1"]`, and any other offer gets the
/// configured protocols it names, possibly none.
#[derive(Debug, Clone)]
pub struct HandshakeConfigs {
    base: Arc<ServerConfig>,
    challenge: Arc<ServerConfig>,
    alpn_protocols: Vec<Vec<u8>>,
}

impl HandshakeConfigs {
    pub fn new(
        issuer: Arc<ChallengeCertIssuer>,
        alpn_protocols: Vec<Vec<u8>>,
    ) -> Result<Self, ServerError> {
        let base = build_server_config(Arc::clone(&issuer), Vec::new())?;
        let challenge =
            build_server_config(issuer, vec![ACME_TLS_1_PROTOCOL.as_bytes().to_vec()])?;

        Ok(Self {
            base: Arc::new(base),
            challenge: Arc::new(challenge),
            alpn_protocols,
        })
    }

    /// Configuration for a client offering `offered`
    pub fn for_offer(&self, offered: Option<&[&[u8]]>) -> Arc<ServerConfig> {
        if is_tls_alpn_challenge(offered) {
            return Arc::clone(&self.challenge);
        }

        let overlap: Vec<Vec<u8>> = match offered {
            Some(offered) => self
                .alpn_protocols
                .iter()
                .filter(|protocol| offered.contains(&protocol.as_slice()))
                .cloned()
                .collect(),
            None => Vec::new(),
        };

        if overlap.is_empty() {
            return Arc::clone(&self.base);
        }

        let mut config = ServerConfig::clone(&self.base);
        config.alpn_protocols = overlap;
        Arc::new(config)
    }

    pub fn for_client_hello(&self, client_hello: &ClientHello<'_>) -> Arc<ServerConfig> {
        let offered: Option<Vec<&[u8]>> = client_hello.alpn().map(|protocols| protocols.collect());
        self.for_offer(offered.as_deref())
    }
}

pub(crate) async fn bind_listener(address: &str) -> Result<TcpListener, ServerError> {
    TcpListener::bind(address)
        .await
        .map_err(|source| ServerError::Bind {
            address: address.to_string(),
            source,
        })
}

/// Accept connections until `shutdown` resolves, then drain
///
/// Each connection runs on its own task. After shutdown no new connections
/// are accepted and the call returns once every in-flight connection has
/// finished. Dropping the returned future aborts in-flight connections.
pub(crate) async fn serve_connections<F, C, Fut>(
    listener: TcpListener,
    name: &'static str,
    shutdown: F,
    on_connection: C,
) where
    F: Future<Output = ()>,
    C: Fn(TcpStream, SocketAddr) -> Fut,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::pin!(shutdown);
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!(listener = name, "Shutdown requested, no longer accepting connections");
                break;
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    trace!(listener = name, peer = %peer, "Accepted connection");
                    connections.spawn(on_connection(stream, peer));
                }
                Err(e) => {
                    error!(listener = name, error = %e, "Failed to accept connection");
                    tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                }
            },
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
        }
    }

    drop(listener);

    if !connections.is_empty() {
        info!(
            listener = name,
            in_flight = connections.len(),
            "Draining in-flight connections"
        );
    }
    while connections.join_next().await.is_some() {}

    info!(listener = name, "Listener stopped");
}

#[derive(Debug, Clone, Copy)]
struct Timeouts {
    read: Duration,
    write: Duration,
}

/// TLS-ALPN-01 challenge listener
pub struct TlsAlpnServer {
    listener: TcpListener,
    configs: Arc<HandshakeConfigs>,
    handler: Arc<dyn RequestHandler>,
    timeouts: Timeouts,
}

impl TlsAlpnServer {
    /// Bind the listener described by `config`
    pub async fn bind(
        config: &TlsAlpnConfig,
        issuer: Arc<ChallengeCertIssuer>,
        handler: Arc<dyn RequestHandler>,
    ) -> Result<Self, ServerError> {
        let configs = HandshakeConfigs::new(issuer, config.alpn_protocol_bytes())?;
        let listener = bind_listener(&config.address).await?;

        info!(
            address = %listener.local_addr()?,
            "TLS-ALPN-01 listener bound"
        );

        Ok(Self {
            listener,
            configs: Arc::new(configs),
            handler,
            timeouts: Timeouts {
                read: config.read_timeout(),
                write: config.write_timeout(),
            },
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve TLS connections until `shutdown` resolves
    pub async fn serve<F>(self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let Self {
            listener,
            configs,
            handler,
            timeouts,
        } = self;

        serve_connections(listener, "tls-alpn", shutdown, move |stream, peer| {
            let configs = Arc::clone(&configs);
            let handler = Arc::clone(&handler);
            async move {
                if let Err(e) = serve_connection(stream, configs, handler, timeouts).await {
                    debug!(peer = %peer, error = %e, "TLS-ALPN connection failed");
                }
            }
        })
        .await
    }
}

async fn serve_connection(
    stream: TcpStream,
    configs: Arc<HandshakeConfigs>,
    handler: Arc<dyn RequestHandler>,
    timeouts: Timeouts,
) -> Result<(), ServerError> {
    let handshake = async {
        let start = LazyConfigAcceptor::new(Acceptor::default(), stream).await?;
        let config = configs.for_client_hello(&start.client_hello());
        start.into_stream(config).await
    };

    let mut tls_stream = match timeout(timeouts.read, handshake).await {
        Ok(Ok(tls_stream)) => tls_stream,
        Ok(Err(e)) => return Err(ServerError::Handshake(e)),
        Err(_) => {
            return Err(ServerError::Timeout {
                stage: "TLS handshake",
                timeout: timeouts.read,
            })
        }
    };

    let (_, connection) = tls_stream.get_ref();
    if connection.alpn_protocol() == Some(ACME_TLS_1_PROTOCOL.as_bytes()) {
        // RFC 8737: no application data follows an acme-tls/1 handshake
        debug!(
            server_name = ?connection.server_name(),
            "Completed acme-tls/1 handshake"
        );
        tls_stream.shutdown().await?;
        return Ok(());
    }

    let service = service_fn(move |request| {
        let handler = Arc::clone(&handler);
        async move { Ok::<_, Infallible>(handler.handle(request)) }
    });

    let connection = http1::Builder::new()
        .keep_alive(false)
        .timer(TokioTimer::new())
        .header_read_timeout(timeouts.read)
        .serve_connection(TokioIo::new(tls_stream), service);

    let budget = timeouts.read + timeouts.write;
    match timeout(budget, connection).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(ServerError::Timeout {
            stage: "HTTP exchange",
            timeout: budget,
        }),
    }
}
