//! Management API
//!
//! A plaintext HTTP listener that lets a test harness register and remove
//! TLS-ALPN-01 challenges while the server is running.
//!
//! | Method | Path             | Body                                 |
//! |--------|------------------|--------------------------------------|
//! | POST   | `/add-tlsalpn01` | `{"host": "...", "content": "..."}` |
//! | POST   | `/del-tlsalpn01` | `{"host": "..."}`                    |
//!
//! Both endpoints answer 200 with an empty body on success.

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;
use http::{header, Method, Request, Response, StatusCode};
use http_body_util::{BodyExt, Full, Limited};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::{TokioIo, TokioTimer};
use serde::Deserialize;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tracing::{debug, info};

use crate::server::{bind_listener, serve_connections, text_response, ServerError};
use crate::tlsalpn::ChallengeRegistry;

pub const ADD_TLS_ALPN_01_PATH: &str = "/add-tlsalpn01";
pub const DEL_TLS_ALPN_01_PATH: &str = "/del-tlsalpn01";

/// Largest request body accepted by the management API
const MAX_BODY_BYTES: usize = 64 * 1024;

const HEADER_READ_TIMEOUT: Duration = Duration::from_secs(5);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct AddTlsAlpn01Request {
    host: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct DelTlsAlpn01Request {
    host: String,
}

#[derive(Debug, Clone, Copy)]
enum Endpoint {
    AddTlsAlpn01,
    DelTlsAlpn01,
}

/// Dispatch a fully-read management request against the registry
pub fn route(
    registry: &ChallengeRegistry,
    method: &Method,
    path: &str,
    body: &[u8],
) -> Response<Full<Bytes>> {
    let endpoint = match path {
        ADD_TLS_ALPN_01_PATH => Endpoint::AddTlsAlpn01,
        DEL_TLS_ALPN_01_PATH => Endpoint::DelTlsAlpn01,
        _ => return text_response(StatusCode::NOT_FOUND, "not found\n"),
    };

    if *method != Method::POST {
        let mut response = text_response(StatusCode::METHOD_NOT_ALLOWED, "method not allowed\n");
        response
            .headers_mut()
            .insert(header::ALLOW, header::HeaderValue::from_static("POST"));
        return response;
    }

    match endpoint {
        Endpoint::AddTlsAlpn01 => match serde_json::from_slice::<AddTlsAlpn01Request>(body) {
            Ok(request) if !request.host.is_empty() => {
                registry.add(&request.host, &request.content);
                text_response(StatusCode::OK, "")
            }
            Ok(_) => text_response(StatusCode::BAD_REQUEST, "host must not be empty\n"),
            Err(e) => {
                debug!(path, error = %e, "Malformed management request");
                text_response(StatusCode::BAD_REQUEST, "malformed request body\n")
            }
        },
        Endpoint::DelTlsAlpn01 => match serde_json::from_slice::<DelTlsAlpn01Request>(body) {
            Ok(request) if !request.host.is_empty() => {
                registry.delete(&request.host);
                text_response(StatusCode::OK, "")
            }
            Ok(_) => text_response(StatusCode::BAD_REQUEST, "host must not be empty\n"),
            Err(e) => {
                debug!(path, error = %e, "Malformed management request");
                text_response(StatusCode::BAD_REQUEST, "malformed request body\n")
            }
        },
    }
}

async fn handle_request(
    registry: &ChallengeRegistry,
    request: Request<Incoming>,
) -> Response<Full<Bytes>> {
    let (parts, body) = request.into_parts();

    let body = match Limited::new(body, MAX_BODY_BYTES).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            debug!(path = %parts.uri.path(), error = %e, "Failed to read management request body");
            return text_response(StatusCode::BAD_REQUEST, "unreadable request body\n");
        }
    };

    let response = route(registry, &parts.method, parts.uri.path(), &body);
    debug!(
        method = %parts.method,
        path = %parts.uri.path(),
        status = response.status().as_u16(),
        "Management request"
    );
    response
}

/// Plaintext listener for the management API
#[derive(Debug)]
pub struct ManagementServer {
    listener: TcpListener,
    registry: ChallengeRegistry,
}

impl ManagementServer {
    pub async fn bind(address: &str, registry: ChallengeRegistry) -> Result<Self, ServerError> {
        let listener = bind_listener(address).await?;

        info!(address = %listener.local_addr()?, "Management API listener bound");

        Ok(Self { listener, registry })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve management requests until `shutdown` resolves
    pub async fn serve<F>(self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let Self { listener, registry } = self;

        serve_connections(listener, "management", shutdown, move |stream, peer| {
            let registry = registry.clone();
            async move {
                if let Err(e) = serve_connection(stream, registry).await {
                    debug!(peer = %peer, error = %e, "Management connection failed");
                }
            }
        })
        .await
    }
}

async fn serve_connection(stream: TcpStream, registry: ChallengeRegistry) -> Result<(), ServerError> {
    let service = service_fn(move |request: Request<Incoming>| {
        let registry = registry.clone();
        async move { Ok::<_, Infallible>(handle_request(&registry, request).await) }
    });

    let connection = http1::Builder::new()
        .keep_alive(false)
        .timer(TokioTimer::new())
        .header_read_timeout(HEADER_READ_TIMEOUT)
        .serve_connection(TokioIo::new(stream), service);

    match timeout(REQUEST_TIMEOUT, connection).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(ServerError::Timeout {
            stage: "management request",
            timeout: REQUEST_TIMEOUT,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn post(registry: &ChallengeRegistry, path: &str, body: &str) -> StatusCode {
        route(registry, &Method::POST, path, body.as_bytes()).status()
    }

    #[test]
    fn test_add_registers_challenge() {
        let registry = ChallengeRegistry::new();

        let status = post(
            &registry,
            ADD_TLS_ALPN_01_PATH,
            r#"{"host": "example.test", "content": "token123.thumb"}"#,
        );

        assert_eq!(status, StatusCode::OK);
        assert_eq!(registry.get("example.test"), Some("token123.thumb".to_string()));
    }

    #[test]
    fn test_del_removes_challenge() {
        let registry = ChallengeRegistry::new();
        registry.add("example.test", "token123.thumb");

        let status = post(&registry, DEL_TLS_ALPN_01_PATH, r#"{"host": "example.test"}"#);

        assert_eq!(status, StatusCode::OK);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_del_unknown_host_succeeds() {
        let registry = ChallengeRegistry::new();

        let status = post(&registry, DEL_TLS_ALPN_01_PATH, r#"{"host": "missing.test"}"#);

        assert_eq!(status, StatusCode::OK);
    }

    #[test]
    fn test_malformed_bodies_rejected() {
        let registry = ChallengeRegistry::new();

        assert_eq!(post(&registry, ADD_TLS_ALPN_01_PATH, "not json"), StatusCode::BAD_REQUEST);
        assert_eq!(
            post(&registry, ADD_TLS_ALPN_01_PATH, r#"{"host": "example.test"}"#),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            post(&registry, ADD_TLS_ALPN_01_PATH, r#"{"host": "", "content": "x"}"#),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(post(&registry, DEL_TLS_ALPN_01_PATH, "{}"), StatusCode::BAD_REQUEST);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_unknown_path_not_found() {
        let registry = ChallengeRegistry::new();

        assert_eq!(post(&registry, "/add-http01", "{}"), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_wrong_method_not_allowed() {
        let registry = ChallengeRegistry::new();

        let response = route(&registry, &Method::GET, ADD_TLS_ALPN_01_PATH, b"");

        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.headers()[header::ALLOW], "POST");
    }
}
