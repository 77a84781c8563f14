//! Challenge Test Server Library
//!
//! A TLS-ALPN-01 challenge responder for exercising ACME clients and
//! validators in tests.
//!
//! This library provides:
//!
//! - **Challenge Registry**: hostname to key authorization map, mutable at runtime
//! - **Certificate Issuer**: mints `acmeIdentifier` certificates during the handshake
//! - **TLS Listener**: TLS-only server with keep-alive disabled
//! - **Management API**: HTTP endpoints for registering challenges
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use challtestsrv::{ChallengeServer, NotFoundHandler};
//! use challtestsrv_config::Config;
//!
//! let server = ChallengeServer::new(Config::default())?;
//! server.add_tls_alpn_challenge("example.test", "token123.thumb");
//!
//! let listener = server.tls_alpn_server(Arc::new(NotFoundHandler)).await?;
//! listener.serve(std::future::pending()).await;
//! ```

// ============================================================================
// Module Declarations
// ============================================================================

pub mod challenge_server;
pub mod management;
pub mod server;
pub mod signals;
pub mod tlsalpn;

// ============================================================================
// Public API Re-exports
// ============================================================================

// Server lifecycle
pub use challenge_server::ChallengeServer;
pub use management::ManagementServer;
pub use server::{
    build_server_config, HandshakeConfigs, NotFoundHandler, RequestHandler, ServerError,
    TlsAlpnServer,
};
pub use signals::{shutdown_signal, SignalType};

// TLS-ALPN-01 core
pub use tlsalpn::{
    ChallengeCertIssuer, ChallengeRegistry, FallbackIdentity, HandshakeError, IdentityError,
    ACME_TLS_1_PROTOCOL,
};
