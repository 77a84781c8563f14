//! Error types for TLS-ALPN-01 challenge handling

use thiserror::Error;

/// Failure to build the server's long-lived identity
///
/// These are startup-fatal: a server without its fallback identity or
/// signing key cannot answer any handshake.
#[derive(Error, Debug)]
pub enum IdentityError {
    #[error("Unable to generate ECDSA key: {0}")]
    KeyGeneration(#[source] rcgen::Error),

    #[error("Unable to generate certificate serial number: {0}")]
    SerialGeneration(#[source] rand::Error),

    #[error("Unable to issue certificate: {0}")]
    CertificateEncoding(#[source] rcgen::Error),

    #[error("Unable to load signing key: {0}")]
    KeyLoad(#[source] rustls::Error),
}

/// Failure to produce a certificate for one handshake
///
/// Each of these aborts only the handshake that triggered it.
#[derive(Error, Debug)]
pub enum HandshakeError {
    #[error("unknown server name: {0}")]
    UnknownServerName(String),

    #[error("acme-tls/1 handshake without server name indication")]
    MissingServerName,

    #[error("invalid server name {name:?}: {source}")]
    InvalidServerName {
        name: String,
        #[source]
        source: rcgen::Error,
    },

    #[error("failed creating challenge certificate: {0}")]
    Signing(#[source] rcgen::Error),
}
