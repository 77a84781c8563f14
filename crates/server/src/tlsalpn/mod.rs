//! TLS-ALPN-01 challenge handling
//!
//! Answers TLS-ALPN-01 validation handshakes (RFC 8737) by minting a
//! challenge certificate for the requested server name while the handshake
//! is in progress.
//!
//! # Architecture
//!
//! The module consists of three components:
//!
//! - [`FallbackIdentity`] - Self-signed certificate served to every client that
//!   does not negotiate `acme-tls/1`
//! - [`ChallengeRegistry`] - Hostname -> key authorization store shared with the
//!   test orchestration code
//! - [`ChallengeCertIssuer`] - rustls certificate resolver that mints the
//!   `acmeIdentifier` certificate per handshake
//!
//! # Challenge Flow
//!
//! 1. Test code registers `(hostname, key authorization)` in the [`ChallengeRegistry`]
//! 2. The validator connects with SNI `hostname` and ALPN `["acme-tls/1"]`
//! 3. rustls calls [`ChallengeCertIssuer`] while processing the ClientHello
//! 4. The issuer looks up the key authorization and self-signs a certificate whose
//!    only SAN is `hostname` and whose critical `id-pe-acmeIdentifier` extension
//!    holds `SHA-256(key authorization)`
//! 5. Unregistered names get no certificate, which aborts the handshake

use std::sync::Arc;

use rustls::crypto::CryptoProvider;

mod error;
mod identity;
mod issuer;
mod registry;

pub use error::{HandshakeError, IdentityError};
pub use identity::{FallbackIdentity, FALLBACK_COMMON_NAME};
pub use issuer::{
    acme_identifier_extension, is_tls_alpn_challenge, key_authorization_digest,
    ChallengeCertIssuer, CHALLENGE_CERT_SERIAL,
};
pub use registry::ChallengeRegistry;

/// ALPN protocol identifier for TLS-ALPN-01
pub const ACME_TLS_1_PROTOCOL: &str = challtestsrv_config::ACME_TLS_1_PROTOCOL;

/// `id-pe-acmeIdentifier` (RFC 8737 section 6.1)
pub const ID_PE_ACME_IDENTIFIER: &str = "1.3.6.1.5.5.7.1.31";

/// Crypto provider used for both signing keys and the server configuration
pub(crate) fn crypto_provider() -> Arc<CryptoProvider> {
    Arc::new(rustls::crypto::aws_lc_rs::default_provider())
}
