//! Challenge certificate issuance
//!
//! Selects the certificate for each handshake and, for `acme-tls/1`
//! handshakes, mints the `acmeIdentifier` certificate on the spot.

use std::sync::Arc;

use rcgen::string::Ia5String;
use rcgen::{CertificateParams, CustomExtension, DistinguishedName, KeyPair, SanType, SerialNumber};
use rustls::server::{ClientHello, ResolvesServerCert};
use rustls::sign::{CertifiedKey, SigningKey};
use sha2::{Digest, Sha256};
use tracing::{debug, trace, warn};

use super::error::{HandshakeError, IdentityError};
use super::identity::{generate_key_pair, signing_key, validity_window, FallbackIdentity};
use super::registry::ChallengeRegistry;
use super::ACME_TLS_1_PROTOCOL;

/// Serial number of every challenge certificate
///
/// Challenge certificates are throwaway and never chained, so a fixed
/// serial is enough.
pub const CHALLENGE_CERT_SERIAL: u64 = 1729;

/// Returns `true` if the offered ALPN list is exactly `["acme-tls/1"]`
pub fn is_tls_alpn_challenge(alpn: Option<&[&[u8]]>) -> bool {
    matches!(alpn, Some([only]) if *only == ACME_TLS_1_PROTOCOL.as_bytes())
}

/// SHA-256 digest of a key authorization
pub fn key_authorization_digest(key_authorization: &str) -> [u8; 32] {
    Sha256::digest(key_authorization.as_bytes()).into()
}

/// Critical `id-pe-acmeIdentifier` extension carrying the key authorization digest
///
/// The extension value is the digest DER-encoded as an OCTET STRING.
pub fn acme_identifier_extension(key_authorization: &str) -> CustomExtension {
    CustomExtension::new_acme_identifier(&key_authorization_digest(key_authorization))
}

/// rustls certificate resolver for TLS-ALPN-01
///
/// Reads the [`ChallengeRegistry`] on every handshake and never writes it.
/// The fallback identity and the challenge signing key are created once per
/// issuer and shared read-only by all handshakes.
pub struct ChallengeCertIssuer {
    registry: ChallengeRegistry,
    fallback: FallbackIdentity,
    /// Signs challenge certificates; distinct from the fallback key
    key_pair: KeyPair,
    signing_key: Arc<dyn SigningKey>,
}

impl std::fmt::Debug for ChallengeCertIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChallengeCertIssuer")
            .field("registered", &self.registry.len())
            .field("fallback", &self.fallback)
            .finish()
    }
}

impl ChallengeCertIssuer {
    /// Create an issuer with a freshly generated fallback identity and signing key
    pub fn new(registry: ChallengeRegistry) -> Result<Self, IdentityError> {
        Self::with_identity(registry, FallbackIdentity::generate()?, generate_key_pair()?)
    }

    /// Create an issuer from an existing fallback identity and challenge signing key
    pub fn with_identity(
        registry: ChallengeRegistry,
        fallback: FallbackIdentity,
        key_pair: KeyPair,
    ) -> Result<Self, IdentityError> {
        let signing_key = signing_key(&key_pair)?;

        Ok(Self {
            registry,
            fallback,
            key_pair,
            signing_key,
        })
    }

    pub fn fallback(&self) -> &FallbackIdentity {
        &self.fallback
    }

    pub fn registry(&self) -> &ChallengeRegistry {
        &self.registry
    }

    /// Choose the certificate for a handshake
    ///
    /// Clients that do not offer exactly `["acme-tls/1"]` get the fallback
    /// identity. Otherwise the server name must be registered, and a challenge
    /// certificate is minted for it.
    ///
    /// # Errors
    ///
    /// Fails when the server name is missing or unregistered, or when the
    /// certificate cannot be built. The caller should abort the handshake.
    pub fn select_certificate(
        &self,
        alpn: Option<&[&[u8]]>,
        server_name: Option<&str>,
    ) -> Result<Arc<CertifiedKey>, HandshakeError> {
        if !is_tls_alpn_challenge(alpn) {
            trace!(server_name = ?server_name, "Non-challenge handshake, serving fallback identity");
            return Ok(self.fallback.certified_key());
        }

        let server_name = server_name.ok_or(HandshakeError::MissingServerName)?;

        // Clone out of the registry so the read lock is released before signing
        let key_authorization = self
            .registry
            .get(server_name)
            .ok_or_else(|| HandshakeError::UnknownServerName(server_name.to_string()))?;

        self.issue_challenge_certificate(server_name, &key_authorization)
    }

    /// Mint a challenge certificate for `server_name`
    ///
    /// The certificate has a fixed serial and an empty subject. Its only SAN
    /// is `server_name`, and its only custom extension is the critical
    /// `acmeIdentifier` extension. It is self-signed with the issuer's key.
    pub fn issue_challenge_certificate(
        &self,
        server_name: &str,
        key_authorization: &str,
    ) -> Result<Arc<CertifiedKey>, HandshakeError> {
        let dns_name = Ia5String::try_from(server_name.to_string()).map_err(|source| {
            HandshakeError::InvalidServerName {
                name: server_name.to_string(),
                source,
            }
        })?;

        let mut params = CertificateParams::default();
        params.serial_number = Some(SerialNumber::from(CHALLENGE_CERT_SERIAL));
        params.distinguished_name = DistinguishedName::new();
        params.subject_alt_names = vec![SanType::DnsName(dns_name)];
        params.custom_extensions = vec![acme_identifier_extension(key_authorization)];

        let (not_before, not_after) = validity_window();
        params.not_before = not_before;
        params.not_after = not_after;

        let cert = params
            .self_signed(&self.key_pair)
            .map_err(HandshakeError::Signing)?;

        debug!(server_name = %server_name, "Issued TLS-ALPN-01 challenge certificate");

        Ok(Arc::new(CertifiedKey::new(
            vec![cert.der().clone()],
            Arc::clone(&self.signing_key),
        )))
    }
}

impl ResolvesServerCert for ChallengeCertIssuer {
    fn resolve(&self, client_hello: ClientHello<'_>) -> Option<Arc<CertifiedKey>> {
        let alpn: Option<Vec<&[u8]>> = client_hello.alpn().map(|protocols| protocols.collect());

        match self.select_certificate(alpn.as_deref(), client_hello.server_name()) {
            Ok(certified_key) => Some(certified_key),
            Err(e @ (HandshakeError::UnknownServerName(_) | HandshakeError::MissingServerName)) => {
                debug!(error = %e, "Rejecting TLS-ALPN-01 handshake");
                None
            }
            Err(e) => {
                warn!(error = %e, "Failed to issue TLS-ALPN-01 challenge certificate");
                None
            }
        }
    }
}
