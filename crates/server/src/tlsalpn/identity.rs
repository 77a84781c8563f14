//! Fallback TLS identity
//!
//! The certificate served to clients that do not negotiate `acme-tls/1`.

use std::sync::Arc;

use rand::rngs::OsRng;
use rand::RngCore;
use rcgen::{
    BasicConstraints, CertificateParams, DistinguishedName, DnType, ExtendedKeyUsagePurpose, IsCa,
    KeyPair, KeyUsagePurpose, SerialNumber,
};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use rustls::sign::{CertifiedKey, SigningKey};
use sha2::{Digest, Sha256};
use time::{Duration, OffsetDateTime};
use tracing::debug;

use super::crypto_provider;
use super::error::IdentityError;

/// Subject common name of the fallback certificate
pub const FALLBACK_COMMON_NAME: &str = "challenge test server";

/// Absorbs clock skew between the validator and this server
const BACKDATE: Duration = Duration::hours(1);

const VALIDITY: Duration = Duration::days(365);

/// Validity window shared by every certificate this server mints
pub(crate) fn validity_window() -> (OffsetDateTime, OffsetDateTime) {
    let now = OffsetDateTime::now_utc();
    (now - BACKDATE, now + VALIDITY)
}

/// Generate a fresh P-256 key pair
pub(crate) fn generate_key_pair() -> Result<KeyPair, IdentityError> {
    KeyPair::generate_for(&rcgen::PKCS_ECDSA_P256_SHA256).map_err(IdentityError::KeyGeneration)
}

/// Convert an rcgen key pair into a rustls signing key
pub(crate) fn signing_key(key_pair: &KeyPair) -> Result<Arc<dyn SigningKey>, IdentityError> {
    let der = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(key_pair.serialize_der()));

    crypto_provider()
        .key_provider
        .load_private_key(der)
        .map_err(IdentityError::KeyLoad)
}

/// Serial number drawn uniformly from `[0, i64::MAX]`
fn random_serial() -> Result<u64, IdentityError> {
    let mut bytes = [0u8; 8];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(IdentityError::SerialGeneration)?;
    Ok(u64::from_be_bytes(bytes) & i64::MAX as u64)
}

/// Self-signed CA certificate served to non-challenge clients
///
/// Generated once per server instance and never regenerated.
#[derive(Clone)]
pub struct FallbackIdentity {
    certified_key: Arc<CertifiedKey>,
    cert_pem: String,
    serial: u64,
}

impl std::fmt::Debug for FallbackIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FallbackIdentity")
            .field("serial", &self.serial)
            .field("fingerprint", &self.fingerprint())
            .finish()
    }
}

impl FallbackIdentity {
    /// Generate the fallback identity
    ///
    /// The certificate uses a P-256 key and a random non-negative serial. It
    /// is valid from one hour ago until one year from now. It is marked as a
    /// CA with digital-signature and cert-sign key usage, and is valid for
    /// both server and client authentication.
    ///
    /// # Errors
    ///
    /// Any failure here means the server cannot start.
    pub fn generate() -> Result<Self, IdentityError> {
        let key_pair = generate_key_pair()?;
        let serial = random_serial()?;

        let mut params = CertificateParams::default();

        let mut dn = DistinguishedName::new();
        dn.push(DnType::CommonName, FALLBACK_COMMON_NAME);
        params.distinguished_name = dn;

        params.serial_number = Some(SerialNumber::from(serial));

        let (not_before, not_after) = validity_window();
        params.not_before = not_before;
        params.not_after = not_after;

        params.key_usages = vec![
            KeyUsagePurpose::DigitalSignature,
            KeyUsagePurpose::KeyCertSign,
        ];
        params.extended_key_usages = vec![
            ExtendedKeyUsagePurpose::ServerAuth,
            ExtendedKeyUsagePurpose::ClientAuth,
        ];
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);

        let cert = params
            .self_signed(&key_pair)
            .map_err(IdentityError::CertificateEncoding)?;

        let certified_key = Arc::new(CertifiedKey::new(
            vec![cert.der().clone()],
            signing_key(&key_pair)?,
        ));

        let identity = Self {
            certified_key,
            cert_pem: cert.pem(),
            serial,
        };

        debug!(
            serial = identity.serial,
            fingerprint = %identity.fingerprint(),
            "Generated fallback TLS identity"
        );

        Ok(identity)
    }

    /// Certificate and signing key as handed to rustls
    pub fn certified_key(&self) -> Arc<CertifiedKey> {
        Arc::clone(&self.certified_key)
    }

    /// DER encoding of the certificate
    pub fn cert_der(&self) -> &CertificateDer<'static> {
        &self.certified_key.cert[0]
    }

    /// PEM encoding of the certificate, for pinning in test clients
    pub fn cert_pem(&self) -> &str {
        &self.cert_pem
    }

    pub fn serial(&self) -> u64 {
        self.serial
    }

    /// Hex SHA-256 fingerprint of the DER certificate
    pub fn fingerprint(&self) -> String {
        hex::encode(Sha256::digest(self.cert_der().as_ref()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};
    use x509_parser::prelude::*;

    fn unix_now() -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs() as i64
    }

    #[test]
    fn test_fallback_certificate_fields() {
        let identity = FallbackIdentity::generate().unwrap();
        let (_, cert) = X509Certificate::from_der(identity.cert_der()).unwrap();

        let cn = cert
            .subject()
            .iter_common_name()
            .next()
            .and_then(|cn| cn.as_str().ok());
        assert_eq!(cn, Some(FALLBACK_COMMON_NAME));

        let basic = cert.basic_constraints().unwrap().unwrap();
        assert!(basic.value.ca);

        let key_usage = cert.key_usage().unwrap().unwrap();
        assert!(key_usage.value.digital_signature());
        assert!(key_usage.value.key_cert_sign());

        let eku = cert.extended_key_usage().unwrap().unwrap();
        assert!(eku.value.server_auth);
        assert!(eku.value.client_auth);
    }

    #[test]
    fn test_fallback_validity_window() {
        let before = unix_now();
        let identity = FallbackIdentity::generate().unwrap();
        let (_, cert) = X509Certificate::from_der(identity.cert_der()).unwrap();

        let not_before = cert.validity().not_before.timestamp();
        let not_after = cert.validity().not_after.timestamp();

        assert!(not_before <= before - 3500, "not backdated: {not_before}");
        assert!(not_after >= before + 364 * 24 * 3600, "too short: {not_after}");
    }

    #[test]
    fn test_fallback_serial_is_non_negative() {
        let identity = FallbackIdentity::generate().unwrap();
        let (_, cert) = X509Certificate::from_der(identity.cert_der()).unwrap();

        assert!(identity.serial() <= i64::MAX as u64);
        assert_eq!(cert.raw_serial()[0] & 0x80, 0);
    }

    #[test]
    fn test_fallback_identities_are_distinct() {
        let a = FallbackIdentity::generate().unwrap();
        let b = FallbackIdentity::generate().unwrap();

        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_serial_error_keeps_source() {
        use std::error::Error as _;

        let err = IdentityError::SerialGeneration(rand::Error::new(std::io::Error::other("entropy")));

        assert!(err.to_string().contains("entropy"));
        assert!(err.source().is_some());
    }

    #[test]
    fn test_pem_matches_der() {
        let identity = FallbackIdentity::generate().unwrap();

        let certs: Vec<_> = rustls_pemfile::certs(&mut identity.cert_pem().as_bytes())
            .collect::<Result<_, _>>()
            .unwrap();

        assert_eq!(certs.len(), 1);
        assert_eq!(&certs[0], identity.cert_der());
        assert_eq!(identity.fingerprint().len(), 64);
    }
}
