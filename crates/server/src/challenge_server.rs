//! Challenge server
//!
//! Owns the registry and the certificate issuer, and hands out the
//! listeners that serve them.

use std::sync::Arc;

use tracing::info;

use challtestsrv_config::Config;

use crate::management::ManagementServer;
use crate::server::{RequestHandler, ServerError, TlsAlpnServer};
use crate::tlsalpn::{ChallengeCertIssuer, ChallengeRegistry, FallbackIdentity, IdentityError};

/// TLS-ALPN-01 challenge test server
///
/// Registration calls take effect on the next handshake, including on
/// listeners that are already serving.
#[derive(Debug)]
pub struct ChallengeServer {
    config: Config,
    registry: ChallengeRegistry,
    issuer: Arc<ChallengeCertIssuer>,
}

impl ChallengeServer {
    /// Create a server with a fresh fallback identity and challenge signing key
    ///
    /// # Errors
    ///
    /// Fails when key or certificate generation fails. The server cannot
    /// run without them.
    pub fn new(config: Config) -> Result<Self, IdentityError> {
        let registry = ChallengeRegistry::new();
        let issuer = Arc::new(ChallengeCertIssuer::new(registry.clone())?);

        info!(
            fallback_fingerprint = %issuer.fallback().fingerprint(),
            "Challenge server initialized"
        );

        Ok(Self {
            config,
            registry,
            issuer,
        })
    }

    /// Register the key authorization served for `host`
    pub fn add_tls_alpn_challenge(&self, host: &str, key_authorization: &str) {
        self.registry.add(host, key_authorization);
    }

    /// Stop answering challenges for `host`
    pub fn delete_tls_alpn_challenge(&self, host: &str) {
        self.registry.delete(host);
    }

    pub fn get_tls_alpn_challenge(&self, host: &str) -> Option<String> {
        self.registry.get(host)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Registry handle shared with the listeners
    pub fn registry(&self) -> &ChallengeRegistry {
        &self.registry
    }

    pub fn issuer(&self) -> Arc<ChallengeCertIssuer> {
        Arc::clone(&self.issuer)
    }

    pub fn fallback_identity(&self) -> &FallbackIdentity {
        self.issuer.fallback()
    }

    /// Bind the TLS-ALPN-01 listener
    pub async fn tls_alpn_server(
        &self,
        handler: Arc<dyn RequestHandler>,
    ) -> Result<TlsAlpnServer, ServerError> {
        TlsAlpnServer::bind(&self.config.tls_alpn, self.issuer(), handler).await
    }

    /// Bind the management listener, if it is enabled
    pub async fn management_server(&self) -> Result<Option<ManagementServer>, ServerError> {
        if !self.config.management.enabled {
            info!("Management API disabled");
            return Ok(None);
        }

        let server = ManagementServer::bind(&self.config.management.address, self.registry.clone())
            .await?;
        Ok(Some(server))
    }
}
