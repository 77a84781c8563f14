//! Challenge Test Server Configuration
//!
//! Loads and validates the configuration for the TLS-ALPN-01 challenge test
//! server. Configuration is written in KDL; every field has a default so the
//! server can run without a configuration file at all.
//!
//! # Example
//!
//! ```kdl
//! server {
//!     graceful-shutdown-timeout-secs 10
//! }
//!
//! tls-alpn {
//!     address "0.0.0.0:5001"
//!     read-timeout-secs 5
//!     write-timeout-secs 5
//!     alpn-protocols "acme-tls/1" "http/1.1"
//! }
//!
//! management {
//!     enabled #true
//!     address "127.0.0.1:8055"
//! }
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

mod kdl;
pub mod validate;

pub use validate::{ErrorCategory, ValidationError, ValidationResult, ValidationWarning};

/// ALPN protocol identifier for the TLS-ALPN-01 challenge (RFC 8737)
pub const ACME_TLS_1_PROTOCOL: &str = "acme-tls/1";

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read configuration file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse KDL configuration: {0}")]
    Parse(String),

    #[error("Invalid configuration in '{block}': {message}")]
    Invalid { block: String, message: String },

    #[error("Configuration validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),
}

impl ConfigError {
    pub(crate) fn invalid(block: &str, message: impl Into<String>) -> Self {
        ConfigError::Invalid {
            block: block.to_string(),
            message: message.into(),
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Process-level settings
    #[serde(default)]
    pub server: ServerConfig,
    /// TLS-ALPN-01 challenge listener
    #[serde(default)]
    pub tls_alpn: TlsAlpnConfig,
    /// Plaintext management API listener
    #[serde(default)]
    pub management: ManagementConfig,
}

/// Process-level settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// How long shutdown waits for in-flight connections
    #[serde(default = "default_graceful_shutdown_timeout")]
    pub graceful_shutdown_timeout_secs: u64,
}

/// TLS-ALPN-01 listener settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TlsAlpnConfig {
    /// Socket address to bind
    #[serde(default = "default_tls_alpn_address")]
    pub address: String,
    /// Bound on the TLS handshake and request head read
    #[serde(default = "default_read_timeout")]
    pub read_timeout_secs: u64,
    /// Bound on writing the response
    #[serde(default = "default_write_timeout")]
    pub write_timeout_secs: u64,
    /// ALPN protocols the server is willing to negotiate, in preference order
    #[serde(default = "default_alpn_protocols")]
    pub alpn_protocols: Vec<String>,
}

/// Management API settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagementConfig {
    /// Whether the management listener is started
    #[serde(default = "default_management_enabled")]
    pub enabled: bool,
    /// Socket address to bind
    #[serde(default = "default_management_address")]
    pub address: String,
}

pub(crate) fn default_graceful_shutdown_timeout() -> u64 {
    10
}

pub(crate) fn default_tls_alpn_address() -> String {
    "0.0.0.0:5001".to_string()
}

pub(crate) fn default_read_timeout() -> u64 {
    5
}

pub(crate) fn default_write_timeout() -> u64 {
    5
}

pub(crate) fn default_alpn_protocols() -> Vec<String> {
    vec![ACME_TLS_1_PROTOCOL.to_string(), "http/1.1".to_string()]
}

pub(crate) fn default_management_enabled() -> bool {
    true
}

pub(crate) fn default_management_address() -> String {
    "0.0.0.0:8055".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            graceful_shutdown_timeout_secs: default_graceful_shutdown_timeout(),
        }
    }
}

impl Default for TlsAlpnConfig {
    fn default() -> Self {
        Self {
            address: default_tls_alpn_address(),
            read_timeout_secs: default_read_timeout(),
            write_timeout_secs: default_write_timeout(),
            alpn_protocols: default_alpn_protocols(),
        }
    }
}

impl Default for ManagementConfig {
    fn default() -> Self {
        Self {
            enabled: default_management_enabled(),
            address: default_management_address(),
        }
    }
}

impl ServerConfig {
    pub fn graceful_shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.graceful_shutdown_timeout_secs)
    }
}

impl TlsAlpnConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs)
    }

    /// ALPN protocols as the byte strings rustls expects
    pub fn alpn_protocol_bytes(&self) -> Vec<Vec<u8>> {
        self.alpn_protocols
            .iter()
            .map(|p| p.as_bytes().to_vec())
            .collect()
    }
}

impl Config {
    /// Load configuration from a KDL file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        debug!(path = %path.display(), "Read configuration file");

        let config = Self::from_kdl(&content)?;

        info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Parse configuration from KDL source text
    pub fn from_kdl(content: &str) -> Result<Self, ConfigError> {
        let doc: ::kdl::KdlDocument = content.parse().map_err(|e: ::kdl::KdlError| {
            ConfigError::Parse(format!("{:?}", miette::Report::new(e)))
        })?;

        self::kdl::parse_document(&doc)
    }

    /// Validate the configuration, returning every error found
    ///
    /// Warnings are logged but do not fail validation.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let result = validate::validate_config(self);

        for warning in &result.warnings {
            warn!("{}", warning.message);
        }

        if result.errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(
                result.errors.into_iter().map(|e| e.to_string()).collect(),
            ))
        }
    }
}
