//! Configuration validation
//!
//! Errors make a configuration unusable; warnings flag settings that work
//! but are probably not what a test harness wants.

use std::fmt;

mod lint;
mod network;

pub use lint::lint_config;
pub use network::validate_addresses;

use crate::{Config, ACME_TLS_1_PROTOCOL};

/// What part of the configuration an error relates to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Network,
    Timeout,
    Protocol,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::Network => write!(f, "network"),
            ErrorCategory::Timeout => write!(f, "timeout"),
            ErrorCategory::Protocol => write!(f, "protocol"),
        }
    }
}

/// A configuration error
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub category: ErrorCategory,
    pub message: String,
}

impl ValidationError {
    pub fn new(category: ErrorCategory, message: String) -> Self {
        Self { category, message }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.category, self.message)
    }
}

/// A non-fatal configuration issue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationWarning {
    pub message: String,
}

impl ValidationWarning {
    pub fn new(message: String) -> Self {
        Self { message }
    }
}

/// Accumulated validation outcome
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: ValidationWarning) {
        self.warnings.push(warning);
    }

    pub fn merge(&mut self, other: ValidationResult) {
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }

    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Run every validation pass over the configuration
pub fn validate_config(config: &Config) -> ValidationResult {
    let mut result = validate_addresses(config);

    let tls = &config.tls_alpn;
    if tls.read_timeout_secs == 0 {
        result.add_error(ValidationError::new(
            ErrorCategory::Timeout,
            "tls-alpn read-timeout-secs must be greater than zero".to_string(),
        ));
    }
    if tls.write_timeout_secs == 0 {
        result.add_error(ValidationError::new(
            ErrorCategory::Timeout,
            "tls-alpn write-timeout-secs must be greater than zero".to_string(),
        ));
    }

    if !tls.alpn_protocols.iter().any(|p| p == ACME_TLS_1_PROTOCOL) {
        result.add_error(ValidationError::new(
            ErrorCategory::Protocol,
            format!(
                "tls-alpn alpn-protocols must include '{}', got {:?}",
                ACME_TLS_1_PROTOCOL, tls.alpn_protocols
            ),
        ));
    }

    result.merge(lint_config(config));
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let result = validate_config(&Config::default());
        assert!(result.is_ok(), "{:?}", result.errors);
    }

    #[test]
    fn test_missing_challenge_protocol() {
        let mut config = Config::default();
        config.tls_alpn.alpn_protocols = vec!["h2".to_string()];

        let result = validate_config(&config);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].category, ErrorCategory::Protocol);
    }

    #[test]
    fn test_zero_write_timeout() {
        let mut config = Config::default();
        config.tls_alpn.write_timeout_secs = 0;

        let result = validate_config(&config);
        assert!(result
            .errors
            .iter()
            .any(|e| e.category == ErrorCategory::Timeout && e.message.contains("write")));
    }
}
