//! Configuration linting
//!
//! Flags settings that are legal but unusual for a challenge test server.

use std::net::SocketAddr;

use super::{ValidationResult, ValidationWarning};
use crate::{Config, ACME_TLS_1_PROTOCOL};

/// Timeouts above this are almost certainly a misconfiguration
const MAX_SENSIBLE_TIMEOUT_SECS: u64 = 300;

/// Lint configuration
pub fn lint_config(config: &Config) -> ValidationResult {
    let mut result = ValidationResult::new();

    let tls = &config.tls_alpn;

    // Validators expect acme-tls/1 to win negotiation
    if tls
        .alpn_protocols
        .first()
        .is_some_and(|p| p != ACME_TLS_1_PROTOCOL)
        && tls.alpn_protocols.iter().any(|p| p == ACME_TLS_1_PROTOCOL)
    {
        result.add_warning(ValidationWarning::new(format!(
            "'{}' is not the first entry of tls-alpn alpn-protocols ({:?})",
            ACME_TLS_1_PROTOCOL, tls.alpn_protocols
        )));
    }

    for (name, secs) in [
        ("read-timeout-secs", tls.read_timeout_secs),
        ("write-timeout-secs", tls.write_timeout_secs),
    ] {
        if secs > MAX_SENSIBLE_TIMEOUT_SECS {
            result.add_warning(ValidationWarning::new(format!(
                "tls-alpn {} is {}s; validation attempts will hang that long on a stalled client",
                name, secs
            )));
        }
    }

    if config.management.enabled {
        if let Ok(addr) = config.management.address.parse::<SocketAddr>() {
            if !addr.ip().is_loopback() {
                result.add_warning(ValidationWarning::new(format!(
                    "Management API on {} is reachable from other hosts and is unauthenticated",
                    addr
                )));
            }
        }
    }

    result
}
