//! Listener address validation

use std::net::SocketAddr;

use super::{ErrorCategory, ValidationError, ValidationResult};
use crate::Config;

/// Validate that listener addresses parse and do not collide
pub fn validate_addresses(config: &Config) -> ValidationResult {
    let mut result = ValidationResult::new();

    let tls_addr = parse_address(&mut result, "tls-alpn", &config.tls_alpn.address);

    if config.management.enabled {
        let mgmt_addr = parse_address(&mut result, "management", &config.management.address);

        if let (Some(tls), Some(mgmt)) = (tls_addr, mgmt_addr) {
            if tls == mgmt && tls.port() != 0 {
                result.add_error(ValidationError::new(
                    ErrorCategory::Network,
                    format!("tls-alpn and management listeners both bind {}", tls),
                ));
            }
        }
    }

    result
}

fn parse_address(result: &mut ValidationResult, block: &str, address: &str) -> Option<SocketAddr> {
    match address.parse::<SocketAddr>() {
        Ok(addr) => Some(addr),
        Err(e) => {
            result.add_error(ValidationError::new(
                ErrorCategory::Network,
                format!("{} address '{}' is not a socket address: {}", block, address, e),
            ));
            None
        }
    }
}
