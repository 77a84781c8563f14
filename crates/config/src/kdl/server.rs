//! Server and listener KDL parsing.

use tracing::trace;

use crate::{
    default_alpn_protocols, default_graceful_shutdown_timeout, default_management_address,
    default_management_enabled, default_read_timeout, default_tls_alpn_address,
    default_write_timeout, ConfigError, ManagementConfig, ServerConfig, TlsAlpnConfig,
};

use super::helpers::{get_bool_entry, get_int_entry, get_string_entry, get_string_list};

fn get_secs_entry(node: &kdl::KdlNode, block: &str, name: &str) -> Result<Option<u64>, ConfigError> {
    match get_int_entry(node, name) {
        None => Ok(None),
        Some(v) => u64::try_from(v).map(Some).map_err(|_| {
            ConfigError::invalid(block, format!("'{}' must be a non-negative integer, got {}", name, v))
        }),
    }
}

/// Parse server configuration block
pub fn parse_server_config(node: &kdl::KdlNode) -> Result<ServerConfig, ConfigError> {
    trace!("Parsing server configuration block");

    let config = ServerConfig {
        graceful_shutdown_timeout_secs: get_secs_entry(node, "server", "graceful-shutdown-timeout-secs")?
            .unwrap_or_else(default_graceful_shutdown_timeout),
    };

    trace!(
        graceful_shutdown_timeout_secs = config.graceful_shutdown_timeout_secs,
        "Parsed server configuration"
    );

    Ok(config)
}

/// Parse the TLS-ALPN-01 listener block
pub fn parse_tls_alpn_config(node: &kdl::KdlNode) -> Result<TlsAlpnConfig, ConfigError> {
    trace!("Parsing tls-alpn configuration block");

    let alpn_protocols = match get_string_list(node, "alpn-protocols") {
        Some(protocols) if protocols.is_empty() => {
            return Err(ConfigError::invalid(
                "tls-alpn",
                "'alpn-protocols' requires at least one protocol, e.g., alpn-protocols \"acme-tls/1\"",
            ));
        }
        Some(protocols) => protocols,
        None => default_alpn_protocols(),
    };

    let config = TlsAlpnConfig {
        address: get_string_entry(node, "address").unwrap_or_else(default_tls_alpn_address),
        read_timeout_secs: get_secs_entry(node, "tls-alpn", "read-timeout-secs")?
            .unwrap_or_else(default_read_timeout),
        write_timeout_secs: get_secs_entry(node, "tls-alpn", "write-timeout-secs")?
            .unwrap_or_else(default_write_timeout),
        alpn_protocols,
    };

    trace!(
        address = %config.address,
        alpn_protocols = ?config.alpn_protocols,
        "Parsed tls-alpn listener"
    );

    Ok(config)
}

/// Parse the management API block
pub fn parse_management_config(node: &kdl::KdlNode) -> Result<ManagementConfig, ConfigError> {
    trace!("Parsing management configuration block");

    let config = ManagementConfig {
        enabled: get_bool_entry(node, "enabled").unwrap_or_else(default_management_enabled),
        address: get_string_entry(node, "address").unwrap_or_else(default_management_address),
    };

    trace!(
        enabled = config.enabled,
        address = %config.address,
        "Parsed management listener"
    );

    Ok(config)
}
