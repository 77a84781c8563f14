//! KDL configuration parsing.

use tracing::trace;

use crate::{Config, ConfigError};

mod helpers;
mod server;

/// Parse a whole configuration document
pub fn parse_document(doc: &kdl::KdlDocument) -> Result<Config, ConfigError> {
    let mut config = Config::default();

    for node in doc.nodes() {
        match node.name().value() {
            "server" => config.server = server::parse_server_config(node)?,
            "tls-alpn" => config.tls_alpn = server::parse_tls_alpn_config(node)?,
            "management" => config.management = server::parse_management_config(node)?,
            other => {
                return Err(ConfigError::invalid(
                    other,
                    "Unknown top-level block. Valid blocks: server, tls-alpn, management",
                ));
            }
        }
    }

    trace!(config = ?config, "Parsed configuration document");
    Ok(config)
}
