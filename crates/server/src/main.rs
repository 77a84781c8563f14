//! Challenge Test Server - Main entry point
//!
//! Answers TLS-ALPN-01 validation handshakes for hostnames registered through
//! the management API.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::watch;
use tracing::{info, warn};

use challtestsrv::{shutdown_signal, ChallengeServer, NotFoundHandler};
use challtestsrv_config::Config;

/// Challenge Test Server - TLS-ALPN-01 responder for ACME testing
#[derive(Parser, Debug)]
#[command(name = "challtestsrv")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short = 'c', long = "config", env = "CHALLTESTSRV_CONFIG")]
    config: Option<String>,

    /// Test configuration and exit
    #[arg(short = 't', long = "test")]
    test: bool,

    /// Enable verbose logging (debug level)
    #[arg(long = "verbose")]
    verbose: bool,

    /// Override the TLS-ALPN-01 listen address
    #[arg(long = "tls-alpn-address", env = "CHALLTESTSRV_TLS_ALPN_ADDRESS")]
    tls_alpn_address: Option<String>,

    /// Override the management API listen address
    #[arg(long = "management-address", env = "CHALLTESTSRV_MANAGEMENT_ADDRESS")]
    management_address: Option<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .init();

    let config = load_config(&cli)?;

    if cli.test {
        return test_config(&config, cli.config.as_deref());
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?;

    runtime.block_on(run_server(config))
}

/// Load the configuration file (or defaults), apply CLI overrides and validate
fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => {
            info!("Loading configuration from: {}", path);
            Config::from_file(path).context("Failed to load configuration file")?
        }
        None => {
            info!("No configuration specified, using defaults");
            Config::default()
        }
    };

    if let Some(address) = &cli.tls_alpn_address {
        config.tls_alpn.address = address.clone();
    }
    if let Some(address) = &cli.management_address {
        config.management.address = address.clone();
    }

    config
        .validate()
        .context("Configuration validation failed")?;

    Ok(config)
}

/// Print the effective configuration and exit
fn test_config(config: &Config, config_path: Option<&str>) -> Result<()> {
    info!("Configuration test successful:");
    info!("  - tls-alpn listener: {}", config.tls_alpn.address);
    if config.management.enabled {
        info!("  - management listener: {}", config.management.address);
    } else {
        info!("  - management listener: disabled");
    }

    println!(
        "{}",
        serde_json::to_string_pretty(config).context("Failed to serialize configuration")?
    );
    println!(
        "challtestsrv: configuration {} test is successful",
        config_path.unwrap_or("(defaults)")
    );

    Ok(())
}

async fn wait_for_shutdown(mut rx: watch::Receiver<bool>) {
    // A dropped sender also means shutdown
    let _ = rx.wait_for(|stop| *stop).await;
}

async fn run_server(config: Config) -> Result<()> {
    let grace_period = config.server.graceful_shutdown_timeout();

    let server = ChallengeServer::new(config).context("Failed to generate TLS identities")?;

    info!(
        fingerprint = %server.fallback_identity().fingerprint(),
        serial = server.fallback_identity().serial(),
        "Fallback certificate ready"
    );

    let tls_alpn = server
        .tls_alpn_server(Arc::new(NotFoundHandler))
        .await
        .context("Failed to start TLS-ALPN-01 listener")?;
    let management = server
        .management_server()
        .await
        .context("Failed to start management API listener")?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let management_rx = shutdown_rx.clone();
    let serving = async move {
        tokio::join!(tls_alpn.serve(wait_for_shutdown(shutdown_rx)), async move {
            if let Some(management) = management {
                management.serve(wait_for_shutdown(management_rx)).await;
            }
        });
    };
    tokio::pin!(serving);

    info!("Challenge test server started");

    let signal = tokio::select! {
        _ = &mut serving => {
            warn!("Listeners stopped without a shutdown signal");
            return Ok(());
        }
        signal = shutdown_signal() => signal,
    };

    info!(
        signal = %signal,
        grace_period_secs = grace_period.as_secs(),
        "Shutting down"
    );
    let _ = shutdown_tx.send(true);

    match tokio::time::timeout(grace_period, serving).await {
        Ok(()) => info!("Shutdown complete"),
        Err(_) => warn!(
            grace_period_secs = grace_period.as_secs(),
            "Graceful shutdown timed out, aborting in-flight connections"
        ),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_cli_overrides_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
tls-alpn {{
    address "127.0.0.1:15001"
}}
management {{
    address "127.0.0.1:18055"
}}
"#
        )
        .unwrap();

        let path = file.path().to_str().unwrap();
        let cli = Cli::try_parse_from([
            "challtestsrv",
            "--config",
            path,
            "--tls-alpn-address",
            "127.0.0.1:25001",
        ])
        .unwrap();

        let config = load_config(&cli).unwrap();

        assert_eq!(config.tls_alpn.address, "127.0.0.1:25001");
        assert_eq!(config.management.address, "127.0.0.1:18055");
    }

    #[test]
    fn test_invalid_override_fails_validation() {
        let cli = Cli::try_parse_from([
            "challtestsrv",
            "--config",
            "/dev/null",
            "--management-address",
            "not-an-address",
        ])
        .unwrap();

        assert!(load_config(&cli).is_err());
    }
}
