//! Shutdown signal handling
//!
//! Bridges SIGINT and SIGTERM into the async runtime so listeners can stop
//! accepting and drain.

use tracing::{debug, warn};

/// Signal that ended the serve loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalType {
    /// Ctrl-C (SIGINT)
    Interrupt,
    /// SIGTERM
    Terminate,
}

impl std::fmt::Display for SignalType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SignalType::Interrupt => write!(f, "SIGINT"),
            SignalType::Terminate => write!(f, "SIGTERM"),
        }
    }
}

/// Wait for the first shutdown signal
///
/// If a handler cannot be installed the corresponding branch never resolves,
/// so the process can still be stopped through the other signal.
pub async fn shutdown_signal() -> SignalType {
    let interrupt = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {}
            Err(e) => {
                warn!(error = %e, "Failed to install SIGINT handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let signal = tokio::select! {
        _ = interrupt => SignalType::Interrupt,
        _ = terminate => SignalType::Terminate,
    };

    debug!(signal = %signal, "Received shutdown signal");
    signal
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_display() {
        assert_eq!(SignalType::Interrupt.to_string(), "SIGINT");
        assert_eq!(SignalType::Terminate.to_string(), "SIGTERM");
    }
}
