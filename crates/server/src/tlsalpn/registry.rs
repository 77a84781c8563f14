//! TLS-ALPN-01 challenge registry
//!
//! Maps hostnames to the key authorization whose digest the challenge
//! certificate for that hostname must carry.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, trace};

/// Registered TLS-ALPN-01 challenges
///
/// Hostnames are compared ASCII case-insensitively, matching the lowercased
/// SNI value rustls hands to certificate resolvers. Registering a hostname
/// again replaces its key authorization.
///
/// # Thread Safety
///
/// A single `RwLock` guards the map. Lookups from concurrent handshakes share
/// the read lock; `add`, `delete` and `clear` take it exclusively. The lock is
/// only held for the map operation itself.
#[derive(Debug, Default)]
pub struct ChallengeRegistry {
    /// Map of lowercased hostname -> key authorization
    challenges: Arc<RwLock<HashMap<String, String>>>,
}

fn normalize(host: &str) -> String {
    host.to_ascii_lowercase()
}

impl ChallengeRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the key authorization for a hostname
    ///
    /// Overwrites any existing registration for the same hostname.
    pub fn add(&self, host: &str, key_authorization: &str) {
        let previous = self
            .challenges
            .write()
            .insert(normalize(host), key_authorization.to_string());

        debug!(
            host = %host,
            replaced = previous.is_some(),
            "Registered TLS-ALPN-01 challenge"
        );
    }

    /// Remove the registration for a hostname
    ///
    /// Removing a hostname that is not registered is a no-op.
    pub fn delete(&self, host: &str) {
        if self.challenges.write().remove(&normalize(host)).is_some() {
            debug!(host = %host, "Removed TLS-ALPN-01 challenge");
        }
    }

    /// Get the key authorization registered for a hostname
    pub fn get(&self, host: &str) -> Option<String> {
        let result = self.challenges.read().get(&normalize(host)).cloned();
        trace!(host = %host, found = result.is_some(), "TLS-ALPN-01 challenge lookup");
        result
    }

    /// Number of registered challenges
    pub fn len(&self) -> usize {
        self.challenges.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.challenges.read().is_empty()
    }

    /// Registered hostnames, sorted
    pub fn hosts(&self) -> Vec<String> {
        let mut hosts: Vec<String> = self.challenges.read().keys().cloned().collect();
        hosts.sort();
        hosts
    }

    /// Remove every registration
    pub fn clear(&self) {
        let mut challenges = self.challenges.write();
        let count = challenges.len();
        challenges.clear();
        if count > 0 {
            debug!(cleared = count, "Cleared all TLS-ALPN-01 challenges");
        }
    }
}

impl Clone for ChallengeRegistry {
    fn clone(&self) -> Self {
        Self {
            challenges: Arc::clone(&self.challenges),
        }
    }
}
