//! Revocation ledger
//!
//! A revoked token is stored verbatim under `jwt:blacklist:<token>` with a TTL
//! equal to its remaining lifetime, so the ledger never outgrows the set of
//! tokens that could still verify.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::store::{KeyValueStore, StoreError};

/// Key prefix for revoked tokens
pub const REVOCATION_KEY_PREFIX: &str = "jwt:blacklist:";

/// Value written for a revoked token
pub const REVOKED_MARKER: &str = "blacklisted";

/// Revoked-token ledger on top of a [`KeyValueStore`]
#[derive(Debug, Clone)]
pub struct RevocationLedger {
    store: Arc<dyn KeyValueStore>,
}

impl RevocationLedger {
    /// Wrap a store
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Store key for `token`
    #[must_use]
    pub fn key_for(token: &str) -> String {
        format!("{REVOCATION_KEY_PREFIX}{token}")
    }

    /// Whether the underlying store is on
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.store.is_enabled()
    }

    /// Record `token` as revoked for `ttl`
    ///
    /// Concurrent revocations of one token simply overwrite each other.
    ///
    /// # Errors
    ///
    /// Propagates store failures, including [`StoreError::Disabled`].
    pub async fn revoke(&self, token: &str, ttl: Duration) -> Result<(), StoreError> {
        self.store
            .set(&Self::key_for(token), REVOKED_MARKER, ttl)
            .await?;
        debug!(ttl_secs = ttl.as_secs(), "token added to revocation ledger");
        Ok(())
    }

    /// Whether `token` is currently revoked
    ///
    /// # Errors
    ///
    /// Propagates store failures, including [`StoreError::Disabled`].
    pub async fn is_revoked(&self, token: &str) -> Result<bool, StoreError> {
        let value = self.store.get(&Self::key_for(token)).await?;
        Ok(value.as_deref() == Some(REVOKED_MARKER))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{DisabledStore, MemoryStore};

    #[tokio::test]
    async fn test_revoke_writes_marker_with_ttl() {
        let store = MemoryStore::new();
        let ledger = RevocationLedger::new(Arc::new(store.clone()));

        ledger.revoke("abc", Duration::from_secs(120)).await.unwrap();

        assert_eq!(
            store.get("jwt:blacklist:abc").await.unwrap().as_deref(),
            Some("blacklisted")
        );
        let ttl = store.ttl("jwt:blacklist:abc").await.unwrap();
        assert!(ttl <= Duration::from_secs(120) && ttl > Duration::from_secs(115));
        assert!(ledger.is_revoked("abc").await.unwrap());
        assert!(!ledger.is_revoked("other").await.unwrap());
    }

    #[tokio::test]
    async fn test_foreign_value_is_not_revocation() {
        let store = MemoryStore::new();
        store
            .set("jwt:blacklist:abc", "something-else", Duration::from_secs(60))
            .await
            .unwrap();
        let ledger = RevocationLedger::new(Arc::new(store));
        assert!(!ledger.is_revoked("abc").await.unwrap());
    }

    #[tokio::test]
    async fn test_disabled_store_propagates() {
        let ledger = RevocationLedger::new(Arc::new(DisabledStore));
        assert!(!ledger.is_enabled());
        assert_eq!(
            ledger.revoke("abc", Duration::from_secs(1)).await,
            Err(StoreError::Disabled)
        );
        assert_eq!(ledger.is_revoked("abc").await, Err(StoreError::Disabled));
    }
}
