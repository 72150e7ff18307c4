//! Key-value storage for short-lived authentication state
//!
//! The revocation ledger, verification codes and reset tokens all live in an
//! external key-value store with per-entry expiry. This module defines the
//! [`KeyValueStore`] seam and ships three implementations:
//!
//! - [`MemoryStore`] - in-process map with lazy expiry (tests, single-node dev)
//! - [`DisabledStore`] - placeholder used when the deployment has no store
//! - `RedisStore` - Redis-backed store (feature `redis-store`)
//!
//! A store can be *disabled* by configuration. Callers must tell that case
//! apart from an outage, so [`StoreError::Disabled`] is its own variant.

mod memory;
#[cfg(feature = "redis-store")]
mod redis;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use memory::MemoryStore;
#[cfg(feature = "redis-store")]
pub use redis::RedisStore;

/// Key-value store errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// The store is turned off by configuration
    #[error("key-value store is disabled")]
    Disabled,

    /// The store could not be reached
    #[error("key-value store unavailable: {0}")]
    Unavailable(String),

    /// The store was reached but the command failed
    #[error("key-value store operation failed: {0}")]
    Operation(String),
}

/// Expiring string key-value store
///
/// Not-found is `Ok(None)`, never an error. Entries disappear once their TTL
/// elapses; implementations may expire lazily.
#[async_trait]
pub trait KeyValueStore: Send + Sync + std::fmt::Debug {
    /// Whether the store is configured on
    fn is_enabled(&self) -> bool;

    /// Store `value` under `key`, replacing any previous value and TTL
    ///
    /// # Errors
    ///
    /// [`StoreError::Disabled`] when turned off, otherwise backend failures.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError>;

    /// Fetch a live value
    ///
    /// # Errors
    ///
    /// [`StoreError::Disabled`] when turned off, otherwise backend failures.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Remove `key`; deleting a missing key succeeds
    ///
    /// # Errors
    ///
    /// [`StoreError::Disabled`] when turned off, otherwise backend failures.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;
}

/// Store that rejects every operation with [`StoreError::Disabled`]
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledStore;

#[async_trait]
impl KeyValueStore for DisabledStore {
    fn is_enabled(&self) -> bool {
        false
    }

    async fn set(&self, _key: &str, _value: &str, _ttl: Duration) -> Result<(), StoreError> {
        Err(StoreError::Disabled)
    }

    async fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
        Err(StoreError::Disabled)
    }

    async fn delete(&self, _key: &str) -> Result<(), StoreError> {
        Err(StoreError::Disabled)
    }
}
