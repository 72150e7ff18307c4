//! In-process key-value store with lazy expiry
//!
//! A read drops the expired entry it finds. Writes sweep the whole map once
//! the earliest recorded expiry has passed, so keys that are never read
//! again do not accumulate.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::trace;

use super::{KeyValueStore, StoreError};

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Instant,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

#[derive(Debug, Default)]
struct Entries {
    map: HashMap<String, Entry>,
    // Lower bound on the earliest expiry in `map`
    next_expiry: Option<Instant>,
}

impl Entries {
    fn insert(&mut self, key: String, entry: Entry, now: Instant) {
        if self.next_expiry.is_some_and(|at| at <= now) {
            self.sweep(now);
        }
        self.next_expiry = Some(match self.next_expiry {
            Some(at) => at.min(entry.expires_at),
            None => entry.expires_at,
        });
        self.map.insert(key, entry);
    }

    fn sweep(&mut self, now: Instant) {
        let before = self.map.len();
        self.map.retain(|_, entry| entry.is_live(now));
        self.next_expiry = self.map.values().map(|entry| entry.expires_at).min();
        trace!(removed = before - self.map.len(), "memory store swept");
    }
}

/// In-memory [`KeyValueStore`]
///
/// Cloning shares the underlying map.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<RwLock<Entries>>,
}

impl MemoryStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Remaining lifetime of a live key
    pub async fn ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        let entries = self.entries.read().await;
        entries
            .map
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.expires_at.saturating_duration_since(now))
    }

    /// Number of live entries
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        let entries = self.entries.read().await;
        entries.map.values().filter(|entry| entry.is_live(now)).count()
    }

    /// Whether no live entries remain
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    fn is_enabled(&self) -> bool {
        true
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        let now = Instant::now();
        let entry = Entry {
            value: value.to_string(),
            expires_at: now
                .checked_add(ttl)
                .ok_or_else(|| StoreError::Operation(format!("ttl too large for {key}")))?,
        };
        self.entries
            .write()
            .await
            .insert(key.to_string(), entry, now);
        trace!(key, ttl_ms = ttl.as_millis() as u64, "memory store set");
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let now = Instant::now();
        {
            let entries = self.entries.read().await;
            match entries.map.get(key) {
                None => return Ok(None),
                Some(entry) if entry.is_live(now) => return Ok(Some(entry.value.clone())),
                Some(_) => {}
            }
        }

        // Expired: drop it unless a writer replaced it in the meantime.
        let mut entries = self.entries.write().await;
        if entries.map.get(key).is_some_and(|entry| !entry.is_live(now)) {
            entries.map.remove(key);
        }
        Ok(None)
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.entries.write().await.map.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_get_delete() {
        let store = MemoryStore::new();
        store.set("a", "1", Duration::from_secs(60)).await.unwrap();

        assert_eq!(store.get("a").await.unwrap().as_deref(), Some("1"));
        assert_eq!(store.get("missing").await.unwrap(), None);

        store.delete("a").await.unwrap();
        assert_eq!(store.get("a").await.unwrap(), None);
        // Deleting twice is fine
        store.delete("a").await.unwrap();
    }

    #[tokio::test]
    async fn test_set_overwrites_value_and_ttl() {
        let store = MemoryStore::new();
        store.set("a", "1", Duration::from_secs(5)).await.unwrap();
        store.set("a", "2", Duration::from_secs(600)).await.unwrap();

        assert_eq!(store.get("a").await.unwrap().as_deref(), Some("2"));
        let ttl = store.ttl("a").await.unwrap();
        assert!(ttl > Duration::from_secs(590));
    }

    #[tokio::test]
    async fn test_entries_expire() {
        let store = MemoryStore::new();
        store.set("a", "1", Duration::from_millis(20)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;

        assert_eq!(store.get("a").await.unwrap(), None);
        assert_eq!(store.ttl("a").await, None);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_writes_sweep_expired_keys_that_are_never_read() {
        let store = MemoryStore::new();
        for i in 0..1000 {
            store
                .set(&format!("jwt:blacklist:{i}"), "blacklisted", Duration::from_millis(1))
                .await
                .unwrap();
        }
        store.set("keep", "1", Duration::from_secs(60)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        store.set("fresh", "1", Duration::from_secs(60)).await.unwrap();

        assert_eq!(store.entries.read().await.map.len(), 2);
        assert_eq!(store.len().await, 2);
        assert_eq!(store.get("keep").await.unwrap().as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn test_no_sweep_before_earliest_expiry() {
        let store = MemoryStore::new();
        store.set("a", "1", Duration::from_secs(60)).await.unwrap();
        store.set("b", "2", Duration::from_secs(30)).await.unwrap();

        let entries = store.entries.read().await;
        assert_eq!(entries.map.len(), 2);
        assert_eq!(entries.next_expiry, Some(entries.map["b"].expires_at));
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let store = MemoryStore::new();
        let other = store.clone();
        store.set("a", "1", Duration::from_secs(60)).await.unwrap();
        assert_eq!(other.get("a").await.unwrap().as_deref(), Some("1"));
        assert_eq!(other.len().await, 1);
    }
}
