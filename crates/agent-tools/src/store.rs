//! Key/value cache stores
//!
//! [`CacheStore`] is the contract the caching wrapper writes through.
//! [`MemoryStore`] is a bounded in-process implementation with per-entry
//! expiry; [`FailoverStore`] puts a networked store in front of a memory
//! store and falls back transparently when the networked one misbehaves.

use crate::error::StoreError;
use async_trait::async_trait;
use cached::{Cached, SizedCache};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Longest TTL any store keeps an entry for; longer TTLs are clamped
pub const MAX_TTL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Result type for store operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Reachability report of a store
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoreHealth {
    /// Store can serve reads and writes
    pub healthy: bool,
    /// Backend name
    pub backend: String,
    /// Free-form detail (entry count, fallback state)
    pub detail: String,
}

/// Key/value store with per-entry TTL
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Read a live entry; expired entries read as absent
    async fn get(&self, key: &str) -> StoreResult<Option<Value>>;

    /// Write an entry that expires after `ttl`
    async fn set_with_ttl(&self, key: &str, value: Value, ttl: Duration) -> StoreResult<()>;

    /// Remove an entry if present
    async fn delete(&self, key: &str) -> StoreResult<()>;

    /// Probe the backend without touching user entries
    async fn health_check(&self) -> StoreHealth;

    /// Backend name for logs
    fn name(&self) -> &str;
}

// ============================================================================
// In-memory store
// ============================================================================

const DEFAULT_CAPACITY: usize = 10_000;

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Instant,
}

/// Bounded LRU store with lazy expiry
///
/// Expired entries are removed when read; capacity pressure evicts the least
/// recently used entry.
pub struct MemoryStore {
    entries: Mutex<SizedCache<String, Entry>>,
}

impl MemoryStore {
    /// Create a store with the default capacity
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a store holding at most `capacity` entries
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(SizedCache::with_size(capacity.max(1))),
        }
    }

    /// Number of stored entries, expired or not
    pub async fn len(&self) -> usize {
        self.entries.lock().await.cache_size()
    }

    /// Whether the store holds no entries
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &str) -> StoreResult<Option<Value>> {
        let mut entries = self.entries.lock().await;
        let key = key.to_string();
        let expired = match entries.cache_get(&key) {
            Some(entry) if entry.expires_at > Instant::now() => return Ok(Some(entry.value.clone())),
            Some(_) => true,
            None => false,
        };
        if expired {
            debug!(key = %key, "Evicting expired entry");
            entries.cache_remove(&key);
        }
        Ok(None)
    }

    async fn set_with_ttl(&self, key: &str, value: Value, ttl: Duration) -> StoreResult<()> {
        let now = Instant::now();
        let entry = Entry {
            value,
            expires_at: now.checked_add(ttl.min(MAX_TTL)).unwrap_or(now),
        };
        self.entries.lock().await.cache_set(key.to_string(), entry);
        Ok(())
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        self.entries.lock().await.cache_remove(&key.to_string());
        Ok(())
    }

    async fn health_check(&self) -> StoreHealth {
        StoreHealth {
            healthy: true,
            backend: self.name().to_string(),
            detail: format!("{} entries", self.len().await),
        }
    }

    fn name(&self) -> &str {
        "memory"
    }
}

// ============================================================================
// Failover store
// ============================================================================

/// Networked store with a transparent in-memory fallback
///
/// Any primary error switches reads and writes to the fallback until the
/// primary reports healthy again during a health check.
pub struct FailoverStore {
    primary: Arc<dyn CacheStore>,
    fallback: MemoryStore,
    degraded: AtomicBool,
}

impl FailoverStore {
    /// Wrap `primary` with a default-capacity memory fallback
    pub fn new(primary: Arc<dyn CacheStore>) -> Self {
        Self {
            primary,
            fallback: MemoryStore::new(),
            degraded: AtomicBool::new(false),
        }
    }

    /// Whether requests are currently served by the fallback
    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::Relaxed)
    }

    fn degrade(&self, op: &str, error: &StoreError) {
        if !self.degraded.swap(true, Ordering::Relaxed) {
            warn!(backend = %self.primary.name(), op, error = %error, "Cache backend failed; using in-memory fallback");
        }
    }
}

#[async_trait]
impl CacheStore for FailoverStore {
    async fn get(&self, key: &str) -> StoreResult<Option<Value>> {
        if !self.is_degraded() {
            match self.primary.get(key).await {
                Ok(v) => return Ok(v),
                Err(e) => self.degrade("get", &e),
            }
        }
        self.fallback.get(key).await
    }

    async fn set_with_ttl(&self, key: &str, value: Value, ttl: Duration) -> StoreResult<()> {
        if !self.is_degraded() {
            match self.primary.set_with_ttl(key, value.clone(), ttl).await {
                Ok(()) => return Ok(()),
                Err(e) => self.degrade("set", &e),
            }
        }
        self.fallback.set_with_ttl(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        if !self.is_degraded() {
            if let Err(e) = self.primary.delete(key).await {
                self.degrade("delete", &e);
            }
        }
        self.fallback.delete(key).await
    }

    async fn health_check(&self) -> StoreHealth {
        let primary = self.primary.health_check().await;
        if primary.healthy {
            if self.degraded.swap(false, Ordering::Relaxed) {
                debug!(backend = %self.primary.name(), "Cache backend recovered");
            }
        } else {
            self.degraded.store(true, Ordering::Relaxed);
        }
        StoreHealth {
            // The fallback keeps the store usable either way
            healthy: true,
            backend: format!("{}+memory", primary.backend),
            detail: if primary.healthy {
                primary.detail
            } else {
                format!("primary unreachable ({}); serving from memory", primary.detail)
            },
        }
    }

    fn name(&self) -> &str {
        "failover"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// Store whose every call fails, or succeeds, depending on a switch
    struct FlakyStore {
        up: AtomicBool,
        inner: MemoryStore,
    }

    impl FlakyStore {
        fn check(&self) -> StoreResult<()> {
            if self.up.load(Ordering::SeqCst) {
                Ok(())
            } else {
                Err(StoreError::Unavailable("connection refused".to_string()))
            }
        }
    }

    #[async_trait]
    impl CacheStore for FlakyStore {
        async fn get(&self, key: &str) -> StoreResult<Option<Value>> {
            self.check()?;
            self.inner.get(key).await
        }
        async fn set_with_ttl(&self, key: &str, value: Value, ttl: Duration) -> StoreResult<()> {
            self.check()?;
            self.inner.set_with_ttl(key, value, ttl).await
        }
        async fn delete(&self, key: &str) -> StoreResult<()> {
            self.check()?;
            self.inner.delete(key).await
        }
        async fn health_check(&self) -> StoreHealth {
            StoreHealth {
                healthy: self.check().is_ok(),
                backend: "flaky".to_string(),
                detail: String::new(),
            }
        }
        fn name(&self) -> &str {
            "flaky"
        }
    }

    #[tokio::test]
    async fn test_memory_store_roundtrip_and_delete() {
        let store = MemoryStore::new();
        store
            .set_with_ttl("k", json!({"close": 1.5}), Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some(json!({"close": 1.5})));
        store.delete("k").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_memory_store_clamps_huge_ttl() {
        let store = MemoryStore::new();
        store
            .set_with_ttl("k", json!("kept"), Duration::MAX)
            .await
            .unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some(json!("kept")));
    }

    #[tokio::test]
    async fn test_memory_store_expires_lazily() {
        let store = MemoryStore::new();
        store
            .set_with_ttl("k", json!(1), Duration::from_millis(20))
            .await
            .unwrap();
        assert_eq!(store.len().await, 1);
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(store.get("k").await.unwrap(), None);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_memory_store_is_bounded() {
        let store = MemoryStore::with_capacity(2);
        for key in ["a", "b", "c"] {
            store
                .set_with_ttl(key, json!(key), Duration::from_secs(60))
                .await
                .unwrap();
        }
        assert_eq!(store.len().await, 2);
        assert_eq!(store.get("a").await.unwrap(), None);
        assert_eq!(store.get("c").await.unwrap(), Some(json!("c")));
    }

    #[tokio::test]
    async fn test_failover_switches_and_recovers() {
        let primary = Arc::new(FlakyStore {
            up: AtomicBool::new(true),
            inner: MemoryStore::new(),
        });
        let store = FailoverStore::new(primary.clone());

        store
            .set_with_ttl("k", json!("primary"), Duration::from_secs(60))
            .await
            .unwrap();
        assert!(!store.is_degraded());

        primary.up.store(false, Ordering::SeqCst);
        assert_eq!(store.get("k").await.unwrap(), None);
        assert!(store.is_degraded());
        store
            .set_with_ttl("k", json!("fallback"), Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some(json!("fallback")));

        let health = store.health_check().await;
        assert!(health.healthy);
        assert!(health.detail.contains("serving from memory"));

        primary.up.store(true, Ordering::SeqCst);
        store.health_check().await;
        assert!(!store.is_degraded());
        assert_eq!(store.get("k").await.unwrap(), Some(json!("primary")));
    }
}
