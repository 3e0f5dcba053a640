//! Caching capability wrapper
//!
//! [`CachedTool`] puts a [`Tool`] behind a shared [`CacheStore`]:
//!
//! - the cache key is `capability:<name>:<sha256 of canonical arguments>`,
//!   where canonical JSON has object keys sorted at every depth
//! - concurrent misses on one key are coalesced by a per-key async mutex,
//!   so the wrapped capability runs at most once per key at a time
//! - results are stored with the configured TTL plus random jitter
//! - failures and timeouts come back as structured errors and are never cached

use crate::store::{CacheStore, MAX_TTL, StoreHealth};
use crate::Tool;
use chrono::{DateTime, SecondsFormat, Utc};
use rand::Rng;
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Caching and timeout policy for one wrapped capability
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CachePolicy {
    /// Base time to live; zero disables caching
    pub ttl: Duration,
    /// Fraction of `ttl` added as uniform random jitter
    pub jitter: f64,
    /// Deadline for one execution of the capability
    pub timeout: Duration,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(300),
            jitter: 0.1,
            timeout: Duration::from_secs(15),
        }
    }
}

impl CachePolicy {
    /// TTL plus jitter, clamped to [`MAX_TTL`]
    fn jittered_ttl(&self) -> Duration {
        let ttl = self.ttl.min(MAX_TTL);
        if self.jitter.is_nan() || self.jitter <= 0.0 {
            return ttl;
        }
        let extra = rand::thread_rng().gen_range(0.0..=self.jitter.min(1.0));
        ttl.mul_f64(1.0 + extra).min(MAX_TTL)
    }
}

/// Outcome of one [`CachedTool::invoke`]
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    /// Result payload or a safe error message
    pub outcome: Result<Value, String>,
    /// Served from cache without executing the capability
    pub was_cached: bool,
    /// Wall-clock time spent in `invoke`
    pub duration_ms: u64,
}

/// Health details of a wrapped capability
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CapabilityHealth {
    /// Capability name
    pub name: String,
    /// Whether the capability is currently enabled in its registry
    pub enabled: bool,
    /// Cache backend is reachable
    pub healthy: bool,
    /// Cache backend report
    pub store: StoreHealth,
    /// RFC 3339 time of the last invocation, if any
    pub last_invocation: Option<String>,
}

/// A capability wrapped with caching, coalescing and error capture
pub struct CachedTool {
    tool: Arc<dyn Tool>,
    store: Arc<dyn CacheStore>,
    policy: CachePolicy,
    key_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    last_invocation: RwLock<Option<DateTime<Utc>>>,
}

impl std::fmt::Debug for CachedTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedTool")
            .field("name", &self.tool.name())
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

/// Removes a key's lock from the map once no other invocation holds it.
/// Runs on every exit path, including cancellation of the invoking future.
struct KeyLockRelease<'a> {
    owner: &'a CachedTool,
    key: &'a str,
}

impl Drop for KeyLockRelease<'_> {
    fn drop(&mut self) {
        let mut locks = self
            .owner
            .key_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        // Only the map still references the lock: nobody is waiting on it
        if locks.get(self.key).is_some_and(|l| Arc::strong_count(l) <= 1) {
            locks.remove(self.key);
        }
    }
}

impl CachedTool {
    /// Wrap `tool` with the given store and policy
    pub fn new(tool: Arc<dyn Tool>, store: Arc<dyn CacheStore>, policy: CachePolicy) -> Self {
        Self {
            tool,
            store,
            policy,
            key_locks: Mutex::new(HashMap::new()),
            last_invocation: RwLock::new(None),
        }
    }

    /// Capability name
    pub fn name(&self) -> &str {
        self.tool.name()
    }

    /// Capability description
    pub fn description(&self) -> &str {
        self.tool.description()
    }

    /// Argument schema
    pub fn input_schema(&self) -> Value {
        self.tool.input_schema()
    }

    /// Caching policy
    pub fn policy(&self) -> CachePolicy {
        self.policy
    }

    /// Deterministic cache key for `arguments`
    pub fn cache_key(&self, arguments: &Value) -> String {
        let canonical = canonical_json(&self.tool.canonical_arguments(arguments));
        let digest = Sha256::digest(canonical.as_bytes());
        format!("capability:{}:{}", self.tool.name(), hex::encode(digest))
    }

    /// Invoke the capability, serving from cache when possible
    ///
    /// Never fails: capability errors and timeouts are returned inside
    /// [`Invocation::outcome`].
    pub async fn invoke(&self, arguments: &Value) -> Invocation {
        let started = Instant::now();
        *self
            .last_invocation
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(Utc::now());

        let name = self.tool.name();
        let key = self.cache_key(arguments);

        if self.policy.ttl.is_zero() {
            let outcome = self.execute(arguments).await;
            return Self::finish(outcome, false, started);
        }

        if let Some(value) = self.lookup(&key).await {
            debug!(capability = %name, "Cache hit");
            return Self::finish(Ok(value), true, started);
        }

        let _release = KeyLockRelease { owner: self, key: &key };
        let _guard = self.key_lock(&key).lock_owned().await;

        // Another caller may have filled the entry while we waited
        if let Some(value) = self.lookup(&key).await {
            debug!(capability = %name, "Cache hit after coalesced wait");
            return Self::finish(Ok(value), true, started);
        }

        debug!(capability = %name, "Cache miss");
        let outcome = self.execute(arguments).await;
        if let Ok(value) = &outcome {
            let ttl = self.policy.jittered_ttl();
            if let Err(e) = self.store.set_with_ttl(&key, value.clone(), ttl).await {
                warn!(capability = %name, error = %e, "Failed to store result");
            }
        }
        Self::finish(outcome, false, started)
    }

    /// Report store reachability and the last invocation time
    ///
    /// Does not execute the wrapped capability.
    pub async fn health_check(&self, enabled: bool) -> CapabilityHealth {
        let store = self.store.health_check().await;
        let last_invocation = self
            .last_invocation
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .map(|t| t.to_rfc3339_opts(SecondsFormat::Millis, true));
        CapabilityHealth {
            name: self.tool.name().to_string(),
            enabled,
            healthy: store.healthy,
            store,
            last_invocation,
        }
    }

    async fn lookup(&self, key: &str) -> Option<Value> {
        match self.store.get(key).await {
            Ok(hit) => hit,
            Err(e) => {
                warn!(capability = %self.tool.name(), error = %e, "Cache read failed; treating as miss");
                None
            }
        }
    }

    async fn execute(&self, arguments: &Value) -> Result<Value, String> {
        let name = self.tool.name();
        match tokio::time::timeout(self.policy.timeout, self.tool.execute(arguments.clone())).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                warn!(capability = %name, error = %e, "Capability failed");
                Err(e.to_string())
            }
            Err(_) => {
                let ms = self.policy.timeout.as_millis();
                warn!(capability = %name, timeout_ms = ms as u64, "Capability timed out");
                Err(format!("{name} timed out after {ms} ms"))
            }
        }
    }

    fn key_lock(&self, key: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.key_locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(key.to_string()).or_default())
    }

    fn finish(outcome: Result<Value, String>, was_cached: bool, started: Instant) -> Invocation {
        Invocation {
            outcome,
            was_cached,
            duration_ms: started.elapsed().as_millis() as u64,
        }
    }

    #[cfg(test)]
    fn held_locks(&self) -> usize {
        self.key_locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// Serialize JSON with object keys sorted at every depth
///
/// Sorts explicitly because `serde_json/preserve_order` may be enabled by any
/// crate in the dependency graph, which makes `Value::to_string` keep insertion order.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, k) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(k.clone()).to_string());
                out.push(':');
                write_canonical(&map[k], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}
