//! Capability registry
//!
//! One registry instance is built at startup and shared by every query. It
//! owns the [`CachedTool`] wrappers, their enabled flags and the cache
//! policy each one was registered with.

use crate::error::{RegistryError, Result};
use crate::store::CacheStore;
use crate::wrapper::{CachePolicy, CachedTool, CapabilityHealth};
use crate::Tool;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tracing::info;

/// Registry-wide caching defaults plus per-capability TTL overrides
#[derive(Debug, Clone, PartialEq)]
pub struct CacheSettings {
    /// TTL for capabilities without an override
    pub default_ttl: Duration,
    /// TTL overrides keyed by capability name
    pub ttls: HashMap<String, Duration>,
    /// Fraction of TTL added as random jitter
    pub jitter: f64,
    /// Per-call capability timeout
    pub timeout: Duration,
}

impl Default for CacheSettings {
    fn default() -> Self {
        let defaults = CachePolicy::default();
        Self {
            default_ttl: defaults.ttl,
            ttls: HashMap::new(),
            jitter: defaults.jitter,
            timeout: defaults.timeout,
        }
    }
}

impl CacheSettings {
    fn policy_for(&self, name: &str) -> CachePolicy {
        CachePolicy {
            ttl: self.ttls.get(name).copied().unwrap_or(self.default_ttl),
            jitter: self.jitter,
            timeout: self.timeout,
        }
    }
}

/// Public view of one registration
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CapabilityDescriptor {
    /// Unique capability name
    pub name: String,
    /// Cache TTL in seconds
    pub ttl_seconds: u64,
    /// Whether the capability may be invoked
    pub enabled: bool,
}

/// Aggregate registry health
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegistryHealth {
    /// Every enabled capability reports healthy
    pub healthy: bool,
    /// Per-capability detail in registration order
    pub capabilities: Vec<CapabilityHealth>,
}

struct Registration {
    tool: Arc<CachedTool>,
    enabled: bool,
}

#[derive(Default)]
struct Entries {
    by_name: HashMap<String, Registration>,
    order: Vec<String>,
}

/// Catalog of wrapped capabilities
pub struct CapabilityRegistry {
    entries: RwLock<Entries>,
    store: Arc<dyn CacheStore>,
    settings: CacheSettings,
}

impl CapabilityRegistry {
    /// Create an empty registry writing through `store`
    pub fn new(store: Arc<dyn CacheStore>, settings: CacheSettings) -> Self {
        Self {
            entries: RwLock::new(Entries::default()),
            store,
            settings,
        }
    }

    /// Register an enabled capability; duplicate names are rejected
    pub fn register(&self, tool: Arc<dyn Tool>) -> Result<()> {
        self.register_with(tool, true, false)
    }

    /// Register with explicit flags
    ///
    /// With `replace = false` a second registration under the same name fails
    /// with [`RegistryError::DuplicateCapability`]. With `replace = true` the
    /// old wrapper is swapped out in place, keeping its listing position.
    pub fn register_with(&self, tool: Arc<dyn Tool>, enabled: bool, replace: bool) -> Result<()> {
        let name = tool.name().to_string();
        let policy = self.settings.policy_for(&name);
        let wrapped = Arc::new(CachedTool::new(tool, Arc::clone(&self.store), policy));

        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if entries.by_name.contains_key(&name) {
            if !replace {
                return Err(RegistryError::DuplicateCapability(name));
            }
        } else {
            entries.order.push(name.clone());
        }
        info!(capability = %name, ttl_secs = policy.ttl.as_secs(), enabled, "Registered capability");
        entries.by_name.insert(
            name,
            Registration {
                tool: wrapped,
                enabled,
            },
        );
        Ok(())
    }

    /// Look up a capability regardless of its enabled flag
    pub fn get(&self, name: &str) -> Option<Arc<CachedTool>> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .by_name
            .get(name)
            .map(|r| Arc::clone(&r.tool))
    }

    /// Look up a capability only if it is enabled
    pub fn get_enabled(&self, name: &str) -> Option<Arc<CachedTool>> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .by_name
            .get(name)
            .filter(|r| r.enabled)
            .map(|r| Arc::clone(&r.tool))
    }

    /// Enabled capabilities in registration order
    pub fn list_enabled(&self) -> Vec<Arc<CachedTool>> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries
            .order
            .iter()
            .filter_map(|n| entries.by_name.get(n))
            .filter(|r| r.enabled)
            .map(|r| Arc::clone(&r.tool))
            .collect()
    }

    /// Toggle a capability at runtime
    pub fn set_enabled(&self, name: &str, enabled: bool) -> Result<()> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let registration = entries
            .by_name
            .get_mut(name)
            .ok_or_else(|| RegistryError::UnknownCapability(name.to_string()))?;
        registration.enabled = enabled;
        info!(capability = %name, enabled, "Capability toggled");
        Ok(())
    }

    /// Descriptors for every registration, in registration order
    pub fn descriptors(&self) -> Vec<CapabilityDescriptor> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries
            .order
            .iter()
            .filter_map(|n| entries.by_name.get(n))
            .map(|r| CapabilityDescriptor {
                name: r.tool.name().to_string(),
                ttl_seconds: r.tool.policy().ttl.as_secs(),
                enabled: r.enabled,
            })
            .collect()
    }

    /// Number of registrations
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .order
            .len()
    }

    /// Whether nothing is registered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Shared cache store
    pub fn store(&self) -> &Arc<dyn CacheStore> {
        &self.store
    }

    /// Health of every capability; disabled ones do not affect the aggregate
    pub async fn health_check(&self) -> RegistryHealth {
        let snapshot: Vec<(Arc<CachedTool>, bool)> = {
            let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
            entries
                .order
                .iter()
                .filter_map(|n| entries.by_name.get(n))
                .map(|r| (Arc::clone(&r.tool), r.enabled))
                .collect()
        };

        let mut capabilities = Vec::with_capacity(snapshot.len());
        for (tool, enabled) in snapshot {
            capabilities.push(tool.health_check(enabled).await);
        }
        RegistryHealth {
            healthy: capabilities.iter().filter(|c| c.enabled).all(|c| c.healthy),
            capabilities,
        }
    }
}
