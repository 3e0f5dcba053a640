//! Capability layer for agent-rs
//!
//! - [`Tool`]: a named data-fetching capability
//! - [`CacheStore`]: key/value contract with [`MemoryStore`] and [`FailoverStore`]
//! - [`CachedTool`]: caching, coalescing, timeout and error capture around a tool
//! - [`CapabilityRegistry`]: the shared catalog of wrapped capabilities

pub mod error;
pub mod registry;
pub mod store;
pub mod tool;
pub mod wrapper;

pub use error::{RegistryError, StoreError};
pub use registry::{CacheSettings, CapabilityDescriptor, CapabilityRegistry, RegistryHealth};
pub use store::{CacheStore, FailoverStore, MAX_TTL, MemoryStore, StoreHealth, StoreResult};
pub use tool::Tool;
pub use wrapper::{CachePolicy, CachedTool, CapabilityHealth, Invocation, canonical_json};
