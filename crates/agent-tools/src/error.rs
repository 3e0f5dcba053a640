//! Error types for the capability layer

use thiserror::Error;

/// Startup wiring errors raised by the registry
///
/// These indicate a programming or configuration mistake and are returned
/// from registration, never from query-time calls.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// A capability with this name is already registered
    #[error("Capability '{0}' is already registered")]
    DuplicateCapability(String),

    /// No capability with this name is registered
    #[error("Unknown capability '{0}'")]
    UnknownCapability(String),
}

/// Cache backend failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Backend could not be reached
    #[error("Cache backend unavailable: {0}")]
    Unavailable(String),

    /// Stored payload could not be decoded
    #[error("Corrupt cache entry: {0}")]
    Corrupt(String),
}

/// Result type for registry operations
pub type Result<T> = std::result::Result<T, RegistryError>;

impl From<RegistryError> for agent_core::Error {
    fn from(e: RegistryError) -> Self {
        agent_core::Error::Configuration(e.to_string())
    }
}
