//! Error types for the finance agent

use thiserror::Error;

/// Finance agent errors
#[derive(Debug, Error)]
pub enum FinanceError {
    /// Upstream API returned an error payload
    #[error("API error: {0}")]
    Api(String),

    /// Symbol failed validation
    #[error("Invalid symbol: {0}")]
    InvalidSymbol(String),

    /// Capability arguments could not be understood
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    /// Data not available for the requested symbol
    #[error("Data not available for {symbol}: {reason}")]
    DataUnavailable {
        /// Requested symbol
        symbol: String,
        /// Upstream explanation
        reason: String,
    },

    /// Rate limit exceeded for API
    #[error("Rate limit exceeded for {provider}")]
    RateLimitExceeded {
        /// Provider name
        provider: String,
    },

    /// Network or HTTP error
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Yahoo Finance API error
    #[error("Yahoo Finance error: {0}")]
    YahooFinance(String),

    /// Alpha Vantage API error
    #[error("Alpha Vantage error: {0}")]
    AlphaVantage(String),

    /// Template rendering error
    #[error("Template error: {0}")]
    Template(#[from] minijinja::Error),

    /// Capability wiring error
    #[error("Registry error: {0}")]
    Registry(#[from] agent_tools::RegistryError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias for finance operations
pub type Result<T> = std::result::Result<T, FinanceError>;

impl From<FinanceError> for agent_core::Error {
    fn from(err: FinanceError) -> Self {
        match err {
            FinanceError::Config(_) | FinanceError::Registry(_) => {
                agent_core::Error::Configuration(err.to_string())
            }
            other => agent_core::Error::ProcessingFailed(other.to_string()),
        }
    }
}

impl From<agent_utils::ConfigError> for FinanceError {
    fn from(err: agent_utils::ConfigError) -> Self {
        FinanceError::Config(err.to_string())
    }
}
