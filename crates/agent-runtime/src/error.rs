//! Error types for the reasoning loop

use agent_core::ToolCallRecord;
use thiserror::Error;

/// Why a reasoning run produced no answer
///
/// Capability failures never show up here; they are recorded on the
/// [`ToolCallRecord`]s and fed back to the model as observations.
#[derive(Error, Debug)]
pub enum ReasoningError {
    /// No provider in the fallback sequence could even be constructed
    #[error("No usable model provider: {0}")]
    NoProviders(String),

    /// Every provider in the sequence failed for the same step
    #[error("All model providers failed: {last_error}")]
    ProvidersExhausted {
        /// Error of the last provider tried
        last_error: String,
        /// Capability calls completed before the failure
        tool_calls: Vec<ToolCallRecord>,
    },

    /// The caller cancelled the run
    #[error("Reasoning cancelled")]
    Cancelled {
        /// Capability calls completed before cancellation
        tool_calls: Vec<ToolCallRecord>,
    },
}

impl ReasoningError {
    /// Capability calls made before the run stopped
    pub fn tool_calls(&self) -> &[ToolCallRecord] {
        match self {
            Self::NoProviders(_) => &[],
            Self::ProvidersExhausted { tool_calls, .. } | Self::Cancelled { tool_calls } => tool_calls,
        }
    }
}

impl From<ReasoningError> for agent_core::Error {
    fn from(e: ReasoningError) -> Self {
        match e {
            ReasoningError::Cancelled { .. } => Self::Cancelled,
            other => Self::ProcessingFailed(other.to_string()),
        }
    }
}
