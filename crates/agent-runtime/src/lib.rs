//! Reasoning runtime for agent-rs
//!
//! [`ReasoningExecutor`] runs the think → act → observe loop: it asks a model
//! what to do, invokes the requested capabilities through the shared
//! registry, feeds the observations back and repeats until the model answers
//! or the step bound is hit. Provider failures advance through the
//! factory's fallback sequence without losing the conversation so far.

pub mod error;
pub mod executor;

pub use error::ReasoningError;
pub use executor::{
    ExecutorConfig, ExecutorEventHandler, NoOpEventHandler, ReasoningExecutor, ReasoningOutcome,
    invoke_capability,
};
