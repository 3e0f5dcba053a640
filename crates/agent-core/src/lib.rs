//! Core abstractions for agent-rs query agents
//!
//! This crate defines the fundamental traits and types shared by every layer:
//! the [`Agent`] trait, the per-session [`Context`], the immutable
//! [`AgentResponse`] that leaves the agent boundary, and the core [`Error`].

pub mod agent;
pub mod context;
pub mod error;
pub mod response;

pub use agent::Agent;
pub use context::Context;
pub use error::{Error, Result};
pub use response::{AgentResponse, AgentResponseBuilder, ResponseStatus, ToolCallRecord, Usage};
