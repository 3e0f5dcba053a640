//! Shared utilities for agent-rs
//!
//! This crate provides common functionality used across the agent-rs workspace:
//! tracing setup and the small helpers configuration loaders are built from.

pub mod config;
pub mod logging;

pub use config::{ConfigError, env_list, env_parse, env_var, load_json, split_list};
pub use logging::{init_tracing, init_tracing_json};
