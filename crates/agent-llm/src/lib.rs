//! LLM provider abstraction layer for agent-rs
//!
//! This crate provides provider-agnostic abstractions for interacting with
//! Large Language Models (LLMs) and embedding models. It includes:
//!
//! - Message types for LLM communication
//! - Completion request/response types
//! - Tool definitions for function calling
//! - Provider trait for LLM implementations, with a streaming variant
//! - Embedding providers (remote and local)
//! - The [`ModelClientFactory`] that caches clients and orders provider fallback
//! - Concrete provider implementations (behind feature flags)

pub mod completion;
pub mod embeddings;
pub mod error;
pub mod factory;
pub mod messages;
pub mod provider;
pub mod tools;

// Re-export main types
pub use completion::{CompletionRequest, CompletionResponse, RequestedCall, StopReason, TokenUsage};
pub use embeddings::{EmbeddingProvider, LocalEmbeddings, OpenAIEmbeddings, cosine_similarity};
pub use error::{LLMError, Result};
pub use factory::{FactoryHealth, ModelClientFactory, ModelClientFactoryBuilder, ProviderClient, ProviderSpec};
pub use messages::{ContentBlock, Message, MessageContent, Role, ToolObservation};
pub use provider::{LLMProvider, TextSink};
pub use tools::ToolDefinition;

// Provider implementations (feature-gated)
pub mod providers;
