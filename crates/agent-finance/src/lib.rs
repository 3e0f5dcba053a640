//! Financial query agent
//!
//! Answers natural-language questions about stocks. It includes:
//!
//! - Semantic intent classification over embedding prototypes, with a local
//!   fallback embedder
//! - Market data capabilities (quotes, symbol search, fundamentals, news)
//!   wrapped with caching and request coalescing
//! - A reasoning path driven by model providers with ordered fallback
//! - Deterministic template answers when no model provider is usable
//! - Streaming progress events and aggregated health reporting
//!
//! # Architecture
//!
//! [`FinanceAgent`] routes each query to one of three paths:
//! - **DirectCall**: confident price checks and symbol lookups call a single
//!   capability and fill a template
//! - **Reasoning**: the model loop from `agent-runtime` decides which
//!   capabilities to call
//! - **Template**: per-intent handlers in [`fallback`] call capabilities
//!   directly when no provider is configured or the classifier is degraded
//!
//! # Example
//!
//! ```rust,ignore
//! use agent_core::Context;
//! use agent_finance::{FinanceAgent, FinanceConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = FinanceConfig::builder().from_env()?.build()?;
//!     let agent = FinanceAgent::from_config(config).await?;
//!
//!     let mut ctx = Context::new();
//!     let response = agent.process_query("What is AAPL trading at?", &mut ctx).await?;
//!     println!("[{}] {}", response.status(), response.content());
//!     Ok(())
//! }
//! ```

pub mod agent;
pub mod api;
pub mod config;
pub mod error;
pub mod fallback;
pub mod intent;
pub mod prompts;
pub mod router;
pub mod source;
pub mod symbols;
pub mod tools;

pub use agent::{AgentMode, FinanceAgent, FinanceAgentBuilder, HealthReport, StreamEvent};
pub use config::{FinanceConfig, FinanceConfigBuilder, capabilities};
pub use error::{FinanceError, Result};
pub use intent::Intent;
pub use router::{ClassificationResult, ClassifierHealth, SemanticRouter};
pub use source::{LiveMarketData, MarketDataSource, NewsDigest};
pub use symbols::SymbolExtractor;
