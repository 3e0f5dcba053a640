//! Core Agent trait definition

use crate::{AgentResponse, Context, Result};
use async_trait::async_trait;

/// Core trait that all query agents implement
///
/// An agent turns one natural-language query into exactly one immutable
/// [`AgentResponse`]. Degraded behaviour (fallback providers, template
/// answers) is reported through [`AgentResponse::status`], so `Err` is
/// reserved for failures the agent could not turn into a response at all.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Process a query within a session context
    async fn process(&self, input: String, context: &mut Context) -> Result<AgentResponse>;

    /// Get the agent's name
    fn name(&self) -> &str;
}
