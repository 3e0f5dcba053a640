//! Capability trait definition

use agent_core::Result;
use async_trait::async_trait;
use serde_json::Value;

/// A named unit of external data access the agent can invoke
///
/// Implementations are plain fetchers: caching, timeouts and error capture
/// are added by [`CachedTool`](crate::CachedTool).
#[async_trait]
pub trait Tool: Send + Sync {
    /// Execute with JSON arguments matching [`Tool::input_schema`]
    async fn execute(&self, params: Value) -> Result<Value>;

    /// Unique name, also used as the function name advertised to models
    fn name(&self) -> &str;

    /// Description the model reads to decide when to call this capability
    fn description(&self) -> &str;

    /// JSON Schema for the arguments
    ///
    /// ```
    /// use serde_json::json;
    ///
    /// let schema = json!({
    ///     "type": "object",
    ///     "properties": { "symbol": { "type": "string" } },
    ///     "required": ["symbol"]
    /// });
    /// assert_eq!(schema["required"][0], "symbol");
    /// ```
    fn input_schema(&self) -> Value;

    /// Normalise arguments before they are hashed into a cache key
    ///
    /// Arguments that mean the same thing should normalise to the same value
    /// (for example an upper-cased ticker). The default is the identity.
    fn canonical_arguments(&self, params: &Value) -> Value {
        params.clone()
    }
}
