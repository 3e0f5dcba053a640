//! Immutable response types
//!
//! [`AgentResponse`] is the only object that crosses the agent's output
//! boundary. It is built exactly once through [`AgentResponseBuilder`] and
//! exposes read-only accessors afterwards. Every capability invocation made
//! while answering a query is captured as a [`ToolCallRecord`].

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Terminal status of a query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResponseStatus {
    /// Answered by the first provider or without any model call
    Success,
    /// Answered, but by a degraded path (later provider or template mode)
    Fallback,
    /// No answer could be produced
    Error,
    /// Best-effort answer after hitting the reasoning step bound
    Partial,
}

impl ResponseStatus {
    /// Whether the response carries a usable answer
    pub fn is_answer(self) -> bool {
        !matches!(self, Self::Error)
    }
}

impl std::fmt::Display for ResponseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Success => "SUCCESS",
            Self::Fallback => "FALLBACK",
            Self::Error => "ERROR",
            Self::Partial => "PARTIAL",
        };
        f.write_str(s)
    }
}

/// Token accounting summed over every model call of a query
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    /// Prompt tokens
    pub input_tokens: usize,
    /// Generated tokens
    pub output_tokens: usize,
}

impl Usage {
    /// Total tokens used
    pub fn total(&self) -> usize {
        self.input_tokens + self.output_tokens
    }
}

impl std::ops::AddAssign for Usage {
    fn add_assign(&mut self, rhs: Self) {
        self.input_tokens += rhs.input_tokens;
        self.output_tokens += rhs.output_tokens;
    }
}

/// Record of one capability invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRecord {
    id: String,
    name: String,
    arguments: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_message: Option<String>,
    was_cached: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration_ms: Option<u64>,
}

impl ToolCallRecord {
    /// Record a successful invocation
    pub fn success(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: Map<String, Value>,
        result: Value,
        was_cached: bool,
        duration_ms: u64,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
            result: Some(result),
            error_message: None,
            was_cached,
            duration_ms: Some(duration_ms),
        }
    }

    /// Record a failed invocation
    pub fn failure(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: Map<String, Value>,
        error_message: impl Into<String>,
        duration_ms: Option<u64>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
            result: None,
            error_message: Some(error_message.into()),
            was_cached: false,
            duration_ms,
        }
    }

    /// Invocation id (pairs tool start/end stream events)
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Capability name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Arguments the capability was called with
    pub fn arguments(&self) -> &Map<String, Value> {
        &self.arguments
    }

    /// Result payload, if the call succeeded
    pub fn result(&self) -> Option<&Value> {
        self.result.as_ref()
    }

    /// Error message, if the call failed
    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    /// Whether the result was served from cache
    pub fn was_cached(&self) -> bool {
        self.was_cached
    }

    /// Wall-clock duration of the call
    pub fn duration_ms(&self) -> Option<u64> {
        self.duration_ms
    }

    /// Whether the call succeeded
    pub fn is_success(&self) -> bool {
        self.error_message.is_none()
    }
}

/// Terminal output of a query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentResponse {
    content: String,
    tool_calls: Vec<ToolCallRecord>,
    status: ResponseStatus,
    model_id: String,
    provider_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    token_usage: Option<Usage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    latency_ms: Option<u64>,
    timestamp_iso: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl AgentResponse {
    /// Start building a response with the given status
    pub fn builder(status: ResponseStatus) -> AgentResponseBuilder {
        AgentResponseBuilder::new(status)
    }

    /// Answer text shown to the user
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Capability invocations in execution order
    pub fn tool_calls(&self) -> &[ToolCallRecord] {
        &self.tool_calls
    }

    /// Terminal status
    pub fn status(&self) -> ResponseStatus {
        self.status
    }

    /// Model that produced the answer ("none" when no model was involved)
    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    /// Provider that produced the answer ("none" when no model was involved)
    pub fn provider_id(&self) -> &str {
        &self.provider_id
    }

    /// Token usage across all model calls
    pub fn token_usage(&self) -> Option<Usage> {
        self.token_usage
    }

    /// End-to-end latency
    pub fn latency_ms(&self) -> Option<u64> {
        self.latency_ms
    }

    /// RFC 3339 creation timestamp
    pub fn timestamp_iso(&self) -> &str {
        &self.timestamp_iso
    }

    /// Internal error detail kept for debugging; never shown as content
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }
}

/// Builder for [`AgentResponse`]
#[derive(Debug)]
pub struct AgentResponseBuilder {
    content: String,
    tool_calls: Vec<ToolCallRecord>,
    status: ResponseStatus,
    model_id: String,
    provider_id: String,
    token_usage: Option<Usage>,
    latency_ms: Option<u64>,
    error: Option<String>,
}

impl AgentResponseBuilder {
    /// Create a new builder
    pub fn new(status: ResponseStatus) -> Self {
        Self {
            content: String::new(),
            tool_calls: Vec::new(),
            status,
            model_id: "none".to_string(),
            provider_id: "none".to_string(),
            token_usage: None,
            latency_ms: None,
            error: None,
        }
    }

    /// Set the answer text
    pub fn content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    /// Set the tool call trace
    pub fn tool_calls(mut self, tool_calls: Vec<ToolCallRecord>) -> Self {
        self.tool_calls = tool_calls;
        self
    }

    /// Set the producing provider and model
    pub fn model(mut self, provider_id: impl Into<String>, model_id: impl Into<String>) -> Self {
        self.provider_id = provider_id.into();
        self.model_id = model_id.into();
        self
    }

    /// Set token usage
    pub fn token_usage(mut self, usage: Usage) -> Self {
        self.token_usage = Some(usage);
        self
    }

    /// Set latency
    pub fn latency_ms(mut self, latency_ms: u64) -> Self {
        self.latency_ms = Some(latency_ms);
        self
    }

    /// Attach internal error detail
    pub fn error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Build the response, stamping the creation time
    pub fn build(self) -> AgentResponse {
        AgentResponse {
            content: self.content,
            tool_calls: self.tool_calls,
            status: self.status,
            model_id: self.model_id,
            provider_id: self.provider_id,
            token_usage: self.token_usage,
            latency_ms: self.latency_ms,
            timestamp_iso: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            error: self.error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn args(symbol: &str) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("symbol".to_string(), json!(symbol));
        map
    }

    #[test]
    fn test_builder_defaults() {
        let response = AgentResponse::builder(ResponseStatus::Success)
            .content("AAPL is trading at 190.12")
            .build();

        assert_eq!(response.status(), ResponseStatus::Success);
        assert_eq!(response.provider_id(), "none");
        assert_eq!(response.model_id(), "none");
        assert!(response.tool_calls().is_empty());
        assert!(response.timestamp_iso().ends_with('Z'));
    }

    #[test]
    fn test_tool_call_records() {
        let ok = ToolCallRecord::success("1", "stock_quote", args("AAPL"), json!({"close": 1.0}), true, 3);
        assert!(ok.is_success());
        assert!(ok.was_cached());
        assert_eq!(ok.arguments()["symbol"], "AAPL");

        let failed = ToolCallRecord::failure("2", "stock_quote", args("ZZZZ"), "no data", None);
        assert!(!failed.is_success());
        assert!(!failed.was_cached());
        assert_eq!(failed.error_message(), Some("no data"));
        assert!(failed.result().is_none());
    }

    #[test]
    fn test_status_serialization() {
        assert_eq!(serde_json::to_string(&ResponseStatus::Fallback).unwrap(), "\"FALLBACK\"");
        assert_eq!(ResponseStatus::Partial.to_string(), "PARTIAL");
        assert!(!ResponseStatus::Error.is_answer());
        assert!(ResponseStatus::Partial.is_answer());
    }

    #[test]
    fn test_usage_accumulates() {
        let mut usage = Usage::default();
        usage += Usage { input_tokens: 10, output_tokens: 5 };
        usage += Usage { input_tokens: 1, output_tokens: 2 };
        assert_eq!(usage.total(), 18);
    }

    #[test]
    fn test_error_detail_is_not_content() {
        let response = AgentResponse::builder(ResponseStatus::Error)
            .content("The request could not be completed.")
            .error("HTTP 500: upstream exploded")
            .build();

        assert!(!response.content().contains("HTTP 500"));
        assert_eq!(response.error(), Some("HTTP 500: upstream exploded"));
    }
}
