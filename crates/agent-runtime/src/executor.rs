//! Reasoning executor
//!
//! The loop, one step at a time:
//! 1. Call the current provider with the conversation and the enabled capabilities
//! 2. A reply without tool requests is the final answer
//! 3. Otherwise invoke every requested capability, append the observations and loop
//!
//! A failing provider call advances to the next provider of the fallback
//! sequence and retries the same step on the same history. The switch is
//! sticky for the rest of the run.
//!
//! Streamed text is held per model call and forwarded only once the reply
//! turns out to be the final answer, so text from a failed attempt or from a
//! reply that requests capabilities never reaches the handler.

use crate::error::ReasoningError;
use agent_core::{ToolCallRecord, Usage};
use agent_llm::{
    CompletionRequest, CompletionResponse, ContentBlock, Message, MessageContent,
    ModelClientFactory, ProviderClient, ToolDefinition, ToolObservation,
};
use agent_tools::CapabilityRegistry;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::{Arc, Mutex, PoisonError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Callbacks fired while a run is in progress
///
/// Used to stream progress to a client. Every `on_tool_start` is followed by
/// exactly one `on_tool_done` for the same id.
#[async_trait]
pub trait ExecutorEventHandler: Send + Sync {
    /// A capability invocation is about to start
    async fn on_tool_start(&self, _id: &str, _name: &str, _input: &Value) {}

    /// A capability invocation finished (successfully or not)
    async fn on_tool_done(&self, _record: &ToolCallRecord) {}

    /// The model produced its final answer
    async fn on_complete(&self, _content: &str) {}

    /// A fragment of the final answer text
    fn on_text_delta(&self, _delta: &str) {}

    /// Whether model calls should stream text to [`Self::on_text_delta`]
    fn wants_text(&self) -> bool {
        false
    }
}

/// Handler that ignores every event
pub struct NoOpEventHandler;

#[async_trait]
impl ExecutorEventHandler for NoOpEventHandler {}

/// Configuration for a reasoning run
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Maximum number of model calls before giving up with a partial answer
    pub max_steps: usize,

    /// System prompt sent with every call
    pub system_prompt: String,

    /// Max tokens per completion
    pub max_tokens: usize,

    /// Temperature
    pub temperature: Option<f32>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_steps: 6,
            system_prompt: "You are a helpful assistant.".to_string(),
            max_tokens: 2048,
            temperature: Some(0.2),
        }
    }
}

/// Result of a run that produced content
#[derive(Debug, Clone)]
pub struct ReasoningOutcome {
    /// Final answer, or the best interim text when the step bound was hit
    pub content: String,
    /// Capability invocations in execution order
    pub tool_calls: Vec<ToolCallRecord>,
    /// Provider that produced the last reply
    pub provider_id: String,
    /// Model that produced the last reply
    pub model_id: String,
    /// Position of that provider in the fallback sequence
    pub provider_index: usize,
    /// Tokens summed over every model call
    pub usage: Usage,
    /// Number of model calls made
    pub steps: usize,
    /// The run stopped at `max_steps` without a final answer
    pub step_limit_reached: bool,
}

impl ReasoningOutcome {
    /// Whether a provider other than the primary produced the answer
    pub fn used_fallback(&self) -> bool {
        self.provider_index > 0
    }
}

/// Drives the think → act → observe loop
pub struct ReasoningExecutor {
    factory: Arc<ModelClientFactory>,
    registry: Arc<CapabilityRegistry>,
    config: ExecutorConfig,
}

/// Position in the provider fallback sequence
struct ProviderCursor {
    sequence: Vec<String>,
    index: usize,
    last_error: Option<String>,
}

impl ProviderCursor {
    /// Client for the current position, skipping providers that cannot be built
    fn current(&mut self, factory: &ModelClientFactory) -> Option<Arc<ProviderClient>> {
        while let Some(name) = self.sequence.get(self.index) {
            match factory.get_client(name, None) {
                Ok(client) => return Some(client),
                Err(e) => {
                    warn!(provider = %name, error = %e, "Provider unavailable; trying next");
                    self.last_error = Some(e.to_string());
                    self.index += 1;
                }
            }
        }
        None
    }

    fn advance(&mut self, factory: &ModelClientFactory, error: String) -> Option<Arc<ProviderClient>> {
        self.last_error = Some(error);
        self.index += 1;
        self.current(factory)
    }

    fn last_error(&self) -> String {
        self.last_error
            .clone()
            .unwrap_or_else(|| "no providers configured".to_string())
    }
}

impl ReasoningExecutor {
    /// Create an executor over a shared factory and registry
    pub fn new(
        factory: Arc<ModelClientFactory>,
        registry: Arc<CapabilityRegistry>,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            factory,
            registry,
            config,
        }
    }

    /// Executor configuration
    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Run the loop on `messages` until a final answer, the step bound,
    /// provider exhaustion or cancellation
    pub async fn run(
        &self,
        mut messages: Vec<Message>,
        handler: &dyn ExecutorEventHandler,
        cancel: &CancellationToken,
    ) -> Result<ReasoningOutcome, ReasoningError> {
        let mut cursor = ProviderCursor {
            sequence: self.factory.fallback_sequence(),
            index: 0,
            last_error: None,
        };
        let Some(mut client) = cursor.current(&self.factory) else {
            return Err(ReasoningError::NoProviders(cursor.last_error()));
        };

        let tools = self.tool_definitions();
        let mut tool_calls: Vec<ToolCallRecord> = Vec::new();
        let mut usage = Usage::default();
        let mut best_text = String::new();

        info!(
            provider = %client.provider_name(),
            max_steps = self.config.max_steps,
            tool_count = tools.len(),
            "Reasoning started"
        );

        for step in 1..=self.config.max_steps {
            if cancel.is_cancelled() {
                info!(step, "Reasoning cancelled");
                return Err(ReasoningError::Cancelled { tool_calls });
            }

            let request = self.build_request(&messages, &tools);
            let (response, pending) = loop {
                let attempt = tokio::select! {
                    biased;
                    () = cancel.cancelled() => {
                        info!(step, "Reasoning cancelled during model call");
                        return Err(ReasoningError::Cancelled { tool_calls });
                    }
                    r = Self::call(&client, request.clone(), handler) => r,
                };
                match attempt {
                    Ok(reply) => break reply,
                    Err(e) => {
                        warn!(
                            step,
                            provider = %client.provider_name(),
                            error = %e,
                            "Provider call failed; advancing fallback sequence"
                        );
                        match cursor.advance(&self.factory, e.to_string()) {
                            Some(next) => client = next,
                            None => {
                                return Err(ReasoningError::ProvidersExhausted {
                                    last_error: cursor.last_error(),
                                    tool_calls,
                                });
                            }
                        }
                    }
                }
            };

            usage += Usage::from(response.usage);
            debug!(
                step,
                provider = %client.provider_name(),
                stop_reason = ?response.stop_reason,
                input_tokens = response.usage.input_tokens,
                output_tokens = response.usage.output_tokens,
                "Model reply received"
            );

            if response.is_final() {
                let content = response.text();
                if pending.concat() == content {
                    for delta in &pending {
                        handler.on_text_delta(delta);
                    }
                } else if !content.is_empty() {
                    handler.on_text_delta(&content);
                }
                handler.on_complete(&content).await;
                info!(
                    steps = step,
                    provider = %client.provider_name(),
                    tool_calls = tool_calls.len(),
                    "Reasoning completed"
                );
                return Ok(ReasoningOutcome {
                    content,
                    tool_calls,
                    provider_id: client.provider_name().to_string(),
                    model_id: client.model().to_string(),
                    provider_index: cursor.index,
                    usage,
                    steps: step,
                    step_limit_reached: false,
                });
            }

            let interim = response.text();
            if !interim.trim().is_empty() {
                best_text = interim;
            }

            let assistant = with_call_ids(response);
            let calls = requested_calls(&assistant);
            messages.push(assistant);

            let mut observations = Vec::with_capacity(calls.len());
            for (id, name, input) in calls {
                if cancel.is_cancelled() {
                    info!(step, "Reasoning cancelled between capability calls");
                    return Err(ReasoningError::Cancelled { tool_calls });
                }
                handler.on_tool_start(&id, &name, &input).await;
                let record = invoke_capability(&self.registry, &id, &name, &input).await;
                handler.on_tool_done(&record).await;

                observations.push(observation(&record));
                tool_calls.push(record);
            }
            messages.push(Message::tool_results(observations));
        }

        warn!(
            max_steps = self.config.max_steps,
            tool_calls = tool_calls.len(),
            "Step bound reached without a final answer"
        );
        Ok(ReasoningOutcome {
            content: best_text,
            tool_calls,
            provider_id: client.provider_name().to_string(),
            model_id: client.model().to_string(),
            provider_index: cursor.index,
            usage,
            steps: self.config.max_steps,
            step_limit_reached: true,
        })
    }

    /// One model call, returning the reply and the text fragments it streamed
    async fn call(
        client: &ProviderClient,
        request: CompletionRequest,
        handler: &dyn ExecutorEventHandler,
    ) -> agent_llm::Result<(CompletionResponse, Vec<String>)> {
        if !handler.wants_text() {
            return Ok((client.complete(request).await?, Vec::new()));
        }
        let pending = Mutex::new(Vec::new());
        let sink = |delta: &str| {
            if !delta.is_empty() {
                pending
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(delta.to_string());
            }
        };
        let response = client.complete_streaming(request, &sink).await?;
        let pending = pending.into_inner().unwrap_or_else(PoisonError::into_inner);
        Ok((response, pending))
    }

    fn build_request(&self, messages: &[Message], tools: &[ToolDefinition]) -> CompletionRequest {
        // The client overwrites the model with its own
        let mut builder = CompletionRequest::builder(String::new())
            .messages(messages.to_vec())
            .system(self.config.system_prompt.clone())
            .max_tokens(self.config.max_tokens)
            .tools(tools.to_vec());
        if let Some(t) = self.config.temperature {
            builder = builder.temperature(t);
        }
        builder.build()
    }

    fn tool_definitions(&self) -> Vec<ToolDefinition> {
        self.registry
            .list_enabled()
            .iter()
            .map(|tool| ToolDefinition::new(tool.name(), tool.description(), tool.input_schema()))
            .collect()
    }
}

/// Invoke one capability through `registry` and record the outcome
///
/// Never fails: malformed arguments, unknown or disabled capabilities and
/// capability errors all become a failed [`ToolCallRecord`].
pub async fn invoke_capability(
    registry: &CapabilityRegistry,
    id: &str,
    name: &str,
    input: &Value,
) -> ToolCallRecord {
    let Some(arguments) = input.as_object().cloned() else {
        warn!(capability = %name, "Capability arguments are not a JSON object");
        return ToolCallRecord::failure(
            id,
            name,
            Map::new(),
            format!("invalid arguments for {name}: expected a JSON object"),
            None,
        );
    };
    let Some(tool) = registry.get_enabled(name) else {
        warn!(capability = %name, "Unknown or disabled capability requested");
        return ToolCallRecord::failure(
            id,
            name,
            arguments,
            format!("capability '{name}' is not available"),
            None,
        );
    };

    let invocation = tool.invoke(input).await;
    match invocation.outcome {
        Ok(result) => {
            info!(
                capability = %name,
                was_cached = invocation.was_cached,
                duration_ms = invocation.duration_ms,
                "Capability succeeded"
            );
            ToolCallRecord::success(
                id,
                name,
                arguments,
                result,
                invocation.was_cached,
                invocation.duration_ms,
            )
        }
        Err(message) => ToolCallRecord::failure(
            id,
            name,
            arguments,
            message,
            Some(invocation.duration_ms),
        ),
    }
}

/// Assistant message of `response` with an id on every tool use
fn with_call_ids(response: CompletionResponse) -> Message {
    let mut message = response.message;
    if let Some(MessageContent::Blocks(blocks)) = &mut message.content {
        for block in blocks.iter_mut() {
            if let ContentBlock::ToolUse { id, .. } = block {
                if id.is_empty() {
                    *id = format!("call_{}", uuid::Uuid::new_v4().simple());
                }
            }
        }
    }
    message
}

fn requested_calls(message: &Message) -> Vec<(String, String, Value)> {
    message
        .tool_uses()
        .into_iter()
        .filter_map(|block| match block {
            ContentBlock::ToolUse { id, name, input } => {
                Some((id.clone(), name.clone(), input.clone()))
            }
            _ => None,
        })
        .collect()
}

fn observation(record: &ToolCallRecord) -> ToolObservation {
    match (record.result(), record.error_message()) {
        (Some(result), _) => ToolObservation {
            tool_use_id: record.id().to_string(),
            content: serde_json::to_string(result).unwrap_or_else(|_| result.to_string()),
            is_error: false,
        },
        (None, error) => ToolObservation {
            tool_use_id: record.id().to_string(),
            content: format!("Error: {}", error.unwrap_or("unknown failure")),
            is_error: true,
        },
    }
}
