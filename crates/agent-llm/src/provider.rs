//! LLM provider trait definition

use crate::{CompletionRequest, CompletionResponse, Result};
use async_trait::async_trait;

/// Receives text fragments as a provider generates them
pub type TextSink<'a> = dyn Fn(&str) + Send + Sync + 'a;

/// Trait for LLM providers
///
/// Implementations wrap one remote model service (OpenAI-compatible chat,
/// Anthropic messages, or a scripted stand-in for tests).
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Generate a completion from the LLM
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse>;

    /// Generate a completion, forwarding text to `sink` as it arrives
    ///
    /// The returned response is the same one `complete` would produce. The
    /// default implementation does not stream: it emits the whole text once.
    async fn complete_streaming(
        &self,
        request: CompletionRequest,
        sink: &TextSink<'_>,
    ) -> Result<CompletionResponse> {
        let response = self.complete(request).await?;
        let text = response.text();
        if !text.is_empty() {
            sink(&text);
        }
        Ok(response)
    }

    /// Get the provider name (e.g., "anthropic", "openai")
    fn name(&self) -> &str;
}
