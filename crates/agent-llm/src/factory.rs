//! Model client factory
//!
//! Builds provider clients on demand, caches them per `(provider, model)` for
//! the life of the process, and derives the ordered provider fallback
//! sequence from configuration. Clients are immutable once built; changing a
//! provider's settings replaces its cached clients instead of editing them.

use crate::{CompletionRequest, CompletionResponse, LLMError, LLMProvider, Result, TextSink};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tracing::{debug, info};

#[cfg(feature = "anthropic")]
use crate::providers::AnthropicProvider;
#[cfg(feature = "openai")]
use crate::providers::{OpenAIConfig, OpenAIProvider};

const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(60);

/// How to construct a provider
#[derive(Clone)]
pub enum ProviderSpec {
    /// OpenAI or any OpenAI-compatible endpoint
    #[cfg(feature = "openai")]
    OpenAI(OpenAIConfig),
    /// Anthropic messages API
    #[cfg(feature = "anthropic")]
    Anthropic {
        /// API key
        api_key: String,
        /// Optional endpoint override
        api_base: Option<String>,
    },
    /// An already-built provider (local models, test doubles)
    Custom(Arc<dyn LLMProvider>),
}

impl std::fmt::Debug for ProviderSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            #[cfg(feature = "openai")]
            Self::OpenAI(c) => f.debug_tuple("OpenAI").field(&c.api_base).finish(),
            #[cfg(feature = "anthropic")]
            Self::Anthropic { api_base, .. } => {
                f.debug_struct("Anthropic").field("api_base", api_base).finish()
            }
            Self::Custom(p) => f.debug_tuple("Custom").field(&p.name()).finish(),
        }
    }
}

impl ProviderSpec {
    fn build(&self, timeout: Duration) -> Result<Arc<dyn LLMProvider>> {
        match self {
            #[cfg(feature = "openai")]
            Self::OpenAI(config) => {
                let config = config.clone().with_timeout(timeout.as_secs().max(1));
                Ok(Arc::new(OpenAIProvider::with_config(config)?))
            }
            #[cfg(feature = "anthropic")]
            Self::Anthropic { api_key, api_base } => Ok(Arc::new(AnthropicProvider::with_options(
                api_key.clone(),
                api_base.clone(),
                timeout,
            )?)),
            Self::Custom(provider) => Ok(Arc::clone(provider)),
        }
    }
}

/// A provider bound to one model
///
/// Cheap to clone and safe to share across concurrent queries.
#[derive(Clone)]
pub struct ProviderClient {
    provider_name: String,
    model: String,
    timeout: Duration,
    provider: Arc<dyn LLMProvider>,
}

impl std::fmt::Debug for ProviderClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderClient")
            .field("provider", &self.provider_name)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl ProviderClient {
    /// Provider name as configured
    pub fn provider_name(&self) -> &str {
        &self.provider_name
    }

    /// Model this client targets
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Run a completion with this client's model and timeout
    pub async fn complete(&self, mut request: CompletionRequest) -> Result<CompletionResponse> {
        request.model.clone_from(&self.model);
        tokio::time::timeout(self.timeout, self.provider.complete(request))
            .await
            .map_err(|_| LLMError::Timeout(self.timeout.as_millis() as u64))?
    }

    /// Streaming completion with this client's model and timeout
    pub async fn complete_streaming(
        &self,
        mut request: CompletionRequest,
        sink: &TextSink<'_>,
    ) -> Result<CompletionResponse> {
        request.model.clone_from(&self.model);
        tokio::time::timeout(self.timeout, self.provider.complete_streaming(request, sink))
            .await
            .map_err(|_| LLMError::Timeout(self.timeout.as_millis() as u64))?
    }
}

/// Snapshot of the factory for health reporting
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct FactoryHealth {
    /// At least one provider in the sequence is configured
    pub healthy: bool,
    /// Ordered fallback sequence
    pub sequence: Vec<String>,
    /// Providers with a registered spec
    pub configured: Vec<String>,
    /// Number of cached clients
    pub cached_clients: usize,
}

/// Builds and caches [`ProviderClient`]s
pub struct ModelClientFactory {
    specs: RwLock<HashMap<String, ProviderSpec>>,
    default_models: HashMap<String, String>,
    primary: String,
    fallback_order: Vec<String>,
    call_timeout: Duration,
    clients: RwLock<HashMap<(String, String), Arc<ProviderClient>>>,
}

impl std::fmt::Debug for ModelClientFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelClientFactory")
            .field("primary", &self.primary)
            .field("fallback_order", &self.fallback_order)
            .finish_non_exhaustive()
    }
}

impl ModelClientFactory {
    /// Start configuring a factory
    pub fn builder() -> ModelClientFactoryBuilder {
        ModelClientFactoryBuilder::default()
    }

    /// Get the client for `(provider, model)`, building it on first use
    ///
    /// `model = None` selects the provider's configured default model.
    pub fn get_client(&self, provider: &str, model: Option<&str>) -> Result<Arc<ProviderClient>> {
        let model = match model {
            Some(m) => m.to_string(),
            None => self.default_model(provider).ok_or_else(|| {
                LLMError::ConfigurationError(format!("No default model for provider '{provider}'"))
            })?,
        };
        let key = (provider.to_string(), model);

        if let Some(client) = self
            .clients
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
        {
            return Ok(Arc::clone(client));
        }

        // Held until the client is cached, so a concurrent `reconfigure` or
        // `remove` always runs after the insert and drops the stale client
        let specs = self.specs.read().unwrap_or_else(PoisonError::into_inner);
        let spec = specs
            .get(provider)
            .ok_or_else(|| LLMError::Unavailable(format!("provider '{provider}' is not configured")))?;

        let built = spec.build(self.call_timeout)?;
        let client = Arc::new(ProviderClient {
            provider_name: key.0.clone(),
            model: key.1.clone(),
            timeout: self.call_timeout,
            provider: built,
        });

        let mut clients = self.clients.write().unwrap_or_else(PoisonError::into_inner);
        // Another caller may have raced us; keep whichever landed first
        let entry = clients.entry(key).or_insert_with(|| {
            debug!(provider = %client.provider_name, model = %client.model, "Built provider client");
            Arc::clone(&client)
        });
        Ok(Arc::clone(entry))
    }

    /// Primary provider first, then the fallback order, de-duplicated
    pub fn fallback_sequence(&self) -> Vec<String> {
        let mut seq: Vec<String> = Vec::with_capacity(self.fallback_order.len() + 1);
        for name in std::iter::once(&self.primary).chain(self.fallback_order.iter()) {
            if !name.is_empty() && !seq.contains(name) {
                seq.push(name.clone());
            }
        }
        seq
    }

    /// Default model for a provider
    pub fn default_model(&self, provider: &str) -> Option<String> {
        self.default_models.get(provider).cloned()
    }

    /// Whether any provider of the sequence can produce a client
    pub fn is_available(&self) -> bool {
        self.fallback_sequence()
            .iter()
            .any(|p| self.get_client(p, None).is_ok())
    }

    /// Replace one provider's spec, dropping its cached clients
    pub fn reconfigure(&self, provider: &str, spec: ProviderSpec) {
        self.specs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(provider.to_string(), spec);
        self.clients
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|(p, _), _| p != provider);
        info!(provider, "Provider reconfigured; cached clients invalidated");
    }

    /// Forget a provider; the fallback sequence then skips it
    pub fn remove(&self, provider: &str) {
        let removed = self
            .specs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(provider)
            .is_some();
        self.clients
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|(p, _), _| p != provider);
        if removed {
            info!(provider, "Provider removed");
        }
    }

    /// Drop every cached client
    pub fn invalidate(&self) {
        self.clients
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Health snapshot
    pub fn health(&self) -> FactoryHealth {
        let sequence = self.fallback_sequence();
        let specs = self.specs.read().unwrap_or_else(PoisonError::into_inner);
        let mut configured: Vec<String> = specs.keys().cloned().collect();
        configured.sort();
        FactoryHealth {
            healthy: sequence.iter().any(|p| specs.contains_key(p)),
            sequence,
            configured,
            cached_clients: self
                .clients
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .len(),
        }
    }
}

/// Builder for [`ModelClientFactory`]
#[derive(Debug, Default)]
pub struct ModelClientFactoryBuilder {
    specs: HashMap<String, ProviderSpec>,
    default_models: HashMap<String, String>,
    primary: Option<String>,
    fallback_order: Vec<String>,
    call_timeout: Option<Duration>,
}

impl ModelClientFactoryBuilder {
    /// Register a provider under `name` with its default model
    pub fn provider(
        mut self,
        name: impl Into<String>,
        spec: ProviderSpec,
        default_model: impl Into<String>,
    ) -> Self {
        let name = name.into();
        self.default_models.insert(name.clone(), default_model.into());
        self.specs.insert(name, spec);
        self
    }

    /// Set a default model without configuring the provider
    pub fn model(mut self, provider: impl Into<String>, model: impl Into<String>) -> Self {
        self.default_models.insert(provider.into(), model.into());
        self
    }

    /// Set the primary provider
    pub fn primary(mut self, name: impl Into<String>) -> Self {
        self.primary = Some(name.into());
        self
    }

    /// Set the providers tried after the primary, in order
    pub fn fallback_order(mut self, order: Vec<String>) -> Self {
        self.fallback_order = order;
        self
    }

    /// Per-call timeout applied to every client
    pub fn call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }

    /// Build the factory
    pub fn build(self) -> ModelClientFactory {
        ModelClientFactory {
            specs: RwLock::new(self.specs),
            default_models: self.default_models,
            primary: self.primary.unwrap_or_default(),
            fallback_order: self.fallback_order,
            call_timeout: self.call_timeout.unwrap_or(DEFAULT_CALL_TIMEOUT),
            clients: RwLock::new(HashMap::new()),
        }
    }
}
