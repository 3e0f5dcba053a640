//! Configuration for the finance agent

use crate::error::{FinanceError, Result};
use agent_llm::ModelClientFactory;
use agent_llm::ProviderSpec;
use agent_llm::providers::OpenAIConfig;
use agent_runtime::ExecutorConfig;
use agent_tools::{CacheSettings, MAX_TTL};
use agent_utils::{env_list, env_parse, env_var, load_json};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Capability names used by the default registry
pub mod capabilities {
    /// Latest quote for one symbol
    pub const QUOTE: &str = "stock_quote";
    /// Ticker search by company name or keyword
    pub const SEARCH: &str = "symbol_search";
    /// Valuation metrics for one symbol
    pub const FUNDAMENTALS: &str = "company_fundamentals";
    /// Headlines and sentiment for one symbol
    pub const NEWS: &str = "market_news";
}

/// Configuration for the finance agent
///
/// Durations are stored as whole seconds so the struct maps directly onto a
/// JSON config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FinanceConfig {
    /// Minimum similarity for a routed intent; below it the query is GENERAL
    pub classifier_threshold: f32,

    /// First provider of the fallback sequence
    pub primary_provider: String,

    /// Providers tried after the primary, in order
    pub fallback_provider_order: Vec<String>,

    /// Model used for each provider
    pub provider_models: BTreeMap<String, String>,

    /// Cache TTL per capability, in seconds
    pub capability_ttls: BTreeMap<String, u64>,

    /// Cache TTL for capabilities without an entry in `capability_ttls`
    pub default_ttl_secs: u64,

    /// Fraction of a TTL added as random jitter
    pub ttl_jitter: f64,

    /// Bound on model calls per reasoning run
    pub max_reasoning_steps: usize,

    /// Per provider-call timeout, in seconds
    pub provider_timeout_secs: u64,

    /// Per capability-call timeout, in seconds
    pub capability_timeout_secs: u64,

    /// Max tokens per reasoning completion
    pub max_tokens: usize,

    /// Sampling temperature for reasoning
    pub temperature: f32,

    /// Alpha Vantage API key (fundamentals and news)
    #[serde(skip_serializing)]
    pub alpha_vantage_api_key: Option<String>,

    /// Alpha Vantage requests per minute
    pub alpha_vantage_rate_limit: u32,

    /// Primary embedding model
    pub embedding_model: String,

    /// Hugging Face repository of the local sentence embedding model
    pub local_embedding_model: String,

    /// Number of query embeddings kept by the classifier
    pub embedding_cache_size: usize,
}

impl Default for FinanceConfig {
    fn default() -> Self {
        let provider_models = BTreeMap::from([
            ("openai".to_string(), "gpt-4o-mini".to_string()),
            ("anthropic".to_string(), "claude-sonnet-4-5-20250929".to_string()),
        ]);
        let capability_ttls = BTreeMap::from([
            (capabilities::QUOTE.to_string(), 60),            // 1 minute
            (capabilities::SEARCH.to_string(), 86_400),       // 1 day
            (capabilities::FUNDAMENTALS.to_string(), 3_600),  // 1 hour
            (capabilities::NEWS.to_string(), 300),            // 5 minutes
        ]);
        Self {
            classifier_threshold: 0.70,
            primary_provider: "openai".to_string(),
            fallback_provider_order: vec!["anthropic".to_string()],
            provider_models,
            capability_ttls,
            default_ttl_secs: 300,
            ttl_jitter: 0.1,
            max_reasoning_steps: 6,
            provider_timeout_secs: 60,
            capability_timeout_secs: 15,
            max_tokens: 2048,
            temperature: 0.2,
            alpha_vantage_api_key: None,
            alpha_vantage_rate_limit: 5,
            embedding_model: "text-embedding-3-small".to_string(),
            local_embedding_model: agent_llm::embeddings::DEFAULT_LOCAL_MODEL.to_string(),
            embedding_cache_size: 1024,
        }
    }
}

impl FinanceConfig {
    /// Create a new configuration builder
    pub fn builder() -> FinanceConfigBuilder {
        FinanceConfigBuilder::default()
    }

    /// Load a JSON config file; missing fields take their defaults
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let config: Self = load_json(path.as_ref())?;
        let config = config.with_env_api_key();
        config.validate()?;
        info!(path = %path.as_ref().display(), "Loaded finance config");
        Ok(config)
    }

    /// Fill the Alpha Vantage key from `ALPHA_VANTAGE_API_KEY` if unset
    pub fn with_env_api_key(mut self) -> Self {
        if self.alpha_vantage_api_key.is_none() {
            self.alpha_vantage_api_key = env_var("ALPHA_VANTAGE_API_KEY");
        }
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.classifier_threshold) {
            return Err(FinanceError::Config(format!(
                "classifier_threshold must be within [0, 1], got {}",
                self.classifier_threshold
            )));
        }
        if self.primary_provider.trim().is_empty() {
            return Err(FinanceError::Config(
                "primary_provider must not be empty".to_string(),
            ));
        }
        if self.max_reasoning_steps == 0 {
            return Err(FinanceError::Config(
                "max_reasoning_steps must be greater than 0".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.ttl_jitter) {
            return Err(FinanceError::Config(format!(
                "ttl_jitter must be within [0, 1], got {}",
                self.ttl_jitter
            )));
        }
        let max_ttl = MAX_TTL.as_secs();
        if let Some((name, secs)) = std::iter::once(("default", &self.default_ttl_secs))
            .chain(self.capability_ttls.iter().map(|(n, s)| (n.as_str(), s)))
            .find(|(_, secs)| **secs > max_ttl)
        {
            return Err(FinanceError::Config(format!(
                "TTL for {name} must be at most {max_ttl} seconds, got {secs}"
            )));
        }
        if self.provider_timeout_secs == 0 || self.capability_timeout_secs == 0 {
            return Err(FinanceError::Config(
                "timeouts must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Cache settings for the capability registry
    pub fn cache_settings(&self) -> CacheSettings {
        CacheSettings {
            default_ttl: Duration::from_secs(self.default_ttl_secs),
            ttls: self
                .capability_ttls
                .iter()
                .map(|(name, secs)| (name.clone(), Duration::from_secs(*secs)))
                .collect(),
            jitter: self.ttl_jitter,
            timeout: Duration::from_secs(self.capability_timeout_secs),
        }
    }

    /// Reasoning executor settings with the given system prompt
    pub fn executor_config(&self, system_prompt: String) -> ExecutorConfig {
        ExecutorConfig {
            max_steps: self.max_reasoning_steps,
            system_prompt,
            max_tokens: self.max_tokens,
            temperature: Some(self.temperature),
        }
    }

    /// Build a model client factory from provider credentials in the environment
    ///
    /// Providers without credentials stay unconfigured; the factory then skips
    /// them in the fallback sequence. `OPENAI_API_KEY` (plus optional
    /// `OPENAI_API_BASE`) configures "openai", `ANTHROPIC_API_KEY` configures
    /// "anthropic".
    pub fn model_client_factory(&self) -> ModelClientFactory {
        let mut builder = ModelClientFactory::builder()
            .primary(self.primary_provider.clone())
            .fallback_order(self.fallback_provider_order.clone())
            .call_timeout(Duration::from_secs(self.provider_timeout_secs));

        for (provider, model) in &self.provider_models {
            builder = builder.model(provider.clone(), model.clone());
        }

        if let Some(api_key) = env_var("OPENAI_API_KEY") {
            let mut openai = OpenAIConfig::new(api_key);
            if let Some(base) = env_var("OPENAI_API_BASE") {
                openai = openai.with_api_base(base);
            }
            builder = builder.provider(
                "openai",
                ProviderSpec::OpenAI(openai),
                self.model_for("openai"),
            );
        }
        if let Some(api_key) = env_var("ANTHROPIC_API_KEY") {
            builder = builder.provider(
                "anthropic",
                ProviderSpec::Anthropic {
                    api_key,
                    api_base: None,
                },
                self.model_for("anthropic"),
            );
        }
        builder.build()
    }

    fn model_for(&self, provider: &str) -> String {
        self.provider_models
            .get(provider)
            .cloned()
            .or_else(|| FinanceConfig::default().provider_models.get(provider).cloned())
            .unwrap_or_default()
    }
}

/// Builder for FinanceConfig
#[derive(Debug, Default)]
pub struct FinanceConfigBuilder {
    classifier_threshold: Option<f32>,
    primary_provider: Option<String>,
    fallback_provider_order: Option<Vec<String>>,
    provider_models: BTreeMap<String, String>,
    capability_ttls: BTreeMap<String, u64>,
    max_reasoning_steps: Option<usize>,
    provider_timeout: Option<Duration>,
    capability_timeout: Option<Duration>,
    alpha_vantage_api_key: Option<String>,
    embedding_model: Option<String>,
}

impl FinanceConfigBuilder {
    /// Set the classifier threshold
    pub fn classifier_threshold(mut self, threshold: f32) -> Self {
        self.classifier_threshold = Some(threshold);
        self
    }

    /// Set the primary provider
    pub fn primary_provider(mut self, provider: impl Into<String>) -> Self {
        self.primary_provider = Some(provider.into());
        self
    }

    /// Set the fallback provider order
    pub fn fallback_provider_order(mut self, order: Vec<String>) -> Self {
        self.fallback_provider_order = Some(order);
        self
    }

    /// Set the model for one provider
    pub fn provider_model(mut self, provider: impl Into<String>, model: impl Into<String>) -> Self {
        self.provider_models.insert(provider.into(), model.into());
        self
    }

    /// Set the cache TTL of one capability
    pub fn capability_ttl(mut self, capability: impl Into<String>, ttl: Duration) -> Self {
        self.capability_ttls.insert(capability.into(), ttl.as_secs());
        self
    }

    /// Set the reasoning step bound
    pub fn max_reasoning_steps(mut self, steps: usize) -> Self {
        self.max_reasoning_steps = Some(steps);
        self
    }

    /// Set the provider call timeout
    pub fn provider_timeout(mut self, timeout: Duration) -> Self {
        self.provider_timeout = Some(timeout);
        self
    }

    /// Set the capability call timeout
    pub fn capability_timeout(mut self, timeout: Duration) -> Self {
        self.capability_timeout = Some(timeout);
        self
    }

    /// Set Alpha Vantage API key
    pub fn alpha_vantage_api_key(mut self, key: impl Into<String>) -> Self {
        self.alpha_vantage_api_key = Some(key.into());
        self
    }

    /// Set the primary embedding model
    pub fn embedding_model(mut self, model: impl Into<String>) -> Self {
        self.embedding_model = Some(model.into());
        self
    }

    /// Apply overrides from the environment
    ///
    /// Reads `FINANCE_CLASSIFIER_THRESHOLD`, `FINANCE_PRIMARY_PROVIDER`,
    /// `FINANCE_FALLBACK_PROVIDERS` (comma list), `FINANCE_MAX_REASONING_STEPS`,
    /// `OPENAI_MODEL`, `ANTHROPIC_MODEL` and `ALPHA_VANTAGE_API_KEY`. Values set
    /// on the builder earlier are overwritten.
    pub fn from_env(mut self) -> Result<Self> {
        if let Some(threshold) = env_parse::<f32>("FINANCE_CLASSIFIER_THRESHOLD")? {
            self.classifier_threshold = Some(threshold);
        }
        if let Some(primary) = env_var("FINANCE_PRIMARY_PROVIDER") {
            self.primary_provider = Some(primary);
        }
        if let Some(order) = env_list("FINANCE_FALLBACK_PROVIDERS") {
            self.fallback_provider_order = Some(order);
        }
        if let Some(steps) = env_parse::<usize>("FINANCE_MAX_REASONING_STEPS")? {
            self.max_reasoning_steps = Some(steps);
        }
        if let Some(model) = env_var("OPENAI_MODEL") {
            self.provider_models.insert("openai".to_string(), model);
        }
        if let Some(model) = env_var("ANTHROPIC_MODEL") {
            self.provider_models.insert("anthropic".to_string(), model);
        }
        if let Some(key) = env_var("ALPHA_VANTAGE_API_KEY") {
            self.alpha_vantage_api_key = Some(key);
        }
        Ok(self)
    }

    /// Build and validate the configuration
    pub fn build(self) -> Result<FinanceConfig> {
        let defaults = FinanceConfig::default();

        let mut provider_models = defaults.provider_models;
        provider_models.extend(self.provider_models);
        let mut capability_ttls = defaults.capability_ttls;
        capability_ttls.extend(self.capability_ttls);

        let config = FinanceConfig {
            classifier_threshold: self
                .classifier_threshold
                .unwrap_or(defaults.classifier_threshold),
            primary_provider: self.primary_provider.unwrap_or(defaults.primary_provider),
            fallback_provider_order: self
                .fallback_provider_order
                .unwrap_or(defaults.fallback_provider_order),
            provider_models,
            capability_ttls,
            max_reasoning_steps: self
                .max_reasoning_steps
                .unwrap_or(defaults.max_reasoning_steps),
            provider_timeout_secs: self
                .provider_timeout
                .map_or(defaults.provider_timeout_secs, |d| d.as_secs()),
            capability_timeout_secs: self
                .capability_timeout
                .map_or(defaults.capability_timeout_secs, |d| d.as_secs()),
            alpha_vantage_api_key: self.alpha_vantage_api_key,
            embedding_model: self.embedding_model.unwrap_or(defaults.embedding_model),
            ..defaults
        };

        config.validate()?;
        Ok(config)
    }
}
