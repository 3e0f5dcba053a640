//! Finance query agent
//!
//! Every query goes through the same sequence:
//!
//! 1. **Routed**: the semantic classifier picks an intent and tickers are
//!    pulled out of the text (or carried over from the session)
//! 2. One of three paths runs:
//!    - **DirectCall**: a confident single-capability intent calls its
//!      capability once and fills a template, no model involved
//!    - **Reasoning**: the model loop decides which capabilities to call
//!    - **Template**: deterministic per-intent handlers, used when no model
//!      provider is usable or the classifier is degraded
//! 3. **Synthesized**: exactly one [`AgentResponse`] is produced
//!
//! Capability failures never fail a query; they are recorded on the
//! [`ToolCallRecord`]s. Only cancellation surfaces as an `Err`.

use crate::config::FinanceConfig;
use crate::error::Result;
use crate::fallback::{TemplateHandlers, render_result};
use crate::intent::Intent;
use crate::prompts::{Prompts, names};
use crate::router::{ClassificationResult, ClassifierHealth, SemanticRouter};
use crate::source::{LiveMarketData, MarketDataSource};
use crate::symbols::SymbolExtractor;
use crate::tools::{invoke_recorded, register_default_capabilities};
use agent_core::{Agent, AgentResponse, AgentResponseBuilder, Context, ResponseStatus, ToolCallRecord};
use agent_llm::{
    EmbeddingProvider, FactoryHealth, LocalEmbeddings, Message, ModelClientFactory, OpenAIEmbeddings,
};
use agent_runtime::{ExecutorEventHandler, NoOpEventHandler, ReasoningError, ReasoningExecutor};
use agent_tools::{CacheStore, CapabilityRegistry, MemoryStore, RegistryHealth, StoreHealth};
use agent_utils::env_var;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const DEFAULT_OPENAI_BASE: &str = "https://api.openai.com/v1";

/// Whether the reasoning loop is available
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentMode {
    /// A model provider is configured; non-direct queries use reasoning
    Primary,
    /// No model provider; every non-direct query uses template handlers
    Template,
}

impl fmt::Display for AgentMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentMode::Primary => f.write_str("primary"),
            AgentMode::Template => f.write_str("template"),
        }
    }
}

/// Progress event of a streaming query
///
/// For any capability call `ToolStart` precedes its `ToolEnd`. `Final` is
/// always the last event of a query that was not cancelled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// The classifier's verdict
    Classified { intent: Intent, confidence: f32 },
    /// A capability call is starting
    ToolStart {
        id: String,
        name: String,
        arguments: Value,
    },
    /// A capability call finished
    ToolEnd {
        id: String,
        name: String,
        was_cached: bool,
        error: Option<String>,
        duration_ms: Option<u64>,
    },
    /// A fragment of answer text
    Content { delta: String },
    /// The complete response
    Final { response: Box<AgentResponse> },
}

/// Forwards executor callbacks onto a stream channel
struct EventSink {
    tx: mpsc::UnboundedSender<StreamEvent>,
    streamed: AtomicBool,
}

impl EventSink {
    fn new(tx: mpsc::UnboundedSender<StreamEvent>) -> Self {
        Self {
            tx,
            streamed: AtomicBool::new(false),
        }
    }

    fn send(&self, event: StreamEvent) {
        // A closed channel means the consumer left; the watcher cancels the query
        let _ = self.tx.send(event);
    }

    fn classified(&self, classification: &ClassificationResult) {
        self.send(StreamEvent::Classified {
            intent: classification.intent,
            confidence: classification.confidence,
        });
    }

    /// Whether any answer text was already sent
    fn streamed(&self) -> bool {
        self.streamed.load(Ordering::Acquire)
    }
}

#[async_trait]
impl ExecutorEventHandler for EventSink {
    async fn on_tool_start(&self, id: &str, name: &str, input: &Value) {
        self.send(StreamEvent::ToolStart {
            id: id.to_string(),
            name: name.to_string(),
            arguments: input.clone(),
        });
    }

    async fn on_tool_done(&self, record: &ToolCallRecord) {
        self.send(StreamEvent::ToolEnd {
            id: record.id().to_string(),
            name: record.name().to_string(),
            was_cached: record.was_cached(),
            error: record.error_message().map(str::to_string),
            duration_ms: record.duration_ms(),
        });
    }

    fn on_text_delta(&self, delta: &str) {
        if delta.is_empty() {
            return;
        }
        self.streamed.store(true, Ordering::Release);
        self.send(StreamEvent::Content {
            delta: delta.to_string(),
        });
    }

    fn wants_text(&self) -> bool {
        true
    }
}

/// Aggregated component health
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthReport {
    /// Classifier, registry and cache are all healthy
    pub healthy: bool,
    pub mode: AgentMode,
    pub classifier: ClassifierHealth,
    pub registry: RegistryHealth,
    pub cache: StoreHealth,
    /// Model provider state; absent when no factory is configured
    pub providers: Option<FactoryHealth>,
}

/// Path chosen for one query
#[derive(Debug)]
enum Route {
    Direct {
        capability: &'static str,
        arguments: Value,
    },
    Reasoning,
    Template(Intent),
}

/// Finance question answering agent
pub struct FinanceAgent {
    config: FinanceConfig,
    router: SemanticRouter,
    extractor: Arc<SymbolExtractor>,
    prompts: Arc<Prompts>,
    registry: Arc<CapabilityRegistry>,
    templates: TemplateHandlers,
    factory: Option<Arc<ModelClientFactory>>,
    mode: AgentMode,
}

impl FinanceAgent {
    /// Start building an agent
    pub fn builder() -> FinanceAgentBuilder {
        FinanceAgentBuilder::default()
    }

    /// Agent over live market data with providers taken from the environment
    ///
    /// `OPENAI_API_KEY` also enables remote embeddings for the classifier;
    /// without it the classifier runs on the local sentence embedding model only.
    pub async fn from_config(config: FinanceConfig) -> Result<Self> {
        let source: Arc<dyn MarketDataSource> = Arc::new(LiveMarketData::new(&config)?);
        let factory = Arc::new(config.model_client_factory());

        let mut builder = Self::builder().source(source).factory(factory);
        if let Some(api_key) = env_var("OPENAI_API_KEY") {
            let base = env_var("OPENAI_API_BASE").unwrap_or_else(|| DEFAULT_OPENAI_BASE.to_string());
            match OpenAIEmbeddings::new(
                api_key,
                base,
                Some(config.embedding_model.clone()),
                Duration::from_secs(config.provider_timeout_secs),
            ) {
                Ok(embeddings) => builder = builder.primary_embeddings(Arc::new(embeddings)),
                Err(e) => warn!(error = %e, "Remote embeddings unavailable; using local embeddings"),
            }
        }
        builder.config(config).build().await
    }

    /// Operating mode
    pub fn mode(&self) -> AgentMode {
        self.mode
    }

    /// Active configuration
    pub fn config(&self) -> &FinanceConfig {
        &self.config
    }

    /// Shared capability registry
    pub fn registry(&self) -> &Arc<CapabilityRegistry> {
        &self.registry
    }

    /// Answer one query
    pub async fn process_query(&self, query: &str, ctx: &mut Context) -> agent_core::Result<AgentResponse> {
        self.run_query(query, ctx, None, &CancellationToken::new()).await
    }

    /// Answer one query, abandoning it when `cancel` fires
    ///
    /// Cancellation is checked before routing, between reasoning steps and
    /// between capability calls. A cancelled query returns
    /// [`agent_core::Error::Cancelled`].
    pub async fn process_query_cancellable(
        &self,
        query: &str,
        ctx: &mut Context,
        cancel: CancellationToken,
    ) -> agent_core::Result<AgentResponse> {
        self.run_query(query, ctx, None, &cancel).await
    }

    /// Answer one query as a stream of events
    ///
    /// Runs on a spawned task with a fresh session context. Dropping the
    /// receiver cancels the query.
    pub fn process_query_streaming(self: &Arc<Self>, query: impl Into<String>) -> mpsc::UnboundedReceiver<StreamEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let agent = Arc::clone(self);
        let query = query.into();

        tokio::spawn(async move {
            let cancel = CancellationToken::new();
            let watcher = {
                let tx = tx.clone();
                let cancel = cancel.clone();
                tokio::spawn(async move {
                    tx.closed().await;
                    cancel.cancel();
                })
            };

            let sink = EventSink::new(tx);
            let mut ctx = Context::new();
            let response = match agent.run_query(&query, &mut ctx, Some(&sink), &cancel).await {
                Ok(response) => response,
                Err(agent_core::Error::Cancelled) => {
                    debug!("Streaming query abandoned by the consumer");
                    watcher.abort();
                    return;
                }
                Err(e) => {
                    error!(error = %e, "Streaming query failed");
                    AgentResponse::builder(ResponseStatus::Error)
                        .content(agent.prompts.error_message())
                        .error(e.to_string())
                        .build()
                }
            };

            if !sink.streamed() && !response.content().is_empty() {
                sink.send(StreamEvent::Content {
                    delta: response.content().to_string(),
                });
            }
            sink.send(StreamEvent::Final {
                response: Box::new(response),
            });
            watcher.abort();
        });

        rx
    }

    /// Health of the classifier, registry, cache store and providers
    pub async fn health_check(&self) -> HealthReport {
        let classifier = self.router.health();
        let registry = self.registry.health_check().await;
        let cache = self.registry.store().health_check().await;
        let providers = self.factory.as_ref().map(|f| f.health());

        HealthReport {
            healthy: classifier.healthy && registry.healthy && cache.healthy,
            mode: self.mode,
            classifier,
            registry,
            cache,
            providers,
        }
    }

    async fn run_query(
        &self,
        query: &str,
        ctx: &mut Context,
        sink: Option<&EventSink>,
        cancel: &CancellationToken,
    ) -> agent_core::Result<AgentResponse> {
        let started = Instant::now();
        if cancel.is_cancelled() {
            return Err(agent_core::Error::Cancelled);
        }
        let handler: &dyn ExecutorEventHandler = match sink {
            Some(sink) => sink,
            None => &NoOpEventHandler,
        };

        let classification = self.router.classify(query).await;
        let extracted = self.extractor.extract(query);
        ctx.remember_symbols(&extracted);
        let symbols = if extracted.is_empty()
            && !matches!(classification.intent, Intent::General | Intent::SymbolLookup)
        {
            ctx.recent_symbols()
        } else {
            extracted
        };

        if let Some(sink) = sink {
            sink.classified(&classification);
        }
        let route = self.select_route(&classification, query, &symbols);
        info!(
            intent = %classification.intent,
            confidence = classification.confidence,
            degraded = classification.degraded,
            symbols = ?symbols,
            route = ?route,
            "Routed query"
        );

        let builder = match route {
            Route::Direct { capability, arguments } => {
                self.direct_call(capability, arguments, handler).await?
            }
            Route::Reasoning => self.reason(classification.intent, query, &symbols, handler, cancel).await?,
            Route::Template(intent) => self.template(intent, query, &symbols, handler).await?,
        };
        if cancel.is_cancelled() {
            return Err(agent_core::Error::Cancelled);
        }

        let latency = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        let response = builder.latency_ms(latency).build();
        info!(
            status = %response.status(),
            provider = %response.provider_id(),
            tool_calls = response.tool_calls().len(),
            latency_ms = latency,
            "Query complete"
        );
        Ok(response)
    }

    fn select_route(&self, classification: &ClassificationResult, query: &str, symbols: &[String]) -> Route {
        if classification.degraded {
            return Route::Template(Intent::General);
        }

        let intent = classification.intent;
        if let Some(capability) = intent.direct_capability() {
            let confident = classification.confidence >= self.router.threshold();
            let arguments = match intent {
                Intent::PriceCheck if symbols.len() == 1 => Some(json!({ "symbol": symbols[0] })),
                Intent::SymbolLookup => self
                    .extractor
                    .lookup_phrase(query)
                    .map(|phrase| json!({ "query": phrase })),
                _ => None,
            };
            if let Some(arguments) = arguments.filter(|_| confident) {
                if self.registry.get_enabled(capability).is_some() {
                    return Route::Direct { capability, arguments };
                }
                debug!(capability, "Direct capability disabled");
            }
        }

        match self.mode {
            AgentMode::Primary => Route::Reasoning,
            AgentMode::Template => Route::Template(intent),
        }
    }

    async fn direct_call(
        &self,
        capability: &str,
        arguments: Value,
        handler: &dyn ExecutorEventHandler,
    ) -> Result<AgentResponseBuilder> {
        let subject = arguments
            .get("symbol")
            .or_else(|| arguments.get("query"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let record = invoke_recorded(&self.registry, capability, arguments, handler).await;
        let builder = match record.result() {
            Some(result) => {
                AgentResponse::builder(ResponseStatus::Success).content(render_result(&self.prompts, capability, result)?)
            }
            None => {
                let detail = record.error_message().unwrap_or("capability failed").to_string();
                warn!(capability, error = %detail, "Direct capability call failed");
                let content = self.prompts.render(
                    names::UNAVAILABLE,
                    json!({ "symbol": subject, "what": capability.replace('_', " ") }),
                )?;
                AgentResponse::builder(ResponseStatus::Error).content(content).error(detail)
            }
        };
        Ok(builder.tool_calls(vec![record]))
    }

    async fn reason(
        &self,
        intent: Intent,
        query: &str,
        symbols: &[String],
        handler: &dyn ExecutorEventHandler,
        cancel: &CancellationToken,
    ) -> agent_core::Result<AgentResponseBuilder> {
        let Some(factory) = &self.factory else {
            return Ok(self.template(intent, query, symbols, handler).await?);
        };

        let tools: Vec<String> = self
            .registry
            .list_enabled()
            .iter()
            .map(|tool| tool.name().to_string())
            .collect();
        let system_prompt = self.prompts.system(&tools, symbols)?;
        let executor = ReasoningExecutor::new(
            Arc::clone(factory),
            Arc::clone(&self.registry),
            self.config.executor_config(system_prompt),
        );

        match executor.run(vec![Message::user(query)], handler, cancel).await {
            Ok(outcome) => {
                let status = if outcome.step_limit_reached {
                    warn!(steps = outcome.steps, "Reasoning step bound reached");
                    ResponseStatus::Partial
                } else if outcome.used_fallback() {
                    warn!(provider = %outcome.provider_id, "Answered by a fallback provider");
                    ResponseStatus::Fallback
                } else {
                    ResponseStatus::Success
                };
                let content = if outcome.step_limit_reached && outcome.content.trim().is_empty() {
                    self.partial_summary(&outcome.tool_calls)?
                } else {
                    outcome.content
                };
                Ok(AgentResponse::builder(status)
                    .content(content)
                    .tool_calls(outcome.tool_calls)
                    .model(outcome.provider_id, outcome.model_id)
                    .token_usage(outcome.usage))
            }
            Err(ReasoningError::NoProviders(reason)) => {
                warn!(reason = %reason, "No usable model provider; answering from templates");
                Ok(self.template(intent, query, symbols, handler).await?)
            }
            Err(ReasoningError::ProvidersExhausted { last_error, tool_calls }) => {
                error!(error = %last_error, "All model providers failed");
                Ok(AgentResponse::builder(ResponseStatus::Error)
                    .content(self.prompts.error_message())
                    .tool_calls(tool_calls)
                    .error(last_error))
            }
            Err(ReasoningError::Cancelled { .. }) => Err(agent_core::Error::Cancelled),
        }
    }

    async fn template(
        &self,
        intent: Intent,
        query: &str,
        symbols: &[String],
        handler: &dyn ExecutorEventHandler,
    ) -> Result<AgentResponseBuilder> {
        let answer = self.templates.handle(intent, query, symbols, handler).await?;
        Ok(AgentResponse::builder(ResponseStatus::Fallback)
            .content(answer.content)
            .tool_calls(answer.tool_calls))
    }

    /// Best-effort text when the step bound hit before any answer text
    fn partial_summary(&self, calls: &[ToolCallRecord]) -> Result<String> {
        let gathered: Vec<String> = calls
            .iter()
            .filter(|c| c.is_success())
            .map(|c| match c.arguments().get("symbol").and_then(Value::as_str) {
                Some(symbol) => format!("{} for {symbol}", c.name().replace('_', " ")),
                None => c.name().replace('_', " "),
            })
            .collect();
        self.prompts.render(names::PARTIAL, json!({ "gathered": gathered }))
    }
}

#[async_trait]
impl Agent for FinanceAgent {
    async fn process(&self, input: String, context: &mut Context) -> agent_core::Result<AgentResponse> {
        self.process_query(&input, context).await
    }

    fn name(&self) -> &str {
        "finance"
    }
}

/// Builder for [`FinanceAgent`]
///
/// Everything is optional. Without a factory the agent runs in template
/// mode; without a source it fetches live data; without a registry one is
/// created over the store (in-memory by default) with the four market
/// data capabilities registered.
#[derive(Default)]
pub struct FinanceAgentBuilder {
    config: Option<FinanceConfig>,
    source: Option<Arc<dyn MarketDataSource>>,
    factory: Option<Arc<ModelClientFactory>>,
    primary_embeddings: Option<Arc<dyn EmbeddingProvider>>,
    secondary_embeddings: Option<Arc<dyn EmbeddingProvider>>,
    store: Option<Arc<dyn CacheStore>>,
    registry: Option<Arc<CapabilityRegistry>>,
}

impl FinanceAgentBuilder {
    pub fn config(mut self, config: FinanceConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Market data behind the default capabilities
    pub fn source(mut self, source: Arc<dyn MarketDataSource>) -> Self {
        self.source = Some(source);
        self
    }

    /// Model providers for the reasoning path
    pub fn factory(mut self, factory: Arc<ModelClientFactory>) -> Self {
        self.factory = Some(factory);
        self
    }

    pub fn primary_embeddings(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.primary_embeddings = Some(provider);
        self
    }

    /// Local embeddings; defaults to [`LocalEmbeddings`] for `local_embedding_model`
    pub fn secondary_embeddings(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.secondary_embeddings = Some(provider);
        self
    }

    /// Cache store for a registry created by the builder
    pub fn store(mut self, store: Arc<dyn CacheStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Use a pre-built registry instead of the default capabilities
    pub fn registry(mut self, registry: Arc<CapabilityRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Build the agent
    ///
    /// Fails on invalid configuration or a duplicate capability name.
    pub async fn build(self) -> Result<FinanceAgent> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let registry = match self.registry {
            Some(registry) => registry,
            None => {
                let store = self.store.unwrap_or_else(|| Arc::new(MemoryStore::new()));
                let registry = Arc::new(CapabilityRegistry::new(store, config.cache_settings()));
                let source = match self.source {
                    Some(source) => source,
                    None => Arc::new(LiveMarketData::new(&config)?),
                };
                register_default_capabilities(&registry, source)?;
                registry
            }
        };

        let secondary = self
            .secondary_embeddings
            .unwrap_or_else(|| Arc::new(LocalEmbeddings::with_model(config.local_embedding_model.clone())));
        let router = SemanticRouter::new(
            self.primary_embeddings,
            secondary,
            config.classifier_threshold,
            config.embedding_cache_size,
        )
        .await;

        let factory = self.factory;
        let mode = if factory.as_ref().is_some_and(|f| f.is_available()) {
            AgentMode::Primary
        } else {
            AgentMode::Template
        };

        let prompts = Arc::new(Prompts::new()?);
        let extractor = Arc::new(SymbolExtractor::new()?);
        let templates = TemplateHandlers::new(Arc::clone(&registry), Arc::clone(&prompts), Arc::clone(&extractor));

        info!(
            %mode,
            capabilities = registry.len(),
            threshold = router.threshold(),
            "Finance agent ready"
        );
        Ok(FinanceAgent {
            config,
            router,
            extractor,
            prompts,
            registry,
            templates,
            factory,
            mode,
        })
    }
}
