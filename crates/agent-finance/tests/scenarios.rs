//! End-to-end query scenarios over fake market data, fixed embeddings and
//! scripted model providers

use agent_core::{Context, ResponseStatus};
use agent_finance::api::{Fundamentals, Quote, SymbolMatch};
use agent_finance::{
    AgentMode, FinanceAgent, FinanceConfig, Intent, MarketDataSource, NewsDigest, SemanticRouter, StreamEvent,
};
use agent_llm::{
    CompletionRequest, CompletionResponse, ContentBlock, EmbeddingProvider, LLMError, LLMProvider, Message,
    ModelClientFactory, ProviderSpec, StopReason, TextSink, TokenUsage,
};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Value, json};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_test::assert_ok;

const DIM: usize = Intent::ALL.len() + 1;

// ============= Fixtures =============

/// Listed queries use their fixed vector, example utterances of intent `i`
/// embed to the unit vector `e_i` and anything else embeds off every axis
struct FixedEmbedder {
    queries: HashMap<&'static str, Vec<f32>>,
}

impl FixedEmbedder {
    fn new(queries: &[(&'static str, Intent, f32)]) -> Self {
        let queries = queries
            .iter()
            .map(|(text, intent, similarity)| {
                let mut v = axis(position(*intent));
                v[position(*intent)] = *similarity;
                v[DIM - 1] = (1.0 - similarity * similarity).sqrt();
                (*text, v)
            })
            .collect();
        Self { queries }
    }
}

fn position(intent: Intent) -> usize {
    Intent::ALL.iter().position(|i| *i == intent).unwrap()
}

fn axis(index: usize) -> Vec<f32> {
    let mut v = vec![0.0; DIM];
    v[index] = 1.0;
    v
}

#[async_trait]
impl EmbeddingProvider for FixedEmbedder {
    async fn embed(&self, text: &str) -> agent_llm::Result<Vec<f32>> {
        if let Some(v) = self.queries.get(text) {
            return Ok(v.clone());
        }
        if let Some(intent) = Intent::ALL.iter().find(|i| i.examples().iter().any(|e| *e == text)) {
            return Ok(axis(position(*intent)));
        }
        Ok(axis(DIM - 1))
    }

    fn name(&self) -> &str {
        "fixed"
    }
}

const PRICE_QUERY: &str = "Where's AAPL at right now?";
const COMPARE_QUERY: &str = "Compare AAPL and GOOGL fundamentals";
const MARKET_QUERY: &str = "How are markets doing?";
const VALUATION_QUERY: &str = "And how is it valued?";

fn embedder() -> Arc<FixedEmbedder> {
    Arc::new(FixedEmbedder::new(&[
        (PRICE_QUERY, Intent::PriceCheck, 0.85),
        (COMPARE_QUERY, Intent::Comparative, 0.55),
        (MARKET_QUERY, Intent::General, 0.40),
        (VALUATION_QUERY, Intent::Fundamentals, 0.90),
    ]))
}

/// Market data that counts every fetch
#[derive(Default)]
struct FakeSource {
    quotes: AtomicUsize,
    fundamentals: AtomicUsize,
    delay: Duration,
}

impl FakeSource {
    fn slow(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }
}

#[async_trait]
impl MarketDataSource for FakeSource {
    async fn quote(&self, symbol: &str) -> agent_finance::Result<Quote> {
        self.quotes.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        Ok(Quote {
            symbol: symbol.to_string(),
            timestamp: Utc::now(),
            open: 200.0,
            high: 212.0,
            low: 199.0,
            close: 210.0,
            volume: 52_300_000,
            adjclose: 210.0,
        })
    }

    async fn search(&self, query: &str, _limit: usize) -> agent_finance::Result<Vec<SymbolMatch>> {
        Ok(vec![SymbolMatch {
            symbol: "AAPL".to_string(),
            name: format!("{query} Inc."),
            exchange: "NMS".to_string(),
            quote_type: "EQUITY".to_string(),
        }])
    }

    async fn fundamentals(&self, symbol: &str) -> agent_finance::Result<Fundamentals> {
        self.fundamentals.fetch_add(1, Ordering::SeqCst);
        Ok(Fundamentals {
            symbol: symbol.to_string(),
            name: None,
            sector: Some("TECHNOLOGY".to_string()),
            industry: None,
            market_cap: Some(3.4e12),
            pe_ratio: Some(32.5),
            eps: Some(6.4),
            dividend_yield: Some(0.0044),
            price_to_book: None,
            week52_high: None,
            week52_low: None,
        })
    }

    async fn news(&self, symbol: &str, _limit: usize) -> agent_finance::Result<NewsDigest> {
        Ok(NewsDigest::from_articles(symbol, Vec::new()))
    }
}

fn usage() -> TokenUsage {
    TokenUsage {
        input_tokens: 12,
        output_tokens: 8,
    }
}

fn final_reply(text: &str) -> CompletionResponse {
    CompletionResponse {
        message: Message::assistant(text),
        stop_reason: StopReason::EndTurn,
        usage: usage(),
    }
}

fn tool_reply(calls: &[(&str, &str, Value)]) -> CompletionResponse {
    let blocks = calls
        .iter()
        .map(|(id, name, input)| ContentBlock::ToolUse {
            id: (*id).to_string(),
            name: (*name).to_string(),
            input: input.clone(),
        })
        .collect();
    CompletionResponse {
        message: Message::assistant_blocks(blocks),
        stop_reason: StopReason::ToolUse,
        usage: usage(),
    }
}

/// Replays a fixed list of replies, then fails
struct Scripted {
    replies: Mutex<VecDeque<CompletionResponse>>,
    calls: AtomicUsize,
}

impl Scripted {
    fn new(replies: Vec<CompletionResponse>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            calls: AtomicUsize::new(0),
        })
    }

    fn failing() -> Arc<Self> {
        Self::new(Vec::new())
    }
}

#[async_trait]
impl LLMProvider for Scripted {
    async fn complete(&self, _request: CompletionRequest) -> agent_llm::Result<CompletionResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| LLMError::ProviderError("service unavailable".to_string()))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Streams every scripted reply word by word; once the script is spent it
/// streams `fragment` and then fails
struct Streaming {
    replies: Mutex<VecDeque<CompletionResponse>>,
    fragment: &'static str,
}

impl Streaming {
    fn new(fragment: &'static str, replies: Vec<CompletionResponse>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            fragment,
        })
    }
}

#[async_trait]
impl LLMProvider for Streaming {
    async fn complete(&self, _request: CompletionRequest) -> agent_llm::Result<CompletionResponse> {
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| LLMError::ProviderError("stream reset".to_string()))
    }

    async fn complete_streaming(
        &self,
        request: CompletionRequest,
        sink: &TextSink<'_>,
    ) -> agent_llm::Result<CompletionResponse> {
        match self.complete(request).await {
            Ok(response) => {
                for word in response.text().split_inclusive(' ') {
                    sink(word);
                }
                Ok(response)
            }
            Err(e) => {
                sink(self.fragment);
                Err(e)
            }
        }
    }

    fn name(&self) -> &str {
        "streaming"
    }
}

/// Requests another quote on every call
struct AlwaysCalls;

#[async_trait]
impl LLMProvider for AlwaysCalls {
    async fn complete(&self, _request: CompletionRequest) -> agent_llm::Result<CompletionResponse> {
        Ok(tool_reply(&[("", "stock_quote", json!({"symbol": "AAPL"}))]))
    }

    fn name(&self) -> &str {
        "looping"
    }
}

fn dynamic<P: LLMProvider + 'static>(provider: &Arc<P>) -> Arc<dyn LLMProvider> {
    provider.clone()
}

fn factory(providers: Vec<(&str, Arc<dyn LLMProvider>)>) -> Arc<ModelClientFactory> {
    let mut builder = ModelClientFactory::builder();
    let mut names = Vec::new();
    for (name, provider) in providers {
        builder = builder.provider(name, ProviderSpec::Custom(provider), format!("{name}-model"));
        names.push(name.to_string());
    }
    let primary = names.remove(0);
    Arc::new(builder.primary(primary).fallback_order(names).build())
}

async fn collect(agent: &Arc<FinanceAgent>, query: &str) -> Vec<StreamEvent> {
    let mut rx = agent.process_query_streaming(query);
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    events
}

fn streamed_text(events: &[StreamEvent]) -> String {
    events
        .iter()
        .filter_map(|e| match e {
            StreamEvent::Content { delta } => Some(delta.as_str()),
            _ => None,
        })
        .collect()
}

fn final_content(events: &[StreamEvent]) -> String {
    match events.last() {
        Some(StreamEvent::Final { response }) => response.content().to_string(),
        other => panic!("expected final event last, got {other:?}"),
    }
}

async fn agent(
    source: Arc<FakeSource>,
    factory: Option<Arc<ModelClientFactory>>,
    config: FinanceConfig,
) -> FinanceAgent {
    let mut builder = FinanceAgent::builder()
        .config(config)
        .source(source)
        .secondary_embeddings(embedder());
    if let Some(factory) = factory {
        builder = builder.factory(factory);
    }
    builder.build().await.unwrap()
}

// ============= Scenarios =============

#[tokio::test]
async fn test_confident_price_check_is_a_direct_call() {
    let source = Arc::new(FakeSource::default());
    let model = Scripted::new(vec![final_reply("should not be asked")]);
    let agent = agent(
        Arc::clone(&source),
        Some(factory(vec![("p1", dynamic(&model))])),
        FinanceConfig::default(),
    )
    .await;
    assert_eq!(agent.mode(), AgentMode::Primary);

    let response = agent.process_query(PRICE_QUERY, &mut Context::new()).await.unwrap();

    assert_eq!(response.status(), ResponseStatus::Success);
    assert_eq!(response.tool_calls().len(), 1);
    assert_eq!(response.tool_calls()[0].name(), "stock_quote");
    assert!(response.content().starts_with("AAPL last traded at $210.00"));
    assert_eq!(response.provider_id(), "none");
    assert_eq!(model.calls.load(Ordering::SeqCst), 0);
    assert_eq!(source.quotes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_low_confidence_comparison_reasons_per_symbol() {
    let source = Arc::new(FakeSource::default());
    let model = Scripted::new(vec![
        tool_reply(&[
            ("c1", "company_fundamentals", json!({"symbol": "AAPL"})),
            ("c2", "company_fundamentals", json!({"symbol": "GOOGL"})),
        ]),
        final_reply("AAPL trades at 32.5x earnings, GOOGL at 32.5x."),
    ]);
    let agent = agent(
        Arc::clone(&source),
        Some(factory(vec![("p1", dynamic(&model))])),
        FinanceConfig::default(),
    )
    .await;

    let response = agent.process_query(COMPARE_QUERY, &mut Context::new()).await.unwrap();

    assert_eq!(response.status(), ResponseStatus::Success);
    let symbols: Vec<&str> = response
        .tool_calls()
        .iter()
        .map(|c| c.arguments()["symbol"].as_str().unwrap())
        .collect();
    assert_eq!(symbols, vec!["AAPL", "GOOGL"]);
    assert!(response.tool_calls().iter().all(|c| c.is_success()));
    assert_eq!(response.provider_id(), "p1");
    assert_eq!(response.model_id(), "p1-model");
    assert_eq!(response.token_usage().map(|u| u.total()), Some(40));
    assert_eq!(model.calls.load(Ordering::SeqCst), 2);
    assert_eq!(source.fundamentals.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_without_providers_every_query_avoids_reasoning() {
    let source = Arc::new(FakeSource::default());
    let agent = agent(Arc::clone(&source), None, FinanceConfig::default()).await;
    assert_eq!(agent.mode(), AgentMode::Template);

    let mut ctx = Context::new();
    for query in [PRICE_QUERY, COMPARE_QUERY, MARKET_QUERY] {
        let response = agent.process_query(query, &mut ctx).await.unwrap();
        assert!(
            matches!(response.status(), ResponseStatus::Fallback | ResponseStatus::Success),
            "{query}: {}",
            response.status()
        );
        assert_eq!(response.provider_id(), "none");
        assert!(response.token_usage().is_none());
    }

    // A confident comparison without a model is one quote and one fundamentals row per ticker
    let response = agent
        .process_query("Compare AAPL and MSFT", &mut Context::new())
        .await
        .unwrap();
    assert_eq!(response.status(), ResponseStatus::Fallback);
    assert!(response.content().contains("Comparison of AAPL, MSFT"));
    assert_eq!(response.tool_calls().len(), 4);
}

#[tokio::test]
async fn test_unbuildable_providers_start_in_template_mode() {
    let source = Arc::new(FakeSource::default());
    let unbuildable = Arc::new(ModelClientFactory::builder().primary("missing").build());
    let agent = agent(Arc::clone(&source), Some(unbuildable), FinanceConfig::default()).await;
    assert_eq!(agent.mode(), AgentMode::Template);

    let direct = agent.process_query(PRICE_QUERY, &mut Context::new()).await.unwrap();
    assert_eq!(direct.status(), ResponseStatus::Success);

    let templated = agent.process_query(MARKET_QUERY, &mut Context::new()).await.unwrap();
    assert_eq!(templated.status(), ResponseStatus::Fallback);
    assert_eq!(templated.provider_id(), "none");
    assert!(templated.token_usage().is_none());

    let health = agent.health_check().await;
    assert_eq!(health.mode, AgentMode::Template);
    assert!(health.healthy);
    assert!(health.providers.is_some_and(|p| !p.healthy));
}

#[tokio::test]
async fn test_providers_lost_after_start_fall_back_to_templates() {
    let model = Scripted::new(vec![final_reply("should not be asked")]);
    let factory = factory(vec![("p1", dynamic(&model))]);
    let agent = agent(
        Arc::new(FakeSource::default()),
        Some(Arc::clone(&factory)),
        FinanceConfig::default(),
    )
    .await;
    assert_eq!(agent.mode(), AgentMode::Primary);

    factory.remove("p1");
    let response = agent.process_query(MARKET_QUERY, &mut Context::new()).await.unwrap();

    assert_eq!(response.status(), ResponseStatus::Fallback);
    assert_eq!(response.provider_id(), "none");
    assert!(response.error().is_none());
    assert_eq!(model.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_concurrent_identical_queries_fetch_once() {
    let source = Arc::new(FakeSource::slow(Duration::from_millis(100)));
    let agent = agent(Arc::clone(&source), None, FinanceConfig::default()).await;

    let (mut a, mut b) = (Context::new(), Context::new());
    let (first, second) = tokio::join!(
        agent.process_query(PRICE_QUERY, &mut a),
        agent.process_query(PRICE_QUERY, &mut b),
    );
    let (first, second) = (assert_ok!(first), assert_ok!(second));

    assert_eq!(source.quotes.load(Ordering::SeqCst), 1);
    assert_eq!(first.content(), second.content());
    assert_eq!(first.tool_calls()[0].result(), second.tool_calls()[0].result());
    let cached = [&first, &second]
        .iter()
        .filter(|r| r.tool_calls()[0].was_cached())
        .count();
    assert_eq!(cached, 1);
}

// ============= Properties =============

#[tokio::test]
async fn test_second_provider_answer_is_fallback() {
    let p1 = Scripted::failing();
    let p2 = Scripted::new(vec![final_reply("Markets are mixed today.")]);
    let agent = agent(
        Arc::new(FakeSource::default()),
        Some(factory(vec![("p1", dynamic(&p1)), ("p2", dynamic(&p2))])),
        FinanceConfig::default(),
    )
    .await;

    let response = agent.process_query(MARKET_QUERY, &mut Context::new()).await.unwrap();

    assert_eq!(response.status(), ResponseStatus::Fallback);
    assert_eq!(response.provider_id(), "p2");
    assert_eq!(response.content(), "Markets are mixed today.");
    assert_eq!(p1.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_exhausted_providers_return_safe_error() {
    let agent = agent(
        Arc::new(FakeSource::default()),
        Some(factory(vec![("p1", dynamic(&Scripted::failing())), ("p2", dynamic(&Scripted::failing()))])),
        FinanceConfig::default(),
    )
    .await;

    let response = agent.process_query(MARKET_QUERY, &mut Context::new()).await.unwrap();

    assert_eq!(response.status(), ResponseStatus::Error);
    assert!(response.content().starts_with("Sorry"));
    assert!(!response.content().contains("service unavailable"));
    assert!(response.error().is_some_and(|e| e.contains("service unavailable")));
}

#[tokio::test]
async fn test_endless_tool_requests_stop_at_step_bound() {
    let config = FinanceConfig::builder().max_reasoning_steps(3).build().unwrap();
    let source = Arc::new(FakeSource::default());
    let agent = agent(
        Arc::clone(&source),
        Some(factory(vec![("looping", dynamic(&Arc::new(AlwaysCalls)))])),
        config,
    )
    .await;

    let response = agent.process_query(MARKET_QUERY, &mut Context::new()).await.unwrap();

    assert_eq!(response.status(), ResponseStatus::Partial);
    assert_eq!(response.tool_calls().len(), 3);
    assert!(response.content().contains("stock quote for AAPL"));
    // Later steps are served from cache
    assert_eq!(source.quotes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_classification_is_deterministic() {
    let router = SemanticRouter::new(None, embedder(), 0.70, 16).await;

    let first = router.classify(PRICE_QUERY).await;
    let second = router.classify(PRICE_QUERY).await;
    assert_eq!(first, second);
    assert_eq!(first.intent, Intent::PriceCheck);
    assert!((first.confidence - 0.85).abs() < 1e-4);

    let low = router.classify(COMPARE_QUERY).await;
    assert_eq!(low.intent, Intent::General);
    assert!((low.confidence - 0.55).abs() < 1e-4);
}

#[tokio::test]
async fn test_streaming_orders_tool_events_and_ends_with_final() {
    let model = Scripted::new(vec![
        tool_reply(&[
            ("c1", "company_fundamentals", json!({"symbol": "AAPL"})),
            ("c2", "company_fundamentals", json!({"symbol": "GOOGL"})),
        ]),
        final_reply("Both look richly valued."),
    ]);
    let agent = Arc::new(
        agent(
            Arc::new(FakeSource::default()),
            Some(factory(vec![("p1", dynamic(&model))])),
            FinanceConfig::default(),
        )
        .await,
    );

    let events = collect(&agent, COMPARE_QUERY).await;

    assert!(matches!(events[0], StreamEvent::Classified { intent: Intent::General, .. }));
    for id in ["c1", "c2"] {
        let start = events
            .iter()
            .position(|e| matches!(e, StreamEvent::ToolStart { id: i, .. } if i == id))
            .unwrap();
        let end = events
            .iter()
            .position(|e| matches!(e, StreamEvent::ToolEnd { id: i, .. } if i == id))
            .unwrap();
        assert!(start < end, "{id} ended before it started");
    }

    assert_eq!(streamed_text(&events), "Both look richly valued.");

    match events.last() {
        Some(StreamEvent::Final { response }) => {
            assert_eq!(response.status(), ResponseStatus::Success);
            assert_eq!(response.content(), "Both look richly valued.");
            assert_eq!(response.tool_calls().len(), 2);
        }
        other => panic!("expected final event last, got {other:?}"),
    }
    let finals = events
        .iter()
        .filter(|e| matches!(e, StreamEvent::Final { .. }))
        .count();
    assert_eq!(finals, 1);
}

#[tokio::test]
async fn test_failed_provider_text_is_not_streamed() {
    let p1 = Streaming::new("Markets are st", Vec::new());
    let p2 = Streaming::new("", vec![final_reply("Markets are mixed today.")]);
    let agent = Arc::new(
        agent(
            Arc::new(FakeSource::default()),
            Some(factory(vec![("p1", dynamic(&p1)), ("p2", dynamic(&p2))])),
            FinanceConfig::default(),
        )
        .await,
    );

    let events = collect(&agent, MARKET_QUERY).await;

    assert_eq!(final_content(&events), "Markets are mixed today.");
    assert_eq!(streamed_text(&events), "Markets are mixed today.");
}

#[tokio::test]
async fn test_interim_text_before_capability_calls_is_not_streamed() {
    let interim = CompletionResponse {
        message: Message::assistant_blocks(vec![
            ContentBlock::Text {
                text: "Let me look that up. ".to_string(),
            },
            ContentBlock::ToolUse {
                id: "c1".to_string(),
                name: "stock_quote".to_string(),
                input: json!({"symbol": "AAPL"}),
            },
        ]),
        stop_reason: StopReason::ToolUse,
        usage: usage(),
    };
    let model = Streaming::new("", vec![interim, final_reply("AAPL is at $210.00.")]);
    let agent = Arc::new(
        agent(
            Arc::new(FakeSource::default()),
            Some(factory(vec![("p1", dynamic(&model))])),
            FinanceConfig::default(),
        )
        .await,
    );

    let events = collect(&agent, MARKET_QUERY).await;

    assert!(events.iter().any(|e| matches!(e, StreamEvent::ToolEnd { id, .. } if id == "c1")));
    assert_eq!(final_content(&events), "AAPL is at $210.00.");
    assert_eq!(streamed_text(&events), "AAPL is at $210.00.");
}

#[tokio::test]
async fn test_session_carries_symbols_between_turns() {
    let source = Arc::new(FakeSource::default());
    let agent = agent(Arc::clone(&source), None, FinanceConfig::default()).await;
    let mut ctx = Context::new();

    assert_ok!(agent.process_query(PRICE_QUERY, &mut ctx).await);
    assert_eq!(ctx.recent_symbols(), vec!["AAPL"]);

    // The follow-up names no ticker
    let response = agent.process_query(VALUATION_QUERY, &mut ctx).await.unwrap();
    assert_eq!(response.status(), ResponseStatus::Fallback);
    assert_eq!(response.tool_calls().len(), 1);
    assert_eq!(response.tool_calls()[0].name(), "company_fundamentals");
    assert_eq!(response.tool_calls()[0].arguments()["symbol"], "AAPL");
    assert_eq!(source.fundamentals.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_health_aggregates_components() {
    let agent = agent(
        Arc::new(FakeSource::default()),
        Some(factory(vec![("p1", dynamic(&Scripted::failing()))])),
        FinanceConfig::default(),
    )
    .await;

    let health = agent.health_check().await;
    assert!(health.healthy);
    assert_eq!(health.mode, AgentMode::Primary);
    assert_eq!(health.classifier.providers, vec!["fixed"]);
    assert_eq!(health.registry.capabilities.len(), 4);
    assert_eq!(health.cache.backend, "memory");
    assert_eq!(health.providers.map(|p| p.sequence), Some(vec!["p1".to_string()]));
}
