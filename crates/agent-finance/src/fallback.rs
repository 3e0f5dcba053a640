//! Deterministic per-intent handlers
//!
//! Used when no model provider can be reached. Each handler pulls tickers
//! out of the query, calls capabilities directly and fills a fixed
//! template. A failed capability shows up as an "unavailable" line instead
//! of failing the answer.

use crate::config::capabilities;
use crate::error::Result;
use crate::intent::Intent;
use crate::prompts::{Prompts, names};
use crate::symbols::SymbolExtractor;
use crate::tools::{DEFAULT_NEWS_LIMIT, invoke_recorded};
use agent_core::ToolCallRecord;
use agent_runtime::ExecutorEventHandler;
use agent_tools::CapabilityRegistry;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::debug;

/// Most tickers a single template answer covers
pub const MAX_SYMBOLS: usize = 5;

/// Text plus the capability calls that produced it
#[derive(Debug, Clone)]
pub struct TemplateAnswer {
    pub content: String,
    pub tool_calls: Vec<ToolCallRecord>,
}

/// Fallback-mode answer builder
pub struct TemplateHandlers {
    registry: Arc<CapabilityRegistry>,
    prompts: Arc<Prompts>,
    extractor: Arc<SymbolExtractor>,
}

impl TemplateHandlers {
    pub fn new(
        registry: Arc<CapabilityRegistry>,
        prompts: Arc<Prompts>,
        extractor: Arc<SymbolExtractor>,
    ) -> Self {
        Self {
            registry,
            prompts,
            extractor,
        }
    }

    /// Answer `query` for `intent` without any model call
    pub async fn handle(
        &self,
        intent: Intent,
        query: &str,
        symbols: &[String],
        handler: &dyn ExecutorEventHandler,
    ) -> Result<TemplateAnswer> {
        let symbols: Vec<String> = symbols.iter().take(MAX_SYMBOLS).cloned().collect();
        debug!(%intent, symbols = ?symbols, "Template handler");

        let mut calls = Vec::new();
        let content = match intent {
            Intent::SymbolLookup => self.symbol_lookup(query, &symbols, handler, &mut calls).await?,
            Intent::General if symbols.is_empty() => self.prompts.render(names::GENERAL_HELP, json!({}))?,
            _ if symbols.is_empty() => self.prompts.render(names::MISSING_SYMBOL, json!({ "lookup": false }))?,
            Intent::PriceCheck | Intent::General => {
                self.per_symbol(&symbols, capabilities::QUOTE, "the latest quote", handler, &mut calls)
                    .await?
            }
            Intent::Fundamentals => {
                self.per_symbol(&symbols, capabilities::FUNDAMENTALS, "fundamental data", handler, &mut calls)
                    .await?
            }
            Intent::News => {
                self.per_symbol(&symbols, capabilities::NEWS, "news", handler, &mut calls)
                    .await?
            }
            Intent::Comparative => self.comparison(&symbols, handler, &mut calls).await?,
        };

        Ok(TemplateAnswer {
            content: content.trim_end().to_string(),
            tool_calls: calls,
        })
    }

    async fn symbol_lookup(
        &self,
        query: &str,
        symbols: &[String],
        handler: &dyn ExecutorEventHandler,
        calls: &mut Vec<ToolCallRecord>,
    ) -> Result<String> {
        let Some(phrase) = self
            .extractor
            .lookup_phrase(query)
            .or_else(|| symbols.first().cloned())
        else {
            return self.prompts.render(names::MISSING_SYMBOL, json!({ "lookup": true }));
        };

        let record = invoke_recorded(
            &self.registry,
            capabilities::SEARCH,
            json!({ "query": phrase }),
            handler,
        )
        .await;
        let text = match record.result() {
            Some(result) => self.prompts.render(names::SEARCH, result)?,
            None => self.unavailable(&phrase, "symbol search")?,
        };
        calls.push(record);
        Ok(text)
    }

    async fn per_symbol(
        &self,
        symbols: &[String],
        capability: &str,
        what: &str,
        handler: &dyn ExecutorEventHandler,
        calls: &mut Vec<ToolCallRecord>,
    ) -> Result<String> {
        let mut sections = Vec::with_capacity(symbols.len());
        for symbol in symbols {
            let record = invoke_recorded(&self.registry, capability, arguments(capability, symbol), handler).await;
            let text = match record.result() {
                Some(result) => render_result(&self.prompts, capability, result)?,
                None => self.unavailable(symbol, what)?,
            };
            sections.push(text.trim_end().to_string());
            calls.push(record);
        }
        let separator = if capability == capabilities::QUOTE { "\n" } else { "\n\n" };
        Ok(sections.join(separator))
    }

    async fn comparison(
        &self,
        symbols: &[String],
        handler: &dyn ExecutorEventHandler,
        calls: &mut Vec<ToolCallRecord>,
    ) -> Result<String> {
        let mut rows = Vec::with_capacity(symbols.len());
        for symbol in symbols {
            let quote = invoke_recorded(&self.registry, capabilities::QUOTE, json!({ "symbol": symbol }), handler).await;
            let fundamentals = invoke_recorded(
                &self.registry,
                capabilities::FUNDAMENTALS,
                json!({ "symbol": symbol }),
                handler,
            )
            .await;

            let field = |record: &ToolCallRecord, name: &str| {
                record.result().and_then(|r| r.get(name)).cloned().unwrap_or(Value::Null)
            };
            rows.push(json!({
                "symbol": symbol,
                "close": field(&quote, "close"),
                "change_percent": field(&quote, "change_percent"),
                "market_cap": field(&fundamentals, "market_cap"),
                "pe_ratio": field(&fundamentals, "pe_ratio"),
                "eps": field(&fundamentals, "eps"),
                "dividend_yield": field(&fundamentals, "dividend_yield"),
            }));
            calls.push(quote);
            calls.push(fundamentals);
        }
        self.prompts
            .render(names::COMPARISON, json!({ "symbols": symbols, "rows": rows }))
    }

    fn unavailable(&self, symbol: &str, what: &str) -> Result<String> {
        self.prompts
            .render(names::UNAVAILABLE, json!({ "symbol": symbol, "what": what }))
    }
}

fn arguments(capability: &str, symbol: &str) -> Value {
    if capability == capabilities::NEWS {
        json!({ "symbol": symbol, "limit": DEFAULT_NEWS_LIMIT })
    } else {
        json!({ "symbol": symbol })
    }
}

/// Format one capability result with its template
///
/// Results of capabilities without a template are shown as pretty JSON.
pub fn render_result(prompts: &Prompts, capability: &str, result: &Value) -> Result<String> {
    let template = match capability {
        capabilities::QUOTE => names::QUOTE,
        capabilities::SEARCH => names::SEARCH,
        capabilities::FUNDAMENTALS => names::FUNDAMENTALS,
        capabilities::NEWS => names::NEWS,
        _ => return Ok(serde_json::to_string_pretty(result)?),
    };
    prompts.render(template, result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{Fundamentals, Quote, SymbolMatch};
    use crate::error::FinanceError;
    use crate::source::{MockMarketDataSource, NewsDigest};
    use crate::tools::register_default_capabilities;
    use agent_runtime::NoOpEventHandler;
    use agent_tools::{CacheSettings, MemoryStore};
    use chrono::Utc;

    fn quote(symbol: &str) -> Quote {
        Quote {
            symbol: symbol.to_string(),
            timestamp: Utc::now(),
            open: 100.0,
            high: 102.0,
            low: 99.0,
            close: 101.0,
            volume: 10_000,
            adjclose: 101.0,
        }
    }

    fn handlers(source: MockMarketDataSource) -> TemplateHandlers {
        let registry = Arc::new(CapabilityRegistry::new(
            Arc::new(MemoryStore::new()),
            CacheSettings::default(),
        ));
        register_default_capabilities(&registry, Arc::new(source)).unwrap();
        TemplateHandlers::new(
            registry,
            Arc::new(Prompts::new().unwrap()),
            Arc::new(SymbolExtractor::new().unwrap()),
        )
    }

    #[tokio::test]
    async fn test_price_check_per_symbol() {
        let mut source = MockMarketDataSource::new();
        source.expect_quote().times(2).returning(|s| Ok(quote(s)));
        let h = handlers(source);

        let answer = h
            .handle(
                Intent::PriceCheck,
                "AAPL and MSFT prices",
                &["AAPL".to_string(), "MSFT".to_string()],
                &NoOpEventHandler,
            )
            .await
            .unwrap();
        assert_eq!(answer.tool_calls.len(), 2);
        assert!(answer.content.contains("AAPL last traded at $101.00"));
        assert!(answer.content.contains("MSFT last traded at $101.00"));
    }

    #[tokio::test]
    async fn test_missing_symbol_asks_for_one() {
        let h = handlers(MockMarketDataSource::new());
        let answer = h
            .handle(Intent::Fundamentals, "how is it valued?", &[], &NoOpEventHandler)
            .await
            .unwrap();
        assert!(answer.tool_calls.is_empty());
        assert!(answer.content.contains("couldn't find a ticker"));
    }

    #[tokio::test]
    async fn test_general_without_symbols_is_help() {
        let h = handlers(MockMarketDataSource::new());
        let answer = h
            .handle(Intent::General, "hello", &[], &NoOpEventHandler)
            .await
            .unwrap();
        assert!(answer.content.starts_with("I can look up"));
    }

    #[tokio::test]
    async fn test_symbol_lookup_uses_phrase() {
        let mut source = MockMarketDataSource::new();
        source.expect_search().times(1).returning(|query, _| {
            assert_eq!(query, "Coca-Cola");
            Ok(vec![SymbolMatch {
                symbol: "KO".to_string(),
                name: "The Coca-Cola Company".to_string(),
                exchange: "NYQ".to_string(),
                quote_type: "EQUITY".to_string(),
            }])
        });
        let h = handlers(source);

        let answer = h
            .handle(
                Intent::SymbolLookup,
                "What is the ticker for Coca-Cola?",
                &[],
                &NoOpEventHandler,
            )
            .await
            .unwrap();
        assert!(answer.content.contains("- KO: The Coca-Cola Company"));
    }

    #[tokio::test]
    async fn test_comparison_marks_failed_fields() {
        let mut source = MockMarketDataSource::new();
        source.expect_quote().returning(|s| Ok(quote(s)));
        source
            .expect_fundamentals()
            .returning(|s| {
                if s == "GOOGL" {
                    return Err(FinanceError::RateLimitExceeded {
                        provider: "Alpha Vantage".to_string(),
                    });
                }
                Ok(Fundamentals {
                    symbol: s.to_string(),
                    name: None,
                    sector: None,
                    industry: None,
                    market_cap: Some(3.0e12),
                    pe_ratio: Some(30.0),
                    eps: Some(6.0),
                    dividend_yield: Some(0.005),
                    price_to_book: None,
                    week52_high: None,
                    week52_low: None,
                })
            });
        let h = handlers(source);

        let answer = h
            .handle(
                Intent::Comparative,
                "Compare AAPL and GOOGL",
                &["AAPL".to_string(), "GOOGL".to_string()],
                &NoOpEventHandler,
            )
            .await
            .unwrap();
        assert_eq!(answer.tool_calls.len(), 4);
        assert!(!answer.tool_calls[3].is_success());
        assert!(answer.content.contains("AAPL: price $101.00, change +1.00%, market cap 3.00T, P/E 30.00"));
        assert!(answer.content.contains("GOOGL: price $101.00, change +1.00%, market cap n/a, P/E n/a"));
    }

    #[tokio::test]
    async fn test_news_failure_is_unavailable_line() {
        let mut source = MockMarketDataSource::new();
        source.expect_news().returning(|symbol, _| {
            if symbol == "TSLA" {
                Ok(NewsDigest::from_articles(symbol.to_string(), Vec::new()))
            } else {
                Err(FinanceError::Config("ALPHA_VANTAGE_API_KEY is not configured".to_string()))
            }
        });
        let h = handlers(source);

        let answer = h
            .handle(
                Intent::News,
                "news on TSLA and F",
                &["TSLA".to_string(), "F".to_string()],
                &NoOpEventHandler,
            )
            .await
            .unwrap();
        assert!(answer.content.contains("No recent news found for TSLA."));
        assert!(answer.content.contains("F: news is unavailable right now."));
        assert!(!answer.content.contains("ALPHA_VANTAGE"));
    }
}
