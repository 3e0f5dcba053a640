//! Market data capabilities
//!
//! Each capability is a plain fetcher over a [`MarketDataSource`]; caching,
//! coalescing and timeouts come from the registry's wrapper.

pub mod fundamentals;
pub mod news;
pub mod quote;
pub mod search;

pub use fundamentals::FundamentalsTool;
pub use news::NewsTool;
pub use quote::QuoteTool;
pub use search::SymbolSearchTool;

use crate::error::{FinanceError, Result};
use crate::source::MarketDataSource;
use agent_core::ToolCallRecord;
use agent_runtime::{ExecutorEventHandler, invoke_capability};
use agent_tools::{CapabilityRegistry, Tool};
use serde_json::Value;
use std::sync::Arc;

/// Default number of search matches
pub const DEFAULT_SEARCH_LIMIT: usize = 5;
/// Default number of news articles
pub const DEFAULT_NEWS_LIMIT: usize = 5;
/// Upper bound on any list capability
pub const MAX_LIMIT: usize = 20;

/// Register the four market data capabilities, all enabled
pub fn register_default_capabilities(
    registry: &CapabilityRegistry,
    source: Arc<dyn MarketDataSource>,
) -> Result<()> {
    let tools: [Arc<dyn Tool>; 4] = [
        Arc::new(QuoteTool::new(Arc::clone(&source))),
        Arc::new(SymbolSearchTool::new(Arc::clone(&source))),
        Arc::new(FundamentalsTool::new(Arc::clone(&source))),
        Arc::new(NewsTool::new(source)),
    ];
    for tool in tools {
        registry.register(tool)?;
    }
    Ok(())
}

/// Invoke a capability outside the reasoning loop, firing the same events
pub async fn invoke_recorded(
    registry: &CapabilityRegistry,
    name: &str,
    arguments: Value,
    handler: &dyn ExecutorEventHandler,
) -> ToolCallRecord {
    let id = format!("call_{}", uuid::Uuid::new_v4().simple());
    handler.on_tool_start(&id, name, &arguments).await;
    let record = invoke_capability(registry, &id, name, &arguments).await;
    handler.on_tool_done(&record).await;
    record
}

/// Normalise a ticker: trim, drop a leading `$`, upper-case
///
/// Returns `None` for anything that cannot be a ticker. Index and FX
/// tickers such as `^GSPC`, `BRK.B` and `EURUSD=X` are accepted.
pub fn normalize_symbol(raw: &str) -> Option<String> {
    let symbol = raw.trim().trim_start_matches('$').to_ascii_uppercase();
    let valid = (1..=12).contains(&symbol.len())
        && symbol
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '^' | '='))
        && symbol.chars().any(|c| c.is_ascii_alphabetic());
    valid.then_some(symbol)
}

/// Extract and normalise the required `symbol` argument
pub(crate) fn symbol_argument(params: &Value) -> Result<String> {
    let raw = params
        .get("symbol")
        .and_then(Value::as_str)
        .ok_or_else(|| FinanceError::InvalidArguments("missing string field 'symbol'".to_string()))?;
    normalize_symbol(raw).ok_or_else(|| FinanceError::InvalidSymbol(raw.to_string()))
}

/// Optional `limit` argument, clamped to `1..=MAX_LIMIT`
pub(crate) fn limit_argument(params: &Value, default: usize) -> usize {
    params
        .get("limit")
        .and_then(Value::as_u64)
        .map_or(default, |n| (n as usize).clamp(1, MAX_LIMIT))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MockMarketDataSource;
    use agent_tools::{CacheSettings, MemoryStore};
    use serde_json::json;

    #[test]
    fn test_normalize_symbol() {
        assert_eq!(normalize_symbol(" $aapl "), Some("AAPL".to_string()));
        assert_eq!(normalize_symbol("brk.b"), Some("BRK.B".to_string()));
        assert_eq!(normalize_symbol("^gspc"), Some("^GSPC".to_string()));
        assert_eq!(normalize_symbol(""), None);
        assert_eq!(normalize_symbol("APPLE INC"), None);
        assert_eq!(normalize_symbol("1234"), None);
    }

    #[test]
    fn test_arguments() {
        assert_eq!(symbol_argument(&json!({"symbol": "msft"})).unwrap(), "MSFT");
        assert!(matches!(
            symbol_argument(&json!({})),
            Err(FinanceError::InvalidArguments(_))
        ));
        assert!(matches!(
            symbol_argument(&json!({"symbol": "not a ticker"})),
            Err(FinanceError::InvalidSymbol(_))
        ));
        assert_eq!(limit_argument(&json!({}), 5), 5);
        assert_eq!(limit_argument(&json!({"limit": 0}), 5), 1);
        assert_eq!(limit_argument(&json!({"limit": 500}), 5), MAX_LIMIT);
    }

    #[test]
    fn test_register_default_capabilities() {
        let registry = CapabilityRegistry::new(Arc::new(MemoryStore::new()), CacheSettings::default());
        register_default_capabilities(&registry, Arc::new(MockMarketDataSource::new())).unwrap();

        let names: Vec<String> = registry.descriptors().into_iter().map(|d| d.name).collect();
        assert_eq!(
            names,
            vec!["stock_quote", "symbol_search", "company_fundamentals", "market_news"]
        );

        // Wiring twice is a startup error
        let err = register_default_capabilities(&registry, Arc::new(MockMarketDataSource::new()))
            .unwrap_err();
        assert!(matches!(err, FinanceError::Registry(_)));
    }

    #[tokio::test]
    async fn test_invoke_recorded_reports_unknown_capability() {
        let registry = CapabilityRegistry::new(Arc::new(MemoryStore::new()), CacheSettings::default());
        let record = invoke_recorded(
            &registry,
            "missing",
            json!({"symbol": "AAPL"}),
            &agent_runtime::NoOpEventHandler,
        )
        .await;
        assert!(!record.is_success());
        assert!(record.id().starts_with("call_"));
    }
}
