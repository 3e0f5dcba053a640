//! Recent news and sentiment for a symbol

use agent_core::Result as AgentResult;
use agent_llm::tools::schema;
use agent_tools::Tool;
use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;

use super::{DEFAULT_NEWS_LIMIT, limit_argument, symbol_argument};
use crate::config::capabilities;
use crate::error::Result;
use crate::source::MarketDataSource;

/// Fetches recent headlines and their aggregate sentiment
pub struct NewsTool {
    source: Arc<dyn MarketDataSource>,
}

impl NewsTool {
    /// Create a news capability over `source`
    pub fn new(source: Arc<dyn MarketDataSource>) -> Self {
        Self { source }
    }

    async fn fetch(&self, params: &Value) -> Result<Value> {
        let symbol = symbol_argument(params)?;
        let limit = limit_argument(params, DEFAULT_NEWS_LIMIT);
        let digest = self.source.news(&symbol, limit).await?;
        Ok(serde_json::to_value(digest)?)
    }
}

#[async_trait]
impl Tool for NewsTool {
    async fn execute(&self, params: Value) -> AgentResult<Value> {
        Ok(self.fetch(&params).await?)
    }

    fn name(&self) -> &str {
        capabilities::NEWS
    }

    fn description(&self) -> &str {
        "Get recent news headlines about a stock with per-article and overall \
         sentiment (Bearish to Bullish)."
    }

    fn input_schema(&self) -> Value {
        schema::object(
            json!({
                "symbol": schema::string("Stock ticker symbol (e.g., 'AAPL', 'TSLA')"),
                "limit": schema::integer("Maximum number of articles (default 5)"),
            }),
            &["symbol"],
        )
    }

    fn canonical_arguments(&self, params: &Value) -> Value {
        match symbol_argument(params) {
            Ok(symbol) => json!({
                "symbol": symbol,
                "limit": limit_argument(params, DEFAULT_NEWS_LIMIT),
            }),
            Err(_) => params.clone(),
        }
    }
}
