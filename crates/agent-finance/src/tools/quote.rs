//! Latest stock quote

use agent_core::Result as AgentResult;
use agent_llm::tools::schema;
use agent_tools::Tool;
use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;

use super::symbol_argument;
use crate::config::capabilities;
use crate::error::Result;
use crate::source::MarketDataSource;

/// Fetches the latest OHLCV quote for one symbol
pub struct QuoteTool {
    source: Arc<dyn MarketDataSource>,
}

impl QuoteTool {
    /// Create a quote capability over `source`
    pub fn new(source: Arc<dyn MarketDataSource>) -> Self {
        Self { source }
    }

    async fn fetch(&self, params: &Value) -> Result<Value> {
        let symbol = symbol_argument(params)?;
        let quote = self.source.quote(&symbol).await?;
        let change_percent = (quote.open > 0.0).then(|| (quote.close - quote.open) / quote.open * 100.0);

        let mut value = serde_json::to_value(&quote)?;
        value["change_percent"] = json!(change_percent);
        Ok(value)
    }
}

#[async_trait]
impl Tool for QuoteTool {
    async fn execute(&self, params: Value) -> AgentResult<Value> {
        Ok(self.fetch(&params).await?)
    }

    fn name(&self) -> &str {
        capabilities::QUOTE
    }

    fn description(&self) -> &str {
        "Get the latest price quote for a stock ticker: open, high, low, close, volume \
         and the change since the open."
    }

    fn input_schema(&self) -> Value {
        schema::object(
            json!({ "symbol": schema::string("Stock ticker symbol (e.g., 'AAPL', 'GOOGL')") }),
            &["symbol"],
        )
    }

    fn canonical_arguments(&self, params: &Value) -> Value {
        match symbol_argument(params) {
            Ok(symbol) => json!({ "symbol": symbol }),
            Err(_) => params.clone(),
        }
    }
}
