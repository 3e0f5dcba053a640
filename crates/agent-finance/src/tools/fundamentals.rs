//! Company fundamentals

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

/// Fetches valuation metrics for one company
pub struct FundamentalsTool {
    source: Arc<dyn MarketDataSource>,
}

impl FundamentalsTool {
    /// Create a fundamentals capability over `source`
    pub fn new(source: Arc<dyn MarketDataSource>) -> Self {
        Self { source }
    }

    async fn fetch(&self, params: &Value) -> Result<Value> {
        let symbol = symbol_argument(params)?;
        let fundamentals = self.source.fundamentals(&symbol).await?;
        Ok(serde_json::to_value(fundamentals)?)
    }
}

#[async_trait]
impl Tool for FundamentalsTool {
    async fn execute(&self, params: Value) -> AgentResult<Value> {
        Ok(self.fetch(&params).await?)
    }

    fn name(&self) -> &str {
        capabilities::FUNDAMENTALS
    }

    fn description(&self) -> &str {
        "Get company fundamentals for a stock ticker: sector, market capitalization, \
         P/E ratio, EPS, dividend yield, price-to-book and the 52-week range."
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::Fundamentals;
    use crate::error::FinanceError;
    use crate::source::MockMarketDataSource;

    #[tokio::test]
    async fn test_fundamentals_serialized() {
        let mut source = MockMarketDataSource::new();
        source.expect_fundamentals().times(1).returning(|symbol| {
            Ok(Fundamentals {
                symbol: symbol.to_string(),
                name: Some("Microsoft Corporation".to_string()),
                sector: Some("TECHNOLOGY".to_string()),
                industry: None,
                market_cap: Some(3.1e12),
                pe_ratio: Some(35.2),
                eps: Some(11.8),
                dividend_yield: Some(0.0072),
                price_to_book: None,
                week52_high: None,
                week52_low: None,
            })
        });
        let tool = FundamentalsTool::new(Arc::new(source));

        let value = tool.execute(json!({"symbol": "msft"})).await.unwrap();
        assert_eq!(value["symbol"], "MSFT");
        assert_eq!(value["pe_ratio"], 35.2);
        assert!(value["price_to_book"].is_null());
    }

    #[tokio::test]
    async fn test_missing_key_surfaces_as_error() {
        let mut source = MockMarketDataSource::new();
        source
            .expect_fundamentals()
            .returning(|_| Err(FinanceError::Config("ALPHA_VANTAGE_API_KEY is not configured".to_string())));
        let tool = FundamentalsTool::new(Arc::new(source));

        let err = tool.execute(json!({"symbol": "MSFT"})).await.unwrap_err();
        assert!(matches!(err, agent_core::Error::Configuration(_)));
    }
}
