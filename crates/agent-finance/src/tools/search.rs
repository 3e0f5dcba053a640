//! Ticker search by company name or keyword

use agent_core::Result as AgentResult;
use agent_llm::tools::schema;
use agent_tools::Tool;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;

use super::{DEFAULT_SEARCH_LIMIT, limit_argument};
use crate::config::capabilities;
use crate::error::{FinanceError, Result};
use crate::source::MarketDataSource;

/// Finds tickers matching a company name or keyword
pub struct SymbolSearchTool {
    source: Arc<dyn MarketDataSource>,
}

#[derive(Debug, Deserialize)]
struct SearchParams {
    query: String,
}

impl SymbolSearchTool {
    /// Create a search capability over `source`
    pub fn new(source: Arc<dyn MarketDataSource>) -> Self {
        Self { source }
    }

    fn parse(params: &Value) -> Result<(String, usize)> {
        let SearchParams { query } = serde_json::from_value(params.clone())
            .map_err(|e| FinanceError::InvalidArguments(e.to_string()))?;
        let query = query.split_whitespace().collect::<Vec<_>>().join(" ");
        if query.is_empty() {
            return Err(FinanceError::InvalidArguments("query must not be empty".to_string()));
        }
        Ok((query, limit_argument(params, DEFAULT_SEARCH_LIMIT)))
    }

    async fn fetch(&self, params: &Value) -> Result<Value> {
        let (query, limit) = Self::parse(params)?;
        let matches = self.source.search(&query, limit).await?;
        Ok(json!({
            "query": query,
            "count": matches.len(),
            "matches": matches,
        }))
    }
}

#[async_trait]
impl Tool for SymbolSearchTool {
    async fn execute(&self, params: Value) -> AgentResult<Value> {
        Ok(self.fetch(&params).await?)
    }

    fn name(&self) -> &str {
        capabilities::SEARCH
    }

    fn description(&self) -> &str {
        "Search for stock ticker symbols by company name or keyword. \
         Returns the best matches with exchange and instrument type."
    }

    fn input_schema(&self) -> Value {
        schema::object(
            json!({
                "query": schema::string("Company name or keyword (e.g., 'Apple', 'electric vehicles')"),
                "limit": schema::integer("Maximum number of matches (default 5)"),
            }),
            &["query"],
        )
    }

    fn canonical_arguments(&self, params: &Value) -> Value {
        match Self::parse(params) {
            Ok((query, limit)) => json!({ "query": query.to_lowercase(), "limit": limit }),
            Err(_) => params.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::SymbolMatch;
    use crate::source::MockMarketDataSource;

    fn matches(n: usize) -> Vec<SymbolMatch> {
        (0..n)
            .map(|i| SymbolMatch {
                symbol: format!("SYM{i}"),
                name: format!("Company {i}"),
                exchange: "NMS".to_string(),
                quote_type: "EQUITY".to_string(),
            })
            .collect()
    }

    #[tokio::test]
    async fn test_search_passes_limit() {
        let mut source = MockMarketDataSource::new();
        source
            .expect_search()
            .times(1)
            .returning(|_query, limit| Ok(matches(limit)));
        let tool = SymbolSearchTool::new(Arc::new(source));

        let value = tool
            .execute(json!({"query": "  apple   inc ", "limit": 3}))
            .await
            .unwrap();
        assert_eq!(value["query"], "apple inc");
        assert_eq!(value["count"], 3);
        assert_eq!(value["matches"][0]["symbol"], "SYM0");
    }

    #[tokio::test]
    async fn test_empty_query_rejected() {
        let mut source = MockMarketDataSource::new();
        source.expect_search().never();
        let tool = SymbolSearchTool::new(Arc::new(source));
        assert!(tool.execute(json!({"query": "   "})).await.is_err());
    }

    #[test]
    fn test_canonical_arguments_fill_default_limit() {
        let tool = SymbolSearchTool::new(Arc::new(MockMarketDataSource::new()));
        assert_eq!(
            tool.canonical_arguments(&json!({"query": "Apple"})),
            tool.canonical_arguments(&json!({"query": "apple", "limit": 5}))
        );
    }
}
