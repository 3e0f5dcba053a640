//! Yahoo Finance API client

use crate::error::{FinanceError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use yahoo_finance_api as yahoo;

/// Yahoo Finance API client
pub struct YahooFinanceClient {
    connector: yahoo::YahooConnector,
}

/// Latest quote for one symbol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
    pub adjclose: f64,
}

/// One ticker returned by a symbol search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolMatch {
    pub symbol: String,
    pub name: String,
    pub exchange: String,
    pub quote_type: String,
}

impl YahooFinanceClient {
    /// Create a new Yahoo Finance client
    pub fn new() -> Result<Self> {
        let connector =
            yahoo::YahooConnector::new().map_err(|e| FinanceError::YahooFinance(e.to_string()))?;
        Ok(Self { connector })
    }

    /// Get the latest quote for a symbol
    pub async fn get_quote(&self, symbol: &str) -> Result<Quote> {
        let response = self
            .connector
            .get_latest_quotes(symbol, "1d")
            .await
            .map_err(|e| FinanceError::DataUnavailable {
                symbol: symbol.to_string(),
                reason: e.to_string(),
            })?;

        let quote = response
            .last_quote()
            .map_err(|e| FinanceError::YahooFinance(e.to_string()))?;

        debug!(symbol, close = quote.close, "Fetched Yahoo quote");
        Ok(Quote {
            symbol: symbol.to_string(),
            timestamp: DateTime::from_timestamp(quote.timestamp as i64, 0).unwrap_or_else(Utc::now),
            open: quote.open,
            high: quote.high,
            low: quote.low,
            close: quote.close,
            volume: quote.volume,
            adjclose: quote.adjclose,
        })
    }

    /// Search tickers by company name or keyword, best matches first
    pub async fn search(&self, query: &str, limit: usize) -> Result<Vec<SymbolMatch>> {
        let result = self
            .connector
            .search_ticker(query)
            .await
            .map_err(|e| FinanceError::YahooFinance(e.to_string()))?;

        let matches: Vec<SymbolMatch> = result
            .quotes
            .into_iter()
            .take(limit)
            .map(|item| SymbolMatch {
                name: if item.long_name.is_empty() {
                    item.short_name
                } else {
                    item.long_name
                },
                symbol: item.symbol,
                exchange: item.exchange,
                quote_type: item.quote_type,
            })
            .collect();

        debug!(query, count = matches.len(), "Yahoo symbol search");
        Ok(matches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[ignore] // Requires network access
    async fn test_get_quote() {
        let client = YahooFinanceClient::new().unwrap();
        let quote = client.get_quote("AAPL").await.unwrap();
        assert_eq!(quote.symbol, "AAPL");
        assert!(quote.close > 0.0);
    }

    #[tokio::test]
    #[ignore] // Requires network access
    async fn test_search() {
        let client = YahooFinanceClient::new().unwrap();
        let matches = client.search("apple", 5).await.unwrap();
        assert!(!matches.is_empty());
        assert!(matches.len() <= 5);
        assert!(matches.iter().any(|m| m.symbol == "AAPL"));
    }

    #[tokio::test]
    #[ignore] // Requires network access
    async fn test_unknown_symbol() {
        let client = YahooFinanceClient::new().unwrap();
        assert!(client.get_quote("INVALID_SYMBOL_12345").await.is_err());
    }
}
