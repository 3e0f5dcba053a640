//! Market data source seam
//!
//! Capabilities depend on [`MarketDataSource`] instead of concrete API
//! clients so tests can substitute a fake and deployments can swap vendors.

use crate::api::{AlphaVantageClient, Fundamentals, NewsItem, Quote, SymbolMatch, YahooFinanceClient, sentiment_label};
use crate::config::FinanceConfig;
use crate::error::{FinanceError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Headlines for one symbol plus their aggregate sentiment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsDigest {
    pub symbol: String,
    pub articles: Vec<NewsItem>,
    pub average_sentiment: Option<f64>,
    pub overall_sentiment: String,
}

impl NewsDigest {
    /// Aggregate articles; an empty list is reported as neutral with no score
    pub fn from_articles(symbol: impl Into<String>, articles: Vec<NewsItem>) -> Self {
        let average_sentiment = (!articles.is_empty()).then(|| {
            articles.iter().map(|a| a.sentiment_score).sum::<f64>() / articles.len() as f64
        });
        let overall_sentiment = sentiment_label(average_sentiment.unwrap_or(0.0)).to_string();
        Self {
            symbol: symbol.into(),
            articles,
            average_sentiment,
            overall_sentiment,
        }
    }
}

/// Provider of market data
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Latest quote for a symbol
    async fn quote(&self, symbol: &str) -> Result<Quote>;

    /// Tickers matching a company name or keyword
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SymbolMatch>>;

    /// Company overview and valuation metrics
    async fn fundamentals(&self, symbol: &str) -> Result<Fundamentals>;

    /// Recent headlines with sentiment
    async fn news(&self, symbol: &str, limit: usize) -> Result<NewsDigest>;
}

/// Live data: Yahoo Finance for quotes and search, Alpha Vantage for the rest
pub struct LiveMarketData {
    yahoo: YahooFinanceClient,
    alpha: Option<AlphaVantageClient>,
}

impl LiveMarketData {
    /// Build from config; without an Alpha Vantage key, fundamentals and news fail per call
    pub fn new(config: &FinanceConfig) -> Result<Self> {
        let alpha = config
            .alpha_vantage_api_key
            .as_ref()
            .map(|key| {
                AlphaVantageClient::new(
                    key.clone(),
                    config.alpha_vantage_rate_limit,
                    Duration::from_secs(config.capability_timeout_secs),
                )
            })
            .transpose()?;

        Ok(Self {
            yahoo: YahooFinanceClient::new()?,
            alpha,
        })
    }

    fn alpha(&self) -> Result<&AlphaVantageClient> {
        self.alpha.as_ref().ok_or_else(|| {
            FinanceError::Config("ALPHA_VANTAGE_API_KEY is not configured".to_string())
        })
    }
}

#[async_trait]
impl MarketDataSource for LiveMarketData {
    async fn quote(&self, symbol: &str) -> Result<Quote> {
        self.yahoo.get_quote(symbol).await
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SymbolMatch>> {
        self.yahoo.search(query, limit).await
    }

    async fn fundamentals(&self, symbol: &str) -> Result<Fundamentals> {
        self.alpha()?.get_fundamentals(symbol).await
    }

    async fn news(&self, symbol: &str, limit: usize) -> Result<NewsDigest> {
        let articles = self.alpha()?.get_news(symbol, limit).await?;
        Ok(NewsDigest::from_articles(symbol, articles))
    }
}
