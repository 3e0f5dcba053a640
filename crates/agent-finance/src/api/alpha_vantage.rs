//! Alpha Vantage API client
//!
//! Used for company fundamentals (`OVERVIEW`) and news sentiment
//! (`NEWS_SENTIMENT`). The free tier allows a handful of requests per
//! minute, so every request waits on a shared rate limiter first.

use crate::error::{FinanceError, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

const BASE_URL: &str = "https://www.alphavantage.co/query";
const PROVIDER: &str = "Alpha Vantage";

type SharedRateLimiter = Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>;

/// Alpha Vantage API client
#[derive(Debug, Clone)]
pub struct AlphaVantageClient {
    client: Client,
    api_key: String,
    base_url: String,
    rate_limiter: SharedRateLimiter,
}

/// Valuation metrics for one company
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fundamentals {
    pub symbol: String,
    pub name: Option<String>,
    pub sector: Option<String>,
    pub industry: Option<String>,
    pub market_cap: Option<f64>,
    pub pe_ratio: Option<f64>,
    pub eps: Option<f64>,
    pub dividend_yield: Option<f64>,
    pub price_to_book: Option<f64>,
    pub week52_high: Option<f64>,
    pub week52_low: Option<f64>,
}

/// One news article with its sentiment for the requested symbol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsItem {
    pub title: String,
    pub source: String,
    pub url: String,
    pub published_at: Option<DateTime<Utc>>,
    pub summary: String,
    pub sentiment_score: f64,
    pub sentiment_label: String,
}

impl AlphaVantageClient {
    /// Create a new Alpha Vantage client with API key and rate limit
    ///
    /// # Arguments
    /// * `api_key` - Alpha Vantage API key
    /// * `rate_limit` - Maximum requests per minute (5 on the free tier)
    /// * `timeout` - Per-request HTTP timeout
    pub fn new(api_key: impl Into<String>, rate_limit: u32, timeout: Duration) -> Result<Self> {
        let quota = Quota::per_minute(NonZeroU32::new(rate_limit).unwrap_or(NonZeroU32::MIN));
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url: BASE_URL.to_string(),
            rate_limiter: Arc::new(RateLimiter::direct(quota)),
        })
    }

    /// Override the endpoint (proxies, test servers)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn query(&self, params: &HashMap<&str, &str>) -> Result<Value> {
        self.rate_limiter.until_ready().await;

        let response = self
            .client
            .get(&self.base_url)
            .query(params)
            .query(&[("apikey", self.api_key.as_str())])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(FinanceError::AlphaVantage(format!(
                "HTTP error: {}",
                response.status()
            )));
        }

        let data: Value = response.json().await?;
        check_payload(&data)?;
        Ok(data)
    }

    /// Get company overview and valuation metrics
    pub async fn get_fundamentals(&self, symbol: &str) -> Result<Fundamentals> {
        let params = HashMap::from([("function", "OVERVIEW"), ("symbol", symbol)]);
        let data = self.query(&params).await?;
        debug!(symbol, "Fetched company overview");
        parse_overview(symbol, &data)
    }

    /// Get the most recent articles mentioning `symbol`
    pub async fn get_news(&self, symbol: &str, limit: usize) -> Result<Vec<NewsItem>> {
        let limit_param = limit.max(1).to_string();
        let params = HashMap::from([
            ("function", "NEWS_SENTIMENT"),
            ("tickers", symbol),
            ("sort", "LATEST"),
            ("limit", limit_param.as_str()),
        ]);
        let data = self.query(&params).await?;
        let items = parse_news_feed(symbol, &data, limit);
        debug!(symbol, count = items.len(), "Fetched news sentiment");
        Ok(items)
    }
}

/// Reject error and throttling payloads; both arrive with HTTP 200
fn check_payload(data: &Value) -> Result<()> {
    if let Some(error) = data.get("Error Message").and_then(Value::as_str) {
        return Err(FinanceError::AlphaVantage(error.to_string()));
    }
    if data.get("Note").is_some() || data.get("Information").is_some() {
        return Err(FinanceError::RateLimitExceeded {
            provider: PROVIDER.to_string(),
        });
    }
    Ok(())
}

/// Numeric fields come back as strings, with "None" or "-" for missing values
fn parse_number(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => match s.trim() {
            "" | "None" | "-" => None,
            s => s.parse().ok(),
        },
        _ => None,
    }
}

fn parse_text(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty() && *s != "None")
        .map(ToString::to_string)
}

fn parse_overview(symbol: &str, data: &Value) -> Result<Fundamentals> {
    // Unknown symbols return an empty object
    if data.as_object().is_none_or(|o| o.is_empty()) {
        return Err(FinanceError::InvalidSymbol(symbol.to_string()));
    }

    Ok(Fundamentals {
        symbol: parse_text(data.get("Symbol")).unwrap_or_else(|| symbol.to_string()),
        name: parse_text(data.get("Name")),
        sector: parse_text(data.get("Sector")),
        industry: parse_text(data.get("Industry")),
        market_cap: parse_number(data.get("MarketCapitalization")),
        pe_ratio: parse_number(data.get("PERatio")),
        eps: parse_number(data.get("EPS")),
        dividend_yield: parse_number(data.get("DividendYield")),
        price_to_book: parse_number(data.get("PriceToBookRatio")),
        week52_high: parse_number(data.get("52WeekHigh")),
        week52_low: parse_number(data.get("52WeekLow")),
    })
}

fn parse_news_feed(symbol: &str, data: &Value, limit: usize) -> Vec<NewsItem> {
    let Some(feed) = data.get("feed").and_then(Value::as_array) else {
        return Vec::new();
    };

    feed.iter()
        .take(limit)
        .map(|article| {
            // Prefer the per-ticker score over the article-wide one
            let ticker_score = article
                .get("ticker_sentiment")
                .and_then(Value::as_array)
                .and_then(|tickers| {
                    tickers.iter().find(|t| {
                        t.get("ticker")
                            .and_then(Value::as_str)
                            .is_some_and(|s| s.eq_ignore_ascii_case(symbol))
                    })
                })
                .and_then(|t| parse_number(t.get("ticker_sentiment_score")));
            let sentiment_score = ticker_score
                .or_else(|| parse_number(article.get("overall_sentiment_score")))
                .unwrap_or(0.0);

            NewsItem {
                title: parse_text(article.get("title")).unwrap_or_default(),
                source: parse_text(article.get("source")).unwrap_or_default(),
                url: parse_text(article.get("url")).unwrap_or_default(),
                published_at: article
                    .get("time_published")
                    .and_then(Value::as_str)
                    .and_then(|s| NaiveDateTime::parse_from_str(s, "%Y%m%dT%H%M%S").ok())
                    .map(|dt| dt.and_utc()),
                summary: parse_text(article.get("summary")).unwrap_or_default(),
                sentiment_score,
                sentiment_label: sentiment_label(sentiment_score).to_string(),
            }
        })
        .collect()
}

/// Label a sentiment score using Alpha Vantage's published bands
pub fn sentiment_label(score: f64) -> &'static str {
    if score <= -0.35 {
        "Bearish"
    } else if score <= -0.15 {
        "Somewhat-Bearish"
    } else if score < 0.15 {
        "Neutral"
    } else if score < 0.35 {
        "Somewhat-Bullish"
    } else {
        "Bullish"
    }
}
