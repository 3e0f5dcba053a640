//! API clients for market data providers

pub mod alpha_vantage;
pub mod yahoo;

pub use alpha_vantage::{AlphaVantageClient, Fundamentals, NewsItem, sentiment_label};
pub use yahoo::{Quote, SymbolMatch, YahooFinanceClient};
