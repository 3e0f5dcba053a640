//! Ticker extraction from free text
//!
//! Used by the direct and template paths, which never ask a model what the
//! user meant. Matches cashtags (`$aapl`), upper-case tickers (`MSFT`,
//! `BRK.B`) and a small table of well-known company names.

use crate::error::{FinanceError, Result};
use regex::Regex;

/// Upper-case words that look like tickers but almost never are
const STOPLIST: &[&str] = &[
    "AI", "AND", "ARE", "BUY", "CEO", "CFO", "CPI", "DCF", "EPS", "ETF", "EU", "FED", "FOR", "GDP",
    "HOW", "IPO", "IS", "IT", "ME", "NEWS", "NOT", "NYSE", "OK", "OR", "PE", "PEG", "ROE", "SEC",
    "SELL", "THE", "TO", "UK", "US", "USA", "USD", "VS", "WHAT", "YOY",
];

/// Company names that map to a ticker
const ALIASES: &[(&str, &str)] = &[
    ("alphabet", "GOOGL"),
    ("amazon", "AMZN"),
    ("apple", "AAPL"),
    ("berkshire", "BRK-B"),
    ("coca-cola", "KO"),
    ("disney", "DIS"),
    ("facebook", "META"),
    ("ford", "F"),
    ("google", "GOOGL"),
    ("intel", "INTC"),
    ("jpmorgan", "JPM"),
    ("meta", "META"),
    ("microsoft", "MSFT"),
    ("netflix", "NFLX"),
    ("nvidia", "NVDA"),
    ("pepsi", "PEP"),
    ("pepsico", "PEP"),
    ("tesla", "TSLA"),
    ("walmart", "WMT"),
];

/// Words dropped when turning a lookup question into a search phrase
const LOOKUP_NOISE: &[&str] = &[
    "a", "can", "code", "company", "do", "does", "find", "for", "get", "give", "i", "is", "look",
    "me", "of", "please", "search", "share", "shares", "stock", "symbol", "the", "ticker", "trade",
    "traded", "trades", "under", "up", "what", "what's", "whats", "which",
];

/// Pulls ticker symbols out of a query
#[derive(Debug, Clone)]
pub struct SymbolExtractor {
    cashtag: Regex,
    ticker: Regex,
    alias: Regex,
}

impl SymbolExtractor {
    /// Compile the extraction patterns
    pub fn new() -> Result<Self> {
        let names: Vec<String> = ALIASES.iter().map(|(name, _)| regex::escape(name)).collect();
        let compile = |pattern: &str| {
            Regex::new(pattern).map_err(|e| FinanceError::Config(format!("invalid symbol pattern: {e}")))
        };
        Ok(Self {
            cashtag: compile(r"\$([A-Za-z]{1,5}(?:[.\-][A-Za-z]{1,2})?)\b")?,
            ticker: compile(r"\b([A-Z]{2,5}(?:\.[A-Z]{1,2})?)\b")?,
            alias: compile(&format!(r"(?i)\b({})\b", names.join("|")))?,
        })
    }

    /// Tickers in order of first appearance, without duplicates
    pub fn extract(&self, query: &str) -> Vec<String> {
        let mut found: Vec<(usize, String)> = Vec::new();

        for caps in self.cashtag.captures_iter(query) {
            if let Some(m) = caps.get(1) {
                found.push((m.start(), m.as_str().to_ascii_uppercase()));
            }
        }
        for caps in self.ticker.captures_iter(query) {
            if let Some(m) = caps.get(1) {
                // A cashtag already covered this token
                if m.start() > 0 && query.as_bytes()[m.start() - 1] == b'$' {
                    continue;
                }
                if !STOPLIST.contains(&m.as_str()) {
                    found.push((m.start(), m.as_str().to_string()));
                }
            }
        }
        for caps in self.alias.captures_iter(query) {
            if let Some(m) = caps.get(1) {
                let name = m.as_str().to_ascii_lowercase();
                if let Some((_, symbol)) = ALIASES.iter().find(|(alias, _)| *alias == name) {
                    found.push((m.start(), (*symbol).to_string()));
                }
            }
        }

        found.sort_by_key(|(pos, _)| *pos);
        let mut symbols: Vec<String> = Vec::with_capacity(found.len());
        for (_, symbol) in found {
            if !symbols.contains(&symbol) {
                symbols.push(symbol);
            }
        }
        symbols
    }

    /// Company name or keyword to search for, from a "what's the ticker for X" question
    pub fn lookup_phrase(&self, query: &str) -> Option<String> {
        let words: Vec<&str> = query
            .split_whitespace()
            .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric() && c != '&' && c != '-'))
            .filter(|w| !w.is_empty())
            .filter(|w| !LOOKUP_NOISE.contains(&w.to_lowercase().as_str()))
            .collect();
        (!words.is_empty()).then(|| words.join(" "))
    }
}
