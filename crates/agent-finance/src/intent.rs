//! Query intents and their example utterances

use crate::config::capabilities;
use serde::{Deserialize, Serialize};
use std::fmt;

/// What a query is asking for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Intent {
    /// Current price of one or more tickers
    PriceCheck,
    /// Which ticker belongs to a company
    SymbolLookup,
    /// Valuation metrics and company profile
    Fundamentals,
    /// Headlines and sentiment
    News,
    /// Comparison across several tickers
    Comparative,
    /// Anything else
    General,
}

impl Intent {
    /// Every intent in declaration order; classifier ties resolve to the earlier one
    pub const ALL: [Intent; 6] = [
        Intent::PriceCheck,
        Intent::SymbolLookup,
        Intent::Fundamentals,
        Intent::News,
        Intent::Comparative,
        Intent::General,
    ];

    /// Wire name, e.g. `PRICE_CHECK`
    pub fn as_str(self) -> &'static str {
        match self {
            Intent::PriceCheck => "PRICE_CHECK",
            Intent::SymbolLookup => "SYMBOL_LOOKUP",
            Intent::Fundamentals => "FUNDAMENTALS",
            Intent::News => "NEWS",
            Intent::Comparative => "COMPARATIVE",
            Intent::General => "GENERAL",
        }
    }

    /// Capability that answers this intent on its own, if any
    pub fn direct_capability(self) -> Option<&'static str> {
        match self {
            Intent::PriceCheck => Some(capabilities::QUOTE),
            Intent::SymbolLookup => Some(capabilities::SEARCH),
            _ => None,
        }
    }

    /// Example utterances used to build the classifier prototypes
    pub fn examples(self) -> &'static [&'static str] {
        match self {
            Intent::PriceCheck => &[
                "What is AAPL trading at?",
                "What's the current price of Tesla stock?",
                "How much is MSFT right now?",
                "Give me a quote for NVDA",
                "What is the share price of Amazon today?",
                "Where is GOOGL trading?",
                "Current stock price of Apple",
            ],
            Intent::SymbolLookup => &[
                "What is the ticker symbol for Apple?",
                "What's the stock symbol of Microsoft?",
                "Find the ticker for Coca-Cola",
                "Which symbol does Berkshire Hathaway trade under?",
                "Look up the ticker for Nvidia",
                "Search for the symbol of Johnson & Johnson",
            ],
            Intent::Fundamentals => &[
                "What is the P/E ratio of AAPL?",
                "Show me the fundamentals for Microsoft",
                "What is Tesla's market cap?",
                "What's the EPS and dividend yield of KO?",
                "Give me the valuation metrics for NVDA",
                "Is Amazon overvalued based on its price to book?",
                "What sector and industry is JPM in?",
            ],
            Intent::News => &[
                "What's the latest news on Tesla?",
                "Any recent headlines about AAPL?",
                "What is the market sentiment for NVDA?",
                "Why is Meta stock in the news today?",
                "Show me news articles about Microsoft",
                "Is the news on Amazon bullish or bearish?",
            ],
            Intent::Comparative => &[
                "Compare AAPL and MSFT",
                "Which is a better buy, Tesla or Ford?",
                "Compare the fundamentals of Google and Amazon",
                "How does NVDA stack up against AMD?",
                "AAPL vs GOOGL valuation",
                "Compare the P/E ratios of Coca-Cola and Pepsi",
            ],
            Intent::General => &[
                "What is a stock?",
                "How does the stock market work?",
                "Explain what a dividend is",
                "What should I know before investing?",
                "What is the difference between a stock and a bond?",
                "Hello, what can you do?",
            ],
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
