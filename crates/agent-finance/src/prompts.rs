//! Prompt and answer templates
//!
//! The reasoning system prompt and every deterministic answer (direct calls
//! and fallback handlers) are MiniJinja templates. Number formatting lives in
//! filters so templates stay readable; every filter renders a missing value
//! as `n/a`.

use crate::error::Result;
use chrono::Utc;
use minijinja::Environment;
use serde::Serialize;
use serde_json::json;

/// Template names
pub mod names {
    pub const SYSTEM: &str = "system";
    pub const QUOTE: &str = "quote";
    pub const SEARCH: &str = "search";
    pub const FUNDAMENTALS: &str = "fundamentals";
    pub const NEWS: &str = "news";
    pub const COMPARISON: &str = "comparison";
    pub const UNAVAILABLE: &str = "unavailable";
    pub const GENERAL_HELP: &str = "general_help";
    pub const MISSING_SYMBOL: &str = "missing_symbol";
    pub const PARTIAL: &str = "partial";
    pub const ERROR: &str = "error";
}

const SYSTEM: &str = r#"You are a financial research assistant. Today is {{ today }}.

Answer questions about stocks with the tools available to you: {{ tools | join(", ") }}.
Always fetch prices, fundamentals and news with a tool; never quote figures from memory.
{% if symbols %}Tickers mentioned so far: {{ symbols | join(", ") }}.
{% endif %}
Guidelines:
- When a question covers several tickers, call the relevant tool once per ticker.
- If a tool returns an error, say which data is unavailable and continue with what you have.
- Keep answers concise and cite the figures you used.
- Do not give personalised investment advice."#;

const QUOTE: &str = "{{ symbol }} last traded at {{ close | money }}\
{% if change_percent is not none %} ({{ change_percent | signed }} since the open){% endif %}. \
Day range {{ low | money }} - {{ high | money }}, volume {{ volume | human_number }}.";

const SEARCH: &str = r#"{% if matches %}Tickers matching "{{ query }}":
{% for m in matches %}- {{ m.symbol }}: {{ m.name }} ({{ m.exchange }}, {{ m.quote_type }})
{% endfor %}{% else %}No tickers found for "{{ query }}".{% endif %}"#;

const FUNDAMENTALS: &str = r"{{ symbol }}{% if name %} ({{ name }}){% endif %}{% if sector %}, {{ sector | title }}{% endif %}
- Market cap: {{ market_cap | human_number }}
- P/E ratio: {{ pe_ratio | number }}
- EPS: {{ eps | number }}
- Dividend yield: {{ dividend_yield | percent }}
- Price to book: {{ price_to_book | number }}
- 52-week range: {{ week52_low | money }} - {{ week52_high | money }}";

const NEWS: &str = r"{% if articles %}Recent news for {{ symbol }} (overall sentiment: {{ overall_sentiment }}{% if average_sentiment is not none %}, score {{ average_sentiment | number }}{% endif %}):
{% for a in articles %}- {{ a.title }} ({{ a.source }}, {{ a.sentiment_label }})
{% endfor %}{% else %}No recent news found for {{ symbol }}.{% endif %}";

const COMPARISON: &str = r"Comparison of {{ symbols | join(', ') }}:
{% for r in rows %}- {{ r.symbol }}: price {{ r.close | money }}, change {{ r.change_percent | signed }}, market cap {{ r.market_cap | human_number }}, P/E {{ r.pe_ratio | number }}, EPS {{ r.eps | number }}, dividend yield {{ r.dividend_yield | percent }}
{% endfor %}";

const UNAVAILABLE: &str = "{{ symbol }}: {{ what }} is unavailable right now.";

const GENERAL_HELP: &str = r#"I can look up stock quotes, ticker symbols, company fundamentals and recent news. Try "What is AAPL trading at?", "Show me the fundamentals for MSFT" or "Latest news on TSLA"."#;

const MISSING_SYMBOL: &str = "I couldn't find a ticker in your question. \
{% if lookup %}Tell me the company name you want the ticker for.\
{% else %}Mention a ticker such as AAPL, or ask me to look one up by company name.{% endif %}";

const PARTIAL: &str = "I ran out of reasoning steps before finishing. \
{% if gathered %}Data gathered so far: {{ gathered | join(', ') }}.{% else %}No data was gathered.{% endif %}";

const ERROR: &str = "Sorry, I couldn't complete that request right now. Please try again shortly.";

/// Compiled template set
pub struct Prompts {
    env: Environment<'static>,
}

impl std::fmt::Debug for Prompts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Prompts").finish_non_exhaustive()
    }
}

impl Prompts {
    /// Compile every template
    pub fn new() -> Result<Self> {
        let mut env = Environment::new();
        env.add_filter("money", money);
        env.add_filter("signed", signed);
        env.add_filter("percent", percent);
        env.add_filter("number", number);
        env.add_filter("human_number", human_number);

        for (name, source) in [
            (names::SYSTEM, SYSTEM),
            (names::QUOTE, QUOTE),
            (names::SEARCH, SEARCH),
            (names::FUNDAMENTALS, FUNDAMENTALS),
            (names::NEWS, NEWS),
            (names::COMPARISON, COMPARISON),
            (names::UNAVAILABLE, UNAVAILABLE),
            (names::GENERAL_HELP, GENERAL_HELP),
            (names::MISSING_SYMBOL, MISSING_SYMBOL),
            (names::PARTIAL, PARTIAL),
            (names::ERROR, ERROR),
        ] {
            env.add_template(name, source)?;
        }
        Ok(Self { env })
    }

    /// Render a named template
    pub fn render<S: Serialize>(&self, name: &str, ctx: S) -> Result<String> {
        Ok(self.env.get_template(name)?.render(ctx)?)
    }

    /// Reasoning system prompt
    pub fn system(&self, tools: &[String], symbols: &[String]) -> Result<String> {
        self.render(
            names::SYSTEM,
            json!({
                "today": Utc::now().format("%Y-%m-%d").to_string(),
                "tools": tools,
                "symbols": symbols,
            }),
        )
    }

    /// Fixed safe message for failed queries
    pub fn error_message(&self) -> String {
        self.render(names::ERROR, json!({}))
            .unwrap_or_else(|_| ERROR.to_string())
    }
}

fn money(value: Option<f64>) -> String {
    value.map_or_else(|| "n/a".to_string(), |v| format!("${v:.2}"))
}

fn signed(value: Option<f64>) -> String {
    value.map_or_else(|| "n/a".to_string(), |v| format!("{v:+.2}%"))
}

/// Fraction to percent: 0.0044 -> 0.44%
fn percent(value: Option<f64>) -> String {
    value.map_or_else(|| "n/a".to_string(), |v| format!("{:.2}%", v * 100.0))
}

fn number(value: Option<f64>) -> String {
    value.map_or_else(|| "n/a".to_string(), |v| format!("{v:.2}"))
}

/// 3.4e12 -> 3.40T
fn human_number(value: Option<f64>) -> String {
    let Some(v) = value else {
        return "n/a".to_string();
    };
    let abs = v.abs();
    if abs >= 1e12 {
        format!("{:.2}T", v / 1e12)
    } else if abs >= 1e9 {
        format!("{:.2}B", v / 1e9)
    } else if abs >= 1e6 {
        format!("{:.2}M", v / 1e6)
    } else if abs >= 1e3 {
        format!("{:.2}K", v / 1e3)
    } else {
        format!("{v:.0}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prompts() -> Prompts {
        Prompts::new().unwrap()
    }

    #[test]
    fn test_filters() {
        assert_eq!(human_number(Some(3.4e12)), "3.40T");
        assert_eq!(human_number(Some(52_300_000.0)), "52.30M");
        assert_eq!(human_number(Some(950.0)), "950");
        assert_eq!(human_number(None), "n/a");
        assert_eq!(percent(Some(0.0044)), "0.44%");
        assert_eq!(signed(Some(5.0)), "+5.00%");
        assert_eq!(money(Some(210.0)), "$210.00");
    }

    #[test]
    fn test_quote_template() {
        let text = prompts()
            .render(
                names::QUOTE,
                json!({
                    "symbol": "AAPL", "close": 210.0, "open": 200.0, "low": 199.0,
                    "high": 212.0, "volume": 52_300_000, "change_percent": 5.0
                }),
            )
            .unwrap();
        assert_eq!(
            text,
            "AAPL last traded at $210.00 (+5.00% since the open). Day range $199.00 - $212.00, volume 52.30M."
        );
    }

    #[test]
    fn test_fundamentals_template_marks_missing_fields() {
        let text = prompts()
            .render(
                names::FUNDAMENTALS,
                json!({"symbol": "MSFT", "name": "Microsoft", "pe_ratio": 35.2, "market_cap": null}),
            )
            .unwrap();
        assert!(text.starts_with("MSFT (Microsoft)"));
        assert!(text.contains("P/E ratio: 35.20"));
        assert!(text.contains("Market cap: n/a"));
    }

    #[test]
    fn test_search_template_empty() {
        let text = prompts()
            .render(names::SEARCH, json!({"query": "zzz", "matches": []}))
            .unwrap();
        assert_eq!(text, "No tickers found for \"zzz\".");
    }

    #[test]
    fn test_system_prompt_lists_tools_and_symbols() {
        let text = prompts()
            .system(
                &["stock_quote".to_string(), "market_news".to_string()],
                &["AAPL".to_string()],
            )
            .unwrap();
        assert!(text.contains("stock_quote, market_news"));
        assert!(text.contains("Tickers mentioned so far: AAPL."));
    }

    #[test]
    fn test_error_message_is_fixed() {
        assert!(prompts().error_message().starts_with("Sorry"));
    }
}
