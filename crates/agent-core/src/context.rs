//! Session context for agents
//!
//! The `Context` carries per-session state across queries: identifiers,
//! language preference, and the symbols the conversation has been about so
//! follow-up questions ("and its P/E?") can be resolved without repeating them.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Well-known context keys
pub mod keys {
    /// Language preference (e.g., "en", "zh")
    pub const LANGUAGE: &str = "language";
    /// User ID for personalization
    pub const USER_ID: &str = "user_id";
    /// Session ID for tracking
    pub const SESSION_ID: &str = "session_id";
    /// Symbols mentioned in earlier turns, most recent first
    pub const RECENT_SYMBOLS: &str = "recent_symbols";
}

/// Maximum number of remembered symbols
const MAX_RECENT_SYMBOLS: usize = 8;

/// Context passed to agents during execution
///
/// # Example
///
/// ```
/// use agent_core::Context;
///
/// let mut ctx = Context::new().with_session_id("session-123");
/// ctx.remember_symbols(&["AAPL".to_string()]);
///
/// assert_eq!(ctx.session_id(), Some("session-123"));
/// assert_eq!(ctx.recent_symbols(), vec!["AAPL".to_string()]);
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Context {
    data: HashMap<String, serde_json::Value>,
}

impl Context {
    /// Create a new empty context
    pub fn new() -> Self {
        Self::default()
    }

    // =========== Builder Methods ===========

    /// Set the session ID
    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.insert(keys::SESSION_ID, serde_json::json!(session_id.into()));
        self
    }

    /// Set the user ID
    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.insert(keys::USER_ID, serde_json::json!(user_id.into()));
        self
    }

    /// Set the language preference
    pub fn with_language(mut self, lang: impl Into<String>) -> Self {
        self.insert(keys::LANGUAGE, serde_json::json!(lang.into()));
        self
    }

    // =========== Common Accessors ===========

    /// Get the session ID
    pub fn session_id(&self) -> Option<&str> {
        self.get(keys::SESSION_ID).and_then(|v| v.as_str())
    }

    /// Get the user ID
    pub fn user_id(&self) -> Option<&str> {
        self.get(keys::USER_ID).and_then(|v| v.as_str())
    }

    /// Get the language preference
    pub fn language(&self) -> Option<&str> {
        self.get(keys::LANGUAGE).and_then(|v| v.as_str())
    }

    /// Symbols from earlier turns, most recent first
    pub fn recent_symbols(&self) -> Vec<String> {
        self.get(keys::RECENT_SYMBOLS)
            .and_then(|v| v.as_array())
            .map(|items| {
                items
                    .iter()
                    .filter_map(|s| s.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Record symbols mentioned in the current turn
    ///
    /// New symbols move to the front; the list is capped.
    pub fn remember_symbols(&mut self, symbols: &[String]) {
        if symbols.is_empty() {
            return;
        }
        let mut merged: Vec<String> = symbols.to_vec();
        for existing in self.recent_symbols() {
            if !merged.contains(&existing) {
                merged.push(existing);
            }
        }
        merged.truncate(MAX_RECENT_SYMBOLS);
        self.insert(keys::RECENT_SYMBOLS, serde_json::json!(merged));
    }

    // =========== Generic Key-Value Operations ===========

    /// Insert a value into the context
    pub fn insert(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.data.insert(key.into(), value);
    }

    /// Get a value from the context
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.data.get(key)
    }

    /// Remove a value from the context
    pub fn remove(&mut self, key: &str) -> Option<serde_json::Value> {
        self.data.remove(key)
    }

    /// Check if the context is empty
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
