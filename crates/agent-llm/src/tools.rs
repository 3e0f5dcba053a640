//! Tool definition types for LLM tool use

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A capability as advertised to the model
///
/// `input_schema` is a JSON Schema object describing the arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Capability name (must match the registered name)
    pub name: String,

    /// Description the model uses to decide when to call it
    pub description: String,

    /// JSON schema for the arguments
    pub input_schema: Value,
}

impl ToolDefinition {
    /// Create a new tool definition
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
        }
    }
}

/// Helpers to build JSON schemas for capability arguments
pub mod schema {
    use serde_json::{Value, json};

    /// Object schema with the given properties
    ///
    /// # Example
    ///
    /// ```
    /// use agent_llm::tools::schema;
    /// use serde_json::json;
    ///
    /// let schema = schema::object(
    ///     json!({ "symbol": schema::string("Ticker symbol") }),
    ///     &["symbol"],
    /// );
    /// assert_eq!(schema["required"][0], "symbol");
    /// ```
    pub fn object(properties: Value, required: &[&str]) -> Value {
        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }

    /// String property
    pub fn string(description: &str) -> Value {
        json!({
            "type": "string",
            "description": description,
        })
    }

    /// String property restricted to a fixed set of values
    pub fn string_enum(description: &str, values: &[&str]) -> Value {
        json!({
            "type": "string",
            "description": description,
            "enum": values,
        })
    }

    /// Integer property
    pub fn integer(description: &str) -> Value {
        json!({
            "type": "integer",
            "description": description,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tool_definition_creation() {
        let schema = schema::object(
            json!({
                "query": schema::string("Company name or ticker"),
                "limit": schema::integer("Maximum results"),
            }),
            &["query"],
        );

        let tool = ToolDefinition::new("symbol_search", "Find ticker symbols", schema.clone());
        assert_eq!(tool.name, "symbol_search");
        assert_eq!(tool.input_schema, schema);
        assert_eq!(tool.input_schema["properties"]["limit"]["type"], "integer");
    }

    #[test]
    fn test_enum_schema() {
        let s = schema::string_enum("Statement period", &["annual", "quarterly"]);
        assert_eq!(s["enum"][1], "quarterly");
    }
}
