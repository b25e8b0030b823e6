//! Tool schema and tool-call types

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A tool advertised to the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Always `"function"`
    #[serde(rename = "type")]
    pub kind: String,

    /// Function signature
    pub function: FunctionDefinition,
}

/// Name, description and JSON-schema parameters of a callable function
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDefinition {
    /// Function name the model must use
    pub name: String,

    /// Human readable description
    pub description: String,

    /// JSON schema of the arguments object
    pub parameters: Value,
}

impl ToolDefinition {
    /// Describe a function tool
    pub fn function(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: Value,
    ) -> Self {
        Self {
            kind: "function".to_string(),
            function: FunctionDefinition {
                name: name.into(),
                description: description.into(),
                parameters,
            },
        }
    }
}

/// A tool invocation requested by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Call id, echoed back in the tool result message
    pub id: String,

    /// Always `"function"`
    #[serde(rename = "type", default = "function_kind")]
    pub kind: String,

    /// Function name and raw arguments
    pub function: FunctionCall,
}

/// Function name plus its arguments as a JSON string
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    /// Requested function
    pub name: String,

    /// JSON-encoded arguments object
    #[serde(default)]
    pub arguments: String,
}

fn function_kind() -> String {
    "function".to_string()
}

impl ToolCall {
    /// Build a function call
    pub fn function(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            kind: function_kind(),
            function: FunctionCall {
                name: name.into(),
                arguments: arguments.into(),
            },
        }
    }
}
