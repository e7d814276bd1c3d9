//! Tool-related message types for MCP tool discovery and invocation.
//!
//! Tools are invoked as JSON-RPC methods named by the tool name: any method
//! the router does not recognize falls through to the tool registry. The
//! handler result travels back wrapped as `{"value": ...}`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Tool definition: a name, an optional description, and the JSON Schema its
/// parameters must satisfy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tool {
    /// Unique name of the tool; doubles as the JSON-RPC method name
    pub name: String,

    /// Human-readable description of what the tool does
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// JSON Schema for the tool's input parameters; must be an object schema
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

impl Tool {
    /// Create a tool definition.
    pub fn new(name: impl Into<String>, input_schema: Value) -> Self {
        Self {
            name: name.into(),
            description: None,
            input_schema,
        }
    }

    /// Attach a description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Result of `tools/list`: the currently registered tool names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListToolsResponse {
    /// Names of the registered tools
    pub tools: Vec<String>,
}

/// Wrapper around a tool handler's return value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocationResult {
    /// Whatever the handler produced
    pub value: Value,
}
