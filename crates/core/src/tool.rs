//! Tool trait: the abstraction over agent capabilities.
//!
//! Tools are resolved by exact name from a table that is filled once at
//! startup and never mutated afterwards. A tool call can never fail the
//! agent loop: every outcome, including an unknown name, becomes a
//! [`ToolResult`] that is fed back to the model.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use crate::error::ToolError;
use crate::provider::ToolDefinition;

/// A request to execute a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique call ID (matches the model's tool_call.id)
    pub id: String,

    /// Name of the tool to execute
    pub name: String,

    /// Arguments as a JSON value
    pub arguments: serde_json::Value,
}

/// The outcome of a tool execution, always correlated 1:1 to a [`ToolCall`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResult {
    /// The call ID this result is for
    pub call_id: String,

    /// Text handed back to the model
    pub output: String,

    /// Structured form of the output, when the tool produced JSON
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,

    /// Whether the call failed
    pub is_error: bool,
}

impl ToolResult {
    pub fn success(call_id: impl Into<String>, value: serde_json::Value) -> Self {
        let output = match &value {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        Self {
            call_id: call_id.into(),
            output,
            data: Some(value),
            is_error: false,
        }
    }

    pub fn failure(call_id: impl Into<String>, error: &ToolError) -> Self {
        Self {
            call_id: call_id.into(),
            output: format!("Error: {error}"),
            data: None,
            is_error: true,
        }
    }
}

/// The core Tool trait.
///
/// Each handler performs exactly one domain operation. Arguments come from
/// the model and must be treated as untrusted.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "list_items").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the model).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Execute the tool with the given arguments.
    async fn execute(&self, arguments: serde_json::Value) -> Result<serde_json::Value, ToolError>;

    /// Convert this tool into a ToolDefinition for sending to the model.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// A closed table of available tools.
///
/// Filled once at startup through [`ToolRegistry::register`], then shared
/// behind an `Arc` and only read.
pub struct ToolRegistry {
    tools: BTreeMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: BTreeMap::new(),
        }
    }

    /// Register a tool, validating its name and parameter schema.
    pub fn register(&mut self, tool: Box<dyn Tool>) -> Result<(), ToolError> {
        let name = tool.name().to_string();
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(ToolError::InvalidRegistration(format!(
                "tool name '{name}' must be non-empty snake_case"
            )));
        }
        if self.tools.contains_key(&name) {
            return Err(ToolError::InvalidRegistration(format!(
                "tool '{name}' registered twice"
            )));
        }
        let schema = tool.parameters_schema();
        if schema.get("type").and_then(|t| t.as_str()) != Some("object") {
            return Err(ToolError::InvalidRegistration(format!(
                "tool '{name}' schema must be a JSON object schema"
            )));
        }
        if let Some(required) = schema.get("required") {
            let all_strings = required
                .as_array()
                .is_some_and(|keys| keys.iter().all(|k| k.is_string()));
            if !all_strings {
                return Err(ToolError::InvalidRegistration(format!(
                    "tool '{name}' schema 'required' must be an array of strings"
                )));
            }
        }
        self.tools.insert(name, tool);
        Ok(())
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    /// Get all tool definitions (for sending to the model), sorted by name.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|t| t.to_definition()).collect()
    }

    /// Execute a tool call. Every failure is folded into the returned result.
    pub async fn execute(&self, call: &ToolCall) -> ToolResult {
        let Some(tool) = self.tools.get(&call.name) else {
            return ToolResult::failure(&call.id, &ToolError::NotFound(call.name.clone()));
        };

        if let Err(e) = check_required(&tool.parameters_schema(), &call.arguments) {
            return ToolResult::failure(&call.id, &e);
        }

        match tool.execute(call.arguments.clone()).await {
            Ok(value) => ToolResult::success(&call.id, value),
            Err(e) => {
                debug!(tool = %call.name, error = %e, "Tool returned an error");
                ToolResult::failure(&call.id, &e)
            }
        }
    }

    /// List all registered tool names.
    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Reject arguments that are not an object or miss a `required` key.
fn check_required(schema: &serde_json::Value, arguments: &serde_json::Value) -> Result<(), ToolError> {
    let Some(args) = arguments.as_object() else {
        return Err(ToolError::InvalidArguments(
            "arguments must be a JSON object".into(),
        ));
    };
    let required = schema
        .get("required")
        .and_then(|r| r.as_array())
        .map(|r| r.iter().filter_map(|k| k.as_str()).collect::<Vec<_>>())
        .unwrap_or_default();
    for key in required {
        if args.get(key).is_none_or(|v| v.is_null()) {
            return Err(ToolError::InvalidArguments(format!(
                "missing required argument '{key}'"
            )));
        }
    }
    Ok(())
}
