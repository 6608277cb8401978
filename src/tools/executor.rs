//! `ToolExecutor`: the capability-keyed interface the agentic loop dispatches
//! through.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

/// Executor-facing call: what the backend asked for.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    /// JSON-encoded arguments, as emitted by the backend.
    pub arguments: String,
}

/// Executor-facing result: what gets fed back into the next turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub call_id: String,
    pub output: String,
    pub is_error: bool,
}

impl ToolResult {
    pub fn ok(call_id: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            output: output.into(),
            is_error: false,
        }
    }

    pub fn error(call_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            output: message.into(),
            is_error: true,
        }
    }
}

/// A tool definition as surfaced to the backend's function-calling schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

impl ToolDefinition {
    /// Renders as the Chat Completions `{"type":"function","function":{...}}`
    /// wire shape the backend client forwards in `ProviderRequest.tools`.
    pub fn to_provider_json(&self) -> Value {
        serde_json::json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.parameters,
            }
        })
    }
}

/// Which side executes calls to a given tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolKind {
    /// Returned to the client as `requires_action`; the gateway never runs it.
    Function,
    /// Executed server-side through the [`crate::tools::registry::FunctionRegistry`].
    Builtin,
    /// Executed server-side via a Model Context Protocol bridge.
    Mcp,
    /// Executed server-side inside an isolated sandbox (e.g. code interpreter).
    Sandbox,
}

/// Pluggable executor the agentic loop dispatches tool calls through.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    fn kind(&self) -> ToolKind;

    /// Whether this executor handles `tool_def` — the loop picks the first
    /// registered executor for which this returns `true`.
    fn can_execute(&self, tool_def: &ToolDefinition) -> bool;

    async fn execute(&self, call: ToolCall) -> Result<ToolResult>;
}
