//! `FunctionRegistry`: a [`ToolExecutor`] aggregating pluggable
//! [`FunctionProvider`]s, generalizing the single-callable
//! `Tool` of a simpler SDK into a named group of callables with shared setup.

use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures::FutureExt;
use serde_json::Value;

use crate::error::{GatewayError, Result};

use super::executor::{ToolCall, ToolDefinition, ToolExecutor, ToolKind, ToolResult};

/// Handler anatomy mirrors a simpler SDK's `ToolHandler`: `Arc` for cheap
/// sharing across concurrently-dispatched calls, `Pin<Box<dyn Future>>` for
/// type erasure across distinct closures, `Send + Sync` so the registry
/// itself stays `Send + Sync`.
pub type FunctionHandler =
    Arc<dyn Fn(Value) -> Pin<Box<dyn Future<Output = Result<Value>> + Send>> + Send + Sync>;

#[derive(Clone)]
pub struct FunctionTool {
    pub definition: ToolDefinition,
    handler: FunctionHandler,
}

impl FunctionTool {
    pub fn new<F, Fut>(name: impl Into<String>, description: impl Into<String>, parameters: Value, handler: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        Self {
            definition: ToolDefinition {
                name: name.into(),
                description: description.into(),
                parameters,
            },
            handler: Arc::new(move |args| Box::pin(handler(args))),
        }
    }

    pub async fn call(&self, arguments: Value) -> Result<Value> {
        (self.handler)(arguments).await
    }
}

/// A pluggable contributor to a [`FunctionRegistry`]. A provider groups a
/// set of related tools under one name — e.g. a "web" provider might
/// contribute both `web_search` and `fetch_url`.
pub trait FunctionProvider: Send + Sync {
    fn name(&self) -> &str;
    fn tools(&self) -> Vec<FunctionTool>;
}

/// Aggregates providers into a single [`ToolExecutor`]. Resolution is
/// first-provider-wins on name conflict, decided once at construction time
/// and logged, never re-resolved per request.
pub struct FunctionRegistry {
    resolved: HashMap<String, FunctionTool>,
}

impl FunctionRegistry {
    pub fn new(providers: Vec<Arc<dyn FunctionProvider>>) -> Self {
        let mut resolved = HashMap::new();
        for provider in &providers {
            for tool in provider.tools() {
                let name = tool.definition.name.clone();
                if resolved.contains_key(&name) {
                    tracing::warn!(
                        tool = %name,
                        provider = provider.name(),
                        "tool name conflict at startup, first provider wins"
                    );
                    continue;
                }
                resolved.insert(name, tool);
            }
        }
        Self { resolved }
    }

    pub fn is_empty(&self) -> bool {
        self.resolved.is_empty()
    }

    pub fn tool_definitions(&self) -> Vec<ToolDefinition> {
        self.resolved.values().map(|t| t.definition.clone()).collect()
    }
}

#[async_trait]
impl ToolExecutor for FunctionRegistry {
    fn kind(&self) -> ToolKind {
        ToolKind::Builtin
    }

    fn can_execute(&self, tool_def: &ToolDefinition) -> bool {
        self.resolved.contains_key(&tool_def.name)
    }

    async fn execute(&self, call: ToolCall) -> Result<ToolResult> {
        let Some(tool) = self.resolved.get(&call.name) else {
            return Ok(ToolResult::error(call.id.clone(), format!("no executor registered for tool '{}'", call.name)));
        };

        let arguments: Value = serde_json::from_str(&call.arguments)
            .map_err(|e| GatewayError::invalid_request(format!("malformed tool arguments: {e}")))?;

        let start = Instant::now();
        let outcome = AssertUnwindSafe(tool.call(arguments)).catch_unwind().await;
        let elapsed = start.elapsed();

        let result = match outcome {
            Ok(Ok(value)) => {
                tracing::debug!(tool = %call.name, duration_ms = elapsed.as_millis(), "tool call succeeded");
                ToolResult::ok(call.id, value.to_string())
            }
            Ok(Err(err)) => {
                tracing::warn!(tool = %call.name, duration_ms = elapsed.as_millis(), error = %err, "tool call failed");
                ToolResult::error(call.id, err.to_string())
            }
            Err(_) => {
                tracing::error!(tool = %call.name, duration_ms = elapsed.as_millis(), "tool call panicked");
                ToolResult::error(call.id, format!("tool '{}' panicked", call.name))
            }
        };

        Ok(result)
    }
}
