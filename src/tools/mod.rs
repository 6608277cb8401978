//! Tool executor interface and server-side function registry.

pub mod executor;
pub mod registry;

pub use executor::{ToolCall, ToolDefinition, ToolExecutor, ToolKind, ToolResult};
pub use registry::{FunctionHandler, FunctionProvider, FunctionRegistry, FunctionTool};
