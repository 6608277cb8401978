//! # Antwort Gateway
//!
//! A standalone HTTP gateway exposing the OpenResponses API: a superset of
//! OpenAI's Responses API that adds an agentic tool-calling loop on top of
//! any OpenAI-compatible Chat Completions backend.
//!
//! ## Architecture
//!
//! - **protocol**: wire-level entities (`Item`, `Response`, `StreamEvent`)
//!   and the ID schemes that name them.
//! - **engine**: translation between the Responses protocol and Chat
//!   Completions, conversation reconstruction via `previous_response_id`,
//!   and the agentic tool-calling loop.
//! - **backend**: the Chat Completions provider adapter (HTTP client, SSE
//!   decoding, chunk aggregation).
//! - **tools**: the `ToolExecutor` contract and the in-process function
//!   registry.
//! - **store**: the `ResponseStore` persistence contract.
//! - **auth**: the `Authenticator` identity contract.
//! - **middleware**: the recovery / request-id / logging layer stack
//!   wrapped around every HTTP request.
//! - **http**: the axum router and route handlers.
//! - **config**: YAML + environment configuration loading.
//! - **writer**: the `ResponseWriter` abstraction over SSE and buffered
//!   (non-streaming) output.
//! - **registry**: the in-flight cancellation registry backing `DELETE`.
//! - **error**: the closed error taxonomy shared by every layer.
//! - **retry**: exponential backoff, generalized to the gateway's
//!   retry-once-if-unsent-bytes policy for buffered requests.

pub mod auth;
pub mod backend;
pub mod config;
pub mod engine;
pub mod error;
pub mod http;
pub mod middleware;
pub mod protocol;
pub mod registry;
pub mod retry;
pub mod store;
pub mod tools;
pub mod usage;
pub mod writer;

pub use auth::{AuthDecision, Authenticator, Identity};
pub use engine::{CreateResponseRequest, Engine, EngineConfig};
pub use error::{ErrorKind, GatewayError, Result};
pub use protocol::{ContentPart, Item, ItemStatus, Response, ResponseStatus, Role, StreamEvent};
pub use registry::InFlightRegistry;
pub use store::{InMemoryResponseStore, ListResponsesOptions, Page, ResponseStore};
pub use tools::{FunctionRegistry, ToolDefinition, ToolExecutor};
pub use writer::{BufferedWriter, ResponseWriter, SseWriter};
