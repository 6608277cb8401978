//! The engine: translation between the Responses protocol and Chat
//! Completions, conversation reconstruction, and the agentic loop.

pub mod agentic;
pub mod orchestrator;
pub mod request;
pub mod translate;

pub use orchestrator::{Engine, EngineConfig};
pub use request::CreateResponseRequest;
