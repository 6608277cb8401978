//! Backend client: translates the engine's provider-agnostic requests to and
//! from the Chat Completions wire format over HTTP.

pub mod client;
pub mod sse;
pub mod wire;

pub use client::{EventStream, HttpProvider, ModelInfo, Provider, ProviderEvent, ProviderRequest, ProviderResponse};
