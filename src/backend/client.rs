//! The `Provider` collaborator contract plus `HttpProvider`,
//! a shared client for any OpenAI-compatible Chat Completions endpoint —
//! vLLM, LiteLLM, and similar are configured instances of this one client,
//! distinguished only by `base_url`.

use std::pin::Pin;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde_json::Value;

use crate::error::{GatewayError, Result};
use crate::protocol::Item;
use crate::tools::ToolDefinition;
use crate::usage::Usage;

use super::sse::{self, ChunkAggregator, ChunkEvent};
use super::wire::{ChatCompletionRequest, ChatCompletionResponse, ChatMessage, ModelsListResponse};

/// Provider-agnostic request the engine hands to a [`Provider`] after
/// translating the OpenResponses conversation history.
#[derive(Debug, Clone)]
pub struct ProviderRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub tools: Vec<ToolDefinition>,
    pub tool_choice: Option<Value>,
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
    pub max_tokens: Option<u32>,
    pub frequency_penalty: Option<f64>,
    pub presence_penalty: Option<f64>,
    pub top_logprobs: Option<u32>,
    pub response_format: Option<Value>,
    pub stop: Option<Vec<String>>,
    pub user: Option<String>,
}

impl ProviderRequest {
    fn into_wire(self, stream: bool) -> ChatCompletionRequest {
        let tools = if self.tools.is_empty() {
            None
        } else {
            Some(self.tools.iter().map(ToolDefinition::to_provider_json).collect())
        };

        ChatCompletionRequest {
            model: self.model,
            messages: self.messages,
            tools,
            tool_choice: self.tool_choice,
            temperature: self.temperature,
            top_p: self.top_p,
            max_tokens: self.max_tokens,
            frequency_penalty: self.frequency_penalty,
            presence_penalty: self.presence_penalty,
            top_logprobs: self.top_logprobs,
            response_format: self.response_format,
            stop: self.stop,
            user: self.user,
            stream,
        }
    }
}

/// One backend call's worth of output, assembled from either a buffered
/// response or a fully-drained stream.
#[derive(Debug, Clone)]
pub struct ProviderResponse {
    pub items: Vec<Item>,
    pub usage: Usage,
    pub finish_reason: Option<String>,
}

/// Incremental event surfaced while streaming a turn. `Done` always arrives
/// last and carries the same assembled shape `Provider::complete` returns.
#[derive(Debug, Clone)]
pub enum ProviderEvent {
    TextDelta(String),
    ToolCallDelta {
        index: u32,
        id: Option<String>,
        name: Option<String>,
        arguments_delta: Option<String>,
    },
    Done(ProviderResponse),
}

/// A model available on the backend, as surfaced by `list_models`.
#[derive(Debug, Clone)]
pub struct ModelInfo {
    pub id: String,
}

pub type EventStream = Pin<Box<dyn Stream<Item = Result<ProviderEvent>> + Send>>;

/// Backend contract. Only [`HttpProvider`] is bundled; any
/// other backend (a batching provider, an in-process test double) implements
/// this trait directly.
#[async_trait]
pub trait Provider: Send + Sync {
    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse>;
    async fn stream(&self, request: ProviderRequest) -> Result<EventStream>;
    async fn list_models(&self) -> Result<Vec<ModelInfo>>;
    async fn close(&self);
}

/// Talks to an OpenAI-compatible `/chat/completions` + `/models` surface
/// over HTTP, generalized to not assume any particular deployment.
pub struct HttpProvider {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpProvider {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key,
        }
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    /// Maps a non-2xx backend response to the gateway's error taxonomy:
    /// 429 passes through as `too_many_requests`, everything else as
    /// `model_error` — backend failures are never `invalid_request`, since
    /// the gateway already validated the request.
    async fn raise_for_status(response: reqwest::Response) -> Result<reqwest::Response> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let message = format!("backend returned {status}: {body}");
        if status.as_u16() == 429 {
            Err(GatewayError::too_many_requests(message))
        } else {
            Err(GatewayError::model_error(message))
        }
    }
}

#[async_trait]
impl Provider for HttpProvider {
    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse> {
        let wire = request.into_wire(false);
        let url = format!("{}/chat/completions", self.base_url);
        let response = self.authorize(self.http.post(url).json(&wire)).send().await?;
        let response = Self::raise_for_status(response).await?;

        let body: ChatCompletionResponse = response.json().await?;
        let (items, usage, finish_reason) = sse::items_from_completion(&body);
        Ok(ProviderResponse { items, usage, finish_reason })
    }

    async fn stream(&self, request: ProviderRequest) -> Result<EventStream> {
        let wire = request.into_wire(true);
        let url = format!("{}/chat/completions", self.base_url);
        let response = self.authorize(self.http.post(url).json(&wire)).send().await?;
        let response = Self::raise_for_status(response).await?;

        let chunk_stream = sse::parse_chunk_stream(response.bytes_stream());

        // `scan` carries the mutable aggregator across chunks, `flat_map`
        // turns each chunk's zero-or-more deltas (plus a trailing `Done` on
        // the chunk bearing `finish_reason`) into individual stream items.
        let stream = chunk_stream.scan(ChunkAggregator::new(), |aggregator, chunk_result| {
            let events: Vec<Result<ProviderEvent>> = match chunk_result {
                Ok(chunk) => {
                    let (deltas, finish_reason) = aggregator.ingest(chunk);
                    let mut out: Vec<Result<ProviderEvent>> = deltas
                        .into_iter()
                        .map(|delta| {
                            Ok(match delta {
                                ChunkEvent::TextDelta(text) => ProviderEvent::TextDelta(text),
                                ChunkEvent::ToolCallDelta { index, id, name, arguments_delta } => {
                                    ProviderEvent::ToolCallDelta { index, id, name, arguments_delta }
                                }
                            })
                        })
                        .collect();

                    if let Some(finish_reason) = finish_reason {
                        let usage = aggregator.usage();
                        let items = std::mem::take(aggregator).into_items();
                        out.push(Ok(ProviderEvent::Done(ProviderResponse {
                            items,
                            usage,
                            finish_reason: Some(finish_reason),
                        })));
                    }
                    out
                }
                Err(e) => vec![Err(e)],
            };
            futures::future::ready(Some(events))
        });

        let flattened = stream.flat_map(futures::stream::iter);

        Ok(Box::pin(flattened))
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let url = format!("{}/models", self.base_url);
        let response = self.authorize(self.http.get(url)).send().await?;
        let response = Self::raise_for_status(response).await?;
        let body: ModelsListResponse = response.json().await?;
        Ok(body.data.into_iter().map(|m| ModelInfo { id: m.id }).collect())
    }

    /// `reqwest::Client` needs no explicit teardown; kept as an async no-op
    /// so callers can treat every `Provider` uniformly regardless of whether
    /// a given implementation holds a connection pool worth draining.
    async fn close(&self) {}
}
