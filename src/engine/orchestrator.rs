//! `Engine::create_response`: the single entry point for `POST
//! /v1/responses`.

use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::backend::client::Provider;
use crate::error::{GatewayError, Result};
use crate::protocol::{ids, Item, Response, ResponseStatus, StreamEvent};
use crate::store::ResponseStore;
use crate::tools::ToolExecutor;
use crate::writer::ResponseWriter;

use super::agentic::{self, LoopConfig};
use super::request::CreateResponseRequest;
use super::translate::chat_messages_from_items;

/// Static configuration the engine is constructed with, sourced from the
/// `engine.*` config keys.
pub struct EngineConfig {
    pub default_model: Option<String>,
    pub max_agentic_turns: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { default_model: None, max_agentic_turns: 10 }
    }
}

pub struct Engine {
    provider: Arc<dyn Provider>,
    store: Option<Arc<dyn ResponseStore>>,
    executors: Vec<Arc<dyn ToolExecutor>>,
    config: EngineConfig,
}

impl Engine {
    pub fn new(
        provider: Arc<dyn Provider>,
        store: Option<Arc<dyn ResponseStore>>,
        executors: Vec<Arc<dyn ToolExecutor>>,
        config: EngineConfig,
    ) -> Self {
        Self { provider, store, executors, config }
    }

    /// Walks the `previous_response_id` chain to its root via
    /// `GetResponseForChain` (which sees soft-deleted intermediates),
    /// returning ancestors' `output` items in creation order, oldest first
    ///.
    async fn reconstruct_history(&self, tenant_id: Option<&str>, previous_response_id: Option<&str>) -> Result<Vec<Item>> {
        let Some(store) = &self.store else {
            return Ok(Vec::new());
        };
        let Some(mut current_id) = previous_response_id.map(str::to_string) else {
            return Ok(Vec::new());
        };

        let mut chain = Vec::new();
        loop {
            let response = store.get_response_for_chain(tenant_id, &current_id).await?;
            let Some(next) = response.previous_response_id.clone() else {
                chain.push(response);
                break;
            };
            chain.push(response);
            current_id = next;
        }
        chain.reverse();

        Ok(chain.into_iter().flat_map(|response| response.output).collect())
    }

    /// Runs every step of `create_response` that can fail *before* the
    /// writer is touched (request validation, model resolution, history
    /// reconstruction), without touching a writer at all. The HTTP adapter
    /// calls this first so it can choose a JSON error body even for a
    /// `stream: true` request, honoring the two-phase error rule without
    /// needing to peek inside an already-started SSE body.
    pub async fn precheck(&self, tenant_id: Option<&str>, request: &CreateResponseRequest) -> Result<()> {
        request.validate(self.config.default_model.as_deref())?;
        request.resolved_model(self.config.default_model.as_deref())?;
        self.reconstruct_history(tenant_id, request.previous_response_id.as_deref()).await?;
        Ok(())
    }

    /// `CreateResponse(ctx, req, writer)`.
    pub async fn create_response(
        &self,
        tenant_id: Option<&str>,
        request: CreateResponseRequest,
        writer: &mut dyn ResponseWriter,
        cancel: CancellationToken,
    ) -> Result<Option<Response>> {
        request.validate(self.config.default_model.as_deref())?;
        let model = request.resolved_model(self.config.default_model.as_deref())?;

        let history = self.reconstruct_history(tenant_id, request.previous_response_id.as_deref()).await?;
        let mut messages = chat_messages_from_items(&history);
        messages.extend(chat_messages_from_items(&request.input));

        let response_id = ids::generate(ids::RESPONSE_PREFIX);
        let mut response = Response::new(response_id, model.clone(), Utc::now().timestamp());
        response.previous_response_id = request.previous_response_id.clone();
        response.controls = request.controls.clone();
        response.store = request.store;

        let single_shot = self.executors.is_empty() || request.tool_choice_is_none();
        let loop_config = LoopConfig {
            model,
            tools: request.tools.clone(),
            tool_choice: request.tool_choice.clone(),
            allowed_tools: request.allowed_tools.clone(),
            parallel_tool_calls: request.parallel_tool_calls,
            max_turns: request.max_tool_calls.unwrap_or(self.config.max_agentic_turns).min(self.config.max_agentic_turns),
            temperature: request.temperature,
            top_p: request.top_p,
            max_output_tokens: request.max_output_tokens,
            stop: request.stop.clone(),
            frequency_penalty: request.controls.frequency_penalty,
            presence_penalty: request.controls.presence_penalty,
            top_logprobs: request.controls.top_logprobs,
            user: request.controls.user.clone(),
        };

        if request.stream {
            writer
                .write_event(StreamEvent::ResponseCreated { sequence_number: writer.next_sequence_number(), response: response.clone() })
                .await?;
            let _ = response.transition_to(ResponseStatus::InProgress);
            writer
                .write_event(StreamEvent::ResponseInProgress { sequence_number: writer.next_sequence_number(), response: response.clone() })
                .await?;

            let outcome = match agentic::run_streaming(
                self.provider.as_ref(),
                &loop_config,
                &self.executors,
                messages,
                single_shot,
                cancel,
                writer,
            )
            .await
            {
                Ok(outcome) => outcome,
                Err(err) => {
                    let api_error = err.to_api_error();
                    let _ = response.transition_to(ResponseStatus::Failed);
                    writer
                        .write_event(StreamEvent::ResponseFailed {
                            sequence_number: writer.next_sequence_number(),
                            response: response.clone(),
                            error: api_error,
                        })
                        .await?;
                    return Ok(None);
                }
            };

            agentic::apply_outcome(&mut response, outcome);
            self.persist(tenant_id, &response, &history, &request.input).await?;

            let terminal_event = terminal_event_for(&response, writer.next_sequence_number());
            writer.write_event(terminal_event).await?;
            Ok(None)
        } else {
            let outcome = agentic::run_buffered(
                self.provider.as_ref(),
                &loop_config,
                &self.executors,
                messages,
                single_shot,
                cancel,
            )
            .await?;

            agentic::apply_outcome(&mut response, outcome);
            self.persist(tenant_id, &response, &history, &request.input).await?;
            writer.write_response(response.clone()).await?;
            Ok(Some(response))
        }
    }

    async fn persist(&self, tenant_id: Option<&str>, response: &Response, history: &[Item], new_input: &[Item]) -> Result<()> {
        if !response.store {
            return Ok(());
        }
        let Some(store) = &self.store else { return Ok(()) };

        let mut input_items = history.to_vec();
        input_items.extend(new_input.iter().cloned());

        store.save_response(tenant_id, response.clone(), input_items).await
    }
}

fn terminal_event_for(response: &Response, sequence_number: u64) -> StreamEvent {
    match response.status {
        ResponseStatus::Completed => StreamEvent::ResponseCompleted { sequence_number, response: response.clone() },
        ResponseStatus::Incomplete => StreamEvent::ResponseIncomplete { sequence_number, response: response.clone() },
        ResponseStatus::RequiresAction => StreamEvent::ResponseRequiresAction { sequence_number, response: response.clone() },
        ResponseStatus::Cancelled => StreamEvent::ResponseCancelled { sequence_number, response: response.clone() },
        ResponseStatus::Failed => StreamEvent::ResponseFailed {
            sequence_number,
            response: response.clone(),
            error: GatewayError::server_error("response failed").to_api_error(),
        },
        ResponseStatus::Queued | ResponseStatus::InProgress => {
            unreachable!("apply_outcome always transitions to a terminal status")
        }
    }
}
