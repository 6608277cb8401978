//! The agentic loop: the multi-turn inference/tool-dispatch scheduler the
//! engine runs once tools are present.
//!
//! `run_buffered` and `run_streaming` share the classify/filter/dispatch
//! helpers below but differ in how they consume backend output, matching
//! the split between buffered completion and streaming request handling.

use std::collections::HashMap;
use std::sync::Arc;

use futures::StreamExt;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::backend::client::{Provider, ProviderEvent, ProviderRequest};
use crate::backend::wire::ChatMessage;
use crate::error::Result;
use crate::protocol::{ids, ContentPart, Item, ItemStatus, Response, ResponseStatus, Role, StreamEvent};
use crate::retry::retry_once_buffered;
use crate::tools::{ToolCall, ToolDefinition, ToolExecutor, ToolKind, ToolResult};
use crate::usage::Usage;
use crate::writer::ResponseWriter;

use super::translate::{chat_messages_from_items, translate_tool_choice};

/// Per-request knobs the loop needs beyond the backend request body itself.
pub struct LoopConfig {
    pub model: String,
    pub tools: Vec<ToolDefinition>,
    pub tool_choice: Option<Value>,
    pub allowed_tools: Option<Vec<String>>,
    pub parallel_tool_calls: bool,
    pub max_turns: u32,
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
    pub max_output_tokens: Option<u32>,
    pub stop: Option<Vec<String>>,
    pub frequency_penalty: Option<f64>,
    pub presence_penalty: Option<f64>,
    pub top_logprobs: Option<u32>,
    pub user: Option<String>,
}

pub struct LoopOutcome {
    pub output: Vec<Item>,
    pub usage: Usage,
    pub status: ResponseStatus,
    pub incomplete_reason: Option<String>,
}

fn build_request(config: &LoopConfig, messages: Vec<ChatMessage>, turn: u32) -> ProviderRequest {
    // Forced tool_choice only binds the first turn; forcing it on every turn
    // would make the loop never stop.
    let tool_choice = if turn == 0 { config.tool_choice.as_ref().map(translate_tool_choice) } else { None };
    ProviderRequest {
        model: config.model.clone(),
        messages,
        tools: config.tools.clone(),
        tool_choice,
        temperature: config.temperature,
        top_p: config.top_p,
        max_tokens: config.max_output_tokens,
        frequency_penalty: config.frequency_penalty,
        presence_penalty: config.presence_penalty,
        top_logprobs: config.top_logprobs,
        response_format: None,
        stop: config.stop.clone(),
        user: config.user.clone(),
    }
}

/// Partitions the function_call items a turn produced into server-executed
/// (a registered executor of non-`Function` kind handles it) and
/// client-executed (a `Function`-kind executor matches, or none does at
/// all).
pub fn classify_tool_calls(
    calls: &[Item],
    executors: &[Arc<dyn ToolExecutor>],
    tool_defs: &HashMap<String, ToolDefinition>,
) -> (Vec<(Item, Arc<dyn ToolExecutor>)>, Vec<Item>) {
    let mut server = Vec::new();
    let mut client = Vec::new();

    for call in calls {
        let Item::FunctionCall { name, .. } = call else { continue };
        let executor = tool_defs
            .get(name)
            .and_then(|def| executors.iter().find(|executor| executor.can_execute(def)));

        match executor {
            Some(executor) if executor.kind() != ToolKind::Function => server.push((call.clone(), executor.clone())),
            _ => client.push(call.clone()),
        }
    }

    (server, client)
}

/// Removes any server-executed call whose tool name is absent from
/// `allowed_tools`, replacing it with a synthetic error output instead of
/// dispatching it.
pub fn apply_allowed_tools_filter(
    server_calls: Vec<(Item, Arc<dyn ToolExecutor>)>,
    allowed_tools: Option<&[String]>,
) -> (Vec<(Item, Arc<dyn ToolExecutor>)>, Vec<Item>) {
    let Some(allowed) = allowed_tools else {
        return (server_calls, Vec::new());
    };

    let mut kept = Vec::new();
    let mut synthetic = Vec::new();

    for (call, executor) in server_calls {
        let Item::FunctionCall { name, call_id, .. } = &call else { continue };
        if allowed.iter().any(|a| a == name) {
            kept.push((call, executor));
        } else {
            synthetic.push(Item::new_function_call_output(call_id.clone(), "tool not allowed", true));
        }
    }

    (kept, synthetic)
}

async fn dispatch_one(call: Item, executor: Arc<dyn ToolExecutor>, cancel: CancellationToken) -> Item {
    let Item::FunctionCall { call_id, name, arguments, .. } = &call else {
        unreachable!("dispatch_one only receives function_call items")
    };
    let tool_call = ToolCall { id: call_id.clone(), name: name.clone(), arguments: arguments.clone() };
    let call_id = call_id.clone();

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Item::new_function_call_output(call_id, "cancelled", true),
        result = executor.execute(tool_call) => {
            let result = result.unwrap_or_else(|err| ToolResult::error(call_id, err.to_string()));
            Item::new_function_call_output(result.call_id, result.output, result.is_error)
        }
    }
}

/// Dispatches server-executed calls concurrently unless
/// `parallel_tool_calls` is false. Results are
/// reordered afterward to match the order `function_calls` were emitted in,
/// regardless of completion order.
pub async fn dispatch_tool_calls(
    calls: Vec<(Item, Arc<dyn ToolExecutor>)>,
    parallel: bool,
    cancel: &CancellationToken,
) -> Vec<Item> {
    if parallel {
        let futures = calls.into_iter().map(|(call, executor)| dispatch_one(call, executor, cancel.clone()));
        futures::future::join_all(futures).await
    } else {
        let mut outputs = Vec::with_capacity(calls.len());
        for (call, executor) in calls {
            outputs.push(dispatch_one(call, executor, cancel.clone()).await);
            if cancel.is_cancelled() {
                break;
            }
        }
        outputs
    }
}

fn order_by_emission(mut results: Vec<Item>, emitted: &[Item]) -> Vec<Item> {
    results.sort_by_key(|item| emitted.iter().position(|call| call.call_id() == item.call_id()).unwrap_or(usize::MAX));
    results
}

fn tool_defs_by_name(tools: &[ToolDefinition]) -> HashMap<String, ToolDefinition> {
    tools.iter().map(|t| (t.name.clone(), t.clone())).collect()
}

/// Runs the loop against `Provider::complete`.
/// `single_shot` disables dispatch entirely — set when `tool_choice == "none"`
/// or when no executors are configured at all, collapsing to a plain
/// one-shot completion for backwards compatibility with callers that never
/// register tools.
pub async fn run_buffered(
    provider: &dyn Provider,
    config: &LoopConfig,
    executors: &[Arc<dyn ToolExecutor>],
    mut messages: Vec<ChatMessage>,
    single_shot: bool,
    cancel: CancellationToken,
) -> Result<LoopOutcome> {
    let tool_defs = tool_defs_by_name(&config.tools);
    let mut output = Vec::new();
    let mut usage = Usage::default();
    let max_turns = config.max_turns.max(1);

    for turn in 0..max_turns {
        if cancel.is_cancelled() {
            return Ok(cancelled(output, usage));
        }

        let request = build_request(config, messages.clone(), turn);
        let turn_response = retry_once_buffered(|| provider.complete(request.clone())).await?;
        usage += turn_response.usage;

        let turn_items = turn_response.items;
        output.extend(turn_items.iter().cloned());
        messages.extend(chat_messages_from_items(&turn_items));

        let function_calls: Vec<Item> = turn_items.into_iter().filter(|item| matches!(item, Item::FunctionCall { .. })).collect();

        if function_calls.is_empty() || single_shot {
            return Ok(LoopOutcome { output, usage, status: ResponseStatus::Completed, incomplete_reason: None });
        }

        let (server_calls, client_calls) = classify_tool_calls(&function_calls, executors, &tool_defs);
        if !client_calls.is_empty() {
            return Ok(LoopOutcome { output, usage, status: ResponseStatus::RequiresAction, incomplete_reason: None });
        }

        let (server_calls, mut tool_outputs) = apply_allowed_tools_filter(server_calls, config.allowed_tools.as_deref());
        tool_outputs.extend(dispatch_tool_calls(server_calls, config.parallel_tool_calls, &cancel).await);
        let tool_outputs = order_by_emission(tool_outputs, &function_calls);

        output.extend(tool_outputs.iter().cloned());
        messages.extend(chat_messages_from_items(&tool_outputs));
    }

    Ok(LoopOutcome {
        output,
        usage,
        status: ResponseStatus::Incomplete,
        incomplete_reason: Some(format!("agentic turn budget of {max_turns} exhausted")),
    })
}

fn cancelled(output: Vec<Item>, usage: Usage) -> LoopOutcome {
    LoopOutcome { output, usage, status: ResponseStatus::Cancelled, incomplete_reason: None }
}

/// Overwrites the fresh ids `ChunkAggregator::into_items` assigned with the
/// ids pre-announced via `output_item.added` while deltas were streaming, so
/// the `*.done` events close out the same item the client already saw
/// opened. `tool_item_ids` is keyed by the backend's tool-call index, which
/// is exactly the order `into_items` appends `FunctionCall` items in.
fn apply_pre_assigned_ids(items: Vec<Item>, text_item_id: Option<&str>, tool_item_ids: &[String]) -> Vec<Item> {
    let mut tool_ids = tool_item_ids.iter();
    items
        .into_iter()
        .map(|item| match item {
            Item::Message { role, status, content, .. } => Item::Message {
                id: text_item_id.map(str::to_string).unwrap_or_else(|| ids::generate(ids::MESSAGE_PREFIX)),
                role,
                status,
                content,
            },
            Item::FunctionCall { call_id, name, arguments, status, .. } => Item::FunctionCall {
                id: tool_ids.next().cloned().unwrap_or_else(|| ids::generate(ids::FUNCTION_CALL_PREFIX)),
                call_id,
                name,
                arguments,
                status,
            },
            other => other,
        })
        .collect()
}

/// Runs the loop against `Provider::stream`.
/// Assumes the caller has already emitted `response.created` and
/// `response.in_progress`; emits only `output_item.*`/`content_part.*`/delta
/// events here — never another lifecycle event, since intermediate tool
/// execution inside the loop does not emit new lifecycle events.
#[allow(clippy::too_many_arguments)]
pub async fn run_streaming(
    provider: &dyn Provider,
    config: &LoopConfig,
    executors: &[Arc<dyn ToolExecutor>],
    mut messages: Vec<ChatMessage>,
    single_shot: bool,
    cancel: CancellationToken,
    writer: &mut dyn ResponseWriter,
) -> Result<LoopOutcome> {
    let tool_defs = tool_defs_by_name(&config.tools);
    let mut output: Vec<Item> = Vec::new();
    let mut usage = Usage::default();
    let max_turns = config.max_turns.max(1);

    for turn in 0..max_turns {
        if cancel.is_cancelled() {
            return Ok(cancelled(output, usage));
        }

        let request = build_request(config, messages.clone(), turn);
        let mut stream = provider.stream(request).await?;

        let mut text_item_id: Option<String> = None;
        let mut tool_item_ids: Vec<String> = Vec::new();
        let mut turn_items: Vec<Item> = Vec::new();
        let mut items_opened_this_turn = 0usize;

        loop {
            let event = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(cancelled(output, usage)),
                next = stream.next() => next,
            };

            let Some(event) = event else { break };
            match event? {
                ProviderEvent::TextDelta(delta) => {
                    let item_id = match &text_item_id {
                        Some(id) => id.clone(),
                        None => {
                            let id = ids::generate(ids::MESSAGE_PREFIX);
                            text_item_id = Some(id.clone());
                            let placeholder = Item::Message {
                                id: id.clone(),
                                role: Role::Assistant,
                                status: ItemStatus::InProgress,
                                content: vec![ContentPart::OutputText { text: String::new() }],
                            };
                            let output_index = output.len() + items_opened_this_turn;
                            items_opened_this_turn += 1;
                            writer
                                .write_event(StreamEvent::OutputItemAdded {
                                    sequence_number: writer.next_sequence_number(),
                                    output_index,
                                    item: placeholder,
                                })
                                .await?;
                            writer
                                .write_event(StreamEvent::ContentPartAdded {
                                    sequence_number: writer.next_sequence_number(),
                                    item_id: id.clone(),
                                    content_index: 0,
                                })
                                .await?;
                            id
                        }
                    };
                    writer
                        .write_event(StreamEvent::OutputTextDelta { sequence_number: writer.next_sequence_number(), item_id, delta })
                        .await?;
                }
                ProviderEvent::ToolCallDelta { index, arguments_delta, .. } => {
                    let index = index as usize;
                    while tool_item_ids.len() <= index {
                        tool_item_ids.push(String::new());
                    }
                    if tool_item_ids[index].is_empty() {
                        let id = ids::generate(ids::FUNCTION_CALL_PREFIX);
                        tool_item_ids[index] = id.clone();
                        let placeholder = Item::FunctionCall {
                            id,
                            call_id: String::new(),
                            name: String::new(),
                            arguments: String::new(),
                            status: ItemStatus::InProgress,
                        };
                        let output_index = output.len() + items_opened_this_turn;
                        items_opened_this_turn += 1;
                        writer
                            .write_event(StreamEvent::OutputItemAdded {
                                sequence_number: writer.next_sequence_number(),
                                output_index,
                                item: placeholder,
                            })
                            .await?;
                    }
                    if let Some(delta) = arguments_delta {
                        writer
                            .write_event(StreamEvent::FunctionCallArgumentsDelta {
                                sequence_number: writer.next_sequence_number(),
                                item_id: tool_item_ids[index].clone(),
                                delta,
                            })
                            .await?;
                    }
                }
                ProviderEvent::Done(done) => {
                    usage += done.usage;
                    turn_items = apply_pre_assigned_ids(done.items, text_item_id.as_deref(), &tool_item_ids);
                    break;
                }
            }
        }

        let turn_start_index = output.len();
        for (offset, item) in turn_items.iter().enumerate() {
            let output_index = turn_start_index + offset;
            match item {
                Item::Message { id, content, .. } => {
                    let text = content
                        .iter()
                        .filter_map(|part| match part {
                            ContentPart::OutputText { text } => Some(text.as_str()),
                            _ => None,
                        })
                        .collect::<String>();
                    writer
                        .write_event(StreamEvent::OutputTextDone { sequence_number: writer.next_sequence_number(), item_id: id.clone(), text })
                        .await?;
                    writer
                        .write_event(StreamEvent::ContentPartDone { sequence_number: writer.next_sequence_number(), item_id: id.clone(), content_index: 0 })
                        .await?;
                }
                Item::FunctionCall { id, arguments, .. } => {
                    writer
                        .write_event(StreamEvent::FunctionCallArgumentsDone {
                            sequence_number: writer.next_sequence_number(),
                            item_id: id.clone(),
                            arguments: arguments.clone(),
                        })
                        .await?;
                }
                _ => {}
            }
            writer
                .write_event(StreamEvent::OutputItemDone { sequence_number: writer.next_sequence_number(), output_index, item: item.clone() })
                .await?;
        }

        output.extend(turn_items.iter().cloned());
        messages.extend(chat_messages_from_items(&turn_items));

        let function_calls: Vec<Item> = turn_items.into_iter().filter(|item| matches!(item, Item::FunctionCall { .. })).collect();

        if function_calls.is_empty() || single_shot {
            return Ok(LoopOutcome { output, usage, status: ResponseStatus::Completed, incomplete_reason: None });
        }

        let (server_calls, client_calls) = classify_tool_calls(&function_calls, executors, &tool_defs);
        if !client_calls.is_empty() {
            return Ok(LoopOutcome { output, usage, status: ResponseStatus::RequiresAction, incomplete_reason: None });
        }

        let (server_calls, mut tool_outputs) = apply_allowed_tools_filter(server_calls, config.allowed_tools.as_deref());
        tool_outputs.extend(dispatch_tool_calls(server_calls, config.parallel_tool_calls, &cancel).await);
        let tool_outputs = order_by_emission(tool_outputs, &function_calls);

        for item in &tool_outputs {
            let output_index = output.len();
            writer
                .write_event(StreamEvent::OutputItemAdded { sequence_number: writer.next_sequence_number(), output_index, item: item.clone() })
                .await?;
            writer
                .write_event(StreamEvent::OutputItemDone { sequence_number: writer.next_sequence_number(), output_index, item: item.clone() })
                .await?;
            output.push(item.clone());
        }
        messages.extend(chat_messages_from_items(&tool_outputs));
    }

    Ok(LoopOutcome {
        output,
        usage,
        status: ResponseStatus::Incomplete,
        incomplete_reason: Some(format!("agentic turn budget of {max_turns} exhausted")),
    })
}

/// Discards request/response plumbing not relevant to a given `Response`
/// shell — kept here rather than in `orchestrator.rs` since only the loop
/// needs to reason about partially-built responses mid-turn.
pub fn apply_outcome(response: &mut Response, outcome: LoopOutcome) {
    response.output = outcome.output;
    response.usage = outcome.usage;
    response.incomplete_reason = outcome.incomplete_reason;
    let _ = response.transition_to(outcome.status);
}
