//! SSE parsing and tool-call delta aggregation for the Chat Completions
//! streaming wire format, built on
//! `eventsource-stream` rather than hand-rolled `"data: "` line parsing.

use std::collections::BTreeMap;
use std::time::Duration;

use bytes::Bytes;
use eventsource_stream::Eventsource;
use futures::Stream;
use futures::StreamExt;
use tokio_stream::StreamExt as TokioStreamExt;

use crate::error::{GatewayError, Result};
use crate::protocol::{ContentPart, Item};
use crate::usage::Usage;

use super::wire::{ChatCompletionResponse, OpenAIChunk};

/// A backend connection that goes this long without a frame is treated as
/// dead rather than left to hang the agentic loop.
const IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Turns the raw byte body of a `stream: true` Chat Completions response
/// into a stream of decoded chunks, stopping at the `[DONE]` sentinel.
pub fn parse_chunk_stream(
    bytes: impl Stream<Item = std::result::Result<Bytes, reqwest::Error>> + Send + 'static,
) -> impl Stream<Item = Result<OpenAIChunk>> + Send + 'static {
    let events = bytes.eventsource();
    let timed = TokioStreamExt::timeout(events, IDLE_TIMEOUT);

    timed.filter_map(|timed_event| async move {
        let event = match timed_event {
            Ok(Ok(event)) => event,
            Ok(Err(e)) => {
                return Some(Err(GatewayError::server_error(format!(
                    "backend stream error: {e}"
                ))));
            }
            Err(_) => return Some(Err(GatewayError::server_error("backend stream idle timeout"))),
        };

        if event.data == "[DONE]" {
            return None;
        }

        Some(serde_json::from_str::<OpenAIChunk>(&event.data).map_err(Into::into))
    })
}

#[derive(Debug, Clone, Default)]
struct PartialToolCall {
    id: Option<String>,
    name: Option<String>,
    arguments: String,
}

/// One incremental piece of a turn, surfaced so the agentic loop can forward
/// it as a `StreamEvent` without waiting for the whole turn to finish.
#[derive(Debug, Clone)]
pub enum ChunkEvent {
    TextDelta(String),
    ToolCallDelta {
        index: u32,
        id: Option<String>,
        name: Option<String>,
        arguments_delta: Option<String>,
    },
}

/// Accumulates one agentic turn's worth of `OpenAIChunk`s into gateway
/// `Item`s. A fresh aggregator is used per turn; it is not meant to span a
/// whole multi-turn response.
#[derive(Default)]
pub struct ChunkAggregator {
    text: String,
    tool_calls: BTreeMap<u32, PartialToolCall>,
    usage: Usage,
}

impl ChunkAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn usage(&self) -> Usage {
        self.usage
    }

    /// Folds one chunk into the running turn state, returning the
    /// incremental deltas it carried and the `finish_reason` once the
    /// backend has signalled the turn is done.
    pub fn ingest(&mut self, chunk: OpenAIChunk) -> (Vec<ChunkEvent>, Option<String>) {
        if let Some(usage) = chunk.usage {
            self.usage = Usage::new(usage.prompt_tokens, usage.completion_tokens);
        }

        let Some(choice) = chunk.choices.into_iter().next() else {
            return (Vec::new(), None);
        };

        let mut events = Vec::new();

        if let Some(content) = choice.delta.content {
            if !content.is_empty() {
                self.text.push_str(&content);
                events.push(ChunkEvent::TextDelta(content));
            }
        }

        if let Some(tool_call_deltas) = choice.delta.tool_calls {
            for delta in tool_call_deltas {
                let entry = self.tool_calls.entry(delta.index).or_default();

                let mut name_delta = None;
                let mut arguments_delta = None;

                if let Some(id) = delta.id {
                    entry.id = Some(id);
                }
                if let Some(function) = delta.function {
                    if let Some(name) = function.name {
                        entry.name = Some(name.clone());
                        name_delta = Some(name);
                    }
                    if let Some(arguments) = function.arguments {
                        entry.arguments.push_str(&arguments);
                        arguments_delta = Some(arguments);
                    }
                }

                events.push(ChunkEvent::ToolCallDelta {
                    index: delta.index,
                    id: entry.id.clone(),
                    name: name_delta,
                    arguments_delta,
                });
            }
        }

        (events, choice.finish_reason)
    }

    /// Drains the accumulated turn into `Item`s once a `finish_reason` has
    /// been observed. The assistant message, if any, precedes the function
    /// calls, in the index order the backend streamed them.
    pub fn into_items(self) -> Vec<Item> {
        let mut items = Vec::new();

        if !self.text.is_empty() {
            items.push(Item::new_assistant_message(vec![ContentPart::OutputText { text: self.text }]));
        }

        for (_, call) in self.tool_calls {
            items.push(Item::new_function_call(
                call.id.unwrap_or_default(),
                call.name.unwrap_or_default(),
                call.arguments,
            ));
        }

        items
    }
}

/// Converts a buffered (`stream: false`) response body into items, mirroring
/// what [`ChunkAggregator::into_items`] produces on the streaming path.
pub fn items_from_completion(response: &ChatCompletionResponse) -> (Vec<Item>, Usage, Option<String>) {
    let Some(choice) = response.choices.first() else {
        return (Vec::new(), Usage::default(), None);
    };

    let mut items = Vec::new();

    if let Some(content) = &choice.message.content {
        if !content.is_empty() {
            items.push(Item::new_assistant_message(vec![ContentPart::OutputText {
                text: content.clone(),
            }]));
        }
    }

    if let Some(tool_calls) = &choice.message.tool_calls {
        for call in tool_calls {
            items.push(Item::new_function_call(
                call.id.clone(),
                call.function.name.clone(),
                call.function.arguments.clone(),
            ));
        }
    }

    let usage = response
        .usage
        .as_ref()
        .map(|u| Usage::new(u.prompt_tokens, u.completion_tokens))
        .unwrap_or_default();

    (items, usage, choice.finish_reason.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::wire::{ChatCompletionChoice, ChatMessage, OpenAIChunkChoice, OpenAIDelta, OpenAIFunctionDelta, OpenAIToolCallDelta, WireFunctionCall, WireToolCall, WireUsage};

    fn text_chunk(content: &str, finish_reason: Option<&str>) -> OpenAIChunk {
        OpenAIChunk {
            choices: vec![OpenAIChunkChoice {
                delta: OpenAIDelta {
                    content: Some(content.to_string()),
                    tool_calls: None,
                },
                finish_reason: finish_reason.map(String::from),
            }],
            usage: None,
        }
    }

    #[test]
    fn ingest_accumulates_text_deltas_and_finish_reason() {
        let mut agg = ChunkAggregator::new();
        let (events, finish) = agg.ingest(text_chunk("Hel", None));
        assert!(matches!(events.as_slice(), [ChunkEvent::TextDelta(d)] if d == "Hel"));
        assert!(finish.is_none());

        let (_, finish) = agg.ingest(text_chunk("lo", Some("stop")));
        assert_eq!(finish.as_deref(), Some("stop"));

        let items = agg.into_items();
        assert_eq!(items.len(), 1);
        match &items[0] {
            Item::Message { content, .. } => {
                assert_eq!(content, &vec![ContentPart::OutputText { text: "Hello".into() }]);
            }
            other => panic!("expected message item, got {other:?}"),
        }
    }

    #[test]
    fn ingest_assembles_tool_call_arguments_across_chunks() {
        let mut agg = ChunkAggregator::new();

        agg.ingest(OpenAIChunk {
            choices: vec![OpenAIChunkChoice {
                delta: OpenAIDelta {
                    content: None,
                    tool_calls: Some(vec![OpenAIToolCallDelta {
                        index: 0,
                        id: Some("call_1".into()),
                        function: Some(OpenAIFunctionDelta {
                            name: Some("get_weather".into()),
                            arguments: Some(r#"{"city":"#.into()),
                        }),
                    }]),
                },
                finish_reason: None,
            }],
            usage: None,
        });

        let (_, finish) = agg.ingest(OpenAIChunk {
            choices: vec![OpenAIChunkChoice {
                delta: OpenAIDelta {
                    content: None,
                    tool_calls: Some(vec![OpenAIToolCallDelta {
                        index: 0,
                        id: None,
                        function: Some(OpenAIFunctionDelta {
                            name: None,
                            arguments: Some(r#""NYC"}"#.into()),
                        }),
                    }]),
                },
                finish_reason: Some("tool_calls".into()),
            }],
            usage: None,
        });
        assert_eq!(finish.as_deref(), Some("tool_calls"));

        let items = agg.into_items();
        assert_eq!(items.len(), 1);
        match &items[0] {
            Item::FunctionCall { call_id, name, arguments, .. } => {
                assert_eq!(call_id, "call_1");
                assert_eq!(name, "get_weather");
                assert_eq!(arguments, r#"{"city":"NYC"}"#);
            }
            other => panic!("expected function_call item, got {other:?}"),
        }
    }

    #[test]
    fn ingest_tracks_usage_from_the_final_chunk() {
        let mut agg = ChunkAggregator::new();
        agg.ingest(OpenAIChunk {
            choices: vec![OpenAIChunkChoice {
                delta: OpenAIDelta::default(),
                finish_reason: Some("stop".into()),
            }],
            usage: Some(WireUsage {
                prompt_tokens: 10,
                completion_tokens: 4,
                total_tokens: 14,
            }),
        });
        assert_eq!(agg.usage(), Usage::new(10, 4));
    }

    #[test]
    fn items_from_completion_handles_buffered_tool_calls() {
        let response = ChatCompletionResponse {
            choices: vec![ChatCompletionChoice {
                message: ChatMessage::assistant(
                    None,
                    Some(vec![WireToolCall {
                        id: "call_9".into(),
                        kind: "function".into(),
                        function: WireFunctionCall {
                            name: "search".into(),
                            arguments: "{}".into(),
                        },
                    }]),
                ),
                finish_reason: Some("tool_calls".into()),
            }],
            usage: Some(WireUsage {
                prompt_tokens: 5,
                completion_tokens: 1,
                total_tokens: 6,
            }),
        };

        let (items, usage, finish_reason) = items_from_completion(&response);
        assert_eq!(items.len(), 1);
        assert_eq!(usage, Usage::new(5, 1));
        assert_eq!(finish_reason.as_deref(), Some("tool_calls"));
    }

    #[tokio::test]
    async fn parse_chunk_stream_stops_at_done_sentinel() {
        let raw = vec![
            Ok(Bytes::from(
                "data: {\"choices\":[{\"delta\":{\"content\":\"hi\"},\"finish_reason\":null}]}\n\n",
            )),
            Ok(Bytes::from("data: [DONE]\n\n")),
        ];
        let stream = parse_chunk_stream(futures::stream::iter(raw));
        let chunks: Vec<_> = stream.collect().await;
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].is_ok());
    }
}
