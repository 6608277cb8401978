//! End-to-end scenarios against the public `Engine` API, covering the
//! concrete request/response walkthroughs and several of the cross-cutting
//! properties they exercise: single-shot completion, streaming SSE grammar,
//! the agentic tool loop (both with and without a registered executor),
//! an in-band failure mid-stream, the turn budget, and request/response
//! passthrough fields.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use antwort_gateway::backend::{EventStream, ModelInfo, Provider, ProviderEvent, ProviderRequest, ProviderResponse};
use antwort_gateway::tools::{FunctionProvider, FunctionRegistry, FunctionTool, ToolDefinition, ToolExecutor};
use antwort_gateway::usage::Usage;
use antwort_gateway::{ContentPart, CreateResponseRequest, Engine, EngineConfig, Item, ItemStatus, Role};
use antwort_gateway::{BufferedWriter, GatewayError, InMemoryResponseStore, ResponseStatus, ResponseStore, ResponseWriter, StreamEvent};
use async_trait::async_trait;
use futures::stream;
use serde_json::json;
use tokio_util::sync::CancellationToken;

fn user_message(text: &str) -> Item {
    Item::Message {
        id: "msg_req".into(),
        role: Role::User,
        status: ItemStatus::Completed,
        content: vec![ContentPart::InputText { text: text.into() }],
    }
}

fn base_request(input_text: &str) -> CreateResponseRequest {
    CreateResponseRequest {
        model: Some("m".into()),
        input: vec![user_message(input_text)],
        previous_response_id: None,
        stream: false,
        store: true,
        tools: Vec::new(),
        tool_choice: None,
        allowed_tools: None,
        parallel_tool_calls: true,
        max_tool_calls: None,
        temperature: None,
        top_p: None,
        max_output_tokens: None,
        stop: None,
        include: None,
        controls: Default::default(),
    }
}

fn assistant_text(text: &str) -> ProviderResponse {
    ProviderResponse {
        items: vec![Item::new_assistant_message(vec![ContentPart::OutputText { text: text.into() }])],
        usage: Usage::new(10, 2),
        finish_reason: Some("stop".into()),
    }
}

fn weather_call(call_id: &str) -> ProviderResponse {
    ProviderResponse {
        items: vec![Item::new_function_call(call_id, "get_weather", r#"{"city":"NYC"}"#)],
        usage: Usage::new(8, 3),
        finish_reason: Some("tool_calls".into()),
    }
}

fn weather_tool_definition() -> ToolDefinition {
    ToolDefinition {
        name: "get_weather".into(),
        description: "Current weather for a city".into(),
        parameters: json!({"type": "object", "properties": {"city": {"type": "string"}}}),
    }
}

/// A backend double whose `complete`/`stream` behavior is driven entirely by
/// a caller-supplied closure keyed on the 0-based turn number, so one type
/// covers the single-shot, multi-turn, and mid-stream scenarios below.
/// `stream` replays the same scripted response as a single `Done` event,
/// except when the script requests an in-band failure partway through.
struct ScriptedProvider<F> {
    turn: AtomicUsize,
    script: F,
    fail_stream_after_deltas: Option<usize>,
}

impl<F> ScriptedProvider<F>
where
    F: Fn(usize) -> ProviderResponse + Send + Sync,
{
    fn new(script: F) -> Self {
        Self { turn: AtomicUsize::new(0), script, fail_stream_after_deltas: None }
    }

    fn failing_after_deltas(script: F, count: usize) -> Self {
        Self { turn: AtomicUsize::new(0), script, fail_stream_after_deltas: Some(count) }
    }
}

#[async_trait]
impl<F> Provider for ScriptedProvider<F>
where
    F: Fn(usize) -> ProviderResponse + Send + Sync,
{
    async fn complete(&self, _request: ProviderRequest) -> antwort_gateway::Result<ProviderResponse> {
        let turn = self.turn.fetch_add(1, Ordering::SeqCst);
        Ok((self.script)(turn))
    }

    async fn stream(&self, _request: ProviderRequest) -> antwort_gateway::Result<EventStream> {
        let turn = self.turn.fetch_add(1, Ordering::SeqCst);

        if let Some(count) = self.fail_stream_after_deltas {
            let deltas: Vec<antwort_gateway::Result<ProviderEvent>> =
                (0..count).map(|_| Ok(ProviderEvent::TextDelta("x".into()))).collect();
            let mut events = deltas;
            events.push(Err(GatewayError::server_error("backend returned 500 mid-stream")));
            return Ok(Box::pin(stream::iter(events)));
        }

        let response = (self.script)(turn);
        Ok(Box::pin(stream::iter(vec![Ok(ProviderEvent::Done(response))])))
    }

    async fn list_models(&self) -> antwort_gateway::Result<Vec<ModelInfo>> {
        Ok(Vec::new())
    }

    async fn close(&self) {}
}

struct WeatherProvider;
impl FunctionProvider for WeatherProvider {
    fn name(&self) -> &str {
        "weather"
    }
    fn tools(&self) -> Vec<FunctionTool> {
        vec![FunctionTool::new(
            "get_weather",
            "Current weather for a city",
            json!({"type": "object", "properties": {"city": {"type": "string"}}}),
            |args| async move { Ok(json!({"temp": 20, "city": args["city"]})) },
        )]
    }
}

/// Collects every `StreamEvent` a streaming `create_response` call emits, so
/// a test can assert on event order, sequence numbers, and terminality the
/// way a real SSE client would see them (minus the wire encoding itself,
/// which `writer::tests` already covers byte-for-byte).
#[derive(Default)]
struct RecordingWriter {
    events: Vec<StreamEvent>,
}

#[async_trait]
impl ResponseWriter for RecordingWriter {
    async fn write_event(&mut self, event: StreamEvent) -> antwort_gateway::Result<()> {
        self.events.push(event);
        Ok(())
    }

    async fn write_response(&mut self, _response: antwort_gateway::Response) -> antwort_gateway::Result<()> {
        panic!("RecordingWriter is for streaming scenarios only");
    }

    async fn flush(&mut self) -> antwort_gateway::Result<()> {
        Ok(())
    }

    fn on_first_created(&mut self, _callback: antwort_gateway::writer::OnFirstCreated) {}

    fn next_sequence_number(&self) -> u64 {
        self.events.len() as u64
    }
}

// S1 — non-streaming single-shot: backend returns text, no tools involved.
#[tokio::test]
async fn s1_non_streaming_single_shot_completes() {
    let provider = ScriptedProvider::new(|_turn| assistant_text("4"));
    let engine = Engine::new(Arc::new(provider), None, Vec::new(), EngineConfig::default());

    let mut writer = BufferedWriter::new();
    let response = engine
        .create_response(None, base_request("2+2?"), &mut writer, CancellationToken::new())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(response.status, ResponseStatus::Completed);
    let text = response
        .output
        .iter()
        .find_map(|item| match item {
            Item::Message { role: Role::Assistant, content, .. } => content.iter().find_map(|part| match part {
                ContentPart::OutputText { text } => Some(text.clone()),
                _ => None,
            }),
            _ => None,
        })
        .expect("assistant message with output_text");
    assert_eq!(text, "4");
}

// S2 — streaming: exactly one `response.created` (seq 0) and one terminal
// event, sequence numbers strictly increasing, `[DONE]` implied by
// terminality (the writer itself appends it; `writer::tests` covers the
// literal bytes).
#[tokio::test]
async fn s2_streaming_emits_created_then_terminal_in_order() {
    let provider = ScriptedProvider::new(|_turn| assistant_text("4"));
    let engine = Engine::new(Arc::new(provider), None, Vec::new(), EngineConfig::default());

    let mut request = base_request("2+2?");
    request.stream = true;
    let mut writer = RecordingWriter::default();
    engine.create_response(None, request, &mut writer, CancellationToken::new()).await.unwrap();

    assert!(matches!(writer.events.first(), Some(StreamEvent::ResponseCreated { sequence_number: 0, .. })));
    let last = writer.events.last().expect("at least one event");
    assert!(last.is_terminal());
    assert!(matches!(last, StreamEvent::ResponseCompleted { .. }));

    let sequences: Vec<u64> = writer.events.iter().map(StreamEvent::sequence_number).collect();
    let mut sorted = sequences.clone();
    sorted.sort_unstable();
    assert_eq!(sequences, sorted, "sequence numbers must strictly increase");
    assert_eq!(sequences.iter().collect::<std::collections::HashSet<_>>().len(), sequences.len());
}

// S3 — agentic 2-turn: turn 1 calls get_weather, a registered executor
// answers it, turn 2 returns the final text.
#[tokio::test]
async fn s3_agentic_two_turn_with_executor_completes() {
    let provider = ScriptedProvider::new(|turn| match turn {
        0 => weather_call("call_1"),
        _ => assistant_text("20°C in NYC"),
    });
    let registry: Arc<dyn ToolExecutor> = Arc::new(FunctionRegistry::new(vec![Arc::new(WeatherProvider)]));
    let engine = Engine::new(Arc::new(provider), None, vec![registry], EngineConfig::default());

    let mut request = base_request("What's the weather in NYC?");
    request.tools = vec![weather_tool_definition()];
    let mut writer = BufferedWriter::new();
    let response = engine
        .create_response(None, request, &mut writer, CancellationToken::new())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(response.status, ResponseStatus::Completed);
    assert_eq!(response.output.len(), 3, "function_call, function_call_output, message");
    assert!(matches!(response.output[0], Item::FunctionCall { .. }));
    assert!(matches!(response.output[1], Item::FunctionCallOutput { .. }));
    assert!(matches!(response.output[2], Item::Message { role: Role::Assistant, .. }));
    let mut expected_usage = Usage::new(8, 3);
    expected_usage += Usage::new(10, 2);
    assert_eq!(response.usage, expected_usage);
}

// S4 — requires_action: no executor registered for get_weather, so the loop
// stops after turn 1; a follow-up request chained via previous_response_id
// with a client-supplied function_call_output reconstructs history and
// completes normally.
#[tokio::test]
async fn s4_requires_action_then_followup_completes() {
    let store = Arc::new(InMemoryResponseStore::new());

    // An executor is registered, but for no tools at all, so `executors` is
    // non-empty (the loop does not collapse to single-shot) while
    // `get_weather` still resolves to no executor, forcing `requires_action`
    // rather than a silently-completed response.
    let empty_registry: Arc<dyn ToolExecutor> = Arc::new(FunctionRegistry::new(Vec::new()));
    let first_provider = ScriptedProvider::new(|_turn| weather_call("call_1"));
    let first_engine = Engine::new(
        Arc::new(first_provider),
        Some(store.clone() as Arc<dyn ResponseStore>),
        vec![empty_registry],
        EngineConfig::default(),
    );

    let mut request = base_request("What's the weather in NYC?");
    request.tools = vec![weather_tool_definition()];
    let mut writer = BufferedWriter::new();
    let first_response = first_engine
        .create_response(None, request, &mut writer, CancellationToken::new())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(first_response.status, ResponseStatus::RequiresAction);
    assert_eq!(first_response.output.len(), 1);
    assert!(matches!(first_response.output[0], Item::FunctionCall { .. }));

    let second_provider = ScriptedProvider::new(|_turn| assistant_text("20°C in NYC"));
    let second_engine = Engine::new(
        Arc::new(second_provider),
        Some(store as Arc<dyn ResponseStore>),
        Vec::new(),
        EngineConfig::default(),
    );

    let mut followup = base_request("(tool result)");
    followup.previous_response_id = Some(first_response.id.clone());
    followup.input = vec![Item::new_function_call_output("call_1", r#"{"temp":20}"#, false)];
    let mut writer = BufferedWriter::new();
    let second_response = second_engine
        .create_response(None, followup, &mut writer, CancellationToken::new())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(second_response.status, ResponseStatus::Completed);
    assert_eq!(second_response.previous_response_id.as_deref(), Some(first_response.id.as_str()));
}

/// Streams text deltas spaced by a real sleep between each one, so a test
/// can reliably cancel mid-stream before the backend would have finished on
/// its own.
struct BlockingStreamProvider;

#[async_trait]
impl Provider for BlockingStreamProvider {
    async fn complete(&self, _request: ProviderRequest) -> antwort_gateway::Result<ProviderResponse> {
        unreachable!("streaming-only fixture")
    }

    async fn stream(&self, _request: ProviderRequest) -> antwort_gateway::Result<EventStream> {
        let stream = stream::unfold(0u32, |step| async move {
            if step >= 50 {
                return None;
            }
            if step > 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            Some((Ok(ProviderEvent::TextDelta(".".into())), step + 1))
        });
        Ok(Box::pin(stream))
    }

    async fn list_models(&self) -> antwort_gateway::Result<Vec<ModelInfo>> {
        Ok(Vec::new())
    }

    async fn close(&self) {}
}

// S5 — cancellation: a `DELETE` mid-stream cancels the in-flight response,
// which must end the stream in-band with `response.cancelled` rather than
// running to completion or erroring.
#[tokio::test]
async fn s5_cancel_mid_stream_yields_cancelled_status() {
    let engine = Engine::new(Arc::new(BlockingStreamProvider), None, Vec::new(), EngineConfig::default());

    let mut request = base_request("tell me a long story");
    request.stream = true;
    let cancel = CancellationToken::new();
    let cancel_for_engine = cancel.clone();

    let handle = tokio::spawn(async move {
        let mut writer = RecordingWriter::default();
        let _ = engine.create_response(None, request, &mut writer, cancel_for_engine).await;
        writer
    });

    // Several deltas have flowed by now (10ms apart), well before the
    // provider's own 50-step exhaustion.
    tokio::time::sleep(Duration::from_millis(25)).await;
    cancel.cancel();

    let writer = handle.await.expect("create_response task should not panic");
    let last = writer.events.last().expect("at least one event");
    assert!(matches!(last, StreamEvent::ResponseCancelled { .. }));

    let delta_count = writer.events.iter().filter(|event| matches!(event, StreamEvent::OutputTextDelta { .. })).count();
    assert!(delta_count > 0, "cancellation should land after at least one delta, not before the stream starts");
}

// S6 — error after streaming begins: three deltas already flow, then the
// backend fails; the stream ends in-band with `response.failed`, never a
// transport-level error.
#[tokio::test]
async fn s6_error_after_streaming_begins_yields_inband_failure() {
    let provider = ScriptedProvider::failing_after_deltas(|_turn| assistant_text("unused"), 3);
    let engine = Engine::new(Arc::new(provider), None, Vec::new(), EngineConfig::default());

    let mut request = base_request("2+2?");
    request.stream = true;
    let mut writer = RecordingWriter::default();
    let result = engine.create_response(None, request, &mut writer, CancellationToken::new()).await.unwrap();
    assert!(result.is_none(), "a failed stream resolves via the writer, not the return value");

    let delta_count = writer
        .events
        .iter()
        .filter(|event| matches!(event, StreamEvent::OutputTextDelta { .. }))
        .count();
    assert_eq!(delta_count, 3);

    let last = writer.events.last().expect("at least one event");
    assert!(matches!(last, StreamEvent::ResponseFailed { .. }));
}

// Agentic loop budget: a backend that always calls a tool never lets the
// loop reach a final answer; it must stop at exactly `max_agentic_turns`
// turns with status `incomplete`, having emitted N function_call +
// N function_call_output items.
#[tokio::test]
async fn agentic_loop_stops_at_turn_budget_as_incomplete() {
    let provider = ScriptedProvider::new(|turn| weather_call(&format!("call_{turn}")));
    let registry: Arc<dyn ToolExecutor> = Arc::new(FunctionRegistry::new(vec![Arc::new(WeatherProvider)]));
    let config = EngineConfig { default_model: None, max_agentic_turns: 3 };
    let engine = Engine::new(Arc::new(provider), None, vec![registry], config);

    let mut request = base_request("What's the weather in NYC?");
    request.tools = vec![weather_tool_definition()];
    let mut writer = BufferedWriter::new();
    let response = engine
        .create_response(None, request, &mut writer, CancellationToken::new())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(response.status, ResponseStatus::Incomplete);
    assert_eq!(response.output.len(), 6, "3 function_call + 3 function_call_output");
}

// Round-trip: every P1 passthrough control field survives unchanged from
// request to response.
#[tokio::test]
async fn p1_controls_round_trip_into_response() {
    let provider = ScriptedProvider::new(|_turn| assistant_text("ok"));
    let engine = Engine::new(Arc::new(provider), None, Vec::new(), EngineConfig::default());

    let mut request = base_request("hi");
    request.controls.metadata = Some(json!({"trace_id": "abc123"}));
    request.controls.user = Some("user_42".into());
    request.controls.frequency_penalty = Some(0.5);
    request.controls.presence_penalty = Some(-0.2);
    request.controls.top_logprobs = Some(3);
    request.controls.reasoning = Some(json!({"effort": "low"}));
    request.controls.text_format = Some(json!({"type": "text"}));
    request.controls.parallel_tool_calls = Some(false);
    request.controls.max_tool_calls = Some(5);

    let mut writer = BufferedWriter::new();
    let response = engine
        .create_response(None, request.clone(), &mut writer, CancellationToken::new())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(response.controls.metadata, request.controls.metadata);
    assert_eq!(response.controls.user, request.controls.user);
    assert_eq!(response.controls.frequency_penalty, request.controls.frequency_penalty);
    assert_eq!(response.controls.presence_penalty, request.controls.presence_penalty);
    assert_eq!(response.controls.top_logprobs, request.controls.top_logprobs);
    assert_eq!(response.controls.reasoning, request.controls.reasoning);
    assert_eq!(response.controls.text_format, request.controls.text_format);
    assert_eq!(response.controls.parallel_tool_calls, request.controls.parallel_tool_calls);
    assert_eq!(response.controls.max_tool_calls, request.controls.max_tool_calls);
}
