//! Translation between the reconstructed [`Item`] conversation history and
//! Chat Completions `messages[]`.
//!
//! Chat Completions has no notion of reasoning, code interpreter, file
//! search, or web search turns, so those item kinds are dropped rather than
//! translated — they simply never reach the backend request.

use serde_json::Value;

use crate::backend::wire::{ChatMessage, WireFunctionCall, WireToolCall};
use crate::protocol::{ContentPart, Item, Role};

fn flatten_content(parts: &[ContentPart]) -> Option<String> {
    let text: String = parts
        .iter()
        .filter_map(|part| match part {
            ContentPart::InputText { text } | ContentPart::OutputText { text } => Some(text.as_str()),
            ContentPart::Refusal { refusal } => Some(refusal.as_str()),
            ContentPart::Reasoning { .. } | ContentPart::InputImage { .. } => None,
        })
        .collect::<Vec<_>>()
        .join("");

    if text.is_empty() { None } else { Some(text) }
}

/// Converts a reconstructed item history into the `messages[]` a Chat
/// Completions request carries. A `message{role: assistant}` item followed
/// immediately by a run of `function_call` items is merged into one
/// `ChatMessage::assistant` carrying both `content` and `tool_calls`, since
/// the wire format allows (and the backend expects) exactly that shape.
pub fn chat_messages_from_items(items: &[Item]) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(items.len());
    let mut iter = items.iter().peekable();

    while let Some(item) = iter.next() {
        match item {
            Item::Message { role: Role::Assistant, content, .. } => {
                let text = flatten_content(content);
                let mut tool_calls = Vec::new();
                while let Some(Item::FunctionCall { call_id, name, arguments, .. }) = iter.peek() {
                    tool_calls.push(WireToolCall {
                        id: call_id.clone(),
                        kind: "function".into(),
                        function: WireFunctionCall { name: name.clone(), arguments: arguments.clone() },
                    });
                    iter.next();
                }
                let tool_calls = if tool_calls.is_empty() { None } else { Some(tool_calls) };
                messages.push(ChatMessage::assistant(text, tool_calls));
            }
            Item::Message { role, content, .. } => {
                let text = flatten_content(content).unwrap_or_default();
                messages.push(match role {
                    Role::System | Role::Developer => ChatMessage::system(text),
                    Role::User => ChatMessage::user(text),
                    Role::Assistant => unreachable!("handled above"),
                });
            }
            Item::FunctionCall { call_id, name, arguments, .. } => {
                let tool_call = WireToolCall {
                    id: call_id.clone(),
                    kind: "function".into(),
                    function: WireFunctionCall { name: name.clone(), arguments: arguments.clone() },
                };
                messages.push(ChatMessage::assistant(None, Some(vec![tool_call])));
            }
            Item::FunctionCallOutput { call_id, output, .. } => {
                messages.push(ChatMessage::tool(call_id.clone(), output.clone()));
            }
            Item::Reasoning { .. }
            | Item::CodeInterpreterCall { .. }
            | Item::FileSearchCall { .. }
            | Item::WebSearchCall { .. } => {}
        }
    }

    messages
}

/// Maps the Responses-shaped `tool_choice` (`"auto"`, `"required"`, `"none"`,
/// or `{"type":"function","name":"x"}`) to the Chat Completions wire shape
/// (`{"type":"function","function":{"name":"x"}}`). `"none"` is handled
/// upstream by disabling the loop entirely and never
/// reaches the backend, but is translated here too for completeness.
pub fn translate_tool_choice(tool_choice: &Value) -> Value {
    match tool_choice {
        Value::Object(obj) => match obj.get("name").and_then(Value::as_str) {
            Some(name) => serde_json::json!({"type": "function", "function": {"name": name}}),
            None => tool_choice.clone(),
        },
        other => other.clone(),
    }
}
