//! `Item`: the atomic conversational unit.
//!
//! An `Item` is polymorphic over a closed set of kinds. Each variant carries
//! its own payload and participates in the same status lifecycle
//! (`in_progress` → `completed` | `failed`).

use serde::{Deserialize, Serialize};

use super::ids;

/// Per-item lifecycle status. Unlike [`super::response::ResponseStatus`] this
/// is a flat three-state lattice with no modeled transitions of its own —
/// items reach their terminal status once, when the engine finishes
/// producing them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    InProgress,
    Completed,
    Failed,
}

/// Role of a `message` item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    System,
    Developer,
}

/// One part of a `message` item's content sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    InputText { text: String },
    OutputText { text: String },
    InputImage { image_url: String },
    Refusal { refusal: String },
    Reasoning { text: String },
}

/// One output produced by a `code_interpreter_call`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CodeInterpreterOutput {
    Logs { logs: String },
    Image { url: String },
}

/// One hit returned by a `file_search_call`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileSearchResult {
    pub file_id: String,
    pub score: f64,
    pub text: String,
}

/// The atomic conversational unit. Every variant carries `id` and `status`;
/// additional fields are kind-specific. Creation order within a
/// [`super::response::Response`]'s `output` is the `Vec` index, so no
/// explicit order field is stored on the item itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Item {
    Message {
        id: String,
        role: Role,
        status: ItemStatus,
        content: Vec<ContentPart>,
    },
    FunctionCall {
        id: String,
        call_id: String,
        name: String,
        /// JSON-encoded arguments, exactly as emitted by the backend — kept
        /// as a string rather than `serde_json::Value` because partial
        /// arguments streamed mid-turn are not valid JSON until done.
        arguments: String,
        status: ItemStatus,
    },
    FunctionCallOutput {
        id: String,
        call_id: String,
        output: String,
        is_error: bool,
        status: ItemStatus,
    },
    Reasoning {
        id: String,
        content: String,
        status: ItemStatus,
    },
    CodeInterpreterCall {
        id: String,
        code: String,
        outputs: Vec<CodeInterpreterOutput>,
        status: ItemStatus,
    },
    FileSearchCall {
        id: String,
        queries: Vec<String>,
        results: Vec<FileSearchResult>,
        status: ItemStatus,
    },
    WebSearchCall {
        id: String,
        query: String,
        status: ItemStatus,
    },
}

impl Item {
    pub fn id(&self) -> &str {
        match self {
            Item::Message { id, .. }
            | Item::FunctionCall { id, .. }
            | Item::FunctionCallOutput { id, .. }
            | Item::Reasoning { id, .. }
            | Item::CodeInterpreterCall { id, .. }
            | Item::FileSearchCall { id, .. }
            | Item::WebSearchCall { id, .. } => id,
        }
    }

    pub fn status(&self) -> ItemStatus {
        match self {
            Item::Message { status, .. }
            | Item::FunctionCall { status, .. }
            | Item::FunctionCallOutput { status, .. }
            | Item::Reasoning { status, .. }
            | Item::CodeInterpreterCall { status, .. }
            | Item::FileSearchCall { status, .. }
            | Item::WebSearchCall { status, .. } => *status,
        }
    }

    /// `call_id` for the two function-call-shaped variants; `None` for
    /// everything else. Used to check the "every `function_call_output`
    /// references a live `function_call`" response invariant.
    pub fn call_id(&self) -> Option<&str> {
        match self {
            Item::FunctionCall { call_id, .. } | Item::FunctionCallOutput { call_id, .. } => {
                Some(call_id)
            }
            _ => None,
        }
    }

    pub fn new_assistant_message(content: Vec<ContentPart>) -> Self {
        Item::Message {
            id: ids::generate(ids::MESSAGE_PREFIX),
            role: Role::Assistant,
            status: ItemStatus::Completed,
            content,
        }
    }

    pub fn new_function_call(call_id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Item::FunctionCall {
            id: ids::generate(ids::FUNCTION_CALL_PREFIX),
            call_id: call_id.into(),
            name: name.into(),
            arguments: arguments.into(),
            status: ItemStatus::Completed,
        }
    }

    pub fn new_function_call_output(call_id: impl Into<String>, output: impl Into<String>, is_error: bool) -> Self {
        Item::FunctionCallOutput {
            id: ids::generate(ids::FUNCTION_CALL_OUTPUT_PREFIX),
            call_id: call_id.into(),
            output: output.into(),
            is_error,
            status: ItemStatus::Completed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn function_call_output_carries_call_id() {
        let item = Item::new_function_call_output("call_abc", "{\"temp\":20}", false);
        assert_eq!(item.call_id(), Some("call_abc"));
        assert_eq!(item.status(), ItemStatus::Completed);
    }

    #[test]
    fn message_has_no_call_id() {
        let item = Item::new_assistant_message(vec![ContentPart::OutputText {
            text: "4".to_string(),
        }]);
        assert_eq!(item.call_id(), None);
    }

    #[test]
    fn serializes_with_type_tag() {
        let item = Item::new_function_call("call_1", "get_weather", "{}");
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["type"], "function_call");
        assert_eq!(json["call_id"], "call_1");
    }

    #[test]
    fn ids_carry_the_expected_prefix() {
        let msg = Item::new_assistant_message(vec![]);
        assert!(ids::is_valid(msg.id(), ids::MESSAGE_PREFIX));
        let fc = Item::new_function_call("c", "n", "{}");
        assert!(ids::is_valid(fc.id(), ids::FUNCTION_CALL_PREFIX));
        let fco = Item::new_function_call_output("c", "o", false);
        assert!(ids::is_valid(fco.id(), ids::FUNCTION_CALL_OUTPUT_PREFIX));
    }
}
