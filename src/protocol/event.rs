//! `StreamEvent`: the tagged union emitted while streaming.
//!
//! Every event carries a `sequence_number` that is strictly increasing
//! within one response's stream; ordering across distinct
//! responses is unspecified. [`StreamEvent::is_terminal`] identifies the one
//! event per stream after which the [`crate::writer::ResponseWriter`] closes
//! with `data: [DONE]\n\n`.

use serde::Serialize;

use crate::error::ApiError;

use super::item::Item;
use super::response::Response;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum StreamEvent {
    #[serde(rename = "response.created")]
    ResponseCreated { sequence_number: u64, response: Response },

    #[serde(rename = "response.in_progress")]
    ResponseInProgress { sequence_number: u64, response: Response },

    #[serde(rename = "response.output_item.added")]
    OutputItemAdded {
        sequence_number: u64,
        output_index: usize,
        item: Item,
    },

    #[serde(rename = "response.content_part.added")]
    ContentPartAdded {
        sequence_number: u64,
        item_id: String,
        content_index: usize,
    },

    #[serde(rename = "response.output_text.delta")]
    OutputTextDelta {
        sequence_number: u64,
        item_id: String,
        delta: String,
    },

    #[serde(rename = "response.output_text.done")]
    OutputTextDone {
        sequence_number: u64,
        item_id: String,
        text: String,
    },

    #[serde(rename = "response.function_call_arguments.delta")]
    FunctionCallArgumentsDelta {
        sequence_number: u64,
        item_id: String,
        delta: String,
    },

    #[serde(rename = "response.function_call_arguments.done")]
    FunctionCallArgumentsDone {
        sequence_number: u64,
        item_id: String,
        arguments: String,
    },

    #[serde(rename = "response.reasoning.delta")]
    ReasoningDelta {
        sequence_number: u64,
        item_id: String,
        delta: String,
    },

    #[serde(rename = "response.code_interpreter_call.in_progress")]
    CodeInterpreterInProgress { sequence_number: u64, item_id: String },

    #[serde(rename = "response.code_interpreter_call.interpreting")]
    CodeInterpreterInterpreting { sequence_number: u64, item_id: String },

    #[serde(rename = "response.code_interpreter_call.completed")]
    CodeInterpreterCompleted { sequence_number: u64, item_id: String },

    #[serde(rename = "response.content_part.done")]
    ContentPartDone {
        sequence_number: u64,
        item_id: String,
        content_index: usize,
    },

    #[serde(rename = "response.output_item.done")]
    OutputItemDone {
        sequence_number: u64,
        output_index: usize,
        item: Item,
    },

    #[serde(rename = "response.completed")]
    ResponseCompleted { sequence_number: u64, response: Response },

    #[serde(rename = "response.failed")]
    ResponseFailed {
        sequence_number: u64,
        response: Response,
        error: ApiError,
    },

    #[serde(rename = "response.cancelled")]
    ResponseCancelled { sequence_number: u64, response: Response },

    #[serde(rename = "response.incomplete")]
    ResponseIncomplete { sequence_number: u64, response: Response },

    #[serde(rename = "response.requires_action")]
    ResponseRequiresAction { sequence_number: u64, response: Response },
}

impl StreamEvent {
    pub fn sequence_number(&self) -> u64 {
        match self {
            StreamEvent::ResponseCreated { sequence_number, .. }
            | StreamEvent::ResponseInProgress { sequence_number, .. }
            | StreamEvent::OutputItemAdded { sequence_number, .. }
            | StreamEvent::ContentPartAdded { sequence_number, .. }
            | StreamEvent::OutputTextDelta { sequence_number, .. }
            | StreamEvent::OutputTextDone { sequence_number, .. }
            | StreamEvent::FunctionCallArgumentsDelta { sequence_number, .. }
            | StreamEvent::FunctionCallArgumentsDone { sequence_number, .. }
            | StreamEvent::ReasoningDelta { sequence_number, .. }
            | StreamEvent::CodeInterpreterInProgress { sequence_number, .. }
            | StreamEvent::CodeInterpreterInterpreting { sequence_number, .. }
            | StreamEvent::CodeInterpreterCompleted { sequence_number, .. }
            | StreamEvent::ContentPartDone { sequence_number, .. }
            | StreamEvent::OutputItemDone { sequence_number, .. }
            | StreamEvent::ResponseCompleted { sequence_number, .. }
            | StreamEvent::ResponseFailed { sequence_number, .. }
            | StreamEvent::ResponseCancelled { sequence_number, .. }
            | StreamEvent::ResponseIncomplete { sequence_number, .. }
            | StreamEvent::ResponseRequiresAction { sequence_number, .. } => *sequence_number,
        }
    }

    /// True for the five terminal event kinds; the writer
    /// accepts no further `WriteEvent` calls once one of these is sent.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StreamEvent::ResponseCompleted { .. }
                | StreamEvent::ResponseFailed { .. }
                | StreamEvent::ResponseCancelled { .. }
                | StreamEvent::ResponseIncomplete { .. }
                | StreamEvent::ResponseRequiresAction { .. }
        )
    }

    /// The wire `type` discriminant, e.g. `"response.output_text.delta"`.
    /// Derived by serializing and reading back the `type` field rather than
    /// hand-duplicating every rename string, so the two can never drift.
    pub fn type_name(&self) -> String {
        let value = serde_json::to_value(self).expect("StreamEvent always serializes");
        value["type"].as_str().expect("tag is always a string").to_string()
    }
}
