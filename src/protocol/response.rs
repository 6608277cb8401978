//! `Response` and its status state machine.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::usage::Usage;

use super::item::Item;

/// State machine governing a [`Response`]'s lifecycle.
///
/// ```text
/// initial -> {queued, in_progress}
/// queued -> in_progress
/// in_progress -> {completed, failed, cancelled, incomplete, requires_action}
/// ```
/// The five variants after `in_progress` are terminal: no outgoing
/// transition is valid from any of them. `requires_action` is terminal from
/// the server's point of view even though the conversation itself continues
/// in a follow-up request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    Queued,
    InProgress,
    Completed,
    Failed,
    Cancelled,
    Incomplete,
    RequiresAction,
}

impl ResponseStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, ResponseStatus::Queued | ResponseStatus::InProgress)
    }

    /// Validates a transition against the response status state machine.
    /// `None` for `from` models the `initial` pseudo-state.
    pub fn can_transition(from: Option<ResponseStatus>, to: ResponseStatus) -> bool {
        match from {
            None => matches!(to, ResponseStatus::Queued | ResponseStatus::InProgress),
            Some(ResponseStatus::Queued) => matches!(to, ResponseStatus::InProgress),
            Some(ResponseStatus::InProgress) => matches!(
                to,
                ResponseStatus::Completed
                    | ResponseStatus::Failed
                    | ResponseStatus::Cancelled
                    | ResponseStatus::Incomplete
                    | ResponseStatus::RequiresAction
            ),
            Some(terminal) => {
                debug_assert!(terminal.is_terminal());
                false
            }
        }
    }
}

/// The subset of request controls that a [`Response`] echoes verbatim, per
/// testable property 12. Grouping them lets `CreateResponseRequest` and
/// `Response` share one struct instead of repeating each field twice.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestControls {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_logprobs: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_format: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parallel_tool_calls: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tool_calls: Option<u32>,
}

/// A realized turn of inference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub id: String,
    #[serde(rename = "object")]
    pub object: &'static str,
    pub created_at: i64,
    pub model: String,
    pub status: ResponseStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_response_id: Option<String>,
    pub output: Vec<Item>,
    pub usage: Usage,
    #[serde(flatten)]
    pub controls: RequestControls,
    /// Set when `status == incomplete`; names why the loop stopped early.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub incomplete_reason: Option<String>,
    /// `false` when the request opted out with `store: false`; governs
    /// whether the engine calls `ResponseStore::save`.
    #[serde(skip)]
    pub store: bool,
    /// Soft-delete marker as seen by `GetResponse`; `GetResponseForChain`
    /// ignores this.
    #[serde(skip)]
    pub deleted: bool,
}

impl Response {
    pub fn new(id: String, model: String, created_at: i64) -> Self {
        Self {
            id,
            object: "response",
            created_at,
            model,
            status: ResponseStatus::InProgress,
            previous_response_id: None,
            output: Vec::new(),
            usage: Usage::default(),
            controls: RequestControls::default(),
            incomplete_reason: None,
            store: true,
            deleted: false,
        }
    }

    /// Applies a status transition, validating it against the state
    /// machine. Returns an error carrying the invalid pair rather than
    /// panicking, since the caller (engine) may want to report it as
    /// `server_error` rather than crash the request.
    pub fn transition_to(&mut self, to: ResponseStatus) -> Result<(), (ResponseStatus, ResponseStatus)> {
        if ResponseStatus::can_transition(Some(self.status), to) {
            self.status = to;
            Ok(())
        } else {
            Err((self.status, to))
        }
    }

    /// Every `function_call_output` in `output` must reference a
    /// `function_call` whose `call_id` is present either earlier in
    /// `output` or among `history` (the reconstructed ancestor items).
    pub fn function_call_outputs_are_grounded(&self, history: &[Item]) -> bool {
        let known_call_ids: std::collections::HashSet<&str> = history
            .iter()
            .chain(self.output.iter())
            .filter_map(|item| match item {
                Item::FunctionCall { call_id, .. } => Some(call_id.as_str()),
                _ => None,
            })
            .collect();

        self.output.iter().all(|item| match item {
            Item::FunctionCallOutput { call_id, .. } => known_call_ids.contains(call_id.as_str()),
            _ => true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_transitions_allowed() {
        assert!(ResponseStatus::can_transition(None, ResponseStatus::Queued));
        assert!(ResponseStatus::can_transition(None, ResponseStatus::InProgress));
        assert!(!ResponseStatus::can_transition(None, ResponseStatus::Completed));
    }

    #[test]
    fn queued_only_advances_to_in_progress() {
        assert!(ResponseStatus::can_transition(
            Some(ResponseStatus::Queued),
            ResponseStatus::InProgress
        ));
        assert!(!ResponseStatus::can_transition(
            Some(ResponseStatus::Queued),
            ResponseStatus::Completed
        ));
    }

    #[test]
    fn terminal_states_have_no_outgoing_transitions() {
        for terminal in [
            ResponseStatus::Completed,
            ResponseStatus::Failed,
            ResponseStatus::Cancelled,
            ResponseStatus::Incomplete,
            ResponseStatus::RequiresAction,
        ] {
            assert!(terminal.is_terminal());
            assert!(!ResponseStatus::can_transition(Some(terminal), ResponseStatus::InProgress));
            assert!(!ResponseStatus::can_transition(Some(terminal), ResponseStatus::Completed));
        }
    }

    #[test]
    fn transition_to_mutates_on_success_only() {
        let mut resp = Response::new("resp_abc".into(), "m".into(), 0);
        assert_eq!(resp.status, ResponseStatus::InProgress);
        assert!(resp.transition_to(ResponseStatus::Completed).is_ok());
        assert_eq!(resp.status, ResponseStatus::Completed);
        assert!(resp.transition_to(ResponseStatus::InProgress).is_err());
        assert_eq!(resp.status, ResponseStatus::Completed);
    }

    #[test]
    fn grounded_output_checks_history_and_self() {
        let mut resp = Response::new("resp_abc".into(), "m".into(), 0);
        resp.output.push(Item::new_function_call_output("call_1", "ok", false));
        assert!(!resp.function_call_outputs_are_grounded(&[]));

        let history = vec![Item::new_function_call("call_1", "get_weather", "{}")];
        assert!(resp.function_call_outputs_are_grounded(&history));
    }
}
