//! `CreateResponseRequest`: the decoded body of `POST /v1/responses`
//!.

use serde::Deserialize;
use serde_json::Value;

use crate::error::{GatewayError, Result};
use crate::protocol::{Item, RequestControls};
use crate::tools::ToolDefinition;

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateResponseRequest {
    pub model: Option<String>,
    #[serde(default)]
    pub input: Vec<Item>,
    #[serde(default)]
    pub previous_response_id: Option<String>,
    #[serde(default)]
    pub stream: bool,
    #[serde(default = "default_true")]
    pub store: bool,
    #[serde(default)]
    pub tools: Vec<ToolDefinition>,
    #[serde(default)]
    pub tool_choice: Option<Value>,
    #[serde(default)]
    pub allowed_tools: Option<Vec<String>>,
    #[serde(default = "default_true")]
    pub parallel_tool_calls: bool,
    #[serde(default)]
    pub max_tool_calls: Option<u32>,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub top_p: Option<f64>,
    #[serde(default)]
    pub max_output_tokens: Option<u32>,
    #[serde(default)]
    pub stop: Option<Vec<String>>,
    /// Accepted and parsed but currently inert — no `include` section is
    /// ever omitted or added from the output.
    #[serde(default)]
    pub include: Option<Vec<String>>,
    #[serde(flatten)]
    pub controls: RequestControls,
}

impl CreateResponseRequest {
    /// Business-layer validation. `default_model`
    /// comes from engine configuration and is used when the request omits
    /// `model`.
    pub fn validate(&self, default_model: Option<&str>) -> Result<()> {
        if self.model.is_none() && default_model.is_none() {
            return Err(GatewayError::invalid_request("model is required"));
        }

        if self.input.is_empty() {
            return Err(GatewayError::invalid_request("input must contain at least one item"));
        }

        if let Some(Value::Object(obj)) = &self.tool_choice {
            if let Some(name) = obj.get("name").and_then(Value::as_str) {
                let known = self.tools.iter().any(|t| t.name == name);
                if !known {
                    return Err(GatewayError::invalid_request(format!(
                        "tool_choice references unknown tool '{name}'"
                    )));
                }
            }
        }

        if self.max_tool_calls == Some(0) {
            return Err(GatewayError::invalid_request("max_tool_calls must be at least 1"));
        }

        Ok(())
    }

    pub fn resolved_model(&self, default_model: Option<&str>) -> Result<String> {
        self.model
            .clone()
            .or_else(|| default_model.map(str::to_string))
            .ok_or_else(|| GatewayError::invalid_request("model is required"))
    }

    /// `tool_choice == "none"` disables the agentic loop entirely.
    pub fn tool_choice_is_none(&self) -> bool {
        matches!(&self.tool_choice, Some(Value::String(s)) if s == "none")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ContentPart;

    fn sample_input() -> Vec<Item> {
        vec![Item::new_assistant_message(vec![ContentPart::InputText { text: "hi".into() }])]
    }

    fn request() -> CreateResponseRequest {
        CreateResponseRequest {
            model: Some("m".into()),
            input: sample_input(),
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
            controls: RequestControls::default(),
        }
    }

    #[test]
    fn missing_model_and_no_default_is_rejected() {
        let mut req = request();
        req.model = None;
        assert!(req.validate(None).is_err());
        assert!(req.validate(Some("fallback")).is_ok());
    }

    #[test]
    fn empty_input_is_rejected() {
        let mut req = request();
        req.input.clear();
        assert!(req.validate(None).is_err());
    }

    #[test]
    fn forced_tool_choice_must_reference_a_declared_tool() {
        let mut req = request();
        req.tool_choice = Some(serde_json::json!({"type": "function", "name": "missing"}));
        assert!(req.validate(None).is_err());

        req.tools.push(ToolDefinition {
            name: "missing".into(),
            description: "d".into(),
            parameters: serde_json::json!({}),
        });
        assert!(req.validate(None).is_ok());
    }

    #[test]
    fn tool_choice_none_is_detected() {
        let mut req = request();
        req.tool_choice = Some(Value::String("none".into()));
        assert!(req.tool_choice_is_none());
        req.tool_choice = Some(Value::String("auto".into()));
        assert!(!req.tool_choice_is_none());
    }

    #[test]
    fn resolved_model_prefers_request_over_default() {
        let req = request();
        assert_eq!(req.resolved_model(Some("fallback")).unwrap(), "m");
        let mut req = request();
        req.model = None;
        assert_eq!(req.resolved_model(Some("fallback")).unwrap(), "fallback");
    }
}
