//! Error taxonomy for the gateway.
//!
//! Every layer — transport, engine, backend client, tool registry — converts
//! its failures into a single [`GatewayError`] carrying one of the closed
//! [`ErrorKind`] variants. This is the type that the HTTP adapter maps to a
//! status code and the streaming writer maps to a `response.failed` event.

use serde::Serialize;
use thiserror::Error;

/// Result type alias used across the gateway.
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Closed error taxonomy independent of transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Client-side bad input: malformed JSON, missing required field, invalid
    /// parameter range, referentially invalid `tool_choice`.
    InvalidRequest,
    /// Requested resource (response, input item) does not exist or is
    /// soft-deleted from the caller's perspective.
    NotFound,
    /// Throttling, either by this gateway or echoed from the backend.
    TooManyRequests,
    /// Internal failure: panic, I/O error, store failure, writer failure.
    ServerError,
    /// The backend (Chat Completions provider) failed or returned a 5xx.
    ModelError,
}

impl ErrorKind {
    /// Maps a kind to the HTTP status the adapter returns for it.
    pub fn http_status(self) -> u16 {
        match self {
            ErrorKind::InvalidRequest => 400,
            ErrorKind::NotFound => 404,
            ErrorKind::TooManyRequests => 429,
            ErrorKind::ServerError => 500,
            ErrorKind::ModelError => 500,
        }
    }
}

/// The `{"error": {...}}` envelope used both in HTTP bodies and in-band in
/// `response.failed` streaming events.
#[derive(Debug, Clone, Serialize)]
pub struct ApiError {
    #[serde(rename = "type")]
    pub kind: ErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub param: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl ApiError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            param: None,
            code: None,
        }
    }

    pub fn with_param(mut self, param: impl Into<String>) -> Self {
        self.param = Some(param.into());
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }
}

/// Top-level error type. Carries enough context to classify into an
/// [`ErrorKind`] and to render a human message; the lower-level cause chain
/// is for logging, not for clients.
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("too many requests: {0}")]
    TooManyRequests(String),

    #[error("server error: {0}")]
    ServerError(String),

    #[error("model error: {0}")]
    ModelError(String),

    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl GatewayError {
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        GatewayError::InvalidRequest(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        GatewayError::NotFound(msg.into())
    }

    pub fn too_many_requests(msg: impl Into<String>) -> Self {
        GatewayError::TooManyRequests(msg.into())
    }

    pub fn server_error(msg: impl Into<String>) -> Self {
        GatewayError::ServerError(msg.into())
    }

    pub fn model_error(msg: impl Into<String>) -> Self {
        GatewayError::ModelError(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        GatewayError::Config(msg.into())
    }

    /// Classifies the error into the closed taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            GatewayError::InvalidRequest(_) => ErrorKind::InvalidRequest,
            GatewayError::NotFound(_) => ErrorKind::NotFound,
            GatewayError::TooManyRequests(_) => ErrorKind::TooManyRequests,
            GatewayError::ModelError(_) => ErrorKind::ModelError,
            GatewayError::Http(_) => ErrorKind::ModelError,
            GatewayError::ServerError(_)
            | GatewayError::Json(_)
            | GatewayError::Config(_)
            | GatewayError::Io(_) => ErrorKind::ServerError,
        }
    }

    /// Converts to the wire-level `ApiError` payload.
    pub fn to_api_error(&self) -> ApiError {
        ApiError::new(self.kind(), self.to_string())
    }

    /// True for failures the engine may retry once on a buffered request
    ///: backend 5xx and network-class errors.
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::ModelError | ErrorKind::ServerError)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_maps_to_http_status() {
        assert_eq!(ErrorKind::InvalidRequest.http_status(), 400);
        assert_eq!(ErrorKind::NotFound.http_status(), 404);
        assert_eq!(ErrorKind::TooManyRequests.http_status(), 429);
        assert_eq!(ErrorKind::ServerError.http_status(), 500);
        assert_eq!(ErrorKind::ModelError.http_status(), 500);
    }

    #[test]
    fn retryable_classification() {
        assert!(GatewayError::model_error("backend 503").is_retryable());
        assert!(!GatewayError::invalid_request("bad field").is_retryable());
        assert!(!GatewayError::not_found("resp_x").is_retryable());
        assert!(!GatewayError::too_many_requests("slow down").is_retryable());
    }

    #[test]
    fn api_error_builders() {
        let err = ApiError::new(ErrorKind::InvalidRequest, "bad model")
            .with_param("model")
            .with_code("missing_field");
        assert_eq!(err.param.as_deref(), Some("model"));
        assert_eq!(err.code.as_deref(), Some("missing_field"));
    }
}
