//! Maps [`GatewayError`] to the `{"error": {...}}` JSON envelope and HTTP
//! status. Only covers the pre-stream path; once an SSE body
//! has started, the engine itself writes a `response.failed` event instead
//! of returning an error here (see `engine::orchestrator::Engine::create_response`).

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::error::{ApiError, GatewayError};

#[derive(Serialize)]
struct ErrorEnvelope {
    error: ApiError,
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.kind().http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = ErrorEnvelope { error: self.to_api_error() };
        (status, Json(body)).into_response()
    }
}
