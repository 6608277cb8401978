//! Recovery -> RequestID -> Logging layer stack wrapped around every HTTP
//! request. Each concern is its own `tower`/axum layer,
//! composed in `http::router` in that exact order — outermost layer added
//! last, so it sees the request first and the response last.

use std::time::Instant;

use axum::extract::Request;
use axum::http::{HeaderName, HeaderValue};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use uuid::Uuid;

use crate::error::GatewayError;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// The id resolved by [`request_id`], stashed in request extensions so
/// [`logging`] and route handlers can read it back.
#[derive(Clone)]
pub struct RequestId(pub String);

/// `tower_http::catch_panic::CatchPanicLayer` callback: turns a caught panic
/// into the same `{"error": {...}}` envelope a returned `GatewayError`
/// would produce, instead of tower-http's bare empty 500 body.
pub fn panic_response(_payload: Box<dyn std::any::Any + Send + 'static>) -> Response {
    GatewayError::server_error("internal error").into_response()
}

/// Honors an incoming `X-Request-ID`, or mints one, and stamps it on both
/// the request extensions and the response headers.
pub async fn request_id(mut request: Request, next: Next) -> Response {
    let id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().simple().to_string());

    request.extensions_mut().insert(RequestId(id.clone()));

    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&id) {
        response.headers_mut().insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
    }
    response
}

/// Logs method, path, status, duration, and request id for every request.
/// Placed innermost so its duration measurement brackets only the route
/// handler, not the other layers.
pub async fn logging(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let request_id = request.extensions().get::<RequestId>().map(|r| r.0.clone()).unwrap_or_default();

    let start = Instant::now();
    let response = next.run(request).await;
    let elapsed = start.elapsed();

    tracing::info!(
        %method,
        %path,
        %request_id,
        status = response.status().as_u16(),
        elapsed_ms = elapsed.as_millis() as u64,
        "request completed",
    );
    response
}
