//! HTTP adapter: axum router, route handlers, and the `GatewayError ->
//! HTTP response` mapping.

mod error;
pub mod routes;
pub mod state;

pub use state::AppState;

use axum::extract::DefaultBodyLimit;
use axum::middleware as axum_middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;

use crate::middleware::{logging, panic_response, request_id};

/// Builds the full router: routes, body-size limit, and the Recovery ->
/// RequestID -> Logging layer stack. `tower-http`'s own
/// `TraceLayer` sits innermost, giving span-scoped request/response logs in
/// addition to the summary line `logging` emits.
pub fn build(state: AppState) -> Router {
    let max_body_bytes = state.max_body_bytes;

    Router::new()
        .route("/v1/responses", post(routes::create_response))
        .route("/v1/responses/{id}", get(routes::get_response).delete(routes::delete_response))
        .route("/v1/responses/{id}/input_items", get(routes::get_input_items))
        .route("/healthz", get(routes::healthz))
        .route("/readyz", get(routes::readyz))
        .with_state(state)
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(axum_middleware::from_fn(logging))
        .layer(axum_middleware::from_fn(request_id))
        .layer(CatchPanicLayer::custom(panic_response))
}
