//! Route handlers for the `/v1/responses` surface plus health checks.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Json, Response};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt as _;
use tokio_util::sync::CancellationToken;

use crate::auth::{authenticate_chain, Identity};
use crate::engine::CreateResponseRequest;
use crate::error::{GatewayError, Result};
use crate::protocol::ids;
use crate::store::ListResponsesOptions;

use super::state::AppState;

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({"error": {"type": "unauthorized", "message": "missing or invalid credentials"}})),
    )
        .into_response()
}

/// `ErrorKind` has no 415 member, so an unsupported `Content-Type` bypasses
/// the closed taxonomy the same way `unauthorized()` bypasses it for 401.
fn unsupported_media_type() -> Response {
    (
        StatusCode::UNSUPPORTED_MEDIA_TYPE,
        Json(json!({"error": {"type": "unsupported_media_type", "message": "Content-Type must be application/json"}})),
    )
        .into_response()
}

async fn authenticate(state: &AppState, headers: &HeaderMap) -> std::result::Result<Identity, Response> {
    let raw = headers.get(axum::http::header::AUTHORIZATION).and_then(|v| v.to_str().ok());
    match authenticate_chain(&state.authenticators, raw, state.default_reject).await {
        Ok(Some(identity)) => Ok(identity),
        Ok(None) => Err(unauthorized()),
        Err(err) => Err(err.into_response()),
    }
}

fn validate_response_id(id: &str) -> Result<()> {
    if ids::is_valid(id, ids::RESPONSE_PREFIX) {
        Ok(())
    } else {
        Err(GatewayError::invalid_request(format!("'{id}' is not a valid response id")))
    }
}

/// `POST /v1/responses`. `Content-Type` and body-size
/// enforcement happen in `router::build` via `DefaultBodyLimit` and an
/// explicit content-type guard; this handler only decodes and dispatches.
pub async fn create_response(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let identity = match authenticate(&state, &headers).await {
        Ok(identity) => identity,
        Err(response) => return response,
    };

    let content_type = headers.get(axum::http::header::CONTENT_TYPE).and_then(|v| v.to_str().ok());
    if !matches!(content_type, Some(ct) if ct.starts_with("application/json")) {
        return unsupported_media_type();
    }

    let request: CreateResponseRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(err) => return GatewayError::invalid_request(format!("invalid JSON body: {err}")).into_response(),
    };

    let tenant_id = identity.tenant_id.clone();
    if let Err(err) = state.engine.precheck(tenant_id.as_deref(), &request).await {
        return err.into_response();
    }

    if request.stream {
        stream_response(state, tenant_id, request).await
    } else {
        buffered_response(state, tenant_id, request).await
    }
}

async fn buffered_response(state: AppState, tenant_id: Option<String>, request: CreateResponseRequest) -> Response {
    let mut writer = crate::writer::BufferedWriter::new();
    let cancel = CancellationToken::new();
    match state.engine.create_response(tenant_id.as_deref(), request, &mut writer, cancel).await {
        Ok(Some(response)) => Json(response).into_response(),
        Ok(None) => GatewayError::server_error("buffered request produced no response").into_response(),
        Err(err) => err.into_response(),
    }
}

async fn stream_response(state: AppState, tenant_id: Option<String>, request: CreateResponseRequest) -> Response {
    let (tx, rx) = mpsc::channel::<std::result::Result<bytes::Bytes, std::io::Error>>(32);
    let mut writer = crate::writer::SseWriter::new(tx);
    let cancel = CancellationToken::new();

    // `on_first_created` fires synchronously from inside `write_event`, so it
    // can only hand the id to a spawned task, not register it directly; the
    // same slot lets the cleanup below find the id again once the engine
    // returns, to remove the registry entry on normal completion.
    let response_id: Arc<std::sync::Mutex<Option<String>>> = Arc::new(std::sync::Mutex::new(None));
    let in_flight = state.in_flight.clone();
    {
        let in_flight = in_flight.clone();
        let cancel = cancel.clone();
        let response_id = response_id.clone();
        writer.on_first_created(Box::new(move |id: &str| {
            *response_id.lock().unwrap() = Some(id.to_string());
            let in_flight = in_flight.clone();
            let cancel = cancel.clone();
            let id = id.to_string();
            tokio::spawn(async move { in_flight.register(id, cancel).await });
        }));
    }

    let engine = state.engine.clone();
    tokio::spawn(async move {
        // Any `Err` here can only originate before the writer's first call
        // (precheck already ran the same validation), so no SSE bytes have
        // been sent; the channel simply closes and the client sees an empty
        // stream, which is acceptable for this vanishingly rare race.
        let _ = engine.create_response(tenant_id.as_deref(), request, &mut writer, cancel).await;
        if let Some(id) = response_id.lock().unwrap().clone() {
            in_flight.remove(&id).await;
        }
    });

    let stream = ReceiverStream::new(rx).map(|chunk| match chunk {
        Ok(bytes) => Ok(Event::default().data(String::from_utf8_lossy(&bytes).into_owned())),
        Err(err) => Err(err),
    });

    Sse::new(stream).keep_alive(KeepAlive::default()).into_response()
}

/// `GET /v1/responses/{id}`.
pub async fn get_response(State(state): State<AppState>, headers: HeaderMap, Path(id): Path<String>) -> Response {
    let identity = match authenticate(&state, &headers).await {
        Ok(identity) => identity,
        Err(response) => return response,
    };
    if let Err(err) = validate_response_id(&id) {
        return err.into_response();
    }
    let Some(store) = &state.store else {
        return GatewayError::not_found("no response store configured").into_response();
    };
    match store.get_response(identity.tenant_id.as_deref(), &id).await {
        Ok(response) => Json(response).into_response(),
        Err(err) => err.into_response(),
    }
}

/// `DELETE /v1/responses/{id}` — cancels in-flight work first, falling back
/// to a soft-delete in the store.
pub async fn delete_response(State(state): State<AppState>, headers: HeaderMap, Path(id): Path<String>) -> Response {
    let identity = match authenticate(&state, &headers).await {
        Ok(identity) => identity,
        Err(response) => return response,
    };
    if let Err(err) = validate_response_id(&id) {
        return err.into_response();
    }

    let cancelled = state.in_flight.cancel(&id).await;
    let Some(store) = &state.store else {
        return GatewayError::not_found("no response store configured").into_response();
    };
    match store.delete_response(identity.tenant_id.as_deref(), &id).await {
        Ok(response) => Json(response).into_response(),
        Err(err) if cancelled => {
            // Cancelled in-flight but the store has no record of it yet
            // (e.g. `store: false`): acknowledge the cancellation anyway.
            let _ = err;
            StatusCode::OK.into_response()
        }
        Err(err) => err.into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub before: Option<String>,
    pub after: Option<String>,
    pub limit: Option<u32>,
    #[serde(default)]
    pub order: Option<String>,
}

impl From<PageQuery> for ListResponsesOptions {
    fn from(q: PageQuery) -> Self {
        Self {
            before: q.before,
            after: q.after,
            limit: q.limit,
            order_desc: matches!(q.order.as_deref(), Some("desc")),
        }
    }
}

#[derive(Serialize)]
struct PageEnvelope<T: Serialize> {
    object: &'static str,
    data: Vec<T>,
    has_more: bool,
    first_id: Option<String>,
    last_id: Option<String>,
}

/// `GET /v1/responses/{id}/input_items`.
pub async fn get_input_items(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Query(query): Query<PageQuery>,
) -> Response {
    let identity = match authenticate(&state, &headers).await {
        Ok(identity) => identity,
        Err(response) => return response,
    };
    if let Err(err) = validate_response_id(&id) {
        return err.into_response();
    }
    let Some(store) = &state.store else {
        return GatewayError::not_found("no response store configured").into_response();
    };
    match store.get_input_items(identity.tenant_id.as_deref(), &id, query.into()).await {
        Ok(page) => Json(PageEnvelope {
            object: "list",
            data: page.data,
            has_more: page.has_more,
            first_id: page.first_id,
            last_id: page.last_id,
        })
        .into_response(),
        Err(err) => err.into_response(),
    }
}

/// `GET /healthz` — unauthenticated, returns `200` once the process can
/// accept requests at all.
pub async fn healthz() -> StatusCode {
    StatusCode::OK
}

/// `GET /readyz` — unauthenticated; `200` only once the backend and store
/// (when configured) report healthy.
pub async fn readyz(State(state): State<AppState>) -> Response {
    if let Some(store) = &state.store {
        if let Err(err) = store.health_check().await {
            return (StatusCode::SERVICE_UNAVAILABLE, Json(json!({"error": err.to_api_error()}))).into_response();
        }
    }
    StatusCode::OK.into_response()
}
