//! The inbound HTTP surface (spec §6): one handler per route, each a thin
//! translation layer between `axum` extractors and the coordinator/
//! forwarder/catalog types the rest of the workspace already exposes.

use crate::error::AppError;
use crate::native::NativeCompletionRequest;
use crate::state::AppState;
use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::stream::{Stream, StreamExt};
use modelgate_events::{Event as BusEvent, EventKind};
use modelgate_types::{CanonicalName, RequestContext};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::time::Duration;

/// Routes exempt from the bearer-token layer regardless of whether an API
/// key is configured: the admin UI's own landing asset and liveness, which
/// spec §6 requires to stay "always 200 if process alive".
pub fn public_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(crate::admin::index))
        .route("/health", get(health))
        .with_state(state)
}

/// Every other route in the surface; `lib::router` layers bearer-token
/// auth over this sub-router only, never over `public_router`.
pub fn protected_router(state: AppState) -> Router {
    Router::new()
        .route("/models", get(list_discovered_models))
        .route("/v1/models", get(list_models))
        .route("/v1/chat/completions", post(forward_openai))
        .route("/v1/completions", post(forward_openai))
        .route("/v1/embeddings", post(forward_openai))
        .route("/v1/audio/transcriptions", post(forward_openai))
        .route("/v1/audio/speech", post(forward_openai))
        .route("/completion", post(native_completion))
        .route("/completion/abort", get(abort))
        .route("/abort", get(abort))
        .route("/logs", get(logs))
        .route("/logs/stream", get(logs_stream))
        .route("/running", get(running))
        .route("/unload", post(unload))
        .with_state(state)
}

/// Liveness only: never touches the coordinator, so it stays truthful even
/// while every worker is down or a config reload is draining (spec
/// "supplemented operations").
async fn health() -> &'static str {
    "ok"
}

#[derive(Serialize)]
struct DiscoveredModelsResponse<'a> {
    count: usize,
    models: &'a std::collections::BTreeMap<String, modelgate_catalog::ModelInfo>,
}

async fn list_discovered_models(State(state): State<AppState>) -> impl IntoResponse {
    let models = state.discovery().models.as_ref();
    Json(DiscoveredModelsResponse {
        count: models.len(),
        models,
    })
}

#[derive(Serialize)]
struct OpenAiModel {
    id: String,
    object: &'static str,
    owned_by: &'static str,
}

#[derive(Serialize)]
struct OpenAiModelList {
    object: &'static str,
    data: Vec<OpenAiModel>,
}

async fn list_models(State(state): State<AppState>) -> impl IntoResponse {
    let catalog = state.coordinator().catalog().await;
    let mut data: Vec<OpenAiModel> = catalog
        .listed_canonical_names(false)
        .into_iter()
        .map(|name| OpenAiModel {
            id: name.to_string(),
            object: "model",
            owned_by: "modelgate",
        })
        .collect();

    if state.include_aliases_in_list() {
        for entry in catalog.models() {
            if entry.unlisted {
                continue;
            }
            for alias in &entry.aliases {
                data.push(OpenAiModel {
                    id: alias.clone(),
                    object: "model",
                    owned_by: "modelgate",
                });
            }
        }
    }

    Json(OpenAiModelList {
        object: "list",
        data,
    })
}

fn new_context(state: &AppState) -> RequestContext {
    RequestContext::new(uuid::Uuid::new_v4().to_string(), Some(state.default_request_timeout()))
}

/// Headers whose value axum recomputes for a streamed body; forwarding the
/// upstream's own copy would desynchronize framing (a `content-length`
/// that no longer matches what's actually streamed, a stale
/// `transfer-encoding`).
const RESPONSE_HEADERS_TO_DROP: &[&str] = &["content-length", "transfer-encoding", "connection"];

async fn forward_response(state: &AppState, path: &str, body: bytes::Bytes, headers: &HeaderMap) -> Result<Response, AppError> {
    let ctx = new_context(state);
    let forwarded = state.forwarder().forward(path, body, headers, &ctx).await?;

    let byte_stream = forwarded
        .body
        .map(|chunk| chunk.map_err(AppError::from).map_err(std::io::Error::other));

    let mut response = Response::builder().status(forwarded.status);
    for (name, value) in forwarded.headers.iter() {
        if RESPONSE_HEADERS_TO_DROP.contains(&name.as_str()) {
            continue;
        }
        response = response.header(name, value);
    }
    Ok(response
        .body(Body::from_stream(byte_stream))
        .expect("status and headers copied from a real upstream response are always valid"))
}

async fn forward_openai(
    State(state): State<AppState>,
    headers: HeaderMap,
    uri: axum::http::Uri,
    body: bytes::Bytes,
) -> Result<Response, AppError> {
    let path = uri.path_and_query().map(|p| p.as_str()).unwrap_or(uri.path());
    forward_response(&state, path, body, &headers).await
}

async fn native_completion(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: bytes::Bytes,
) -> Result<Response, AppError> {
    let request: NativeCompletionRequest =
        serde_json::from_slice(&body).map_err(|err| AppError::InvalidInput(format!("invalid JSON body: {err}")))?;
    request
        .validate()
        .map_err(|err| AppError::InvalidInput(err.to_string()))?;

    let reencoded = serde_json::to_vec(&request).expect("a validated request always re-serializes");
    forward_response(&state, "/completion", bytes::Bytes::from(reencoded), &headers).await
}

#[derive(Deserialize)]
struct ModelQuery {
    model: String,
}

async fn abort(State(state): State<AppState>, Query(q): Query<ModelQuery>) -> Result<StatusCode, AppError> {
    let catalog = state.coordinator().catalog().await;
    let canonical = catalog
        .resolve(&q.model)
        .ok_or_else(|| AppError::NotFound(format!("unknown model: {}", q.model)))?;
    drop(catalog);

    if state.coordinator().abort(&canonical).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound(format!("unknown model: {}", q.model)))
    }
}

#[derive(Serialize)]
struct LogLineResponse {
    stream: &'static str,
    line: String,
    at: chrono::DateTime<chrono::Utc>,
}

async fn logs(State(state): State<AppState>, Query(q): Query<ModelQuery>) -> Result<impl IntoResponse, AppError> {
    let catalog = state.coordinator().catalog().await;
    let canonical = catalog
        .resolve(&q.model)
        .ok_or_else(|| AppError::NotFound(format!("unknown model: {}", q.model)))?;
    drop(catalog);

    let ring = state
        .coordinator()
        .logs_for(&canonical)
        .await
        .ok_or_else(|| AppError::NotFound(format!("unknown model: {}", q.model)))?;

    let lines: Vec<LogLineResponse> = ring
        .snapshot()
        .into_iter()
        .map(|line| LogLineResponse {
            stream: match line.stream {
                modelgate_events::LogStream::Stdout => "stdout",
                modelgate_events::LogStream::Stderr => "stderr",
            },
            line: line.line,
            at: line.at,
        })
        .collect();

    Ok(Json(lines))
}

#[derive(Deserialize)]
struct LogsStreamQuery {
    model: Option<String>,
}

async fn logs_stream(
    State(state): State<AppState>,
    Query(q): Query<LogsStreamQuery>,
) -> Sse<impl Stream<Item = Result<SseEvent, Infallible>>> {
    let filter = q.model.map(CanonicalName::new);
    let subscription = state.bus().subscribe(EventKind::LOG_DATA);

    // Unfolds the subscription into an SSE stream, skipping events for
    // models the caller didn't ask about rather than filtering server-side
    // at subscribe time (the bus mask is per-kind, not per-model).
    let stream = futures::stream::unfold((subscription, filter), |(mut subscription, filter)| async move {
        loop {
            let event = subscription.recv().await?;
            let BusEvent::LogData(line) = event else { continue };
            if filter.as_ref().is_some_and(|want| want != &line.canonical) {
                continue;
            }
            let payload = LogLineResponse {
                stream: match line.stream {
                    modelgate_events::LogStream::Stdout => "stdout",
                    modelgate_events::LogStream::Stderr => "stderr",
                },
                line: line.line,
                at: line.at,
            };
            let json = serde_json::to_string(&payload).expect("a plain log line always serializes");
            return Some((Ok(SseEvent::default().data(json)), (subscription, filter)));
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}

#[derive(Serialize)]
struct RunningEntry {
    model: String,
    state: String,
    in_flight: u32,
}

async fn running(State(state): State<AppState>) -> impl IntoResponse {
    let rows = state.coordinator().list_states().await;
    let entries: Vec<RunningEntry> = rows
        .into_iter()
        .filter(|(_, s, _)| s.is_running())
        .map(|(canonical, s, in_flight)| RunningEntry {
            model: canonical.to_string(),
            state: s.to_string(),
            in_flight,
        })
        .collect();
    Json(entries)
}

async fn unload(State(state): State<AppState>) -> impl IntoResponse {
    state.coordinator().stop_all("operator requested /unload").await;
    StatusCode::NO_CONTENT
}
