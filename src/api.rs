// src/api.rs
// Thin HTTP surface over the pipeline coordinator: recent events, the
// enqueue-or-fetch summary endpoint, the live SSE stream, stats, and reset.
// Handlers delegate; all sequencing lives in the pipeline.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
    Json, Router,
};
use futures::Stream;
use tower_http::cors::CorsLayer;

use crate::pipeline::{Pipeline, SummaryRequestOutcome};

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
}

pub fn create_router(pipeline: Arc<Pipeline>) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/api/events", get(recent_events))
        .route("/api/events/{id}/summary", post(request_summary))
        .route("/api/stream", get(stream))
        .route("/api/stats", get(stats))
        .route("/api/reset", post(reset))
        .layer(CorsLayer::very_permissive())
        .with_state(AppState { pipeline })
}

#[derive(serde::Deserialize)]
struct EventsQuery {
    #[serde(default = "default_limit")]
    limit: usize,
}

fn default_limit() -> usize {
    100
}

async fn recent_events(
    State(state): State<AppState>,
    Query(q): Query<EventsQuery>,
) -> Json<serde_json::Value> {
    let events = state.pipeline.store.recent_events(q.limit.min(500));
    Json(serde_json::json!({ "events": events }))
}

async fn request_summary(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> (StatusCode, Json<serde_json::Value>) {
    match state.pipeline.request_summary(&id).await {
        SummaryRequestOutcome::Stored(summary) => (
            StatusCode::OK,
            Json(serde_json::json!({ "status": "stored_summary", "summary": summary })),
        ),
        SummaryRequestOutcome::Generating => (
            StatusCode::ACCEPTED,
            Json(serde_json::json!({ "status": "generating" })),
        ),
        SummaryRequestOutcome::BudgetExhausted => (
            StatusCode::TOO_MANY_REQUESTS,
            Json(serde_json::json!({ "status": "budget_exhausted" })),
        ),
        SummaryRequestOutcome::Disabled => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({ "status": "disabled" })),
        ),
        SummaryRequestOutcome::UnknownEvent => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "status": "unknown_event" })),
        ),
        SummaryRequestOutcome::Error(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "status": "error", "error": e })),
        ),
    }
}

async fn stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let mut rx = state.pipeline.notifier.subscribe();
    let stream = async_stream::stream! {
        while let Some(msg) = rx.recv().await {
            yield Ok(Event::default().event(msg.kind.as_str()).data(msg.data));
        }
    };
    Sse::new(stream).keep_alive(KeepAlive::default())
}

async fn stats(State(state): State<AppState>) -> Json<serde_json::Value> {
    let stats = state.pipeline.stats().await;
    Json(serde_json::to_value(stats).unwrap_or_default())
}

async fn reset(State(state): State<AppState>) -> Json<serde_json::Value> {
    let drained = state.pipeline.reset().await;
    Json(serde_json::json!({ "status": "ok", "queue_drained": drained }))
}
