//! HTTP routes: webhook ingestion, status and health.

pub mod status;
pub mod webhook;

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;

use pv_core::services::router::EventRouter;
use pv_core::services::store::RecordStore;

use crate::config::ServerConfig;

/// Shared state for route handlers.
#[derive(Clone)]
pub struct AppState {
    pub router: Arc<EventRouter>,
    pub store: Arc<RecordStore>,
    pub config: ServerConfig,
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/webhook", post(webhook_handler))
        .route("/status", get(status_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

async fn webhook_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    webhook::handle_webhook(&state, &headers, body)
}

async fn status_handler(State(state): State<AppState>) -> Json<status::StatusResponse> {
    Json(status::StatusResponse::from_snapshot(&state.store.snapshot().await))
}

async fn health_handler() -> &'static str {
    "ok"
}
