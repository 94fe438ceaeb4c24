//! GitHub webhook handler: validates, decodes and hands events to the router.

use axum::body::Bytes;
use axum::http::{HeaderMap, StatusCode};

use pv_core::error::PreviewError;
use pv_core::models::WebhookEvent;

use crate::github;
use crate::routes::AppState;

/// Answers before any routing happens. Routing runs on its own task and
/// its errors only reach the log.
pub fn handle_webhook(state: &AppState, headers: &HeaderMap, body: Bytes) -> StatusCode {
    let signature = headers
        .get("x-hub-signature-256")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    if !github::validate_signature(&state.config.webhook_secret, &body, signature) {
        tracing::warn!("webhook signature validation failed");
        return StatusCode::UNAUTHORIZED;
    }

    let event_type = headers
        .get("x-github-event")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown");

    let event = match WebhookEvent::parse(event_type, &body) {
        Ok(Some(event)) => event,
        Ok(None) => {
            tracing::debug!(event_type, "ignoring webhook event");
            return StatusCode::OK;
        }
        Err(e) => {
            tracing::warn!(event_type, error = %e, "rejecting webhook payload");
            return StatusCode::BAD_REQUEST;
        }
    };

    let router = state.router.clone();
    tokio::spawn(async move {
        match router.route(&event).await {
            Ok(jobs) => tracing::info!(event = event.kind(), jobs, "webhook processed"),
            Err(e @ PreviewError::ConfigResolution { .. }) => {
                tracing::warn!(event = event.kind(), error = %e, "webhook dropped")
            }
            Err(e) => tracing::error!(event = event.kind(), error = %e, "webhook routing failed"),
        }
    });
    StatusCode::ACCEPTED
}
