//! Axum route handlers of the webhook receiver.
//!
//! # Routes
//!
//! - `POST /`       — Platform callback; always answered with `200 OK`
//! - `GET  /health` — Returns `{"status": "ok", "version": ..., "service": "sinch-mcp"}`

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use bytes::Bytes;
use tower_http::trace::TraceLayer;

use crate::storage::EventStore;
use crate::webhooks::{parse_callback, ParsedCallback};

/// Shared state of the webhook receiver.
#[derive(Clone)]
pub struct AppState {
    /// Where parsed events are written.
    pub store: Arc<EventStore>,
}

impl AppState {
    pub fn new(store: Arc<EventStore>) -> Self {
        Self { store }
    }
}

/// Build the axum router with all routes.
pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/", post(webhook_handler))
        .route("/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET /health — liveness probe.
async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": crate::VERSION,
        "service": "sinch-mcp",
    }))
}

/// POST / — platform callback.
///
/// The body is taken raw so a malformed payload still gets a 200: the
/// platform must never be made to retry a callback. Insert failures are
/// logged and acknowledged as well.
async fn webhook_handler(State(state): State<AppState>, body: Bytes) -> StatusCode {
    match parse_callback(&body) {
        Ok(ParsedCallback::Event(event)) => {
            let message_id = event.message_id.clone();
            let event_type = event.event_type;
            match state.store.insert_async(event).await {
                Ok(id) => log::debug!(
                    "Stored {} event #{} for message {}",
                    event_type,
                    id,
                    message_id
                ),
                Err(e) => log::error!(
                    "Failed to store {} event for message {}: {}",
                    event_type,
                    message_id,
                    e
                ),
            }
        }
        Ok(ParsedCallback::Unknown(trigger)) => {
            log::info!("Ignoring webhook callback of unhandled type '{}'", trigger);
        }
        Err(e) => {
            log::warn!("Dropping malformed webhook payload: {}", e);
        }
    }
    StatusCode::OK
}
