//! Webhook receiver: the local HTTP listener the platform pushes events to.
//!
//! # Endpoints
//!
//! - `POST /`       — Platform callback (delivery reports, submit notifications)
//! - `GET  /health` — Liveness probe

pub mod receiver;
pub mod routes;

pub use receiver::{BoundReceiver, WebhookReceiver};
pub use routes::{app_router, AppState};
