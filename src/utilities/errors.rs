//! Error types for the webhook subsystem and capability registry.
//!
//! None of these are allowed to take the process down: configuration and
//! webhook-startup errors degrade the subsystem, store errors surface as
//! user-visible tool output, parse errors are acknowledged and dropped.

use thiserror::Error;

/// One or more required environment keys are absent.
///
/// Recorded in the capability status map, never returned to a caller.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("missing configuration keys: {}", missing.join(", "))]
pub struct ConfigurationMissing {
    /// Every missing key, in declaration order.
    pub missing: Vec<String>,
}

/// Errors from the tunnel provider.
#[derive(Debug, Error)]
pub enum TunnelError {
    /// No tunnel credential is configured, or the provider refused to
    /// allocate a public endpoint.
    #[error("tunnel unavailable: {0}")]
    Unavailable(String),

    /// The provider did not report a public URL in time.
    #[error("tunnel negotiation timed out after {0}s")]
    Timeout(u64),

    /// The tunnel agent process could not be spawned or controlled.
    #[error("tunnel process error: {0}")]
    Process(#[from] std::io::Error),
}

/// Errors from the remote subscription service.
#[derive(Debug, Error)]
pub enum SubscriptionError {
    /// Registration credentials or the application id are absent.
    #[error("subscription unavailable: {0}")]
    Unavailable(String),

    /// The OAuth token exchange failed.
    #[error("authentication with the platform failed: {0}")]
    Auth(String),

    /// The platform answered with a non-success status.
    #[error("platform returned {status}: {body}")]
    Status { status: u16, body: String },

    /// Transport-level HTTP failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The platform did not answer in time.
    #[error("subscription request timed out after {0}s")]
    Timeout(u64),
}

/// A webhook body that could not be turned into an event.
#[derive(Debug, Error)]
pub enum WebhookParseError {
    #[error("malformed JSON payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("missing field '{0}'")]
    MissingField(&'static str),

    #[error("invalid event_time '{0}'")]
    InvalidTime(String),
}

/// Errors from the persisted event store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("event store is closed")]
    Closed,

    #[error("store task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Errors that abort lifecycle startup.
///
/// Only binding the local receiver is fatal to the webhook subsystem; every
/// later step degrades instead of failing.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("failed to bind webhook receiver: {0}")]
    Bind(#[source] std::io::Error),

    #[error("lifecycle already started (state: {0})")]
    AlreadyStarted(String),
}
