//! Webhook event model and callback envelope parsing.
//!
//! The platform posts one JSON envelope per callback. The envelope's
//! discriminant is whichever trigger payload it carries:
//!
//! - `message_delivery_report` → [`EventType::Delivery`]
//! - `message_submit_notification` → [`EventType::Submission`]
//!
//! Anything else parses to [`ParsedCallback::Unknown`] and is dropped by the
//! receiver without being stored.

use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::utilities::errors::WebhookParseError;

/// Kind of a stored webhook event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    #[serde(rename = "MESSAGE_DELIVERY")]
    Delivery,
    #[serde(rename = "MESSAGE_SUBMIT")]
    Submission,
}

impl EventType {
    /// Trigger name, as stored in the `type` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Delivery => "MESSAGE_DELIVERY",
            Self::Submission => "MESSAGE_SUBMIT",
        }
    }

    pub fn from_trigger(trigger: &str) -> Option<Self> {
        match trigger {
            "MESSAGE_DELIVERY" => Some(Self::Delivery),
            "MESSAGE_SUBMIT" => Some(Self::Submission),
            _ => None,
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An event ready to be inserted. Has no id yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewWebhookEvent {
    pub event_type: EventType,
    /// Application that owns the message.
    pub owner_id: String,
    pub event_time: DateTime<Utc>,
    pub message_id: String,
    /// Channel identity, serialized as JSON.
    pub channel_identity: String,
    pub status: Option<String>,
    /// Failure reason, serialized as JSON.
    pub reason: Option<String>,
    /// Submitted message, serialized as JSON.
    pub submitted_payload: Option<String>,
}

impl NewWebhookEvent {
    /// Event time in the stored text form (RFC 3339, nanosecond precision,
    /// UTC). The form is fixed width, so lexicographic order is
    /// chronological order.
    pub fn event_time_text(&self) -> String {
        format_event_time(&self.event_time)
    }
}

/// A persisted webhook event row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WebhookEvent {
    pub id: i64,
    pub event_type: EventType,
    pub owner_id: String,
    pub event_time: String,
    pub message_id: String,
    pub channel_identity: String,
    pub status: Option<String>,
    pub reason: Option<String>,
    pub submitted_payload: Option<String>,
}

/// Outcome of parsing a callback body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedCallback {
    /// A delivery or submission event to store.
    Event(NewWebhookEvent),
    /// A callback this server does not store, with its discriminant.
    Unknown(String),
}

pub fn format_event_time(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

#[derive(Debug, Deserialize)]
struct CallbackEnvelope {
    app_id: Option<String>,
    event_time: Option<String>,
    message_delivery_report: Option<DeliveryReport>,
    message_submit_notification: Option<SubmitNotification>,
    #[serde(flatten)]
    rest: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct DeliveryReport {
    message_id: Option<String>,
    channel_identity: Option<Value>,
    status: Option<String>,
    reason: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct SubmitNotification {
    message_id: Option<String>,
    channel_identity: Option<Value>,
    submitted_message: Option<Value>,
}

/// Top-level envelope fields that are metadata, not trigger payloads.
const ENVELOPE_METADATA: &[&str] = &[
    "project_id",
    "accepted_time",
    "message_metadata",
    "correlation_id",
];

/// Parse a raw callback body.
pub fn parse_callback(body: &[u8]) -> Result<ParsedCallback, WebhookParseError> {
    let envelope: CallbackEnvelope = serde_json::from_slice(body)?;

    let (event_type, message_id, channel_identity, status, reason, submitted) =
        if let Some(report) = envelope.message_delivery_report {
            (
                EventType::Delivery,
                report.message_id,
                report.channel_identity,
                report.status,
                report.reason,
                None,
            )
        } else if let Some(notification) = envelope.message_submit_notification {
            (
                EventType::Submission,
                notification.message_id,
                notification.channel_identity,
                None,
                None,
                notification.submitted_message,
            )
        } else {
            let trigger = envelope
                .rest
                .iter()
                .find(|(key, value)| value.is_object() && !ENVELOPE_METADATA.contains(&key.as_str()))
                .map(|(key, _)| key.clone())
                .unwrap_or_else(|| "unknown".to_string());
            return Ok(ParsedCallback::Unknown(trigger));
        };

    let owner_id = non_empty(envelope.app_id).ok_or(WebhookParseError::MissingField("app_id"))?;
    let raw_time =
        non_empty(envelope.event_time).ok_or(WebhookParseError::MissingField("event_time"))?;
    let event_time = DateTime::parse_from_rfc3339(&raw_time)
        .map_err(|_| WebhookParseError::InvalidTime(raw_time.clone()))?
        .with_timezone(&Utc);
    let message_id = non_empty(message_id).ok_or(WebhookParseError::MissingField("message_id"))?;
    let channel_identity = channel_identity
        .filter(|v| !v.is_null())
        .ok_or(WebhookParseError::MissingField("channel_identity"))?;

    Ok(ParsedCallback::Event(NewWebhookEvent {
        event_type,
        owner_id,
        event_time,
        message_id,
        channel_identity: channel_identity.to_string(),
        status,
        reason: to_json_text(reason),
        submitted_payload: to_json_text(submitted),
    }))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn to_json_text(value: Option<Value>) -> Option<String> {
    value.filter(|v| !v.is_null()).map(|v| v.to_string())
}
