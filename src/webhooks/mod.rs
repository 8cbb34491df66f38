//! Inbound webhook events pushed by the platform.

pub mod event;

pub use event::{
    format_event_time, parse_callback, EventType, NewWebhookEvent, ParsedCallback, WebhookEvent,
};
