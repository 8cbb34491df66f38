//! Event query capability: the webhook events recorded for one message.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::mcp::dispatcher::{ToolHandler, ToolResponse};
use crate::storage::EventStore;
use crate::utilities::errors::StoreError;
use crate::webhooks::WebhookEvent;

enum EventSource {
    Store(Arc<EventStore>),
    /// The store could not be opened at startup.
    Unavailable(String),
}

/// Handler of `get-message-events`.
pub struct MessageEventsTool {
    source: EventSource,
}

impl MessageEventsTool {
    pub fn new(store: Arc<EventStore>) -> Self {
        Self {
            source: EventSource::Store(store),
        }
    }

    /// Handler for a process whose event store failed to open. Every call
    /// reports `error` to the agent.
    pub fn unavailable(error: &StoreError) -> Self {
        Self {
            source: EventSource::Unavailable(error.to_string()),
        }
    }
}

#[async_trait]
impl ToolHandler for MessageEventsTool {
    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "messageId": {
                    "type": "string",
                    "description": "The ID of the message to get the events for"
                }
            },
            "required": ["messageId"]
        })
    }

    async fn call(&self, arguments: Value) -> ToolResponse {
        let message_id = match arguments.get("messageId").and_then(Value::as_str) {
            Some(id) if !id.trim().is_empty() => id.trim().to_string(),
            _ => return ToolResponse::error("Missing required argument 'messageId'"),
        };

        let store = match &self.source {
            EventSource::Store(store) => store,
            EventSource::Unavailable(reason) => {
                return ToolResponse::error(format!(
                    "Unable to read the events for the message with ID {}: the event store could not be opened ({})",
                    message_id, reason
                ))
            }
        };

        match store.query_by_message_id_async(&message_id).await {
            Ok(events) if events.is_empty() => ToolResponse::text(format!(
                "No events have been received yet for the message with ID: {}",
                message_id
            )),
            Ok(events) => ToolResponse::text(render_events(&message_id, &events)),
            Err(e) => {
                log::error!("Event query for message {} failed: {}", message_id, e);
                ToolResponse::error(format!(
                    "Unable to read the events for the message with ID {}: {}",
                    message_id, e
                ))
            }
        }
    }
}

/// One table row per event, in the given order.
pub fn render_events(message_id: &str, events: &[WebhookEvent]) -> String {
    let mut reply = format!(
        "Here are the events for the message with ID: {} to present in an array\n\n",
        message_id
    );
    for e in events {
        reply.push_str(&format!(
            "| ID: {} | Type: {} | App ID: {} | Event Time: {} | Message ID: {} | Channel Identity: {} | Status: {} | Reason: {} | Submitted Message: {} |\n",
            e.id,
            e.event_type,
            e.owner_id,
            e.event_time,
            e.message_id,
            e.channel_identity,
            or_dash(&e.status),
            or_dash(&e.reason),
            or_dash(&e.submitted_payload),
        ));
    }
    reply
}

fn or_dash(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or("-")
}
