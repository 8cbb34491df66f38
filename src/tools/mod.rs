//! Capabilities implemented inside this server.
//!
//! Every other capability is request shaping against the platform APIs and
//! is served by a handler bound at startup, or by
//! [`UnboundHandler`](crate::mcp::UnboundHandler) when none is.

pub mod configuration;
pub mod message_events;

pub use configuration::{render_status_table, ConfigurationTool};
pub use message_events::{render_events, MessageEventsTool};
