//! # sinch-mcp
//!
//! MCP server exposing Sinch messaging, verification, voice and email
//! capabilities to an agent.
//!
//! Two pieces carry state:
//!
//! - the [`capabilities`] registry, which decides per process run which
//!   capabilities are usable and records why the others are not;
//! - the webhook subsystem ([`server`], [`tunnel`], [`subscription`],
//!   [`storage`]), brought up and torn down by the [`lifecycle`]
//!   coordinator, which records delivery events for `get-message-events`.

pub mod capabilities;
pub mod config;
pub mod lifecycle;
pub mod mcp;
pub mod server;
pub mod storage;
pub mod subscription;
pub mod tools;
pub mod tunnel;
pub mod utilities;
pub mod webhooks;

/// Crate version, announced in `initialize` and `/health`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use capabilities::{CapabilityRegistry, CapabilityStatus};
pub use lifecycle::{LifecycleCoordinator, LifecycleState};
pub use mcp::McpServer;
pub use storage::EventStore;
