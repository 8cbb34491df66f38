//! Model Context Protocol front-end.
//!
//! The agent talks to this server over stdio through `rmcp`. Capabilities
//! are not dispatched from here directly: the capability registry decides
//! which tools exist and installs them into the shared [`ToolDispatcher`].

pub mod dispatcher;
pub mod prompts;
pub mod server;

pub use dispatcher::{PromptDefinition, ToolDispatcher, ToolHandler, ToolResponse, UnboundHandler};
pub use server::McpServer;
