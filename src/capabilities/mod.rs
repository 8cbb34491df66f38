//! # Capability Registry
//!
//! Declares every capability the server can expose and decides, once per
//! registration pass, which of them are usable.
//!
//! ## Resolution
//!
//! 1. The process starts with a list of activation tags (`--tags`).
//! 2. `CapabilityRegistry::register` walks the descriptor table in order.
//! 3. A capability is enabled iff the tags select it and every required
//!    environment key is present.
//! 4. Enabled capabilities are installed in the MCP dispatcher; all of them,
//!    enabled or not, land in the status table read by the diagnostics tool.

pub mod capability;
pub mod registry;
pub mod status;
pub mod tags;

pub use capability::{
    CapabilityDescriptor, CapabilityKey, BUILTIN_CAPABILITIES, CONFIGURATION,
    CONFIGURATION_TOOL_NAME, GET_MESSAGE_EVENTS_TOOL_NAME,
};
pub use registry::CapabilityRegistry;
pub use status::{CapabilityStatus, DisabledReason, StatusEntry, StatusReader, StatusTable};
pub use tags::{matches_any_tag, ActiveTags, WILDCARD_TAG};
