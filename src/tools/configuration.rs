//! Diagnostics capability: reports every capability's status to the agent.

use async_trait::async_trait;
use serde_json::Value;

use crate::capabilities::{StatusReader, StatusTable};
use crate::mcp::dispatcher::{ToolHandler, ToolResponse};

const PREAMBLE: &str = "Here is the status of the Sinch MCP server tools. They must be displayed \
as an array, the enabled tools first with the status ✅, the disabled tools after, with the \
description of why they are disabled.\n\n";

/// Handler of `sinch-mcp-configuration`.
pub struct ConfigurationTool {
    statuses: StatusReader,
}

impl ConfigurationTool {
    pub fn new(statuses: StatusReader) -> Self {
        Self { statuses }
    }
}

#[async_trait]
impl ToolHandler for ConfigurationTool {
    async fn call(&self, _arguments: Value) -> ToolResponse {
        ToolResponse::text(render_status_table(&self.statuses.snapshot()))
    }
}

/// Markdown table of `table`, enabled capabilities first. Declaration order
/// is kept within each half.
pub fn render_status_table(table: &StatusTable) -> String {
    let mut out = String::from(PREAMBLE);
    out.push_str("| Tool Name | Status | Description |\n");
    out.push_str("|-----------|--------|-------------|\n");

    let (enabled, disabled): (Vec<_>, Vec<_>) =
        table.entries().iter().partition(|e| e.status.is_enabled());
    for entry in enabled {
        out.push_str(&format!("| {} | ✅ | Enabled |\n", entry.name));
    }
    for entry in disabled {
        out.push_str(&format!("| {} | ❌ | {} |\n", entry.name, entry.status));
    }
    out
}
