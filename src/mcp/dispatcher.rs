//! Tool and prompt dispatch table behind the MCP front-end.
//!
//! The capability registry populates the table; [`McpServer`](super::McpServer)
//! reads it to answer `tools/list`, `tools/call`, `prompts/list` and
//! `prompts/get`.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use rmcp::model::{CallToolResult, Content, Prompt, Tool};
use serde_json::{json, Value};

/// Outcome of one tool call, as text shown to the agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolResponse {
    pub text: String,
    pub is_error: bool,
}

impl ToolResponse {
    /// A successful text response.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_error: false,
        }
    }

    /// A failed call, reported to the agent as tool output.
    pub fn error(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_error: true,
        }
    }

    pub fn joined_text(&self) -> String {
        self.text.clone()
    }

    pub fn into_call_result(self) -> CallToolResult {
        let content = vec![Content::text(self.text)];
        if self.is_error {
            CallToolResult::error(content)
        } else {
            CallToolResult::success(content)
        }
    }
}

/// A callable capability.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// JSON schema of the `arguments` object.
    fn input_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    /// Run the capability. Failures are reported through
    /// [`ToolResponse::error`], never by panicking.
    async fn call(&self, arguments: Value) -> ToolResponse;
}

/// Handler for enabled capabilities whose platform client is not part of
/// this server.
pub struct UnboundHandler {
    tool_name: String,
}

impl UnboundHandler {
    pub fn new(tool_name: impl Into<String>) -> Self {
        Self {
            tool_name: tool_name.into(),
        }
    }
}

#[async_trait]
impl ToolHandler for UnboundHandler {
    async fn call(&self, _arguments: Value) -> ToolResponse {
        ToolResponse::error(format!(
            "The tool '{}' is enabled but no platform client is bound to it in this server.",
            self.tool_name
        ))
    }
}

/// A registered tool.
#[derive(Clone)]
pub struct RegisteredTool {
    pub name: String,
    pub description: String,
    pub handler: Arc<dyn ToolHandler>,
}

impl RegisteredTool {
    /// `tools/list` entry of this tool.
    pub fn to_mcp_tool(&self) -> Tool {
        let schema = match self.handler.input_schema() {
            Value::Object(map) => map,
            _ => serde_json::Map::new(),
        };
        Tool {
            name: Cow::Owned(self.name.clone()),
            title: None,
            description: Some(Cow::Owned(self.description.clone())),
            input_schema: Arc::new(schema),
            output_schema: None,
            annotations: None,
            icons: None,
            meta: None,
        }
    }
}

/// Declared prompt argument.
#[derive(Debug, Clone)]
pub struct PromptArgument {
    pub name: String,
    pub description: String,
    pub required: bool,
}

/// A prompt template rendered with `{argument}` placeholders.
#[derive(Debug, Clone)]
pub struct PromptDefinition {
    pub name: String,
    pub description: String,
    pub arguments: Vec<PromptArgument>,
    pub template: String,
}

impl PromptDefinition {
    /// `prompts/list` entry of this prompt.
    pub fn to_mcp_prompt(&self) -> Prompt {
        let arguments = self
            .arguments
            .iter()
            .map(|arg| rmcp::model::PromptArgument {
                name: arg.name.clone(),
                title: None,
                description: Some(arg.description.clone()),
                required: Some(arg.required),
            })
            .collect();
        Prompt::new(self.name.clone(), Some(self.description.clone()), Some(arguments))
    }

    /// Render the template. Every required argument must be supplied.
    pub fn render(&self, arguments: &Value) -> Result<String, String> {
        let mut text = self.template.clone();
        for arg in &self.arguments {
            match arguments.get(&arg.name).and_then(Value::as_str) {
                Some(value) => text = text.replace(&format!("{{{}}}", arg.name), value),
                None if arg.required => {
                    return Err(format!("Missing required argument '{}'", arg.name))
                }
                None => text = text.replace(&format!("{{{}}}", arg.name), ""),
            }
        }
        Ok(text)
    }
}

/// Tools and prompts currently exposed to the agent.
///
/// Ordered by name so listings are stable across runs.
#[derive(Default)]
pub struct ToolDispatcher {
    tools: BTreeMap<String, RegisteredTool>,
    prompts: BTreeMap<String, PromptDefinition>,
}

impl ToolDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every tool and prompt, ahead of a full re-registration.
    pub fn clear(&mut self) {
        self.tools.clear();
        self.prompts.clear();
    }

    pub fn register_tool(
        &mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        handler: Arc<dyn ToolHandler>,
    ) {
        let name = name.into();
        if self.tools.contains_key(&name) {
            log::warn!("Tool '{}' registered twice; keeping the latest", name);
        }
        self.tools.insert(
            name.clone(),
            RegisteredTool {
                name,
                description: description.into(),
                handler,
            },
        );
    }

    pub fn register_prompt(&mut self, prompt: PromptDefinition) {
        self.prompts.insert(prompt.name.clone(), prompt);
    }

    pub fn has_tool(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn tool(&self, name: &str) -> Option<&RegisteredTool> {
        self.tools.get(name)
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    pub fn list_tools(&self) -> Vec<Tool> {
        self.tools.values().map(RegisteredTool::to_mcp_tool).collect()
    }

    pub fn prompt(&self, name: &str) -> Option<&PromptDefinition> {
        self.prompts.get(name)
    }

    pub fn list_prompts(&self) -> Vec<&PromptDefinition> {
        self.prompts.values().collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
