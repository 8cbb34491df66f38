//! MCP server on `rmcp`.
//!
//! Framing, `initialize`, `ping` and notifications are handled by the `rmcp`
//! service loop; tool and prompt requests are answered from the shared
//! [`ToolDispatcher`] the capability registry fills.

use std::sync::Arc;

use parking_lot::RwLock;
use rmcp::model::{
    CallToolRequestParam, CallToolResult, GetPromptRequestParam, GetPromptResult, Implementation,
    ListPromptsResult, ListToolsResult, PaginatedRequestParam, Prompt, PromptMessage,
    PromptMessageRole, ProtocolVersion, ServerCapabilities, ServerInfo, Tool,
};
use rmcp::service::RequestContext;
use rmcp::{ErrorData, RoleServer, ServerHandler, ServiceExt};
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};

use super::dispatcher::ToolDispatcher;

/// Name announced in `initialize`.
pub const SERVER_NAME: &str = "Sinch";

/// The MCP front-end.
#[derive(Clone)]
pub struct McpServer {
    dispatcher: Arc<RwLock<ToolDispatcher>>,
    version: String,
}

impl McpServer {
    pub fn new(dispatcher: Arc<RwLock<ToolDispatcher>>) -> Self {
        Self {
            dispatcher,
            version: crate::VERSION.to_string(),
        }
    }

    /// Shared dispatch table, for (re-)registration.
    pub fn dispatcher(&self) -> Arc<RwLock<ToolDispatcher>> {
        Arc::clone(&self.dispatcher)
    }

    /// Serve on stdin/stdout until the client disconnects.
    pub async fn serve_stdio(self) -> anyhow::Result<()> {
        self.serve_io(tokio::io::stdin(), tokio::io::stdout()).await
    }

    /// Serve one session over a byte stream pair until the peer closes it.
    pub async fn serve_io<R, W>(self, reader: R, writer: W) -> anyhow::Result<()>
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let service = self.serve((reader, writer)).await?;
        let reason = service.waiting().await?;
        log::info!("MCP session ended: {:?}", reason);
        Ok(())
    }

    pub fn tools(&self) -> Vec<Tool> {
        self.dispatcher.read().list_tools()
    }

    /// Run the tool `name`. An unknown tool is an invalid-params error; a
    /// failing tool is a successful call carrying `isError`.
    pub async fn call(&self, name: &str, arguments: Value) -> Result<CallToolResult, ErrorData> {
        // Release the table lock before awaiting the handler.
        let handler = {
            let dispatcher = self.dispatcher.read();
            dispatcher.tool(name).map(|tool| Arc::clone(&tool.handler))
        };
        let handler = handler.ok_or_else(|| {
            ErrorData::invalid_params(format!("Unknown tool: {}", name), None)
        })?;

        log::debug!("Calling tool '{}'", name);
        Ok(handler.call(arguments).await.into_call_result())
    }

    pub fn prompts(&self) -> Vec<Prompt> {
        self.dispatcher
            .read()
            .list_prompts()
            .into_iter()
            .map(|prompt| prompt.to_mcp_prompt())
            .collect()
    }

    pub fn render_prompt(&self, name: &str, arguments: &Value) -> Result<GetPromptResult, ErrorData> {
        let dispatcher = self.dispatcher.read();
        let prompt = dispatcher.prompt(name).ok_or_else(|| {
            ErrorData::invalid_params(format!("Unknown prompt: {}", name), None)
        })?;
        let text = prompt
            .render(arguments)
            .map_err(|e| ErrorData::invalid_params(e, None))?;

        Ok(GetPromptResult {
            description: Some(prompt.description.clone()),
            messages: vec![PromptMessage::new_text(PromptMessageRole::User, text)],
        })
    }
}

impl ServerHandler for McpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::default(),
            capabilities: ServerCapabilities::builder()
                .enable_prompts()
                .enable_tools()
                .build(),
            server_info: Implementation {
                name: SERVER_NAME.into(),
                version: self.version.clone(),
                title: None,
                icons: None,
                website_url: None,
            },
            instructions: None,
        }
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, ErrorData> {
        Ok(ListToolsResult {
            tools: self.tools(),
            next_cursor: None,
        })
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, ErrorData> {
        let arguments = request
            .arguments
            .map_or_else(|| Value::Object(serde_json::Map::new()), Value::Object);
        self.call(&request.name, arguments).await
    }

    async fn list_prompts(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListPromptsResult, ErrorData> {
        Ok(ListPromptsResult {
            prompts: self.prompts(),
            next_cursor: None,
        })
    }

    async fn get_prompt(
        &self,
        request: GetPromptRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<GetPromptResult, ErrorData> {
        let arguments = request.arguments.map_or(Value::Null, Value::Object);
        self.render_prompt(&request.name, &arguments)
    }
}
