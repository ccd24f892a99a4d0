use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde_json::{json, Value};

use crate::mcp::transport::StdioTransport;
use crate::mcp::types::{CallToolResult, McpError, ToolsListResult, PROTOCOL_VERSION};
use crate::mcp::ToolTransport;
use crate::types::ToolDef;

/// Client for one stdio MCP server, ready to use once `connect` returns.
pub struct McpClient {
    transport: StdioTransport,
    server_name: String,
}

impl McpClient {
    /// Spawns the server and runs the handshake. `handshake_timeout` bounds
    /// `initialize` only; every later request uses `timeout`.
    pub async fn connect(
        command: &str,
        args: &[String],
        timeout: Duration,
        handshake_timeout: Duration,
    ) -> anyhow::Result<Self> {
        let transport = StdioTransport::spawn(command, args, timeout).await?;
        let client = Self {
            transport,
            server_name: command.to_string(),
        };
        if let Err(e) = client.initialize(handshake_timeout).await {
            tracing::warn!(server = %client.server_name, error = %e, "MCP initialize handshake failed");
            client.transport.kill().await;
            return Err(e);
        }
        Ok(client)
    }

    async fn initialize(&self, handshake_timeout: Duration) -> anyhow::Result<()> {
        let params = json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": {
                "name": env!("CARGO_PKG_NAME"),
                "version": env!("CARGO_PKG_VERSION"),
            },
        });
        let result = self
            .transport
            .request_with_timeout("initialize", Some(params), handshake_timeout)
            .await
            .context("MCP initialize request failed")?;
        let server = result
            .pointer("/serverInfo/name")
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        let protocol = result
            .get("protocolVersion")
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        tracing::info!(server = %server, protocol = %protocol, "MCP server initialized");
        self.transport
            .notify("notifications/initialized", None)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ToolTransport for McpClient {
    async fn list_tools(&self) -> anyhow::Result<Vec<ToolDef>> {
        let result = self.transport.request("tools/list", None).await?;
        let list: ToolsListResult =
            serde_json::from_value(result).context("failed to parse tools/list result")?;
        tracing::debug!(count = list.tools.len(), "fetched MCP tools");
        Ok(list.tools.into_iter().map(ToolDef::from).collect())
    }

    async fn call_tool(&self, name: &str, args: Value) -> anyhow::Result<CallToolResult> {
        let params = json!({ "name": name, "arguments": args });
        let result = self.transport.request("tools/call", Some(params)).await?;
        let result: CallToolResult = serde_json::from_value(result)
            .with_context(|| format!("failed to parse tools/call result for '{name}'"))?;
        if result.is_error {
            let message = result.joined_text();
            return Err(McpError::ToolReported {
                tool: name.to_string(),
                message: if message.is_empty() {
                    "tool reported an error".to_string()
                } else {
                    message
                },
            }
            .into());
        }
        Ok(result)
    }

    async fn shutdown(&self) {
        tracing::debug!(server = %self.server_name, "shutting down MCP server");
        self.transport.kill().await;
    }
}
