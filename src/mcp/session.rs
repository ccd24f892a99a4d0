use serde_json::{json, Value};

use crate::cases::CleanupOptions;
use crate::mcp::{CallToolResult, ToolTransport};
use crate::tools::{TOOL_EVALUATE, TOOL_SCREENSHOT, TOOL_SNAPSHOT};
use crate::types::ToolDef;

/// One live browser, shared by every test in a batch. The tool catalog is
/// fetched once on open and handed unchanged to each reasoning turn.
pub struct BrowserSession<T: ToolTransport> {
    transport: T,
    tools: Vec<ToolDef>,
}

impl<T: ToolTransport> BrowserSession<T> {
    pub async fn open(transport: T) -> anyhow::Result<Self> {
        let tools = match transport.list_tools().await {
            Ok(t) => t,
            Err(e) => {
                transport.shutdown().await;
                return Err(e.context("failed to fetch browser tool catalog"));
            }
        };
        tracing::info!(count = tools.len(), "browser tools available");
        Ok(Self { transport, tools })
    }

    pub fn tools(&self) -> &[ToolDef] {
        &self.tools
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub async fn call(&self, name: &str, args: Value) -> anyhow::Result<CallToolResult> {
        tracing::debug!(tool = %name, "calling browser tool");
        self.transport.call_tool(name, args).await
    }

    /// Base64 PNG of the current page, or `None` when the tool returned no image.
    pub async fn screenshot(&self) -> anyhow::Result<Option<String>> {
        let result = self.call(TOOL_SCREENSHOT, json!({})).await?;
        Ok(result.first_image().map(str::to_string))
    }

    pub async fn snapshot(&self) -> anyhow::Result<String> {
        let result = self.call(TOOL_SNAPSHOT, json!({})).await?;
        Ok(result.joined_text())
    }

    pub async fn cleanup(&self, opts: &CleanupOptions) -> anyhow::Result<()> {
        let Some(function) = cleanup_script(opts) else {
            return Ok(());
        };
        self.call(TOOL_EVALUATE, json!({ "function": function }))
            .await?;
        Ok(())
    }

    pub async fn close(self) {
        self.transport.shutdown().await;
    }
}

fn cleanup_script(opts: &CleanupOptions) -> Option<String> {
    let mut body = Vec::new();
    if opts.cookies {
        body.push(
            "document.cookie.split(';').forEach(c => { const n = c.split('=')[0].trim(); \
             if (n) document.cookie = n + '=; expires=Thu, 01 Jan 1970 00:00:00 GMT; path=/'; });",
        );
    }
    if opts.local_storage {
        body.push("localStorage.clear();");
    }
    if opts.session_storage {
        body.push("sessionStorage.clear();");
    }
    if body.is_empty() {
        return None;
    }
    Some(format!("() => {{ {} }}", body.join(" ")))
}
