use async_trait::async_trait;
use serde_json::Value;

use crate::types::ToolDef;

pub mod client;
pub mod session;
pub mod transport;
pub mod types;

pub use client::McpClient;
pub use session::BrowserSession;
pub use types::{CallToolResult, McpError, ToolContent};

/// Invocation channel for browser tools. Schema validation of `args` is the
/// implementor's job; a rejected call surfaces as `Err`.
#[async_trait]
pub trait ToolTransport: Send + Sync {
    async fn list_tools(&self) -> anyhow::Result<Vec<ToolDef>>;

    async fn call_tool(&self, name: &str, args: Value) -> anyhow::Result<CallToolResult>;

    async fn shutdown(&self);
}

#[async_trait]
impl<T: ToolTransport + ?Sized> ToolTransport for Box<T> {
    async fn list_tools(&self) -> anyhow::Result<Vec<ToolDef>> {
        (**self).list_tools().await
    }

    async fn call_tool(&self, name: &str, args: Value) -> anyhow::Result<CallToolResult> {
        (**self).call_tool(name, args).await
    }

    async fn shutdown(&self) {
        (**self).shutdown().await
    }
}
