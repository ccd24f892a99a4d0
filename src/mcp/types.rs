use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::ToolDef;

pub const PROTOCOL_VERSION: &str = "2024-11-05";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: Value,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    pub fn new(id: u64, method: &str, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: Value::Number(id.into()),
            method: method.to_string(),
            params,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcNotification {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct McpToolDef {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub input_schema: Value,
}

impl From<McpToolDef> for ToolDef {
    fn from(t: McpToolDef) -> Self {
        ToolDef {
            name: t.name,
            description: t.description.unwrap_or_default(),
            input_schema: t.input_schema,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsListResult {
    pub tools: Vec<McpToolDef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolContent {
    Text {
        text: String,
    },
    Image {
        data: String,
        #[serde(rename = "mimeType", default)]
        mime_type: String,
    },
    Resource {
        resource: Value,
    },
    /// `audio`, `resource_link` and any later block types.
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallToolResult {
    #[serde(default)]
    pub content: Vec<ToolContent>,
    #[serde(default)]
    pub is_error: bool,
}

impl CallToolResult {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::Text { text: text.into() }],
            is_error: false,
        }
    }

    pub fn image(data: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::Image {
                data: data.into(),
                mime_type: "image/png".to_string(),
            }],
            is_error: false,
        }
    }

    /// Base64 payload of the first image block.
    pub fn first_image(&self) -> Option<&str> {
        self.content.iter().find_map(|c| match c {
            ToolContent::Image { data, .. } if !data.is_empty() => Some(data.as_str()),
            _ => None,
        })
    }

    pub fn joined_text(&self) -> String {
        self.content
            .iter()
            .filter_map(|c| match c {
                ToolContent::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Debug, thiserror::Error)]
pub enum McpError {
    #[error("failed to spawn MCP server '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("MCP request '{method}' timed out after {timeout_ms}ms")]
    Timeout { method: String, timeout_ms: u64 },
    #[error("MCP server closed the connection while waiting for '{method}'")]
    Closed { method: String },
    #[error("MCP error on '{method}': code={code} message={message}")]
    Rpc {
        method: String,
        code: i64,
        message: String,
    },
    #[error("tool '{tool}' failed: {message}")]
    ToolReported { tool: String, message: String },
    #[error("MCP protocol error: {0}")]
    Protocol(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::{CallToolResult, JsonRpcRequest, McpToolDef, ToolContent};
    use crate::types::ToolDef;

    #[test]
    fn request_serializes_numeric_id() {
        let req = JsonRpcRequest::new(7, "tools/list", None);
        let s = serde_json::to_string(&req).expect("serialize");
        assert!(s.contains("\"id\":7"));
        assert!(!s.contains("params"));
    }

    #[test]
    fn call_result_exposes_image_and_text() {
        let r: CallToolResult = serde_json::from_str(
            r#"{"content":[{"type":"text","text":"Took screenshot"},{"type":"image","data":"iVBOR","mimeType":"image/png"}]}"#,
        )
        .expect("parse");
        assert!(!r.is_error);
        assert_eq!(r.first_image(), Some("iVBOR"));
        assert_eq!(r.joined_text(), "Took screenshot");
        assert!(matches!(r.content[1], ToolContent::Image { .. }));
    }

    #[test]
    fn unrecognized_content_blocks_still_parse() {
        let r: CallToolResult = serde_json::from_str(
            r#"{"content":[{"type":"audio","data":"UklGR","mimeType":"audio/wav"},{"type":"resource_link","uri":"file:///trace.zip"},{"type":"text","text":"done"}]}"#,
        )
        .expect("parse");
        assert!(!r.is_error);
        assert!(matches!(r.content[0], ToolContent::Unknown));
        assert!(matches!(r.content[1], ToolContent::Unknown));
        assert_eq!(r.joined_text(), "done");
        assert_eq!(r.first_image(), None);
    }

    #[test]
    fn tool_def_conversion_defaults_description() {
        let t: McpToolDef =
            serde_json::from_str(r#"{"name":"browser_click","inputSchema":{"type":"object"}}"#)
                .expect("parse");
        let def: ToolDef = t.into();
        assert_eq!(def.name, "browser_click");
        assert_eq!(def.description, "");
        assert_eq!(def.input_schema["type"], "object");
    }
}
