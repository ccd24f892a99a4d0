use async_trait::async_trait;
use serde_json::{json, Value};

use crate::providers::ModelProvider;
use crate::types::{
    ContentBlock, GenerateRequest, GenerateResponse, Message, MessageContent, Role, TokenUsage,
};

pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("authentication failed: {0}")]
    Authentication(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("rate limited: {0}")]
    RateLimited(String),
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

pub struct AnthropicProvider {
    api_key: String,
    base_url: String,
    client: reqwest::Client,
}

impl AnthropicProvider {
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: base_url.into(),
            client: reqwest::Client::new(),
        }
    }

    pub(crate) fn messages_url(&self) -> String {
        format!("{}/v1/messages", self.base_url.trim_end_matches('/'))
    }

    async fn send(&self, req: &GenerateRequest) -> Result<GenerateResponse, ProviderError> {
        let body = to_api_request(req);
        tracing::debug!(url = %self.messages_url(), model = %req.model, messages = req.messages.len(), "sending messages request");
        let resp = self
            .client
            .post(self.messages_url())
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;
        let status = resp.status();
        let text = resp.text().await?;
        if !status.is_success() {
            return Err(map_http_status(status, &text));
        }
        let json: Value = serde_json::from_str(&text)
            .map_err(|e| ProviderError::InvalidResponse(format!("invalid JSON response: {e}")))?;
        from_api_response(&json)
    }
}

#[async_trait]
impl ModelProvider for AnthropicProvider {
    async fn generate(&self, req: GenerateRequest) -> anyhow::Result<GenerateResponse> {
        Ok(self.send(&req).await?)
    }
}

pub(crate) fn map_http_status(status: reqwest::StatusCode, body: &str) -> ProviderError {
    match status.as_u16() {
        401 | 403 => ProviderError::Authentication(body.to_string()),
        429 => ProviderError::RateLimited(body.to_string()),
        500..=599 => ProviderError::ServiceUnavailable(format!("HTTP {status}: {body}")),
        _ => ProviderError::InvalidRequest(format!("HTTP {status}: {body}")),
    }
}

pub fn to_api_request(req: &GenerateRequest) -> Value {
    let mut body = json!({
        "model": req.model,
        "max_tokens": req.max_tokens,
        "system": req.system,
        "messages": req.messages.iter().map(map_message).collect::<Vec<_>>(),
    });
    if let Some(tools) = req.tools.as_ref().filter(|t| !t.is_empty()) {
        body["tools"] = Value::Array(
            tools
                .iter()
                .map(|t| {
                    json!({
                        "name": t.name,
                        "description": t.description,
                        "input_schema": t.input_schema,
                    })
                })
                .collect(),
        );
    }
    body
}

fn map_message(msg: &Message) -> Value {
    let role = match msg.role {
        Role::User => "user",
        Role::Assistant => "assistant",
    };
    let content = match &msg.content {
        MessageContent::Text(t) => Value::String(t.clone()),
        MessageContent::Blocks(blocks) => Value::Array(blocks.iter().map(map_block).collect()),
    };
    json!({ "role": role, "content": content })
}

fn map_block(block: &ContentBlock) -> Value {
    match block {
        ContentBlock::Text { text } => json!({"type": "text", "text": text}),
        ContentBlock::Image { media_type, data } => json!({
            "type": "image",
            "source": {"type": "base64", "media_type": media_type, "data": data},
        }),
        ContentBlock::ToolUse { id, name, input } => json!({
            "type": "tool_use",
            "id": id,
            "name": name,
            "input": input,
        }),
        ContentBlock::ToolResult {
            tool_use_id,
            content,
            is_error,
        } => json!({
            "type": "tool_result",
            "tool_use_id": tool_use_id,
            "content": content,
            "is_error": is_error,
        }),
    }
}

pub fn from_api_response(v: &Value) -> Result<GenerateResponse, ProviderError> {
    let blocks = v
        .get("content")
        .and_then(|c| c.as_array())
        .ok_or_else(|| ProviderError::InvalidResponse("missing content array".to_string()))?;
    let mut content = Vec::with_capacity(blocks.len());
    for b in blocks {
        match b.get("type").and_then(|t| t.as_str()) {
            Some("text") => content.push(ContentBlock::Text {
                text: b
                    .get("text")
                    .and_then(|t| t.as_str())
                    .unwrap_or_default()
                    .to_string(),
            }),
            Some("tool_use") => {
                let id = b.get("id").and_then(|x| x.as_str()).ok_or_else(|| {
                    ProviderError::InvalidResponse("tool_use block without id".to_string())
                })?;
                let name = b.get("name").and_then(|x| x.as_str()).ok_or_else(|| {
                    ProviderError::InvalidResponse("tool_use block without name".to_string())
                })?;
                content.push(ContentBlock::ToolUse {
                    id: id.to_string(),
                    name: name.to_string(),
                    input: b.get("input").cloned().unwrap_or_else(|| json!({})),
                });
            }
            // thinking and other server-side blocks carry nothing the loop acts on
            _ => {}
        }
    }
    let usage = v.get("usage").map(|u| TokenUsage {
        input_tokens: u.get("input_tokens").and_then(|x| x.as_u64()),
        output_tokens: u.get("output_tokens").and_then(|x| x.as_u64()),
    });
    Ok(GenerateResponse {
        content,
        stop_reason: v
            .get("stop_reason")
            .and_then(|s| s.as_str())
            .map(str::to_string),
        usage,
    })
}
