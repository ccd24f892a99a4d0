use std::collections::VecDeque;
use std::sync::Mutex;

use anyhow::anyhow;
use async_trait::async_trait;
use serde_json::Value;

use crate::providers::ModelProvider;
use crate::types::{ContentBlock, GenerateRequest, GenerateResponse};

pub const MOCK_VERDICT: &str = "PASS (mock provider)";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MockProviderError {
    #[error("mock provider scripted failure: {message}")]
    Scripted { message: String },
    #[error("mock provider tool-call arguments for '{tool}' must be a JSON object")]
    ExpectedJsonObject { tool: String },
    #[error("mock provider tool call must include a tool name")]
    EmptyToolName,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MockReply {
    Text(String),
    ToolCalls(Vec<(String, Value)>),
    Fail(String),
}

impl MockReply {
    pub fn text(s: impl Into<String>) -> Self {
        Self::Text(s.into())
    }

    pub fn tool(name: impl Into<String>, args: Value) -> Self {
        Self::ToolCalls(vec![(name.into(), args)])
    }
}

/// Replays a fixed script of replies, one per `generate` call. Once the script
/// runs dry every call answers with [`MOCK_VERDICT`].
#[derive(Debug, Default)]
pub struct MockProvider {
    script: Mutex<VecDeque<MockReply>>,
    requests: Mutex<Vec<GenerateRequest>>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scripted(replies: impl IntoIterator<Item = MockReply>) -> Self {
        Self {
            script: Mutex::new(replies.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn push(&self, reply: MockReply) {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(reply);
        }
    }

    pub fn requests(&self) -> Vec<GenerateRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or_default()
    }

    fn next_reply(&self) -> Option<MockReply> {
        self.script.lock().ok().and_then(|mut s| s.pop_front())
    }
}

fn build_response(reply: MockReply) -> anyhow::Result<GenerateResponse> {
    match reply {
        MockReply::Text(text) => Ok(GenerateResponse {
            content: vec![ContentBlock::Text { text }],
            stop_reason: Some("end_turn".to_string()),
            usage: None,
        }),
        MockReply::ToolCalls(calls) => {
            let mut content = Vec::with_capacity(calls.len());
            for (idx, (name, args)) in calls.into_iter().enumerate() {
                if name.is_empty() {
                    return Err(anyhow!(MockProviderError::EmptyToolName));
                }
                if !args.is_object() {
                    return Err(anyhow!(MockProviderError::ExpectedJsonObject { tool: name }));
                }
                content.push(ContentBlock::ToolUse {
                    id: format!("mock_tc_{idx}"),
                    name,
                    input: args,
                });
            }
            Ok(GenerateResponse {
                content,
                stop_reason: Some("tool_use".to_string()),
                usage: None,
            })
        }
        MockReply::Fail(message) => Err(anyhow!(MockProviderError::Scripted { message })),
    }
}

#[async_trait]
impl ModelProvider for MockProvider {
    async fn generate(&self, req: GenerateRequest) -> anyhow::Result<GenerateResponse> {
        if let Ok(mut seen) = self.requests.lock() {
            seen.push(req);
        }
        let reply = self
            .next_reply()
            .unwrap_or_else(|| MockReply::text(MOCK_VERDICT));
        build_response(reply)
    }
}
