use anyhow::bail;

use crate::cases::TestCase;
use crate::providers::ModelProvider;
use crate::types::{ContentBlock, GenerateRequest, Message, Role, ToolCall, ToolDef};

pub const INITIAL_PAGE_STATE: &str = "Page not loaded yet";

pub const SYSTEM_PROMPT: &str = "You are an E2E test executor. Your task is to perform actions on web \
pages based on natural language instructions, using the browser automation tools you are given.

For each step:
1. Use browser_snapshot to see the current page state.
2. Identify the target element by the ref from the snapshot.
3. Perform the required action with the appropriate tool.
4. Report what you did.

Typical workflow: browser_navigate to the target URL, browser_snapshot to read the page \
structure, act on elements by ref, then browser_snapshot again to verify the result. The \
\"element\" argument is a human-readable description used for logging; \"ref\" selects the element.

When all steps are done, analyze the final page state and decide whether the expected results \
are met. Respond with PASS or FAIL and explain your reasoning.

Respond in the same language as the test instructions.";

/// Message history for a single test. Roles alternate starting with `user`.
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.messages.clear();
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn push(&mut self, msg: Message) -> anyhow::Result<()> {
        let expected = match self.messages.last() {
            None | Some(Message { role: Role::Assistant, .. }) => Role::User,
            Some(Message { role: Role::User, .. }) => Role::Assistant,
        };
        if msg.role != expected {
            bail!(
                "conversation must alternate roles: expected {:?}, got {:?}",
                expected,
                msg.role
            );
        }
        self.messages.push(msg);
        Ok(())
    }

    fn pop_user(&mut self) {
        if matches!(self.messages.last(), Some(m) if m.role == Role::User) {
            self.messages.pop();
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    EndTurn,
    ToolUse,
    MaxTokens,
    StopSequence,
    Other(String),
}

impl StopReason {
    pub fn parse(raw: Option<&str>) -> Self {
        match raw {
            None | Some("end_turn") => Self::EndTurn,
            Some("tool_use") => Self::ToolUse,
            Some("max_tokens") => Self::MaxTokens,
            Some("stop_sequence") => Self::StopSequence,
            Some(other) => Self::Other(other.to_string()),
        }
    }
}

/// One reasoning-service reply.
#[derive(Debug, Clone, PartialEq)]
pub struct Turn {
    pub text: String,
    pub tool_calls: Vec<ToolCall>,
    pub stop_reason: StopReason,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutcome {
    pub tool_call_id: String,
    pub content: String,
    pub is_error: bool,
}

impl ToolOutcome {
    pub fn ok(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            content: content.into(),
            is_error: false,
        }
    }

    pub fn error(tool_call_id: impl Into<String>, error: impl std::fmt::Display) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            content: format!("Error: {error}"),
            is_error: true,
        }
    }
}

pub struct ReasoningClient<P: ModelProvider> {
    pub provider: P,
    pub model: String,
    pub max_tokens: u32,
    pub system: String,
}

impl<P: ModelProvider> ReasoningClient<P> {
    pub fn new(provider: P, model: impl Into<String>, max_tokens: u32) -> Self {
        Self {
            provider,
            model: model.into(),
            max_tokens,
            system: SYSTEM_PROMPT.to_string(),
        }
    }

    pub async fn send(
        &self,
        conv: &mut Conversation,
        prompt: &str,
        tools: &[ToolDef],
        image: Option<&str>,
    ) -> anyhow::Result<Turn> {
        let mut blocks = Vec::with_capacity(2);
        if let Some(data) = image {
            blocks.push(ContentBlock::Image {
                media_type: "image/png".to_string(),
                data: data.to_string(),
            });
        }
        blocks.push(ContentBlock::Text {
            text: prompt.to_string(),
        });
        self.exchange(conv, Message::user_blocks(blocks), tools).await
    }

    pub async fn send_tool_outcomes(
        &self,
        conv: &mut Conversation,
        outcomes: &[ToolOutcome],
        tools: &[ToolDef],
    ) -> anyhow::Result<Turn> {
        let blocks = outcomes
            .iter()
            .map(|o| ContentBlock::ToolResult {
                tool_use_id: o.tool_call_id.clone(),
                content: o.content.clone(),
                is_error: o.is_error,
            })
            .collect();
        self.exchange(conv, Message::user_blocks(blocks), tools).await
    }

    async fn exchange(
        &self,
        conv: &mut Conversation,
        user: Message,
        tools: &[ToolDef],
    ) -> anyhow::Result<Turn> {
        conv.push(user)?;
        let req = GenerateRequest {
            model: self.model.clone(),
            system: self.system.clone(),
            messages: conv.messages().to_vec(),
            tools: (!tools.is_empty()).then(|| tools.to_vec()),
            max_tokens: self.max_tokens,
        };
        let resp = match self.provider.generate(req).await {
            Ok(r) => r,
            Err(e) => {
                conv.pop_user();
                return Err(e);
            }
        };
        if let Some(usage) = resp.usage {
            tracing::debug!(
                input_tokens = usage.input_tokens.unwrap_or_default(),
                output_tokens = usage.output_tokens.unwrap_or_default(),
                "reasoning turn usage"
            );
        }
        let assistant = Message::assistant_blocks(resp.content);
        let turn = Turn {
            text: assistant.text(),
            tool_calls: assistant.tool_calls(),
            stop_reason: StopReason::parse(resp.stop_reason.as_deref()),
        };
        conv.push(assistant)?;
        Ok(turn)
    }
}

pub fn build_test_prompt(case: &TestCase, page_state: &str) -> String {
    let mut out = String::from("Execute the following E2E test:\n\n");
    out.push_str(&format!("**Test:** {}\n", case.name));
    if let Some(desc) = &case.description {
        out.push_str(&format!("**Description:** {desc}\n"));
    }
    if !case.preconditions.is_empty() {
        out.push_str("\n**Preconditions:**\n");
        for p in &case.preconditions {
            out.push_str(&format!("- {p}\n"));
        }
    }
    out.push_str(&format!("\n**URL:** {}\n\n", case.url));
    out.push_str("**Steps to execute:**\n");
    for (i, step) in case.steps.iter().enumerate() {
        out.push_str(&format!("{}. {}\n", i + 1, step));
    }
    out.push_str("\n**Expected results to verify:**\n");
    for r in &case.expected_results {
        out.push_str(&format!("- {r}\n"));
    }
    out.push_str(&format!("\n**Current page state:**\n{page_state}\n\n"));
    out.push_str(
        "Start by navigating to the URL, then execute each step. After completing all steps, \
         verify the expected results and report whether the test passed or failed.",
    );
    out
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{
        build_test_prompt, Conversation, ReasoningClient, StopReason, ToolOutcome,
        INITIAL_PAGE_STATE,
    };
    use crate::cases::TestCase;
    use crate::providers::mock::{MockProvider, MockReply};
    use crate::types::{ContentBlock, Message, MessageContent, Role};

    fn login_case() -> TestCase {
        TestCase {
            name: "Login".to_string(),
            description: None,
            url: "https://x".to_string(),
            steps: vec!["click login".to_string(), "enter credentials".to_string()],
            expected_results: vec!["dashboard visible".to_string()],
            preconditions: Vec::new(),
            cleanup: None,
            path: "tests/login.json".to_string(),
            file_hash_hex: String::new(),
        }
    }

    #[test]
    fn prompt_numbers_steps_and_bullets_expectations() {
        let mut case = login_case();
        let p = build_test_prompt(&case, INITIAL_PAGE_STATE);
        assert!(p.contains("**Test:** Login"));
        assert!(p.contains("**URL:** https://x"));
        assert!(p.contains("1. click login\n2. enter credentials"));
        assert!(p.contains("- dashboard visible"));
        assert!(p.contains("Page not loaded yet"));
        assert!(!p.contains("Description"));
        assert!(!p.contains("Preconditions"));

        case.preconditions = vec!["user alice exists".to_string()];
        case.description = Some("happy path".to_string());
        let p = build_test_prompt(&case, INITIAL_PAGE_STATE);
        assert!(p.contains("**Description:** happy path"));
        assert!(p.contains("- user alice exists"));
    }

    #[test]
    fn conversation_rejects_out_of_order_roles() {
        let mut conv = Conversation::new();
        assert!(conv
            .push(Message::assistant_blocks(Vec::new()))
            .is_err());
        conv.push(Message::user_text("hi")).expect("user first");
        assert!(conv.push(Message::user_text("again")).is_err());
        conv.push(Message::assistant_blocks(Vec::new()))
            .expect("assistant second");
        conv.reset();
        assert!(conv.is_empty());
    }

    #[test]
    fn stop_reason_defaults_to_end_turn() {
        assert_eq!(StopReason::parse(None), StopReason::EndTurn);
        assert_eq!(StopReason::parse(Some("tool_use")), StopReason::ToolUse);
        assert_eq!(
            StopReason::parse(Some("refusal")),
            StopReason::Other("refusal".to_string())
        );
    }

    #[tokio::test]
    async fn send_puts_image_before_text_and_records_reply() {
        let provider = MockProvider::scripted([MockReply::tool(
            "browser_navigate",
            json!({"url": "https://x"}),
        )]);
        let client = ReasoningClient::new(provider, "test-model", 1024);
        let mut conv = Conversation::new();
        let turn = client
            .send(&mut conv, "go", &[], Some("iVBOR"))
            .await
            .expect("turn");
        assert_eq!(turn.tool_calls.len(), 1);
        assert_eq!(turn.tool_calls[0].name, "browser_navigate");
        assert_eq!(turn.stop_reason, StopReason::ToolUse);
        assert_eq!(conv.len(), 2);
        match &conv.messages()[0].content {
            MessageContent::Blocks(b) => {
                assert!(matches!(b[0], ContentBlock::Image { .. }));
                assert!(matches!(b[1], ContentBlock::Text { .. }));
            }
            other => panic!("unexpected content: {other:?}"),
        }
        let reqs = client.provider.requests();
        assert!(reqs[0].tools.is_none());
        assert_eq!(reqs[0].model, "test-model");
    }

    #[tokio::test]
    async fn tool_outcomes_go_out_as_one_user_message() {
        let provider = MockProvider::scripted([
            MockReply::ToolCalls(vec![
                ("browser_snapshot".to_string(), json!({})),
                ("browser_click".to_string(), json!({"ref": "e1"})),
            ]),
            MockReply::text("PASS"),
        ]);
        let client = ReasoningClient::new(provider, "m", 1024);
        let mut conv = Conversation::new();
        let turn = client.send(&mut conv, "go", &[], None).await.expect("first");
        let outcomes = vec![
            ToolOutcome::ok(turn.tool_calls[0].id.clone(), "page"),
            ToolOutcome::error(turn.tool_calls[1].id.clone(), "not found"),
        ];
        let next = client
            .send_tool_outcomes(&mut conv, &outcomes, &[])
            .await
            .expect("second");
        assert_eq!(next.text, "PASS");
        assert!(next.tool_calls.is_empty());
        assert_eq!(conv.len(), 4);
        assert_eq!(conv.messages()[2].role, Role::User);
        match &conv.messages()[2].content {
            MessageContent::Blocks(b) => {
                assert_eq!(b.len(), 2);
                assert!(matches!(
                    &b[1],
                    ContentBlock::ToolResult { content, is_error: true, .. } if content == "Error: not found"
                ));
            }
            other => panic!("unexpected content: {other:?}"),
        }
    }

    #[tokio::test]
    async fn failed_send_rolls_back_pending_user_message() {
        let provider = MockProvider::scripted([MockReply::Fail("service unavailable".to_string())]);
        let client = ReasoningClient::new(provider, "m", 1024);
        let mut conv = Conversation::new();
        let err = client
            .send(&mut conv, "go", &[], None)
            .await
            .expect_err("scripted failure");
        assert!(err.to_string().contains("service unavailable"));
        assert!(conv.is_empty());
    }
}
