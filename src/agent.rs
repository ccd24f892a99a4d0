use std::path::PathBuf;
use std::time::Instant;

use crate::cases::TestCase;
use crate::config::ScreenshotPolicy;
use crate::conversation::{build_test_prompt, Conversation, ReasoningClient, ToolOutcome, Turn, INITIAL_PAGE_STATE};
use crate::mcp::{BrowserSession, ToolTransport};
use crate::providers::ModelProvider;
use crate::report::{Reporter, TestResult, TestStatus};
use crate::steps::{best_effort, ArtifactStore, StepRecorder};
use crate::tools::BrowserTool;
use crate::types::ToolCall;

const PASS_TOKENS: &[&str] = &["pass", "passed", "успешно", "пройден"];
const FAIL_TOKENS: &[&str] = &["fail", "failed", "провал", "не удалось"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Pass,
    Fail,
    Inconclusive,
}

/// Case-insensitive keyword scan of the final answer. Pass tokens are
/// checked before fail tokens, so "PASS, nothing failed" is a pass.
pub fn classify_verdict(text: &str) -> Verdict {
    let lower = text.to_lowercase();
    if PASS_TOKENS.iter().any(|t| lower.contains(t)) {
        Verdict::Pass
    } else if FAIL_TOKENS.iter().any(|t| lower.contains(t)) {
        Verdict::Fail
    } else {
        Verdict::Inconclusive
    }
}

/// What the next reasoning turn is sent with.
enum Pending {
    Prompt(String),
    Outcomes(Vec<ToolOutcome>),
}

struct Terminal {
    status: TestStatus,
    error: Option<String>,
}

/// Per-test scratch state. Dropped when the test ends.
struct TestRun<'c> {
    case: &'c TestCase,
    steps: StepRecorder,
    screenshots: Vec<String>,
}

pub struct Agent<P: ModelProvider, T: ToolTransport> {
    pub client: ReasoningClient<P>,
    pub session: BrowserSession<T>,
    pub max_steps: usize,
    pub screenshots: ScreenshotPolicy,
    pub artifacts: ArtifactStore,
    pub reporter: Reporter,
}

impl<P: ModelProvider, T: ToolTransport> Agent<P, T> {
    /// Runs one case to completion. Never fails: every error ends up in the
    /// returned result.
    pub async fn run(&self, case: &TestCase) -> TestResult {
        self.reporter.start_test(&case.name, &case.path);
        tracing::debug!(test = %case.name, file_hash = %case.file_hash_hex, "starting test");
        let started = Instant::now();
        let mut run = TestRun {
            case,
            steps: StepRecorder::new(),
            screenshots: Vec::new(),
        };
        let mut conv = Conversation::new();

        let terminal = match self.drive(&mut run, &mut conv).await {
            Ok(t) => t,
            Err(e) => {
                let text = format!("{e:#}");
                tracing::error!(test = %case.name, error = %text, "test aborted");
                if self.screenshots != ScreenshotPolicy::Never {
                    let index = run.steps.len();
                    if let Some(path) = self.capture(case, index).await {
                        self.reporter.log_screenshot(&path);
                        run.screenshots.push(path.display().to_string());
                    }
                }
                Terminal {
                    status: TestStatus::Failed,
                    error: Some(text),
                }
            }
        };
        let duration = started.elapsed().as_millis() as u64;

        if let Some(opts) = &case.cleanup {
            match self.session.cleanup(opts).await {
                Ok(()) => tracing::info!(test = %case.name, "browser data cleaned up"),
                Err(e) => tracing::warn!(test = %case.name, error = %format!("{e:#}"), "cleanup failed"),
            }
        }

        let result = TestResult {
            name: case.name.clone(),
            file_path: case.path.clone(),
            status: terminal.status,
            duration,
            steps: run.steps.into_steps(),
            error: terminal.error,
            screenshots: run.screenshots,
        };
        self.reporter.end_test(&result);
        result
    }

    async fn drive(&self, run: &mut TestRun<'_>, conv: &mut Conversation) -> anyhow::Result<Terminal> {
        let tools = self.session.tools();
        let mut pending = Pending::Prompt(build_test_prompt(run.case, INITIAL_PAGE_STATE));
        let mut iteration = 0usize;
        loop {
            iteration += 1;
            if iteration > self.max_steps {
                tracing::warn!(test = %run.case.name, max_steps = self.max_steps, "step budget exhausted");
                return Ok(Terminal {
                    status: TestStatus::Failed,
                    error: Some(format!(
                        "test exceeded maximum steps limit ({})",
                        self.max_steps
                    )),
                });
            }

            let turn: Turn = match pending {
                Pending::Prompt(prompt) => self.client.send(conv, &prompt, tools, None).await?,
                Pending::Outcomes(outcomes) => {
                    self.client.send_tool_outcomes(conv, &outcomes, tools).await?
                }
            };
            self.reporter.log_thinking(&turn.text);
            tracing::debug!(
                test = %run.case.name,
                iteration,
                tool_calls = turn.tool_calls.len(),
                stop_reason = ?turn.stop_reason,
                "reasoning turn"
            );

            if turn.tool_calls.is_empty() {
                return Ok(self.conclude(run.case, &turn.text));
            }

            let mut outcomes = Vec::with_capacity(turn.tool_calls.len());
            for call in &turn.tool_calls {
                outcomes.push(self.execute(run, call).await);
            }
            pending = Pending::Outcomes(outcomes);
        }
    }

    fn conclude(&self, case: &TestCase, text: &str) -> Terminal {
        match classify_verdict(text) {
            Verdict::Pass => Terminal {
                status: TestStatus::Passed,
                error: None,
            },
            Verdict::Fail => Terminal {
                status: TestStatus::Failed,
                error: Some(text.to_string()),
            },
            Verdict::Inconclusive => {
                // no verdict keyword: the default status stands
                tracing::warn!(test = %case.name, "final answer has no PASS/FAIL verdict; keeping passed");
                Terminal {
                    status: TestStatus::Passed,
                    error: None,
                }
            }
        }
    }

    async fn execute(&self, run: &mut TestRun<'_>, call: &ToolCall) -> ToolOutcome {
        let tool = BrowserTool::from_name(&call.name);
        self.reporter.log_tool_call(&call.name, &call.arguments);
        let index = run.steps.begin(tool.describe(&call.arguments));

        let outcome = match self.session.call(&call.name, call.arguments.clone()).await {
            Ok(result) => {
                run.steps.pass(index);
                if tool.is_screenshot() {
                    if let Some(data) = result.first_image() {
                        let saved = best_effort(
                            "saving screenshot",
                            self.artifacts.save_screenshot(data, &run.case.name, index),
                        )
                        .await;
                        if let Some(path) = saved {
                            self.attach(run, index, path);
                        }
                    }
                } else if self.screenshots == ScreenshotPolicy::Always {
                    if let Some(path) = self.capture(run.case, index).await {
                        self.attach(run, index, path);
                    }
                }
                let content = serde_json::to_string(&result).unwrap_or_else(|_| result.joined_text());
                ToolOutcome::ok(&call.id, content)
            }
            Err(e) => {
                let text = format!("{e:#}");
                tracing::warn!(tool = %call.name, error = %text, "tool call failed");
                run.steps.fail(index, &text);
                if self.screenshots != ScreenshotPolicy::Never {
                    if let Some(path) = self.capture(run.case, index).await {
                        self.attach(run, index, path);
                    }
                }
                ToolOutcome::error(&call.id, text)
            }
        };
        if let Some(step) = run.steps.steps().get(index - 1) {
            self.reporter.log_step(step);
        }
        outcome
    }

    fn attach(&self, run: &mut TestRun<'_>, index: usize, path: PathBuf) {
        self.reporter.log_screenshot(&path);
        let rendered = path.display().to_string();
        run.steps.attach(index, rendered.clone());
        run.screenshots.push(rendered);
    }

    async fn capture(&self, case: &TestCase, index: usize) -> Option<PathBuf> {
        best_effort("screenshot capture", async {
            match self.session.screenshot().await? {
                Some(data) => self
                    .artifacts
                    .save_screenshot(&data, &case.name, index)
                    .await
                    .map(Some),
                None => Ok(None),
            }
        })
        .await
        .flatten()
    }
}
