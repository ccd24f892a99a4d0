use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use time::OffsetDateTime;

use crate::agent::Agent;
use crate::cases::{load_cases, TestCase};
use crate::config::Config;
use crate::conversation::ReasoningClient;
use crate::mcp::{BrowserSession, McpClient, ToolTransport};
use crate::providers::{build_provider, ModelProvider};
use crate::report::{save_history, Reporter, RunExit, RunResult};
use crate::steps::{file_stamp, ArtifactStore};

#[derive(Debug, Clone)]
pub struct RunReport {
    pub result: RunResult,
    pub exit: RunExit,
    pub history_dir: Option<PathBuf>,
}

impl RunReport {
    fn setup_error(started_at: OffsetDateTime) -> Self {
        Self {
            result: RunResult::empty(started_at),
            exit: RunExit::SetupError,
            history_dir: None,
        }
    }
}

/// Runs every case in order on one agent and folds the results. A failing
/// case never stops the batch.
pub async fn run_batch<P: ModelProvider, T: ToolTransport>(
    agent: &Agent<P, T>,
    cases: &[TestCase],
) -> RunResult {
    let started_at = OffsetDateTime::now_utc();
    let started = Instant::now();
    let mut results = Vec::with_capacity(cases.len());
    for case in cases {
        results.push(agent.run(case).await);
    }
    RunResult::from_results(results, started_at, started.elapsed().as_millis() as u64)
}

pub struct TestRunner {
    cfg: Config,
    workdir: PathBuf,
    reporter: Reporter,
}

impl TestRunner {
    pub fn new(cfg: Config, workdir: impl Into<PathBuf>) -> Self {
        let reporter = Reporter::new(&cfg);
        Self {
            cfg,
            workdir: workdir.into(),
            reporter,
        }
    }

    pub async fn run(&self) -> RunReport {
        let started_at = OffsetDateTime::now_utc();
        let pattern = &self.cfg.tests.pattern;

        let loaded = load_cases(&self.workdir, pattern);
        for e in &loaded.errors {
            tracing::warn!(path = %e.path, code = %e.code, "{}", e.message);
        }
        self.reporter.load_errors(&loaded.errors);
        if loaded.cases.is_empty() {
            let msg = if loaded.errors.is_empty() {
                format!("No test files found matching pattern: {pattern}")
            } else {
                "No valid tests found".to_string()
            };
            tracing::error!("{msg}");
            self.reporter.error(&msg);
            return RunReport::setup_error(started_at);
        }

        self.reporter.start_run(loaded.cases.len());
        self.reporter.info("Connecting to browser...");
        let session = match self.connect().await {
            Ok(s) => s,
            Err(e) => {
                let msg = format!("Failed to connect to browser: {e:#}");
                tracing::error!("{msg}");
                self.reporter.error(&msg);
                return RunReport::setup_error(started_at);
            }
        };

        let run_dir = self.run_dir(started_at);
        let agent = Agent {
            client: ReasoningClient::new(
                build_provider(&self.cfg),
                self.cfg.llm.model.clone(),
                self.cfg.llm.max_tokens,
            ),
            session,
            max_steps: self.cfg.execution.max_steps_per_test,
            screenshots: self.cfg.debug.screenshots,
            artifacts: ArtifactStore::new(&run_dir),
            reporter: self.reporter,
        };
        let result = run_batch(&agent, &loaded.cases).await;
        agent.session.close().await;

        self.reporter.end_run(&result);
        let history_dir = if self.cfg.history.enabled {
            match save_history(&run_dir, &result) {
                Ok(path) => {
                    self.reporter
                        .info(&format!("Results saved to: {}", path.display()));
                    Some(run_dir)
                }
                Err(e) => {
                    tracing::warn!(error = %format!("{e:#}"), "failed to save run history");
                    None
                }
            }
        } else {
            None
        };

        RunReport {
            exit: RunExit::for_result(&result),
            result,
            history_dir,
        }
    }

    async fn connect(&self) -> anyhow::Result<BrowserSession<McpClient>> {
        let execution = &self.cfg.execution;
        let client = McpClient::connect(
            &self.cfg.browser.command,
            &self.cfg.browser.server_args(),
            Duration::from_millis(execution.timeout.max(1)),
            Duration::from_millis(execution.connect_timeout.max(1)),
        )
        .await?;
        BrowserSession::open(client).await
    }

    fn run_dir(&self, started_at: OffsetDateTime) -> PathBuf {
        resolve(&self.workdir, &self.cfg.history.directory).join(file_stamp(started_at))
    }
}

fn resolve(workdir: &Path, p: &Path) -> PathBuf {
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        workdir.join(p)
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use serde_json::{json, Value};

    use super::{run_batch, TestRunner};
    use crate::agent::Agent;
    use crate::cases::TestCase;
    use crate::config::{Config, ProviderKind, ScreenshotPolicy};
    use crate::conversation::ReasoningClient;
    use crate::mcp::{BrowserSession, CallToolResult, ToolTransport};
    use crate::providers::mock::{MockProvider, MockReply};
    use crate::report::{Reporter, RunExit, TestStatus};
    use crate::steps::ArtifactStore;
    use crate::types::ToolDef;

    struct NoopBrowser;

    #[async_trait]
    impl ToolTransport for NoopBrowser {
        async fn list_tools(&self) -> anyhow::Result<Vec<ToolDef>> {
            Ok(Vec::new())
        }

        async fn call_tool(&self, _name: &str, _args: Value) -> anyhow::Result<CallToolResult> {
            Ok(CallToolResult::text("ok"))
        }

        async fn shutdown(&self) {}
    }

    fn case(name: &str) -> TestCase {
        TestCase {
            name: name.to_string(),
            description: None,
            url: "https://x".to_string(),
            steps: vec!["open".to_string()],
            expected_results: vec!["page shown".to_string()],
            preconditions: Vec::new(),
            cleanup: None,
            path: format!("tests/{name}.json"),
            file_hash_hex: String::new(),
        }
    }

    #[tokio::test]
    async fn failing_middle_test_does_not_stop_the_batch() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let agent = Agent {
            client: ReasoningClient::new(
                MockProvider::scripted([
                    MockReply::text("PASS"),
                    MockReply::tool("browser_navigate", json!({"url": "https://x"})),
                    MockReply::text("FAIL: heading missing"),
                    MockReply::text("passed"),
                ]),
                "m",
                1024,
            ),
            session: BrowserSession::open(NoopBrowser).await.expect("open"),
            max_steps: 10,
            screenshots: ScreenshotPolicy::Never,
            artifacts: ArtifactStore::new(tmp.path()),
            reporter: Reporter::quiet(),
        };
        let cases = [case("one"), case("two"), case("three")];
        let r = run_batch(&agent, &cases).await;
        assert_eq!(r.total_tests, 3);
        assert_eq!(r.passed + r.failed + r.skipped, r.total_tests);
        assert_eq!(r.tests[1].status, TestStatus::Failed);
        assert_eq!(r.tests[1].steps.len(), 1);
        assert_eq!(r.tests[2].name, "three");
        assert_eq!(r.tests[2].status, TestStatus::Passed);

        // each test starts from a fresh conversation
        let reqs = agent.client.provider.requests();
        assert_eq!(reqs.len(), 4);
        assert_eq!(reqs[3].messages.len(), 1);
    }

    #[tokio::test]
    async fn empty_batch_is_zero_totals() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let agent = Agent {
            client: ReasoningClient::new(MockProvider::new(), "m", 1024),
            session: BrowserSession::open(NoopBrowser).await.expect("open"),
            max_steps: 10,
            screenshots: ScreenshotPolicy::Never,
            artifacts: ArtifactStore::new(tmp.path()),
            reporter: Reporter::quiet(),
        };
        let r = run_batch(&agent, &[]).await;
        assert_eq!(r.total_tests, 0);
        assert_eq!((r.passed, r.failed, r.skipped), (0, 0, 0));
    }

    fn mock_config() -> Config {
        let mut cfg = Config::default();
        cfg.llm.provider = ProviderKind::Mock;
        cfg.debug.log_steps = false;
        cfg
    }

    #[tokio::test]
    async fn no_matching_files_is_a_setup_error() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let report = TestRunner::new(mock_config(), tmp.path()).run().await;
        assert_eq!(report.exit, RunExit::SetupError);
        assert_eq!(report.result.total_tests, 0);
    }

    #[tokio::test]
    async fn connect_failure_is_a_setup_error() {
        let tmp = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir_all(tmp.path().join("tests")).expect("dir");
        std::fs::write(
            tmp.path().join("tests").join("login.json"),
            r#"{"name":"Login","url":"https://x","steps":["click login"],"expectedResults":["dashboard"]}"#,
        )
        .expect("case");
        let mut cfg = mock_config();
        cfg.browser.command = "e2e_nonexistent_browser_server".to_string();
        let report = TestRunner::new(cfg, tmp.path()).run().await;
        assert_eq!(report.exit, RunExit::SetupError);
        assert!(report.result.tests.is_empty());
        assert!(report.history_dir.is_none());
    }
}
