use std::fs;
use std::time::Duration;

use e2e_ai_tests::agent::Agent;
use e2e_ai_tests::cases::{CleanupOptions, TestCase};
use e2e_ai_tests::config::{Config, ProviderKind, ScreenshotPolicy};
use e2e_ai_tests::conversation::ReasoningClient;
use e2e_ai_tests::mcp::{BrowserSession, McpClient, McpError, ToolTransport};
use e2e_ai_tests::providers::mock::{MockProvider, MockReply};
use e2e_ai_tests::report::{Reporter, RunExit, TestStatus};
use e2e_ai_tests::runner::TestRunner;
use e2e_ai_tests::steps::{ArtifactStore, StepStatus};
use serde_json::json;
use tempfile::tempdir;

fn stub_bin() -> Option<String> {
    std::env::var("CARGO_BIN_EXE_mcp_stub").ok()
}

async fn connect(stub: &str, args: &[String]) -> BrowserSession<McpClient> {
    let client = McpClient::connect(stub, args, Duration::from_secs(5), Duration::from_secs(10))
        .await
        .expect("connect stub");
    BrowserSession::open(client).await.expect("open session")
}

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

#[tokio::test]
async fn handshake_lists_browser_tools() {
    let Some(stub) = stub_bin() else {
        eprintln!("skipping: CARGO_BIN_EXE_mcp_stub not set");
        return;
    };
    let session = connect(&stub, &[]).await;
    let names = session
        .tools()
        .iter()
        .map(|t| t.name.as_str())
        .collect::<Vec<_>>();
    assert!(names.contains(&"browser_navigate"));
    assert!(names.contains(&"browser_take_screenshot"));
    assert_eq!(
        session.tools()[0].input_schema["required"],
        json!(["url"])
    );
    session.close().await;
}

#[tokio::test]
async fn tool_reported_error_surfaces_as_failure() {
    let Some(stub) = stub_bin() else {
        eprintln!("skipping: CARGO_BIN_EXE_mcp_stub not set");
        return;
    };
    let session = connect(&stub, &[]).await;
    let err = session
        .call("browser_click", json!({"ref": "missing"}))
        .await
        .expect_err("isError result");
    let typed = err.downcast_ref::<McpError>().expect("typed MCP error");
    assert!(matches!(typed, McpError::ToolReported { tool, .. } if tool == "browser_click"));

    // the session is still usable after a failed call
    let shot = session.screenshot().await.expect("screenshot");
    assert!(shot.is_some_and(|s| s.starts_with("iVBOR")));
    session.transport().shutdown().await;
}

#[tokio::test]
async fn agent_runs_case_against_stub_browser() {
    let Some(stub) = stub_bin() else {
        eprintln!("skipping: CARGO_BIN_EXE_mcp_stub not set");
        return;
    };
    let tmp = tempdir().expect("tempdir");
    let call_log = tmp.path().join("calls.txt");
    let session = connect(&stub, &[call_log.display().to_string()]).await;
    let agent = Agent {
        client: ReasoningClient::new(
            MockProvider::scripted([
                MockReply::tool("browser_navigate", json!({"url": "https://x"})),
                MockReply::ToolCalls(vec![
                    ("browser_click".to_string(), json!({"element": "Login", "ref": "missing"})),
                    ("browser_snapshot".to_string(), json!({})),
                ]),
                MockReply::text("PASS: dashboard is visible"),
            ]),
            "mock-model",
            1024,
        ),
        session,
        max_steps: 10,
        screenshots: ScreenshotPolicy::OnFailure,
        artifacts: ArtifactStore::new(tmp.path().join("run")),
        reporter: Reporter::quiet(),
    };
    let mut case = login_case();
    case.cleanup = Some(CleanupOptions {
        local_storage: true,
        ..CleanupOptions::default()
    });

    let r = agent.run(&case).await;
    assert_eq!(r.status, TestStatus::Passed);
    let statuses = r.steps.iter().map(|s| s.status).collect::<Vec<_>>();
    assert_eq!(
        statuses,
        vec![StepStatus::Passed, StepStatus::Failed, StepStatus::Passed]
    );
    assert_eq!(r.steps[1].description, "Click on \"Login\"");
    assert!(r.steps[1].screenshot.is_some());
    agent.session.close().await;

    let calls = fs::read_to_string(&call_log).expect("call log");
    let calls = calls.lines().collect::<Vec<_>>();
    assert_eq!(
        calls,
        vec![
            "browser_navigate",
            "browser_click",
            "browser_take_screenshot",
            "browser_snapshot",
            "browser_evaluate"
        ]
    );
}

#[tokio::test]
async fn runner_writes_history_for_mock_run() {
    let Some(stub) = stub_bin() else {
        eprintln!("skipping: CARGO_BIN_EXE_mcp_stub not set");
        return;
    };
    let tmp = tempdir().expect("tempdir");
    let tests_dir = tmp.path().join("tests");
    fs::create_dir_all(&tests_dir).expect("tests dir");
    fs::write(
        tests_dir.join("login.json"),
        r#"{"name":"Login","url":"https://x","steps":["click login"],"expectedResults":["dashboard visible"]}"#,
    )
    .expect("login");
    fs::write(tests_dir.join("broken.json"), "{").expect("broken");

    let mut cfg = Config::default();
    cfg.llm.provider = ProviderKind::Mock;
    cfg.browser.command = stub;
    cfg.browser.args = Vec::new();
    cfg.debug.log_steps = false;

    let report = TestRunner::new(cfg, tmp.path()).run().await;
    assert_eq!(report.exit, RunExit::Ok);
    assert_eq!(report.result.total_tests, 1);
    assert_eq!(report.result.passed, 1);
    let dir = report.history_dir.expect("history dir");
    assert!(dir.starts_with(tmp.path().join(".e2e-results")));
    let saved = fs::read_to_string(dir.join("results.json")).expect("results.json");
    assert!(saved.contains("\"totalTests\": 1"));
}
