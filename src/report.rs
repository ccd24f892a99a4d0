use std::path::{Path, PathBuf};

use anyhow::Context;
use crossterm::style::Stylize;
use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::cases::CaseLoadError;
use crate::config::Config;
use crate::steps::{StepStatus, TestStep};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    Passed,
    Failed,
    Skipped,
}

impl TestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TestStatus::Passed => "passed",
            TestStatus::Failed => "failed",
            TestStatus::Skipped => "skipped",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResult {
    pub name: String,
    pub file_path: String,
    pub status: TestStatus,
    /// Milliseconds from loop entry to the terminal state.
    pub duration: u64,
    pub steps: Vec<TestStep>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub screenshots: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResult {
    pub run_id: String,
    pub timestamp: String,
    pub total_tests: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub duration: u64,
    pub tests: Vec<TestResult>,
}

impl RunResult {
    pub fn from_results(tests: Vec<TestResult>, started_at: OffsetDateTime, duration_ms: u64) -> Self {
        let mut passed = 0;
        let mut failed = 0;
        let mut skipped = 0;
        for t in &tests {
            match t.status {
                TestStatus::Passed => passed += 1,
                TestStatus::Failed => failed += 1,
                TestStatus::Skipped => skipped += 1,
            }
        }
        Self {
            run_id: Uuid::new_v4().to_string(),
            timestamp: rfc3339(started_at),
            total_tests: tests.len(),
            passed,
            failed,
            skipped,
            duration: duration_ms,
            tests,
        }
    }

    pub fn empty(started_at: OffsetDateTime) -> Self {
        Self::from_results(Vec::new(), started_at, 0)
    }
}

/// Process exit codes of the `run` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunExit {
    Ok = 0,
    FailedTests = 1,
    SetupError = 2,
}

impl RunExit {
    pub fn for_result(result: &RunResult) -> Self {
        if result.failed > 0 {
            RunExit::FailedTests
        } else {
            RunExit::Ok
        }
    }

    pub fn code(self) -> i32 {
        self as i32
    }
}

pub fn rfc3339(at: OffsetDateTime) -> String {
    at.format(&Rfc3339)
        .unwrap_or_else(|_| at.unix_timestamp().to_string())
}

/// Writes `results.json` into `run_dir` and returns its path. The
/// screenshots directory is created alongside when any test captured one.
pub fn save_history(run_dir: &Path, result: &RunResult) -> anyhow::Result<PathBuf> {
    std::fs::create_dir_all(run_dir)
        .with_context(|| format!("failed to create history dir {}", run_dir.display()))?;
    let path = run_dir.join("results.json");
    let json = serde_json::to_string_pretty(result)?;
    std::fs::write(&path, json).with_context(|| format!("failed to write {}", path.display()))?;
    if result.tests.iter().any(|t| !t.screenshots.is_empty()) {
        std::fs::create_dir_all(run_dir.join("screenshots"))?;
    }
    Ok(path)
}

pub fn write_junit(path: &Path, result: &RunResult) -> anyhow::Result<()> {
    let mut xml = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<testsuites>\n");
    xml.push_str(&format!(
        "<testsuite name=\"e2e-ai-tests\" tests=\"{}\" failures=\"{}\" skipped=\"{}\" errors=\"0\" time=\"{:.3}\" timestamp=\"{}\">\n",
        result.total_tests,
        result.failed,
        result.skipped,
        result.duration as f64 / 1000.0,
        xml_escape(&result.timestamp)
    ));
    for t in &result.tests {
        xml.push_str(&format!(
            "<testcase classname=\"{}\" name=\"{}\" time=\"{:.3}\">",
            xml_escape(&t.file_path),
            xml_escape(&t.name),
            t.duration as f64 / 1000.0
        ));
        match t.status {
            TestStatus::Failed => xml.push_str(&format!(
                "<failure message=\"{}\">{}</failure>",
                xml_escape(t.error.as_deref().unwrap_or("test failed")),
                xml_escape(&failure_body(t))
            )),
            TestStatus::Skipped => xml.push_str("<skipped/>"),
            TestStatus::Passed => {}
        }
        xml.push_str("</testcase>\n");
    }
    xml.push_str("</testsuite>\n</testsuites>\n");
    std::fs::write(path, xml).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

fn failure_body(t: &TestResult) -> String {
    t.steps
        .iter()
        .map(|s| {
            let mark = match s.status {
                StepStatus::Passed => "ok",
                StepStatus::Failed => "FAILED",
                StepStatus::Pending | StepStatus::Running => "...",
            };
            match &s.error {
                Some(e) => format!("{}. [{mark}] {} ({e})", s.index, s.description),
                None => format!("{}. [{mark}] {}", s.index, s.description),
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

/// Console output for humans. Diagnostics go through `tracing`; this only
/// renders the run as it progresses.
#[derive(Debug, Clone, Copy)]
pub struct Reporter {
    log_steps: bool,
}

impl Reporter {
    pub fn new(cfg: &Config) -> Self {
        Self {
            log_steps: cfg.debug.log_steps,
        }
    }

    pub fn quiet() -> Self {
        Self { log_steps: false }
    }

    pub fn start_run(&self, total: usize) {
        println!(
            "\n{}\n",
            format!("{} v{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
                .cyan()
                .bold()
        );
        println!("{}\n", format!("Running {total} test(s)...").dark_grey());
    }

    pub fn start_test(&self, name: &str, path: &str) {
        if self.log_steps {
            println!("\n{}", format!("▶ {name}").yellow());
            println!("{}", format!("  {path}").dark_grey());
        }
    }

    pub fn log_thinking(&self, text: &str) {
        if !self.log_steps || text.trim().is_empty() {
            return;
        }
        let head: String = text.chars().take(200).collect();
        println!("{}", format!("  │  [LLM] {head}").dark_grey());
    }

    pub fn log_tool_call(&self, name: &str, args: &serde_json::Value) {
        if !self.log_steps {
            return;
        }
        let rendered = match args.as_object() {
            Some(map) => map
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join(", "),
            None => args.to_string(),
        };
        println!("{}", format!("  │  [Tool] {name}({rendered})").blue());
    }

    pub fn log_step(&self, step: &TestStep) {
        if !self.log_steps {
            return;
        }
        let icon = match step.status {
            StepStatus::Passed => "✓".green(),
            StepStatus::Failed => "✗".red(),
            StepStatus::Pending | StepStatus::Running => "○".yellow(),
        };
        println!("  ├─ {icon} {}", step.description);
        if let Some(e) = &step.error {
            println!("{}", format!("  │  {e}").red());
        }
    }

    pub fn log_screenshot(&self, path: &Path) {
        if self.log_steps {
            println!(
                "{}",
                format!("  │  Screenshot saved: {}", path.display()).dark_grey()
            );
        }
    }

    pub fn end_test(&self, result: &TestResult) {
        let secs = format!("({:.1}s)", result.duration as f64 / 1000.0);
        let (icon, name) = match result.status {
            TestStatus::Passed => ("✓".green(), result.name.as_str().green()),
            TestStatus::Failed => ("✗".red(), result.name.as_str().red()),
            TestStatus::Skipped => ("○".yellow(), result.name.as_str().yellow()),
        };
        if self.log_steps {
            println!(
                "  └─ {icon} {} {secs}",
                result.status.as_str().to_uppercase()
            );
            if let Some(e) = &result.error {
                println!("{}", format!("\n     Error: {e}\n").red());
            }
        } else {
            println!("{icon} {name} {}", secs.dark_grey());
            if let Some(e) = &result.error {
                println!("{}", format!("  Error: {e}").red());
            }
        }
    }

    pub fn end_run(&self, result: &RunResult) {
        println!("{}", "\n─────────────────────────────────────\n".bold());
        let mut parts = vec![
            if result.passed > 0 {
                format!("{} passed", result.passed).green().to_string()
            } else {
                "0 passed".to_string()
            },
            if result.failed > 0 {
                format!("{} failed", result.failed).red().to_string()
            } else {
                "0 failed".to_string()
            },
        ];
        if result.skipped > 0 {
            parts.push(format!("{} skipped", result.skipped).yellow().to_string());
        }
        println!("Tests: {}", parts.join(", "));
        println!("Time: {:.1}s\n", result.duration as f64 / 1000.0);
    }

    pub fn load_errors(&self, errors: &[CaseLoadError]) {
        for e in errors {
            println!("{}", format!("✗ {} [{}] {}", e.path, e.code, e.message).red());
        }
    }

    pub fn error(&self, message: &str) {
        println!("{}", format!("\nError: {message}\n").red());
    }

    pub fn info(&self, message: &str) {
        println!("{}", message.cyan());
    }
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::{save_history, write_junit, RunExit, RunResult, TestResult, TestStatus};
    use crate::steps::{StepStatus, TestStep};

    fn result(name: &str, status: TestStatus) -> TestResult {
        TestResult {
            name: name.to_string(),
            file_path: format!("tests/{name}.json"),
            status,
            duration: 1500,
            steps: Vec::new(),
            error: (status == TestStatus::Failed).then(|| "FAIL: <missing> & gone".to_string()),
            screenshots: Vec::new(),
        }
    }

    #[test]
    fn totals_add_up() {
        let r = RunResult::from_results(
            vec![
                result("a", TestStatus::Passed),
                result("b", TestStatus::Failed),
                result("c", TestStatus::Skipped),
            ],
            datetime!(2025-03-01 10:00:00 UTC),
            4500,
        );
        assert_eq!(r.total_tests, 3);
        assert_eq!(r.passed + r.failed + r.skipped, r.total_tests);
        assert_eq!(r.timestamp, "2025-03-01T10:00:00Z");
        assert_eq!(RunExit::for_result(&r), RunExit::FailedTests);
    }

    #[test]
    fn empty_run_is_well_formed() {
        let r = RunResult::empty(datetime!(2025-03-01 10:00:00 UTC));
        assert_eq!(r.total_tests, 0);
        assert!(r.tests.is_empty());
        assert!(!r.run_id.is_empty());
        assert_eq!(RunExit::for_result(&r).code(), 0);
    }

    #[test]
    fn json_uses_camel_case_history_fields() {
        let r = RunResult::from_results(
            vec![result("login", TestStatus::Passed)],
            datetime!(2025-03-01 10:00:00 UTC),
            10,
        );
        let v = serde_json::to_value(&r).expect("json");
        assert_eq!(v["totalTests"], 1);
        assert_eq!(v["tests"][0]["filePath"], "tests/login.json");
        assert_eq!(v["tests"][0]["status"], "passed");
        assert!(v["tests"][0].get("error").is_none());
    }

    #[test]
    fn history_writes_results_and_screenshots_dir() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let mut t = result("login", TestStatus::Failed);
        t.screenshots.push("shot.png".to_string());
        let r = RunResult::from_results(vec![t], datetime!(2025-03-01 10:00:00 UTC), 10);
        let run_dir = tmp.path().join("2025-03-01T10-00-00Z");
        let path = save_history(&run_dir, &r).expect("save");
        let parsed: RunResult =
            serde_json::from_str(&std::fs::read_to_string(path).expect("read")).expect("parse");
        assert_eq!(parsed, r);
        assert!(run_dir.join("screenshots").is_dir());
    }

    #[test]
    fn junit_escapes_and_lists_steps() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let mut failed = result("checkout", TestStatus::Failed);
        failed.steps.push(TestStep {
            index: 1,
            description: "Click on \"Pay\"".to_string(),
            status: StepStatus::Failed,
            error: Some("ref not found".to_string()),
            screenshot: None,
        });
        let r = RunResult::from_results(
            vec![result("login", TestStatus::Passed), failed],
            datetime!(2025-03-01 10:00:00 UTC),
            3000,
        );
        let out = tmp.path().join("junit.xml");
        write_junit(&out, &r).expect("junit");
        let xml = std::fs::read_to_string(out).expect("read");
        assert!(xml.contains("tests=\"2\" failures=\"1\""));
        assert!(xml.contains("FAIL: &lt;missing&gt; &amp; gone"));
        assert!(xml.contains("1. [FAILED] Click on &quot;Pay&quot; (ref not found)"));
        assert!(xml.contains("<testcase classname=\"tests/login.json\" name=\"login\" time=\"1.500\"></testcase>"));
    }
}
