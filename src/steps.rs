use std::future::Future;
use std::path::PathBuf;

use anyhow::Context;
use base64::Engine;
use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Pending,
    Running,
    Passed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestStep {
    pub index: usize,
    pub description: String,
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<String>,
}

/// Append-only log of the tool calls dispatched during one test.
#[derive(Debug, Default)]
pub struct StepRecorder {
    steps: Vec<TestStep>,
}

impl StepRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a `running` step and returns its 1-based index.
    pub fn begin(&mut self, description: impl Into<String>) -> usize {
        let index = self.steps.len() + 1;
        self.steps.push(TestStep {
            index,
            description: description.into(),
            status: StepStatus::Running,
            error: None,
            screenshot: None,
        });
        index
    }

    pub fn pass(&mut self, index: usize) {
        if let Some(step) = self.get_mut(index) {
            step.status = StepStatus::Passed;
        }
    }

    pub fn fail(&mut self, index: usize, error: impl Into<String>) {
        if let Some(step) = self.get_mut(index) {
            step.status = StepStatus::Failed;
            step.error = Some(error.into());
        }
    }

    pub fn attach(&mut self, index: usize, screenshot: impl Into<String>) {
        if let Some(step) = self.get_mut(index) {
            step.screenshot = Some(screenshot.into());
        }
    }

    pub fn steps(&self) -> &[TestStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn into_steps(self) -> Vec<TestStep> {
        self.steps
    }

    fn get_mut(&mut self, index: usize) -> Option<&mut TestStep> {
        index.checked_sub(1).and_then(|i| self.steps.get_mut(i))
    }
}

/// Awaits `fut` and logs instead of propagating a failure. Used for
/// screenshot capture, which must never change a test's outcome.
pub async fn best_effort<T, F>(what: &str, fut: F) -> Option<T>
where
    F: Future<Output = anyhow::Result<T>>,
{
    match fut.await {
        Ok(v) => Some(v),
        Err(e) => {
            tracing::warn!(error = %format!("{e:#}"), "{what} failed; continuing");
            None
        }
    }
}

/// Per-run artifact directory. `screenshots/` is created on first write so
/// runs without captures leave no empty directory behind.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    run_dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(run_dir: impl Into<PathBuf>) -> Self {
        Self {
            run_dir: run_dir.into(),
        }
    }

    pub fn screenshots_dir(&self) -> PathBuf {
        self.run_dir.join("screenshots")
    }

    pub async fn save_screenshot(
        &self,
        base64_png: &str,
        test_name: &str,
        step_index: usize,
    ) -> anyhow::Result<PathBuf> {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(base64_png.trim())
            .context("screenshot payload is not valid base64")?;
        let dir = self.screenshots_dir();
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("failed to create {}", dir.display()))?;
        let path = dir.join(screenshot_file_name(test_name, step_index, OffsetDateTime::now_utc()));
        tokio::fs::write(&path, bytes)
            .await
            .with_context(|| format!("failed to write {}", path.display()))?;
        tracing::debug!(path = %path.display(), "screenshot saved");
        Ok(path)
    }
}

pub fn safe_test_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .take(50)
        .collect()
}

pub fn file_stamp(at: OffsetDateTime) -> String {
    at.format(&Rfc3339)
        .unwrap_or_else(|_| at.unix_timestamp().to_string())
        .replace([':', '.'], "-")
}

fn screenshot_file_name(test_name: &str, step_index: usize, at: OffsetDateTime) -> String {
    format!(
        "{}-step{}-{}.png",
        safe_test_name(test_name),
        step_index,
        file_stamp(at)
    )
}
