use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::providers::anthropic::DEFAULT_BASE_URL;

pub const CONFIG_CANDIDATES: &[&str] = &["e2e.config.json", "e2e-ai.config.json", "e2e.config.yaml"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Anthropic,
    Mock,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScreenshotPolicy {
    OnFailure,
    Always,
    Never,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LlmConfig {
    pub provider: ProviderKind,
    pub model: String,
    pub api_key: String,
    pub base_url: String,
    pub max_tokens: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::Anthropic,
            model: "claude-sonnet-4-20250514".to_string(),
            api_key: String::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            max_tokens: 4096,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BrowserConfig {
    pub headless: bool,
    pub viewport: Viewport,
    pub command: String,
    pub args: Vec<String>,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            viewport: Viewport::default(),
            command: "npx".to_string(),
            args: vec!["@playwright/mcp@latest".to_string()],
        }
    }
}

impl BrowserConfig {
    /// Full argument list for the MCP server process.
    pub fn server_args(&self) -> Vec<String> {
        let mut args = self.args.clone();
        if self.headless {
            args.push("--headless".to_string());
        }
        args.push("--viewport-size".to_string());
        args.push(format!("{}x{}", self.viewport.width, self.viewport.height));
        args
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ExecutionConfig {
    pub max_steps_per_test: usize,
    pub retry_attempts: u32,
    pub timeout: u64,
    /// Budget for spawning the browser server and the `initialize` handshake.
    pub connect_timeout: u64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_steps_per_test: 50,
            retry_attempts: 3,
            timeout: 30_000,
            connect_timeout: 180_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TestsConfig {
    pub pattern: String,
}

impl Default for TestsConfig {
    fn default() -> Self {
        Self {
            pattern: "tests/**/*.json".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DebugConfig {
    pub screenshots: ScreenshotPolicy,
    pub log_steps: bool,
    pub headed: bool,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            screenshots: ScreenshotPolicy::OnFailure,
            log_steps: true,
            headed: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    pub enabled: bool,
    pub directory: PathBuf,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            directory: PathBuf::from(".e2e-results"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub llm: LlmConfig,
    pub browser: BrowserConfig,
    pub execution: ExecutionConfig,
    pub tests: TestsConfig,
    pub debug: DebugConfig,
    pub history: HistoryConfig,
}

#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub headed: bool,
    pub debug: bool,
    pub pattern: Option<String>,
}

/// Loads configuration from `explicit` or the first candidate file found in
/// `workdir`, then applies environment overrides and validates.
pub fn load_config(workdir: &Path, explicit: Option<&Path>) -> anyhow::Result<Config> {
    let lookup = |k: &str| std::env::var(k).ok();
    let path = match explicit {
        Some(p) if p.is_absolute() => Some(p.to_path_buf()),
        Some(p) => Some(workdir.join(p)),
        None => CONFIG_CANDIDATES
            .iter()
            .map(|c| workdir.join(c))
            .find(|p| p.exists()),
    };
    let mut cfg = match path {
        Some(p) => {
            tracing::debug!(path = %p.display(), "loading config file");
            parse_config_file(&p, &lookup)?
        }
        None => Config::default(),
    };
    apply_env_overrides(&mut cfg, &lookup);
    Ok(cfg)
}

pub fn parse_config_file(
    path: &Path,
    lookup: &dyn Fn(&str) -> Option<String>,
) -> anyhow::Result<Config> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    let is_yaml = matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    );
    let mut value: Value = if is_yaml {
        serde_yaml::from_str(&raw)
            .with_context(|| format!("failed to parse config file {}", path.display()))?
    } else {
        serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse config file {}", path.display()))?
    };
    substitute_env_vars(&mut value, lookup);
    serde_json::from_value(value)
        .with_context(|| format!("invalid config file {}", path.display()))
}

/// Replaces `${NAME}` placeholders; unknown variables become empty strings.
pub fn resolve_env_vars(input: &str, lookup: &dyn Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) if end > 0 => {
                out.push_str(&lookup(&after[..end]).unwrap_or_default());
                rest = &after[end + 1..];
            }
            _ => {
                out.push_str(&rest[start..start + 2]);
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

fn substitute_env_vars(value: &mut Value, lookup: &dyn Fn(&str) -> Option<String>) {
    match value {
        Value::String(s) if s.contains("${") => *s = resolve_env_vars(s, lookup),
        Value::Array(items) => items
            .iter_mut()
            .for_each(|v| substitute_env_vars(v, lookup)),
        Value::Object(map) => map
            .values_mut()
            .for_each(|v| substitute_env_vars(v, lookup)),
        _ => {}
    }
}

pub fn apply_env_overrides(cfg: &mut Config, lookup: &dyn Fn(&str) -> Option<String>) {
    if cfg.llm.api_key.is_empty() {
        cfg.llm.api_key = lookup("ANTHROPIC_API_KEY").unwrap_or_default();
    }
    if lookup("E2E_HEADED").as_deref().and_then(parse_toggle) == Some(true) {
        cfg.debug.headed = true;
        cfg.browser.headless = false;
    }
    if lookup("E2E_DEBUG").as_deref().and_then(parse_toggle) == Some(true) {
        cfg.debug.log_steps = true;
        cfg.debug.screenshots = ScreenshotPolicy::Always;
    }
}

pub fn apply_cli_overrides(cfg: &mut Config, cli: &CliOverrides) {
    if cli.headed {
        cfg.debug.headed = true;
        cfg.browser.headless = false;
    }
    if cli.debug {
        cfg.debug.log_steps = true;
        cfg.debug.screenshots = ScreenshotPolicy::Always;
    }
    if let Some(p) = cli.pattern.as_ref().filter(|p| !p.trim().is_empty()) {
        cfg.tests.pattern = p.clone();
    }
}

pub fn validate_config(cfg: &Config) -> anyhow::Result<()> {
    if cfg.llm.provider == ProviderKind::Anthropic && cfg.llm.api_key.trim().is_empty() {
        bail!("ANTHROPIC_API_KEY environment variable or llm.apiKey is required");
    }
    if cfg.llm.model.trim().is_empty() {
        bail!("llm.model must not be empty");
    }
    if cfg.execution.max_steps_per_test == 0 {
        bail!("execution.maxStepsPerTest must be at least 1");
    }
    if cfg.execution.timeout == 0 || cfg.execution.connect_timeout == 0 {
        bail!("execution.timeout and execution.connectTimeout must be > 0");
    }
    if cfg.browser.viewport.width == 0 || cfg.browser.viewport.height == 0 {
        bail!("browser.viewport width and height must be > 0");
    }
    if cfg.tests.pattern.trim().is_empty() {
        bail!("tests.pattern must not be empty");
    }
    Ok(())
}

fn parse_toggle(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "on" | "true" | "1" | "yes" => Some(true),
        "off" | "false" | "0" | "no" => Some(false),
        _ => None,
    }
}
