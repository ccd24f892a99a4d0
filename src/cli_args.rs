use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("E2E_GIT_SHA"),
    " ",
    env!("E2E_TARGET"),
    ")"
);

#[derive(Debug, Parser)]
#[command(
    name = "e2e-ai-tests",
    version,
    long_version = LONG_VERSION,
    about = "Run natural-language E2E browser tests through an LLM and Playwright MCP"
)]
pub struct Cli {
    /// Working directory; test patterns and relative paths resolve against it.
    #[arg(long, global = true)]
    pub workdir: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the matching test files.
    Run(RunArgs),
    /// Validate and list the matching test files without running them.
    List(ListArgs),
}

#[derive(Debug, Clone, Default, Args)]
pub struct RunArgs {
    /// Glob pattern for test files (defaults to tests.pattern from config).
    pub pattern: Option<String>,
    /// Show the browser window.
    #[arg(long)]
    pub headed: bool,
    /// Log every step and capture a screenshot after each action.
    #[arg(long)]
    pub debug: bool,
    /// Config file path.
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,
    /// Also write a JUnit XML report to this path.
    #[arg(long)]
    pub junit_out: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Args)]
pub struct ListArgs {
    pub pattern: Option<String>,
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,
}
