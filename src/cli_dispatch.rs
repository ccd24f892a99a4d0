use std::path::Path;

use crossterm::style::Stylize;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::cases::load_cases;
use crate::cli_args::{ListArgs, RunArgs};
use crate::config::{apply_cli_overrides, load_config, validate_config, CliOverrides, Config};
use crate::report::{write_junit, Reporter, RunExit};
use crate::runner::TestRunner;

/// `RUST_LOG` wins; otherwise `debug` when requested, else `info`. Logs go
/// to stderr so they never interleave with the console report on stdout.
pub fn init_tracing(debug: bool) {
    let level = if debug { "debug" } else { "info" };
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .try_init();
}

pub async fn handle_run_command(args: &RunArgs, workdir: &Path) -> RunExit {
    let cfg = match prepare_config(
        workdir,
        args.config.as_deref(),
        &CliOverrides {
            headed: args.headed,
            debug: args.debug,
            pattern: args.pattern.clone(),
        },
    ) {
        Ok(c) => c,
        Err(e) => return setup_error(&e),
    };
    if let Err(e) = validate_config(&cfg) {
        return setup_error(&e);
    }

    let report = TestRunner::new(cfg, workdir).run().await;
    if let Some(path) = &args.junit_out {
        match write_junit(path, &report.result) {
            Ok(()) => tracing::info!(path = %path.display(), "wrote JUnit report"),
            Err(e) => tracing::error!(error = %format!("{e:#}"), "failed to write JUnit report"),
        }
    }
    report.exit
}

pub fn handle_list_command(args: &ListArgs, workdir: &Path) -> RunExit {
    let cfg = match prepare_config(
        workdir,
        args.config.as_deref(),
        &CliOverrides {
            pattern: args.pattern.clone(),
            ..CliOverrides::default()
        },
    ) {
        Ok(c) => c,
        Err(e) => return setup_error(&e),
    };
    let loaded = load_cases(workdir, &cfg.tests.pattern);
    for case in &loaded.cases {
        println!(
            "{} {}  {}",
            "✓".green(),
            case.name,
            format!(
                "{} ({} steps, {} expected, sha256 {})",
                case.path,
                case.steps.len(),
                case.expected_results.len(),
                case.short_hash()
            )
            .dark_grey()
        );
    }
    Reporter::quiet().load_errors(&loaded.errors);
    println!(
        "\n{} valid, {} invalid (pattern: {})",
        loaded.cases.len(),
        loaded.errors.len(),
        cfg.tests.pattern
    );
    if loaded.cases.is_empty() || !loaded.errors.is_empty() {
        RunExit::SetupError
    } else {
        RunExit::Ok
    }
}

fn prepare_config(
    workdir: &Path,
    explicit: Option<&Path>,
    overrides: &CliOverrides,
) -> anyhow::Result<Config> {
    let mut cfg = load_config(workdir, explicit)?;
    apply_cli_overrides(&mut cfg, overrides);
    Ok(cfg)
}

fn setup_error(e: &anyhow::Error) -> RunExit {
    let msg = format!("{e:#}");
    tracing::error!(error = %msg, "setup failed");
    Reporter::quiet().error(&msg);
    RunExit::SetupError
}
