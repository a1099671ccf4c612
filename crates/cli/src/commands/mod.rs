//! Command handlers.
//!
//! Each handler parses its inputs, calls into `rockscope-core` and decides
//! the process exit code. Report output goes to stdout, logs to stderr.

mod build_times;
mod ci;
mod memory;
mod test_results;
mod topology;

use std::path::Path;
use std::process::ExitCode;

use anyhow::Context;
use serde::Serialize;

use crate::cli::{Cli, Commands};
use crate::config::ToolConfig;

/// Envelope for `--json` output.
#[derive(Serialize)]
struct JsonOut<T: Serialize> {
    ok: bool,
    data: T,
}

fn print_json<T: Serialize>(data: T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(&JsonOut { ok: true, data })?);
    Ok(())
}

/// Map a child or suite exit status onto the process exit code.
fn exit_code(code: i32) -> ExitCode {
    match u8::try_from(code) {
        Ok(c) => ExitCode::from(c),
        Err(_) => ExitCode::FAILURE,
    }
}

/// Append to the step summary when running under GitHub Actions. Failures
/// are logged, never fatal.
fn append_step_summary(config: &ToolConfig, markdown: &str) {
    if let Some(path) = &config.github_step_summary {
        if let Err(e) = rockscope_core::github::append_step_summary(path, markdown) {
            tracing::warn!(path = %path.display(), error = %e, "Failed to append step summary");
        }
    }
}

fn ensure_parent_dir(path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    Ok(())
}

pub async fn run(cli: Cli, config: &ToolConfig) -> anyhow::Result<ExitCode> {
    let json = cli.json;
    match cli.command {
        Commands::Topology { topology } => topology::run(&topology, json),
        Commands::BuildTimes {
            build_dir,
            ninja_log,
            output,
        } => build_times::run(&build_dir, ninja_log, output, json),
        Commands::CaptureTests {
            suite,
            command,
            working_dir,
            timeout_secs,
            retries,
        } => test_results::capture(suite, command, working_dir, timeout_secs, retries, json).await,
        Commands::ParseTests { suite, log } => test_results::parse(suite, &log, json),
        Commands::TestReport {
            results_dir,
            output_json,
            output_html,
        } => test_results::report(&results_dir, &output_json, &output_html, json),
        Commands::GithubSummary { results_file } => test_results::github_summary(&results_file, config),
        Commands::CiPaths {
            base_ref,
            repo,
            config: filter_config,
        } => ci::run(&base_ref, repo, filter_config, config, json).await,
        Commands::MemoryMonitor {
            phase,
            interval,
            log_file,
            background,
            max_runtime,
            stop_signal_file,
            command,
        } => {
            let args = memory::MonitorArgs {
                phase,
                interval: interval.unwrap_or(config.memory_interval),
                log_file: log_file.or_else(|| config.memory_log_file.clone()),
                background,
                max_runtime,
                stop_signal_file,
                command,
            };
            memory::run(args, config, json).await
        }
    }
}
