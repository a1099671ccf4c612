use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use rockscope_core::memory::{MemoryMonitor, MemorySample, MonitorConfig, MonitorReport};
use tokio_util::sync::CancellationToken;

use crate::config::ToolConfig;

/// Exit status reported when the wrapped command is interrupted.
const INTERRUPTED_EXIT_CODE: i32 = 130;

pub struct MonitorArgs {
    pub phase: String,
    pub interval: Duration,
    pub log_file: Option<PathBuf>,
    pub background: bool,
    pub max_runtime: Option<Duration>,
    pub stop_signal_file: Option<PathBuf>,
    pub command: Vec<String>,
}

impl MonitorArgs {
    fn monitor_config(&self) -> MonitorConfig {
        MonitorConfig {
            phase: self.phase.clone(),
            interval: self.interval,
            log_file: self.log_file.clone(),
            max_runtime: self.max_runtime,
            stop_signal_file: self.stop_signal_file.clone(),
        }
    }
}

pub async fn run(args: MonitorArgs, config: &ToolConfig, json: bool) -> anyhow::Result<ExitCode> {
    if !args.command.is_empty() {
        return run_wrapped(args, config, json).await;
    }
    if args.background {
        return run_background(args, config, json).await;
    }

    let sample = MemorySample::collect(&args.phase)?;
    if json {
        super::print_json(&sample)?;
    } else {
        println!("{}", sample.format());
    }
    Ok(ExitCode::SUCCESS)
}

fn report_summary(report: &MonitorReport, config: &ToolConfig, json: bool) -> anyhow::Result<()> {
    let Some(summary) = report.summary() else {
        tracing::warn!(phase = %report.phase, "No memory samples collected");
        return Ok(());
    };
    if json {
        super::print_json(&summary)?;
    } else {
        print!("{}", summary.render_text());
    }
    super::append_step_summary(config, &summary.render_markdown());
    Ok(())
}

/// Monitor while the command runs and exit with its status.
async fn run_wrapped(args: MonitorArgs, config: &ToolConfig, json: bool) -> anyhow::Result<ExitCode> {
    let program = &args.command[0];
    let mut child = tokio::process::Command::new(program)
        .args(&args.command[1..])
        .kill_on_drop(true)
        .spawn()
        .with_context(|| format!("spawning {program}"))?;
    let monitor = MemoryMonitor::spawn(args.monitor_config(), CancellationToken::new());
    tracing::info!(command = %args.command.join(" "), phase = %args.phase, "Started monitored command");

    let status = tokio::select! {
        status = child.wait() => Some(status),
        _ = tokio::signal::ctrl_c() => None,
    };
    let exit_code = match status {
        Some(status) => status.with_context(|| format!("waiting for {program}"))?.code().unwrap_or(1),
        None => {
            tracing::warn!("Interrupted, stopping monitored command");
            if let Err(e) = child.kill().await {
                tracing::warn!(error = %e, "Failed to kill monitored command");
            }
            INTERRUPTED_EXIT_CODE
        }
    };
    tracing::info!(exit_code, phase = %args.phase, "Monitored command finished");

    let report = monitor.stop().await;
    report_summary(&report, config, json)?;
    Ok(super::exit_code(exit_code))
}

/// Monitor until interrupted or until the monitor stops itself.
async fn run_background(args: MonitorArgs, config: &ToolConfig, json: bool) -> anyhow::Result<ExitCode> {
    let monitor = MemoryMonitor::spawn(args.monitor_config(), CancellationToken::new());
    let token = monitor.token();
    tracing::info!(phase = %args.phase, interval_secs = args.interval.as_secs_f64(), "Monitoring memory in the background");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => tracing::info!("Interrupted, stopping memory monitor"),
        _ = token.cancelled() => tracing::info!("Memory monitor stopped"),
    }

    let report = monitor.stop().await;
    report_summary(&report, config, json)?;
    Ok(ExitCode::SUCCESS)
}
