use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use rockscope_core::build_times::BuildTimes;
use rockscope_core::ninja::load_ninja_log;

pub fn run(
    build_dir: &Path,
    ninja_log: Option<PathBuf>,
    output: Option<PathBuf>,
    json: bool,
) -> anyhow::Result<ExitCode> {
    let ninja_log = ninja_log.unwrap_or_else(|| build_dir.join(".ninja_log"));
    let output = output.unwrap_or_else(|| build_dir.join("logs").join("build_time_analysis.html"));

    let tasks = load_ninja_log(&ninja_log)
        .with_context(|| format!("reading ninja log {}", ninja_log.display()))?;

    // Outputs recorded with absolute paths are made relative to the build dir.
    let absolute_build_dir = std::fs::canonicalize(build_dir).unwrap_or_else(|_| build_dir.to_path_buf());
    let prefix = absolute_build_dir.to_string_lossy();
    let times = BuildTimes::aggregate(&tasks, Some(prefix.as_ref()));
    let report = times.report();
    tracing::info!(
        tasks = tasks.len(),
        components = report.components.len(),
        dependencies = report.dependencies.len(),
        "Aggregated build times"
    );

    super::ensure_parent_dir(&output)?;
    std::fs::write(&output, report.render_html())
        .with_context(|| format!("writing {}", output.display()))?;
    tracing::info!(path = %output.display(), "Wrote build time report");

    if json {
        super::print_json(&report)?;
    } else {
        println!("Build time report written to {}", output.display());
    }
    Ok(ExitCode::SUCCESS)
}
