use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use rockscope_core::process::{run_command, CommandSpec, ProcessError, TIMEOUT_EXIT_CODE};
use rockscope_core::testing::report::{aggregate_dir, TestReport};
use rockscope_core::testing::summary::render_github_summary;
use rockscope_core::testing::{TestCounts, TestFramework, TestSuiteResult};

use crate::cli::SuiteArgs;
use crate::config::ToolConfig;

const CTEST_RERUN: &str = "ctest --rerun-failed --output-on-failure";

fn record(result: &TestSuiteResult, results_dir: &Path, json: bool) -> anyhow::Result<()> {
    let path = result.write_to_dir(results_dir)?;
    tracing::info!(
        component = %result.component,
        framework = %result.framework,
        total = result.counts.total,
        passed = result.counts.passed,
        failed = result.counts.failed,
        skipped = result.counts.skipped,
        path = %path.display(),
        "Recorded test results"
    );
    if json {
        super::print_json(result)?;
    } else {
        println!(
            "{}: {} total, {} passed, {} failed, {} skipped ({:.1}% success)",
            result.component,
            result.counts.total,
            result.counts.passed,
            result.counts.failed,
            result.counts.skipped,
            result.counts.success_rate_pct()
        );
        for name in &result.counts.failed_tests {
            println!("  FAILED {name}");
        }
    }
    Ok(())
}

/// Re-run failed ctest tests, folding each attempt into `counts`.
///
/// Returns the exit code of the last attempt, or `exit_code` when no rerun
/// happened.
async fn rerun_failed(
    counts: &mut TestCounts,
    mut exit_code: i32,
    working_dir: Option<&PathBuf>,
    timeout: Duration,
    retries: u32,
) -> anyhow::Result<i32> {
    let mut attempt = 0;
    while counts.failed > 0 && attempt < retries {
        attempt += 1;
        tracing::info!(attempt, retries, failed = counts.failed, "Re-running failed tests");
        let mut spec = CommandSpec::shell(CTEST_RERUN).timeout(timeout);
        if let Some(dir) = working_dir {
            spec = spec.working_dir(dir);
        }
        let output = match run_command(&spec).await {
            Ok(output) => output,
            Err(ProcessError::Timeout { elapsed_ms }) => {
                tracing::warn!(attempt, elapsed_ms, "Re-run timed out");
                exit_code = TIMEOUT_EXIT_CODE;
                break;
            }
            Err(e) => return Err(e.into()),
        };
        exit_code = output.exit_code;
        let rerun = TestFramework::Ctest.parse(&output.combined())?;
        counts.apply_rerun(&rerun);
        tracing::info!(
            attempt,
            exit_code,
            still_failing = counts.failed,
            "Re-run finished"
        );
    }
    Ok(exit_code)
}

pub async fn capture(
    suite: SuiteArgs,
    command: String,
    working_dir: Option<PathBuf>,
    timeout_secs: u64,
    retries: u32,
    json: bool,
) -> anyhow::Result<ExitCode> {
    let framework = TestFramework::from(suite.framework);
    let timeout = Duration::from_secs(timeout_secs);
    let mut spec = CommandSpec::shell(command).timeout(timeout);
    if let Some(dir) = &working_dir {
        spec = spec.working_dir(dir);
    }
    tracing::info!(command = %spec.display(), component = %suite.component, "Running tests");

    let (mut counts, mut command_exit_code, duration) = match run_command(&spec).await {
        Ok(output) => (
            framework.parse(&output.combined())?,
            output.exit_code,
            output.duration,
        ),
        Err(ProcessError::Timeout { elapsed_ms }) => {
            tracing::error!(elapsed_ms, component = %suite.component, "Test command timed out");
            (TestCounts::default(), TIMEOUT_EXIT_CODE, timeout)
        }
        Err(e) => return Err(e.into()),
    };

    if framework == TestFramework::Ctest {
        command_exit_code =
            rerun_failed(&mut counts, command_exit_code, working_dir.as_ref(), timeout, retries).await?;
    }

    let result = TestSuiteResult::from_counts(
        &suite.component,
        &suite.test_type,
        framework,
        counts,
        command_exit_code,
        duration.as_secs_f64(),
    );
    record(&result, &suite.results_dir, json)?;
    Ok(super::exit_code(result.exit_code))
}

pub fn parse(suite: SuiteArgs, log: &Path, json: bool) -> anyhow::Result<ExitCode> {
    let text = if log.as_os_str() == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("reading test output from stdin")?;
        buf
    } else {
        std::fs::read_to_string(log).with_context(|| format!("reading {}", log.display()))?
    };

    let framework = TestFramework::from(suite.framework);
    let counts = framework.parse(&text)?;
    let result = TestSuiteResult::from_counts(
        &suite.component,
        &suite.test_type,
        framework,
        counts,
        0,
        0.0,
    );
    record(&result, &suite.results_dir, json)?;
    Ok(super::exit_code(result.exit_code))
}

pub fn report(
    results_dir: &Path,
    output_json: &Path,
    output_html: &Path,
    json: bool,
) -> anyhow::Result<ExitCode> {
    let report = aggregate_dir(results_dir)?;

    super::ensure_parent_dir(output_json)?;
    report.write_json(output_json)?;
    super::ensure_parent_dir(output_html)?;
    std::fs::write(output_html, report.render_html())
        .with_context(|| format!("writing {}", output_html.display()))?;
    tracing::info!(
        suites = report.test_suites.len(),
        json = %output_json.display(),
        html = %output_html.display(),
        "Wrote test report"
    );

    if json {
        super::print_json(&report)?;
    } else {
        print!("{}", report.render_text());
    }

    if report.has_failures() {
        Ok(ExitCode::FAILURE)
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

pub fn github_summary(results_file: &Path, config: &ToolConfig) -> anyhow::Result<ExitCode> {
    if !results_file.exists() {
        anyhow::bail!("results file not found: {}", results_file.display());
    }
    let report = TestReport::load(results_file)?;
    let markdown = render_github_summary(&report, &config.run_link());
    print!("{markdown}");
    super::append_step_summary(config, &markdown);
    Ok(ExitCode::SUCCESS)
}
