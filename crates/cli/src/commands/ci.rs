use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use rockscope_core::path_filters::{parse_name_only, PathFilterConfig, PathFilters};
use rockscope_core::process::{run_command, CommandSpec, ProcessError};

use crate::config::ToolConfig;

const GIT_DIFF_TIMEOUT: Duration = Duration::from_secs(60);

/// Paths modified since `base_ref`, or `None` when git timed out.
async fn modified_paths(base_ref: &str, repo: Option<&Path>) -> anyhow::Result<Option<Vec<String>>> {
    let mut spec = CommandSpec::new("git", ["diff", "--name-only", base_ref]).timeout(GIT_DIFF_TIMEOUT);
    if let Some(dir) = repo {
        spec = spec.working_dir(dir);
    }
    match run_command(&spec).await {
        Ok(output) if output.success() => Ok(Some(parse_name_only(&output.stdout))),
        Ok(output) => anyhow::bail!(
            "git diff against {base_ref} failed with exit code {}: {}",
            output.exit_code,
            output.stderr.trim()
        ),
        Err(ProcessError::Timeout { elapsed_ms }) => {
            tracing::warn!(elapsed_ms, base_ref, "git diff timed out");
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

pub async fn run(
    base_ref: &str,
    repo: Option<PathBuf>,
    filter_config: Option<PathBuf>,
    config: &ToolConfig,
    json: bool,
) -> anyhow::Result<ExitCode> {
    let filters = match &filter_config {
        Some(path) => {
            let cfg = PathFilterConfig::load(path)
                .with_context(|| format!("loading path filter config {}", path.display()))?;
            PathFilters::from_config(&cfg)?
        }
        None => PathFilters::new(None, None)?,
    };

    let paths = modified_paths(base_ref, repo.as_deref()).await?;
    let decision = filters.decide(paths.as_deref());

    if json {
        super::print_json(serde_json::json!({
            "run_ci": decision.required,
            "reason": decision.reason(),
            "modified_paths": paths,
            "decision": decision,
        }))?;
    } else {
        println!("run_ci={}", decision.required);
        println!("reason: {}", decision.reason());
    }

    if let Some(output) = &config.github_output {
        rockscope_core::github::write_outputs(output, &[("run_ci", decision.required.to_string())])?;
    }
    Ok(ExitCode::SUCCESS)
}
