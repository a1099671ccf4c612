use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use rockscope_core::memory::DEFAULT_INTERVAL;
use rockscope_core::testing::summary::RunLink;

const DEFAULT_REPOSITORY: &str = "ROCm/TheRock";
const DEFAULT_RUN_ID: &str = "unknown";

/// Tool configuration loaded from environment variables.
///
/// Command-line flags take precedence over these values.
#[derive(Debug, Clone)]
pub struct ToolConfig {
    /// File receiving `key=value` step outputs.
    pub github_output: Option<PathBuf>,
    /// Markdown file rendered on the workflow run page.
    pub github_step_summary: Option<PathBuf>,
    pub github_repository: String,
    pub github_run_id: String,
    pub memory_interval: Duration,
    pub memory_log_file: Option<PathBuf>,
}

fn var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Longest accepted sampling interval.
const MAX_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Parse a positive number of seconds.
pub fn parse_seconds(value: &str) -> anyhow::Result<Duration> {
    let secs: f64 = value
        .trim()
        .parse()
        .with_context(|| format!("invalid duration '{value}'"))?;
    if !secs.is_finite() || secs <= 0.0 {
        anyhow::bail!("duration must be a positive number of seconds, got {value}");
    }
    Duration::try_from_secs_f64(secs).with_context(|| format!("duration out of range: {value}"))
}

/// Parse a sampling interval: positive and at most one day.
pub fn parse_interval(value: &str) -> anyhow::Result<Duration> {
    let interval = parse_seconds(value)?;
    if interval > MAX_INTERVAL {
        anyhow::bail!("interval must be at most {} seconds, got {value}", MAX_INTERVAL.as_secs());
    }
    Ok(interval)
}

impl ToolConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                   | Default        |
    /// |---------------------------|----------------|
    /// | `GITHUB_OUTPUT`           | unset          |
    /// | `GITHUB_STEP_SUMMARY`     | unset          |
    /// | `GITHUB_REPOSITORY`       | `ROCm/TheRock` |
    /// | `GITHUB_RUN_ID`           | `unknown`      |
    /// | `MEMORY_MONITOR_INTERVAL` | `5` (seconds)  |
    /// | `MEMORY_MONITOR_LOG_FILE` | unset          |
    pub fn from_env() -> anyhow::Result<Self> {
        let memory_interval = match var("MEMORY_MONITOR_INTERVAL") {
            Some(v) => parse_interval(&v).context("MEMORY_MONITOR_INTERVAL")?,
            None => DEFAULT_INTERVAL,
        };

        Ok(Self {
            github_output: var("GITHUB_OUTPUT").map(PathBuf::from),
            github_step_summary: var("GITHUB_STEP_SUMMARY").map(PathBuf::from),
            github_repository: var("GITHUB_REPOSITORY").unwrap_or_else(|| DEFAULT_REPOSITORY.into()),
            github_run_id: var("GITHUB_RUN_ID").unwrap_or_else(|| DEFAULT_RUN_ID.into()),
            memory_interval,
            memory_log_file: var("MEMORY_MONITOR_LOG_FILE").map(PathBuf::from),
        })
    }

    pub fn run_link(&self) -> RunLink {
        RunLink {
            repository: self.github_repository.clone(),
            run_id: self.github_run_id.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_parsing() {
        assert_eq!(parse_interval("2.5").unwrap(), Duration::from_millis(2500));
        assert!(parse_interval("0").is_err());
        assert!(parse_interval("-1").is_err());
        assert!(parse_interval("fast").is_err());
    }

    #[test]
    fn huge_values_are_errors_not_panics() {
        assert!(parse_seconds("1e30").is_err());
        assert!(parse_interval("1e30").is_err());
        assert!(parse_interval("90000").is_err());
        assert_eq!(parse_seconds("90000").unwrap(), Duration::from_secs(90_000));
    }
}
