use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};
use rockscope_core::testing::TestFramework;

use crate::config::{parse_interval, parse_seconds};

pub const DEFAULT_TOPOLOGY_FILE: &str = "BUILD_TOPOLOGY.toml";

#[derive(Parser, Debug)]
#[command(name = "rockscope", version, about = "Build and test insight tooling for TheRock")]
pub struct Cli {
    #[arg(long, global = true, help = "Output machine-readable JSON")]
    pub json: bool,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Analyze the artifact dependency topology.
    Topology {
        #[arg(long, default_value = DEFAULT_TOPOLOGY_FILE)]
        topology: PathBuf,
    },
    /// Break down build time per sub-project from a ninja log.
    BuildTimes {
        #[arg(long)]
        build_dir: PathBuf,
        /// Defaults to `<build-dir>/.ninja_log`.
        #[arg(long)]
        ninja_log: Option<PathBuf>,
        /// Defaults to `<build-dir>/logs/build_time_analysis.html`.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Run a test command and record its parsed results.
    CaptureTests {
        #[command(flatten)]
        suite: SuiteArgs,
        /// Shell command line to run.
        #[arg(long)]
        command: String,
        #[arg(long)]
        working_dir: Option<PathBuf>,
        #[arg(long, default_value_t = 600)]
        timeout_secs: u64,
        /// Re-run failed ctest tests up to this many times.
        #[arg(long, default_value_t = 0)]
        retries: u32,
    },
    /// Parse an existing test log (`-` for stdin) and record the results.
    ParseTests {
        #[command(flatten)]
        suite: SuiteArgs,
        #[arg(long)]
        log: PathBuf,
    },
    /// Aggregate `test_results_*.json` files into JSON and HTML reports.
    TestReport {
        #[arg(long)]
        results_dir: PathBuf,
        #[arg(long, default_value = "test_report.json")]
        output_json: PathBuf,
        #[arg(long, default_value = "test_report.html")]
        output_html: PathBuf,
    },
    /// Render an aggregated report as GitHub step-summary Markdown.
    GithubSummary {
        #[arg(long)]
        results_file: PathBuf,
    },
    /// Decide whether the changes since a base ref require a CI run.
    CiPaths {
        #[arg(long)]
        base_ref: String,
        /// Repository to diff in (current directory by default).
        #[arg(long)]
        repo: Option<PathBuf>,
        /// TOML file with `skip_patterns` / `ci_workflow_patterns` lists.
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Sample memory usage while a command runs, or in the background.
    MemoryMonitor {
        #[arg(long, default_value = "Unknown")]
        phase: String,
        /// Seconds between samples (default from `MEMORY_MONITOR_INTERVAL`, else 5).
        #[arg(long, value_parser = parse_interval)]
        interval: Option<Duration>,
        #[arg(long)]
        log_file: Option<PathBuf>,
        /// Monitor until interrupted instead of running a command.
        #[arg(long, default_value_t = false)]
        background: bool,
        #[arg(long = "max-runtime", value_parser = parse_seconds)]
        max_runtime: Option<Duration>,
        #[arg(long)]
        stop_signal_file: Option<PathBuf>,
        /// Command to run while monitoring.
        #[arg(last = true)]
        command: Vec<String>,
    },
}

#[derive(Args, Debug, Clone)]
pub struct SuiteArgs {
    #[arg(long)]
    pub component: String,
    #[arg(long, value_enum)]
    pub framework: FrameworkArg,
    #[arg(long, default_value = "full")]
    pub test_type: String,
    #[arg(long, default_value = ".")]
    pub results_dir: PathBuf,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum FrameworkArg {
    Gtest,
    Ctest,
}

impl From<FrameworkArg> for TestFramework {
    fn from(value: FrameworkArg) -> Self {
        match value {
            FrameworkArg::Gtest => TestFramework::Gtest,
            FrameworkArg::Ctest => TestFramework::Ctest,
        }
    }
}
