//! Decide whether a change set needs a CI run.
//!
//! A run is required when a CI workflow file changed or when any other
//! changed path is not covered by a skip pattern (docs, markdown, ...).
//! Workflow files that are not CI workflows never trigger a run.

use std::path::Path;

use glob::Pattern;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

const WORKFLOWS_DIR: &str = ".github/workflows";

/// Paths whose changes never require CI on their own.
pub const DEFAULT_SKIP_PATTERNS: &[&str] = &[
    "docs/*",
    "*.gitignore",
    "*.md",
    "*.pre-commit-config.*",
    ".github/dependabot.yml",
    "*CODEOWNERS",
    "*LICENSE",
    // Docker images are published after merge; workflows pick them up later.
    "dockerfiles/*",
    "experimental/*",
];

/// Workflow files (relative to `.github/workflows/`) that are part of CI.
pub const DEFAULT_CI_WORKFLOW_PATTERNS: &[&str] = &[
    "setup.yml",
    "ci*.yml",
    "multi_arch*.yml",
    "build*artifact*.yml",
    "build*ci.yml",
    "build*python_packages.yml",
    "test*artifacts.yml",
    "test_rocm_wheels.yml",
    "test_sanity_check.yml",
    "test_component.yml",
];

/// Pattern lists as read from a repository config file.
///
/// A missing list means "use the defaults"; an empty list is kept as is.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathFilterConfig {
    #[serde(default)]
    pub skip_patterns: Option<Vec<String>>,
    #[serde(default)]
    pub ci_workflow_patterns: Option<Vec<String>>,
}

impl PathFilterConfig {
    pub fn from_toml_str(text: &str) -> CoreResult<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn load(path: &Path) -> CoreResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| CoreError::io(path, e))?;
        Self::from_toml_str(&text)
    }
}

/// Outcome of [`is_ci_run_required`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CiDecision {
    pub required: bool,
    /// A CI workflow file was modified.
    pub related_to_ci: bool,
    /// A path outside `.github/workflows` matched no skip pattern.
    pub non_skippable: bool,
}

impl CiDecision {
    pub fn reason(&self) -> &'static str {
        if self.related_to_ci {
            "a CI workflow file was modified"
        } else if self.non_skippable {
            "a non-skippable path was modified"
        } else {
            "only unrelated or skippable paths were modified"
        }
    }
}

/// Compiled skip and CI workflow patterns.
#[derive(Debug, Clone)]
pub struct PathFilters {
    skip: Vec<Pattern>,
    ci_workflows: Vec<Pattern>,
}

/// Escape every `[` that does not open a complete `[...]` class, so it
/// matches itself as in `fnmatch`.
fn escape_unclosed_brackets(pattern: &str) -> String {
    let chars: Vec<char> = pattern.chars().collect();
    let mut out = String::with_capacity(pattern.len());
    let mut i = 0;
    while i < chars.len() {
        if chars[i] != '[' {
            out.push(chars[i]);
            i += 1;
            continue;
        }
        // A `]` right after `[` or `[!` is part of the class.
        let mut j = i + 1;
        if chars.get(j) == Some(&'!') {
            j += 1;
        }
        j += 1;
        while j < chars.len() && chars[j] != ']' {
            j += 1;
        }
        if j < chars.len() {
            out.extend(&chars[i..=j]);
            i = j + 1;
        } else {
            out.push_str("[[]");
            i += 1;
        }
    }
    out
}

fn compile(patterns: &[String], prefix: &str) -> CoreResult<Vec<Pattern>> {
    patterns
        .iter()
        .map(|p| {
            let full = format!("{prefix}{p}");
            Pattern::new(&escape_unclosed_brackets(&full)).map_err(|e| CoreError::Pattern {
                pattern: full.clone(),
                message: e.msg.to_string(),
            })
        })
        .collect()
}

fn owned(patterns: &[&str]) -> Vec<String> {
    patterns.iter().map(|p| (*p).to_string()).collect()
}

impl PathFilters {
    /// `None` selects the built-in default list; `Some(&[])` disables it.
    pub fn new(skip_patterns: Option<&[String]>, ci_workflow_patterns: Option<&[String]>) -> CoreResult<Self> {
        let skip = match skip_patterns {
            Some(p) => compile(p, "")?,
            None => compile(&owned(DEFAULT_SKIP_PATTERNS), "")?,
        };
        let ci_prefix = format!("{WORKFLOWS_DIR}/");
        let ci_workflows = match ci_workflow_patterns {
            Some(p) => compile(p, &ci_prefix)?,
            None => compile(&owned(DEFAULT_CI_WORKFLOW_PATTERNS), &ci_prefix)?,
        };
        Ok(Self { skip, ci_workflows })
    }

    pub fn from_config(config: &PathFilterConfig) -> CoreResult<Self> {
        Self::new(
            config.skip_patterns.as_deref(),
            config.ci_workflow_patterns.as_deref(),
        )
    }

    pub fn is_skippable(&self, path: &str) -> bool {
        self.skip.iter().any(|p| p.matches(path))
    }

    pub fn is_ci_workflow(&self, path: &str) -> bool {
        self.ci_workflows.iter().any(|p| p.matches(path))
    }

    /// `None` means no diff was available, which never requires a run.
    pub fn decide(&self, paths: Option<&[String]>) -> CiDecision {
        let Some(paths) = paths else {
            tracing::info!("No modified paths available, skipping build jobs");
            return CiDecision {
                required: false,
                related_to_ci: false,
                non_skippable: false,
            };
        };

        let (workflow_paths, other_paths): (Vec<&String>, Vec<&String>) =
            paths.iter().partition(|p| p.starts_with(WORKFLOWS_DIR));
        let related_to_ci = workflow_paths.iter().any(|p| self.is_ci_workflow(p));
        let non_skippable = other_paths.iter().any(|p| !self.is_skippable(p));

        let decision = CiDecision {
            required: related_to_ci || non_skippable,
            related_to_ci,
            non_skippable,
        };
        tracing::info!(
            paths = paths.len(),
            related_to_ci,
            non_skippable,
            required = decision.required,
            reason = decision.reason(),
            "CI path filter decision"
        );
        decision
    }
}

/// Convenience wrapper compiling the patterns and deciding in one call.
pub fn is_ci_run_required(
    paths: Option<&[String]>,
    skip_patterns: Option<&[String]>,
    ci_workflow_patterns: Option<&[String]>,
) -> CoreResult<CiDecision> {
    Ok(PathFilters::new(skip_patterns, ci_workflow_patterns)?.decide(paths))
}

/// Split `git diff --name-only` output into paths.
pub fn parse_name_only(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}
