//! Test output parsing and result aggregation.
//!
//! Parsers turn raw gtest / ctest console output into [`TestCounts`]; a
//! [`TestSuiteResult`] adds the run metadata and is what gets written to
//! `test_results_<component>_<type>.json` and later aggregated by
//! [`report`].

pub mod ctest;
pub mod gtest;
pub mod report;
pub mod summary;

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// Supported test frameworks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestFramework {
    Gtest,
    Ctest,
    #[default]
    #[serde(other)]
    Unknown,
}

impl TestFramework {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Gtest => "gtest",
            Self::Ctest => "ctest",
            Self::Unknown => "unknown",
        }
    }

    /// Parse raw console output with this framework's parser.
    pub fn parse(self, output: &str) -> CoreResult<TestCounts> {
        match self {
            Self::Gtest => Ok(gtest::parse_gtest(output)),
            Self::Ctest => Ok(ctest::parse_ctest(output)),
            Self::Unknown => Err(CoreError::Validation(
                "cannot parse output of an unknown test framework".to_string(),
            )),
        }
    }
}

impl fmt::Display for TestFramework {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TestFramework {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "gtest" => Ok(Self::Gtest),
            "ctest" => Ok(Self::Ctest),
            other => Err(CoreError::Validation(format!(
                "unknown test framework: {other} (expected gtest or ctest)"
            ))),
        }
    }
}

/// Counts and names extracted from one test run's output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCounts {
    pub total: u32,
    pub passed: u32,
    pub failed: u32,
    pub skipped: u32,
    pub failed_tests: Vec<String>,
    pub skipped_tests: Vec<String>,
    /// Tests with an explicit passing result line. Only used to fold reruns.
    #[serde(skip)]
    pub passed_tests: Vec<String>,
    /// Failed test name -> first lines of its output.
    pub failure_details: BTreeMap<String, String>,
}

impl TestCounts {
    pub fn success_rate_pct(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            f64::from(self.passed) / f64::from(self.total) * 100.0
        }
    }

    /// Fold in the result of re-running only the failed tests.
    ///
    /// A failed test counts as recovered only when the rerun reports it
    /// passing; a rerun that ran nothing leaves the failures untouched.
    /// Details of tests that still fail are refreshed from the rerun.
    pub fn apply_rerun(&mut self, rerun: &TestCounts) {
        let before = self.failed_tests.len();
        self.failed_tests
            .retain(|name| !rerun.passed_tests.contains(name));
        let recovered = before - self.failed_tests.len();
        let still_failing = &self.failed_tests;
        self.failure_details
            .retain(|name, _| still_failing.contains(name));
        for (name, detail) in &rerun.failure_details {
            if self.failed_tests.contains(name) {
                self.failure_details.insert(name.clone(), detail.clone());
            }
        }
        let recovered = u32::try_from(recovered).unwrap_or(u32::MAX);
        self.passed = self.passed.saturating_add(recovered);
        self.failed = self.failed.saturating_sub(recovered);
    }
}

/// A parsed run plus the metadata stored alongside it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestSuiteResult {
    #[serde(default)]
    pub component: String,
    #[serde(default)]
    pub framework: TestFramework,
    #[serde(default)]
    pub test_type: String,
    #[serde(flatten)]
    pub counts: TestCounts,
    #[serde(default)]
    pub duration_sec: f64,
    #[serde(default)]
    pub exit_code: i32,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl TestSuiteResult {
    /// Attach run metadata to parsed counts.
    ///
    /// The exit code is 1 whenever a test failed, otherwise the command's
    /// own exit status.
    pub fn from_counts(
        component: &str,
        test_type: &str,
        framework: TestFramework,
        counts: TestCounts,
        command_exit_code: i32,
        duration_sec: f64,
    ) -> Self {
        let exit_code = if counts.failed > 0 { 1 } else { command_exit_code };
        Self {
            component: component.to_string(),
            framework,
            test_type: test_type.to_string(),
            counts,
            duration_sec,
            exit_code,
            timestamp: Some(Utc::now()),
        }
    }

    /// File name used when persisting this result.
    pub fn file_name(&self) -> String {
        format!("test_results_{}_{}.json", self.component, self.test_type)
    }

    pub fn passed_overall(&self) -> bool {
        self.counts.failed == 0
    }

    /// Write the result as pretty JSON into `dir`, returning the file path.
    pub fn write_to_dir(&self, dir: &Path) -> CoreResult<std::path::PathBuf> {
        std::fs::create_dir_all(dir).map_err(|e| CoreError::io(dir, e))?;
        let path = dir.join(self.file_name());
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, json).map_err(|e| CoreError::io(&path, e))?;
        Ok(path)
    }

    pub fn load(path: &Path) -> CoreResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| CoreError::io(path, e))?;
        Ok(serde_json::from_str(&text)?)
    }
}

/// Strip a trailing gtest timing suffix such as ` (50 ms)`.
pub(crate) fn strip_timing(name: &str) -> &str {
    let trimmed = name.trim_end();
    if let Some(open) = trimmed.rfind(" (") {
        let inner = &trimmed[open + 2..];
        if let Some(ms) = inner.strip_suffix(" ms)").or_else(|| inner.strip_suffix("ms)")) {
            if !ms.is_empty() && ms.trim().chars().all(|c| c.is_ascii_digit()) {
                return trimmed[..open].trim_end();
            }
        }
    }
    trimmed
}

/// Push `name` unless it is already present.
pub(crate) fn push_unique(list: &mut Vec<String>, name: &str) -> bool {
    if list.iter().any(|n| n == name) {
        false
    } else {
        list.push(name.to_string());
        true
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn framework_from_str() {
        assert_eq!("GTest".parse::<TestFramework>().unwrap(), TestFramework::Gtest);
        assert_eq!("ctest".parse::<TestFramework>().unwrap(), TestFramework::Ctest);
        assert_matches!("pytest".parse::<TestFramework>(), Err(CoreError::Validation(_)));
    }

    #[test]
    fn unknown_framework_deserializes() {
        let r: TestSuiteResult =
            serde_json::from_str(r#"{"component":"x","framework":"pytest"}"#).unwrap();
        assert_eq!(r.framework, TestFramework::Unknown);
        assert_eq!(r.counts.total, 0);
    }

    #[test]
    fn strip_timing_suffixes() {
        assert_eq!(strip_timing("Suite.Test (50 ms)"), "Suite.Test");
        assert_eq!(strip_timing("Suite.Test (0ms)"), "Suite.Test");
        assert_eq!(strip_timing("Suite.Test"), "Suite.Test");
        assert_eq!(strip_timing("Suite.Test (slow)"), "Suite.Test (slow)");
    }

    #[test]
    fn exit_code_rule() {
        let failing = TestCounts {
            total: 2,
            passed: 1,
            failed: 1,
            ..Default::default()
        };
        let r = TestSuiteResult::from_counts("c", "smoke", TestFramework::Gtest, failing, 0, 1.0);
        assert_eq!(r.exit_code, 1);

        let passing = TestCounts {
            total: 1,
            passed: 1,
            ..Default::default()
        };
        let r = TestSuiteResult::from_counts("c", "smoke", TestFramework::Gtest, passing, 124, 1.0);
        assert_eq!(r.exit_code, 124);
    }

    #[test]
    fn file_name_and_round_trip_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let r = TestSuiteResult::from_counts(
            "rocBLAS",
            "nightly",
            TestFramework::Ctest,
            TestCounts {
                total: 3,
                passed: 3,
                ..Default::default()
            },
            0,
            2.5,
        );
        let path = r.write_to_dir(dir.path()).unwrap();
        assert!(path.ends_with("test_results_rocBLAS_nightly.json"));
        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["total"], 3);
        assert_eq!(raw["framework"], "ctest");
        assert_eq!(TestSuiteResult::load(&path).unwrap(), r);
    }

    #[test]
    fn rerun_recovers_flaky_tests() {
        let mut counts = TestCounts {
            total: 10,
            passed: 7,
            failed: 3,
            failed_tests: vec!["a".into(), "b".into(), "c".into()],
            failure_details: [("a".to_string(), "boom".to_string()), ("b".to_string(), "x".to_string())]
                .into_iter()
                .collect(),
            ..Default::default()
        };
        let rerun = TestCounts {
            total: 3,
            passed: 2,
            failed: 1,
            passed_tests: vec!["a".into(), "c".into()],
            failed_tests: vec!["b".into()],
            failure_details: [("b".to_string(), "still broken".to_string())].into_iter().collect(),
            ..Default::default()
        };
        counts.apply_rerun(&rerun);
        assert_eq!(counts.failed, 1);
        assert_eq!(counts.passed, 9);
        assert_eq!(counts.failed_tests, vec!["b"]);
        assert_eq!(counts.failure_details.len(), 1);
        assert_eq!(counts.failure_details["b"], "still broken");
    }

    #[test]
    fn rerun_without_results_recovers_nothing() {
        let mut counts = TestCounts {
            total: 2,
            passed: 1,
            failed: 1,
            failed_tests: vec!["fft_r2c".into()],
            ..Default::default()
        };
        let rerun = ctest::parse_ctest("No tests were found!!!\n");
        counts.apply_rerun(&rerun);
        assert_eq!(counts.failed, 1);
        assert_eq!(counts.passed, 1);
        assert_eq!(counts.failed_tests, vec!["fft_r2c"]);
    }

    #[test]
    fn rerun_passing_result_line_recovers() {
        let mut counts = ctest::parse_ctest(
            "1/2 Test #1: fft_c2c ....   Passed    0.52 sec\n\
             2/2 Test #2: fft_r2c ....***Failed    0.31 sec\n\
             50% tests passed, 1 tests failed out of 2\n",
        );
        let rerun = ctest::parse_ctest(
            "1/1 Test #2: fft_r2c ....   Passed    0.30 sec\n\
             100% tests passed, 0 tests failed out of 1\n",
        );
        counts.apply_rerun(&rerun);
        assert_eq!(counts.failed, 0);
        assert_eq!(counts.passed, 2);
        assert!(counts.failed_tests.is_empty());
    }

    #[test]
    fn success_rate() {
        let c = TestCounts {
            total: 4,
            passed: 3,
            ..Default::default()
        };
        assert!((c.success_rate_pct() - 75.0).abs() < f64::EPSILON);
        assert_eq!(TestCounts::default().success_rate_pct(), 0.0);
    }
}
