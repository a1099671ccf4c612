//! GoogleTest console output parser.
//!
//! Understands the standard gtest banner format as well as the logged
//! format emitted by wrapper scripts (`✅ Suite.Name: PASSED (5ms)`).

use std::sync::LazyLock;

use regex::Regex;

use super::{push_unique, strip_timing, TestCounts};

/// Lines of test output kept as the failure reason.
const MAX_FAILURE_LINES: usize = 5;

static RUN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\[\s*RUN\s*\]\s+(.+)$").expect("valid regex"));
static OK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\[\s*OK\s*\]\s*(.*)$").expect("valid regex"));
static RUNNING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\[=+\] Running (\d+) tests?").expect("valid regex"));
static PASSED_COUNT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\[\s*PASSED\s*\] (\d+) tests?\b").expect("valid regex"));
static FAILED_COUNT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\[\s*FAILED\s*\] (\d+) tests?\b").expect("valid regex"));
static SKIPPED_COUNT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\[\s*SKIPPED\s*\] (\d+) tests?\b").expect("valid regex"));
static FAILED_TEST_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\[\s*FAILED\s*\]\s+(.+)$").expect("valid regex"));
static SKIPPED_TEST_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\[\s*SKIPPED\s*\]\s+(.+)$").expect("valid regex"));
static LOGGED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:Running:\s*|[✅❌⚠\x{FE0F}]\s*)([A-Za-z0-9_./]+):\s*(PASSED|FAILED|SKIPPED)")
        .expect("valid regex")
});

/// Counts from the standard `[==========]` summary block.
#[derive(Default)]
struct Summary {
    total: Option<u32>,
    passed: Option<u32>,
    failed: Option<u32>,
    skipped: Option<u32>,
}

/// Counts from logged-format result lines.
#[derive(Default)]
struct Logged {
    total: u32,
    passed: u32,
    failed: u32,
    skipped: u32,
}

fn count(re: &Regex, line: &str) -> Option<u32> {
    re.captures(line).and_then(|c| c[1].parse().ok())
}

/// `Suite.Name (12 ms)` or `Suite.Name/0, where GetParam() = 4 (3 ms)` -> name.
fn test_name(rest: &str) -> &str {
    let name = strip_timing(rest);
    name.split(", where ").next().unwrap_or(name).trim()
}

/// Parse gtest output. When the standard summary is present its counts win;
/// otherwise counts come from the logged result lines.
pub fn parse_gtest(output: &str) -> TestCounts {
    let mut counts = TestCounts::default();
    let mut summary = Summary::default();
    let mut logged = Logged::default();
    let mut current: Option<String> = None;
    let mut captured: Vec<String> = Vec::new();

    for raw in output.lines() {
        let line = raw.trim();

        if let Some(c) = RUN_RE.captures(line) {
            current = Some(test_name(&c[1]).to_string());
            captured.clear();
            continue;
        }
        if let Some(c) = OK_RE.captures(line) {
            let name = test_name(&c[1]);
            if !name.is_empty() {
                push_unique(&mut counts.passed_tests, name);
            }
            current = None;
            captured.clear();
            continue;
        }
        if let Some(n) = count(&RUNNING_RE, line) {
            summary.total = Some(n);
            continue;
        }
        if let Some(n) = count(&PASSED_COUNT_RE, line) {
            summary.passed = Some(n);
            continue;
        }
        if let Some(n) = count(&FAILED_COUNT_RE, line) {
            summary.failed = Some(n);
            continue;
        }
        if let Some(n) = count(&SKIPPED_COUNT_RE, line) {
            summary.skipped = Some(n);
            continue;
        }
        if let Some(c) = FAILED_TEST_RE.captures(line) {
            let name = test_name(&c[1]);
            push_unique(&mut counts.failed_tests, name);
            if current.as_deref() == Some(name)
                && !captured.is_empty()
                && !counts.failure_details.contains_key(name)
            {
                let reason = captured[..captured.len().min(MAX_FAILURE_LINES)].join("\n");
                counts.failure_details.insert(name.to_string(), reason);
            }
            current = None;
            captured.clear();
            continue;
        }
        if let Some(c) = SKIPPED_TEST_RE.captures(line) {
            push_unique(&mut counts.skipped_tests, test_name(&c[1]));
            current = None;
            captured.clear();
            continue;
        }
        if let Some(c) = LOGGED_RE.captures(line) {
            let name = &c[1];
            match &c[2] {
                "PASSED" => {
                    push_unique(&mut counts.passed_tests, name);
                    logged.passed += 1;
                    logged.total += 1;
                }
                "FAILED" => {
                    if push_unique(&mut counts.failed_tests, name) {
                        logged.failed += 1;
                        logged.total += 1;
                    }
                }
                _ => {
                    if push_unique(&mut counts.skipped_tests, name) {
                        logged.skipped += 1;
                        logged.total += 1;
                    }
                }
            }
            current = None;
            captured.clear();
            continue;
        }
        if current.is_some() && !line.is_empty() && !line.starts_with('[') && !line.starts_with("===") {
            captured.push(line.to_string());
        }
    }

    if let Some(total) = summary.total {
        let failed_seen = u32::try_from(counts.failed_tests.len()).unwrap_or(u32::MAX);
        let skipped_seen = u32::try_from(counts.skipped_tests.len()).unwrap_or(u32::MAX);
        counts.total = total;
        counts.failed = summary.failed.unwrap_or(failed_seen);
        counts.skipped = summary.skipped.unwrap_or(skipped_seen);
        counts.passed = summary.passed.unwrap_or_else(|| {
            total.saturating_sub(counts.failed).saturating_sub(counts.skipped)
        });
    } else {
        counts.total = logged.total;
        counts.passed = logged.passed;
        counts.failed = logged.failed;
        counts.skipped = logged.skipped;
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;

    const STANDARD: &str = "\
[==========] Running 4 tests from 2 test suites.
[----------] Global test environment set-up.
[ RUN      ] MathTest.Add
[       OK ] MathTest.Add (0 ms)
[ RUN      ] MathTest.Divide
/src/math_test.cpp:42: Failure
Expected equality of these values:
  divide(4, 2)
    Which is: 3
  2
[  FAILED  ] MathTest.Divide (1 ms)
[ RUN      ] GpuTest.Launch
[  SKIPPED ] GpuTest.Launch (0 ms)
[ RUN      ] GpuTest.Copy
[       OK ] GpuTest.Copy (3 ms)
[==========] 4 tests from 2 test suites ran. (5 ms total)
[  PASSED  ] 2 tests.
[  SKIPPED ] 1 test, listed below:
[  SKIPPED ] GpuTest.Launch
[  FAILED  ] 1 test, listed below:
[  FAILED  ] MathTest.Divide

 1 FAILED TEST
";

    #[test]
    fn standard_summary_counts() {
        let c = parse_gtest(STANDARD);
        assert_eq!(c.total, 4);
        assert_eq!(c.passed, 2);
        assert_eq!(c.failed, 1);
        assert_eq!(c.skipped, 1);
        assert_eq!(c.failed_tests, vec!["MathTest.Divide"]);
        assert_eq!(c.skipped_tests, vec!["GpuTest.Launch"]);
    }

    #[test]
    fn failure_reason_is_first_five_output_lines() {
        let c = parse_gtest(STANDARD);
        let reason = &c.failure_details["MathTest.Divide"];
        assert_eq!(reason.lines().count(), 5);
        assert!(reason.starts_with("/src/math_test.cpp:42: Failure"));
        assert!(reason.ends_with("2"));
    }

    #[test]
    fn passing_tests_leave_no_details() {
        let c = parse_gtest(STANDARD);
        assert_eq!(c.failure_details.len(), 1);
    }

    #[test]
    fn parameterized_names_are_trimmed() {
        let out = "\
[==========] Running 1 test from 1 test suite.
[ RUN      ] Inst/Conv.Fwd/3
[  FAILED  ] Inst/Conv.Fwd/3, where GetParam() = 4 (12 ms)
[  FAILED  ] 1 test, listed below:
";
        let c = parse_gtest(out);
        assert_eq!(c.failed_tests, vec!["Inst/Conv.Fwd/3"]);
        assert_eq!(c.failed, 1);
        assert_eq!(c.passed, 0);
    }

    #[test]
    fn logged_format() {
        let out = "\
2025-12-18 04:51:39 - INFO -    ✅ hipMemcpy.Basic: PASSED (50ms)
2025-12-18 04:51:39 - ERROR -    ❌ hipMemcpy.Async: FAILED
2025-12-18 04:51:39 - ERROR -    ❌ hipMemcpy.Async: FAILED
2025-12-18 04:51:40 - WARNING -  ⚠️ hipGraph.Capture: SKIPPED
Running: hipEvent.Record: PASSED
";
        let c = parse_gtest(out);
        assert_eq!(c.total, 4);
        assert_eq!(c.passed, 2);
        assert_eq!(c.failed, 1);
        assert_eq!(c.skipped, 1);
        assert_eq!(c.failed_tests, vec!["hipMemcpy.Async"]);
        assert_eq!(c.skipped_tests, vec!["hipGraph.Capture"]);
    }

    #[test]
    fn missing_failed_summary_falls_back_to_names() {
        let out = "\
[==========] Running 2 tests from 1 test suite.
[ RUN      ] A.One
[  FAILED  ] A.One (2 ms)
[ RUN      ] A.Two
[       OK ] A.Two (1 ms)
";
        let c = parse_gtest(out);
        assert_eq!(c.total, 2);
        assert_eq!(c.failed, 1);
        assert_eq!(c.passed, 1);
    }

    #[test]
    fn empty_output() {
        assert_eq!(parse_gtest(""), TestCounts::default());
    }
}
