//! CTest console output parser.

use std::sync::LazyLock;

use regex::Regex;

use super::{push_unique, TestCounts};

/// Lines of `--output-on-failure` output kept as the failure reason.
const MAX_FAILURE_LINES: usize = 10;

static SUMMARY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d+)% tests passed, (\d+) tests? failed out of (\d+)").expect("valid regex")
});
static RESULT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*\d+/\d+\s+Test\s+#\d+:\s+(\S+)\s+\.+\s*\**\s*(\w+)").expect("valid regex")
});
static START_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*Start\s+\d+:").expect("valid regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    Passed,
    Failed,
    Skipped,
}

fn status(word: &str) -> Status {
    match word {
        "Failed" | "Timeout" | "Exception" | "SEGFAULT" | "Subprocess" | "Child" => Status::Failed,
        // `***Not Run` captures as `Not`.
        "Skipped" | "Disabled" | "NotRun" | "Not" => Status::Skipped,
        _ => Status::Passed,
    }
}

/// Failure output collected after a failed result line.
struct Pending {
    test: String,
    lines: Vec<String>,
}

impl Pending {
    fn flush(self, counts: &mut TestCounts) {
        if !self.lines.is_empty() {
            let end = self.lines.len().min(MAX_FAILURE_LINES);
            counts
                .failure_details
                .insert(self.test, self.lines[..end].join("\n"));
        }
    }
}

/// Parse ctest output.
///
/// The `P% tests passed, F tests failed out of T` line sets the totals.
/// Without it (for example when ctest was killed) the counts are derived
/// from the per-test result lines.
pub fn parse_ctest(output: &str) -> TestCounts {
    let mut counts = TestCounts::default();
    let mut pending: Option<Pending> = None;
    let mut results_seen: u32 = 0;
    let mut failed_seen: u32 = 0;
    let mut summary_seen = false;

    for line in output.lines() {
        if let Some(c) = SUMMARY_RE.captures(line) {
            if let Some(p) = pending.take() {
                p.flush(&mut counts);
            }
            counts.failed = c[2].parse().unwrap_or(0);
            counts.total = c[3].parse().unwrap_or(0);
            summary_seen = true;
            continue;
        }

        if let Some(c) = RESULT_RE.captures(line) {
            if let Some(p) = pending.take() {
                p.flush(&mut counts);
            }
            results_seen += 1;
            let name = &c[1];
            match status(&c[2]) {
                Status::Failed => {
                    failed_seen += 1;
                    push_unique(&mut counts.failed_tests, name);
                    pending = Some(Pending {
                        test: name.to_string(),
                        lines: Vec::new(),
                    });
                }
                Status::Skipped => {
                    if push_unique(&mut counts.skipped_tests, name) {
                        counts.skipped += 1;
                    }
                }
                Status::Passed => {
                    push_unique(&mut counts.passed_tests, name);
                }
            }
            continue;
        }

        if let Some(p) = pending.as_mut() {
            let trimmed = line.trim();
            if trimmed.is_empty()
                || line.starts_with("===")
                || line.starts_with("---")
                || START_RE.is_match(line)
            {
                continue;
            }
            p.lines.push(trimmed.to_string());
        }
    }
    if let Some(p) = pending.take() {
        p.flush(&mut counts);
    }

    if !summary_seen {
        counts.total = results_seen;
        counts.failed = failed_seen;
    }
    counts.passed = counts
        .total
        .saturating_sub(counts.failed)
        .saturating_sub(counts.skipped);
    counts
}

#[cfg(test)]
mod tests {
    use super::*;

    const OUTPUT: &str = "\
Test project /work/build/rocprim
      Start 1: device_scan
 1/5 Test #1: device_scan ......................   Passed    0.52 sec
      Start 2: device_sort
 2/5 Test #2: device_sort ......................***Failed    1.23 sec
[ RUN      ] Sort.Radix
sort_test.cpp:88: Failure
Value of: ok
  Actual: false
      Start 3: device_reduce
 3/5 Test #3: device_reduce ....................***Timeout  60.00 sec
hang detected in reduce kernel
      Start 4: device_graph
 4/5 Test #4: device_graph .....................***Skipped   0.00 sec
      Start 5: device_copy
 5/5 Test #5: device_copy ......................   Passed    0.10 sec

60% tests passed, 2 tests failed out of 5

Total Test time (real) =  62.00 sec

The following tests FAILED:
\t  2 - device_sort (Failed)
\t  3 - device_reduce (Timeout)
";

    #[test]
    fn summary_counts() {
        let c = parse_ctest(OUTPUT);
        assert_eq!(c.total, 5);
        assert_eq!(c.failed, 2);
        assert_eq!(c.skipped, 1);
        assert_eq!(c.passed, 2);
        assert_eq!(c.failed_tests, vec!["device_sort", "device_reduce"]);
        assert_eq!(c.skipped_tests, vec!["device_graph"]);
    }

    #[test]
    fn failure_output_attached_to_each_failed_test() {
        let c = parse_ctest(OUTPUT);
        assert_eq!(
            c.failure_details["device_sort"],
            "[ RUN      ] Sort.Radix\nsort_test.cpp:88: Failure\nValue of: ok\nActual: false"
        );
        assert_eq!(c.failure_details["device_reduce"], "hang detected in reduce kernel");
    }

    #[test]
    fn failure_output_capped_at_ten_lines() {
        let mut out = String::from(" 1/1 Test #1: big ....***Failed  1.00 sec\n");
        for i in 0..25 {
            out.push_str(&format!("line {i}\n"));
        }
        let c = parse_ctest(&out);
        assert_eq!(c.failure_details["big"].lines().count(), 10);
    }

    #[test]
    fn not_run_counts_as_skipped() {
        let out = " 1/2 Test #1: a ....***Not Run (Disabled)   0.00 sec\n\
                    2/2 Test #2: b ....   Passed   0.01 sec\n\
                   100% tests passed, 0 tests failed out of 2\n";
        let c = parse_ctest(out);
        assert_eq!(c.skipped_tests, vec!["a"]);
        assert_eq!(c.passed, 1);
    }

    #[test]
    fn no_summary_line_uses_result_lines() {
        let out = " 1/3 Test #1: a ....   Passed   0.01 sec\n\
                    2/3 Test #2: b ....***Failed   0.01 sec\n";
        let c = parse_ctest(out);
        assert_eq!(c.total, 2);
        assert_eq!(c.failed, 1);
        assert_eq!(c.passed, 1);
    }

    #[test]
    fn all_passed() {
        let out = " 1/1 Test #1: only ....   Passed   0.01 sec\n\
                   100% tests passed, 0 tests failed out of 1\n";
        let c = parse_ctest(out);
        assert_eq!((c.total, c.passed, c.failed), (1, 1, 0));
        assert!(c.failure_details.is_empty());
    }
}
