//! Aggregation of per-suite result files into one report.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::TestSuiteResult;
use crate::error::{CoreError, CoreResult};
use crate::html;

const RESULT_FILE_PREFIX: &str = "test_results_";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub total_tests: u64,
    pub passed: u64,
    pub failed: u64,
    pub skipped: u64,
    pub success_rate_pct: f64,
    pub total_duration_sec: f64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestReport {
    pub summary: ReportSummary,
    pub test_suites: Vec<TestSuiteResult>,
}

impl TestReport {
    /// Build a report from already-loaded suites.
    pub fn from_suites(test_suites: Vec<TestSuiteResult>) -> Self {
        let mut summary = ReportSummary {
            timestamp: Utc::now(),
            ..Default::default()
        };
        for suite in &test_suites {
            summary.total_tests += u64::from(suite.counts.total);
            summary.passed += u64::from(suite.counts.passed);
            summary.failed += u64::from(suite.counts.failed);
            summary.skipped += u64::from(suite.counts.skipped);
            summary.total_duration_sec += suite.duration_sec;
        }
        if summary.total_tests > 0 {
            let pct = summary.passed as f64 / summary.total_tests as f64 * 100.0;
            summary.success_rate_pct = (pct * 100.0).round() / 100.0;
        }
        Self {
            summary,
            test_suites,
        }
    }

    pub fn has_failures(&self) -> bool {
        self.summary.failed > 0
    }

    pub fn has_failed_test_names(&self) -> bool {
        self.test_suites
            .iter()
            .any(|s| !s.counts.failed_tests.is_empty())
    }

    pub fn load(path: &Path) -> CoreResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| CoreError::io(path, e))?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn write_json(&self, path: &Path) -> CoreResult<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).map_err(|e| CoreError::io(path, e))
    }

    /// Plain-text summary block for the console.
    pub fn render_text(&self) -> String {
        let s = &self.summary;
        let rule = "=".repeat(60);
        format!(
            "{rule}\nTest Results Summary\n{rule}\n\
             Total Tests:   {}\n\
             Passed:        {}\n\
             Failed:        {}\n\
             Skipped:       {}\n\
             Success Rate:  {:.2}%\n\
             Duration:      {:.2}s\n\
             {rule}\n",
            s.total_tests, s.passed, s.failed, s.skipped, s.success_rate_pct, s.total_duration_sec,
        )
    }

    pub fn render_html(&self) -> String {
        let s = &self.summary;
        let timestamp = s.timestamp.to_rfc3339();

        let rows: Vec<Vec<(&str, String)>> = self
            .test_suites
            .iter()
            .map(|suite| {
                let c = &suite.counts;
                let status = if suite.passed_overall() {
                    ("pass", "✅ PASS".to_string())
                } else {
                    ("fail", "❌ FAIL".to_string())
                };
                vec![
                    ("", suite.component.clone()),
                    ("", suite.framework.as_str().to_uppercase()),
                    ("", suite.test_type.clone()),
                    ("", c.total.to_string()),
                    ("pass", c.passed.to_string()),
                    ("fail", c.failed.to_string()),
                    ("", c.skipped.to_string()),
                    status,
                    ("", format!("{:.2}s", suite.duration_sec)),
                ]
            })
            .collect();
        let table = html::table(
            &[
                "Component",
                "Framework",
                "Type",
                "Total",
                "Passed",
                "Failed",
                "Skipped",
                "Status",
                "Duration",
            ],
            &rows,
        );

        let card = |class: &str, label: &str, value: String| {
            format!(
                "<div class=\"metric-card {class}\">\n<div class=\"metric-label\">{}</div>\n<div class=\"metric-value\">{}</div>\n</div>\n",
                html::escape(label),
                html::escape(&value),
            )
        };
        let cards = [
            card("", "Total Tests", s.total_tests.to_string()),
            card("passed", "✅ Passed", s.passed.to_string()),
            card("failed", "❌ Failed", s.failed.to_string()),
            card("rate", "Success Rate", format!("{:.1}%", s.success_rate_pct)),
        ]
        .concat();

        REPORT_TEMPLATE
            .replace("{{TIMESTAMP}}", &html::escape(&timestamp))
            .replace("{{CARDS}}", &cards)
            .replace("{{SUITES_TABLE}}", &table)
            .replace("{{DURATION}}", &format!("{:.2}", s.total_duration_sec))
    }
}

/// Read every `test_results_*.json` in `dir`, in file-name order.
///
/// Files that cannot be read or parsed are logged and skipped.
pub fn aggregate_dir(dir: &Path) -> CoreResult<TestReport> {
    if !dir.is_dir() {
        return Err(CoreError::Validation(format!(
            "results directory does not exist: {}",
            dir.display()
        )));
    }
    let mut files: Vec<_> = std::fs::read_dir(dir)
        .map_err(|e| CoreError::io(dir, e))?
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(RESULT_FILE_PREFIX) && n.ends_with(".json"))
        })
        .collect();
    files.sort();

    if files.is_empty() {
        tracing::warn!(dir = %dir.display(), "No test result files found");
    }

    let mut suites = Vec::with_capacity(files.len());
    for path in &files {
        match TestSuiteResult::load(path) {
            Ok(suite) => {
                tracing::debug!(file = %path.display(), component = %suite.component, "Loaded test results");
                suites.push(suite);
            }
            Err(e) => {
                tracing::warn!(file = %path.display(), error = %e, "Skipping unreadable test result file");
            }
        }
    }
    tracing::info!(files = suites.len(), "Aggregated test results");
    Ok(TestReport::from_suites(suites))
}

const REPORT_TEMPLATE: &str = r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>Test Results - {{TIMESTAMP}}</title>
<style>
body { font-family: 'Segoe UI', Tahoma, Geneva, Verdana, sans-serif; margin: 0; padding: 20px; background-color: #f5f5f5; }
.container { max-width: 1200px; margin: 0 auto; background-color: white; padding: 30px; border-radius: 8px; }
h1 { color: #333; border-bottom: 3px solid #4CAF50; padding-bottom: 10px; }
.summary { display: grid; grid-template-columns: repeat(auto-fit, minmax(200px, 1fr)); gap: 20px; margin: 20px 0; }
.metric-card { background: #667eea; color: white; padding: 20px; border-radius: 8px; text-align: center; }
.metric-card.passed { background: #11998e; }
.metric-card.failed { background: #eb3349; }
.metric-card.rate { background: #4776e6; }
.metric-value { font-size: 36px; font-weight: bold; margin: 10px 0; }
.metric-label { font-size: 14px; opacity: 0.9; }
table { border-collapse: collapse; width: 100%; margin-top: 20px; }
th, td { border: 1px solid #ddd; padding: 12px; text-align: left; }
th { background-color: #4CAF50; color: white; }
tr:nth-child(even) { background-color: #f9f9f9; }
.pass { color: #4CAF50; font-weight: bold; }
.fail { color: #f44336; font-weight: bold; }
.timestamp { color: #888; font-size: 14px; margin-top: 20px; text-align: center; }
</style>
</head>
<body>
<div class="container">
<h1>Test Results Summary</h1>
<div class="summary">
{{CARDS}}</div>
<h2>Test Suites</h2>
{{SUITES_TABLE}}
<div class="timestamp">Generated: {{TIMESTAMP}}<br>Total Duration: {{DURATION}} seconds</div>
</div>
</body>
</html>
"#;
