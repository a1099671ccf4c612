//! Markdown rendering of a [`TestReport`] for the GitHub Actions step summary.

use super::report::TestReport;

/// The workflow run the report belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunLink {
    pub repository: String,
    pub run_id: String,
}

impl RunLink {
    pub fn url(&self) -> String {
        format!(
            "https://github.com/{}/actions/runs/{}",
            self.repository, self.run_id
        )
    }
}

fn status(failed: u64) -> (&'static str, &'static str) {
    if failed == 0 {
        ("✅", "✅ PASSED")
    } else {
        ("❌", "❌ FAILED")
    }
}

pub fn render_github_summary(report: &TestReport, run: &RunLink) -> String {
    let s = &report.summary;
    let (emoji, overall) = status(s.failed);
    let mut md = String::new();

    md.push_str(&format!("# {emoji} Test Results Summary\n\n"));
    md.push_str("## Overall Results\n\n");
    md.push_str("| Metric | Value |\n");
    md.push_str("|--------|-------|\n");
    md.push_str(&format!("| **Status** | **{overall}** |\n"));
    md.push_str(&format!("| Total Tests | {} |\n", s.total_tests));
    md.push_str(&format!("| ✅ Passed | {} |\n", s.passed));
    md.push_str(&format!("| ❌ Failed | {} |\n", s.failed));
    md.push_str(&format!("| ⏭️ Skipped | {} |\n", s.skipped));
    md.push_str(&format!("| Success Rate | {:.2}% |\n", s.success_rate_pct));
    md.push_str(&format!("| Total Duration | {:.2}s |\n\n", s.total_duration_sec));

    md.push_str("## Test Suites\n\n");
    md.push_str("| Component | Framework | Type | Total | Passed | Failed | Skipped | Status |\n");
    md.push_str("|-----------|-----------|------|-------|--------|--------|---------|--------|\n");
    for suite in &report.test_suites {
        let c = &suite.counts;
        let suite_status = if suite.passed_overall() { "✅ PASS" } else { "❌ FAIL" };
        md.push_str(&format!(
            "| {} | {} | {} | {} | {} | {} | {} | {} |\n",
            suite.component,
            suite.framework.as_str().to_uppercase(),
            suite.test_type,
            c.total,
            c.passed,
            c.failed,
            c.skipped,
            suite_status,
        ));
    }
    md.push('\n');

    if report.has_failed_test_names() {
        md.push_str("## Failed Tests Details\n\n");
        for suite in report
            .test_suites
            .iter()
            .filter(|s| !s.counts.failed_tests.is_empty())
        {
            md.push_str(&format!(
                "### {} - {}\n\n",
                suite.component,
                suite.framework.as_str().to_uppercase()
            ));
            for test in &suite.counts.failed_tests {
                md.push_str(&format!("- ❌ `{test}`\n"));
            }
            md.push('\n');
        }
    }

    let url = run.url();
    md.push_str("## Links\n\n");
    md.push_str(&format!("- 📊 [Download HTML Report]({url})\n"));
    md.push_str(&format!("- 📄 [Download JSON Report]({url})\n"));
    md.push_str(&format!("- 🔗 [View Workflow Run]({url})\n\n"));
    md.push_str("---\n");
    md.push_str(&format!("*Generated: {}*\n", s.timestamp.to_rfc3339()));
    md
}
