//! Per sub-project build time breakdown from a ninja log.
//!
//! Durations of classified tasks are summed per category, sub-project and
//! phase, then rendered as two tables: ROCm components and third-party
//! dependencies.

use std::collections::{BTreeMap, HashSet};

use serde::Serialize;

use crate::html;
use crate::ninja::{classify_output, BuildPhase, NinjaTask, TaskCategory};

/// Phase columns of the ROCm component table.
pub const COMPONENT_PHASES: [BuildPhase; 4] = [
    BuildPhase::Configure,
    BuildPhase::Build,
    BuildPhase::Install,
    BuildPhase::Package,
];

/// Phase columns of the dependency table; Download also absorbs Update.
pub const DEPENDENCY_PHASES: [BuildPhase; 4] = [
    BuildPhase::Download,
    BuildPhase::Configure,
    BuildPhase::Build,
    BuildPhase::Install,
];

const REPORT_TEMPLATE: &str = r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>Build Time Analysis</title>
<style>
body { font-family: -apple-system, 'Segoe UI', Roboto, sans-serif; margin: 20px; color: #222; }
h1 { border-bottom: 2px solid #c00; padding-bottom: 6px; }
table { border-collapse: collapse; margin-bottom: 30px; min-width: 60%; }
th, td { border: 1px solid #ccc; padding: 6px 10px; text-align: right; }
th { background: #333; color: #fff; }
td:first-child, th:first-child { text-align: left; }
tr:nth-child(even) { background: #f6f6f6; }
.total-col { font-weight: bold; }
</style>
</head>
<body>
<h1>Build Time Analysis</h1>
{{ROCM_TABLE}}
{{DEP_TABLE}}
</body>
</html>
"#;

/// Summed durations (ms): category -> sub-project -> phase.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildTimes {
    projects: BTreeMap<TaskCategory, BTreeMap<String, BTreeMap<BuildPhase, u64>>>,
}

impl BuildTimes {
    /// Aggregate tasks. Outputs under `build_dir` (an absolute path prefix)
    /// are made relative first; repeated `(output, start, end)` entries are
    /// counted once.
    pub fn aggregate(tasks: &[NinjaTask], build_dir: Option<&str>) -> Self {
        let mut times = Self::default();
        let mut seen: HashSet<(&str, u64, u64)> = HashSet::new();
        let prefix = build_dir.map(|d| d.trim_end_matches('/')).filter(|d| !d.is_empty());

        for task in tasks {
            let mut output = task.output.as_str();
            if let Some(prefix) = prefix {
                if let Some(rest) = output.strip_prefix(prefix) {
                    output = rest.trim_start_matches('/');
                }
            }
            if !seen.insert((output, task.start_ms, task.end_ms)) {
                continue;
            }
            let Some(class) = classify_output(output) else {
                continue;
            };
            *times
                .projects
                .entry(class.category)
                .or_default()
                .entry(class.name)
                .or_default()
                .entry(class.phase)
                .or_default() += task.duration_ms();
        }
        times
    }

    /// Summed milliseconds for one sub-project phase.
    pub fn phase_ms(&self, category: TaskCategory, name: &str, phase: BuildPhase) -> u64 {
        self.projects
            .get(&category)
            .and_then(|p| p.get(name))
            .and_then(|phases| phases.get(&phase))
            .copied()
            .unwrap_or(0)
    }

    pub fn project_count(&self, category: TaskCategory) -> usize {
        self.projects.get(&category).map(BTreeMap::len).unwrap_or(0)
    }

    fn rows(&self, category: TaskCategory, columns: &[BuildPhase]) -> Vec<BuildTimeRow> {
        let Some(projects) = self.projects.get(&category) else {
            return Vec::new();
        };
        let mut rows: Vec<BuildTimeRow> = projects
            .iter()
            .map(|(name, phases)| {
                let get = |p: BuildPhase| phases.get(&p).copied().unwrap_or(0);
                let columns_ms = columns
                    .iter()
                    .map(|&phase| match phase {
                        BuildPhase::Download if category == TaskCategory::Dependency => {
                            get(BuildPhase::Download) + get(BuildPhase::Update)
                        }
                        other => get(other),
                    })
                    .collect();
                BuildTimeRow {
                    name: name.clone(),
                    columns_ms,
                    total_ms: phases.values().sum(),
                }
            })
            .collect();
        rows.sort_by(|a, b| b.total_ms.cmp(&a.total_ms).then_with(|| a.name.cmp(&b.name)));
        rows
    }

    /// Rows for the ROCm component table, slowest first.
    pub fn component_rows(&self) -> Vec<BuildTimeRow> {
        self.rows(TaskCategory::RocmComponent, &COMPONENT_PHASES)
    }

    /// Rows for the dependency table, slowest first.
    pub fn dependency_rows(&self) -> Vec<BuildTimeRow> {
        self.rows(TaskCategory::Dependency, &DEPENDENCY_PHASES)
    }

    pub fn report(&self) -> BuildTimeReport {
        BuildTimeReport {
            components: self.component_rows(),
            dependencies: self.dependency_rows(),
        }
    }
}

/// One table row: per-column and total durations in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildTimeRow {
    pub name: String,
    pub columns_ms: Vec<u64>,
    pub total_ms: u64,
}

/// Both tables, in serializable form.
#[derive(Debug, Clone, Serialize)]
pub struct BuildTimeReport {
    pub components: Vec<BuildTimeRow>,
    pub dependencies: Vec<BuildTimeRow>,
}

impl BuildTimeReport {
    pub fn render_html(&self) -> String {
        let rocm = render_table(
            "ROCm Components",
            &[
                "Sub-Project",
                "Configure (s)",
                "Build (s)",
                "Install (s)",
                "Package (s)",
                "Total Time (s)",
            ],
            &self.components,
        );
        let deps = render_table(
            "Dependencies",
            &[
                "Sub-Project",
                "Download (s)",
                "Configure (s)",
                "Build (s)",
                "Install (s)",
                "Total Time (s)",
            ],
            &self.dependencies,
        );
        REPORT_TEMPLATE
            .replace("{{ROCM_TABLE}}", &rocm)
            .replace("{{DEP_TABLE}}", &deps)
    }
}

/// Seconds with two decimals, or `-` for zero.
pub fn format_duration(ms: u64) -> String {
    if ms == 0 {
        return "-".to_string();
    }
    format!("{:.2}", ms as f64 / 1000.0)
}

fn render_table(title: &str, headers: &[&str], rows: &[BuildTimeRow]) -> String {
    if rows.is_empty() {
        return String::new();
    }
    let body: Vec<Vec<(&str, String)>> = rows
        .iter()
        .map(|row| {
            let mut cells = vec![("", row.name.clone())];
            cells.extend(row.columns_ms.iter().map(|&ms| ("", format_duration(ms))));
            cells.push(("total-col", format_duration(row.total_ms)));
            cells
        })
        .collect();
    format!("<h2>{}</h2>\n{}", html::escape(title), html::table(headers, &body))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(start: u64, end: u64, output: &str) -> NinjaTask {
        NinjaTask {
            start_ms: start,
            end_ms: end,
            output: output.to_string(),
        }
    }

    fn sample() -> Vec<NinjaTask> {
        vec![
            task(0, 2000, "core/clr/stamp/configure.stamp"),
            task(2000, 12000, "core/clr/stamp/build.stamp"),
            task(12000, 12500, "core/clr/stamp/stage.stamp"),
            task(0, 30000, "math-libs/BLAS/hipBLASLt/stamp/build.stamp"),
            task(0, 100, "third-party/boost/boost-download.stamp"),
            task(100, 150, "third-party/boost/src/boost-stamp/boost-update"),
            task(150, 1150, "third-party/boost/stamp/build.stamp"),
            task(0, 999, "core/clr/CMakeFiles/hip.o"),
        ]
    }

    #[test]
    fn sums_phases_per_project() {
        let t = BuildTimes::aggregate(&sample(), None);
        assert_eq!(t.phase_ms(TaskCategory::RocmComponent, "core-hip", BuildPhase::Configure), 2000);
        assert_eq!(t.phase_ms(TaskCategory::RocmComponent, "core-hip", BuildPhase::Build), 10000);
        assert_eq!(t.phase_ms(TaskCategory::Dependency, "boost", BuildPhase::Update), 50);
        assert_eq!(t.project_count(TaskCategory::RocmComponent), 2);
        assert_eq!(t.project_count(TaskCategory::Dependency), 1);
    }

    #[test]
    fn duplicate_entries_counted_once() {
        let mut tasks = sample();
        tasks.push(task(2000, 12000, "core/clr/stamp/build.stamp"));
        let t = BuildTimes::aggregate(&tasks, None);
        assert_eq!(t.phase_ms(TaskCategory::RocmComponent, "core-hip", BuildPhase::Build), 10000);
    }

    #[test]
    fn absolute_outputs_are_relativised() {
        let tasks = vec![
            task(0, 500, "/work/build/core/clr/stamp/build.stamp"),
            task(0, 500, "core/clr/stamp/build.stamp"),
        ];
        let t = BuildTimes::aggregate(&tasks, Some("/work/build/"));
        // Both entries normalise to the same key.
        assert_eq!(t.phase_ms(TaskCategory::RocmComponent, "core-hip", BuildPhase::Build), 500);
    }

    #[test]
    fn rows_sorted_by_total_desc() {
        let rows = BuildTimes::aggregate(&sample(), None).component_rows();
        assert_eq!(rows[0].name, "hipBLASLt");
        assert_eq!(rows[0].total_ms, 30000);
        assert_eq!(rows[1].name, "core-hip");
        assert_eq!(rows[1].columns_ms, vec![2000, 10000, 500, 0]);
        assert_eq!(rows[1].total_ms, 12500);
    }

    #[test]
    fn dependency_download_includes_update() {
        let rows = BuildTimes::aggregate(&sample(), None).dependency_rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].columns_ms, vec![150, 0, 1000, 0]);
        assert_eq!(rows[0].total_ms, 1150);
    }

    #[test]
    fn format_duration_values() {
        assert_eq!(format_duration(0), "-");
        assert_eq!(format_duration(1234), "1.23");
        assert_eq!(format_duration(500), "0.50");
    }

    #[test]
    fn html_contains_both_tables() {
        let html = BuildTimes::aggregate(&sample(), None).report().render_html();
        assert!(html.contains("<h2>ROCm Components</h2>"));
        assert!(html.contains("<h2>Dependencies</h2>"));
        assert!(html.contains("<td class=\"total-col\">12.50</td>"));
        assert!(!html.contains("{{"));
    }

    #[test]
    fn empty_table_is_omitted() {
        let tasks = vec![task(0, 10, "core/clr/stamp/build.stamp")];
        let html = BuildTimes::aggregate(&tasks, None).report().render_html();
        assert!(html.contains("ROCm Components"));
        assert!(!html.contains("<h2>Dependencies</h2>"));
    }
}
