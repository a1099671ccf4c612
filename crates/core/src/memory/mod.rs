//! System and process memory sampling for long-running CI phases.
//!
//! Readings come from `/proc/meminfo` and `/proc/<pid>/status`; a
//! [`MemorySample`] is one point-in-time snapshot and a [`MemorySummary`]
//! condenses a series of them for the job log and the step summary.

pub mod monitor;

pub use monitor::{MemoryMonitor, MonitorConfig, MonitorReport, DEFAULT_INTERVAL};

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

pub const MEMORY_WARNING_PERCENT: f64 = 75.0;
pub const MEMORY_CRITICAL_PERCENT: f64 = 90.0;
pub const SWAP_WARNING_PERCENT: f64 = 50.0;

const KB_PER_GB: f64 = 1024.0 * 1024.0;
const SEPARATOR_WIDTH: usize = 80;

/// The `/proc/meminfo` fields used here, in kB.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemInfo {
    pub total_kb: u64,
    pub free_kb: u64,
    pub available_kb: u64,
    pub swap_total_kb: u64,
    pub swap_free_kb: u64,
}

impl MemInfo {
    pub fn used_kb(&self) -> u64 {
        self.total_kb.saturating_sub(self.available_kb)
    }

    pub fn swap_used_kb(&self) -> u64 {
        self.swap_total_kb.saturating_sub(self.swap_free_kb)
    }

    pub fn memory_percent(&self) -> f64 {
        percent(self.used_kb(), self.total_kb)
    }

    pub fn swap_percent(&self) -> f64 {
        percent(self.swap_used_kb(), self.swap_total_kb)
    }
}

fn percent(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

fn kb_to_gb(kb: u64) -> f64 {
    kb as f64 / KB_PER_GB
}

/// Value of a `Key:   1234 kB` line.
fn field_kb(text: &str, key: &str) -> Option<u64> {
    text.lines().find_map(|line| {
        let (name, rest) = line.split_once(':')?;
        if name.trim() != key {
            return None;
        }
        rest.split_whitespace().next()?.parse().ok()
    })
}

/// Parse `/proc/meminfo` content. `MemAvailable` falls back to `MemFree`
/// on kernels that do not report it.
pub fn parse_meminfo(text: &str) -> CoreResult<MemInfo> {
    let total_kb = field_kb(text, "MemTotal")
        .ok_or_else(|| CoreError::Validation("MemTotal missing from meminfo".to_string()))?;
    let free_kb = field_kb(text, "MemFree").unwrap_or(0);
    Ok(MemInfo {
        total_kb,
        free_kb,
        available_kb: field_kb(text, "MemAvailable").unwrap_or(free_kb),
        swap_total_kb: field_kb(text, "SwapTotal").unwrap_or(0),
        swap_free_kb: field_kb(text, "SwapFree").unwrap_or(0),
    })
}

/// Resident set size (kB) from `/proc/<pid>/status` content.
pub fn parse_process_rss(text: &str) -> Option<u64> {
    field_kb(text, "VmRSS")
}

/// Process ids listed in `/proc/<pid>/task/<tid>/children` content.
pub fn parse_children(text: &str) -> Vec<u32> {
    text.split_whitespace().filter_map(|p| p.parse().ok()).collect()
}

/// All descendants of `pid`, read through the `children` files of each task.
/// Processes that vanish while walking are ignored.
#[cfg(target_os = "linux")]
fn descendant_pids(pid: u32) -> Vec<u32> {
    let mut seen = std::collections::BTreeSet::new();
    let mut stack = vec![pid];
    while let Some(current) = stack.pop() {
        let Ok(tasks) = std::fs::read_dir(format!("/proc/{current}/task")) else {
            continue;
        };
        for task in tasks.flatten() {
            let Ok(text) = std::fs::read_to_string(task.path().join("children")) else {
                continue;
            };
            for child in parse_children(&text) {
                if seen.insert(child) {
                    stack.push(child);
                }
            }
        }
    }
    seen.into_iter().collect()
}

#[cfg(target_os = "linux")]
fn process_rss_kb(pid: u32) -> Option<u64> {
    let text = std::fs::read_to_string(format!("/proc/{pid}/status")).ok()?;
    parse_process_rss(&text)
}

/// One point-in-time memory snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemorySample {
    pub timestamp: DateTime<Utc>,
    pub phase: String,
    pub total_memory_gb: f64,
    pub available_memory_gb: f64,
    pub used_memory_gb: f64,
    pub free_memory_gb: f64,
    pub memory_percent: f64,
    pub total_swap_gb: f64,
    pub used_swap_gb: f64,
    pub swap_percent: f64,
    pub process_memory_gb: f64,
    pub children_memory_gb: f64,
}

impl MemorySample {
    /// Build a sample from parsed readings (RSS values in kB).
    pub fn from_readings(phase: &str, info: &MemInfo, self_rss_kb: u64, children_rss_kb: u64) -> Self {
        Self {
            timestamp: Utc::now(),
            phase: phase.to_string(),
            total_memory_gb: kb_to_gb(info.total_kb),
            available_memory_gb: kb_to_gb(info.available_kb),
            used_memory_gb: kb_to_gb(info.used_kb()),
            free_memory_gb: kb_to_gb(info.free_kb),
            memory_percent: info.memory_percent(),
            total_swap_gb: kb_to_gb(info.swap_total_kb),
            used_swap_gb: kb_to_gb(info.swap_used_kb()),
            swap_percent: info.swap_percent(),
            process_memory_gb: kb_to_gb(self_rss_kb),
            children_memory_gb: kb_to_gb(children_rss_kb),
        }
    }

    /// Sample the running system.
    #[cfg(target_os = "linux")]
    pub fn collect(phase: &str) -> CoreResult<Self> {
        let path = "/proc/meminfo";
        let text = std::fs::read_to_string(path).map_err(|e| CoreError::io(path, e))?;
        let info = parse_meminfo(&text)?;
        let pid = std::process::id();
        let self_rss = process_rss_kb(pid).unwrap_or(0);
        let children_rss = descendant_pids(pid)
            .into_iter()
            .filter_map(process_rss_kb)
            .sum();
        Ok(Self::from_readings(phase, &info, self_rss, children_rss))
    }

    #[cfg(not(target_os = "linux"))]
    pub fn collect(_phase: &str) -> CoreResult<Self> {
        Err(CoreError::Validation(
            "memory sampling requires /proc and is only supported on Linux".to_string(),
        ))
    }

    pub fn total_process_memory_gb(&self) -> f64 {
        self.process_memory_gb + self.children_memory_gb
    }

    /// Human-readable block for the job log.
    pub fn format(&self) -> String {
        [
            format!(
                "[{}] Memory Stats - Phase: {}",
                self.timestamp.to_rfc3339(),
                self.phase
            ),
            format!(
                "  System Memory: {:.2} GB / {:.2} GB ({:.1}% used)",
                self.used_memory_gb, self.total_memory_gb, self.memory_percent
            ),
            format!(
                "  Available: {:.2} GB | Free: {:.2} GB",
                self.available_memory_gb, self.free_memory_gb
            ),
            format!(
                "  Swap: {:.2} GB / {:.2} GB ({:.1}% used)",
                self.used_swap_gb, self.total_swap_gb, self.swap_percent
            ),
            format!(
                "  Process Memory: {:.2} GB (Self: {:.2} GB, Children: {:.2} GB)",
                self.total_process_memory_gb(),
                self.process_memory_gb,
                self.children_memory_gb
            ),
        ]
        .join("\n")
    }

    pub fn alerts(&self) -> Vec<MemoryAlert> {
        let mut alerts = Vec::new();
        if self.memory_percent > MEMORY_CRITICAL_PERCENT {
            alerts.push(MemoryAlert {
                level: AlertLevel::Critical,
                message: format!("Memory usage is critically high ({:.1}%)", self.memory_percent),
            });
        } else if self.memory_percent > MEMORY_WARNING_PERCENT {
            alerts.push(MemoryAlert {
                level: AlertLevel::Warning,
                message: format!("Memory usage is high ({:.1}%)", self.memory_percent),
            });
        }
        if self.swap_percent > SWAP_WARNING_PERCENT {
            alerts.push(MemoryAlert {
                level: AlertLevel::Warning,
                message: format!(
                    "Swap usage is high ({:.1}%), this may slow down builds",
                    self.swap_percent
                ),
            });
        }
        alerts
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    Warning,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemoryAlert {
    pub level: AlertLevel,
    pub message: String,
}

/// Overall status of a monitored phase, by peak memory percentage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryStatus {
    Ok,
    Warning,
    Critical,
}

impl fmt::Display for MemoryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Ok => "OK",
            Self::Warning => "WARNING",
            Self::Critical => "CRITICAL",
        })
    }
}

/// Aggregate over all samples of one phase.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemorySummary {
    pub phase: String,
    pub duration: Duration,
    pub samples: usize,
    pub avg_memory_percent: f64,
    pub peak_memory_percent: f64,
    pub peak_memory_gb: f64,
    pub avg_swap_percent: f64,
    pub peak_swap_percent: f64,
    pub peak_swap_gb: f64,
}

impl MemorySummary {
    /// `None` when no sample was collected.
    pub fn from_samples(phase: &str, samples: &[MemorySample], duration: Duration) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }
        let n = samples.len() as f64;
        let max = |f: fn(&MemorySample) -> f64| samples.iter().map(f).fold(0.0_f64, f64::max);
        let avg = |f: fn(&MemorySample) -> f64| samples.iter().map(f).sum::<f64>() / n;
        Some(Self {
            phase: phase.to_string(),
            duration,
            samples: samples.len(),
            avg_memory_percent: avg(|s| s.memory_percent),
            peak_memory_percent: max(|s| s.memory_percent),
            peak_memory_gb: max(|s| s.used_memory_gb),
            avg_swap_percent: avg(|s| s.swap_percent),
            peak_swap_percent: max(|s| s.swap_percent),
            peak_swap_gb: max(|s| s.used_swap_gb),
        })
    }

    pub fn status(&self) -> MemoryStatus {
        if self.peak_memory_percent > MEMORY_CRITICAL_PERCENT {
            MemoryStatus::Critical
        } else if self.peak_memory_percent > MEMORY_WARNING_PERCENT {
            MemoryStatus::Warning
        } else {
            MemoryStatus::Ok
        }
    }

    pub fn swap_warning(&self) -> bool {
        self.peak_swap_percent > SWAP_WARNING_PERCENT
    }

    fn minutes(&self) -> f64 {
        self.duration.as_secs_f64() / 60.0
    }

    pub fn render_text(&self) -> String {
        let rule = "=".repeat(SEPARATOR_WIDTH);
        let mut out = format!(
            "{rule}\n[SUMMARY] Memory Monitoring Summary - Phase: {}\n{rule}\n",
            self.phase
        );
        out.push_str(&format!("Duration: {:.1} minutes\n", self.minutes()));
        out.push_str(&format!("Samples collected: {}\n\n", self.samples));
        out.push_str("Memory Usage:\n");
        out.push_str(&format!("  Average: {:.1}%\n", self.avg_memory_percent));
        out.push_str(&format!(
            "  Peak: {:.1}% ({:.2} GB)\n\n",
            self.peak_memory_percent, self.peak_memory_gb
        ));
        out.push_str("Swap Usage:\n");
        out.push_str(&format!("  Average: {:.1}%\n", self.avg_swap_percent));
        out.push_str(&format!(
            "  Peak: {:.1}% ({:.2} GB)\n",
            self.peak_swap_percent, self.peak_swap_gb
        ));
        match self.status() {
            MemoryStatus::Critical => out.push_str(&format!(
                "\n[CRITICAL] Memory usage exceeded {MEMORY_CRITICAL_PERCENT}% during this phase!\n   This phase is likely causing out-of-memory issues.\n"
            )),
            MemoryStatus::Warning => out.push_str(&format!(
                "\n[WARNING] Memory usage exceeded {MEMORY_WARNING_PERCENT}% during this phase.\n"
            )),
            MemoryStatus::Ok => {}
        }
        if self.swap_warning() {
            out.push_str(&format!(
                "\n[WARNING] Significant swap usage detected ({:.1}%)\n   Consider increasing available memory or reducing parallel jobs.\n",
                self.peak_swap_percent
            ));
        }
        out.push_str(&rule);
        out.push('\n');
        out
    }

    /// Markdown section for `GITHUB_STEP_SUMMARY`.
    pub fn render_markdown(&self) -> String {
        let mut md = format!("## [{}] Memory Stats: {}\n\n", self.status(), self.phase);
        md.push_str("| Metric | Value |\n");
        md.push_str("|:-------|------:|\n");
        md.push_str(&format!("| **Duration** | {:.1} min |\n", self.minutes()));
        md.push_str(&format!("| **Samples Collected** | {} |\n", self.samples));
        md.push_str(&format!("| **Average Memory** | {:.1}% |\n", self.avg_memory_percent));
        md.push_str(&format!(
            "| **Peak Memory** | {:.1}% ({:.2} GB) |\n",
            self.peak_memory_percent, self.peak_memory_gb
        ));
        md.push_str(&format!("| **Average Swap** | {:.1}% |\n", self.avg_swap_percent));
        md.push_str(&format!(
            "| **Peak Swap** | {:.1}% ({:.2} GB) |\n",
            self.peak_swap_percent, self.peak_swap_gb
        ));
        match self.status() {
            MemoryStatus::Critical => md.push_str(&format!(
                "\n> [!CAUTION]\n> Memory usage exceeded {MEMORY_CRITICAL_PERCENT}% during this phase! This phase is likely causing out-of-memory issues.\n"
            )),
            MemoryStatus::Warning => md.push_str(&format!(
                "\n> [!WARNING]\n> Memory usage exceeded {MEMORY_WARNING_PERCENT}% during this phase.\n"
            )),
            MemoryStatus::Ok => {}
        }
        if self.swap_warning() {
            md.push_str(&format!(
                "\n> [!WARNING]\n> Significant swap usage detected ({:.1}%). Consider increasing available memory or reducing parallel jobs.\n",
                self.peak_swap_percent
            ));
        }
        md
    }
}
