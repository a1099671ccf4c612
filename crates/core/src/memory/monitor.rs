//! Background memory sampling task.
//!
//! [`MemoryMonitor::spawn`] starts a tokio task that samples on a fixed
//! interval until its [`CancellationToken`] fires, the optional maximum
//! runtime elapses or a stop-signal file appears. When the task stops on
//! its own it cancels the token, so callers waiting on it wake up.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tokio::io::AsyncWriteExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::{MemorySample, MemorySummary};
use crate::error::CoreResult;

/// Default sampling interval.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(5);

/// Extra time granted to the task to finish after cancellation.
const JOIN_BUFFER: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub phase: String,
    pub interval: Duration,
    /// Each sample is appended here as one JSON line.
    pub log_file: Option<PathBuf>,
    pub max_runtime: Option<Duration>,
    /// Monitoring stops once this file exists.
    pub stop_signal_file: Option<PathBuf>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            phase: "Unknown".to_string(),
            interval: DEFAULT_INTERVAL,
            log_file: None,
            max_runtime: None,
            stop_signal_file: None,
        }
    }
}

/// Samples collected by a stopped monitor.
#[derive(Debug, Clone)]
pub struct MonitorReport {
    pub phase: String,
    pub samples: Vec<MemorySample>,
    pub duration: Duration,
}

impl MonitorReport {
    pub fn summary(&self) -> Option<MemorySummary> {
        MemorySummary::from_samples(&self.phase, &self.samples, self.duration)
    }
}

/// Handle to a running sampling task.
pub struct MemoryMonitor {
    phase: String,
    interval: Duration,
    cancel: CancellationToken,
    started: Instant,
    handle: JoinHandle<Vec<MemorySample>>,
}

impl MemoryMonitor {
    /// Start sampling the running system.
    pub fn spawn(config: MonitorConfig, cancel: CancellationToken) -> Self {
        Self::spawn_with(config, cancel, MemorySample::collect)
    }

    /// Start sampling with a custom sample source.
    pub fn spawn_with<F>(config: MonitorConfig, cancel: CancellationToken, sampler: F) -> Self
    where
        F: FnMut(&str) -> CoreResult<MemorySample> + Send + 'static,
    {
        let phase = config.phase.clone();
        let interval = config.interval;
        let handle = tokio::spawn(run(config, cancel.clone(), sampler));
        Self {
            phase,
            interval,
            cancel,
            started: Instant::now(),
            handle,
        }
    }

    /// Token that is cancelled when monitoring ends for any reason.
    pub fn token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Cancel the task and wait for it for at most `interval + 1s`.
    pub async fn stop(self) -> MonitorReport {
        self.cancel.cancel();
        let duration = self.started.elapsed();
        let abort = self.handle.abort_handle();
        let samples = match tokio::time::timeout(self.interval.saturating_add(JOIN_BUFFER), self.handle).await {
            Ok(Ok(samples)) => samples,
            Ok(Err(e)) => {
                tracing::error!(error = %e, "Memory monitor task failed");
                Vec::new()
            }
            Err(_) => {
                tracing::warn!(phase = %self.phase, "Memory monitor did not stop in time");
                abort.abort();
                Vec::new()
            }
        };
        tracing::info!(phase = %self.phase, samples = samples.len(), "Memory monitoring stopped");
        MonitorReport {
            phase: self.phase,
            samples,
            duration,
        }
    }
}

async fn run<F>(config: MonitorConfig, cancel: CancellationToken, mut sampler: F) -> Vec<MemorySample>
where
    F: FnMut(&str) -> CoreResult<MemorySample>,
{
    tracing::info!(
        phase = %config.phase,
        interval_ms = config.interval.as_millis() as u64,
        "Memory monitoring started"
    );

    let started = Instant::now();
    let mut interval = tokio::time::interval(config.interval);
    let mut samples = Vec::new();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::debug!(phase = %config.phase, "Memory monitor cancelled");
                break;
            }
            _ = interval.tick() => {
                if config.max_runtime.is_some_and(|max| started.elapsed() >= max) {
                    tracing::info!(phase = %config.phase, "Maximum runtime exceeded, stopping memory monitor");
                    break;
                }
                if config.stop_signal_file.as_deref().is_some_and(Path::exists) {
                    tracing::info!(phase = %config.phase, "Stop signal file detected, stopping memory monitor");
                    break;
                }

                let tick_started = Instant::now();
                match sampler(config.phase.as_str()) {
                    Ok(sample) => {
                        log_sample(&sample);
                        if let Some(path) = &config.log_file {
                            if let Err(e) = append_json_line(path, &sample).await {
                                tracing::warn!(path = %path.display(), error = %e, "Failed to write memory log");
                            }
                        }
                        samples.push(sample);
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to collect memory stats");
                    }
                }
                if tick_started.elapsed() > config.interval {
                    tracing::warn!(
                        interval_ms = config.interval.as_millis() as u64,
                        "Memory stats collection took longer than the interval"
                    );
                }
            }
        }
    }

    cancel.cancel();
    samples
}

fn log_sample(sample: &MemorySample) {
    tracing::info!(
        phase = %sample.phase,
        used_gb = sample.used_memory_gb,
        total_gb = sample.total_memory_gb,
        memory_percent = sample.memory_percent,
        swap_percent = sample.swap_percent,
        process_gb = sample.total_process_memory_gb(),
        "Memory sample"
    );
    for alert in sample.alerts() {
        tracing::warn!(severity = ?alert.level, "{}", alert.message);
    }
}

async fn append_json_line(path: &Path, sample: &MemorySample) -> std::io::Result<()> {
    let mut line = serde_json::to_vec(sample).map_err(std::io::Error::other)?;
    line.push(b'\n');
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(&line).await?;
    file.flush().await
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::error::CoreError;
    use crate::memory::tests::sample;

    fn config(interval_ms: u64) -> MonitorConfig {
        MonitorConfig {
            phase: "Build".to_string(),
            interval: Duration::from_millis(interval_ms),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn collects_until_stopped() {
        let monitor = MemoryMonitor::spawn_with(config(10), CancellationToken::new(), |_| {
            Ok(sample(40.0, 0.0, 6.0))
        });
        tokio::time::sleep(Duration::from_millis(80)).await;
        let report = monitor.stop().await;
        assert!(report.samples.len() >= 2);
        let summary = report.summary().unwrap();
        assert_eq!(summary.phase, "Build");
        assert_eq!(summary.samples, report.samples.len());
    }

    #[tokio::test]
    async fn writes_json_lines_log() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("memory.jsonl");
        let cfg = MonitorConfig {
            log_file: Some(log.clone()),
            ..config(10)
        };
        let monitor = MemoryMonitor::spawn_with(cfg, CancellationToken::new(), |_| Ok(sample(10.0, 0.0, 1.0)));
        tokio::time::sleep(Duration::from_millis(50)).await;
        let report = monitor.stop().await;

        let text = std::fs::read_to_string(&log).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), report.samples.len());
        let first: MemorySample = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first.phase, "Build");
    }

    #[tokio::test]
    async fn sampler_errors_are_skipped() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let monitor = MemoryMonitor::spawn_with(config(10), CancellationToken::new(), move |_| {
            if counter.fetch_add(1, Ordering::SeqCst) % 2 == 0 {
                Err(CoreError::Validation("no /proc".into()))
            } else {
                Ok(sample(10.0, 0.0, 1.0))
            }
        });
        tokio::time::sleep(Duration::from_millis(80)).await;
        let report = monitor.stop().await;
        let calls = calls.load(Ordering::SeqCst);
        assert!(calls >= 2);
        assert!(report.samples.len() < calls);
    }

    #[tokio::test]
    async fn max_runtime_stops_and_cancels_token() {
        let cfg = MonitorConfig {
            max_runtime: Some(Duration::from_millis(30)),
            ..config(10)
        };
        let monitor = MemoryMonitor::spawn_with(cfg, CancellationToken::new(), |_| Ok(sample(10.0, 0.0, 1.0)));
        let token = monitor.token();
        tokio::time::timeout(Duration::from_secs(2), token.cancelled())
            .await
            .expect("monitor should stop on its own");
        let report = monitor.stop().await;
        assert!(!report.samples.is_empty());
    }

    #[tokio::test]
    async fn stop_signal_file_ends_monitoring() {
        let dir = tempfile::tempdir().unwrap();
        let signal = dir.path().join("stop");
        let cfg = MonitorConfig {
            stop_signal_file: Some(signal.clone()),
            ..config(10)
        };
        let monitor = MemoryMonitor::spawn_with(cfg, CancellationToken::new(), |_| Ok(sample(10.0, 0.0, 1.0)));
        tokio::time::sleep(Duration::from_millis(30)).await;
        std::fs::write(&signal, "").unwrap();
        let token = monitor.token();
        tokio::time::timeout(Duration::from_secs(2), token.cancelled())
            .await
            .expect("monitor should notice the stop file");
        monitor.stop().await;
    }

    #[tokio::test]
    async fn external_cancellation_stops_promptly() {
        let cancel = CancellationToken::new();
        let monitor = MemoryMonitor::spawn_with(config(5_000), cancel.clone(), |_| Ok(sample(10.0, 0.0, 1.0)));
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();
        let started = Instant::now();
        let report = monitor.stop().await;
        assert!(started.elapsed() < Duration::from_secs(1));
        // The first tick fires immediately.
        assert_eq!(report.samples.len(), 1);
    }
}
