//! Child process execution with captured output and a wall-clock timeout.
//!
//! Used to run test commands (through `sh -c`) and `git diff`. The child is
//! killed when the timeout fires or the future is dropped.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Maximum stdout or stderr size kept per stream (10 MiB). Older output is
/// dropped so the tail, where test summaries live, survives.
const MAX_OUTPUT_BYTES: usize = 10 * 1024 * 1024;

const READ_CHUNK_BYTES: usize = 64 * 1024;

/// Default timeout for test commands.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(600);

/// Exit code reported for a command killed by the timeout, as coreutils
/// `timeout` does.
pub const TIMEOUT_EXIT_CODE: i32 = 124;

#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("Failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Command timed out after {elapsed_ms} ms")]
    Timeout { elapsed_ms: u64 },

    #[error("I/O error while waiting for child process: {0}")]
    Io(#[from] std::io::Error),
}

/// What to run and how.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    /// Working directory for the child (current dir if `None`).
    pub working_dir: Option<PathBuf>,
    /// Additional environment variables.
    pub env: Vec<(String, String)>,
    pub timeout: Duration,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            working_dir: None,
            env: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// A shell command line run through `sh -c`.
    pub fn shell(line: impl Into<String>) -> Self {
        Self::new("sh", ["-c".to_string(), line.into()])
    }

    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Command line for log messages.
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
}

impl CommandOutput {
    /// stdout followed by stderr.
    pub fn combined(&self) -> String {
        if self.stderr.is_empty() {
            return self.stdout.clone();
        }
        let mut out = self.stdout.clone();
        if !out.is_empty() && !out.ends_with('\n') {
            out.push('\n');
        }
        out.push_str(&self.stderr);
        out
    }

    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Spawn the command, capture both streams and enforce the timeout.
pub async fn run_command(spec: &CommandSpec) -> Result<CommandOutput, ProcessError> {
    let mut cmd = Command::new(&spec.program);
    cmd.args(&spec.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    for (key, value) in &spec.env {
        cmd.env(key, value);
    }
    if let Some(dir) = &spec.working_dir {
        cmd.current_dir(dir);
    }

    tracing::debug!(command = %spec.display(), timeout_s = spec.timeout.as_secs(), "Spawning command");
    let start = Instant::now();
    let mut child = cmd.spawn().map_err(|source| ProcessError::Spawn {
        program: spec.program.clone(),
        source,
    })?;

    // Readers run in their own tasks so `child.wait()` can borrow `child`.
    let stop_readers = CancellationToken::new();
    let stdout_task = tokio::spawn(read_stream(child.stdout.take(), stop_readers.clone()));
    let stderr_task = tokio::spawn(read_stream(child.stderr.take(), stop_readers.clone()));

    match tokio::time::timeout(spec.timeout, child.wait()).await {
        Ok(Ok(status)) => {
            // A background process started by the command may still hold the
            // pipes open; stop reading once the budget is spent.
            let remaining = spec.timeout.saturating_sub(start.elapsed());
            let readers = async { (join_reader(stdout_task).await, join_reader(stderr_task).await) };
            tokio::pin!(readers);
            let joined = tokio::time::timeout(remaining, &mut readers).await;
            let (stdout, stderr) = match joined {
                Ok(output) => output,
                Err(_) => {
                    tracing::warn!(
                        command = %spec.display(),
                        "Output pipes still open after the command exited, keeping partial output"
                    );
                    stop_readers.cancel();
                    readers.await
                }
            };
            Ok(CommandOutput {
                exit_code: status.code().unwrap_or(-1),
                stdout: String::from_utf8_lossy(&stdout).into_owned(),
                stderr: String::from_utf8_lossy(&stderr).into_owned(),
                duration: start.elapsed(),
            })
        }
        Ok(Err(e)) => {
            stop_readers.cancel();
            Err(ProcessError::Io(e))
        }
        Err(_elapsed) => {
            // Dropping `child` kills it (`kill_on_drop`).
            stop_readers.cancel();
            Err(ProcessError::Timeout {
                elapsed_ms: start.elapsed().as_millis() as u64,
            })
        }
    }
}

async fn join_reader(task: JoinHandle<Vec<u8>>) -> Vec<u8> {
    task.await.unwrap_or_default()
}

/// Drain `handle` to EOF (or until `stop` fires), keeping the last
/// [`MAX_OUTPUT_BYTES`].
async fn read_stream<R: AsyncRead + Unpin>(handle: Option<R>, stop: CancellationToken) -> Vec<u8> {
    let Some(mut h) = handle else {
        return Vec::new();
    };
    let mut kept: VecDeque<u8> = VecDeque::new();
    let mut dropped: usize = 0;
    let mut chunk = vec![0u8; READ_CHUNK_BYTES];
    loop {
        let n = tokio::select! {
            _ = stop.cancelled() => break,
            read = h.read(&mut chunk) => match read {
                Ok(0) | Err(_) => break,
                Ok(n) => n,
            },
        };
        kept.extend(&chunk[..n]);
        if kept.len() > MAX_OUTPUT_BYTES {
            let excess = kept.len() - MAX_OUTPUT_BYTES;
            kept.drain(..excess);
            dropped += excess;
        }
    }
    if dropped > 0 {
        tracing::debug!(dropped_bytes = dropped, "Output exceeded capture limit, kept the tail");
    }
    Vec::from(kept)
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[tokio::test]
    async fn captures_stdout_and_exit_code() {
        let out = run_command(&CommandSpec::shell("echo hello; exit 3")).await.unwrap();
        assert_eq!(out.exit_code, 3);
        assert_eq!(out.stdout.trim(), "hello");
        assert!(!out.success());
    }

    #[tokio::test]
    async fn combined_output_appends_stderr() {
        let out = run_command(&CommandSpec::shell("printf out; echo err >&2")).await.unwrap();
        assert_eq!(out.combined(), "out\nerr\n");
    }

    #[tokio::test]
    async fn env_and_working_dir_are_applied() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("marker.txt"), "").unwrap();
        let spec = CommandSpec::shell("ls; echo \"$ROCKSCOPE_TEST_VAR\"")
            .working_dir(dir.path())
            .env("ROCKSCOPE_TEST_VAR", "gfx942");
        let out = run_command(&spec).await.unwrap();
        assert!(out.stdout.contains("marker.txt"));
        assert!(out.stdout.contains("gfx942"));
    }

    #[tokio::test]
    async fn timeout_kills_child() {
        let spec = CommandSpec::shell("sleep 5").timeout(Duration::from_millis(100));
        let started = Instant::now();
        let err = run_command(&spec).await.unwrap_err();
        assert_matches!(err, ProcessError::Timeout { .. });
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[tokio::test]
    async fn missing_program_is_spawn_error() {
        let spec = CommandSpec::new("/nonexistent/rockscope-missing", Vec::<String>::new());
        assert_matches!(run_command(&spec).await, Err(ProcessError::Spawn { .. }));
    }

    #[tokio::test]
    async fn large_output_keeps_tail_and_child_finishes() {
        let spec = CommandSpec::shell("head -c 12000000 /dev/zero | tr '\\0' x; echo done");
        let out = run_command(&spec).await.unwrap();
        assert_eq!(out.exit_code, 0);
        assert_eq!(out.stdout.len(), MAX_OUTPUT_BYTES);
        assert!(out.stdout.ends_with("xdone\n"));
    }

    #[tokio::test]
    async fn background_process_holding_pipe_does_not_hang() {
        let spec = CommandSpec::shell("sleep 30 & echo ok").timeout(Duration::from_millis(500));
        let started = Instant::now();
        let out = run_command(&spec).await.unwrap();
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(out.exit_code, 0);
        assert_eq!(out.stdout.trim(), "ok");
    }

    #[test]
    fn display_joins_arguments() {
        assert_eq!(CommandSpec::shell("ctest -j8").display(), "sh -c ctest -j8");
    }
}
