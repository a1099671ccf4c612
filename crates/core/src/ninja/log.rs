//! `.ninja_log` parsing.
//!
//! The log starts with a `# ninja log vN` header followed by one
//! tab-separated line per finished edge: `start end mtime output hash`,
//! times in milliseconds since the build started.

use std::path::Path;

use serde::Serialize;

use crate::error::{CoreError, CoreResult};

/// One finished build edge.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct NinjaTask {
    pub start_ms: u64,
    pub end_ms: u64,
    pub output: String,
}

impl NinjaTask {
    pub fn duration_ms(&self) -> u64 {
        self.end_ms.saturating_sub(self.start_ms)
    }
}

/// Parse `.ninja_log` content. The first line is always treated as the
/// header; short or non-numeric lines are skipped.
pub fn parse_ninja_log(text: &str) -> Vec<NinjaTask> {
    let mut tasks = Vec::new();
    for (idx, line) in text.lines().enumerate().skip(1) {
        let fields: Vec<&str> = line.trim().split('\t').collect();
        if fields.len() < 4 {
            continue;
        }
        let (Ok(start_ms), Ok(end_ms)) = (fields[0].parse(), fields[1].parse()) else {
            tracing::debug!(line = idx + 1, "Skipping ninja log line with non-numeric times");
            continue;
        };
        tasks.push(NinjaTask {
            start_ms,
            end_ms,
            output: fields[3].to_string(),
        });
    }
    tasks
}

/// Read and parse a `.ninja_log` file.
pub fn load_ninja_log(path: impl AsRef<Path>) -> CoreResult<Vec<NinjaTask>> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|e| CoreError::io(path, e))?;
    let tasks = parse_ninja_log(&text);
    tracing::debug!(path = %path.display(), tasks = tasks.len(), "Parsed ninja log");
    Ok(tasks)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skips_header_and_short_lines() {
        let log = "# ninja log v5\n\
                   0\t1500\t0\tcompiler/amd-llvm/stamp/build.stamp\tabc\n\
                   garbage\n\
                   10\t20\t0\n";
        let tasks = parse_ninja_log(log);
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].output, "compiler/amd-llvm/stamp/build.stamp");
        assert_eq!(tasks[0].duration_ms(), 1500);
    }

    #[test]
    fn accepts_lines_without_hash() {
        let tasks = parse_ninja_log("# ninja log v5\n5\t9\t0\tout.o\n");
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].start_ms, 5);
    }

    #[test]
    fn skips_non_numeric_times() {
        let tasks = parse_ninja_log("# ninja log v5\nx\t9\t0\tout.o\thash\n");
        assert!(tasks.is_empty());
    }

    #[test]
    fn first_line_is_always_header() {
        let tasks = parse_ninja_log("0\t1\t0\tfirst.o\th\n1\t2\t0\tsecond.o\th\n");
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].output, "second.o");
    }

    #[test]
    fn duration_never_underflows() {
        let t = NinjaTask {
            start_ms: 10,
            end_ms: 5,
            output: "x".into(),
        };
        assert_eq!(t.duration_ms(), 0);
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(".ninja_log");
        std::fs::write(&path, "# ninja log v5\n0\t3\t0\ta\th\n").expect("write");
        let tasks = load_ninja_log(&path).expect("load");
        assert_eq!(tasks.len(), 1);
    }
}
