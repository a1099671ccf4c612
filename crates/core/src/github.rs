//! GitHub Actions file-based outputs.
//!
//! Workflow steps communicate through files named by environment variables:
//! `GITHUB_OUTPUT` takes `key=value` lines, `GITHUB_STEP_SUMMARY` takes
//! Markdown that is rendered on the run page.

use std::io::Write;
use std::path::Path;

use crate::error::{CoreError, CoreResult};

fn append(path: &Path, text: &str) -> CoreResult<()> {
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| CoreError::io(path, e))?;
    file.write_all(text.as_bytes())
        .map_err(|e| CoreError::io(path, e))
}

/// Append Markdown to the step summary file, ending with a newline.
pub fn append_step_summary(path: &Path, markdown: &str) -> CoreResult<()> {
    let mut text = markdown.to_string();
    if !text.ends_with('\n') {
        text.push('\n');
    }
    append(path, &text)?;
    tracing::debug!(path = %path.display(), bytes = text.len(), "Appended step summary");
    Ok(())
}

/// Append `key=value` lines to the step output file.
pub fn write_outputs(path: &Path, outputs: &[(&str, String)]) -> CoreResult<()> {
    let mut text = String::new();
    for (key, value) in outputs {
        if key.is_empty() || key.contains('=') || value.contains('\n') {
            return Err(CoreError::Validation(format!(
                "invalid GitHub output entry: {key:?}"
            )));
        }
        text.push_str(&format!("{key}={value}\n"));
    }
    append(path, &text)?;
    tracing::info!(path = %path.display(), outputs = outputs.len(), "Wrote GitHub outputs");
    Ok(())
}
