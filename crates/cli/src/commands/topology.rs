use std::path::Path;
use std::process::ExitCode;

use anyhow::Context;
use rockscope_core::topology::{render_text, TopologyAnalysis, TopologyDescriptor};

pub fn run(path: &Path, json: bool) -> anyhow::Result<ExitCode> {
    let descriptor = TopologyDescriptor::load(path)
        .with_context(|| format!("loading topology from {}", path.display()))?;
    let analysis = TopologyAnalysis::analyze(&descriptor);
    tracing::info!(
        artifacts = analysis.total_artifacts,
        max_build_levels = analysis.max_build_levels,
        "Analyzed build topology"
    );

    if json {
        super::print_json(&analysis)?;
    } else {
        print!("{}", render_text(&analysis));
    }
    Ok(ExitCode::SUCCESS)
}
