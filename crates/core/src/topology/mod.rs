//! Build topology analysis.
//!
//! Reads a `BUILD_TOPOLOGY.toml` descriptor, computes per-artifact build
//! levels, the level-synchronous parallel batches, the critical path and a
//! handful of stage/group statistics, and renders them as text or JSON.

pub mod analysis;
pub mod descriptor;
pub mod graph;
pub mod report;

pub use analysis::TopologyAnalysis;
pub use descriptor::TopologyDescriptor;
pub use graph::{calculate_build_levels, critical_path, parallel_sets, DependencyGraph};
pub use report::render_text;
