//! Whole-descriptor analysis: levels, critical path, stages and hot spots.

use std::collections::BTreeMap;

use serde::Serialize;

use super::descriptor::{TopologyDescriptor, PER_ARCH_GROUP_TYPE};
use super::graph::{calculate_build_levels, critical_path, parallel_sets, DependencyGraph};

/// Number of high-impact artifacts listed by default.
pub const DEFAULT_HIGH_IMPACT_LIMIT: usize = 15;

/// Number of largest groups listed by default.
pub const DEFAULT_LARGEST_GROUPS_LIMIT: usize = 5;

/// Name of the stage that always runs first and is never "independent".
pub const FOUNDATION_STAGE: &str = "foundation";

/// Per-stage summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageInfo {
    pub name: String,
    pub groups: Vec<String>,
    pub stage_type: String,
    pub artifact_count: usize,
    pub description: String,
}

/// An artifact that many others depend on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImpactEntry {
    pub artifact: String,
    pub dependents: usize,
    /// Level of the artifact, 0 when it is not a declared artifact.
    pub level: usize,
    pub group: Option<String>,
}

/// Group size summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupSize {
    pub group: String,
    pub artifacts: usize,
    pub group_type: String,
}

/// Everything the topology report shows, in serializable form.
#[derive(Debug, Clone, Serialize)]
pub struct TopologyAnalysis {
    pub total_artifacts: usize,
    pub total_groups: usize,
    pub total_stages: usize,
    /// `max_level + 1`, the minimum serial depth of the build (0 without artifacts).
    pub max_build_levels: usize,
    pub levels: BTreeMap<String, usize>,
    pub parallel_sets: BTreeMap<usize, Vec<String>>,
    pub critical_path: Vec<String>,
    pub stages: Vec<StageInfo>,
    pub independent_stages: Vec<String>,
    pub high_impact: Vec<ImpactEntry>,
    pub largest_groups: Vec<GroupSize>,
    pub per_arch_groups: Vec<String>,
    pub leaf_artifacts: usize,
}

impl TopologyAnalysis {
    pub fn analyze(descriptor: &TopologyDescriptor) -> Self {
        let graph = DependencyGraph::from_descriptor(descriptor);
        let levels = calculate_build_levels(&graph);
        let max_level = levels.values().copied().max();
        let path = critical_path(&graph, &levels);
        let sets = parallel_sets(&levels);
        let leaf_artifacts = sets.get(&0).map(Vec::len).unwrap_or(0);

        tracing::debug!(
            artifacts = graph.len(),
            ?max_level,
            critical_path_len = path.len(),
            "Computed build levels",
        );

        Self {
            total_artifacts: descriptor.artifacts.len(),
            total_groups: descriptor.artifact_groups.len(),
            total_stages: descriptor.build_stages.len(),
            // No artifacts means no levels.
            max_build_levels: max_level.map_or(0, |l| l + 1),
            high_impact: high_impact(&graph, &levels, DEFAULT_HIGH_IMPACT_LIMIT),
            largest_groups: largest_groups(descriptor, &graph, DEFAULT_LARGEST_GROUPS_LIMIT),
            stages: analyze_build_stages(descriptor),
            independent_stages: independent_stages(descriptor, &graph),
            per_arch_groups: per_arch_groups(descriptor),
            critical_path: path,
            parallel_sets: sets,
            levels,
            leaf_artifacts,
        }
    }
}

/// Summarise each build stage, counting the artifacts whose group belongs
/// to it.
pub fn analyze_build_stages(descriptor: &TopologyDescriptor) -> Vec<StageInfo> {
    descriptor
        .build_stages
        .iter()
        .map(|(name, stage)| {
            let artifact_count = descriptor
                .artifacts
                .values()
                .filter(|a| stage.artifact_groups.contains(&a.artifact_group))
                .count();
            StageInfo {
                name: name.clone(),
                groups: stage.artifact_groups.clone(),
                stage_type: stage.stage_type.clone(),
                artifact_count,
                description: stage.description.clone(),
            }
        })
        .collect()
}

/// Stages, other than the foundation stage, none of whose groups declare
/// group-level dependencies.
pub fn independent_stages(descriptor: &TopologyDescriptor, graph: &DependencyGraph) -> Vec<String> {
    descriptor
        .build_stages
        .iter()
        .filter(|(name, _)| name.as_str() != FOUNDATION_STAGE)
        .filter(|(_, stage)| {
            stage
                .artifact_groups
                .iter()
                .all(|g| graph.group_deps(g).is_empty())
        })
        .map(|(name, _)| name.clone())
        .collect()
}

/// Artifacts with the most dependents, most first (name order on ties).
pub fn high_impact(
    graph: &DependencyGraph,
    levels: &BTreeMap<String, usize>,
    limit: usize,
) -> Vec<ImpactEntry> {
    let mut entries: Vec<ImpactEntry> = graph
        .dependents()
        .into_iter()
        .map(|(artifact, dependents)| ImpactEntry {
            level: levels.get(&artifact).copied().unwrap_or(0),
            group: graph.group_of(&artifact).map(str::to_string),
            dependents: dependents.len(),
            artifact,
        })
        .collect();
    entries.sort_by(|a, b| {
        b.dependents
            .cmp(&a.dependents)
            .then_with(|| a.artifact.cmp(&b.artifact))
    });
    entries.truncate(limit);
    entries
}

/// Groups with the most artifacts, largest first (first seen on ties).
pub fn largest_groups(
    descriptor: &TopologyDescriptor,
    graph: &DependencyGraph,
    limit: usize,
) -> Vec<GroupSize> {
    let mut sizes: Vec<GroupSize> = graph
        .group_sizes()
        .into_iter()
        .map(|(group, artifacts)| GroupSize {
            group_type: descriptor.group_type(&group).to_string(),
            group,
            artifacts,
        })
        .collect();
    // Stable sort keeps first-seen order among equal sizes.
    sizes.sort_by(|a, b| b.artifacts.cmp(&a.artifacts));
    sizes.truncate(limit);
    sizes
}

pub fn per_arch_groups(descriptor: &TopologyDescriptor) -> Vec<String> {
    descriptor
        .artifact_groups
        .iter()
        .filter(|(_, g)| g.group_type == PER_ARCH_GROUP_TYPE)
        .map(|(name, _)| name.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[build_stages.foundation]
artifact_groups = ["sysdeps"]

[build_stages.compiler-runtime]
artifact_groups = ["compiler", "runtime"]
description = "Compiler and HIP runtime"

[build_stages.math-libs]
artifact_groups = ["math-libs"]
type = "per-arch"

[build_stages.docs]
artifact_groups = ["docs"]

[artifact_groups.sysdeps]

[artifact_groups.compiler]
artifact_group_deps = ["sysdeps"]

[artifact_groups.runtime]
artifact_group_deps = ["compiler"]

[artifact_groups.math-libs]
type = "per-arch"
artifact_group_deps = ["runtime"]

[artifact_groups.docs]

[artifacts.sysdeps-zlib]
artifact_group = "sysdeps"

[artifacts.amd-llvm]
artifact_group = "compiler"
artifact_deps = ["sysdeps-zlib"]

[artifacts.core-runtime]
artifact_group = "runtime"
artifact_deps = ["sysdeps-zlib"]

[artifacts.core-hip]
artifact_group = "runtime"
artifact_deps = ["amd-llvm", "core-runtime"]

[artifacts.blas]
artifact_group = "math-libs"
artifact_deps = ["core-hip"]

[artifacts.fft]
artifact_group = "math-libs"
artifact_deps = ["core-hip", "sysdeps-zlib"]

[artifacts.rocm-docs]
artifact_group = "docs"
"#;

    fn analysis() -> TopologyAnalysis {
        let d = TopologyDescriptor::from_toml_str(SAMPLE).expect("parse");
        TopologyAnalysis::analyze(&d)
    }

    #[test]
    fn totals() {
        let a = analysis();
        assert_eq!(a.total_artifacts, 7);
        assert_eq!(a.total_groups, 5);
        assert_eq!(a.total_stages, 4);
        assert_eq!(a.max_build_levels, 4);
        assert_eq!(a.leaf_artifacts, 2);
    }

    #[test]
    fn critical_path_spans_all_levels() {
        let a = analysis();
        assert_eq!(a.critical_path, vec!["sysdeps-zlib", "amd-llvm", "core-hip", "blas"]);
        assert_eq!(a.critical_path.len(), a.max_build_levels);
    }

    #[test]
    fn stage_artifact_counts() {
        let a = analysis();
        let cr = a
            .stages
            .iter()
            .find(|s| s.name == "compiler-runtime")
            .expect("stage");
        assert_eq!(cr.artifact_count, 3);
        assert_eq!(cr.stage_type, "generic");
        assert_eq!(cr.description, "Compiler and HIP runtime");
        let math = a.stages.iter().find(|s| s.name == "math-libs").expect("stage");
        assert_eq!(math.artifact_count, 2);
        assert_eq!(math.stage_type, "per-arch");
    }

    #[test]
    fn independent_stages_skip_foundation_and_dependent_groups() {
        let a = analysis();
        assert_eq!(a.independent_stages, vec!["docs"]);
    }

    #[test]
    fn high_impact_orders_by_dependent_count() {
        let a = analysis();
        assert_eq!(a.high_impact[0].artifact, "sysdeps-zlib");
        assert_eq!(a.high_impact[0].dependents, 3);
        assert_eq!(a.high_impact[0].group.as_deref(), Some("sysdeps"));
        assert_eq!(a.high_impact[1].artifact, "core-hip");
        assert_eq!(a.high_impact[1].dependents, 2);
        assert_eq!(a.high_impact[1].level, 2);
    }

    #[test]
    fn high_impact_respects_limit() {
        let d = TopologyDescriptor::from_toml_str(SAMPLE).expect("parse");
        let graph = DependencyGraph::from_descriptor(&d);
        let levels = calculate_build_levels(&graph);
        assert_eq!(high_impact(&graph, &levels, 1).len(), 1);
    }

    #[test]
    fn largest_groups_and_per_arch() {
        let a = analysis();
        assert_eq!(a.largest_groups[0].group, "runtime");
        assert_eq!(a.largest_groups[0].artifacts, 2);
        assert_eq!(a.largest_groups[1].group, "math-libs");
        assert_eq!(a.largest_groups[1].group_type, "per-arch");
        assert_eq!(a.per_arch_groups, vec!["math-libs"]);
    }

    #[test]
    fn empty_descriptor() {
        let a = TopologyAnalysis::analyze(&TopologyDescriptor::default());
        assert_eq!(a.max_build_levels, 0);
        assert_eq!(a.critical_path.len(), a.max_build_levels);
        assert!(a.parallel_sets.is_empty());
        assert!(a.high_impact.is_empty());
    }
}
