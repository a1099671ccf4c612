//! Artifact dependency graph and build leveling.
//!
//! A build level is the length of the longest dependency chain below an
//! artifact: leaves are level 0 and every other artifact sits one above
//! its highest known dependency. Artifacts on the same level never depend
//! on each other, so each level is a batch that can be built in parallel.

use std::collections::{BTreeMap, HashMap, HashSet};

use indexmap::IndexMap;

use super::descriptor::TopologyDescriptor;

/// Artifact-level and group-level adjacency extracted from a descriptor.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    artifact_deps: IndexMap<String, Vec<String>>,
    artifact_groups: IndexMap<String, String>,
    group_deps: IndexMap<String, Vec<String>>,
}

impl DependencyGraph {
    pub fn from_descriptor(descriptor: &TopologyDescriptor) -> Self {
        let mut graph = Self::default();
        for (name, artifact) in &descriptor.artifacts {
            graph
                .artifact_deps
                .insert(name.clone(), artifact.artifact_deps.clone());
            graph
                .artifact_groups
                .insert(name.clone(), artifact.artifact_group.clone());
        }
        for (name, group) in &descriptor.artifact_groups {
            graph
                .group_deps
                .insert(name.clone(), group.artifact_group_deps.clone());
        }
        graph
    }

    /// Build a graph from bare `artifact -> deps` pairs (no groups).
    pub fn from_artifact_deps<I, N, D>(edges: I) -> Self
    where
        I: IntoIterator<Item = (N, D)>,
        N: Into<String>,
        D: IntoIterator,
        D::Item: Into<String>,
    {
        let mut graph = Self::default();
        for (name, deps) in edges {
            let name = name.into();
            graph
                .artifact_deps
                .insert(name.clone(), deps.into_iter().map(Into::into).collect());
            graph.artifact_groups.insert(name, String::new());
        }
        graph
    }

    pub fn contains(&self, artifact: &str) -> bool {
        self.artifact_deps.contains_key(artifact)
    }

    pub fn len(&self) -> usize {
        self.artifact_deps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifact_deps.is_empty()
    }

    /// Artifact names in descriptor order.
    pub fn artifacts(&self) -> impl Iterator<Item = &str> {
        self.artifact_deps.keys().map(String::as_str)
    }

    /// Declared direct dependencies (known or not).
    pub fn deps(&self, artifact: &str) -> &[String] {
        self.artifact_deps
            .get(artifact)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn group_of(&self, artifact: &str) -> Option<&str> {
        self.artifact_groups.get(artifact).map(String::as_str)
    }

    pub fn group_deps(&self, group: &str) -> &[String] {
        self.group_deps.get(group).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Reverse adjacency: dependency name -> artifacts that list it.
    ///
    /// Unknown dependency names are kept so that external prerequisites
    /// still show up in impact rankings.
    pub fn dependents(&self) -> BTreeMap<String, Vec<String>> {
        let mut dependents: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (artifact, deps) in &self.artifact_deps {
            for dep in deps {
                dependents
                    .entry(dep.clone())
                    .or_default()
                    .push(artifact.clone());
            }
        }
        dependents
    }

    /// Number of artifacts per group, in descriptor order of first appearance.
    pub fn group_sizes(&self) -> IndexMap<String, usize> {
        let mut sizes: IndexMap<String, usize> = IndexMap::new();
        for group in self.artifact_groups.values() {
            *sizes.entry(group.clone()).or_default() += 1;
        }
        sizes
    }
}

/// Compute the build level of every artifact.
///
/// Dependencies that are not artifacts of the graph are ignored. The graph
/// is assumed to be acyclic; an edge back into an artifact whose level is
/// still being computed contributes level 0 so the walk terminates.
pub fn calculate_build_levels(graph: &DependencyGraph) -> BTreeMap<String, usize> {
    let mut memo: HashMap<&str, usize> = HashMap::with_capacity(graph.len());
    let mut visiting: HashSet<&str> = HashSet::new();
    for artifact in graph.artifacts() {
        level_of(graph, artifact, &mut memo, &mut visiting);
    }
    memo.into_iter()
        .map(|(name, level)| (name.to_string(), level))
        .collect()
}

fn level_of<'g>(
    graph: &'g DependencyGraph,
    artifact: &'g str,
    memo: &mut HashMap<&'g str, usize>,
    visiting: &mut HashSet<&'g str>,
) -> usize {
    if let Some(&level) = memo.get(artifact) {
        return level;
    }
    if !visiting.insert(artifact) {
        tracing::warn!(artifact, "Dependency cycle detected; treating back-edge as level 0");
        return 0;
    }

    let level = graph
        .deps(artifact)
        .iter()
        .filter(|dep| graph.contains(dep))
        .map(|dep| level_of(graph, dep, memo, visiting) + 1)
        .max()
        .unwrap_or(0);

    visiting.remove(artifact);
    memo.insert(artifact, level);
    level
}

/// Group artifacts by build level; names within a level are sorted.
pub fn parallel_sets(levels: &BTreeMap<String, usize>) -> BTreeMap<usize, Vec<String>> {
    let mut sets: BTreeMap<usize, Vec<String>> = BTreeMap::new();
    // `levels` iterates in name order, so each bucket is already sorted.
    for (artifact, &level) in levels {
        sets.entry(level).or_default().push(artifact.clone());
    }
    sets
}

/// Reconstruct the longest dependency chain, leaf first.
///
/// Starts at the deepest artifact (first by name on ties) and repeatedly
/// follows its highest-level known dependency (first declared on ties).
pub fn critical_path(graph: &DependencyGraph, levels: &BTreeMap<String, usize>) -> Vec<String> {
    let Some(max_level) = levels.values().copied().max() else {
        return Vec::new();
    };
    let Some(deepest) = levels
        .iter()
        .find(|(_, level)| **level == max_level)
        .map(|(name, _)| name.as_str())
    else {
        return Vec::new();
    };

    let mut path = vec![deepest.to_string()];
    let mut current = deepest;
    let mut current_level = max_level;

    loop {
        let mut next: Option<(&str, usize)> = None;
        for dep in graph.deps(current) {
            let Some(&dep_level) = levels.get(dep) else {
                continue;
            };
            // Strictly descending levels keeps the walk finite on cyclic input.
            if dep_level >= current_level {
                continue;
            }
            if next.map_or(true, |(_, best)| dep_level > best) {
                next = Some((dep.as_str(), dep_level));
            }
        }
        match next {
            Some((dep, dep_level)) => {
                path.push(dep.to_string());
                current = dep;
                current_level = dep_level;
            }
            None => break,
        }
    }

    path.reverse();
    path
}
