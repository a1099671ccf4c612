//! `BUILD_TOPOLOGY.toml` descriptor model.
//!
//! The descriptor lists artifacts (with their group and direct artifact
//! dependencies), artifact groups (with a type and group-level
//! dependencies) and build stages (each a list of groups). Map order
//! follows the file so reports list entries the way the descriptor does.

use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// Group type used when a group or stage does not declare one.
pub const DEFAULT_GROUP_TYPE: &str = "generic";

/// Group type for groups that are built once per GPU architecture.
pub const PER_ARCH_GROUP_TYPE: &str = "per-arch";

fn default_group_type() -> String {
    DEFAULT_GROUP_TYPE.to_string()
}

/// A single artifact entry (`[artifacts.<name>]`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactDef {
    #[serde(default)]
    pub artifact_group: String,
    #[serde(default)]
    pub artifact_deps: Vec<String>,
}

/// An artifact group entry (`[artifact_groups.<name>]`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactGroupDef {
    #[serde(rename = "type", default = "default_group_type")]
    pub group_type: String,
    #[serde(default)]
    pub artifact_group_deps: Vec<String>,
    #[serde(default)]
    pub description: String,
}

impl Default for ArtifactGroupDef {
    fn default() -> Self {
        Self {
            group_type: default_group_type(),
            artifact_group_deps: Vec::new(),
            description: String::new(),
        }
    }
}

/// A build stage entry (`[build_stages.<name>]`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildStageDef {
    #[serde(default)]
    pub artifact_groups: Vec<String>,
    #[serde(rename = "type", default = "default_group_type")]
    pub stage_type: String,
    #[serde(default)]
    pub description: String,
}

/// The whole topology descriptor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopologyDescriptor {
    #[serde(default)]
    pub artifacts: IndexMap<String, ArtifactDef>,
    #[serde(default)]
    pub artifact_groups: IndexMap<String, ArtifactGroupDef>,
    #[serde(default)]
    pub build_stages: IndexMap<String, BuildStageDef>,
}

impl TopologyDescriptor {
    /// Parse a descriptor from TOML text. Unknown keys are ignored.
    pub fn from_toml_str(text: &str) -> CoreResult<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Read and parse a descriptor file.
    pub fn load(path: impl AsRef<Path>) -> CoreResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| CoreError::io(path, e))?;
        let descriptor = Self::from_toml_str(&text)?;
        tracing::debug!(
            path = %path.display(),
            artifacts = descriptor.artifacts.len(),
            groups = descriptor.artifact_groups.len(),
            stages = descriptor.build_stages.len(),
            "Loaded topology descriptor",
        );
        Ok(descriptor)
    }

    /// Type of the named group, `generic` when the group is not declared.
    pub fn group_type(&self, group: &str) -> &str {
        self.artifact_groups
            .get(group)
            .map(|g| g.group_type.as_str())
            .unwrap_or(DEFAULT_GROUP_TYPE)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    const SAMPLE: &str = r#"
[build_stages.foundation]
artifact_groups = ["third-party-sysdeps"]
description = "Base dependencies"

[build_stages.math-libs]
artifact_groups = ["math-libs"]
type = "per-arch"

[artifact_groups.third-party-sysdeps]
type = "generic"

[artifact_groups.math-libs]
type = "per-arch"
artifact_group_deps = ["third-party-sysdeps"]
extra = "ignored"

[artifacts.sysdeps]
artifact_group = "third-party-sysdeps"

[artifacts.blas]
artifact_group = "math-libs"
artifact_deps = ["sysdeps"]
"#;

    #[test]
    fn parses_sample_descriptor() {
        let d = TopologyDescriptor::from_toml_str(SAMPLE).expect("parse");
        assert_eq!(d.artifacts.len(), 2);
        assert_eq!(d.artifacts["blas"].artifact_deps, vec!["sysdeps"]);
        assert!(d.artifacts["sysdeps"].artifact_deps.is_empty());
        assert_eq!(d.artifact_groups["math-libs"].group_type, "per-arch");
        assert_eq!(d.build_stages["foundation"].stage_type, "generic");
        assert_eq!(d.build_stages["foundation"].description, "Base dependencies");
    }

    #[test]
    fn preserves_file_order() {
        let d = TopologyDescriptor::from_toml_str(SAMPLE).expect("parse");
        let stages: Vec<&str> = d.build_stages.keys().map(String::as_str).collect();
        assert_eq!(stages, vec!["foundation", "math-libs"]);
        let artifacts: Vec<&str> = d.artifacts.keys().map(String::as_str).collect();
        assert_eq!(artifacts, vec!["sysdeps", "blas"]);
    }

    #[test]
    fn empty_document_is_empty_descriptor() {
        let d = TopologyDescriptor::from_toml_str("").expect("parse");
        assert_eq!(d, TopologyDescriptor::default());
    }

    #[test]
    fn group_type_defaults_for_unknown_group() {
        let d = TopologyDescriptor::from_toml_str(SAMPLE).expect("parse");
        assert_eq!(d.group_type("math-libs"), "per-arch");
        assert_eq!(d.group_type("nope"), DEFAULT_GROUP_TYPE);
    }

    #[test]
    fn malformed_toml_is_rejected() {
        let err = TopologyDescriptor::from_toml_str("[artifacts.x\n").unwrap_err();
        assert_matches!(err, CoreError::Toml(_));
    }

    #[test]
    fn missing_file_reports_path() {
        let err = TopologyDescriptor::load("/nonexistent/BUILD_TOPOLOGY.toml").unwrap_err();
        assert_matches!(err, CoreError::Io { ref path, .. } if path.ends_with("BUILD_TOPOLOGY.toml"));
    }
}
