//! Mapping ninja outputs to (sub-project, category, phase).
//!
//! Only the ExternalProject stamp files and the artifact archives are of
//! interest; everything else in the log is ignored.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

/// Artifact archive names look like `<name>_<component>[_<target>]`.
static ARTIFACT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(.+)_(dbg|dev|doc|lib|run|test)(_.+)?").expect("valid regex")
});

/// Top-level source directories whose second path segment is a ROCm component.
const ROCM_COMPONENT_DIRS: &[&str] = &[
    "base",
    "compiler",
    "core",
    "comm-libs",
    "dctools",
    "profiler",
    "ml-libs",
];

/// Monorepo roots where the project name is the third segment under `projects/`.
const MONOREPO_DIRS: &[&str] = &["rocm-libraries", "rocm-systems"];

/// Build/package directory names translated to their display names.
const NAME_MAPPING: &[(&str, &str)] = &[
    ("clr", "core-hip"),
    ("ocl-clr", "core-ocl"),
    ("ROCR-Runtime", "core-runtime"),
    ("blas", "rocBLAS"),
    ("prim", "rocPRIM"),
    ("fft", "rocFFT"),
    ("rand", "rocRAND"),
    ("miopen", "MIOpen"),
    ("hipdnn", "hipDNN"),
    ("composable-kernel", "composable_kernel"),
    ("support", "mxDataGenerator"),
    ("host-suite-sparse", "SuiteSparse"),
    ("rocwmma", "rocWMMA"),
    ("miopen-plugin", "miopen_plugin"),
    ("rccl-tests", "rccl"),
];

const UNKNOWN_NAME: &str = "Unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum BuildPhase {
    Download,
    Update,
    Configure,
    Build,
    Install,
    Package,
}

impl BuildPhase {
    pub fn label(self) -> &'static str {
        match self {
            Self::Download => "Download",
            Self::Update => "Update",
            Self::Configure => "Configure",
            Self::Build => "Build",
            Self::Install => "Install",
            Self::Package => "Package",
        }
    }
}

impl fmt::Display for BuildPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum TaskCategory {
    RocmComponent,
    Dependency,
}

impl TaskCategory {
    pub fn label(self) -> &'static str {
        match self {
            Self::RocmComponent => "ROCm Component",
            Self::Dependency => "Dependency",
        }
    }
}

/// Classification of one ninja output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskClass {
    pub name: String,
    pub category: TaskCategory,
    pub phase: BuildPhase,
}

/// Detect the build phase from an output path, if it is a phase marker.
pub fn detect_phase(output: &str) -> Option<BuildPhase> {
    if output.ends_with("/stamp/configure.stamp") {
        Some(BuildPhase::Configure)
    } else if output.ends_with("/stamp/build.stamp") {
        Some(BuildPhase::Build)
    } else if output.ends_with("/stamp/stage.stamp") {
        Some(BuildPhase::Install)
    } else if output.starts_with("artifacts/") && output.ends_with(".tar.xz") {
        Some(BuildPhase::Package)
    } else if output.contains("download") && output.contains("stamp") {
        Some(BuildPhase::Download)
    } else if output.contains("update") && output.contains("stamp") {
        Some(BuildPhase::Update)
    } else {
        None
    }
}

fn display_name(name: &str) -> String {
    NAME_MAPPING
        .iter()
        .find(|(from, _)| *from == name)
        .map(|(_, to)| (*to).to_string())
        .unwrap_or_else(|| name.to_string())
}

/// Classify a (build-dir relative) ninja output path.
///
/// Returns `None` for outputs that are not phase markers or that belong to
/// aggregate targets (`base`, `sysdeps`) rather than a single sub-project.
pub fn classify_output(output: &str) -> Option<TaskClass> {
    let phase = detect_phase(output)?;
    let parts: Vec<&str> = output.split('/').collect();
    let mut name = UNKNOWN_NAME.to_string();
    let mut category = TaskCategory::RocmComponent;

    match parts[0] {
        "artifacts" => {
            let file = parts.get(1).copied().unwrap_or_default();
            let base = file.replace(".tar.xz", "");
            name = ARTIFACT_RE
                .captures(&base)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().to_string())
                .unwrap_or(base);

            if name == "base" || name == "sysdeps" {
                return None;
            }
            if name.contains("sysdeps") || name.contains("fftw3") || name.starts_with("host-") {
                category = TaskCategory::Dependency;
            }
        }
        "third-party" => {
            category = TaskCategory::Dependency;
            if parts.len() > 3 && parts[1] == "sysdeps" && matches!(parts[2], "linux" | "common") {
                name = parts[3].to_string();
            } else if parts.len() > 1 {
                name = parts[1].to_string();
            }
            if name == "sysdeps" {
                return None;
            }
        }
        root if MONOREPO_DIRS.contains(&root) => {
            if parts.len() > 2 && parts[1] == "projects" {
                name = parts[2].to_string();
            }
        }
        root if ROCM_COMPONENT_DIRS.contains(&root) => {
            if parts.len() > 1 {
                name = parts[1].to_string();
            }
        }
        "math-libs" => {
            if parts.len() > 1 {
                match parts[1] {
                    "BLAS" => name = parts.get(2)?.to_string(),
                    "support" if parts.len() > 2 => name = parts[2].to_string(),
                    other => name = other.to_string(),
                }
            }
        }
        _ => return None,
    }

    Some(TaskClass {
        name: display_name(&name),
        category,
        phase,
    })
}
