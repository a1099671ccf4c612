//! Fixed-width text rendering of a [`TopologyAnalysis`].

use std::fmt::Write;

use super::analysis::TopologyAnalysis;

/// Artifacts listed per level before the remainder is summarised.
const ARTIFACTS_PER_LEVEL_SHOWN: usize = 8;
/// Stage descriptions are cut to this many characters.
const STAGE_DESCRIPTION_WIDTH: usize = 40;
const RULE_WIDTH: usize = 100;

fn rule(c: char) -> String {
    std::iter::repeat(c).take(RULE_WIDTH).collect()
}

fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

/// Render the analysis as the plain-text report printed by `rockscope topology`.
pub fn render_text(a: &TopologyAnalysis) -> String {
    let mut out = String::new();
    // Writing into a String cannot fail.
    let _ = write_report(&mut out, a);
    out
}

fn write_report(out: &mut String, a: &TopologyAnalysis) -> std::fmt::Result {
    writeln!(out, "{}", rule('='))?;
    writeln!(out, "BUILD TOPOLOGY ANALYSIS")?;
    writeln!(out, "{}", rule('='))?;

    writeln!(out, "\nOVERALL STRUCTURE:")?;
    writeln!(out, "  Total Artifacts:      {}", a.total_artifacts)?;
    writeln!(out, "  Total Groups:         {}", a.total_groups)?;
    writeln!(out, "  Total Build Stages:   {}", a.total_stages)?;

    writeln!(out, "\nDEPENDENCY DEPTH:")?;
    writeln!(out, "  Maximum Build Levels: {}", a.max_build_levels)?;
    writeln!(out, "  (minimum serial depth of the build)")?;
    writeln!(out, "  Leaf Artifacts:       {}", a.leaf_artifacts)?;

    writeln!(out, "\nPARALLELIZATION POTENTIAL BY LEVEL:")?;
    writeln!(out, "{:<8} {:<10} Can Build in Parallel", "Level", "Artifacts")?;
    writeln!(out, "{}", rule('-'))?;
    for (level, artifacts) in &a.parallel_sets {
        let shown: Vec<&str> = artifacts
            .iter()
            .take(ARTIFACTS_PER_LEVEL_SHOWN)
            .map(String::as_str)
            .collect();
        writeln!(out, "{:<8} {:<10} {}", level, artifacts.len(), shown.join(", "))?;
        if artifacts.len() > ARTIFACTS_PER_LEVEL_SHOWN {
            writeln!(
                out,
                "{:>19} ... and {} more",
                "",
                artifacts.len() - ARTIFACTS_PER_LEVEL_SHOWN
            )?;
        }
    }

    writeln!(out, "\nCRITICAL PATH (Longest Dependency Chain):")?;
    writeln!(out, "  Length: {} artifacts", a.critical_path.len())?;
    writeln!(out, "  Path: {}", a.critical_path.join(" -> "))?;

    writeln!(out, "\nBUILD STAGES ANALYSIS:")?;
    writeln!(
        out,
        "{:<25} {:<12} {:<10} Description",
        "Stage", "Type", "Artifacts"
    )?;
    writeln!(out, "{}", rule('-'))?;
    for stage in &a.stages {
        writeln!(
            out,
            "{:<25} {:<12} {:<10} {}",
            stage.name,
            stage.stage_type,
            stage.artifact_count,
            truncate_chars(&stage.description, STAGE_DESCRIPTION_WIDTH)
        )?;
    }
    if !a.independent_stages.is_empty() {
        writeln!(
            out,
            "\n  Stages without group dependencies: {}",
            a.independent_stages.join(", ")
        )?;
    }

    writeln!(out, "\nHIGH-IMPACT ARTIFACTS (Many artifacts depend on these):")?;
    writeln!(
        out,
        "{:<30} {:<10} {:<8} Group",
        "Artifact", "Dependents", "Level"
    )?;
    writeln!(out, "{}", rule('-'))?;
    for entry in &a.high_impact {
        writeln!(
            out,
            "{:<30} {:<10} {:<8} {}",
            entry.artifact,
            entry.dependents,
            entry.level,
            entry.group.as_deref().unwrap_or("unknown")
        )?;
    }

    writeln!(out, "\nLARGEST ARTIFACT GROUPS:")?;
    for group in &a.largest_groups {
        writeln!(
            out,
            "  - {}: {} artifacts ({})",
            group.group, group.artifacts, group.group_type
        )?;
    }

    writeln!(out, "\nPER-ARCH GROUPS: {}", a.per_arch_groups.len())?;
    if !a.per_arch_groups.is_empty() {
        writeln!(out, "  Groups: {}", a.per_arch_groups.join(", "))?;
    }

    writeln!(out, "\n{}", rule('='))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::TopologyDescriptor;

    fn wide_descriptor() -> TopologyDescriptor {
        let mut toml = String::new();
        for i in 0..10 {
            toml.push_str(&format!("[artifacts.leaf{i}]\nartifact_group = \"g\"\n"));
        }
        toml.push_str("[artifacts.top]\nartifact_group = \"g\"\nartifact_deps = [\"leaf0\", \"leaf1\"]\n");
        toml.push_str("[build_stages.all]\nartifact_groups = [\"g\"]\n");
        toml.push_str(&format!("description = \"{}\"\n", "x".repeat(60)));
        TopologyDescriptor::from_toml_str(&toml).expect("parse")
    }

    #[test]
    fn truncates_wide_levels() {
        let text = render_text(&TopologyAnalysis::analyze(&wide_descriptor()));
        assert!(text.contains("... and 2 more"));
        assert!(text.contains("Maximum Build Levels: 2"));
        assert!(text.contains("Path: leaf0 -> top"));
    }

    #[test]
    fn truncates_stage_description() {
        let text = render_text(&TopologyAnalysis::analyze(&wide_descriptor()));
        assert!(text.contains(&"x".repeat(40)));
        assert!(!text.contains(&"x".repeat(41)));
    }

    #[test]
    fn lists_high_impact_with_group() {
        let text = render_text(&TopologyAnalysis::analyze(&wide_descriptor()));
        let line = text
            .lines()
            .find(|l| l.starts_with("leaf0 "))
            .expect("impact row");
        assert!(line.ends_with(" g"));
    }
}
