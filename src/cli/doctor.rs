//! Doctor command - check which analyzers are installed

use crate::adapters::external_tool::probe_version;
use crate::adapters::{SystemRunner, ToolRunner, NEUTRAL_SCORE};
use crate::config::ScanConfig;
use anyhow::Result;
use console::style;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ToolCheck {
    pub name: &'static str,
    pub command: String,
    pub version: Option<String>,
}

pub(crate) fn check_tools(runner: &dyn ToolRunner, config: &ScanConfig) -> Vec<ToolCheck> {
    config
        .tools
        .all()
        .into_iter()
        .map(|(name, prefix)| ToolCheck {
            name,
            command: prefix.join(" "),
            version: probe_version(
                runner,
                name,
                prefix,
                config.scan.version_probe_timeout_secs,
            ),
        })
        .collect()
}

pub fn run(config: &ScanConfig) -> Result<()> {
    println!("\n{} mcpvet doctor\n", style("🩺").bold());

    let checks = check_tools(&SystemRunner, config);
    for check in &checks {
        match &check.version {
            Some(version) => println!(
                "{} {:<12} {}",
                style("✓").green(),
                check.name,
                style(version).dim()
            ),
            None => println!(
                "{} {:<12} {} {}",
                style("○").yellow(),
                check.name,
                style("not found").yellow(),
                style(format!("({})", check.command)).dim()
            ),
        }
    }

    let available = checks.iter().filter(|c| c.version.is_some()).count();
    println!(
        "\n{}/{} analyzers available.",
        style(available).bold(),
        checks.len()
    );
    if available < checks.len() {
        println!(
            "  Categories whose analyzers are missing score as not-applicable ({}).",
            NEUTRAL_SCORE
        );
        println!("  Override commands in the [tools] section of mcpvet.toml.");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::external_tool::tests::ScriptedRunner;

    #[test]
    fn test_check_tools_reports_versions() {
        let runner = ScriptedRunner::default()
            .stdout("hadolint", "Haskell Dockerfile Linter 2.12.0\n", 0)
            .stdout("semgrep", "1.80.0\n", 0);
        let checks = check_tools(&runner, &ScanConfig::default());
        assert_eq!(checks.len(), 9);

        let hadolint = checks.iter().find(|c| c.name == "hadolint").unwrap();
        assert_eq!(
            hadolint.version.as_deref(),
            Some("Haskell Dockerfile Linter 2.12.0")
        );
        let cargo_audit = checks.iter().find(|c| c.name == "cargo-audit").unwrap();
        assert!(cargo_audit.version.is_none());
        assert_eq!(cargo_audit.command, "cargo audit");
    }
}
