//! Validate command - structural checks on a servers document

use crate::store::JsonFileStore;
use crate::validate::validate_document;
use anyhow::{bail, Result};
use console::style;
use std::path::Path;

pub fn run(data: &Path) -> Result<()> {
    let doc = JsonFileStore::new(data).load()?;
    let report = validate_document(&doc);
    let versions: usize = doc.servers.iter().map(|s| s.versions.len()).sum();

    println!(
        "\nValidating {} ({} servers, {} versions)\n",
        style(data.display()).cyan(),
        doc.servers.len(),
        versions
    );

    for error in &report.errors {
        println!("{} {}", style("✗").red(), error);
    }
    for warning in &report.warnings {
        println!("{} {}", style("!").yellow(), warning);
    }

    if !report.is_valid() {
        bail!(
            "{} error(s), {} warning(s) in {}",
            report.errors.len(),
            report.warnings.len(),
            data.display()
        );
    }
    println!(
        "{} Valid ({} warning(s))",
        style("✓").green(),
        report.warnings.len()
    );
    Ok(())
}
