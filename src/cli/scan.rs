//! Scan command - assess every selected version and commit the records

use crate::adapters::external_tool::probe_versions;
use crate::adapters::{build_adapters, SystemRunner, ToolRunner};
use crate::config::ScanConfig;
use crate::models::Category;
use crate::orchestrator::{Orchestrator, VersionOutcome};
use crate::record::RecordBuilder;
use crate::reporters::{report_with_format, OutputFormat, RunSummary};
use crate::source::{GitSourceProvider, LocalSourceProvider, SourceProvider};
use crate::store::{JsonFileStore, ServersDocument};
use crate::validate::validate_document;
use anyhow::{bail, Context, Result};
use chrono::Utc;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug)]
pub struct ScanArgs {
    pub input: PathBuf,
    pub output: Option<PathBuf>,
    pub server_slug: Option<String>,
    pub sources_dir: Option<PathBuf>,
    pub format: String,
    pub report: Option<PathBuf>,
    pub skip_categories: Vec<Category>,
    pub workers: Option<usize>,
}

fn progress_bar(len: usize, format: OutputFormat) -> Result<Option<ProgressBar>> {
    if format == OutputFormat::Json || !console::Term::stderr().is_term() {
        return Ok(None);
    }
    let pb = ProgressBar::new(len as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
            .progress_chars("█▓▒░  "),
    );
    Ok(Some(pb))
}

/// Apply every record, then write once. A record that fails validation
/// aborts the commit and nothing is written.
fn commit(
    doc: &mut ServersDocument,
    outcomes: &mut [VersionOutcome],
    output: &Path,
) -> Result<()> {
    for outcome in outcomes.iter() {
        if let Some(record) = &outcome.record {
            doc.replace_record(&outcome.target.slug, &outcome.target.version, record)
                .context("Refusing to write results")?;
        }
    }
    doc.touch(Utc::now());
    JsonFileStore::new(output).save(doc)?;
    for outcome in outcomes.iter_mut().filter(|o| o.record.is_some()) {
        outcome.mark_persisted();
    }
    Ok(())
}

pub fn run(args: ScanArgs, mut config: ScanConfig) -> Result<()> {
    let format = OutputFormat::from_str(&args.format)?;
    for category in args.skip_categories {
        if !config.is_skipped(category) {
            config.scan.skip_categories.push(category);
        }
    }

    let mut doc = JsonFileStore::new(&args.input)
        .load()
        .with_context(|| format!("Cannot read servers document {}", args.input.display()))?;
    let validation = validate_document(&doc);
    for warning in &validation.warnings {
        warn!("{}", warning);
    }
    if !validation.is_valid() {
        bail!(
            "{} is not a valid servers document:\n  {}",
            args.input.display(),
            validation.errors.join("\n  ")
        );
    }
    let targets = doc.targets(args.server_slug.as_deref())?;

    let run_id = Uuid::new_v4();
    let started = Utc::now();
    info!(
        "Run {}: {} version(s) from {}",
        run_id,
        targets.len(),
        args.input.display()
    );

    let runner: Arc<dyn ToolRunner> = Arc::new(SystemRunner);
    let tool_versions = probe_versions(
        runner.as_ref(),
        &config.tools.all(),
        config.scan.version_probe_timeout_secs,
    );
    info!("Analyzers available: {}", tool_versions.len());

    let source: Arc<dyn SourceProvider> =
        match args.sources_dir.or_else(|| config.source.sources_dir.clone()) {
            Some(dir) => {
                info!("Using local sources under {}", dir.display());
                Arc::new(LocalSourceProvider::new(dir))
            }
            None => Arc::new(GitSourceProvider::new(Duration::from_secs(
                config.source.clone_timeout_secs,
            ))),
        };

    let mut orchestrator = Orchestrator::new(
        build_adapters(&config, Arc::clone(&runner)),
        source,
        RecordBuilder::new(started).tool_versions(tool_versions),
    )
    .adapter_timeout(Duration::from_secs(config.scan.adapter_timeout_secs));
    if let Some(workers) = args.workers.or(config.scan.workers) {
        orchestrator = orchestrator.workers(workers);
    }

    let progress = progress_bar(targets.len(), format)?;
    let mut outcomes = orchestrator.run(&targets, progress.as_ref());
    if let Some(pb) = &progress {
        pb.finish_and_clear();
    }

    let output = args.output.unwrap_or_else(|| args.input.clone());
    commit(&mut doc, &mut outcomes, &output)?;
    info!("Wrote {}", output.display());

    let summary = RunSummary::new(
        run_id,
        started,
        Utc::now(),
        output.display().to_string(),
        &outcomes,
    );
    let rendered = report_with_format(&summary, format)?;
    match args.report {
        Some(path) => std::fs::write(&path, rendered)
            .with_context(|| format!("Failed to write report {}", path.display()))?,
        None => print!("{}", rendered),
    }
    Ok(())
}
