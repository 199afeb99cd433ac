//! Run reports
//!
//! Supports two output formats:
//! - `text` - Terminal summary with colors
//! - `json` - Machine-readable JSON

mod json;
mod text;

use crate::orchestrator::{OutcomeKind, ScanPhase, VersionOutcome};
use crate::record::{format_timestamp, SCANNER_VERSION};
use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::str::FromStr;
use uuid::Uuid;

/// Supported output formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

impl FromStr for OutputFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" | "txt" | "terminal" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            _ => Err(anyhow!("Unknown format '{}'. Valid formats: text, json", s)),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OutcomeCounts {
    pub total: usize,
    pub scored: usize,
    pub awaiting_scan: usize,
    /// Subset of `awaiting_scan` whose source could not be fetched
    pub skipped: usize,
    pub errors: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct VersionRow {
    pub slug: String,
    pub version: String,
    pub phase: ScanPhase,
    #[serde(flatten)]
    pub outcome: OutcomeKind,
    pub elapsed_ms: u64,
}

/// Everything a report needs about one run
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: String,
    pub scanner_version: String,
    pub started_at: String,
    pub finished_at: String,
    pub output: String,
    pub counts: OutcomeCounts,
    pub versions: Vec<VersionRow>,
}

impl RunSummary {
    pub fn new(
        run_id: Uuid,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        output: impl Into<String>,
        outcomes: &[VersionOutcome],
    ) -> Self {
        let mut counts = OutcomeCounts {
            total: outcomes.len(),
            ..Default::default()
        };
        for o in outcomes {
            match o.kind {
                OutcomeKind::Scored { .. } => counts.scored += 1,
                OutcomeKind::AwaitingScan { .. } => counts.awaiting_scan += 1,
                OutcomeKind::Error { .. } => counts.errors += 1,
            }
            if o.is_skipped() {
                counts.skipped += 1;
            }
        }

        let versions = outcomes
            .iter()
            .map(|o| VersionRow {
                slug: o.target.slug.clone(),
                version: o.target.version.clone(),
                phase: o.phase,
                outcome: o.kind.clone(),
                elapsed_ms: o.elapsed.as_millis() as u64,
            })
            .collect();

        Self {
            run_id: run_id.to_string(),
            scanner_version: SCANNER_VERSION.to_string(),
            started_at: format_timestamp(started_at),
            finished_at: format_timestamp(finished_at),
            output: output.into(),
            counts,
            versions,
        }
    }
}

/// Render a run summary in the specified format
pub fn report(summary: &RunSummary, format: &str) -> Result<String> {
    report_with_format(summary, OutputFormat::from_str(format)?)
}

pub fn report_with_format(summary: &RunSummary, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Text => text::render(summary),
        OutputFormat::Json => json::render(summary),
    }
}
