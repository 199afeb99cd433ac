//! Assessment record construction
//!
//! Turns a set of category results into the persisted record, or produces
//! a placeholder when there is nothing to score.

use crate::models::{
    AssessmentRecord, Category, CategoryResult, CategoryResults, RecordState,
};
use crate::scoring;
use chrono::{DateTime, SecondsFormat, Utc};
use std::collections::BTreeMap;
use thiserror::Error;

pub const SCANNER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Fixed score for placeholder records
pub const PLACEHOLDER_SCORE: u32 = 50;

pub const AWAITING_SCAN_RECOMMENDATION: &str =
    "New version detected - requires security validation";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RecordError {
    #[error("no category results to assess")]
    NoCategoryResults,
}

/// Millisecond-precision UTC timestamp with a `Z` suffix
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Builds records that share a timestamp and tool inventory
#[derive(Debug, Clone)]
pub struct RecordBuilder {
    scan_date: DateTime<Utc>,
    scanner_version: String,
    tool_versions: BTreeMap<String, String>,
}

impl RecordBuilder {
    pub fn new(scan_date: DateTime<Utc>) -> Self {
        Self {
            scan_date,
            scanner_version: SCANNER_VERSION.to_string(),
            tool_versions: BTreeMap::new(),
        }
    }

    pub fn tool_versions(mut self, versions: BTreeMap<String, String>) -> Self {
        self.tool_versions = versions;
        self
    }

    pub fn scanner_version(mut self, version: impl Into<String>) -> Self {
        self.scanner_version = version.into();
        self
    }

    /// Score the results. Fails when no category was evaluated.
    pub fn build(&self, categories: CategoryResults) -> Result<AssessmentRecord, RecordError> {
        let breakdown = scoring::calculate(&categories).ok_or(RecordError::NoCategoryResults)?;
        let recommendations = scoring::recommendations(&categories, breakdown.overall_score);
        Ok(AssessmentRecord {
            scan_date: format_timestamp(self.scan_date),
            scanner_version: self.scanner_version.clone(),
            tool_versions: self.tool_versions.clone(),
            record_state: RecordState::Scored,
            categories,
            overall_score: breakdown.overall_score,
            recommendations,
        })
    }

    fn placeholder(&self, details: &str, recommendation: String) -> AssessmentRecord {
        let categories = Category::ALL
            .into_iter()
            .map(|c| (c, CategoryResult::not_applicable(PLACEHOLDER_SCORE, details)))
            .collect();
        AssessmentRecord {
            scan_date: format_timestamp(self.scan_date),
            scanner_version: self.scanner_version.clone(),
            tool_versions: BTreeMap::new(),
            record_state: RecordState::AwaitingScan,
            categories,
            overall_score: PLACEHOLDER_SCORE,
            recommendations: vec![recommendation],
        }
    }

    /// Placeholder for a version that has not been assessed yet
    pub fn awaiting_scan(&self) -> AssessmentRecord {
        self.placeholder(
            "Awaiting security scan",
            AWAITING_SCAN_RECOMMENDATION.to_string(),
        )
    }

    /// Placeholder for a version whose source could not be fetched
    pub fn source_unavailable(&self, reason: &str) -> AssessmentRecord {
        self.placeholder(
            &format!("Source unavailable: {}", reason),
            "Source could not be retrieved - rescan once the repository is reachable".to_string(),
        )
    }
}
