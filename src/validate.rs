//! Document and record validation
//!
//! Structural checks on the servers document (run before scanning and by
//! `mcpvet validate`) and consistency checks on assessment records (run
//! before any record is committed).

use crate::models::{AssessmentRecord, CategoryStatus, RecordState, MAX_SCORE};
use crate::record::PLACEHOLDER_SCORE;
use crate::scoring;
use crate::store::ServersDocument;
use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid record for {target}: {reason}")]
pub struct ValidationError {
    pub target: String,
    pub reason: String,
}

fn slug_pattern() -> &'static Regex {
    static SLUG: OnceLock<Regex> = OnceLock::new();
    SLUG.get_or_init(|| Regex::new(r"^[a-z0-9-]+$").expect("valid regex"))
}

fn semver_prefix() -> &'static Regex {
    static SEMVER: OnceLock<Regex> = OnceLock::new();
    SEMVER.get_or_init(|| Regex::new(r"^\d+\.\d+\.\d+").expect("valid regex"))
}

/// Check a record before it is persisted.
pub fn validate_record(target: &str, record: &AssessmentRecord) -> Result<(), ValidationError> {
    let fail = |reason: String| {
        Err(ValidationError {
            target: target.to_string(),
            reason,
        })
    };

    if chrono::DateTime::parse_from_rfc3339(&record.scan_date).is_err() {
        return fail(format!("scan_date '{}' is not RFC 3339", record.scan_date));
    }
    if record.overall_score > MAX_SCORE {
        return fail(format!("overall_score {} exceeds 100", record.overall_score));
    }
    for (category, result) in record.categories.iter() {
        if result.score > MAX_SCORE {
            return fail(format!("{} score {} exceeds 100", category, result.score));
        }
        if result.status == CategoryStatus::NotApplicable && result.issues_found.is_some() {
            return fail(format!("{} is not-applicable but reports issues", category));
        }
    }

    match record.record_state {
        RecordState::Scored => match scoring::calculate(&record.categories) {
            None => fail("scored record has no category results".to_string()),
            Some(b) if b.overall_score != record.overall_score => fail(format!(
                "overall_score {} does not match weighted categories ({})",
                record.overall_score, b.overall_score
            )),
            Some(_) => Ok(()),
        },
        RecordState::AwaitingScan if record.overall_score != PLACEHOLDER_SCORE => fail(format!(
            "placeholder record must carry score {}, found {}",
            PLACEHOLDER_SCORE, record.overall_score
        )),
        RecordState::AwaitingScan => Ok(()),
    }
}

/// Findings from a document check
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Structural checks on the whole document.
pub fn validate_document(doc: &ServersDocument) -> ValidationReport {
    let mut report = ValidationReport::default();
    let mut slugs = HashSet::new();
    let mut names = HashSet::new();

    for (i, server) in doc.servers.iter().enumerate() {
        let prefix = format!("server[{}] '{}'", i, server.slug);

        if server.name.trim().is_empty() {
            report.errors.push(format!("{}: empty name", prefix));
        }
        if !slug_pattern().is_match(&server.slug) {
            report
                .errors
                .push(format!("{}: invalid slug format", prefix));
        }
        if !slugs.insert(server.slug.as_str()) {
            report.errors.push(format!("{}: duplicate slug", prefix));
        }
        if !names.insert(server.name.to_lowercase()) {
            report
                .warnings
                .push(format!("{}: possible duplicate name '{}'", prefix, server.name));
        }
        if server.repository.trim().is_empty() {
            report
                .warnings
                .push(format!("{}: no repository URL (cannot be cloned)", prefix));
        }
        if server.versions.is_empty() {
            report.warnings.push(format!("{}: no versions defined", prefix));
        }

        let mut versions = HashSet::new();
        for v in &server.versions {
            let target = format!("{}@{}", server.slug, v.version);
            if !versions.insert(v.version.as_str()) {
                report.errors.push(format!("{}: duplicate version", target));
            }
            if !semver_prefix().is_match(&v.version) {
                report
                    .warnings
                    .push(format!("{}: version may not be semantic", target));
            }
            if let Some(scan) = &v.security_scan {
                match serde_json::from_value::<AssessmentRecord>(scan.clone()) {
                    Ok(record) => {
                        if let Err(e) = validate_record(&target, &record) {
                            report.warnings.push(e.to_string());
                        }
                    }
                    Err(e) => report.warnings.push(format!(
                        "{}: security_scan is not a current record ({}); it will be replaced on the next scan",
                        target, e
                    )),
                }
            }
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Category, CategoryResult, CategoryResults};
    use crate::record::RecordBuilder;
    use chrono::Utc;

    fn record() -> AssessmentRecord {
        let results: CategoryResults = [(Category::Documentation, CategoryResult::pass(100, ""))]
            .into_iter()
            .collect();
        RecordBuilder::new(Utc::now()).build(results).unwrap()
    }

    #[test]
    fn test_valid_record() {
        assert!(validate_record("a@1", &record()).is_ok());
        assert!(validate_record("a@1", &RecordBuilder::new(Utc::now()).awaiting_scan()).is_ok());
    }

    #[test]
    fn test_inconsistent_overall() {
        let mut r = record();
        r.overall_score = 70;
        let err = validate_record("a@1", &r).unwrap_err();
        assert_eq!(err.target, "a@1");
        assert!(err.reason.contains("does not match"));
    }

    #[test]
    fn test_not_applicable_with_issues() {
        let mut r = record();
        r.categories.set(
            Category::Container,
            CategoryResult {
                status: CategoryStatus::NotApplicable,
                score: 50,
                issues_found: Some(3),
                details: String::new(),
            },
        );
        assert!(validate_record("a@1", &r).is_err());
    }

    #[test]
    fn test_bad_timestamp() {
        let mut r = record();
        r.scan_date = "yesterday".into();
        assert!(validate_record("a@1", &r).is_err());
    }

    #[test]
    fn test_document_checks() {
        let doc: ServersDocument = serde_json::from_str(
            r#"{"servers": [
                {"name": "A", "slug": "a-server", "repository": "https://x", "versions": [{"version": "1.0.0"}, {"version": "1.0.0"}]},
                {"name": "a", "slug": "Bad_Slug", "repository": "", "versions": [{"version": "latest"}]},
                {"name": "C", "slug": "a-server", "repository": "https://y", "versions": []}
            ]}"#,
        )
        .unwrap();
        let report = validate_document(&doc);
        assert!(!report.is_valid());
        assert_eq!(report.errors.len(), 3, "{:?}", report.errors);
        assert!(report.errors.iter().any(|e| e.contains("duplicate version")));
        assert!(report.errors.iter().any(|e| e.contains("invalid slug")));
        assert!(report.errors.iter().any(|e| e.contains("duplicate slug")));
        assert!(report.warnings.iter().any(|w| w.contains("possible duplicate name")));
        assert!(report.warnings.iter().any(|w| w.contains("may not be semantic")));
        assert!(report.warnings.iter().any(|w| w.contains("no versions")));
    }

    #[test]
    fn test_legacy_scan_is_warning_only() {
        let doc: ServersDocument = serde_json::from_str(
            r#"{"servers": [{"name": "A", "slug": "a", "repository": "https://x",
                "versions": [{"version": "1.0.0", "security_scan": {"overall_score": 80}}]}]}"#,
        )
        .unwrap();
        let report = validate_document(&doc);
        assert!(report.is_valid());
        assert_eq!(report.warnings.len(), 1);
    }
}
