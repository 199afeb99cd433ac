//! Core data models for mcpvet
//!
//! These models describe the per-category results produced by scan
//! adapters and the assessment record persisted for each server version.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Highest score any category or record may carry.
pub const MAX_SCORE: u32 = 100;

/// Severity levels for individual findings
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Info,
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Low => write!(f, "low"),
            Severity::Medium => write!(f, "medium"),
            Severity::High => write!(f, "high"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

impl Severity {
    /// Map the severity vocabulary used by the supported analyzers.
    pub fn from_tool_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "critical" | "error" => Severity::Critical,
            "high" => Severity::High,
            "medium" | "moderate" | "warning" => Severity::Medium,
            "low" => Severity::Low,
            _ => Severity::Info,
        }
    }
}

/// One of the five assessment dimensions
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    #[serde(alias = "mcp", alias = "mcp-protocol")]
    ToolPoisoning,
    #[serde(alias = "dependencies")]
    Dependency,
    #[serde(alias = "static")]
    StaticAnalysis,
    Container,
    #[serde(alias = "docs")]
    Documentation,
}

impl Category {
    /// Every category, in the order records list them.
    pub const ALL: [Category; 5] = [
        Category::ToolPoisoning,
        Category::Dependency,
        Category::StaticAnalysis,
        Category::Container,
        Category::Documentation,
    ];

    /// Key under which the category result is persisted in a record.
    pub fn record_key(&self) -> &'static str {
        match self {
            Category::ToolPoisoning => "tool_poisoning_check",
            Category::Dependency => "dependency_scan",
            Category::StaticAnalysis => "static_analysis",
            Category::Container => "container_scan",
            Category::Documentation => "security_documentation",
        }
    }

    /// Human-readable label
    pub fn label(&self) -> &'static str {
        match self {
            Category::ToolPoisoning => "MCP tool poisoning",
            Category::Dependency => "Dependencies",
            Category::StaticAnalysis => "Static analysis",
            Category::Container => "Container",
            Category::Documentation => "Security documentation",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Category::ToolPoisoning => "tool-poisoning",
            Category::Dependency => "dependency",
            Category::StaticAnalysis => "static-analysis",
            Category::Container => "container",
            Category::Documentation => "documentation",
        };
        f.write_str(name)
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "tool-poisoning" | "mcp" | "mcp-protocol" => Ok(Category::ToolPoisoning),
            "dependency" | "dependencies" => Ok(Category::Dependency),
            "static-analysis" | "static" => Ok(Category::StaticAnalysis),
            "container" => Ok(Category::Container),
            "documentation" | "docs" => Ok(Category::Documentation),
            other => Err(format!(
                "Unknown category '{}'. Valid categories: tool-poisoning, dependency, static-analysis, container, documentation",
                other
            )),
        }
    }
}

/// Outcome class of a single category check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CategoryStatus {
    Pass,
    Warning,
    Fail,
    NotApplicable,
}

impl CategoryStatus {
    /// Ordering used when several sub-results fold into one: fail dominates.
    pub fn rank(&self) -> u8 {
        match self {
            CategoryStatus::NotApplicable => 0,
            CategoryStatus::Pass => 1,
            CategoryStatus::Warning => 2,
            CategoryStatus::Fail => 3,
        }
    }

    pub fn worst(self, other: CategoryStatus) -> CategoryStatus {
        if other.rank() > self.rank() {
            other
        } else {
            self
        }
    }
}

impl fmt::Display for CategoryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CategoryStatus::Pass => write!(f, "pass"),
            CategoryStatus::Warning => write!(f, "warning"),
            CategoryStatus::Fail => write!(f, "fail"),
            CategoryStatus::NotApplicable => write!(f, "not-applicable"),
        }
    }
}

/// Result of one category check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryResult {
    pub status: CategoryStatus,
    pub score: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issues_found: Option<u32>,
    pub details: String,
}

impl CategoryResult {
    fn new(
        status: CategoryStatus,
        score: u32,
        issues_found: Option<u32>,
        details: impl Into<String>,
    ) -> Self {
        Self {
            status,
            score: score.min(MAX_SCORE),
            issues_found,
            details: details.into(),
        }
    }

    pub fn pass(score: u32, details: impl Into<String>) -> Self {
        Self::new(CategoryStatus::Pass, score, Some(0), details)
    }

    pub fn warning(score: u32, issues: u32, details: impl Into<String>) -> Self {
        Self::new(CategoryStatus::Warning, score, Some(issues), details)
    }

    pub fn fail(score: u32, issues: u32, details: impl Into<String>) -> Self {
        Self::new(CategoryStatus::Fail, score, Some(issues), details)
    }

    /// Check that could not run or had nothing to inspect. Never carries an issue count.
    pub fn not_applicable(score: u32, details: impl Into<String>) -> Self {
        Self::new(CategoryStatus::NotApplicable, score, None, details)
    }

    /// Tool ran but its output could not be interpreted.
    pub fn unparsable(details: impl Into<String>) -> Self {
        Self::new(CategoryStatus::Warning, 70, Some(0), details)
    }
}

/// Lifecycle marker for persisted records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum RecordState {
    #[default]
    Scored,
    AwaitingScan,
}

/// Four-level verdict derived from the overall score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SecurityStatus {
    VerifiedSecure,
    Conditional,
    UnderReview,
    NotRecommended,
}

impl SecurityStatus {
    pub fn is_recommended(&self) -> bool {
        matches!(
            self,
            SecurityStatus::VerifiedSecure | SecurityStatus::Conditional
        )
    }
}

impl fmt::Display for SecurityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SecurityStatus::VerifiedSecure => write!(f, "verified-secure"),
            SecurityStatus::Conditional => write!(f, "conditional"),
            SecurityStatus::UnderReview => write!(f, "under-review"),
            SecurityStatus::NotRecommended => write!(f, "not-recommended"),
        }
    }
}

/// The per-category slots of an assessment record. Absent slots were not evaluated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct CategoryResults {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_poisoning_check: Option<CategoryResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dependency_scan: Option<CategoryResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub static_analysis: Option<CategoryResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_scan: Option<CategoryResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security_documentation: Option<CategoryResult>,
}

impl CategoryResults {
    pub fn get(&self, category: Category) -> Option<&CategoryResult> {
        match category {
            Category::ToolPoisoning => self.tool_poisoning_check.as_ref(),
            Category::Dependency => self.dependency_scan.as_ref(),
            Category::StaticAnalysis => self.static_analysis.as_ref(),
            Category::Container => self.container_scan.as_ref(),
            Category::Documentation => self.security_documentation.as_ref(),
        }
    }

    pub fn set(&mut self, category: Category, result: CategoryResult) {
        let slot = match category {
            Category::ToolPoisoning => &mut self.tool_poisoning_check,
            Category::Dependency => &mut self.dependency_scan,
            Category::StaticAnalysis => &mut self.static_analysis,
            Category::Container => &mut self.container_scan,
            Category::Documentation => &mut self.security_documentation,
        };
        *slot = Some(result);
    }

    /// Present results in canonical category order.
    pub fn iter(&self) -> impl Iterator<Item = (Category, &CategoryResult)> + '_ {
        Category::ALL
            .into_iter()
            .filter_map(move |c| self.get(c).map(|r| (c, r)))
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl FromIterator<(Category, CategoryResult)> for CategoryResults {
    fn from_iter<I: IntoIterator<Item = (Category, CategoryResult)>>(iter: I) -> Self {
        let mut results = CategoryResults::default();
        for (category, result) in iter {
            results.set(category, result);
        }
        results
    }
}

/// The persisted security assessment of one server version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssessmentRecord {
    pub scan_date: String,
    pub scanner_version: String,
    #[serde(default)]
    pub tool_versions: BTreeMap<String, String>,
    #[serde(default)]
    pub record_state: RecordState,
    #[serde(flatten)]
    pub categories: CategoryResults,
    pub overall_score: u32,
    #[serde(default)]
    pub recommendations: Vec<String>,
}

impl AssessmentRecord {
    pub fn security_status(&self) -> SecurityStatus {
        crate::scoring::status_for_score(self.overall_score)
    }

    pub fn is_placeholder(&self) -> bool {
        self.record_state == RecordState::AwaitingScan
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_result_clamps_score() {
        let r = CategoryResult::pass(140, "too good");
        assert_eq!(r.score, 100);
    }

    #[test]
    fn test_not_applicable_has_no_issue_count() {
        let r = CategoryResult::not_applicable(50, "tool missing");
        assert_eq!(r.issues_found, None);
        let json = serde_json::to_value(&r).unwrap();
        assert!(json.get("issues_found").is_none());
        assert_eq!(json["status"], "not-applicable");
    }

    #[test]
    fn test_category_parsing() {
        assert_eq!("mcp".parse::<Category>().unwrap(), Category::ToolPoisoning);
        assert_eq!(
            "static_analysis".parse::<Category>().unwrap(),
            Category::StaticAnalysis
        );
        assert_eq!("Docs".parse::<Category>().unwrap(), Category::Documentation);
        assert!("network".parse::<Category>().is_err());
    }

    #[test]
    fn test_worst_status() {
        assert_eq!(
            CategoryStatus::Pass.worst(CategoryStatus::Fail),
            CategoryStatus::Fail
        );
        assert_eq!(
            CategoryStatus::Warning.worst(CategoryStatus::NotApplicable),
            CategoryStatus::Warning
        );
    }

    #[test]
    fn test_record_serializes_flat_category_keys() {
        let mut categories = CategoryResults::default();
        categories.set(Category::Documentation, CategoryResult::pass(100, "ok"));
        let record = AssessmentRecord {
            scan_date: "2026-01-01T00:00:00.000Z".into(),
            scanner_version: "0.3.0".into(),
            tool_versions: BTreeMap::new(),
            record_state: RecordState::Scored,
            categories,
            overall_score: 100,
            recommendations: vec![],
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["security_documentation"]["score"], 100);
        assert!(json.get("container_scan").is_none());
        assert_eq!(json["record_state"], "scored");

        let back: AssessmentRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_recommended_statuses() {
        assert!(SecurityStatus::VerifiedSecure.is_recommended());
        assert!(SecurityStatus::Conditional.is_recommended());
        assert!(!SecurityStatus::UnderReview.is_recommended());
        assert!(!SecurityStatus::NotRecommended.is_recommended());
    }
}
