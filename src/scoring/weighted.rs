use crate::models::{Category, CategoryResults, CategoryStatus, SecurityStatus, MAX_SCORE};
use serde::Serialize;

/// Fixed category weights in percent. Sums to 100.
pub const CATEGORY_WEIGHTS: [(Category, u32); 5] = [
    (Category::ToolPoisoning, 35),
    (Category::Dependency, 25),
    (Category::StaticAnalysis, 20),
    (Category::Container, 10),
    (Category::Documentation, 10),
];

/// Inclusive lower bounds, checked top-down.
pub const STATUS_THRESHOLDS: [(u32, SecurityStatus); 4] = [
    (85, SecurityStatus::VerifiedSecure),
    (70, SecurityStatus::Conditional),
    (50, SecurityStatus::UnderReview),
    (0, SecurityStatus::NotRecommended),
];

pub fn weight_of(category: Category) -> u32 {
    CATEGORY_WEIGHTS
        .iter()
        .find(|(c, _)| *c == category)
        .map(|(_, w)| *w)
        .unwrap_or(0)
}

pub fn status_for_score(score: u32) -> SecurityStatus {
    STATUS_THRESHOLDS
        .iter()
        .find(|(min, _)| score >= *min)
        .map(|(_, status)| *status)
        .unwrap_or(SecurityStatus::NotRecommended)
}

/// One category's share of the overall score
#[derive(Debug, Clone, Serialize)]
pub struct Contribution {
    pub category: Category,
    pub status: CategoryStatus,
    pub score: u32,
    pub weight: u32,
    /// Points this category adds to the overall score after renormalization
    pub points: f64,
}

/// Full breakdown of a weighted score
#[derive(Debug, Clone, Serialize)]
pub struct ScoreBreakdown {
    pub overall_score: u32,
    pub status: SecurityStatus,
    pub total_weight: u32,
    pub contributions: Vec<Contribution>,
    pub omitted: Vec<Category>,
}

/// Compute the weighted score over the present category results.
///
/// Returns `None` when no category is present; callers must produce a
/// placeholder record in that case rather than a score.
pub fn calculate(results: &CategoryResults) -> Option<ScoreBreakdown> {
    let mut numerator: u64 = 0;
    let mut denominator: u64 = 0;
    let mut present = Vec::new();
    let mut omitted = Vec::new();

    for (category, weight) in CATEGORY_WEIGHTS {
        match results.get(category) {
            Some(result) => {
                let score = result.score.min(MAX_SCORE);
                numerator += u64::from(score) * u64::from(weight);
                denominator += u64::from(weight);
                present.push((category, result.status, score, weight));
            }
            None => omitted.push(category),
        }
    }

    if denominator == 0 {
        return None;
    }

    // Integer half-up rounding: floor((2n + d) / 2d)
    let overall = ((2 * numerator + denominator) / (2 * denominator)).min(u64::from(MAX_SCORE));
    let overall_score = overall as u32;

    let contributions = present
        .into_iter()
        .map(|(category, status, score, weight)| Contribution {
            category,
            status,
            score,
            weight,
            points: f64::from(score) * f64::from(weight) / denominator as f64,
        })
        .collect();

    Some(ScoreBreakdown {
        overall_score,
        status: status_for_score(overall_score),
        total_weight: denominator as u32,
        contributions,
        omitted,
    })
}

impl ScoreBreakdown {
    /// Human-readable explanation of how the score was reached
    pub fn explain(&self) -> String {
        let mut lines = Vec::new();
        lines.push(format!(
            "Security score: {} ({})",
            self.overall_score, self.status
        ));
        for c in &self.contributions {
            lines.push(format!(
                "  {:<24} {:>3} x {:>2}% = {:>5.1}  [{}]",
                c.category.label(),
                c.score,
                c.weight,
                c.points,
                c.status
            ));
        }
        if !self.omitted.is_empty() {
            let names: Vec<String> = self.omitted.iter().map(|c| c.to_string()).collect();
            lines.push(format!(
                "  not evaluated: {} (weights renormalized over {}%)",
                names.join(", "),
                self.total_weight
            ));
        }
        lines.join("\n")
    }
}

/// Score below which a category gets a recommendation
pub const RECOMMENDATION_THRESHOLD: u32 = 80;

/// Actionable follow-ups derived from weak categories
pub fn recommendations(results: &CategoryResults, overall_score: u32) -> Vec<String> {
    let mut recs: Vec<String> = results
        .iter()
        .filter(|(_, r)| r.score < RECOMMENDATION_THRESHOLD)
        .map(|(category, _)| {
            match category {
                Category::ToolPoisoning => {
                    "Address MCP-specific security issues identified by mcp-scan"
                }
                Category::Dependency => "Update dependencies to fix known vulnerabilities",
                Category::StaticAnalysis => "Address static analysis security findings",
                Category::Container => "Improve container security configuration",
                Category::Documentation => "Add comprehensive security documentation",
            }
            .to_string()
        })
        .collect();

    if overall_score < 70 {
        recs.push("Consider additional security review before recommendation".to_string());
    }

    recs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CategoryResult;

    fn full(scores: [u32; 5]) -> CategoryResults {
        Category::ALL
            .into_iter()
            .zip(scores)
            .map(|(c, s)| (c, CategoryResult::warning(s, 1, "")))
            .collect()
    }

    #[test]
    fn test_weights_sum_to_100() {
        let total: u32 = CATEGORY_WEIGHTS.iter().map(|(_, w)| w).sum();
        assert_eq!(total, 100);
    }

    #[test]
    fn test_reference_example() {
        // 0.35*95 + 0.25*80 + 0.20*70 + 0.10*50 + 0.10*100 = 82.25
        let b = calculate(&full([95, 80, 70, 50, 100])).unwrap();
        assert_eq!(b.overall_score, 82);
        assert_eq!(b.status, SecurityStatus::Conditional);
    }

    #[test]
    fn test_timed_out_category_counts_neutral() {
        let b = calculate(&full([95, 80, 50, 50, 100])).unwrap();
        assert_eq!(b.overall_score, 78);
    }

    #[test]
    fn test_extremes() {
        let top = calculate(&full([100; 5])).unwrap();
        assert_eq!(top.overall_score, 100);
        assert_eq!(top.status, SecurityStatus::VerifiedSecure);

        let bottom = calculate(&full([0; 5])).unwrap();
        assert_eq!(bottom.overall_score, 0);
        assert_eq!(bottom.status, SecurityStatus::NotRecommended);
    }

    #[test]
    fn test_half_up_rounding() {
        // 35*91 + 25*90 + 20*90 + 10*90 + 10*90 = 9035 -> 90.35
        assert_eq!(calculate(&full([91, 90, 90, 90, 90])).unwrap().overall_score, 90);
        // 35*90 + 25*90 + 20*90 + 10*95 + 10*90 = 9050 -> 90.5 rounds up
        assert_eq!(calculate(&full([90, 90, 90, 95, 90])).unwrap().overall_score, 91);
    }

    #[test]
    fn test_insertion_order_is_irrelevant() {
        let forward: CategoryResults = Category::ALL
            .into_iter()
            .zip([60, 70, 80, 90, 100])
            .map(|(c, s)| (c, CategoryResult::pass(s, "")))
            .collect();
        let backward: CategoryResults = Category::ALL
            .into_iter()
            .zip([60, 70, 80, 90, 100])
            .rev()
            .map(|(c, s)| (c, CategoryResult::pass(s, "")))
            .collect();
        assert_eq!(
            calculate(&forward).unwrap().overall_score,
            calculate(&backward).unwrap().overall_score
        );
    }

    #[test]
    fn test_omitted_category_renormalizes() {
        let mut results = CategoryResults::default();
        results.set(Category::ToolPoisoning, CategoryResult::pass(90, ""));
        results.set(Category::Dependency, CategoryResult::pass(90, ""));
        let b = calculate(&results).unwrap();
        assert_eq!(b.overall_score, 90);
        assert_eq!(b.total_weight, 60);
        assert_eq!(b.omitted.len(), 3);
    }

    #[test]
    fn test_empty_results_have_no_score() {
        assert!(calculate(&CategoryResults::default()).is_none());
    }

    #[test]
    fn test_status_thresholds() {
        assert_eq!(status_for_score(85), SecurityStatus::VerifiedSecure);
        assert_eq!(status_for_score(84), SecurityStatus::Conditional);
        assert_eq!(status_for_score(70), SecurityStatus::Conditional);
        assert_eq!(status_for_score(69), SecurityStatus::UnderReview);
        assert_eq!(status_for_score(50), SecurityStatus::UnderReview);
        assert_eq!(status_for_score(49), SecurityStatus::NotRecommended);
    }

    #[test]
    fn test_recommendations_for_weak_categories() {
        let mut results = CategoryResults::default();
        results.set(Category::Container, CategoryResult::fail(40, 2, "root"));
        results.set(Category::Documentation, CategoryResult::pass(100, ""));
        let recs = recommendations(&results, 60);
        assert_eq!(recs.len(), 2);
        assert_eq!(recs[0], "Improve container security configuration");
        assert!(recs[1].contains("additional security review"));
    }

    #[test]
    fn test_explain_mentions_omitted() {
        let mut results = CategoryResults::default();
        results.set(Category::Documentation, CategoryResult::pass(100, ""));
        let text = calculate(&results).unwrap().explain();
        assert!(recommendations(&results, 100).is_empty());
        assert!(text.contains("Security score: 100"));
        assert!(text.contains("not evaluated"));
    }
}
