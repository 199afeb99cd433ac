//! Category adapters
//!
//! One adapter per assessment category. Each inspects a checkout (through
//! the shared [`ScanContext`]) and always produces exactly one
//! [`CategoryResult`]: missing tools, timeouts and garbage output become
//! neutral or degraded results rather than errors.
//!
//! | Category        | Primary analyzer(s)                              | Built-in fallback      |
//! |-----------------|--------------------------------------------------|------------------------|
//! | tool poisoning  | mcp-scan                                         | phrase + unicode table |
//! | dependency      | npm audit, safety, govulncheck, cargo audit       | none                   |
//! | static analysis | bandit, eslint, semgrep                          | none                   |
//! | container       | hadolint + built-in rules                        | compose rules          |
//! | documentation   | built-in                                         | n/a                    |

pub mod container;
pub mod dependency;
pub mod documentation;
pub mod external_tool;
pub mod mcp_scan;
pub mod poisoning;
pub mod static_analysis;

use crate::config::ScanConfig;
use crate::discovery::ScanContext;
use crate::models::{Category, CategoryResult};
use std::sync::Arc;

pub use external_tool::{
    ExternalToolResult, SystemRunner, ToolInvocation, ToolOutcome, ToolRunner,
};

/// Neutral score for checks that could not run.
pub const NEUTRAL_SCORE: u32 = 50;

/// Trait for category adapters
pub trait CategoryAdapter: Send + Sync {
    fn category(&self) -> Category;

    /// Short identifier used in logs
    fn name(&self) -> &'static str;

    /// Produce this category's result for one checkout
    fn scan(&self, ctx: &ScanContext) -> CategoryResult;
}

/// Fold several sub-results (one per ecosystem or tool) into one.
///
/// Worst status wins, the lowest score wins, issue counts add up.
pub(crate) fn combine(results: Vec<CategoryResult>) -> Option<CategoryResult> {
    let mut iter = results.into_iter();
    let first = iter.next()?;
    Some(iter.fold(first, |acc, next| {
        let issues = match (acc.issues_found, next.issues_found) {
            (None, None) => None,
            (a, b) => Some(a.unwrap_or(0) + b.unwrap_or(0)),
        };
        let status = acc.status.worst(next.status);
        CategoryResult {
            status,
            score: acc.score.min(next.score),
            issues_found: issues,
            details: format!("{}; {}", acc.details, next.details),
        }
    }))
}

/// The full adapter set for a configuration, minus skipped categories.
pub fn build_adapters(
    config: &ScanConfig,
    runner: Arc<dyn ToolRunner>,
) -> Vec<Arc<dyn CategoryAdapter>> {
    let timeout = config.scan.tool_timeout_secs;
    let tools = &config.tools;
    let all: Vec<Arc<dyn CategoryAdapter>> = vec![
        Arc::new(mcp_scan::McpScanAdapter::new(
            Arc::clone(&runner),
            tools.mcp_scan.clone(),
            timeout,
        )),
        Arc::new(dependency::DependencyAdapter::new(
            Arc::clone(&runner),
            tools.clone(),
            timeout,
        )),
        Arc::new(static_analysis::StaticAnalysisAdapter::new(
            Arc::clone(&runner),
            tools.clone(),
            timeout,
        )),
        Arc::new(container::ContainerAdapter::new(
            Arc::clone(&runner),
            tools.hadolint.clone(),
            timeout,
        )),
        Arc::new(documentation::DocumentationAdapter),
    ];
    all.into_iter()
        .filter(|a| !config.is_skipped(a.category()))
        .collect()
}
