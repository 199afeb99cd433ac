//! Static analysis adapter
//!
//! Picks an analyzer by primary language: bandit for Python, eslint with a
//! small fixed rule set for JavaScript, semgrep for everything else.
//! TypeScript tries eslint first and falls back to semgrep.

use super::{
    CategoryAdapter, ExternalToolResult, ToolInvocation, ToolOutcome, ToolRunner, NEUTRAL_SCORE,
};
use crate::config::ToolCommands;
use crate::discovery::{Language, ScanContext};
use crate::models::{Category, CategoryResult};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use tracing::debug;

/// Rules enabled for the eslint pass; project config is ignored.
const ESLINT_RULES: &[&str] = &["no-eval:error", "no-implied-eval:error", "no-new-func:error"];

pub struct StaticAnalysisAdapter {
    runner: Arc<dyn ToolRunner>,
    tools: ToolCommands,
    timeout_secs: u64,
}

/// Findings from one analyzer run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AnalyzerFindings {
    pub total: u32,
    /// High-severity, high-confidence findings
    pub severe: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Analyzer {
    Bandit,
    Eslint,
    Semgrep,
}

impl Analyzer {
    fn tool_name(&self) -> &'static str {
        match self {
            Analyzer::Bandit => "bandit",
            Analyzer::Eslint => "eslint",
            Analyzer::Semgrep => "semgrep",
        }
    }

    pub fn evaluate(&self, f: AnalyzerFindings) -> CategoryResult {
        let tool = self.tool_name();
        let n = f.total;
        if n == 0 {
            // eslint runs only three rules, so a clean pass proves less.
            let score = if *self == Analyzer::Eslint { 85 } else { 100 };
            return CategoryResult::pass(score, format!("{} found no issues", tool));
        }
        let details = format!("{} found {} issue(s), {} high severity", tool, n, f.severe);
        match self {
            Analyzer::Bandit => {
                if f.severe > 0 {
                    CategoryResult::fail(50, n, details)
                } else if n <= 5 {
                    CategoryResult::warning(80, n, details)
                } else {
                    CategoryResult::warning(60, n, details)
                }
            }
            Analyzer::Eslint => {
                CategoryResult::warning(90u32.saturating_sub(5 * n).max(50), n, details)
            }
            Analyzer::Semgrep => {
                if f.severe > 0 {
                    CategoryResult::fail(50, n, details)
                } else if n <= 3 {
                    CategoryResult::warning(85, n, details)
                } else {
                    CategoryResult::warning(70, n, details)
                }
            }
        }
    }
}

pub fn parse_bandit(json: &JsonValue) -> Result<AnalyzerFindings, String> {
    let results = json
        .get("results")
        .and_then(|r| r.as_array())
        .ok_or_else(|| "bandit output has no results array".to_string())?;
    let severe = results
        .iter()
        .filter(|r| {
            let sev = r.get("issue_severity").and_then(|s| s.as_str()).unwrap_or("");
            let conf = r.get("issue_confidence").and_then(|s| s.as_str()).unwrap_or("");
            sev.eq_ignore_ascii_case("high") && !conf.eq_ignore_ascii_case("low")
        })
        .count() as u32;
    Ok(AnalyzerFindings {
        total: results.len() as u32,
        severe,
    })
}

pub fn parse_semgrep(json: &JsonValue) -> Result<AnalyzerFindings, String> {
    let results = json
        .get("results")
        .and_then(|r| r.as_array())
        .ok_or_else(|| "semgrep output has no results array".to_string())?;
    let severe = results
        .iter()
        .filter(|r| {
            r.pointer("/extra/severity")
                .and_then(|s| s.as_str())
                .map(|s| s.eq_ignore_ascii_case("error"))
                .unwrap_or(false)
        })
        .count() as u32;
    Ok(AnalyzerFindings {
        total: results.len() as u32,
        severe,
    })
}

/// eslint JSON: one entry per file with a `messages` array. Parse errors are not findings.
pub fn parse_eslint(json: &JsonValue) -> Result<AnalyzerFindings, String> {
    let files = json
        .as_array()
        .ok_or_else(|| "eslint output is not a file list".to_string())?;
    let total = files
        .iter()
        .filter_map(|f| f.get("messages").and_then(|m| m.as_array()))
        .flatten()
        .filter(|m| m.get("ruleId").map(|r| !r.is_null()).unwrap_or(false))
        .count() as u32;
    Ok(AnalyzerFindings { total, severe: 0 })
}

impl StaticAnalysisAdapter {
    pub fn new(runner: Arc<dyn ToolRunner>, tools: ToolCommands, timeout_secs: u64) -> Self {
        Self {
            runner,
            tools,
            timeout_secs,
        }
    }

    fn run(&self, analyzer: Analyzer, ctx: &ScanContext) -> ToolOutcome<AnalyzerFindings> {
        let invocation = match analyzer {
            Analyzer::Bandit => ToolInvocation::new("bandit", &self.tools.bandit)
                .args(["-r", ".", "-f", "json", "-q"]),
            Analyzer::Eslint => {
                let mut inv = ToolInvocation::new("eslint", &self.tools.eslint)
                    .args(["--format", "json", "--no-eslintrc"]);
                for rule in ESLINT_RULES {
                    inv = inv.args(["--rule", *rule]);
                }
                inv.arg(".")
            }
            Analyzer::Semgrep => ToolInvocation::new("semgrep", &self.tools.semgrep)
                .args(["--config=auto", "--json", "--quiet", "."]),
        };
        let invocation = invocation.cwd(&ctx.root).timeout(self.timeout_secs);
        let result = self.runner.run(&invocation);
        ToolOutcome::classify(&result, |r: &ExternalToolResult| {
            let json = r
                .json_output()
                .ok_or_else(|| format!("{} output is not JSON", analyzer.tool_name()))?;
            match analyzer {
                Analyzer::Bandit => parse_bandit(&json),
                Analyzer::Eslint => parse_eslint(&json),
                Analyzer::Semgrep => parse_semgrep(&json),
            }
        })
    }

    fn analyzers_for(language: Language) -> &'static [Analyzer] {
        match language {
            Language::Python => &[Analyzer::Bandit],
            Language::JavaScript => &[Analyzer::Eslint],
            Language::TypeScript => &[Analyzer::Eslint, Analyzer::Semgrep],
            _ => &[Analyzer::Semgrep],
        }
    }
}

impl CategoryAdapter for StaticAnalysisAdapter {
    fn category(&self) -> Category {
        Category::StaticAnalysis
    }

    fn name(&self) -> &'static str {
        "static-analysis"
    }

    fn scan(&self, ctx: &ScanContext) -> CategoryResult {
        let mut unavailable = Vec::new();
        for analyzer in Self::analyzers_for(ctx.language) {
            match self.run(*analyzer, ctx) {
                ToolOutcome::Parsed(findings) => return analyzer.evaluate(findings),
                ToolOutcome::Unparsable(reason) => return CategoryResult::unparsable(reason),
                ToolOutcome::Unavailable(reason) => {
                    debug!("{} unavailable: {}", analyzer.tool_name(), reason);
                    unavailable.push(reason);
                }
            }
        }
        CategoryResult::not_applicable(
            NEUTRAL_SCORE,
            format!(
                "No static analyzer available for {} code: {}",
                ctx.language,
                unavailable.join("; ")
            ),
        )
    }
}
