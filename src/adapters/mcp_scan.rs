//! MCP tool poisoning adapter
//!
//! Runs `mcp-scan scan --json --local-only <config>` for every MCP
//! configuration file found in the checkout. When the scanner cannot be
//! run at all, or there is no configuration to point it at, the built-in
//! pattern table in [`super::poisoning`] takes over.

use super::poisoning;
use super::{CategoryAdapter, ToolInvocation, ToolOutcome, ToolRunner};
use crate::discovery::ScanContext;
use crate::models::{Category, CategoryResult, CategoryStatus, Severity};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Score for a clean run of the dedicated scanner
pub const CLEAN_SCORE: u32 = 95;

pub struct McpScanAdapter {
    runner: Arc<dyn ToolRunner>,
    command: Vec<String>,
    timeout_secs: u64,
}

/// Issues counted across every scanned configuration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct McpScanReport {
    pub configs_scanned: u32,
    pub issues: u32,
    pub critical: u32,
}

impl McpScanAdapter {
    pub fn new(runner: Arc<dyn ToolRunner>, command: Vec<String>, timeout_secs: u64) -> Self {
        Self {
            runner,
            command,
            timeout_secs,
        }
    }

    fn fallback(&self, ctx: &ScanContext, reason: &str) -> CategoryResult {
        info!("Using pattern fallback for {}: {}", ctx.root.display(), reason);
        poisoning::scan_tree(&ctx.root).evaluate(reason)
    }
}

/// Count issue objects anywhere under `issues` or `security_issues` arrays.
fn collect_issues(value: &JsonValue, report: &mut McpScanReport) {
    match value {
        JsonValue::Object(map) => {
            for (key, child) in map {
                if matches!(key.as_str(), "issues" | "security_issues") {
                    if let Some(items) = child.as_array() {
                        for item in items {
                            report.issues += 1;
                            let severity = item
                                .get("severity")
                                .and_then(|s| s.as_str())
                                .map(Severity::from_tool_label)
                                .unwrap_or_default();
                            if severity == Severity::Critical {
                                report.critical += 1;
                            }
                        }
                        continue;
                    }
                }
                collect_issues(child, report);
            }
        }
        JsonValue::Array(items) => items.iter().for_each(|v| collect_issues(v, report)),
        _ => {}
    }
}

/// Parse one scanner run. Structured JSON is required.
pub fn parse_output(stdout: &JsonValue) -> Result<McpScanReport, String> {
    if !(stdout.is_object() || stdout.is_array()) {
        return Err("mcp-scan output is not a JSON object".to_string());
    }
    let mut report = McpScanReport {
        configs_scanned: 1,
        ..Default::default()
    };
    collect_issues(stdout, &mut report);
    Ok(report)
}

impl McpScanReport {
    fn merge(&mut self, other: McpScanReport) {
        self.configs_scanned += other.configs_scanned;
        self.issues += other.issues;
        self.critical += other.critical;
    }

    pub fn evaluate(&self) -> CategoryResult {
        let n = self.issues;
        if n == 0 {
            return CategoryResult::pass(
                CLEAN_SCORE,
                format!(
                    "mcp-scan found no security issues in {} configuration file(s)",
                    self.configs_scanned
                ),
            );
        }
        let details = format!(
            "mcp-scan found {} issue(s) ({} critical) in {} configuration file(s)",
            n, self.critical, self.configs_scanned
        );
        if self.critical > 0 {
            let score = 40u32.saturating_sub(10 * (self.critical - 1)).max(10);
            CategoryResult::fail(score, n, details)
        } else if n <= 2 {
            CategoryResult::warning(80, n, details)
        } else {
            CategoryResult::warning(90u32.saturating_sub(10 * n).max(60), n, details)
        }
    }
}

impl CategoryAdapter for McpScanAdapter {
    fn category(&self) -> Category {
        Category::ToolPoisoning
    }

    fn name(&self) -> &'static str {
        "mcp-scan"
    }

    fn scan(&self, ctx: &ScanContext) -> CategoryResult {
        if ctx.mcp_configs.is_empty() {
            return self.fallback(ctx, "no MCP configuration files for mcp-scan");
        }

        let mut report = McpScanReport::default();
        let mut unparsable = Vec::new();
        let mut failed = Vec::new();

        for config in &ctx.mcp_configs {
            let invocation = ToolInvocation::new("mcp-scan", &self.command)
                .args(["scan", "--json", "--local-only"])
                .path_arg(config)
                .cwd(&ctx.root)
                .timeout(self.timeout_secs);
            let result = self.runner.run(&invocation);

            // A non-zero exit without JSON is a tool error, not a finding.
            let outcome = ToolOutcome::classify(&result, |r| match r.json_output_lenient() {
                Some(json) => parse_output(&json),
                None if r.return_code != Some(0) => Err(format!(
                    "exit code {:?}: {}",
                    r.return_code,
                    r.stderr.lines().next().unwrap_or("").trim()
                )),
                None => Err("output is not JSON".to_string()),
            });

            match outcome {
                ToolOutcome::Parsed(r) => report.merge(r),
                ToolOutcome::Unparsable(reason) if result.return_code == Some(0) => {
                    warn!("Could not parse mcp-scan output for {}: {}", ctx.relative(config), reason);
                    unparsable.push(ctx.relative(config));
                }
                ToolOutcome::Unparsable(reason) | ToolOutcome::Unavailable(reason) => {
                    warn!("mcp-scan failed for {}: {}", ctx.relative(config), reason);
                    failed.push((ctx.relative(config), reason));
                    // Never launched: every remaining config would fail the same way
                    if result.return_code.is_none() && !result.timed_out {
                        break;
                    }
                }
            }
        }

        debug!("mcp-scan report for {}: {:?}", ctx.root.display(), report);

        if report.configs_scanned == 0 {
            if unparsable.is_empty() {
                let reason = failed
                    .first()
                    .map(|(_, reason)| reason.as_str())
                    .unwrap_or("no configuration scanned");
                return self.fallback(ctx, &format!("mcp-scan unavailable: {}", reason));
            }
            return CategoryResult::unparsable(format!(
                "mcp-scan output could not be parsed for {}",
                unparsable.join(", ")
            ));
        }

        let mut result = report.evaluate();
        if !unparsable.is_empty() {
            result.details.push_str(&format!(
                "; output unparsable for {}",
                unparsable.join(", ")
            ));
        }
        if !failed.is_empty() {
            let names: Vec<&str> = failed.iter().map(|(name, _)| name.as_str()).collect();
            result.details.push_str(&format!("; mcp-scan failed for {}", names.join(", ")));
        }
        // Partial coverage never reads as a clean pass
        if result.status == CategoryStatus::Pass && !(unparsable.is_empty() && failed.is_empty()) {
            result = CategoryResult::unparsable(std::mem::take(&mut result.details));
        }
        result
    }
}
