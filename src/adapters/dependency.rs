//! Dependency vulnerability adapter
//!
//! One scanner per detected ecosystem:
//!
//! - npm: `npm audit --json` (v6 `advisories` and v7+ `vulnerabilities` formats)
//! - Python: `safety check --json -r requirements.txt`
//! - Go: `govulncheck -json ./...`
//! - Rust: `cargo audit --json`
//!
//! Results from several ecosystems are combined; the worst one decides.

use super::{
    combine, CategoryAdapter, ExternalToolResult, ToolInvocation, ToolOutcome, ToolRunner,
    NEUTRAL_SCORE,
};
use crate::config::ToolCommands;
use crate::discovery::{Ecosystem, Manifest, ScanContext};
use crate::models::{Category, CategoryResult, Severity};
use serde_json::Value as JsonValue;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, warn};

pub struct DependencyAdapter {
    runner: Arc<dyn ToolRunner>,
    tools: ToolCommands,
    timeout_secs: u64,
}

/// Vulnerability counts by severity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VulnCounts {
    pub critical: u32,
    pub high: u32,
    pub moderate: u32,
    pub low: u32,
    /// Scanner did not report a severity
    pub unknown: u32,
}

impl VulnCounts {
    pub fn total(&self) -> u32 {
        self.critical + self.high + self.moderate + self.low + self.unknown
    }

    fn add(&mut self, severity: Option<Severity>) {
        match severity {
            Some(Severity::Critical) => self.critical += 1,
            Some(Severity::High) => self.high += 1,
            Some(Severity::Medium) => self.moderate += 1,
            Some(Severity::Low) | Some(Severity::Info) => self.low += 1,
            None => self.unknown += 1,
        }
    }

    pub fn evaluate(&self, ecosystem: Ecosystem) -> CategoryResult {
        let total = self.total();
        if total == 0 {
            return CategoryResult::pass(
                100,
                format!("{}: no known vulnerabilities", ecosystem),
            );
        }
        let details = format!(
            "{}: {} vulnerabilit{} (critical {}, high {}, moderate {}, low {}, unrated {})",
            ecosystem,
            total,
            if total == 1 { "y" } else { "ies" },
            self.critical,
            self.high,
            self.moderate,
            self.low,
            self.unknown
        );
        if self.critical > 0 {
            return CategoryResult::fail(40, total, details);
        }
        if self.high > 0 {
            return CategoryResult::warning(60, total, details);
        }
        let mut score = 100;
        if self.moderate + self.low > 0 {
            score = 80;
        }
        if self.unknown > 0 {
            score = score.min(100u32.saturating_sub(10 * self.unknown).max(60));
        }
        CategoryResult::warning(score, total, details)
    }
}

/// npm audit, both the v6 and v7+ report shapes
pub fn parse_npm_audit(json: &JsonValue) -> Result<VulnCounts, String> {
    if let Some(err) = json.get("error") {
        let summary = err
            .get("summary")
            .and_then(|s| s.as_str())
            .unwrap_or("unknown error");
        return Err(format!("npm audit reported an error: {}", summary));
    }

    if let Some(meta) = json.pointer("/metadata/vulnerabilities").and_then(|v| v.as_object()) {
        let get = |k: &str| meta.get(k).and_then(|v| v.as_u64()).unwrap_or(0) as u32;
        return Ok(VulnCounts {
            critical: get("critical"),
            high: get("high"),
            moderate: get("moderate"),
            low: get("low") + get("info"),
            unknown: 0,
        });
    }

    // Older npm without metadata counts: tally per entry
    let entries = json
        .get("vulnerabilities")
        .or_else(|| json.get("advisories"))
        .and_then(|v| v.as_object())
        .ok_or_else(|| "npm audit output has no vulnerability section".to_string())?;
    let mut counts = VulnCounts::default();
    for entry in entries.values() {
        counts.add(
            entry
                .get("severity")
                .and_then(|s| s.as_str())
                .map(Severity::from_tool_label),
        );
    }
    Ok(counts)
}

/// safety: legacy list output or the 2.x+ object with a `vulnerabilities` array
pub fn parse_safety(json: &JsonValue) -> Result<VulnCounts, String> {
    let items = match json {
        JsonValue::Array(items) => items,
        JsonValue::Object(_) => json
            .get("vulnerabilities")
            .and_then(|v| v.as_array())
            .ok_or_else(|| "safety output has no vulnerabilities list".to_string())?,
        _ => return Err("safety output is not a list".to_string()),
    };
    let mut counts = VulnCounts::default();
    for item in items {
        let severity = item
            .pointer("/severity/cvssv3/base_severity")
            .or_else(|| item.get("severity"))
            .and_then(|s| s.as_str())
            .map(Severity::from_tool_label);
        counts.add(severity);
    }
    Ok(counts)
}

/// govulncheck: a stream of JSON messages; each distinct `finding.osv` counts once
pub fn parse_govulncheck(messages: &[JsonValue]) -> Result<VulnCounts, String> {
    if messages.iter().all(|m| !m.is_object()) {
        return Err("govulncheck output has no JSON messages".to_string());
    }
    let ids: BTreeSet<&str> = messages
        .iter()
        .filter_map(|m| m.pointer("/finding/osv").and_then(|v| v.as_str()))
        .collect();
    Ok(VulnCounts {
        unknown: ids.len() as u32,
        ..Default::default()
    })
}

/// cargo audit: `vulnerabilities.list[].advisory`
pub fn parse_cargo_audit(json: &JsonValue) -> Result<VulnCounts, String> {
    let vulns = json
        .get("vulnerabilities")
        .ok_or_else(|| "cargo audit output has no vulnerabilities section".to_string())?;
    let mut counts = VulnCounts::default();
    if let Some(list) = vulns.get("list").and_then(|l| l.as_array()) {
        for item in list {
            let severity = item
                .pointer("/advisory/severity")
                .and_then(|s| s.as_str())
                .map(Severity::from_tool_label);
            counts.add(severity);
        }
    } else if let Some(n) = vulns.get("count").and_then(|c| c.as_u64()) {
        counts.unknown = n as u32;
    }
    Ok(counts)
}

impl DependencyAdapter {
    pub fn new(runner: Arc<dyn ToolRunner>, tools: ToolCommands, timeout_secs: u64) -> Self {
        Self {
            runner,
            tools,
            timeout_secs,
        }
    }

    fn scan_manifest(&self, ctx: &ScanContext, manifest: &Manifest) -> ToolOutcome<VulnCounts> {
        let (invocation, parse): (ToolInvocation, RunParser) = match manifest.ecosystem {
            Ecosystem::Npm => (
                ToolInvocation::new("npm", &self.tools.npm).args(["audit", "--json"]),
                npm_run as RunParser,
            ),
            Ecosystem::Python => (
                ToolInvocation::new("safety", &self.tools.safety)
                    .args(["check", "--json", "-r"])
                    .path_arg(&manifest.path),
                safety_run as RunParser,
            ),
            Ecosystem::Go => (
                ToolInvocation::new("govulncheck", &self.tools.govulncheck)
                    .args(["-json", "./..."]),
                govulncheck_run as RunParser,
            ),
            Ecosystem::Rust => (
                ToolInvocation::new("cargo-audit", &self.tools.cargo_audit).arg("--json"),
                cargo_audit_run as RunParser,
            ),
        };
        let invocation = invocation.cwd(&ctx.root).timeout(self.timeout_secs);
        let result = self.runner.run(&invocation);
        ToolOutcome::classify(&result, parse)
    }
}

type RunParser = fn(&ExternalToolResult) -> Result<VulnCounts, String>;

fn npm_run(r: &ExternalToolResult) -> Result<VulnCounts, String> {
    let json = r
        .json_output()
        .ok_or_else(|| "npm audit output is not JSON".to_string())?;
    parse_npm_audit(&json)
}

fn safety_run(r: &ExternalToolResult) -> Result<VulnCounts, String> {
    let json = r
        .json_output_lenient()
        .ok_or_else(|| "safety output is not JSON".to_string())?;
    parse_safety(&json)
}

fn govulncheck_run(r: &ExternalToolResult) -> Result<VulnCounts, String> {
    let messages = r
        .json_stream()
        .ok_or_else(|| "govulncheck output is not JSON".to_string())?;
    parse_govulncheck(&messages)
}

fn cargo_audit_run(r: &ExternalToolResult) -> Result<VulnCounts, String> {
    let json = r
        .json_output()
        .ok_or_else(|| "cargo audit output is not JSON".to_string())?;
    parse_cargo_audit(&json)
}

impl CategoryAdapter for DependencyAdapter {
    fn category(&self) -> Category {
        Category::Dependency
    }

    fn name(&self) -> &'static str {
        "dependency"
    }

    fn scan(&self, ctx: &ScanContext) -> CategoryResult {
        if ctx.manifests.is_empty() {
            return CategoryResult::not_applicable(
                100,
                "No recognized dependency manifests (nothing to audit)",
            );
        }

        let mut results = Vec::new();
        let mut unavailable = Vec::new();

        for manifest in &ctx.manifests {
            match self.scan_manifest(ctx, manifest) {
                ToolOutcome::Parsed(counts) => {
                    debug!("{} dependency counts: {:?}", manifest.ecosystem, counts);
                    results.push(counts.evaluate(manifest.ecosystem));
                }
                ToolOutcome::Unparsable(reason) => {
                    warn!("{} audit output unparsable: {}", manifest.ecosystem, reason);
                    results.push(CategoryResult::unparsable(format!(
                        "{}: {}",
                        manifest.ecosystem, reason
                    )));
                }
                ToolOutcome::Unavailable(reason) => {
                    debug!("{} audit unavailable: {}", manifest.ecosystem, reason);
                    unavailable.push(format!("{}: {}", manifest.ecosystem, reason));
                }
            }
        }

        match combine(results) {
            Some(mut combined) => {
                if !unavailable.is_empty() {
                    combined
                        .details
                        .push_str(&format!(" (not scanned: {})", unavailable.join("; ")));
                }
                combined
            }
            None => CategoryResult::not_applicable(
                NEUTRAL_SCORE,
                format!("Dependency scanners unavailable: {}", unavailable.join("; ")),
            ),
        }
    }
}
