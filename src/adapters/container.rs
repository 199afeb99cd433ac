//! Container configuration adapter
//!
//! Dockerfiles go through hadolint plus a few built-in rules; compose files
//! only get the built-in rules. Built-in findings stand even when hadolint
//! is missing. No descriptor means nothing to assess.

use super::{CategoryAdapter, ToolInvocation, ToolOutcome, ToolRunner, NEUTRAL_SCORE};
use crate::discovery::{ContainerDescriptor, ContainerKind, ScanContext};
use crate::models::{Category, CategoryResult, Severity};
use regex::Regex;
use serde_json::Value as JsonValue;
use std::sync::{Arc, OnceLock};
use tracing::debug;

struct ContainerRule {
    id: &'static str,
    pattern: &'static str,
    message: &'static str,
    severity: Severity,
}

const DOCKERFILE_RULES: &[ContainerRule] = &[
    ContainerRule {
        id: "root-user",
        pattern: r"(?im)^\s*USER\s+(?:root|0)(?::\S+)?\s*$",
        message: "container runs as root user",
        severity: Severity::High,
    },
    ContainerRule {
        id: "privileged",
        pattern: r"--privileged",
        message: "container requires privileged mode",
        severity: Severity::Critical,
    },
];

const COMPOSE_RULES: &[ContainerRule] = &[
    ContainerRule {
        id: "privileged",
        pattern: r"(?im)^\s*privileged\s*:\s*true\b",
        message: "service runs in privileged mode",
        severity: Severity::Critical,
    },
    ContainerRule {
        id: "root-user",
        pattern: r#"(?im)^\s*user\s*:\s*["']?(?:root|0)(?::\S+)?["']?\s*$"#,
        message: "service runs as root user",
        severity: Severity::High,
    },
    ContainerRule {
        id: "host-network",
        pattern: r#"(?im)^\s*network_mode\s*:\s*["']?host["']?\s*$"#,
        message: "service shares the host network namespace",
        severity: Severity::High,
    },
];

fn compiled(rules: &'static [ContainerRule]) -> Vec<(&'static ContainerRule, Regex)> {
    rules
        .iter()
        .filter_map(|r| Regex::new(r.pattern).ok().map(|re| (r, re)))
        .collect()
}

fn dockerfile_rules() -> &'static [(&'static ContainerRule, Regex)] {
    static RULES: OnceLock<Vec<(&'static ContainerRule, Regex)>> = OnceLock::new();
    RULES.get_or_init(|| compiled(DOCKERFILE_RULES))
}

fn compose_rules() -> &'static [(&'static ContainerRule, Regex)] {
    static RULES: OnceLock<Vec<(&'static ContainerRule, Regex)>> = OnceLock::new();
    RULES.get_or_init(|| compiled(COMPOSE_RULES))
}

fn expose_pattern() -> &'static Regex {
    static EXPOSE: OnceLock<Regex> = OnceLock::new();
    EXPOSE.get_or_init(|| Regex::new(r"(?im)^\s*EXPOSE\s+(.+)$").expect("valid regex"))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerIssue {
    pub rule: String,
    pub message: String,
    pub severity: Severity,
}

/// Built-in checks over a descriptor's text
pub fn check_rules(kind: ContainerKind, content: &str) -> Vec<ContainerIssue> {
    let rules = match kind {
        ContainerKind::Dockerfile => dockerfile_rules(),
        ContainerKind::Compose => compose_rules(),
    };
    let mut issues: Vec<ContainerIssue> = rules
        .iter()
        .filter(|(_, re)| re.is_match(content))
        .map(|(rule, _)| ContainerIssue {
            rule: rule.id.to_string(),
            message: rule.message.to_string(),
            severity: rule.severity,
        })
        .collect();

    if kind == ContainerKind::Dockerfile {
        let privileged_port = expose_pattern().captures_iter(content).any(|cap| {
            cap[1].split_whitespace().any(|entry| {
                entry.split('/')
                    .next()
                    .and_then(|p| p.parse::<u32>().ok())
                    .is_some_and(|p| p < 1024)
            })
        });
        if privileged_port {
            issues.push(ContainerIssue {
                rule: "privileged-port".to_string(),
                message: "container exposes a privileged port (<1024)".to_string(),
                severity: Severity::Medium,
            });
        }
    }
    issues
}

/// hadolint JSON: array of `{code, level, message}`. Only error and warning levels count.
pub fn parse_hadolint(json: &JsonValue) -> Result<Vec<ContainerIssue>, String> {
    let items = json
        .as_array()
        .ok_or_else(|| "hadolint output is not a list".to_string())?;
    Ok(items
        .iter()
        .filter_map(|item| {
            let level = item.get("level").and_then(|l| l.as_str()).unwrap_or("");
            let severity = match level {
                "error" => Severity::High,
                "warning" => Severity::Medium,
                _ => return None,
            };
            Some(ContainerIssue {
                rule: item
                    .get("code")
                    .and_then(|c| c.as_str())
                    .unwrap_or("hadolint")
                    .to_string(),
                message: item
                    .get("message")
                    .and_then(|m| m.as_str())
                    .unwrap_or("")
                    .to_string(),
                severity,
            })
        })
        .collect())
}

pub fn evaluate(descriptor: &str, issues: &[ContainerIssue]) -> CategoryResult {
    let n = issues.len() as u32;
    if n == 0 {
        return CategoryResult::pass(100, format!("{}: no container security issues", descriptor));
    }
    let listing: Vec<&str> = issues.iter().take(5).map(|i| i.rule.as_str()).collect();
    let details = format!(
        "{}: {} issue(s): {}",
        descriptor,
        n,
        listing.join(", ")
    );
    if issues.iter().any(|i| i.severity == Severity::Critical) {
        CategoryResult::fail(40, n, details)
    } else {
        CategoryResult::warning(100u32.saturating_sub(15 * n).max(60), n, details)
    }
}

pub struct ContainerAdapter {
    runner: Arc<dyn ToolRunner>,
    command: Vec<String>,
    timeout_secs: u64,
}

impl ContainerAdapter {
    pub fn new(runner: Arc<dyn ToolRunner>, command: Vec<String>, timeout_secs: u64) -> Self {
        Self {
            runner,
            command,
            timeout_secs,
        }
    }

    fn hadolint(&self, ctx: &ScanContext, descriptor: &ContainerDescriptor) -> ToolOutcome<Vec<ContainerIssue>> {
        let invocation = ToolInvocation::new("hadolint", &self.command)
            .args(["--format", "json", "--no-fail"])
            .path_arg(&descriptor.path)
            .cwd(&ctx.root)
            .timeout(self.timeout_secs);
        let result = self.runner.run(&invocation);
        ToolOutcome::classify(&result, |r| {
            let json = r
                .json_output()
                .ok_or_else(|| "hadolint output is not JSON".to_string())?;
            parse_hadolint(&json)
        })
    }
}

impl CategoryAdapter for ContainerAdapter {
    fn category(&self) -> Category {
        Category::Container
    }

    fn name(&self) -> &'static str {
        "container"
    }

    fn scan(&self, ctx: &ScanContext) -> CategoryResult {
        let Some(descriptor) = &ctx.container else {
            return CategoryResult::not_applicable(
                NEUTRAL_SCORE,
                "No container configuration found",
            );
        };
        let name = ctx.relative(&descriptor.path);
        let content = match std::fs::read_to_string(&descriptor.path) {
            Ok(c) => c,
            Err(e) => {
                return CategoryResult::not_applicable(
                    NEUTRAL_SCORE,
                    format!("Could not read {}: {}", name, e),
                )
            }
        };

        let mut issues = check_rules(descriptor.kind, &content);

        if descriptor.kind == ContainerKind::Dockerfile {
            match self.hadolint(ctx, descriptor) {
                ToolOutcome::Parsed(found) => issues.extend(found),
                ToolOutcome::Unparsable(reason) => return CategoryResult::unparsable(reason),
                ToolOutcome::Unavailable(reason) => {
                    debug!("hadolint unavailable: {}", reason);
                    if issues.is_empty() {
                        return CategoryResult::not_applicable(
                            NEUTRAL_SCORE,
                            format!("Container analyzer unavailable for {}: {}", name, reason),
                        );
                    }
                    let mut result = evaluate(&name, &issues);
                    result
                        .details
                        .push_str(&format!(" (built-in rules only; {})", reason));
                    return result;
                }
            }
        }

        evaluate(&name, &issues)
    }
}
