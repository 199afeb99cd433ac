//! Built-in tool poisoning heuristics
//!
//! Used when the MCP scanner is unavailable. Scans JSON, YAML, Markdown
//! and text files for instruction-override phrasing and for invisible
//! Unicode that can hide instructions from a human reviewer.
//!
//! Pattern fallback results are capped below what a clean run of the
//! dedicated scanner earns, since a phrase table cannot prove absence.

use crate::discovery::walk_files;
use crate::models::{CategoryResult, Severity};
use regex::Regex;
use serde_json::Value as JsonValue;
use std::path::Path;
use std::sync::OnceLock;
use tracing::{debug, warn};

/// Bumped whenever the table below changes.
pub const PATTERN_TABLE_VERSION: u32 = 2;

/// Highest score the fallback may award.
pub const FALLBACK_PASS_SCORE: u32 = 90;

const SCANNED_EXTENSIONS: &[&str] = &["json", "yaml", "yml", "md", "txt"];
const MAX_FILE_BYTES: u64 = 1024 * 1024;

pub struct PoisoningPattern {
    pub id: &'static str,
    pub pattern: &'static str,
    pub severity: Severity,
}

/// Ordered, versioned phrase table. Matched case-insensitively.
pub const POISONING_PATTERNS: &[PoisoningPattern] = &[
    PoisoningPattern {
        id: "ignore-previous-instructions",
        pattern: r"ignore\s+(?:all\s+)?(?:previous|prior)\s+instructions",
        severity: Severity::High,
    },
    PoisoningPattern {
        id: "disregard-above",
        pattern: r"disregard\s+(?:\S+\s+){0,4}above",
        severity: Severity::High,
    },
    PoisoningPattern {
        id: "forget-everything",
        pattern: r"forget\s+everything",
        severity: Severity::High,
    },
    PoisoningPattern {
        id: "new-instructions",
        pattern: r"new\s+instructions\s*:",
        severity: Severity::Medium,
    },
    PoisoningPattern {
        id: "override-security",
        pattern: r"override\s+(?:the\s+|all\s+)?security",
        severity: Severity::High,
    },
    PoisoningPattern {
        id: "bypass-restrictions",
        pattern: r"bypass\s+(?:all\s+|any\s+|the\s+)?restrictions",
        severity: Severity::High,
    },
    PoisoningPattern {
        id: "conceal-from-user",
        pattern: r"do\s+not\s+(?:tell|inform|alert|mention\s+(?:this\s+)?to)\s+the\s+user",
        severity: Severity::Medium,
    },
    PoisoningPattern {
        id: "important-tag",
        pattern: r"<\s*/?\s*important\s*>",
        severity: Severity::Medium,
    },
];

fn compiled_patterns() -> &'static [(&'static PoisoningPattern, Regex)] {
    static COMPILED: OnceLock<Vec<(&'static PoisoningPattern, Regex)>> = OnceLock::new();
    COMPILED.get_or_init(|| {
        POISONING_PATTERNS
            .iter()
            .filter_map(|p| match Regex::new(&format!("(?i){}", p.pattern)) {
                Ok(re) => Some((p, re)),
                Err(e) => {
                    warn!("Skipping poisoning pattern {}: {}", p.id, e);
                    None
                }
            })
            .collect()
    })
}

/// Zero-width, bidi-control and tag characters that render as nothing.
pub fn is_invisible(c: char) -> bool {
    matches!(
        c,
        '\u{00AD}'
            | '\u{180E}'
            | '\u{200B}'..='\u{200F}'
            | '\u{202A}'..='\u{202E}'
            | '\u{2060}'..='\u{2064}'
            | '\u{2066}'..='\u{2069}'
            | '\u{FEFF}'
            | '\u{E0000}'..='\u{E007F}'
    )
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndicatorKind {
    Phrase { pattern_id: &'static str },
    InvisibleUnicode { code_point: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Indicator {
    pub file: String,
    pub kind: IndicatorKind,
    pub severity: Severity,
}

/// Indicators found in a tree, at most one per (file, pattern).
#[derive(Debug, Clone, Default)]
pub struct PoisoningReport {
    pub files_scanned: usize,
    pub indicators: Vec<Indicator>,
}

/// Scan a piece of text. A leading byte-order mark is tolerated.
pub fn scan_text(file: &str, text: &str) -> Vec<Indicator> {
    let mut found = Vec::new();

    for (pattern, re) in compiled_patterns() {
        if re.is_match(text) {
            found.push(Indicator {
                file: file.to_string(),
                kind: IndicatorKind::Phrase {
                    pattern_id: pattern.id,
                },
                severity: pattern.severity,
            });
        }
    }

    let body = text.strip_prefix('\u{FEFF}').unwrap_or(text);
    if let Some(c) = body.chars().find(|c| is_invisible(*c)) {
        found.push(Indicator {
            file: file.to_string(),
            kind: IndicatorKind::InvisibleUnicode {
                code_point: c as u32,
            },
            severity: Severity::Critical,
        });
    }

    found
}

/// Concatenate every string value in a JSON document, so escaped characters are decoded.
fn json_strings(value: &JsonValue, out: &mut String) {
    match value {
        JsonValue::String(s) => {
            out.push_str(s);
            out.push('\n');
        }
        JsonValue::Array(items) => items.iter().for_each(|v| json_strings(v, out)),
        JsonValue::Object(map) => {
            for (k, v) in map {
                out.push_str(k);
                out.push('\n');
                json_strings(v, out);
            }
        }
        _ => {}
    }
}

/// Scan every candidate file under `root`.
pub fn scan_tree(root: &Path) -> PoisoningReport {
    let mut report = PoisoningReport::default();

    for path in walk_files(root) {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        if !SCANNED_EXTENSIONS.contains(&ext.as_str()) {
            continue;
        }
        if std::fs::metadata(&path).map(|m| m.len() > MAX_FILE_BYTES).unwrap_or(true) {
            continue;
        }
        let Ok(content) = std::fs::read_to_string(&path) else {
            continue;
        };
        let rel = path
            .strip_prefix(root)
            .unwrap_or(&path)
            .to_string_lossy()
            .replace('\\', "/");

        let mut text = content.clone();
        if ext == "json" {
            if let Ok(value) = serde_json::from_str::<JsonValue>(&content) {
                let mut decoded = String::new();
                json_strings(&value, &mut decoded);
                text.push('\n');
                text.push_str(&decoded);
            }
        }

        report.files_scanned += 1;
        report.indicators.extend(scan_text(&rel, &text));
    }

    debug!(
        "Poisoning fallback scanned {} files, {} indicators",
        report.files_scanned,
        report.indicators.len()
    );
    report
}

impl PoisoningReport {
    /// Score the fallback scan. `reason` says why the dedicated scanner was not used.
    pub fn evaluate(&self, reason: &str) -> CategoryResult {
        let issues = self.indicators.len() as u32;
        let prefix = format!("Pattern fallback (table v{}; {})", PATTERN_TABLE_VERSION, reason);

        if issues == 0 {
            return CategoryResult::pass(
                FALLBACK_PASS_SCORE,
                format!(
                    "{}: no tool poisoning indicators in {} file(s)",
                    prefix, self.files_scanned
                ),
            );
        }

        let listing: Vec<String> = self
            .indicators
            .iter()
            .take(5)
            .map(|i| match &i.kind {
                IndicatorKind::Phrase { pattern_id } => format!("{} in {}", pattern_id, i.file),
                IndicatorKind::InvisibleUnicode { code_point } => {
                    format!("invisible U+{:04X} in {}", code_point, i.file)
                }
            })
            .collect();
        let details = format!(
            "{}: {} indicator(s): {}",
            prefix,
            issues,
            listing.join(", ")
        );

        let severe = self
            .indicators
            .iter()
            .any(|i| i.severity == Severity::Critical);
        if issues == 1 && !severe {
            CategoryResult::warning(60, issues, details)
        } else {
            let score = 40u32.saturating_sub(10 * (issues - 1)).max(10);
            CategoryResult::fail(score, issues, details)
        }
    }
}
