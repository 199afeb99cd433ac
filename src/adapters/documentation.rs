//! Security documentation adapter
//!
//! Built-in check for a dedicated security policy (SECURITY.md and
//! friends, at the root, in `.github/` or in `docs/`) and for a security
//! section in the README.

use super::CategoryAdapter;
use crate::discovery::ScanContext;
use crate::models::{Category, CategoryResult};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

const POLICY_NAMES: &[&str] = &["security.md", "security.txt", "security.rst", "security"];
const README_NAMES: &[&str] = &["readme.md", "readme.markdown", "readme.rst", "readme.txt", "readme"];
const POLICY_DIRS: &[&str] = &["", ".github", "docs"];

fn security_heading() -> &'static Regex {
    static HEADING: OnceLock<Regex> = OnceLock::new();
    HEADING.get_or_init(|| {
        Regex::new(
            r"(?im)^\s{0,3}#{1,6}\s+.*\b(?:security|vulnerabilit\w*|authentication|authorization|permissions)\b",
        )
        .expect("valid regex")
    })
}

fn security_keyword() -> &'static Regex {
    static KEYWORD: OnceLock<Regex> = OnceLock::new();
    KEYWORD.get_or_init(|| {
        Regex::new(r"(?i)\b(?:security|vulnerabilit\w*|authentication|authorization)\b")
            .expect("valid regex")
    })
}

/// Case-insensitive lookup of the first matching file in `dir`
fn find_named(dir: &Path, names: &[&str]) -> Option<PathBuf> {
    let entries = std::fs::read_dir(dir).ok()?;
    let mut found: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
        .filter(|e| names.contains(&e.file_name().to_string_lossy().to_lowercase().as_str()))
        .map(|e| e.path())
        .collect();
    found.sort();
    found.into_iter().next()
}

pub fn find_security_policy(root: &Path) -> Option<PathBuf> {
    POLICY_DIRS
        .iter()
        .find_map(|d| find_named(&root.join(d), POLICY_NAMES))
}

/// Markdown READMEs need a security heading; other formats just a security keyword.
pub fn readme_has_security_section(path: &Path) -> bool {
    let Ok(content) = std::fs::read_to_string(path) else {
        return false;
    };
    let is_markdown = path
        .extension()
        .map(|e| e.eq_ignore_ascii_case("md") || e.eq_ignore_ascii_case("markdown"))
        .unwrap_or(false);
    if is_markdown {
        security_heading().is_match(&content)
    } else {
        security_keyword().is_match(&content)
    }
}

pub struct DocumentationAdapter;

impl CategoryAdapter for DocumentationAdapter {
    fn category(&self) -> Category {
        Category::Documentation
    }

    fn name(&self) -> &'static str {
        "documentation"
    }

    fn scan(&self, ctx: &ScanContext) -> CategoryResult {
        let policy = find_security_policy(&ctx.root);
        let readme = find_named(&ctx.root, README_NAMES);
        let readme_section = readme
            .as_deref()
            .map(readme_has_security_section)
            .unwrap_or(false);

        match (policy, readme_section) {
            (Some(policy), true) => CategoryResult::pass(
                100,
                format!(
                    "Security policy ({}) and README security section found",
                    ctx.relative(&policy)
                ),
            ),
            (Some(policy), false) => CategoryResult::pass(
                100,
                format!("Security policy found: {}", ctx.relative(&policy)),
            ),
            (None, true) => CategoryResult::warning(
                80,
                1,
                "README has a security section but there is no dedicated security policy",
            ),
            (None, false) => CategoryResult::warning(
                60,
                2,
                "No security documentation found (no SECURITY.md, no README security section)",
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CategoryStatus;
    use std::fs;

    fn scan(dir: &Path) -> CategoryResult {
        DocumentationAdapter.scan(&ScanContext::discover(dir))
    }

    #[test]
    fn test_policy_and_readme() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("SECURITY.md"), "Report to sec@example.com").unwrap();
        fs::write(dir.path().join("README.md"), "# Tool\n\n## Security\nSandboxed.\n").unwrap();
        let r = scan(dir.path());
        assert_eq!(r.status, CategoryStatus::Pass);
        assert_eq!(r.score, 100);
        assert_eq!(r.issues_found, Some(0));
    }

    #[test]
    fn test_policy_in_github_dir() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join(".github")).unwrap();
        fs::write(dir.path().join(".github/security.md"), "policy").unwrap();
        let r = scan(dir.path());
        assert_eq!(r.score, 100);
        assert!(r.details.contains(".github/security.md"));
    }

    #[test]
    fn test_readme_section_only() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("README.md"),
            "# Weather\n\n### Authentication\nUse an API key.\n",
        )
        .unwrap();
        let r = scan(dir.path());
        assert_eq!(r.status, CategoryStatus::Warning);
        assert_eq!(r.score, 80);
    }

    #[test]
    fn test_passing_mention_is_not_a_section() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("README.md"),
            "# Weather\n\nNo security guarantees.\n",
        )
        .unwrap();
        let r = scan(dir.path());
        assert_eq!(r.score, 60);
        assert_eq!(r.issues_found, Some(2));
    }

    #[test]
    fn test_plain_text_readme_keyword() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("README"), "Security: report issues privately.\n").unwrap();
        assert_eq!(scan(dir.path()).score, 80);
    }
}
