//! Source tree discovery
//!
//! Locates the inputs each adapter needs inside a checked-out server
//! version: dependency manifests, container descriptors, MCP
//! configuration files and the dominant implementation language.

use ignore::WalkBuilder;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Directories never worth descending into
const SKIP_DIRS: &[&str] = &[
    ".git",
    "node_modules",
    "vendor",
    "target",
    "dist",
    "build",
    "__pycache__",
    ".venv",
    "venv",
];

/// File names recognised as MCP server or client configuration
const MCP_CONFIG_NAMES: &[&str] = &[
    "mcp.json",
    ".mcp.json",
    "mcp_config.json",
    "mcp-config.json",
    "claude_desktop_config.json",
    "smithery.yaml",
    "smithery.yml",
];

/// Dependency ecosystems with a supported vulnerability scanner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Ecosystem {
    Npm,
    Python,
    Go,
    Rust,
}

impl fmt::Display for Ecosystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ecosystem::Npm => write!(f, "npm"),
            Ecosystem::Python => write!(f, "python"),
            Ecosystem::Go => write!(f, "go"),
            Ecosystem::Rust => write!(f, "rust"),
        }
    }
}

/// A dependency manifest found at the checkout root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    pub ecosystem: Ecosystem,
    pub path: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    Dockerfile,
    Compose,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerDescriptor {
    pub kind: ContainerKind,
    pub path: PathBuf,
}

/// Primary implementation language
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    Python,
    JavaScript,
    TypeScript,
    Go,
    Rust,
    Java,
    Unknown,
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Language::Python => "python",
            Language::JavaScript => "javascript",
            Language::TypeScript => "typescript",
            Language::Go => "go",
            Language::Rust => "rust",
            Language::Java => "java",
            Language::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

impl Language {
    fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "py" => Some(Language::Python),
            "js" | "mjs" | "cjs" | "jsx" => Some(Language::JavaScript),
            "ts" | "mts" | "cts" | "tsx" => Some(Language::TypeScript),
            "go" => Some(Language::Go),
            "rs" => Some(Language::Rust),
            "java" | "kt" => Some(Language::Java),
            _ => None,
        }
    }
}

/// Everything the adapters need to know about a checkout
#[derive(Debug, Clone)]
pub struct ScanContext {
    pub root: PathBuf,
    pub language: Language,
    pub manifests: Vec<Manifest>,
    pub container: Option<ContainerDescriptor>,
    pub mcp_configs: Vec<PathBuf>,
}

impl ScanContext {
    /// Inspect a checkout once; adapters share the result.
    pub fn discover(root: &Path) -> Self {
        let files = walk_files(root);
        let ctx = Self {
            root: root.to_path_buf(),
            language: detect_language(root, &files),
            manifests: find_manifests(root),
            container: find_container_descriptor(root),
            mcp_configs: find_mcp_configs(&files),
        };
        debug!(
            "Discovered {}: language={}, manifests={}, container={}, mcp_configs={}",
            root.display(),
            ctx.language,
            ctx.manifests.len(),
            ctx.container.is_some(),
            ctx.mcp_configs.len()
        );
        ctx
    }

    /// Path relative to the checkout root, for reporting
    pub fn relative(&self, path: &Path) -> String {
        path.strip_prefix(&self.root)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/")
    }
}

/// Walk the tree honouring ignore files, including hidden files, skipping vendored dirs.
pub fn walk_files(root: &Path) -> Vec<PathBuf> {
    WalkBuilder::new(root)
        .hidden(false)
        .git_ignore(true)
        .require_git(false)
        .filter_entry(|entry| {
            let name = entry.file_name().to_string_lossy();
            !(entry.file_type().is_some_and(|t| t.is_dir()) && SKIP_DIRS.contains(&name.as_ref()))
        })
        .build()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_some_and(|t| t.is_file()))
        .map(|e| e.into_path())
        .collect()
}

pub fn find_manifests(root: &Path) -> Vec<Manifest> {
    let candidates = [
        ("package.json", Ecosystem::Npm),
        ("requirements.txt", Ecosystem::Python),
        ("go.mod", Ecosystem::Go),
        ("Cargo.toml", Ecosystem::Rust),
    ];
    candidates
        .into_iter()
        .map(|(name, ecosystem)| (root.join(name), ecosystem))
        .filter(|(path, _)| path.is_file())
        .map(|(path, ecosystem)| Manifest { ecosystem, path })
        .collect()
}

/// A Dockerfile wins over a compose file when both exist.
pub fn find_container_descriptor(root: &Path) -> Option<ContainerDescriptor> {
    let candidates = [
        ("Dockerfile", ContainerKind::Dockerfile),
        ("Containerfile", ContainerKind::Dockerfile),
        ("docker-compose.yml", ContainerKind::Compose),
        ("docker-compose.yaml", ContainerKind::Compose),
        ("compose.yml", ContainerKind::Compose),
        ("compose.yaml", ContainerKind::Compose),
    ];
    candidates
        .into_iter()
        .map(|(name, kind)| ContainerDescriptor {
            kind,
            path: root.join(name),
        })
        .find(|d| d.path.is_file())
}

fn is_mcp_config(path: &Path) -> bool {
    let Some(name) = path.file_name().map(|n| n.to_string_lossy().to_lowercase()) else {
        return false;
    };
    if MCP_CONFIG_NAMES.contains(&name.as_str()) {
        return true;
    }
    if name == "config.json" {
        return path
            .parent()
            .and_then(|p| p.file_name())
            .is_some_and(|d| d == ".claude");
    }
    name.ends_with(".json") && name.contains("mcp")
}

/// Named MCP configs, `.claude/config.json`, and any JSON file with `mcp` in its name.
pub fn find_mcp_configs(files: &[PathBuf]) -> Vec<PathBuf> {
    let mut configs: Vec<PathBuf> = files.iter().filter(|p| is_mcp_config(p)).cloned().collect();
    configs.sort();
    configs
}

/// Root indicator files first; otherwise the most common source extension.
pub fn detect_language(root: &Path, files: &[PathBuf]) -> Language {
    let indicators = [
        ("pyproject.toml", Language::Python),
        ("requirements.txt", Language::Python),
        ("setup.py", Language::Python),
        ("tsconfig.json", Language::TypeScript),
        ("go.mod", Language::Go),
        ("Cargo.toml", Language::Rust),
        ("pom.xml", Language::Java),
        ("build.gradle", Language::Java),
        ("build.gradle.kts", Language::Java),
    ];
    if let Some((_, lang)) = indicators.iter().find(|(name, _)| root.join(name).is_file()) {
        return *lang;
    }

    let mut counts: HashMap<Language, usize> = HashMap::new();
    for file in files {
        if let Some(lang) = file
            .extension()
            .and_then(|e| e.to_str())
            .and_then(Language::from_extension)
        {
            *counts.entry(lang).or_default() += 1;
        }
    }
    if let Some((lang, _)) = counts
        .into_iter()
        .max_by_key(|(lang, count)| (*count, std::cmp::Reverse(*lang as u8)))
    {
        return lang;
    }

    if root.join("package.json").is_file() {
        return Language::JavaScript;
    }
    Language::Unknown
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn touch(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_discovers_manifests_and_container() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "package.json", "{}");
        touch(dir.path(), "requirements.txt", "requests==2.0\n");
        touch(dir.path(), "docker-compose.yml", "services: {}\n");
        touch(dir.path(), "Dockerfile", "FROM alpine\n");

        let ctx = ScanContext::discover(dir.path());
        let ecosystems: Vec<Ecosystem> = ctx.manifests.iter().map(|m| m.ecosystem).collect();
        assert_eq!(ecosystems, vec![Ecosystem::Npm, Ecosystem::Python]);
        assert_eq!(ctx.container.unwrap().kind, ContainerKind::Dockerfile);
        assert_eq!(ctx.language, Language::Python);
    }

    #[test]
    fn test_finds_hidden_mcp_config_but_not_in_node_modules() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), ".mcp.json", "{}");
        touch(dir.path(), "config/mcp.json", "{}");
        touch(dir.path(), "node_modules/pkg/mcp.json", "{}");

        let ctx = ScanContext::discover(dir.path());
        let rel: Vec<String> = ctx.mcp_configs.iter().map(|p| ctx.relative(p)).collect();
        assert_eq!(rel, vec![".mcp.json".to_string(), "config/mcp.json".to_string()]);
    }

    #[test]
    fn test_mcp_config_name_variants() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "servers.mcp.json", "{}");
        touch(dir.path(), "my-mcp-settings.json", "{}");
        touch(dir.path(), ".claude/config.json", "{}");
        touch(dir.path(), "config.json", "{}");
        touch(dir.path(), "mcp-notes.md", "");

        let ctx = ScanContext::discover(dir.path());
        let rel: Vec<String> = ctx.mcp_configs.iter().map(|p| ctx.relative(p)).collect();
        assert_eq!(
            rel,
            vec![
                ".claude/config.json".to_string(),
                "my-mcp-settings.json".to_string(),
                "servers.mcp.json".to_string()
            ]
        );
    }

    #[test]
    fn test_typescript_detected_from_tsconfig_even_with_package_json() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "package.json", "{}");
        touch(dir.path(), "tsconfig.json", "{}");
        let files = walk_files(dir.path());
        assert_eq!(detect_language(dir.path(), &files), Language::TypeScript);
    }

    #[test]
    fn test_language_by_extension_majority() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "src/a.go", "");
        touch(dir.path(), "src/b.go", "");
        touch(dir.path(), "scripts/c.py", "");
        let files = walk_files(dir.path());
        assert_eq!(detect_language(dir.path(), &files), Language::Go);
    }

    #[test]
    fn test_empty_tree_is_unknown() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ScanContext::discover(dir.path());
        assert_eq!(ctx.language, Language::Unknown);
        assert!(ctx.manifests.is_empty());
        assert!(ctx.container.is_none());
        assert!(ctx.mcp_configs.is_empty());
    }
}
