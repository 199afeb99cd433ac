//! Scanner configuration support
//!
//! Loads configuration from `mcpvet.toml` or `.mcpvet.json` in the working
//! directory, falling back to `<config dir>/mcpvet/config.toml`.
//!
//! # Configuration Format
//!
//! ```toml
//! # mcpvet.toml
//!
//! [scan]
//! workers = 4
//! tool_timeout_secs = 120
//! adapter_timeout_secs = 300
//! skip_categories = ["container"]
//!
//! [tools]
//! mcp_scan = ["uvx", "mcp-scan@0.3.4"]
//! semgrep = ["/opt/semgrep/bin/semgrep"]
//!
//! [source]
//! sources_dir = "./checkouts"
//! ```

use crate::models::Category;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const CONFIG_FILE_NAME: &str = "mcpvet.toml";
pub const JSON_CONFIG_FILE_NAME: &str = ".mcpvet.json";

/// Top-level scanner configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    pub scan: ScanSettings,
    pub tools: ToolCommands,
    pub source: SourceSettings,
}

/// Concurrency and timeout knobs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanSettings {
    /// Versions scanned in parallel (CLI --workers overrides)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workers: Option<usize>,
    /// Per analyzer process
    pub tool_timeout_secs: u64,
    /// Per category adapter, covering every tool run it makes
    pub adapter_timeout_secs: u64,
    /// For `--version` probes
    pub version_probe_timeout_secs: u64,
    pub skip_categories: Vec<Category>,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            workers: None,
            tool_timeout_secs: 120,
            adapter_timeout_secs: 300,
            version_probe_timeout_secs: 15,
            skip_categories: Vec::new(),
        }
    }
}

/// Command prefixes for each analyzer. Arguments are appended per run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolCommands {
    pub mcp_scan: Vec<String>,
    pub bandit: Vec<String>,
    pub semgrep: Vec<String>,
    pub eslint: Vec<String>,
    pub npm: Vec<String>,
    pub safety: Vec<String>,
    pub govulncheck: Vec<String>,
    pub cargo_audit: Vec<String>,
    pub hadolint: Vec<String>,
}

fn cmd(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

impl Default for ToolCommands {
    fn default() -> Self {
        Self {
            mcp_scan: cmd(&["uvx", "mcp-scan@latest"]),
            bandit: cmd(&["bandit"]),
            semgrep: cmd(&["semgrep"]),
            eslint: cmd(&["eslint"]),
            npm: cmd(&["npm"]),
            safety: cmd(&["safety"]),
            govulncheck: cmd(&["govulncheck"]),
            cargo_audit: cmd(&["cargo", "audit"]),
            hadolint: cmd(&["hadolint"]),
        }
    }
}

impl ToolCommands {
    /// Every configured tool with its command prefix, in a stable order
    pub fn all(&self) -> Vec<(&'static str, &[String])> {
        vec![
            ("mcp-scan", self.mcp_scan.as_slice()),
            ("bandit", self.bandit.as_slice()),
            ("semgrep", self.semgrep.as_slice()),
            ("eslint", self.eslint.as_slice()),
            ("npm", self.npm.as_slice()),
            ("safety", self.safety.as_slice()),
            ("govulncheck", self.govulncheck.as_slice()),
            ("cargo-audit", self.cargo_audit.as_slice()),
            ("hadolint", self.hadolint.as_slice()),
        ]
    }
}

/// Where server sources come from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceSettings {
    /// Local checkouts laid out as `<dir>/<slug>/<version>` or `<dir>/<slug>`.
    /// When unset, repositories are cloned.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sources_dir: Option<PathBuf>,
    /// Upper bound on one repository clone
    pub clone_timeout_secs: u64,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            sources_dir: None,
            clone_timeout_secs: 600,
        }
    }
}

impl ScanConfig {
    pub fn is_skipped(&self, category: Category) -> bool {
        self.scan.skip_categories.contains(&category)
    }

    /// Default configuration as commented TOML, for `mcpvet init`
    pub fn default_toml() -> String {
        let body = toml::to_string_pretty(&ScanConfig::default()).unwrap_or_default();
        format!(
            "# mcpvet configuration\n\
             # Tool commands are prefixes; mcpvet appends the scan arguments.\n\
             # skip_categories accepts: tool-poisoning, dependency, static-analysis, container, documentation\n\n{}",
            body
        )
    }
}

/// Load configuration from an explicit path. Errors are fatal here.
pub fn load_config_file(path: &Path) -> anyhow::Result<ScanConfig> {
    let is_json = path
        .extension()
        .map(|e| e.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    if is_json {
        load_json_config(path)
    } else {
        load_toml_config(path)
    }
    .with_context(|| format!("Failed to load config {}", path.display()))
}

/// Discover configuration next to `dir`, then in the user config directory.
///
/// Unreadable files are logged and skipped.
pub fn load_scan_config(dir: &Path) -> ScanConfig {
    let toml_path = dir.join(CONFIG_FILE_NAME);
    if toml_path.exists() {
        match load_toml_config(&toml_path) {
            Ok(config) => {
                debug!("Loaded config from {}", toml_path.display());
                return config;
            }
            Err(e) => {
                warn!("Failed to load {}: {}", toml_path.display(), e);
            }
        }
    }

    let json_path = dir.join(JSON_CONFIG_FILE_NAME);
    if json_path.exists() {
        match load_json_config(&json_path) {
            Ok(config) => {
                debug!("Loaded config from {}", json_path.display());
                return config;
            }
            Err(e) => {
                warn!("Failed to load {}: {}", json_path.display(), e);
            }
        }
    }

    if let Some(user_path) = user_config_path() {
        if user_path.exists() {
            match load_toml_config(&user_path) {
                Ok(config) => {
                    debug!("Loaded user config from {}", user_path.display());
                    return config;
                }
                Err(e) => {
                    warn!("Failed to load {}: {}", user_path.display(), e);
                }
            }
        }
    }

    debug!("No config found, using defaults");
    ScanConfig::default()
}

pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("mcpvet").join("config.toml"))
}

fn load_toml_config(path: &Path) -> anyhow::Result<ScanConfig> {
    let content = std::fs::read_to_string(path)?;
    let config: ScanConfig = toml::from_str(&content)?;
    Ok(config)
}

fn load_json_config(path: &Path) -> anyhow::Result<ScanConfig> {
    let content = std::fs::read_to_string(path)?;
    let config: ScanConfig = serde_json::from_str(&content)?;
    Ok(config)
}
