//! Configuration module for mcpvet
//!
//! This module handles:
//! - Scanner configuration (mcpvet.toml / .mcpvet.json / user config dir)
//! - Analyzer command overrides and version pinning
//! - Timeouts, worker counts and skipped categories

mod scan_config;

pub use scan_config::{
    load_config_file, load_scan_config, user_config_path, ScanConfig, ScanSettings,
    SourceSettings, ToolCommands, CONFIG_FILE_NAME, JSON_CONFIG_FILE_NAME,
};
