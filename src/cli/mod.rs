//! CLI command definitions and handlers

mod doctor;
mod init;
mod scan;
mod validate;

use crate::config::{load_config_file, load_scan_config, ScanConfig};
use crate::models::Category;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

/// Parse and validate workers count (1-64)
fn parse_workers(s: &str) -> Result<usize, String> {
    let n: usize = s
        .parse()
        .map_err(|_| format!("'{}' is not a valid number", s))?;
    if n == 0 {
        Err("workers must be at least 1".to_string())
    } else if n > 64 {
        Err("workers cannot exceed 64".to_string())
    } else {
        Ok(n)
    }
}

/// mcpvet - security assessment for MCP servers
#[derive(Parser, Debug)]
#[command(name = "mcpvet")]
#[command(
    version,
    about = "Security assessment for MCP servers: run analyzers over every tracked version and record a weighted score",
    after_help = "\
Examples:
  mcpvet scan --input servers.json                     Scan every version, update in place
  mcpvet scan -i servers.json -o out.json --server-slug github
  mcpvet scan -i servers.json --sources-dir ./checkouts --format json
  mcpvet validate --data servers.json                  Check the servers document
  mcpvet doctor                                        Show which analyzers are installed"
)]
pub struct Cli {
    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info", value_parser = ["error", "warn", "info", "debug", "trace"])]
    pub log_level: String,

    /// Versions scanned in parallel (1-64)
    #[arg(long, global = true, value_parser = parse_workers)]
    pub workers: Option<usize>,

    /// Config file (TOML, or JSON by extension). Overrides discovery.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Scan server versions and write assessment records
    Scan {
        /// Servers document to read
        #[arg(long, short)]
        input: PathBuf,

        /// Where to write the updated document (default: overwrite input)
        #[arg(long, short)]
        output: Option<PathBuf>,

        /// Only scan this server
        #[arg(long)]
        server_slug: Option<String>,

        /// Use local checkouts under this directory instead of cloning
        #[arg(long)]
        sources_dir: Option<PathBuf>,

        /// Report format (text, json)
        #[arg(long, short, default_value = "text")]
        format: String,

        /// Write the run report to a file instead of stdout
        #[arg(long)]
        report: Option<PathBuf>,

        /// Omit a category from scoring (repeatable)
        #[arg(long = "skip-category")]
        skip_category: Vec<Category>,
    },

    /// Check which external analyzers are available
    Doctor,

    /// Validate a servers document
    Validate {
        /// Servers document to check
        #[arg(long, short, default_value = "servers.json")]
        data: PathBuf,
    },

    /// Write a default mcpvet.toml
    Init {
        /// Directory to write into
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },
}

/// Explicit `--config` wins and must load; otherwise discover from the working directory.
fn load_config(explicit: Option<&Path>) -> Result<ScanConfig> {
    match explicit {
        Some(path) => load_config_file(path),
        None => {
            let cwd = std::env::current_dir().context("Failed to read working directory")?;
            Ok(load_scan_config(&cwd))
        }
    }
}

/// Run the CLI with parsed arguments
pub fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Scan {
            input,
            output,
            server_slug,
            sources_dir,
            format,
            report,
            skip_category,
        } => {
            let config = load_config(cli.config.as_deref())?;
            scan::run(
                scan::ScanArgs {
                    input,
                    output,
                    server_slug,
                    sources_dir,
                    format,
                    report,
                    skip_categories: skip_category,
                    workers: cli.workers,
                },
                config,
            )
        }

        Commands::Doctor => {
            let config = load_config(cli.config.as_deref())?;
            doctor::run(&config)
        }

        Commands::Validate { data } => validate::run(&data),

        Commands::Init { path, force } => init::run(&path, force),
    }
}
