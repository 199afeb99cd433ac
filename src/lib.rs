//! mcpvet - security assessment for MCP servers
//!
//! Runs a fixed set of category checks (tool poisoning, dependencies,
//! static analysis, container, documentation) over each tracked server
//! version, combines them into one weighted score, and writes the result
//! back into the servers document.

pub mod adapters;
pub mod cli;
pub mod config;
pub mod discovery;
pub mod models;
pub mod orchestrator;
pub mod record;
pub mod reporters;
pub mod scoring;
pub mod source;
pub mod store;
pub mod validate;
