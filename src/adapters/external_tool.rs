//! Subprocess plumbing for analyzer-backed adapters
//!
//! Every adapter that wraps an external analyzer (mcp-scan, bandit,
//! semgrep, npm audit, hadolint, ...) goes through a [`ToolRunner`], so
//! tests can substitute scripted output for real processes.
//!
//! # Architecture
//!
//! 1. Build a [`ToolInvocation`] from the configured command prefix
//! 2. Run it with a hard timeout; the child is killed when it expires
//! 3. Classify the run into a [`ToolOutcome`]: unavailable, unparsable or parsed

use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Result from running an external tool
#[derive(Debug, Clone)]
pub struct ExternalToolResult {
    /// Whether the tool completed (may still have findings)
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    pub return_code: Option<i32>,
    pub timed_out: bool,
    /// Error message if the tool could not be run to completion
    pub error: Option<String>,
}

impl ExternalToolResult {
    pub fn success(stdout: String, stderr: String, return_code: i32) -> Self {
        Self {
            success: true,
            stdout,
            stderr,
            return_code: Some(return_code),
            timed_out: false,
            error: None,
        }
    }

    pub fn failure(error: String) -> Self {
        Self {
            success: false,
            stdout: String::new(),
            stderr: String::new(),
            return_code: None,
            timed_out: false,
            error: Some(error),
        }
    }

    pub fn timeout(tool_name: &str, timeout_secs: u64) -> Self {
        Self {
            success: false,
            stdout: String::new(),
            stderr: String::new(),
            return_code: None,
            timed_out: true,
            error: Some(format!("{} timed out after {}s", tool_name, timeout_secs)),
        }
    }

    /// Parse stdout as a single JSON document
    pub fn json_output(&self) -> Option<JsonValue> {
        let trimmed = self.stdout.trim();
        if trimmed.is_empty() {
            return None;
        }
        serde_json::from_str(trimmed).ok()
    }

    /// Parse stdout as JSON, skipping any banner text printed before the document.
    pub fn json_output_lenient(&self) -> Option<JsonValue> {
        if let Some(v) = self.json_output() {
            return Some(v);
        }
        let start = self.stdout.find(&['{', '['][..])?;
        let mut stream = serde_json::Deserializer::from_str(&self.stdout[start..]).into_iter();
        stream.next().and_then(|r| r.ok())
    }

    /// Parse stdout as a stream of concatenated JSON documents
    pub fn json_stream(&self) -> Option<Vec<JsonValue>> {
        let values: Result<Vec<JsonValue>, _> =
            serde_json::Deserializer::from_str(&self.stdout).into_iter().collect();
        values.ok().filter(|v| !v.is_empty())
    }

    /// Short description of why the run did not complete
    pub fn failure_reason(&self) -> String {
        self.error
            .clone()
            .unwrap_or_else(|| "tool did not complete".to_string())
    }
}

/// A fully-specified analyzer run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInvocation {
    /// Short name used in logs, reasons and tool_versions
    pub tool_name: String,
    /// Program followed by arguments
    pub command: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub timeout_secs: u64,
}

impl ToolInvocation {
    pub fn new(tool_name: impl Into<String>, prefix: &[String]) -> Self {
        Self {
            tool_name: tool_name.into(),
            command: prefix.to_vec(),
            cwd: None,
            timeout_secs: 0,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.command.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.command.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn path_arg(self, path: &Path) -> Self {
        self.arg(path.to_string_lossy().into_owned())
    }

    pub fn cwd(mut self, dir: &Path) -> Self {
        self.cwd = Some(dir.to_path_buf());
        self
    }

    pub fn timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

/// Seam between adapters and process execution
pub trait ToolRunner: Send + Sync {
    fn run(&self, invocation: &ToolInvocation) -> ExternalToolResult;
}

/// Runs invocations as real subprocesses
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl ToolRunner for SystemRunner {
    fn run(&self, invocation: &ToolInvocation) -> ExternalToolResult {
        run_external_tool(
            &invocation.command,
            &invocation.tool_name,
            invocation.timeout_secs,
            invocation.cwd.as_deref(),
        )
    }
}

/// How an analyzer run turned out
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutcome<T> {
    /// Tool missing, crashed or timed out
    Unavailable(String),
    /// Tool ran but its output could not be interpreted
    Unparsable(String),
    Parsed(T),
}

impl<T> ToolOutcome<T> {
    /// Classify a run: incomplete runs are unavailable, everything else goes to `parse`.
    pub fn classify<F>(result: &ExternalToolResult, parse: F) -> Self
    where
        F: FnOnce(&ExternalToolResult) -> Result<T, String>,
    {
        if !result.success {
            return ToolOutcome::Unavailable(result.failure_reason());
        }
        match parse(result) {
            Ok(parsed) => ToolOutcome::Parsed(parsed),
            Err(reason) => ToolOutcome::Unparsable(reason),
        }
    }
}

/// Run an external tool with standard error handling
///
/// # Arguments
/// * `cmd` - Command and arguments to run
/// * `tool_name` - Human-readable tool name for error messages
/// * `timeout_secs` - Timeout in seconds (0 = no timeout)
/// * `cwd` - Working directory for the tool
pub fn run_external_tool(
    cmd: &[String],
    tool_name: &str,
    timeout_secs: u64,
    cwd: Option<&Path>,
) -> ExternalToolResult {
    let Some((program, args)) = cmd.split_first() else {
        return ExternalToolResult::failure("Empty command".to_string());
    };

    debug!("Running {}: {} {:?}", tool_name, program, args);

    let mut command = Command::new(program);
    command.args(args);
    if let Some(dir) = cwd {
        command.current_dir(dir);
    }
    command.stdin(Stdio::null());
    command.stdout(Stdio::piped());
    command.stderr(Stdio::piped());

    let child = match command.spawn() {
        Ok(child) => child,
        Err(e) => {
            if e.kind() == std::io::ErrorKind::NotFound {
                return ExternalToolResult::failure(format!("{} not found", tool_name));
            }
            return ExternalToolResult::failure(format!("Failed to run {}: {}", tool_name, e));
        }
    };

    wait_with_timeout(child, tool_name, timeout_secs)
}

/// Drain a pipe on its own thread so a chatty tool never blocks on a full buffer.
fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut p) = pipe {
            let _ = p.read_to_end(&mut buf);
        }
        String::from_utf8_lossy(&buf).into_owned()
    })
}

fn wait_with_timeout(mut child: Child, tool_name: &str, timeout_secs: u64) -> ExternalToolResult {
    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    let start = Instant::now();
    let timeout = Duration::from_secs(timeout_secs);

    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => {
                if timeout_secs > 0 && start.elapsed() > timeout {
                    let _ = child.kill();
                    let _ = child.wait();
                    warn!("{} timed out after {}s", tool_name, timeout_secs);
                    return ExternalToolResult::timeout(tool_name, timeout_secs);
                }
                thread::sleep(Duration::from_millis(50));
            }
            Err(e) => {
                let _ = child.kill();
                return ExternalToolResult::failure(format!(
                    "Failed to wait for {}: {}",
                    tool_name, e
                ));
            }
        }
    };

    let stdout = stdout.join().unwrap_or_default();
    let stderr = stderr.join().unwrap_or_default();
    ExternalToolResult::success(stdout, stderr, status.code().unwrap_or(-1))
}

/// Ask a tool for its version string. `None` when the tool is unavailable.
pub fn probe_version(
    runner: &dyn ToolRunner,
    tool_name: &str,
    prefix: &[String],
    timeout_secs: u64,
) -> Option<String> {
    let invocation = ToolInvocation::new(tool_name, prefix)
        .arg("--version")
        .timeout(timeout_secs);
    let result = runner.run(&invocation);
    if !result.success || result.return_code != Some(0) {
        debug!("{} unavailable: {}", tool_name, result.failure_reason());
        return None;
    }
    result
        .stdout
        .lines()
        .chain(result.stderr.lines())
        .map(str::trim)
        .find(|l| !l.is_empty())
        .map(str::to_string)
}

/// Probe every configured tool once per run.
pub fn probe_versions(
    runner: &dyn ToolRunner,
    tools: &[(&str, &[String])],
    timeout_secs: u64,
) -> BTreeMap<String, String> {
    tools
        .iter()
        .filter_map(|(name, prefix)| {
            probe_version(runner, name, prefix, timeout_secs).map(|v| (name.to_string(), v))
        })
        .collect()
}
