//! External analyzer (pass B)
//!
//! Runs a configured static analyzer as a subprocess and parses its JSON
//! report. The invocation is bounded by a timeout; a timeout, a spawn
//! failure, an unexpected exit code or a malformed report all degrade to
//! "no findings from this pass" and are logged, never propagated.

use super::{FindingOrigin, Level, SecurityFinding, Thresholds};
use crate::core::error::{HostError, HostResult};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

/// Exit codes meaning "clean" and "issues found"
pub const ACCEPTED_EXIT_CODES: &[i32] = &[0, 1];

/// How to invoke the external analyzer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalToolConfig {
    /// Run the tool at all
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Executable name or path
    #[serde(default = "default_program")]
    pub program: String,

    /// Argument template; `{severity}`, `{confidence}` and `{target}` are
    /// substituted per invocation
    #[serde(default = "default_args")]
    pub args: Vec<String>,

    /// Upper bound on a single invocation
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_enabled() -> bool {
    true
}

fn default_program() -> String {
    "lua-audit".to_string()
}

fn default_args() -> Vec<String> {
    [
        "-f",
        "json",
        "--severity-level",
        "{severity}",
        "--confidence-level",
        "{confidence}",
        "-r",
        "{target}",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for ExternalToolConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            program: default_program(),
            args: default_args(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl ExternalToolConfig {
    /// Expand the argument template for one target
    pub fn render_args(&self, target: &Path, thresholds: Thresholds) -> Vec<String> {
        let target = target.to_string_lossy();
        self.args
            .iter()
            .map(|arg| {
                arg.replace("{severity}", thresholds.severity.as_arg())
                    .replace("{confidence}", thresholds.confidence.as_arg())
                    .replace("{target}", &target)
            })
            .collect()
    }
}

/// How the external pass ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExternalStatus {
    /// The pass is switched off in configuration
    Disabled,
    /// The tool ran and its report was parsed
    Completed,
    /// The tool could not run or produced nothing usable
    Unavailable(String),
    /// The tool exceeded its timeout and was killed
    TimedOut,
}

/// Findings plus status of one external run
#[derive(Debug, Clone)]
pub struct ExternalOutcome {
    pub status: ExternalStatus,
    pub findings: Vec<SecurityFinding>,
}

impl ExternalOutcome {
    pub(crate) fn empty(status: ExternalStatus) -> Self {
        Self {
            status,
            findings: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ToolReport {
    #[serde(default)]
    results: Vec<ToolIssue>,
}

#[derive(Debug, Deserialize)]
struct ToolIssue {
    #[serde(alias = "issue_severity")]
    severity: String,
    #[serde(alias = "issue_confidence")]
    confidence: String,
    #[serde(alias = "issue_text", default)]
    description: String,
    #[serde(alias = "line_number", default)]
    line: usize,
    #[serde(default)]
    code: String,
}

/// Unrecognized levels read as HIGH so they cannot slip under a threshold
fn reported_level(field: &'static str, raw: &str) -> Level {
    Level::parse(raw).unwrap_or_else(|| {
        warn!(field, value = raw, "unrecognized level in external report; treating as HIGH");
        Level::High
    })
}

impl ToolIssue {
    fn into_finding(self) -> SecurityFinding {
        SecurityFinding {
            severity: reported_level("severity", &self.severity),
            confidence: reported_level("confidence", &self.confidence),
            description: self.description,
            line: self.line,
            snippet: self.code.trim_end().to_string(),
            origin: FindingOrigin::ExternalTool,
        }
    }
}

/// Parse a JSON report, keeping findings that pass the thresholds
pub fn parse_report(stdout: &str, thresholds: Thresholds) -> HostResult<Vec<SecurityFinding>> {
    if stdout.trim().is_empty() {
        return Ok(Vec::new());
    }

    let report: ToolReport = serde_json::from_str(stdout)?;
    Ok(report
        .results
        .into_iter()
        .map(ToolIssue::into_finding)
        .filter(|f| thresholds.admits(f.severity, f.confidence))
        .collect())
}

/// Runs the configured analyzer
pub struct ExternalAnalyzer {
    config: ExternalToolConfig,
    timeout: Duration,
}

enum RunError {
    TimedOut,
    Unavailable(HostError),
}

impl ExternalAnalyzer {
    /// Create an analyzer from configuration
    pub fn new(config: ExternalToolConfig) -> Self {
        let timeout = Duration::from_secs(config.timeout_secs);
        Self { config, timeout }
    }

    /// Override the configured timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Run the tool against `target`. Blocks the calling thread; must not be
    /// called from inside an async runtime.
    pub fn run(&self, target: &Path, thresholds: Thresholds) -> ExternalOutcome {
        match self.invoke(target, thresholds) {
            Ok(findings) => {
                debug!(
                    tool = %self.config.program,
                    path = %target.display(),
                    findings = findings.len(),
                    "external analysis completed"
                );
                ExternalOutcome {
                    status: ExternalStatus::Completed,
                    findings,
                }
            }
            Err(RunError::TimedOut) => {
                warn!(
                    tool = %self.config.program,
                    path = %target.display(),
                    timeout_ms = self.timeout.as_millis() as u64,
                    "external analyzer timed out; continuing with structural findings only"
                );
                ExternalOutcome::empty(ExternalStatus::TimedOut)
            }
            Err(RunError::Unavailable(err)) => {
                warn!(path = %target.display(), error = %err, "external analyzer unavailable");
                ExternalOutcome::empty(ExternalStatus::Unavailable(err.to_string()))
            }
        }
    }

    /// Run the tool against a private copy of `bytes`, so it sees exactly
    /// the source the caller already read from `path`
    pub fn run_snapshot(&self, path: &Path, bytes: &[u8], thresholds: Thresholds) -> ExternalOutcome {
        let suffix = path
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy()))
            .unwrap_or_default();
        let snapshot = tempfile::Builder::new()
            .prefix("nexushound-")
            .suffix(&suffix)
            .tempfile()
            .and_then(|mut file| {
                file.write_all(bytes)?;
                file.flush()?;
                Ok(file)
            });

        match snapshot {
            Ok(file) => {
                debug!(path = %path.display(), snapshot = %file.path().display(), "analyzing snapshot");
                self.run(file.path(), thresholds)
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "cannot write analysis snapshot");
                ExternalOutcome::empty(ExternalStatus::Unavailable(format!(
                    "cannot write analysis snapshot: {}",
                    e
                )))
            }
        }
    }

    fn unavailable(&self, reason: impl Into<String>) -> RunError {
        RunError::Unavailable(HostError::ToolUnavailable {
            tool: self.config.program.clone(),
            reason: reason.into(),
        })
    }

    fn invoke(&self, target: &Path, thresholds: Thresholds) -> Result<Vec<SecurityFinding>, RunError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| self.unavailable(format!("cannot start runtime: {}", e)))?;

        let args = self.config.render_args(target, thresholds);
        let output = runtime.block_on(async {
            let child = Command::new(&self.config.program)
                .args(&args)
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true)
                .spawn()
                .map_err(|e| self.unavailable(format!("spawn failed: {}", e)))?;

            match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
                Ok(result) => result.map_err(|e| self.unavailable(format!("wait failed: {}", e))),
                Err(_) => Err(RunError::TimedOut),
            }
        })?;

        match output.status.code() {
            Some(code) if ACCEPTED_EXIT_CODES.contains(&code) => {}
            Some(code) => return Err(self.unavailable(format!("exit status {}", code))),
            None => return Err(self.unavailable("terminated by signal")),
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_report(&stdout, thresholds)
            .map_err(|e| self.unavailable(format!("malformed report: {}", e)))
    }
}
