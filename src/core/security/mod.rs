//! Security Analyzer
//!
//! Two independent passes vet a plugin file before it is ever executed:
//!
//! - **Structural scan** ([`structural`]): walks the syntax tree looking for
//!   dangerous imports, dynamic code execution and risky `module.field` access.
//! - **External tool** ([`external`]): runs a configured static analyzer as a
//!   subprocess with a bounded timeout and folds its JSON report in.
//!
//! The verdict is the AND of both passes. A CRITICAL structural finding or a
//! HIGH external finding makes the file unsafe. The analysis is advisory:
//! nothing here confines what an approved plugin does at runtime.

pub mod external;
pub mod structural;

pub use external::{ExternalAnalyzer, ExternalOutcome, ExternalStatus, ExternalToolConfig};

use nexus_syntax::SyntaxInspector;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, warn};

// ============================================================================
// Levels and Thresholds
// ============================================================================

/// Severity or confidence of a finding
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Level {
    Low,
    Medium,
    High,
}

impl Level {
    /// Uppercase display name
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Low => "LOW",
            Level::Medium => "MEDIUM",
            Level::High => "HIGH",
        }
    }

    /// Lowercase form passed on analyzer command lines
    pub fn as_arg(&self) -> &'static str {
        match self {
            Level::Low => "low",
            Level::Medium => "medium",
            Level::High => "high",
        }
    }

    /// Parse a level name, ignoring case
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "LOW" => Some(Level::Low),
            "MEDIUM" => Some(Level::Medium),
            "HIGH" => Some(Level::High),
            _ => None,
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Level {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Level::parse(s).ok_or_else(|| format!("unknown level '{}' (expected low, medium or high)", s))
    }
}

/// Minimum severity and confidence an external finding needs to count
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thresholds {
    #[serde(default = "default_confidence")]
    pub confidence: Level,
    #[serde(default = "default_severity")]
    pub severity: Level,
}

fn default_confidence() -> Level {
    Level::High
}

fn default_severity() -> Level {
    Level::Medium
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            confidence: default_confidence(),
            severity: default_severity(),
        }
    }
}

impl Thresholds {
    /// Whether a finding with these levels passes both thresholds
    pub fn admits(&self, severity: Level, confidence: Level) -> bool {
        severity >= self.severity && confidence >= self.confidence
    }
}

// ============================================================================
// Findings
// ============================================================================

/// Which pass produced a finding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingOrigin {
    StructuralScan,
    ExternalTool,
}

/// A single security observation about a source file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityFinding {
    pub severity: Level,
    pub confidence: Level,
    pub description: String,
    pub line: usize,
    pub snippet: String,
    pub origin: FindingOrigin,
}

impl SecurityFinding {
    /// A structural finding that blocks loading on its own
    pub fn critical(description: impl Into<String>, line: usize, snippet: impl Into<String>) -> Self {
        Self {
            severity: Level::High,
            confidence: Level::High,
            description: description.into(),
            line,
            snippet: snippet.into(),
            origin: FindingOrigin::StructuralScan,
        }
    }

    /// A structural finding that is reported but does not block
    pub fn warning(description: impl Into<String>, line: usize, snippet: impl Into<String>) -> Self {
        Self {
            severity: Level::Medium,
            confidence: Level::High,
            description: description.into(),
            line,
            snippet: snippet.into(),
            origin: FindingOrigin::StructuralScan,
        }
    }

    /// CRITICAL structural finding
    pub fn is_critical(&self) -> bool {
        self.origin == FindingOrigin::StructuralScan && self.severity == Level::High
    }

    /// Tag used when rendering structural findings
    pub fn tag(&self) -> &'static str {
        if self.is_critical() {
            "CRITICAL"
        } else {
            "WARNING"
        }
    }

    fn render_structural(&self) -> String {
        format!("{}: {} at line {}", self.tag(), self.description, self.line)
    }

    fn render_external(&self) -> String {
        format!(
            "- {} severity ({} confidence): {} at line {}\n  Code: {}",
            self.severity, self.confidence, self.description, self.line, self.snippet
        )
    }
}

// ============================================================================
// Report
// ============================================================================

/// Header of the rendered external findings block
pub const EXTERNAL_HEADER: &str = "External analyzer findings:";

/// Merged output of both passes for one file
#[derive(Debug, Clone)]
pub struct SecurityReport {
    pub path: PathBuf,
    /// Structural findings first, then external findings
    pub findings: Vec<SecurityFinding>,
    pub external: ExternalStatus,
}

impl SecurityReport {
    /// No CRITICAL structural finding
    pub fn structural_safe(&self) -> bool {
        !self.findings.iter().any(SecurityFinding::is_critical)
    }

    /// No HIGH external finding
    pub fn external_safe(&self) -> bool {
        !self
            .findings
            .iter()
            .any(|f| f.origin == FindingOrigin::ExternalTool && f.severity == Level::High)
    }

    /// Overall verdict
    pub fn is_safe(&self) -> bool {
        self.structural_safe() && self.external_safe()
    }

    /// Human-readable warnings, in finding order
    ///
    /// External findings are rendered as one block under [`EXTERNAL_HEADER`].
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings: Vec<String> = self
            .findings
            .iter()
            .filter(|f| f.origin == FindingOrigin::StructuralScan)
            .map(SecurityFinding::render_structural)
            .collect();

        let external: Vec<String> = self
            .findings
            .iter()
            .filter(|f| f.origin == FindingOrigin::ExternalTool)
            .map(SecurityFinding::render_external)
            .collect();

        if !external.is_empty() {
            warnings.push(format!("{}\n{}", EXTERNAL_HEADER, external.join("\n")));
        }

        warnings
    }

    /// `(warnings, is_safe)`
    pub fn into_verdict(self) -> (Vec<String>, bool) {
        let safe = self.is_safe();
        (self.warnings(), safe)
    }
}

// ============================================================================
// Analyzer
// ============================================================================

/// Runs both passes over a file
pub struct SecurityAnalyzer {
    inspector: SyntaxInspector,
    external: Option<ExternalAnalyzer>,
}

impl SecurityAnalyzer {
    /// Create an analyzer; a disabled tool config skips the external pass
    pub fn new(tool: ExternalToolConfig) -> Self {
        let external = tool.enabled.then(|| ExternalAnalyzer::new(tool));
        Self {
            inspector: SyntaxInspector::new(),
            external,
        }
    }

    /// Analyzer with the structural pass only
    pub fn structural_only() -> Self {
        Self {
            inspector: SyntaxInspector::new(),
            external: None,
        }
    }

    /// Analyze a file. Never fails: unreadable or malformed files come back
    /// as unsafe reports.
    pub fn analyze(&self, path: &Path, thresholds: Thresholds) -> SecurityReport {
        match std::fs::read(path) {
            Ok(bytes) => self.analyze_source(path, &bytes, thresholds),
            Err(e) => {
                let finding = SecurityFinding::critical(
                    format!("Could not read file for analysis: {}", e),
                    0,
                    "",
                );
                let external = self.external.as_ref().map(|_| {
                    ExternalOutcome::empty(ExternalStatus::Unavailable(
                        "source could not be read".to_string(),
                    ))
                });
                self.finish(path, vec![finding], external)
            }
        }
    }

    /// Analyze bytes already read from `path`. The external tool runs on a
    /// snapshot of the same bytes, not on the file.
    pub fn analyze_source(&self, path: &Path, bytes: &[u8], thresholds: Thresholds) -> SecurityReport {
        let findings = structural::scan_source(&self.inspector, bytes);
        let external = self
            .external
            .as_ref()
            .map(|tool| tool.run_snapshot(path, bytes, thresholds));
        self.finish(path, findings, external)
    }

    fn finish(
        &self,
        path: &Path,
        mut findings: Vec<SecurityFinding>,
        external: Option<ExternalOutcome>,
    ) -> SecurityReport {
        let external = match external {
            Some(outcome) => {
                findings.extend(outcome.findings);
                outcome.status
            }
            None => ExternalStatus::Disabled,
        };

        let report = SecurityReport {
            path: path.to_path_buf(),
            findings,
            external,
        };

        if report.is_safe() {
            debug!(path = %path.display(), findings = report.findings.len(), "analysis passed");
        } else {
            warn!(path = %path.display(), findings = report.findings.len(), "analysis flagged file as unsafe");
        }

        report
    }

    /// `(warnings, is_safe)` for a file
    pub fn analyze_verdict(&self, path: &Path, confidence: Level, severity: Level) -> (Vec<String>, bool) {
        self.analyze(path, Thresholds { confidence, severity }).into_verdict()
    }
}
