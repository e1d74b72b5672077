//! Operator override for unsafe verdicts

use std::io::{self, BufRead, BufReader, Stdin, Stderr, Write};
use std::path::Path;

use crate::core::security::SecurityReport;

/// Asked once per unsafe file whether to load it anyway
pub trait OverridePrompt {
    fn confirm(&mut self, path: &Path, report: &SecurityReport) -> bool;
}

/// Never overrides
#[derive(Debug, Default, Clone, Copy)]
pub struct DeclineAll;

impl OverridePrompt for DeclineAll {
    fn confirm(&mut self, _path: &Path, _report: &SecurityReport) -> bool {
        false
    }
}

/// Always overrides (`--yes`)
#[derive(Debug, Default, Clone, Copy)]
pub struct ApproveAll;

impl OverridePrompt for ApproveAll {
    fn confirm(&mut self, _path: &Path, _report: &SecurityReport) -> bool {
        true
    }
}

/// Only `y` or `yes` counts, case-insensitively
pub fn is_affirmative(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

/// Shows the warnings and reads a yes/no answer
pub struct ReaderPrompt<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> ReaderPrompt<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    fn ask(&mut self, path: &Path, report: &SecurityReport) -> io::Result<bool> {
        writeln!(self.output, "Security warnings for {}:", path.display())?;
        for warning in report.warnings() {
            writeln!(self.output, "  {}", warning)?;
        }
        write!(self.output, "Load this plugin anyway? [y/N]: ")?;
        self.output.flush()?;

        let mut answer = String::new();
        self.input.read_line(&mut answer)?;
        Ok(is_affirmative(&answer))
    }
}

impl ReaderPrompt<BufReader<Stdin>, Stderr> {
    /// Interactive prompt on the terminal
    pub fn stdio() -> Self {
        Self::new(BufReader::new(io::stdin()), io::stderr())
    }
}

impl<R: BufRead, W: Write> OverridePrompt for ReaderPrompt<R, W> {
    fn confirm(&mut self, path: &Path, report: &SecurityReport) -> bool {
        self.ask(path, report).unwrap_or(false)
    }
}
