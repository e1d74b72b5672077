//! Error types for nexus-syntax

use thiserror::Error;

/// Errors from parsing plugin sources
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyntaxError {
    /// The source is malformed; `line` is the first offending line (1-indexed)
    #[error("Parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    /// The grammar could not be loaded into the parser
    #[error("Tree-sitter error: {0}")]
    TreeSitter(String),
}

impl SyntaxError {
    /// Create a parse error at the given line
    pub fn parse_error(line: usize, message: impl Into<String>) -> Self {
        SyntaxError::Parse {
            line,
            message: message.into(),
        }
    }

    /// Line of the failure, when known
    pub fn line(&self) -> Option<usize> {
        match self {
            SyntaxError::Parse { line, .. } => Some(*line),
            SyntaxError::TreeSitter(_) => None,
        }
    }
}

/// Result type alias for SyntaxError
pub type Result<T> = std::result::Result<T, SyntaxError>;
