//! Structural facts extracted from a plugin source
//!
//! These are plain values produced by [`crate::SyntaxTree`] queries. They
//! carry no reference to the parse tree so callers can keep them around
//! after the tree is dropped.

use serde::{Deserialize, Serialize};

// ============================================================================
// Source Locations
// ============================================================================

/// A span of source, in bytes and lines
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub struct Span {
    /// Start byte offset (inclusive)
    pub start: usize,

    /// End byte offset (exclusive)
    pub end: usize,

    /// Start line (1-indexed)
    pub start_line: usize,

    /// End line (1-indexed)
    pub end_line: usize,
}

impl Span {
    /// Create a new span
    pub fn new(start: usize, end: usize, start_line: usize, end_line: usize) -> Self {
        Self {
            start,
            end,
            start_line,
            end_line,
        }
    }

    /// Byte length of the span
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    /// Whether the span covers no bytes
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Check if this span contains a line number
    pub fn contains_line(&self, line: usize) -> bool {
        line >= self.start_line && line <= self.end_line
    }
}

// ============================================================================
// Declarations
// ============================================================================

/// A class-like declaration and the bases it derives from
///
/// Bases keep their written form: `PluginBase` or a dotted chain such as
/// `nexus.PluginBase`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClassDecl {
    /// Declared name (the assignment target)
    pub name: String,

    /// Base names in declaration order
    pub bases: Vec<String>,

    /// Location of the declaring statement
    pub span: Span,
}

impl ClassDecl {
    /// True when any base is `base_name`, either exactly or as the final
    /// segment of a dotted name
    pub fn derives_from(&self, base_name: &str) -> bool {
        self.bases.iter().any(|base| {
            base == base_name
                || base
                    .rsplit_once('.')
                    .map(|(_, last)| last == base_name)
                    .unwrap_or(false)
        })
    }
}

// ============================================================================
// Imports, Calls, Attribute Access
// ============================================================================

/// A `require("module")` with a literal module name
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImportRef {
    /// Module path as written (`socket.http`)
    pub module: String,

    /// Line of the call (1-indexed)
    pub line: usize,

    /// Trimmed source line
    pub snippet: String,
}

/// A function or method call
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CallSite {
    /// Callee as written (`load`, `os.execute`, `self:run`)
    pub callee: String,

    /// Whether the callee is a bare identifier
    pub is_bare: bool,

    /// Line of the call (1-indexed)
    pub line: usize,

    /// Trimmed source line
    pub snippet: String,
}

/// An `object.attribute` access whose object is a bare identifier
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AttributeAccess {
    /// The object name (`os`)
    pub object: String,

    /// The accessed field (`execute`)
    pub attribute: String,

    /// Line of the access (1-indexed)
    pub line: usize,

    /// Trimmed source line
    pub snippet: String,
}

impl AttributeAccess {
    /// `object.attribute`
    pub fn qualified(&self) -> String {
        format!("{}.{}", self.object, self.attribute)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn class(bases: &[&str]) -> ClassDecl {
        ClassDecl {
            name: "Scanner".to_string(),
            bases: bases.iter().map(|b| b.to_string()).collect(),
            span: Span::default(),
        }
    }

    #[test]
    fn test_span_len() {
        let span = Span::new(10, 25, 2, 3);
        assert_eq!(span.len(), 15);
        assert!(!span.is_empty());
        assert!(span.contains_line(3));
        assert!(!span.contains_line(4));
    }

    #[test]
    fn test_derives_from_simple_name() {
        assert!(class(&["PluginBase"]).derives_from("PluginBase"));
    }

    #[test]
    fn test_derives_from_qualified_name() {
        assert!(class(&["nexus.PluginBase"]).derives_from("PluginBase"));
        assert!(class(&["a.b.PluginBase"]).derives_from("PluginBase"));
    }

    #[test]
    fn test_derives_from_rejects_partial_segment() {
        assert!(!class(&["MyPluginBase"]).derives_from("PluginBase"));
        assert!(!class(&["PluginBase.Extra"]).derives_from("PluginBase"));
        assert!(!class(&[]).derives_from("PluginBase"));
    }

    #[test]
    fn test_attribute_qualified() {
        let access = AttributeAccess {
            object: "os".to_string(),
            attribute: "execute".to_string(),
            line: 1,
            snippet: String::new(),
        };
        assert_eq!(access.qualified(), "os.execute");
    }
}
