//! nexus-syntax: structural inspection of plugin sources
//!
//! This crate parses Lua plugin files with Tree-sitter and answers the
//! structural questions the host asks before it ever executes a file:
//!
//! - Which "classes" does the file declare, and what do they derive from?
//! - Which modules does it `require`?
//! - Which functions does it call, and which `module.field` pairs does it touch?
//!
//! Parsing never runs the source. A file containing syntax errors fails
//! with [`SyntaxError::Parse`] so callers can skip it.
//!
//! # Example
//!
//! ```rust,ignore
//! use nexus_syntax::SyntaxInspector;
//!
//! let inspector = SyntaxInspector::new();
//! let tree = inspector.parse("local Scan = PluginBase:extend(\"Scan\")")?;
//!
//! for class in tree.classes() {
//!     println!("{} <- {:?}", class.name, class.bases);
//! }
//! ```

pub mod error;
pub mod inspector;
pub mod ir;
pub mod nodes;

pub use error::{Result, SyntaxError};
pub use inspector::{SyntaxInspector, SyntaxTree};
pub use ir::{AttributeAccess, CallSite, ClassDecl, ImportRef, Span};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
