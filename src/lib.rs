//! nexushound - vetting plugin host for security tooling scripts
//!
//! Plugins are Lua scripts dropped into a directory. Before any of them
//! runs, the host:
//! - finds them structurally, without executing anything
//! - scans their syntax tree for dangerous imports and dynamic code
//! - optionally runs an external static analyzer with a timeout
//! - asks a human before loading anything flagged unsafe
//!
//! Loaded plugins are registered in a SQLite integrity registry keyed by
//! `(name, category)` with a content fingerprint, so later edits to a
//! trusted file are flagged as modifications.
//!
//! # Architecture
//!
//! This crate follows the "Library-First" pattern:
//! - **lib.rs** (this file): Pure logic, no CLI concerns
//! - **bin/nexushound.rs**: Thin wrapper that calls the library
//!
//! Syntax inspection lives in the `nexus-syntax` workspace member.

pub mod core;

pub use crate::core::{
    DiscoveryEngine, DynamicLoader, HostConfig, HostError, HostResult, IntegrityRegistry,
    PluginDescriptor, PluginInstance, SecurityAnalyzer, SecurityReport, Thresholds,
};
pub use nexus_syntax::{SyntaxInspector, SyntaxTree};

/// Returns the version of the nexushound library
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert_eq!(version(), "0.3.0");
    }
}
