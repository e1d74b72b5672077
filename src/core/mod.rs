//! Core module for nexushound
//!
//! # Architecture
//!
//! - `error`: Error types using thiserror
//! - `config`: Host configuration (JSON, all fields defaulted)
//! - `logging`: tracing subscriber setup
//! - `discovery`: Structural discovery of plugin sources
//! - `security`: Structural scan + external analyzer verdict
//! - `registry`: SQLite integrity registry, wordlists, results
//! - `plugins`: Plugin contract, runtime and dynamic loader

pub mod config;
pub mod discovery;
pub mod error;
pub mod logging;
pub mod plugins;
pub mod registry;
pub mod security;

// Re-export commonly used types
pub use config::HostConfig;
pub use discovery::{DiscoveryEngine, FsWalker, SourceWalker};
pub use error::{HostError, HostResult, ResultExt};
pub use plugins::{
    DynamicLoader, OptionKind, OptionSpec, OptionValue, PluginCatalog, PluginDescriptor,
    PluginInstance, PluginSummary,
};
pub use registry::{Fingerprint, IntegrityRegistry, Registration, TamperSignal};
pub use security::{
    FindingOrigin, Level, SecurityAnalyzer, SecurityFinding, SecurityReport, Thresholds,
};
