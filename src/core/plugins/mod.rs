//! Plugin Capability Contract and Dynamic Loader
//!
//! Plugins are Lua scripts declaring a class that derives from the host's
//! `PluginBase`. Each plugin gets its own interpreter state with the
//! `nexus` bridge installed.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │            DYNAMIC LOADER               │
//! │  • security gate + override prompt      │
//! │  • compatibility checks                 │
//! │  • catalog keyed by plugin name         │
//! ├─────────────────────────────────────────┤
//! │            PLUGIN RUNTIME               │
//! │  • PluginBase prelude                   │
//! │  • nexus.* API bridge                   │
//! ├─────────────────────────────────────────┤
//! │           INTEGRITY REGISTRY            │
//! │  • identity + trusted fingerprints      │
//! │  • wordlists and results                │
//! └─────────────────────────────────────────┘
//! ```

pub mod bridge;
pub mod catalog;
pub mod descriptor;
pub mod instance;
pub mod loader;
pub mod options;
pub mod prompt;
pub mod runtime;

// Re-exports
pub use bridge::{BridgeContext, BridgeState, LogEntry, SharedBridgeState, API_VERSION};
pub use catalog::{CatalogEntry, PluginCatalog, PluginSummary};
pub use descriptor::PluginDescriptor;
pub use instance::PluginInstance;
pub use loader::{DynamicLoader, LoadStage};
pub use options::{OptionKind, OptionSchema, OptionSpec, OptionValue, WordlistSelection};
pub use prompt::{is_affirmative, ApproveAll, DeclineAll, OverridePrompt, ReaderPrompt};
pub use runtime::{parse_version, PluginCandidate, PluginRuntime, PLUGIN_BASE};
