//! Error types for nexushound
//!
//! Every per-file failure in discovery, analysis and loading maps onto one
//! variant here. Batch operations log these and move on; only the binary
//! decides whether a partial result is acceptable.

use nexus_syntax::SyntaxError;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result type alias for host operations
pub type HostResult<T> = std::result::Result<T, HostError>;

/// Errors that can occur while vetting, loading or running plugins
#[derive(Error, Debug)]
pub enum HostError {
    /// IO error during file operations
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Malformed plugin source
    #[error("Parse error in {}: line {line}: {message}", path.display())]
    Parse {
        path: PathBuf,
        line: usize,
        message: String,
    },

    /// Unsafe verdict without an override
    #[error("Security check rejected {} ({warnings} warnings)", path.display())]
    SecurityRejected { path: PathBuf, warnings: usize },

    /// Execution or instantiation of the plugin file failed
    #[error("Failed to load {}: {message}", path.display())]
    Load { path: PathBuf, message: String },

    /// Host interpreter is older than the plugin requires
    #[error("Plugin '{plugin}' requires runtime {required}, host has {actual}")]
    IncompatibleVersion {
        plugin: String,
        required: String,
        actual: String,
    },

    /// A declared dependency cannot be resolved
    #[error("Plugin '{plugin}' depends on unavailable module '{dependency}'")]
    UnsatisfiedDependency { plugin: String, dependency: String },

    /// Persistence failure in the integrity registry
    #[error("Registry error: {message}")]
    Registry { message: String },

    /// External analyzer could not run
    #[error("External analyzer '{tool}' unavailable: {reason}")]
    ToolUnavailable { tool: String, reason: String },

    /// A required option has neither a default nor an override
    #[error("Plugin '{plugin}' cannot run: required option '{option}' is not set")]
    MissingOption { plugin: String, option: String },

    /// Option value rejected by its schema
    #[error("Invalid value for option '{option}': {message}")]
    InvalidOption { option: String, message: String },

    /// Plugin `run()` raised an error
    #[error("Plugin '{plugin}' failed: {message}")]
    Execution { plugin: String, message: String },

    /// No catalog entry with that name
    #[error("Plugin not found: {name}")]
    PluginNotFound { name: String },

    /// Invalid configuration
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// Lua runtime error outside a specific load or run
    #[error("Lua runtime error: {0}")]
    Lua(String),

    /// Generic error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<HostError>,
    },
}

impl HostError {
    /// Wrap an error with additional context
    pub fn with_context(self, context: impl Into<String>) -> Self {
        HostError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Attach a path to a syntax failure
    pub fn parse(path: &Path, err: SyntaxError) -> Self {
        HostError::Parse {
            path: path.to_path_buf(),
            line: err.line().unwrap_or(0),
            message: err.to_string(),
        }
    }

    /// Create a load error
    pub fn load(path: &Path, message: impl Into<String>) -> Self {
        HostError::Load {
            path: path.to_path_buf(),
            message: message.into(),
        }
    }

    /// Create a registry error
    pub fn registry(message: impl Into<String>) -> Self {
        HostError::Registry {
            message: message.into(),
        }
    }

    /// Create an invalid config error
    pub fn invalid_config(message: impl Into<String>) -> Self {
        HostError::InvalidConfig {
            message: message.into(),
        }
    }

    /// Create an invalid option error
    pub fn invalid_option(option: impl Into<String>, message: impl Into<String>) -> Self {
        HostError::InvalidOption {
            option: option.into(),
            message: message.into(),
        }
    }

    /// Short machine-friendly label used in log fields
    pub fn kind(&self) -> &'static str {
        match self {
            HostError::Io(_) => "io",
            HostError::Json(_) => "json",
            HostError::Parse { .. } => "parse",
            HostError::SecurityRejected { .. } => "security_rejected",
            HostError::Load { .. } => "load",
            HostError::IncompatibleVersion { .. } => "incompatible_version",
            HostError::UnsatisfiedDependency { .. } => "unsatisfied_dependency",
            HostError::Registry { .. } => "registry",
            HostError::ToolUnavailable { .. } => "tool_unavailable",
            HostError::MissingOption { .. } => "missing_option",
            HostError::InvalidOption { .. } => "invalid_option",
            HostError::Execution { .. } => "execution",
            HostError::PluginNotFound { .. } => "plugin_not_found",
            HostError::InvalidConfig { .. } => "invalid_config",
            HostError::Lua(_) => "lua",
            HostError::WithContext { source, .. } => source.kind(),
        }
    }
}

impl From<rusqlite::Error> for HostError {
    fn from(err: rusqlite::Error) -> Self {
        HostError::registry(err.to_string())
    }
}

impl From<mlua::Error> for HostError {
    fn from(err: mlua::Error) -> Self {
        HostError::Lua(err.to_string())
    }
}

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error
    fn context(self, ctx: impl Into<String>) -> HostResult<T>;
}

impl<T> ResultExt<T> for HostResult<T> {
    fn context(self, ctx: impl Into<String>) -> HostResult<T> {
        self.map_err(|e| e.with_context(ctx))
    }
}
