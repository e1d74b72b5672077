//! Host configuration
//!
//! Loaded from a JSON file. Every field has a default, so an empty object
//! (or no file at all) yields a working configuration rooted in the user's
//! data directory.

use crate::core::error::{HostError, HostResult};
use crate::core::security::{ExternalToolConfig, Thresholds};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Name of the per-user config and data subdirectory
pub const APP_DIR: &str = "nexushound";

/// Configuration file name inside the config directory
pub const CONFIG_FILE: &str = "config.json";

/// Configuration loaded from config.json
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostConfig {
    /// Root directory scanned for plugin sources
    #[serde(default = "default_plugin_dir")]
    pub plugin_dir: PathBuf,

    /// SQLite database backing the integrity registry
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// Directory of `*.txt` wordlists imported on bootstrap
    #[serde(default = "default_wordlist_dir")]
    pub wordlist_dir: PathBuf,

    /// Directory plugins write their artifacts into
    #[serde(default = "default_results_dir")]
    pub results_dir: PathBuf,

    /// File extensions considered plugin sources
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,

    /// Fallback log filter when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Verdict thresholds for the external analyzer
    #[serde(default)]
    pub thresholds: Thresholds,

    /// External static analyzer invocation
    #[serde(default)]
    pub external_tool: ExternalToolConfig,
}

fn data_root() -> PathBuf {
    dirs::data_dir()
        .map(|dir| dir.join(APP_DIR))
        .unwrap_or_else(|| PathBuf::from(".").join(APP_DIR))
}

fn default_plugin_dir() -> PathBuf {
    data_root().join("plugins")
}

fn default_database_path() -> PathBuf {
    data_root().join("nexushound.db")
}

fn default_wordlist_dir() -> PathBuf {
    data_root().join("wordlists")
}

fn default_results_dir() -> PathBuf {
    data_root().join("results")
}

fn default_extensions() -> Vec<String> {
    vec!["lua".to_string()]
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            plugin_dir: default_plugin_dir(),
            database_path: default_database_path(),
            wordlist_dir: default_wordlist_dir(),
            results_dir: default_results_dir(),
            extensions: default_extensions(),
            log_level: default_log_level(),
            thresholds: Thresholds::default(),
            external_tool: ExternalToolConfig::default(),
        }
    }
}

impl HostConfig {
    /// Per-user config file location, if the platform has a config directory
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_DIR).join(CONFIG_FILE))
    }

    /// Parse a config file
    pub fn from_file(path: &Path) -> HostResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| HostError::from(e).with_context(format!("reading {}", path.display())))?;
        let config: HostConfig = serde_json::from_str(&content)
            .map_err(|e| HostError::from(e).with_context(format!("parsing {}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    /// Load the explicit file if given, else the per-user file if present,
    /// else defaults
    pub fn load(explicit: Option<&Path>) -> HostResult<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }

        match Self::default_path() {
            Some(path) if path.is_file() => Self::from_file(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Reject values that cannot work at all
    pub fn validate(&self) -> HostResult<()> {
        if self.extensions.is_empty() {
            return Err(HostError::invalid_config("extensions must not be empty"));
        }
        if self.external_tool.enabled && self.external_tool.program.trim().is_empty() {
            return Err(HostError::invalid_config(
                "external_tool.program must be set when the tool is enabled",
            ));
        }
        if self.external_tool.timeout_secs == 0 {
            return Err(HostError::invalid_config(
                "external_tool.timeout_secs must be positive",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::security::Level;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = HostConfig::default();
        assert_eq!(config.extensions, vec!["lua"]);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.thresholds.confidence, Level::High);
        assert_eq!(config.thresholds.severity, Level::Medium);
        assert!(config.database_path.ends_with("nexushound.db"));
    }

    #[test]
    fn test_empty_object_uses_defaults() {
        let config: HostConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.extensions, default_extensions());
        assert!(config.external_tool.enabled);
    }

    #[test]
    fn test_from_file_overrides() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.json");
        std::fs::write(
            &path,
            r#"{
                "plugin_dir": "/srv/plugins",
                "thresholds": { "confidence": "LOW", "severity": "HIGH" },
                "external_tool": { "enabled": false }
            }"#,
        )
        .unwrap();

        let config = HostConfig::from_file(&path).unwrap();
        assert_eq!(config.plugin_dir, PathBuf::from("/srv/plugins"));
        assert_eq!(config.thresholds.confidence, Level::Low);
        assert_eq!(config.thresholds.severity, Level::High);
        assert!(!config.external_tool.enabled);
    }

    #[test]
    fn test_from_file_rejects_bad_json() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = HostConfig::from_file(&path).unwrap_err();
        assert_eq!(err.kind(), "json");
    }

    #[test]
    fn test_explicit_missing_file_is_error() {
        let err = HostConfig::load(Some(Path::new("/definitely/missing/config.json"))).unwrap_err();
        assert_eq!(err.kind(), "io");
    }

    #[test]
    fn test_validate_rejects_empty_extensions() {
        let config = HostConfig {
            extensions: vec![],
            ..HostConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
