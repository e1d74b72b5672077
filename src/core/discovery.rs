//! Discovery Engine
//!
//! Finds plugin source files under a directory without executing them. A
//! file qualifies when it declares a class deriving from `PluginBase`.

use crate::core::error::{HostError, HostResult};
use crate::core::plugins::runtime::PLUGIN_BASE;
use nexus_syntax::SyntaxInspector;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::{DirEntry, WalkDir};

#[cfg(test)]
use mockall::automock;

/// Source of candidate files
///
/// Implemented over the real filesystem by [`FsWalker`]; mocked in tests.
#[cfg_attr(test, automock)]
pub trait SourceWalker: Send + Sync {
    /// Files under `root` with one of `extensions`, in a stable order
    fn walk(&self, root: &Path, extensions: &[String]) -> HostResult<Vec<PathBuf>>;

    /// Raw bytes of a file
    fn read(&self, path: &Path) -> HostResult<Vec<u8>>;
}

/// Recursive filesystem walker that skips hidden entries
#[derive(Debug, Default, Clone, Copy)]
pub struct FsWalker;

fn is_hidden(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry
            .file_name()
            .to_str()
            .map(|name| name.starts_with('.'))
            .unwrap_or(false)
}

fn has_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| extensions.iter().any(|wanted| wanted.eq_ignore_ascii_case(ext)))
        .unwrap_or(false)
}

impl SourceWalker for FsWalker {
    fn walk(&self, root: &Path, extensions: &[String]) -> HostResult<Vec<PathBuf>> {
        let mut files = Vec::new();
        for entry in WalkDir::new(root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| !is_hidden(e))
        {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(error = %e, "skipping unreadable entry");
                    continue;
                }
            };
            if entry.file_type().is_file() && has_extension(entry.path(), extensions) {
                files.push(entry.into_path());
            }
        }
        Ok(files)
    }

    fn read(&self, path: &Path) -> HostResult<Vec<u8>> {
        Ok(std::fs::read(path)?)
    }
}

/// Structural scan for plugin source files
pub struct DiscoveryEngine {
    walker: Box<dyn SourceWalker>,
    inspector: SyntaxInspector,
    extensions: Vec<String>,
}

impl DiscoveryEngine {
    /// Engine over the real filesystem
    pub fn new(extensions: Vec<String>) -> Self {
        Self::with_walker(Box::new(FsWalker), extensions)
    }

    pub fn with_walker(walker: Box<dyn SourceWalker>, extensions: Vec<String>) -> Self {
        Self {
            walker,
            inspector: SyntaxInspector::new(),
            extensions,
        }
    }

    /// Whether source text declares a plugin class
    pub fn declares_plugin(&self, source: &[u8]) -> nexus_syntax::Result<bool> {
        let tree = self.inspector.parse_bytes(source)?;
        Ok(tree
            .classes()
            .iter()
            .any(|class| class.derives_from(PLUGIN_BASE)))
    }

    /// Candidate plugin files under `root`, in walk order
    ///
    /// Never fails: a missing root yields nothing, unreadable or malformed
    /// files are logged and skipped.
    pub fn discover(&self, root: &Path) -> Vec<PathBuf> {
        if !root.is_dir() {
            warn!(root = %root.display(), "plugin directory does not exist");
            return Vec::new();
        }

        let files = match self.walker.walk(root, &self.extensions) {
            Ok(files) => files,
            Err(e) => {
                warn!(root = %root.display(), error = %e, "could not walk plugin directory");
                return Vec::new();
            }
        };

        let mut found = Vec::new();
        for path in files {
            match self.inspect(&path) {
                Ok(true) => {
                    debug!(path = %path.display(), "plugin candidate");
                    found.push(path);
                }
                Ok(false) => {}
                Err(e) => warn!(path = %path.display(), error = %e, "skipping file"),
            }
        }

        info!(root = %root.display(), candidates = found.len(), "discovery finished");
        found
    }

    fn inspect(&self, path: &Path) -> HostResult<bool> {
        let source = self.walker.read(path)?;
        self.declares_plugin(&source)
            .map_err(|e| HostError::parse(path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::predicate::*;
    use std::fs;
    use tempfile::TempDir;

    const PLUGIN: &str = r#"
        Scanner = PluginBase:extend("Scanner")
        function Scanner:run() end
    "#;

    fn lua() -> Vec<String> {
        vec!["lua".to_string()]
    }

    // =========================================================================
    // Filesystem Tests
    // =========================================================================

    #[test]
    fn test_missing_root_is_empty() {
        let engine = DiscoveryEngine::new(lua());
        assert!(engine.discover(Path::new("/definitely/not/here")).is_empty());
    }

    #[test]
    fn test_discovers_only_plugin_sources() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("scanner.lua"), PLUGIN).unwrap();
        fs::write(temp.path().join("util.lua"), "local M = {} return M").unwrap();
        fs::write(temp.path().join("broken.lua"), "X = PluginBase:extend(").unwrap();
        fs::write(temp.path().join("notes.txt"), PLUGIN).unwrap();
        fs::create_dir(temp.path().join("nested")).unwrap();
        fs::write(
            temp.path().join("nested/deep.lua"),
            "Deep = class(\"Deep\", nexus.PluginBase)",
        )
        .unwrap();
        fs::create_dir(temp.path().join(".hidden")).unwrap();
        fs::write(temp.path().join(".hidden/secret.lua"), PLUGIN).unwrap();

        let found = DiscoveryEngine::new(lua()).discover(temp.path());
        assert_eq!(
            found,
            vec![temp.path().join("nested/deep.lua"), temp.path().join("scanner.lua")]
        );
    }

    #[test]
    fn test_does_not_execute_sources() {
        let temp = TempDir::new().unwrap();
        let marker = temp.path().join("executed");
        let source = format!(
            "{}\nlocal f = io.open({:?}, 'w') f:write('x') f:close()\n",
            PLUGIN,
            marker.display().to_string()
        );
        fs::write(temp.path().join("sneaky.lua"), source).unwrap();

        let found = DiscoveryEngine::new(lua()).discover(temp.path());
        assert_eq!(found.len(), 1);
        assert!(!marker.exists());
    }

    // =========================================================================
    // Mocked Walker Tests
    // =========================================================================

    #[test]
    fn test_unreadable_file_is_skipped() {
        let temp = TempDir::new().unwrap();
        let mut walker = MockSourceWalker::new();
        walker
            .expect_walk()
            .returning(|root, _| Ok(vec![root.join("a.lua"), root.join("b.lua")]));
        walker
            .expect_read()
            .with(function(|p: &Path| p.ends_with("a.lua")))
            .returning(|_| Err(HostError::Io(std::io::Error::from(std::io::ErrorKind::PermissionDenied))));
        walker
            .expect_read()
            .with(function(|p: &Path| p.ends_with("b.lua")))
            .returning(|_| Ok(PLUGIN.as_bytes().to_vec()));

        let found = DiscoveryEngine::with_walker(Box::new(walker), lua()).discover(temp.path());
        assert_eq!(found, vec![temp.path().join("b.lua")]);
    }

    #[test]
    fn test_walk_failure_is_empty() {
        let temp = TempDir::new().unwrap();
        let mut walker = MockSourceWalker::new();
        walker
            .expect_walk()
            .returning(|_, _| Err(HostError::invalid_config("walk failed")));
        walker.expect_read().never();

        let engine = DiscoveryEngine::with_walker(Box::new(walker), lua());
        assert!(engine.discover(temp.path()).is_empty());
    }

    #[test]
    fn test_declares_plugin_variants() {
        let engine = DiscoveryEngine::new(lua());
        assert!(engine.declares_plugin(PLUGIN.as_bytes()).unwrap());
        assert!(engine
            .declares_plugin(b"local P = {}\nsetmetatable(P, { __index = PluginBase })")
            .unwrap());
        assert!(!engine.declares_plugin(b"Other = Base:extend('Other')").unwrap());
        assert!(engine.declares_plugin(b"X = (").is_err());
    }
}
