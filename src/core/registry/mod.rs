//! Integrity Registry
//!
//! SQLite-backed store of plugin metadata, trusted content fingerprints,
//! wordlists and run results.
//!
//! A plugin row is keyed by `(name, category)`. Registering an existing
//! pair never rewrites it: the stored fingerprint only changes through
//! [`IntegrityRegistry::update_trusted_fingerprint`]. A mismatch between the
//! file on disk and the stored fingerprint is reported as a [`TamperSignal`]
//! and otherwise left alone.
//!
//! All access goes through one `Mutex<Connection>`, which also makes the
//! select-or-insert in `register` atomic with respect to other threads.

pub mod results;
pub mod wordlists;

pub use results::ResultRecord;
pub use wordlists::{WordlistRecord, WordlistSummary};

use crate::core::error::{HostError, HostResult};
use crate::core::plugins::PluginDescriptor;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{info, warn};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS module (
        id            INTEGER PRIMARY KEY AUTOINCREMENT,
        name          TEXT NOT NULL,
        category      TEXT NOT NULL,
        description   TEXT NOT NULL DEFAULT '',
        version       TEXT NOT NULL DEFAULT '',
        authors       TEXT NOT NULL DEFAULT '[]',
        dependencies  TEXT NOT NULL DEFAULT '[]',
        license       TEXT NOT NULL DEFAULT '',
        is_public     INTEGER NOT NULL DEFAULT 0,
        content_hash  TEXT NOT NULL,
        UNIQUE(name, category)
    );
    CREATE TABLE IF NOT EXISTS wordlist (
        id             INTEGER PRIMARY KEY AUTOINCREMENT,
        name           TEXT NOT NULL UNIQUE,
        elements       TEXT NOT NULL,
        element_count  INTEGER NOT NULL,
        last_updated   TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS result (
        id             INTEGER PRIMARY KEY AUTOINCREMENT,
        module_id      INTEGER NOT NULL REFERENCES module(id),
        artifact_path  TEXT NOT NULL,
        created_at     TEXT NOT NULL,
        options        TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_result_module ON result(module_id);
";

// ============================================================================
// Fingerprints
// ============================================================================

/// Lowercase hex SHA-256 of a file's raw bytes
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Fingerprint of a byte slice
    pub fn of_bytes(bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        Fingerprint(format!("{:x}", hasher.finalize()))
    }

    /// Fingerprint of a file's contents
    pub fn of_file(path: &Path) -> HostResult<Self> {
        let bytes = std::fs::read(path)
            .map_err(|e| HostError::from(e).with_context(format!("fingerprinting {}", path.display())))?;
        Ok(Self::of_bytes(&bytes))
    }

    /// Hex digest
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 hex digits, for display
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(12)]
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Registration
// ============================================================================

/// File content no longer matches the trusted fingerprint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TamperSignal {
    pub stored: Fingerprint,
    pub current: Fingerprint,
}

/// Outcome of [`IntegrityRegistry::register`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub plugin_id: i64,
    /// Present when the row already existed with a different fingerprint
    pub tamper: Option<TamperSignal>,
}

impl Registration {
    /// Whether a tamper signal was raised
    pub fn is_tampered(&self) -> bool {
        self.tamper.is_some()
    }
}

/// A stored plugin row
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PluginRow {
    pub id: i64,
    pub name: String,
    pub category: String,
    pub description: String,
    pub version: String,
    pub authors: Vec<String>,
    pub dependencies: Vec<String>,
    pub license: String,
    pub is_public: bool,
    pub content_hash: Fingerprint,
}

// ============================================================================
// Registry
// ============================================================================

/// Persistent store behind a single connection
pub struct IntegrityRegistry {
    conn: Mutex<Connection>,
}

impl IntegrityRegistry {
    /// Open (and create if needed) a database file
    pub fn open(path: &Path) -> HostResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Self::initialize(conn)
    }

    /// Registry backed by an in-memory database
    pub fn in_memory() -> HostResult<Self> {
        Self::initialize(Connection::open_in_memory()?)
    }

    fn initialize(conn: Connection) -> HostResult<Self> {
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub(crate) fn conn(&self) -> HostResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| HostError::registry("registry lock poisoned"))
    }

    /// Deterministic content hash of a file
    pub fn fingerprint(path: &Path) -> HostResult<Fingerprint> {
        Fingerprint::of_file(path)
    }

    /// Register a plugin, or return the id of the existing `(name, category)`
    /// row. An existing row is never modified.
    pub fn register(&self, descriptor: &PluginDescriptor, path: &Path) -> HostResult<Registration> {
        self.register_fingerprint(descriptor, Fingerprint::of_file(path)?)
    }

    /// Same as [`register`](Self::register) with an already computed
    /// fingerprint of the bytes that were executed
    pub fn register_fingerprint(
        &self,
        descriptor: &PluginDescriptor,
        current: Fingerprint,
    ) -> HostResult<Registration> {
        let conn = self.conn()?;

        let existing: Option<(i64, String)> = conn
            .query_row(
                "SELECT id, content_hash FROM module WHERE name = ?1 AND category = ?2",
                params![descriptor.name, descriptor.category],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        if let Some((plugin_id, stored)) = existing {
            let tamper = (stored != current.as_str()).then(|| TamperSignal {
                stored: Fingerprint(stored),
                current,
            });
            if let Some(signal) = &tamper {
                warn!(
                    plugin = %descriptor.qualified_name(),
                    plugin_id,
                    stored = signal.stored.short(),
                    current = signal.current.short(),
                    "plugin source changed since it was last trusted"
                );
            }
            return Ok(Registration { plugin_id, tamper });
        }

        conn.execute(
            "INSERT INTO module (name, category, description, version, authors, dependencies,
                                 license, is_public, content_hash)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                descriptor.name,
                descriptor.category,
                descriptor.description,
                descriptor.version,
                serde_json::to_string(&descriptor.authors)?,
                serde_json::to_string(&descriptor.dependencies)?,
                descriptor.license,
                descriptor.is_public,
                current.as_str(),
            ],
        )?;
        let plugin_id = conn.last_insert_rowid();
        info!(plugin = %descriptor.qualified_name(), plugin_id, "registered plugin");

        Ok(Registration {
            plugin_id,
            tamper: None,
        })
    }

    /// Stored fingerprint for a plugin id, if the plugin exists
    pub fn stored_fingerprint(&self, plugin_id: i64) -> HostResult<Option<Fingerprint>> {
        let conn = self.conn()?;
        let stored: Option<String> = conn
            .query_row(
                "SELECT content_hash FROM module WHERE id = ?1",
                params![plugin_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(stored.map(Fingerprint))
    }

    /// True iff the file's current fingerprint equals the stored one. An
    /// unknown id verifies as false.
    pub fn verify(&self, plugin_id: i64, path: &Path) -> HostResult<bool> {
        let current = Fingerprint::of_file(path)?;
        Ok(self
            .stored_fingerprint(plugin_id)?
            .map(|stored| stored == current)
            .unwrap_or(false))
    }

    /// Replace the trusted fingerprint with the file's current one
    pub fn update_trusted_fingerprint(&self, plugin_id: i64, path: &Path) -> HostResult<Fingerprint> {
        let current = Fingerprint::of_file(path)?;
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE module SET content_hash = ?1 WHERE id = ?2",
            params![current.as_str(), plugin_id],
        )?;
        if updated == 0 {
            return Err(HostError::registry(format!("no plugin with id {}", plugin_id)));
        }
        info!(plugin_id, fingerprint = current.short(), "trusted fingerprint updated");
        Ok(current)
    }

    /// Look up a plugin row by identity
    pub fn find_plugin(&self, name: &str, category: &str) -> HostResult<Option<PluginRow>> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                &format!("{} WHERE name = ?1 AND category = ?2", PLUGIN_SELECT),
                params![name, category],
                read_plugin_row,
            )
            .optional()?;
        Ok(row)
    }

    /// All plugin rows, by id
    pub fn plugins(&self) -> HostResult<Vec<PluginRow>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!("{} ORDER BY id", PLUGIN_SELECT))?;
        let rows = stmt
            .query_map([], read_plugin_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

const PLUGIN_SELECT: &str = "SELECT id, name, category, description, version, authors, dependencies,
        license, is_public, content_hash FROM module";

/// JSON string-list column; a corrupt value fails the row
fn json_list(row: &rusqlite::Row<'_>, index: usize) -> rusqlite::Result<Vec<String>> {
    let text: String = row.get(index)?;
    serde_json::from_str(&text).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(index, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn read_plugin_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<PluginRow> {
    Ok(PluginRow {
        id: row.get(0)?,
        name: row.get(1)?,
        category: row.get(2)?,
        description: row.get(3)?,
        version: row.get(4)?,
        authors: json_list(row, 5)?,
        dependencies: json_list(row, 6)?,
        license: row.get(7)?,
        is_public: row.get(8)?,
        content_hash: Fingerprint(row.get(9)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, content: &[u8]) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    fn foo_dns() -> PluginDescriptor {
        let mut descriptor = PluginDescriptor::new("Foo", "DNS");
        descriptor.authors = vec!["alice".to_string()];
        descriptor.dependencies = vec!["socket".to_string()];
        descriptor
    }

    // =========================================================================
    // Fingerprint Tests
    // =========================================================================

    #[test]
    fn test_fingerprint_deterministic() {
        let a = Fingerprint::of_bytes(b"return {}\n");
        let b = Fingerprint::of_bytes(b"return {}\n");
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 64);
        assert!(a.as_str().chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_fingerprint_sensitive_to_single_bit() {
        let original = b"local x = 1\n".to_vec();
        let mut flipped = original.clone();
        flipped[6] ^= 0x01;
        assert_ne!(Fingerprint::of_bytes(&original), Fingerprint::of_bytes(&flipped));
    }

    #[test]
    fn test_fingerprint_known_value() {
        assert_eq!(
            Fingerprint::of_bytes(b"").as_str(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_fingerprint_missing_file() {
        assert!(Fingerprint::of_file(Path::new("/no/such/file.lua")).is_err());
    }

    // =========================================================================
    // Register / Verify Tests
    // =========================================================================

    #[test]
    fn test_register_scenario() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "foo.lua", b"-- v1\n");
        let registry = IntegrityRegistry::in_memory().unwrap();
        let h1 = Fingerprint::of_file(&path).unwrap();

        let first = registry.register(&foo_dns(), &path).unwrap();
        assert_eq!(first.plugin_id, 1);
        assert!(!first.is_tampered());

        let second = registry.register(&foo_dns(), &path).unwrap();
        assert_eq!(second.plugin_id, 1);
        assert!(second.tamper.is_none());

        std::fs::write(&path, b"-- v2\n").unwrap();
        let third = registry.register(&foo_dns(), &path).unwrap();
        assert_eq!(third.plugin_id, 1);
        let signal = third.tamper.expect("tamper signal");
        assert_eq!(signal.stored, h1);
        assert_ne!(signal.current, h1);

        assert_eq!(registry.stored_fingerprint(1).unwrap(), Some(h1));
    }

    #[test]
    fn test_register_does_not_overwrite_metadata() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "foo.lua", b"-- v1\n");
        let registry = IntegrityRegistry::in_memory().unwrap();

        registry.register(&foo_dns(), &path).unwrap();
        let mut changed = foo_dns();
        changed.version = "9.9.9".to_string();
        registry.register(&changed, &path).unwrap();

        let row = registry.find_plugin("Foo", "DNS").unwrap().unwrap();
        assert_eq!(row.version, "0.1.0");
        assert_eq!(row.authors, vec!["alice"]);
        assert_eq!(row.dependencies, vec!["socket"]);
    }

    #[test]
    fn test_same_name_other_category_is_new_row() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "foo.lua", b"-- v1\n");
        let registry = IntegrityRegistry::in_memory().unwrap();

        let dns = registry.register(&foo_dns(), &path).unwrap();
        let url = registry
            .register(&PluginDescriptor::new("Foo", "URL"), &path)
            .unwrap();
        assert_ne!(dns.plugin_id, url.plugin_id);
        assert_eq!(registry.plugins().unwrap().len(), 2);
    }

    #[test]
    fn test_verify_and_trust_update() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "foo.lua", b"-- v1\n");
        let registry = IntegrityRegistry::in_memory().unwrap();
        let id = registry.register(&foo_dns(), &path).unwrap().plugin_id;

        assert!(registry.verify(id, &path).unwrap());

        std::fs::write(&path, b"-- v2\n").unwrap();
        assert!(!registry.verify(id, &path).unwrap());

        let trusted = registry.update_trusted_fingerprint(id, &path).unwrap();
        assert_eq!(trusted, Fingerprint::of_bytes(b"-- v2\n"));
        assert!(registry.verify(id, &path).unwrap());
        assert!(!registry.register(&foo_dns(), &path).unwrap().is_tampered());
    }

    #[test]
    fn test_verify_unknown_id_is_false() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "foo.lua", b"-- v1\n");
        let registry = IntegrityRegistry::in_memory().unwrap();

        assert!(!registry.verify(42, &path).unwrap());
        assert_eq!(registry.stored_fingerprint(42).unwrap(), None);
        assert!(registry.find_plugin("Nope", "DNS").unwrap().is_none());
    }

    #[test]
    fn test_trust_update_unknown_id_fails() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "foo.lua", b"-- v1\n");
        let registry = IntegrityRegistry::in_memory().unwrap();

        let err = registry.update_trusted_fingerprint(7, &path).unwrap_err();
        assert_eq!(err.kind(), "registry");
    }

    #[test]
    fn test_concurrent_registration_single_row() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "foo.lua", b"-- v1\n");
        let registry = IntegrityRegistry::in_memory().unwrap();
        let descriptor = foo_dns();

        let ids: Vec<i64> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| scope.spawn(|| registry.register(&descriptor, &path).unwrap().plugin_id))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert!(ids.iter().all(|id| *id == ids[0]));
        assert_eq!(registry.plugins().unwrap().len(), 1);
    }

    #[test]
    fn test_open_creates_file_and_persists() {
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("nested").join("nexushound.db");
        let path = write(&dir, "foo.lua", b"-- v1\n");

        {
            let registry = IntegrityRegistry::open(&db).unwrap();
            registry.register(&foo_dns(), &path).unwrap();
        }

        let reopened = IntegrityRegistry::open(&db).unwrap();
        assert!(reopened.find_plugin("Foo", "DNS").unwrap().is_some());
    }

    #[test]
    fn test_corrupt_list_column_surfaces() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "foo.lua", b"-- v1\n");
        let registry = IntegrityRegistry::in_memory().unwrap();
        registry.register(&foo_dns(), &path).unwrap();

        registry
            .conn()
            .unwrap()
            .execute("UPDATE module SET dependencies = 'not json'", [])
            .unwrap();

        let err = registry.find_plugin("Foo", "DNS").unwrap_err();
        assert_eq!(err.kind(), "registry");
        assert!(registry.plugins().is_err());
    }
}
