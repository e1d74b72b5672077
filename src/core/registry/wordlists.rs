//! Wordlist storage
//!
//! Elements are stored as a JSON array with the count kept alongside, so
//! listings never have to decode the elements.

use super::IntegrityRegistry;
use crate::core::error::{HostError, HostResult};
use chrono::{SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// A stored wordlist with its elements
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WordlistRecord {
    pub id: i64,
    pub name: String,
    pub elements: Vec<String>,
    pub element_count: usize,
    pub last_updated: String,
}

/// Listing entry without the elements
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WordlistSummary {
    pub id: i64,
    pub name: String,
    pub element_count: usize,
    pub last_updated: String,
}

fn insert(conn: &Connection, name: &str, elements: &[String], or_ignore: bool) -> HostResult<usize> {
    let verb = if or_ignore { "INSERT OR IGNORE" } else { "INSERT" };
    let changed = conn.execute(
        &format!(
            "{} INTO wordlist (name, elements, element_count, last_updated) VALUES (?1, ?2, ?3, ?4)",
            verb
        ),
        params![
            name,
            serde_json::to_string(elements)?,
            elements.len() as i64,
            Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        ],
    )?;
    Ok(changed)
}

/// Split file content into trimmed, non-empty lines. Bytes that are not
/// valid UTF-8 are read as Latin-1.
pub fn decode_lines(bytes: &[u8]) -> Vec<String> {
    let text = match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => bytes.iter().map(|&b| b as char).collect(),
    };

    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

impl IntegrityRegistry {
    /// Store a new wordlist. Fails if the name is taken.
    pub fn add_wordlist(&self, name: &str, elements: &[String]) -> HostResult<i64> {
        let conn = self.conn()?;
        insert(&conn, name, elements, false).map_err(|e| {
            HostError::registry(format!("cannot add wordlist '{}': {}", name, e))
        })?;
        let id = conn.last_insert_rowid();
        info!(wordlist = name, id, elements = elements.len(), "wordlist added");
        Ok(id)
    }

    /// All wordlists, by name
    pub fn wordlists(&self) -> HostResult<Vec<WordlistSummary>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, name, element_count, last_updated FROM wordlist ORDER BY name",
        )?;
        let summaries = stmt
            .query_map([], |row| {
                Ok(WordlistSummary {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    element_count: row.get::<_, i64>(2)? as usize,
                    last_updated: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(summaries)
    }

    /// A wordlist with its elements, or `None`
    pub fn get_wordlist(&self, id: i64) -> HostResult<Option<WordlistRecord>> {
        let conn = self.conn()?;
        let row: Option<(i64, String, String, i64, String)> = conn
            .query_row(
                "SELECT id, name, elements, element_count, last_updated FROM wordlist WHERE id = ?1",
                params![id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?)),
            )
            .optional()?;

        let Some((id, name, elements, count, last_updated)) = row else {
            return Ok(None);
        };

        Ok(Some(WordlistRecord {
            id,
            name,
            elements: serde_json::from_str(&elements)?,
            element_count: count as usize,
            last_updated,
        }))
    }

    /// Import every `*.txt` file in `dir` as a wordlist named after the file
    /// stem, skipping names that already exist. Returns how many were added.
    pub fn bootstrap_wordlists(&self, dir: &Path) -> HostResult<usize> {
        if !dir.is_dir() {
            debug!(dir = %dir.display(), "no default wordlist directory");
            return Ok(0);
        }

        let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file() && path.extension().map(|e| e == "txt").unwrap_or(false))
            .collect();
        files.sort();

        let mut added = 0;
        for path in files {
            let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let bytes = match std::fs::read(&path) {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping unreadable wordlist");
                    continue;
                }
            };

            let elements = decode_lines(&bytes);
            let conn = self.conn()?;
            if insert(&conn, name, &elements, true)? > 0 {
                info!(wordlist = name, elements = elements.len(), "default wordlist imported");
                added += 1;
            }
        }

        Ok(added)
    }
}
