//! Append-only run results

use super::IntegrityRegistry;
use crate::core::error::{HostError, HostResult};
use chrono::{SecondsFormat, Utc};
use rusqlite::params;
use serde::Serialize;
use tracing::info;

/// One recorded plugin run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultRecord {
    pub id: i64,
    pub plugin_id: i64,
    pub artifact_path: String,
    /// RFC 3339, assigned at insert
    pub created_at: String,
    /// Resolved option values used for the run
    pub options: serde_json::Value,
}

impl IntegrityRegistry {
    /// Record a run. Fails if `plugin_id` does not exist.
    pub fn record_result(
        &self,
        plugin_id: i64,
        artifact_path: &str,
        options: &serde_json::Value,
    ) -> HostResult<i64> {
        let conn = self.conn()?;
        let created_at = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);
        conn.execute(
            "INSERT INTO result (module_id, artifact_path, created_at, options) VALUES (?1, ?2, ?3, ?4)",
            params![plugin_id, artifact_path, created_at, serde_json::to_string(options)?],
        )
        .map_err(|e| {
            HostError::registry(format!("cannot record result for plugin {}: {}", plugin_id, e))
        })?;

        let id = conn.last_insert_rowid();
        info!(plugin_id, result_id = id, artifact = artifact_path, "result recorded");
        Ok(id)
    }

    /// Results, newest first, optionally for one plugin
    pub fn results(&self, plugin_id: Option<i64>) -> HostResult<Vec<ResultRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, module_id, artifact_path, created_at, options FROM result
             WHERE ?1 IS NULL OR module_id = ?1
             ORDER BY created_at DESC, id DESC",
        )?;

        let rows = stmt
            .query_map(params![plugin_id], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(id, plugin_id, artifact_path, created_at, options)| -> HostResult<ResultRecord> {
                Ok(ResultRecord {
                    id,
                    plugin_id,
                    artifact_path,
                    created_at,
                    options: serde_json::from_str(&options)?,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::plugins::PluginDescriptor;
    use serde_json::json;
    use tempfile::TempDir;

    fn registry_with_plugin() -> (IntegrityRegistry, i64, TempDir) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("dns.lua");
        std::fs::write(&path, "-- dns\n").unwrap();
        let registry = IntegrityRegistry::in_memory().unwrap();
        let id = registry
            .register(&PluginDescriptor::new("DnsEnum", "DNS"), &path)
            .unwrap()
            .plugin_id;
        (registry, id, dir)
    }

    #[test]
    fn test_record_and_list() {
        let (registry, plugin_id, _dir) = registry_with_plugin();
        let options = json!({ "domain": "example.com" });

        let first = registry.record_result(plugin_id, "results/dns_1.json", &options).unwrap();
        let second = registry.record_result(plugin_id, "results/dns_2.json", &options).unwrap();
        assert!(second > first);

        let results = registry.results(Some(plugin_id)).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id, second);
        assert_eq!(results[0].options["domain"], "example.com");
        assert!(chrono::DateTime::parse_from_rfc3339(&results[0].created_at).is_ok());
    }

    #[test]
    fn test_record_unknown_plugin_fails() {
        let registry = IntegrityRegistry::in_memory().unwrap();
        let err = registry.record_result(5, "out.json", &json!({})).unwrap_err();
        assert_eq!(err.kind(), "registry");
        assert!(registry.results(None).unwrap().is_empty());
    }

    #[test]
    fn test_filter_by_plugin() {
        let (registry, plugin_id, dir) = registry_with_plugin();
        let other_path = dir.path().join("other.lua");
        std::fs::write(&other_path, "-- other\n").unwrap();
        let other = registry
            .register(&PluginDescriptor::new("Other", "URL"), &other_path)
            .unwrap()
            .plugin_id;

        registry.record_result(plugin_id, "a.json", &json!({})).unwrap();
        registry.record_result(other, "b.json", &json!({})).unwrap();

        assert_eq!(registry.results(None).unwrap().len(), 2);
        let filtered = registry.results(Some(other)).unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].artifact_path, "b.json");
    }
}
