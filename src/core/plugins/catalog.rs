//! In-memory catalog of loaded plugins, keyed by name

use serde::Serialize;
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::warn;

use super::instance::PluginInstance;

/// Catalog entry: the instance and the file it came from
#[derive(Debug)]
pub struct CatalogEntry {
    pub instance: PluginInstance,
    pub path: PathBuf,
}

/// Listing row for `list_modules`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PluginSummary {
    pub name: String,
    pub category: String,
    pub version: String,
    pub description: String,
    pub plugin_id: i64,
    pub is_modified: bool,
    pub path: PathBuf,
}

#[derive(Debug, Default)]
pub struct PluginCatalog {
    entries: BTreeMap<String, CatalogEntry>,
}

impl PluginCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace by name; the last writer wins
    pub fn insert(&mut self, path: PathBuf, instance: PluginInstance) -> &PluginInstance {
        let name = instance.name().to_string();
        let entry = match self.entries.entry(name) {
            Entry::Occupied(mut slot) => {
                if slot.get().path != path {
                    warn!(
                        plugin = %slot.key(),
                        previous = %slot.get().path.display(),
                        replacement = %path.display(),
                        "plugin name already loaded from another file; replacing"
                    );
                }
                slot.insert(CatalogEntry { instance, path });
                slot.into_mut()
            }
            Entry::Vacant(slot) => slot.insert(CatalogEntry { instance, path }),
        };
        &entry.instance
    }

    pub fn remove(&mut self, name: &str) -> Option<CatalogEntry> {
        self.entries.remove(name)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn get(&self, name: &str) -> Option<&PluginInstance> {
        self.entries.get(name).map(|entry| &entry.instance)
    }

    /// Source file a plugin was loaded from
    pub fn path_of(&self, name: &str) -> Option<&Path> {
        self.entries.get(name).map(|entry| entry.path.as_path())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Plugin names in order
    pub fn names(&self) -> Vec<&str> {
        self.entries.keys().map(String::as_str).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PluginInstance)> {
        self.entries
            .iter()
            .map(|(name, entry)| (name.as_str(), &entry.instance))
    }

    /// Summary rows, by name
    pub fn summaries(&self) -> Vec<PluginSummary> {
        self.entries
            .values()
            .map(|entry| {
                let descriptor = entry.instance.descriptor();
                PluginSummary {
                    name: descriptor.name.clone(),
                    category: descriptor.category.clone(),
                    version: descriptor.version.clone(),
                    description: descriptor.description.clone(),
                    plugin_id: entry.instance.id(),
                    is_modified: descriptor.is_modified,
                    path: entry.path.clone(),
                }
            })
            .collect()
    }
}
