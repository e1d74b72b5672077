//! Plugin identity metadata

use crate::core::registry::Fingerprint;
use mlua::Table;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Description used when a plugin declares none
pub const DEFAULT_DESCRIPTION: &str = "No description.";

/// Version used when a plugin declares none
pub const DEFAULT_VERSION: &str = "0.1.0";

/// License used when a plugin declares none
pub const DEFAULT_LICENSE: &str = "MIT";

/// Oldest interpreter a plugin is assumed to need
pub const DEFAULT_MIN_RUNTIME_VERSION: &str = "5.1";

/// Identity and requirements of a plugin
///
/// Built from the instantiated plugin object. `fingerprint` and
/// `is_modified` are filled in by the host, never by the plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginDescriptor {
    /// Unique within `category`
    pub name: String,
    pub category: String,
    pub description: String,
    pub version: String,
    pub authors: Vec<String>,
    pub license: String,
    /// Module names that must resolve in the plugin runtime
    pub dependencies: Vec<String>,
    /// `major.minor` of the oldest supported interpreter
    pub min_runtime_version: String,
    pub tags: BTreeSet<String>,
    pub is_public: bool,
    pub homepage: Option<String>,
    pub repository: Option<String>,

    /// Hash of the source bytes at load time
    pub fingerprint: Option<Fingerprint>,

    /// Source differs from the trusted fingerprint. Derived on every load.
    #[serde(skip)]
    pub is_modified: bool,
}

impl PluginDescriptor {
    /// Descriptor with defaults for everything but identity
    pub fn new(name: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            category: category.into(),
            ..Self::default()
        }
    }

    /// `category/name`, for logs
    pub fn qualified_name(&self) -> String {
        if self.category.is_empty() {
            self.name.clone()
        } else {
            format!("{}/{}", self.category, self.name)
        }
    }
}

impl Default for PluginDescriptor {
    fn default() -> Self {
        Self {
            name: String::new(),
            category: String::new(),
            description: DEFAULT_DESCRIPTION.to_string(),
            version: DEFAULT_VERSION.to_string(),
            authors: Vec::new(),
            license: DEFAULT_LICENSE.to_string(),
            dependencies: Vec::new(),
            min_runtime_version: DEFAULT_MIN_RUNTIME_VERSION.to_string(),
            tags: BTreeSet::new(),
            is_public: false,
            homepage: None,
            repository: None,
            fingerprint: None,
            is_modified: false,
        }
    }
}

impl PluginDescriptor {
    /// Read identity fields from an instantiated plugin object
    ///
    /// The name falls back to the class name given to `extend`/`class`,
    /// then to the global the class was exported under.
    pub fn from_lua_object(
        object: &Table,
        class: &Table,
        export_name: Option<&str>,
    ) -> Result<Self, String> {
        let field = |key: &str| -> Result<Option<String>, String> {
            object.get::<Option<String>>(key).map_err(|e| format!("field '{}': {}", key, e))
        };
        let list = |key: &str| -> Result<Vec<String>, String> {
            Ok(object
                .get::<Option<Vec<String>>>(key)
                .map_err(|e| format!("field '{}': {}", key, e))?
                .unwrap_or_default())
        };

        let class_name = class
            .raw_get::<Option<String>>("__name")
            .map_err(|e| format!("field '__name': {}", e))?;
        let name = field("name")?
            .or(class_name)
            .or_else(|| export_name.map(str::to_string))
            .filter(|name| !name.is_empty())
            .ok_or_else(|| "plugin declares no name".to_string())?;

        Ok(Self {
            name,
            category: field("category")?.unwrap_or_default(),
            description: field("description")?.unwrap_or_else(|| DEFAULT_DESCRIPTION.to_string()),
            version: field("version")?.unwrap_or_else(|| DEFAULT_VERSION.to_string()),
            authors: list("authors")?,
            license: field("license")?.unwrap_or_else(|| DEFAULT_LICENSE.to_string()),
            dependencies: list("dependencies")?,
            min_runtime_version: field("min_runtime_version")?
                .unwrap_or_else(|| DEFAULT_MIN_RUNTIME_VERSION.to_string()),
            tags: list("tags")?.into_iter().collect(),
            is_public: object
                .get::<bool>("is_public")
                .map_err(|e| format!("field 'is_public': {}", e))?,
            homepage: field("homepage")?,
            repository: field("repository")?,
            fingerprint: None,
            is_modified: false,
        })
    }
}
