//! Dynamic Loader
//!
//! Takes a candidate file from disk to a registered plugin instance:
//!
//! ```text
//! discovered -> analyzed -> (rejected | approved) -> executed
//!            -> instantiated -> compatibility checked -> registered
//! ```
//!
//! Analysis happens before any plugin code runs. An unsafe verdict stops
//! the file unless the [`OverridePrompt`] approves it. Every failure is
//! per file: `load` and `load_all` log and continue.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::bridge::BridgeContext;
use super::catalog::{PluginCatalog, PluginSummary};
use super::descriptor::PluginDescriptor;
use super::instance::PluginInstance;
use super::options::OptionSchema;
use super::prompt::{DeclineAll, OverridePrompt};
use super::runtime::{parse_version, PluginRuntime};
use crate::core::config::HostConfig;
use crate::core::discovery::DiscoveryEngine;
use crate::core::error::{HostError, HostResult};
use crate::core::registry::{Fingerprint, IntegrityRegistry};
use crate::core::security::{SecurityAnalyzer, SecurityReport, Thresholds};

/// Steps of the load pipeline, for logging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStage {
    Discovered,
    Analyzed,
    Rejected,
    Approved,
    Executed,
    Instantiated,
    CompatibilityChecked,
    Registered,
}

impl LoadStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoadStage::Discovered => "discovered",
            LoadStage::Analyzed => "analyzed",
            LoadStage::Rejected => "rejected",
            LoadStage::Approved => "approved",
            LoadStage::Executed => "executed",
            LoadStage::Instantiated => "instantiated",
            LoadStage::CompatibilityChecked => "compatibility_checked",
            LoadStage::Registered => "registered",
        }
    }
}

impl fmt::Display for LoadStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn stage(path: &Path, stage: LoadStage) {
    debug!(path = %path.display(), stage = %stage, "load stage");
}

/// Loads, vets and catalogs plugins
pub struct DynamicLoader {
    analyzer: SecurityAnalyzer,
    thresholds: Thresholds,
    discovery: DiscoveryEngine,
    registry: Arc<IntegrityRegistry>,
    prompt: Box<dyn OverridePrompt>,
    results_dir: PathBuf,
    catalog: PluginCatalog,
}

impl DynamicLoader {
    /// Loader configured from `config`; unsafe files are declined
    pub fn new(config: &HostConfig, registry: Arc<IntegrityRegistry>) -> Self {
        Self {
            analyzer: SecurityAnalyzer::new(config.external_tool.clone()),
            thresholds: config.thresholds,
            discovery: DiscoveryEngine::new(config.extensions.clone()),
            registry,
            prompt: Box::new(DeclineAll),
            results_dir: config.results_dir.clone(),
            catalog: PluginCatalog::new(),
        }
    }

    pub fn with_prompt(mut self, prompt: Box<dyn OverridePrompt>) -> Self {
        self.prompt = prompt;
        self
    }

    pub fn with_analyzer(mut self, analyzer: SecurityAnalyzer) -> Self {
        self.analyzer = analyzer;
        self
    }

    pub fn registry(&self) -> &Arc<IntegrityRegistry> {
        &self.registry
    }

    pub fn catalog(&self) -> &PluginCatalog {
        &self.catalog
    }

    pub fn get(&self, name: &str) -> Option<&PluginInstance> {
        self.catalog.get(name)
    }

    /// Like [`get`](Self::get), but a missing plugin is an error
    pub fn require(&self, name: &str) -> HostResult<&PluginInstance> {
        self.catalog.get(name).ok_or_else(|| HostError::PluginNotFound {
            name: name.to_string(),
        })
    }

    /// Summary of every cataloged plugin
    pub fn list_modules(&self) -> Vec<PluginSummary> {
        self.catalog.summaries()
    }

    /// Run the full pipeline for one file without touching the catalog
    pub fn load_file(&mut self, path: &Path) -> HostResult<PluginInstance> {
        stage(path, LoadStage::Discovered);

        let source = std::fs::read(path).map_err(|e| HostError::load(path, e.to_string()))?;
        let report = self.analyzer.analyze_source(path, &source, self.thresholds);
        stage(path, LoadStage::Analyzed);

        self.vet(path, &report)?;
        stage(path, LoadStage::Approved);

        let ctx = BridgeContext::new(self.registry.clone(), self.results_dir.clone());
        let runtime = PluginRuntime::new(&ctx)?;
        let candidate = runtime
            .execute(path, &source)?
            .into_iter()
            .next()
            .ok_or_else(|| HostError::load(path, "no plugin class deriving from PluginBase"))?;
        stage(path, LoadStage::Executed);

        let object = runtime
            .instantiate(&candidate.class)
            .map_err(|e| HostError::load(path, e.to_string()))?;
        let mut descriptor =
            PluginDescriptor::from_lua_object(&object, &candidate.class, candidate.export_name.as_deref())
                .map_err(|message| HostError::load(path, message))?;
        let options = OptionSchema::from_lua_list(
            object
                .get("options")
                .map_err(|e| HostError::load(path, e.to_string()))?,
        )
        .map_err(|e| HostError::load(path, e.to_string()))?;
        stage(path, LoadStage::Instantiated);

        check_runtime_version(path, &descriptor, &runtime)?;
        for dependency in &descriptor.dependencies {
            if !runtime.is_resolvable(dependency)? {
                return Err(HostError::UnsatisfiedDependency {
                    plugin: descriptor.name.clone(),
                    dependency: dependency.clone(),
                });
            }
        }
        stage(path, LoadStage::CompatibilityChecked);

        let fingerprint = Fingerprint::of_bytes(&source);
        let registration = self
            .registry
            .register_fingerprint(&descriptor, fingerprint.clone())?;
        descriptor.fingerprint = Some(fingerprint);
        descriptor.is_modified = registration.is_tampered();

        {
            let mut state = ctx
                .state
                .lock()
                .map_err(|_| HostError::Lua("bridge state poisoned".to_string()))?;
            state.plugin = descriptor.name.clone();
            state.plugin_id = Some(registration.plugin_id);
            state.options = options;
        }
        stage(path, LoadStage::Registered);

        info!(
            plugin = %descriptor.qualified_name(),
            plugin_id = registration.plugin_id,
            modified = descriptor.is_modified,
            "plugin loaded"
        );

        Ok(PluginInstance::new(
            descriptor,
            registration.plugin_id,
            path.to_path_buf(),
            ctx.state,
            object,
            runtime,
        ))
    }

    fn vet(&mut self, path: &Path, report: &SecurityReport) -> HostResult<()> {
        if report.is_safe() {
            return Ok(());
        }

        let warnings = report.warnings();
        for warning in &warnings {
            warn!(path = %path.display(), "{}", warning);
        }

        if self.prompt.confirm(path, report) {
            warn!(path = %path.display(), "loading despite unsafe verdict");
            return Ok(());
        }

        stage(path, LoadStage::Rejected);
        Err(HostError::SecurityRejected {
            path: path.to_path_buf(),
            warnings: warnings.len(),
        })
    }

    /// Load one file into the catalog; failures are logged
    pub fn load(&mut self, path: &Path) -> Option<&PluginInstance> {
        match self.load_file(path) {
            Ok(instance) => Some(self.catalog.insert(path.to_path_buf(), instance)),
            Err(e) => {
                warn!(path = %path.display(), kind = e.kind(), error = %e, "plugin not loaded");
                None
            }
        }
    }

    /// Reload a cataloged plugin from its recorded file. The old entry
    /// stays in place unless the reload succeeds.
    pub fn reload(&mut self, name: &str) -> Option<&PluginInstance> {
        let Some(path) = self.catalog.path_of(name).map(Path::to_path_buf) else {
            warn!(plugin = %name, "cannot reload: plugin is not loaded");
            return None;
        };

        match self.load_file(&path) {
            Ok(instance) => {
                if instance.name() != name {
                    info!(previous = %name, current = %instance.name(), "plugin renamed on reload");
                    self.catalog.remove(name);
                }
                Some(self.catalog.insert(path, instance))
            }
            Err(e) => {
                warn!(plugin = %name, kind = e.kind(), error = %e, "reload failed; keeping previous instance");
                None
            }
        }
    }

    /// Replace the catalog with every plugin under `root`
    pub fn load_all(&mut self, root: &Path) -> &PluginCatalog {
        self.catalog.clear();

        let candidates = self.discovery.discover(root);
        let total = candidates.len();
        let mut loaded = 0;
        for path in candidates {
            if self.load(&path).is_some() {
                loaded += 1;
            }
        }

        info!(root = %root.display(), loaded, candidates = total, "plugins loaded");
        &self.catalog
    }
}

/// Host interpreter must be at least the plugin's `min_runtime_version`
fn check_runtime_version(
    path: &Path,
    descriptor: &PluginDescriptor,
    runtime: &PluginRuntime,
) -> HostResult<()> {
    let required = parse_version(&descriptor.min_runtime_version).ok_or_else(|| {
        HostError::load(
            path,
            format!("invalid min_runtime_version '{}'", descriptor.min_runtime_version),
        )
    })?;
    let actual = runtime.version_pair()?;

    if actual < required {
        return Err(HostError::IncompatibleVersion {
            plugin: descriptor.name.clone(),
            required: descriptor.min_runtime_version.clone(),
            actual: format!("{}.{}", actual.0, actual.1),
        });
    }
    Ok(())
}
