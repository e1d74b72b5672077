//! A loaded, registered plugin

use mlua::{Function, Table};
use std::path::{Path, PathBuf};
use tracing::info;

use super::bridge::{LogEntry, SharedBridgeState};
use super::descriptor::PluginDescriptor;
use super::options::{OptionSpec, OptionValue};
use super::runtime::PluginRuntime;
use crate::core::error::{HostError, HostResult};

/// Plugin object plus the runtime that owns it
pub struct PluginInstance {
    descriptor: PluginDescriptor,
    plugin_id: i64,
    path: PathBuf,
    state: SharedBridgeState,
    object: Table,
    runtime: PluginRuntime,
}

impl PluginInstance {
    pub(crate) fn new(
        descriptor: PluginDescriptor,
        plugin_id: i64,
        path: PathBuf,
        state: SharedBridgeState,
        object: Table,
        runtime: PluginRuntime,
    ) -> Self {
        Self {
            descriptor,
            plugin_id,
            path,
            state,
            object,
            runtime,
        }
    }

    pub fn descriptor(&self) -> &PluginDescriptor {
        &self.descriptor
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    /// Registry id
    pub fn id(&self) -> i64 {
        self.plugin_id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Source differs from the trusted fingerprint
    pub fn is_modified(&self) -> bool {
        self.descriptor.is_modified
    }

    /// Declared options with their current overrides
    pub fn options(&self) -> Vec<OptionSpec> {
        self.state
            .lock()
            .map(|state| state.options.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Override-or-default value of an option
    pub fn get_option_value(&self, name: &str) -> Option<OptionValue> {
        self.state
            .lock()
            .ok()
            .and_then(|state| state.options.value(name))
    }

    /// Set an override; kind and choices are validated
    pub fn set_option_value(&self, name: &str, value: OptionValue) -> HostResult<()> {
        self.state
            .lock()
            .map_err(|_| HostError::Lua("bridge state poisoned".to_string()))?
            .options
            .set(name, value)
    }

    /// Required options that resolve to nothing
    pub fn missing_required(&self) -> Vec<String> {
        self.state
            .lock()
            .map(|state| {
                state
                    .options
                    .missing_required()
                    .into_iter()
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Messages the plugin logged through `nexus.log`
    pub fn logs(&self) -> Vec<LogEntry> {
        self.state
            .lock()
            .map(|state| state.logs.clone())
            .unwrap_or_default()
    }

    /// Result ids the plugin recorded
    pub fn recorded_results(&self) -> Vec<i64> {
        self.state
            .lock()
            .map(|state| state.results.clone())
            .unwrap_or_default()
    }

    /// Invoke `run`; refused while a required option is unresolved
    pub fn run(&self) -> HostResult<()> {
        if let Some(option) = self.missing_required().into_iter().next() {
            return Err(HostError::MissingOption {
                plugin: self.descriptor.name.clone(),
                option,
            });
        }

        let execution_error = |message: String| HostError::Execution {
            plugin: self.descriptor.name.clone(),
            message,
        };

        let run: Function = self
            .object
            .get("run")
            .map_err(|e| execution_error(e.to_string()))?;

        info!(plugin = %self.descriptor.qualified_name(), "running plugin");
        run.call::<()>(self.object.clone())
            .map_err(|e| execution_error(e.to_string()))
    }

    /// Interpreter state the plugin lives in
    pub fn runtime(&self) -> &PluginRuntime {
        &self.runtime
    }
}

impl std::fmt::Debug for PluginInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginInstance")
            .field("descriptor", &self.descriptor)
            .field("plugin_id", &self.plugin_id)
            .field("path", &self.path)
            .finish()
    }
}
