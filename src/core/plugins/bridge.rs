//! nexus.* Bridge API
//!
//! Host capabilities exposed to plugins: logging, option access, wordlists
//! and result recording. State shared with the host lives behind one
//! [`SharedBridgeState`] per plugin.

use mlua::{Function, Lua, Result as LuaResult, Table, Value};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, error, info, trace, warn};

use super::options::{OptionSchema, OptionValue};
use crate::core::registry::IntegrityRegistry;

/// Current API version for plugin compatibility
pub const API_VERSION: &str = "1.0";

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// A log entry from a plugin
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub level: String,
    pub message: String,
    pub plugin: String,
}

/// Per-plugin state reachable from both sides of the bridge
#[derive(Debug, Default)]
pub struct BridgeState {
    /// Plugin name, set once the descriptor is known
    pub plugin: String,
    /// Registry id, set on registration
    pub plugin_id: Option<i64>,
    pub options: OptionSchema,
    pub logs: Vec<LogEntry>,
    /// Result ids recorded by this plugin
    pub results: Vec<i64>,
}

pub type SharedBridgeState = Arc<Mutex<BridgeState>>;

/// What the bridge needs from the host
#[derive(Clone)]
pub struct BridgeContext {
    pub state: SharedBridgeState,
    pub registry: Arc<IntegrityRegistry>,
    pub results_dir: PathBuf,
}

impl BridgeContext {
    pub fn new(registry: Arc<IntegrityRegistry>, results_dir: PathBuf) -> Self {
        Self {
            state: Arc::new(Mutex::new(BridgeState::default())),
            registry,
            results_dir,
        }
    }
}

fn lock(state: &SharedBridgeState) -> LuaResult<MutexGuard<'_, BridgeState>> {
    state
        .lock()
        .map_err(|_| mlua::Error::RuntimeError("bridge state poisoned".to_string()))
}

fn runtime_error(message: impl std::fmt::Display) -> mlua::Error {
    mlua::Error::RuntimeError(message.to_string())
}

/// Create the `nexus` table handed to plugins
pub fn create_nexus_table(lua: &Lua, ctx: &BridgeContext) -> LuaResult<Table> {
    let nexus = lua.create_table()?;

    nexus.set("api_version", API_VERSION)?;
    nexus.set("results_dir", ctx.results_dir.to_string_lossy().into_owned())?;

    nexus.set("log", create_log_function(lua, ctx.state.clone())?)?;
    nexus.set("get_option", create_get_option_function(lua, ctx.state.clone())?)?;
    nexus.set("set_option", create_set_option_function(lua, ctx.state.clone())?)?;
    nexus.set("record_result", create_record_result_function(lua, ctx)?)?;
    nexus.set("wordlist", create_wordlist_function(lua, ctx.registry.clone())?)?;
    nexus.set("wordlists", create_wordlists_function(lua, ctx.registry.clone())?)?;

    Ok(nexus)
}

/// `nexus.log(level, message)`; unknown levels log at info
fn create_log_function(lua: &Lua, state: SharedBridgeState) -> LuaResult<Function> {
    lua.create_function(move |_, (level, message): (String, String)| {
        let level = level.to_lowercase();
        let level = if LOG_LEVELS.contains(&level.as_str()) {
            level
        } else {
            "info".to_string()
        };

        let mut state = lock(&state)?;
        let plugin = state.plugin.clone();
        match level.as_str() {
            "trace" => trace!(plugin = %plugin, "{}", message),
            "debug" => debug!(plugin = %plugin, "{}", message),
            "warn" => warn!(plugin = %plugin, "{}", message),
            "error" => error!(plugin = %plugin, "{}", message),
            _ => info!(plugin = %plugin, "{}", message),
        }

        state.logs.push(LogEntry {
            level,
            message,
            plugin,
        });
        Ok(())
    })
}

/// `nexus.get_option(name)` returns the resolved value or nil
fn create_get_option_function(lua: &Lua, state: SharedBridgeState) -> LuaResult<Function> {
    lua.create_function(move |_, name: String| {
        let state = lock(&state)?;
        Ok(state.options.value(&name))
    })
}

/// `nexus.set_option(name, value)` raises on unknown names or bad values
fn create_set_option_function(lua: &Lua, state: SharedBridgeState) -> LuaResult<Function> {
    lua.create_function(move |_, (name, value): (String, Value)| {
        let mut state = lock(&state)?;
        let kind = state
            .options
            .get(&name)
            .map(|spec| spec.kind)
            .ok_or_else(|| runtime_error(format!("no such option '{}'", name)))?;

        match OptionValue::from_lua_value(kind, &value).map_err(runtime_error)? {
            Some(value) => state.options.set(&name, value).map_err(runtime_error)?,
            None => state.options.clear(&name).map_err(runtime_error)?,
        }
        Ok(())
    })
}

/// `nexus.record_result(artifact_path)` stores a result with the current
/// option snapshot and returns its id
fn create_record_result_function(lua: &Lua, ctx: &BridgeContext) -> LuaResult<Function> {
    let state = ctx.state.clone();
    let registry = ctx.registry.clone();
    lua.create_function(move |_, artifact_path: String| {
        let (plugin_id, snapshot) = {
            let state = lock(&state)?;
            let plugin_id = state
                .plugin_id
                .ok_or_else(|| runtime_error("plugin is not registered"))?;
            (plugin_id, state.options.snapshot())
        };

        let result_id = registry
            .record_result(plugin_id, &artifact_path, &snapshot)
            .map_err(runtime_error)?;
        lock(&state)?.results.push(result_id);
        Ok(result_id)
    })
}

/// `nexus.wordlist(id)` returns the elements, or nil for an unknown id
fn create_wordlist_function(lua: &Lua, registry: Arc<IntegrityRegistry>) -> LuaResult<Function> {
    lua.create_function(move |_, id: i64| {
        let record = registry.get_wordlist(id).map_err(runtime_error)?;
        Ok(record.map(|record| record.elements))
    })
}

/// `nexus.wordlists()` lists `{ id, name, count }` tables
fn create_wordlists_function(lua: &Lua, registry: Arc<IntegrityRegistry>) -> LuaResult<Function> {
    lua.create_function(move |lua, ()| {
        let summaries = registry.wordlists().map_err(runtime_error)?;
        let list = lua.create_table()?;
        for (index, summary) in summaries.into_iter().enumerate() {
            let entry = lua.create_table()?;
            entry.set("id", summary.id)?;
            entry.set("name", summary.name)?;
            entry.set("count", summary.element_count)?;
            list.set(index + 1, entry)?;
        }
        Ok(list)
    })
}
