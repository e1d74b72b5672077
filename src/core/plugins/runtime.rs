//! Plugin Runtime
//!
//! One Lua 5.4 state per plugin with the full safe standard library, the
//! `nexus` bridge and the `PluginBase` prelude. Nothing is stripped and no
//! instruction or memory limit applies: vetting happens before execution,
//! not inside it.

use lazy_static::lazy_static;
use mlua::{Function, Lua, Table, Value};
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use super::bridge::{create_nexus_table, BridgeContext};
use crate::core::error::{HostError, HostResult};

/// Global name every plugin class derives from
pub const PLUGIN_BASE: &str = "PluginBase";

const PRELUDE: &str = r##"
local nexus = ...
local package = package

local PluginBase = {
    description = "No description.",
    version = "0.1.0",
    license = "MIT",
    category = "",
    authors = {},
    dependencies = {},
    min_runtime_version = "5.1",
    tags = {},
    is_public = false,
    options = {},
}
PluginBase.__index = PluginBase
PluginBase.__name = "PluginBase"

function PluginBase:extend(name)
    local cls = setmetatable({}, { __index = self })
    cls.__index = cls
    cls.__name = name
    return cls
end

function PluginBase:new()
    local instance = setmetatable({}, { __index = self })
    if type(instance.init) == "function" then
        instance:init()
    end
    return instance
end

function PluginBase:run()
    error("run() is not implemented", 2)
end

function PluginBase:get_option(name)
    return nexus.get_option(name)
end

function PluginBase:set_option(name, value)
    nexus.set_option(name, value)
end

local function class(...)
    local name, bases = nil, {}
    for i = 1, select("#", ...) do
        local arg = select(i, ...)
        if type(arg) == "string" and name == nil then
            name = arg
        elseif type(arg) == "table" then
            bases[#bases + 1] = arg
        end
    end
    local cls = { __name = name, __bases = bases }
    cls.__index = cls
    return setmetatable(cls, {
        __index = function(_, key)
            for _, base in ipairs(bases) do
                local value = base[key]
                if value ~= nil then
                    return value
                end
            end
        end,
    })
end

local function parents_of(t)
    local parents = {}
    local mt = getmetatable(t)
    if type(mt) == "table" then
        local index = rawget(mt, "__index")
        if type(index) == "table" then
            parents[#parents + 1] = index
        end
    end
    local declared = rawget(t, "__bases")
    if type(declared) == "table" then
        for _, base in ipairs(declared) do
            if type(base) == "table" then
                parents[#parents + 1] = base
            end
        end
    end
    return parents
end

local function derives_from_base(t)
    local seen, queue = {}, { t }
    while #queue > 0 do
        local current = table.remove(queue, 1)
        if not seen[current] then
            seen[current] = true
            for _, parent in ipairs(parents_of(current)) do
                if parent == PluginBase then
                    return true
                end
                queue[#queue + 1] = parent
            end
        end
    end
    return false
end

local function is_plugin_class(t)
    return type(t) == "table"
        and t ~= PluginBase
        and derives_from_base(t)
        and type(t.run) == "function"
end

local function is_resolvable(name)
    if package.loaded[name] ~= nil or package.preload[name] ~= nil then
        return true
    end
    if package.searchpath(name, package.path) then
        return true
    end
    if package.searchpath(name, package.cpath) then
        return true
    end
    return false
end

_G.PluginBase = PluginBase
_G.class = class
_G.nexus = nexus
nexus.PluginBase = PluginBase
package.loaded["nexus"] = nexus

return {
    is_plugin_class = is_plugin_class,
    is_resolvable = is_resolvable,
}
"##;

lazy_static! {
    static ref VERSION_PATTERN: Regex = Regex::new(r"(\d+)(?:\.(\d+))?").unwrap();
}

/// `major.minor` pair found anywhere in `text`; a missing minor reads as 0
pub fn parse_version(text: &str) -> Option<(u32, u32)> {
    let caps = VERSION_PATTERN.captures(text)?;
    let major = caps.get(1)?.as_str().parse().ok()?;
    let minor = match caps.get(2) {
        Some(m) => m.as_str().parse().ok()?,
        None => 0,
    };
    Some((major, minor))
}

/// A table exported by a chunk that qualifies as a plugin class
#[derive(Debug, Clone)]
pub struct PluginCandidate {
    /// Global name, `None` for the chunk's return value
    pub export_name: Option<String>,
    pub class: Table,
}

/// A Lua state prepared for one plugin
pub struct PluginRuntime {
    is_plugin_class: Function,
    is_resolvable: Function,
    /// `_VERSION` as seen before any plugin code ran
    version: String,
    lua: Lua,
}

impl PluginRuntime {
    /// Fresh state with the bridge and prelude installed
    pub fn new(ctx: &BridgeContext) -> HostResult<Self> {
        let lua = Lua::new();
        let version: String = lua.globals().get("_VERSION")?;
        let nexus = create_nexus_table(&lua, ctx)?;
        let helpers: Table = lua.load(PRELUDE).set_name("=nexus_prelude").call(nexus)?;

        Ok(Self {
            is_plugin_class: helpers.get("is_plugin_class")?,
            is_resolvable: helpers.get("is_resolvable")?,
            version,
            lua,
        })
    }

    pub fn lua(&self) -> &Lua {
        &self.lua
    }

    /// Interpreter version, e.g. "Lua 5.4". Captured when the state is
    /// created, so later writes to the `_VERSION` global do not change it.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Parsed interpreter version
    pub fn version_pair(&self) -> HostResult<(u32, u32)> {
        parse_version(&self.version).ok_or_else(|| {
            HostError::Lua(format!("unrecognized interpreter version '{}'", self.version))
        })
    }

    /// Run a plugin chunk and collect its plugin classes: the returned table
    /// first, then new globals by name
    pub fn execute(&self, path: &Path, source: &[u8]) -> HostResult<Vec<PluginCandidate>> {
        let before = self.global_names()?;

        let returned: Value = self
            .lua
            .load(source)
            .set_name(format!("@{}", path.display()))
            .eval()
            .map_err(|e| HostError::load(path, e.to_string()))?;

        let mut exports: Vec<(Option<String>, Table)> = Vec::new();
        if let Value::Table(table) = returned {
            exports.push((None, table));
        }
        for (name, table) in self.new_global_tables(&before)? {
            exports.push((Some(name), table));
        }

        let mut seen = BTreeSet::new();
        let mut candidates = Vec::new();
        for (export_name, class) in exports {
            if !seen.insert(class.to_pointer() as usize) {
                continue;
            }
            if self.is_plugin_class.call::<bool>(class.clone())? {
                candidates.push(PluginCandidate { export_name, class });
            }
        }
        Ok(candidates)
    }

    /// `class:new()`, which also runs `init` when defined
    pub fn instantiate(&self, class: &Table) -> HostResult<Table> {
        let new: Function = class.get("new")?;
        Ok(new.call::<Table>(class.clone())?)
    }

    /// Whether `require(name)` could be satisfied in this state
    pub fn is_resolvable(&self, name: &str) -> HostResult<bool> {
        Ok(self.is_resolvable.call::<bool>(name)?)
    }

    fn global_names(&self) -> HostResult<BTreeSet<String>> {
        let mut names = BTreeSet::new();
        for pair in self.lua.globals().pairs::<Value, Value>() {
            let (key, _) = pair?;
            if let Value::String(key) = key {
                names.insert(key.to_str()?.to_string());
            }
        }
        Ok(names)
    }

    fn new_global_tables(&self, before: &BTreeSet<String>) -> HostResult<BTreeMap<String, Table>> {
        let mut tables = BTreeMap::new();
        for pair in self.lua.globals().pairs::<Value, Value>() {
            let (key, value) = pair?;
            if let (Value::String(key), Value::Table(table)) = (key, value) {
                let key = key.to_str()?.to_string();
                if !before.contains(&key) {
                    tables.insert(key, table);
                }
            }
        }
        Ok(tables)
    }
}
