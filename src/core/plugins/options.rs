//! Typed option schema
//!
//! Each option resolves to its override if one is set, else its default.
//! A required option resolving to nothing blocks `run()`.

use crate::core::error::{HostError, HostResult};
use mlua::{IntoLua, Lua, Table, Value};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use std::path::PathBuf;

/// Kind of value an option holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionKind {
    String,
    Integer,
    Boolean,
    Choice,
    Wordlist,
}

impl OptionKind {
    /// Parse a kind name as written in plugin sources
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "string" | "str" => Some(OptionKind::String),
            "integer" | "int" | "number" => Some(OptionKind::Integer),
            "boolean" | "bool" => Some(OptionKind::Boolean),
            "choice" | "select" => Some(OptionKind::Choice),
            "wordlist" => Some(OptionKind::Wordlist),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OptionKind::String => "string",
            OptionKind::Integer => "integer",
            OptionKind::Boolean => "boolean",
            OptionKind::Choice => "choice",
            OptionKind::Wordlist => "wordlist",
        }
    }
}

impl fmt::Display for OptionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A wordlist option points at exactly one source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WordlistSelection {
    /// A wordlist stored in the registry
    Stored(i64),
    /// A user-supplied file
    Custom(PathBuf),
}

/// A concrete option value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptionValue {
    String(String),
    Integer(i64),
    Boolean(bool),
    Choice(String),
    Wordlist(WordlistSelection),
}

impl OptionValue {
    /// Kind this value belongs to
    pub fn kind(&self) -> OptionKind {
        match self {
            OptionValue::String(_) => OptionKind::String,
            OptionValue::Integer(_) => OptionKind::Integer,
            OptionValue::Boolean(_) => OptionKind::Boolean,
            OptionValue::Choice(_) => OptionKind::Choice,
            OptionValue::Wordlist(_) => OptionKind::Wordlist,
        }
    }

    /// JSON form used in result snapshots
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            OptionValue::String(s) | OptionValue::Choice(s) => json!(s),
            OptionValue::Integer(i) => json!(i),
            OptionValue::Boolean(b) => json!(b),
            OptionValue::Wordlist(WordlistSelection::Stored(id)) => json!({ "wordlist_id": id }),
            OptionValue::Wordlist(WordlistSelection::Custom(path)) => {
                json!({ "custom_path": path.to_string_lossy() })
            }
        }
    }

    /// Parse command-line text (`--set name=value`) for a kind
    ///
    /// Wordlists accept `id:3`, a bare number, `path:/x` or any other path.
    pub fn parse_text(kind: OptionKind, text: &str) -> Result<Self, String> {
        match kind {
            OptionKind::String => Ok(OptionValue::String(text.to_string())),
            OptionKind::Choice => Ok(OptionValue::Choice(text.to_string())),
            OptionKind::Integer => text
                .trim()
                .parse()
                .map(OptionValue::Integer)
                .map_err(|_| format!("'{}' is not an integer", text)),
            OptionKind::Boolean => match text.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" | "on" | "1" => Ok(OptionValue::Boolean(true)),
                "false" | "no" | "off" | "0" => Ok(OptionValue::Boolean(false)),
                _ => Err(format!("'{}' is not a boolean", text)),
            },
            OptionKind::Wordlist => {
                let text = text.trim();
                if let Some(id) = text.strip_prefix("id:") {
                    return id
                        .trim()
                        .parse()
                        .map(|id| OptionValue::Wordlist(WordlistSelection::Stored(id)))
                        .map_err(|_| format!("'{}' is not a wordlist id", id));
                }
                if let Ok(id) = text.parse() {
                    return Ok(OptionValue::Wordlist(WordlistSelection::Stored(id)));
                }
                let path = text.strip_prefix("path:").unwrap_or(text);
                Ok(OptionValue::Wordlist(WordlistSelection::Custom(PathBuf::from(path))))
            }
        }
    }

    /// Convert a Lua value for a kind; `nil` converts to `None`
    pub fn from_lua_value(kind: OptionKind, value: &Value) -> Result<Option<Self>, String> {
        let converted = match (kind, value) {
            (_, Value::Nil) => return Ok(None),
            (OptionKind::String | OptionKind::Choice, Value::String(s)) => {
                let s = s.to_str().map_err(|e| e.to_string())?.to_string();
                if kind == OptionKind::Choice {
                    OptionValue::Choice(s)
                } else {
                    OptionValue::String(s)
                }
            }
            (OptionKind::String, Value::Integer(i)) => OptionValue::String(i.to_string()),
            (OptionKind::String, Value::Number(n)) => OptionValue::String(n.to_string()),
            (OptionKind::Integer, Value::Integer(i)) => OptionValue::Integer(*i),
            (OptionKind::Integer, Value::Number(n)) if n.fract() == 0.0 => {
                OptionValue::Integer(*n as i64)
            }
            (OptionKind::Boolean, Value::Boolean(b)) => OptionValue::Boolean(*b),
            (OptionKind::Wordlist, Value::Integer(id)) => {
                OptionValue::Wordlist(WordlistSelection::Stored(*id))
            }
            (OptionKind::Wordlist, Value::String(s)) => OptionValue::Wordlist(
                WordlistSelection::Custom(PathBuf::from(s.to_str().map_err(|e| e.to_string())?.to_string())),
            ),
            (OptionKind::Wordlist, Value::Table(t)) => wordlist_from_table(t)?,
            (kind, other) => {
                return Err(format!("expected {}, got {}", kind, other.type_name()));
            }
        };
        Ok(Some(converted))
    }
}

fn wordlist_from_table(table: &Table) -> Result<OptionValue, String> {
    let id: Option<i64> = table.get("id").map_err(|e| e.to_string())?;
    let path: Option<String> = table.get("path").map_err(|e| e.to_string())?;

    match (id, path) {
        (Some(id), None) => Ok(OptionValue::Wordlist(WordlistSelection::Stored(id))),
        (None, Some(path)) => Ok(OptionValue::Wordlist(WordlistSelection::Custom(PathBuf::from(path)))),
        (Some(_), Some(_)) => Err("a wordlist takes either an id or a path, not both".to_string()),
        (None, None) => Err("a wordlist needs an id or a path".to_string()),
    }
}

impl IntoLua for OptionValue {
    fn into_lua(self, lua: &Lua) -> mlua::Result<Value> {
        match self {
            OptionValue::String(s) | OptionValue::Choice(s) => s.into_lua(lua),
            OptionValue::Integer(i) => Ok(Value::Integer(i)),
            OptionValue::Boolean(b) => Ok(Value::Boolean(b)),
            OptionValue::Wordlist(selection) => {
                let table = lua.create_table()?;
                match selection {
                    WordlistSelection::Stored(id) => table.set("id", id)?,
                    WordlistSelection::Custom(path) => {
                        table.set("path", path.to_string_lossy().into_owned())?
                    }
                }
                Ok(Value::Table(table))
            }
        }
    }
}

// ============================================================================
// OptionSpec
// ============================================================================

/// One declared option
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OptionSpec {
    pub name: String,
    pub description: String,
    pub kind: OptionKind,
    pub default: Option<OptionValue>,
    pub required: bool,
    /// Allowed values for `Choice`
    pub choices: Vec<String>,
    /// Override, absent until set
    pub value: Option<OptionValue>,
}

impl OptionSpec {
    /// Optional option of a kind, no default
    pub fn new(name: impl Into<String>, kind: OptionKind) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            kind,
            default: None,
            required: false,
            choices: Vec::new(),
            value: None,
        }
    }

    /// Override if set, else default
    pub fn resolved(&self) -> Option<&OptionValue> {
        self.value.as_ref().or(self.default.as_ref())
    }

    /// Required and resolving to nothing
    pub fn is_missing(&self) -> bool {
        self.required && self.resolved().is_none()
    }

    /// Check a value against kind and choices, coercing strings to choices
    pub fn validate(&self, value: OptionValue) -> HostResult<OptionValue> {
        let value = match (self.kind, value) {
            (OptionKind::Choice, OptionValue::String(s)) => OptionValue::Choice(s),
            (_, value) => value,
        };

        if value.kind() != self.kind {
            return Err(HostError::invalid_option(
                &self.name,
                format!("expected {}, got {}", self.kind, value.kind()),
            ));
        }

        if let OptionValue::Choice(choice) = &value {
            if !self.choices.is_empty() && !self.choices.contains(choice) {
                return Err(HostError::invalid_option(
                    &self.name,
                    format!("'{}' is not one of {}", choice, self.choices.join(", ")),
                ));
            }
        }

        Ok(value)
    }

    /// Parse an entry of a plugin's `options` list
    pub fn from_lua_table(table: &Table) -> Result<Self, String> {
        let name: String = table
            .get::<Option<String>>("name")
            .map_err(|e| e.to_string())?
            .filter(|n| !n.is_empty())
            .ok_or_else(|| "option without a name".to_string())?;

        let kind_name: Option<String> = match table.get::<Option<String>>("kind").map_err(|e| e.to_string())? {
            Some(kind) => Some(kind),
            None => table.get::<Option<String>>("type").map_err(|e| e.to_string())?,
        };
        let kind = match kind_name {
            Some(k) => OptionKind::parse(&k).ok_or_else(|| format!("option '{}': unknown kind '{}'", name, k))?,
            None => OptionKind::String,
        };

        let description: Option<String> = table.get("description").map_err(|e| e.to_string())?;
        let required: bool = table.get("required").map_err(|e| e.to_string())?;
        let choices: Option<Vec<String>> = table.get("choices").map_err(|e| e.to_string())?;
        let default_value: Value = table.get("default").map_err(|e| e.to_string())?;

        let mut spec = OptionSpec {
            name: name.clone(),
            description: description.unwrap_or_default(),
            kind,
            default: None,
            required,
            choices: choices.unwrap_or_default(),
            value: None,
        };

        if let Some(default) = OptionValue::from_lua_value(kind, &default_value)
            .map_err(|e| format!("option '{}' default: {}", name, e))?
        {
            let default = spec
                .validate(default)
                .map_err(|e| format!("option '{}' default: {}", name, e))?;
            spec.default = Some(default);
        }

        Ok(spec)
    }
}

// ============================================================================
// OptionSchema
// ============================================================================

/// Ordered options of one plugin
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OptionSchema {
    specs: Vec<OptionSpec>,
}

impl OptionSchema {
    /// Build a schema, rejecting duplicate names
    pub fn new(specs: Vec<OptionSpec>) -> HostResult<Self> {
        for (i, spec) in specs.iter().enumerate() {
            if specs[..i].iter().any(|other| other.name == spec.name) {
                return Err(HostError::invalid_option(&spec.name, "declared twice"));
            }
        }
        Ok(Self { specs })
    }

    /// Parse a plugin's `options` list
    pub fn from_lua_list(list: Option<Table>) -> HostResult<Self> {
        let Some(list) = list else {
            return Ok(Self::default());
        };

        let mut specs = Vec::new();
        for entry in list.sequence_values::<Table>() {
            let entry = entry.map_err(|e| HostError::invalid_option("options", e.to_string()))?;
            let spec = OptionSpec::from_lua_table(&entry)
                .map_err(|message| HostError::invalid_option("options", message))?;
            specs.push(spec);
        }
        Self::new(specs)
    }

    pub fn iter(&self) -> impl Iterator<Item = &OptionSpec> {
        self.specs.iter()
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&OptionSpec> {
        self.specs.iter().find(|spec| spec.name == name)
    }

    /// Override-or-default value of an option
    pub fn value(&self, name: &str) -> Option<OptionValue> {
        self.get(name).and_then(|spec| spec.resolved().cloned())
    }

    /// Set an override after validating it
    pub fn set(&mut self, name: &str, value: OptionValue) -> HostResult<()> {
        let spec = self
            .specs
            .iter_mut()
            .find(|spec| spec.name == name)
            .ok_or_else(|| HostError::invalid_option(name, "no such option"))?;
        spec.value = Some(spec.validate(value)?);
        Ok(())
    }

    /// Drop an override so the default applies again
    pub fn clear(&mut self, name: &str) -> HostResult<()> {
        let spec = self
            .specs
            .iter_mut()
            .find(|spec| spec.name == name)
            .ok_or_else(|| HostError::invalid_option(name, "no such option"))?;
        spec.value = None;
        Ok(())
    }

    /// Names of required options that resolve to nothing
    pub fn missing_required(&self) -> Vec<&str> {
        self.specs
            .iter()
            .filter(|spec| spec.is_missing())
            .map(|spec| spec.name.as_str())
            .collect()
    }

    /// Resolved values as a JSON object (unset options omitted)
    pub fn snapshot(&self) -> serde_json::Value {
        let map: serde_json::Map<String, serde_json::Value> = self
            .specs
            .iter()
            .filter_map(|spec| spec.resolved().map(|v| (spec.name.clone(), v.to_json())))
            .collect();
        serde_json::Value::Object(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn domain_required() -> OptionSchema {
        let mut domain = OptionSpec::new("domain", OptionKind::String);
        domain.required = true;
        let mut record_types = OptionSpec::new("record_types", OptionKind::String);
        record_types.default = Some(OptionValue::String("A,AAAA,MX".to_string()));
        let mut mode = OptionSpec::new("mode", OptionKind::Choice);
        mode.choices = vec!["fast".to_string(), "full".to_string()];
        OptionSchema::new(vec![domain, record_types, mode]).unwrap()
    }

    #[test]
    fn test_required_without_default_is_missing() {
        let schema = domain_required();
        assert_eq!(schema.value("domain"), None);
        assert_eq!(schema.missing_required(), vec!["domain"]);
    }

    #[test]
    fn test_override_beats_default() {
        let mut schema = domain_required();
        assert_eq!(
            schema.value("record_types"),
            Some(OptionValue::String("A,AAAA,MX".to_string()))
        );

        schema
            .set("record_types", OptionValue::String("TXT".to_string()))
            .unwrap();
        assert_eq!(schema.value("record_types"), Some(OptionValue::String("TXT".to_string())));

        schema.clear("record_types").unwrap();
        assert_eq!(
            schema.value("record_types"),
            Some(OptionValue::String("A,AAAA,MX".to_string()))
        );
    }

    #[test]
    fn test_setting_required_clears_missing() {
        let mut schema = domain_required();
        schema
            .set("domain", OptionValue::String("example.com".to_string()))
            .unwrap();
        assert!(schema.missing_required().is_empty());
        assert_eq!(schema.snapshot(), json!({ "domain": "example.com", "record_types": "A,AAAA,MX" }));
    }

    #[test]
    fn test_kind_mismatch_rejected() {
        let mut schema = domain_required();
        let err = schema.set("domain", OptionValue::Integer(3)).unwrap_err();
        assert_eq!(err.kind(), "invalid_option");
        assert!(schema.set("nope", OptionValue::Integer(3)).is_err());
    }

    #[test]
    fn test_choice_membership() {
        let mut schema = domain_required();
        schema.set("mode", OptionValue::String("fast".to_string())).unwrap();
        assert_eq!(schema.value("mode"), Some(OptionValue::Choice("fast".to_string())));
        assert!(schema.set("mode", OptionValue::Choice("slow".to_string())).is_err());
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let specs = vec![
            OptionSpec::new("a", OptionKind::String),
            OptionSpec::new("a", OptionKind::Integer),
        ];
        assert!(OptionSchema::new(specs).is_err());
    }

    #[test]
    fn test_parse_text() {
        assert_eq!(
            OptionValue::parse_text(OptionKind::Integer, " 42 ").unwrap(),
            OptionValue::Integer(42)
        );
        assert_eq!(
            OptionValue::parse_text(OptionKind::Boolean, "yes").unwrap(),
            OptionValue::Boolean(true)
        );
        assert!(OptionValue::parse_text(OptionKind::Boolean, "maybe").is_err());
        assert_eq!(
            OptionValue::parse_text(OptionKind::Wordlist, "id:3").unwrap(),
            OptionValue::Wordlist(WordlistSelection::Stored(3))
        );
        assert_eq!(
            OptionValue::parse_text(OptionKind::Wordlist, "7").unwrap(),
            OptionValue::Wordlist(WordlistSelection::Stored(7))
        );
        assert_eq!(
            OptionValue::parse_text(OptionKind::Wordlist, "path:/tmp/w.txt").unwrap(),
            OptionValue::Wordlist(WordlistSelection::Custom(PathBuf::from("/tmp/w.txt")))
        );
    }

    #[test]
    fn test_wordlist_json_snapshot() {
        let stored = OptionValue::Wordlist(WordlistSelection::Stored(2));
        assert_eq!(stored.to_json(), json!({ "wordlist_id": 2 }));
        let custom = OptionValue::Wordlist(WordlistSelection::Custom(PathBuf::from("/w.txt")));
        assert_eq!(custom.to_json(), json!({ "custom_path": "/w.txt" }));
    }

    // =========================================================================
    // Lua Conversion Tests
    // =========================================================================

    #[test]
    fn test_spec_from_lua_table() {
        let lua = Lua::new();
        let table: Table = lua
            .load(r#"return { name = "threads", description = "Workers", kind = "int", default = 8, required = true }"#)
            .eval()
            .unwrap();

        let spec = OptionSpec::from_lua_table(&table).unwrap();
        assert_eq!(spec.name, "threads");
        assert_eq!(spec.kind, OptionKind::Integer);
        assert_eq!(spec.default, Some(OptionValue::Integer(8)));
        assert!(spec.required);
        assert!(!spec.is_missing());
    }

    #[test]
    fn test_spec_from_lua_rejects_bad_default() {
        let lua = Lua::new();
        let table: Table = lua
            .load(r#"return { name = "mode", kind = "choice", choices = { "a", "b" }, default = "c" }"#)
            .eval()
            .unwrap();
        assert!(OptionSpec::from_lua_table(&table).is_err());
    }

    #[test]
    fn test_schema_from_lua_list() {
        let lua = Lua::new();
        let list: Table = lua
            .load(
                r#"return {
                    { name = "domain", required = true },
                    { name = "wordlist", type = "wordlist", default = { id = 1 } },
                }"#,
            )
            .eval()
            .unwrap();

        let schema = OptionSchema::from_lua_list(Some(list)).unwrap();
        assert_eq!(schema.len(), 2);
        assert_eq!(schema.get("domain").unwrap().kind, OptionKind::String);
        assert_eq!(
            schema.value("wordlist"),
            Some(OptionValue::Wordlist(WordlistSelection::Stored(1)))
        );
    }

    #[test]
    fn test_wordlist_table_with_both_fields_rejected() {
        let lua = Lua::new();
        let value: Value = lua.load(r#"return { id = 1, path = "/w.txt" }"#).eval().unwrap();
        assert!(OptionValue::from_lua_value(OptionKind::Wordlist, &value).is_err());
    }

    #[test]
    fn test_into_lua_round_trip_for_wordlist() {
        let lua = Lua::new();
        let value = OptionValue::Wordlist(WordlistSelection::Custom(PathBuf::from("/w.txt")))
            .into_lua(&lua)
            .unwrap();
        let back = OptionValue::from_lua_value(OptionKind::Wordlist, &value).unwrap();
        assert_eq!(
            back,
            Some(OptionValue::Wordlist(WordlistSelection::Custom(PathBuf::from("/w.txt"))))
        );
    }
}
