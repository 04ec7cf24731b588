//! Configuration snapshots as delivered by the configuration source.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::keys::is_secret_key;

/// A single option value. Sources may deliver any of the three shapes for
/// any key; the typed getters on [`ConfigurationSnapshot`] coerce leniently.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    Bool(bool),
    Int(i64),
    Str(String),
}

impl fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Str(s) => f.write_str(s),
        }
    }
}

impl From<bool> for ConfigValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i32> for ConfigValue {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<i64> for ConfigValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<u16> for ConfigValue {
    fn from(value: u16) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<&str> for ConfigValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for ConfigValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

/// An immutable view of one configuration, identified by its PID.
///
/// The PID is stable across updates of the same configuration and is what
/// the per-instance workspace directory name is derived from.
#[derive(Clone, PartialEq, Eq)]
pub struct ConfigurationSnapshot {
    pid: String,
    values: BTreeMap<String, ConfigValue>,
}

impl ConfigurationSnapshot {
    pub fn new(pid: impl Into<String>) -> Self {
        Self {
            pid: pid.into(),
            values: BTreeMap::new(),
        }
    }

    pub fn from_values(pid: impl Into<String>, values: BTreeMap<String, ConfigValue>) -> Self {
        Self {
            pid: pid.into(),
            values,
        }
    }

    /// Build a snapshot from a JSON object. `null` yields `Ok(None)`, which
    /// callers treat as "no configuration".
    pub fn from_json(pid: impl Into<String>, json: Value) -> Result<Option<Self>, serde_json::Error> {
        if json.is_null() {
            return Ok(None);
        }
        let values: BTreeMap<String, ConfigValue> = serde_json::from_value(json)?;
        Ok(Some(Self::from_values(pid, values)))
    }

    /// Builder-style insert, mostly for tests and embedders.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<ConfigValue>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn pid(&self) -> &str {
        &self.pid
    }

    pub fn get(&self, key: &str) -> Option<&ConfigValue> {
        self.values.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// Booleans accept `true`/`false` or a string; only `"true"` (any case)
    /// is true. Integers and absent keys yield the default.
    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        match self.values.get(key) {
            Some(ConfigValue::Bool(b)) => *b,
            Some(ConfigValue::Str(s)) => s.eq_ignore_ascii_case("true"),
            _ => default,
        }
    }

    /// Integers accept a number or a decimal string. Anything unparsable
    /// yields the default.
    pub fn get_int(&self, key: &str, default: i64) -> i64 {
        match self.values.get(key) {
            Some(ConfigValue::Int(i)) => *i,
            Some(ConfigValue::Str(s)) => s.trim().parse().unwrap_or(default),
            _ => default,
        }
    }

    /// Like [`get_int`](Self::get_int) but distinguishes "absent" from a
    /// value, for options whose fallback depends on other keys.
    pub fn get_int_opt(&self, key: &str) -> Option<i64> {
        match self.values.get(key) {
            Some(ConfigValue::Int(i)) => Some(*i),
            Some(ConfigValue::Str(s)) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Strings accept any value; non-strings render in display form.
    pub fn get_string(&self, key: &str) -> Option<String> {
        self.values.get(key).map(ToString::to_string)
    }
}

impl fmt::Debug for ConfigurationSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        map.entry(&"pid", &self.pid);
        for (key, value) in &self.values {
            if is_secret_key(key) {
                map.entry(key, &"<redacted>");
            } else {
                map.entry(key, value);
            }
        }
        map.finish()
    }
}
