//! Property maps shared by notebook metadata and per-cell metadata.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// String-keyed map of JSON values.
///
/// Keys are kept sorted, which gives the serializer its canonical order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Properties(BTreeMap<String, Value>);

impl Properties {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the property is present and truthy.
    ///
    /// Missing keys and JSON-falsy values (`null`, `false`, `0`, `""`, empty
    /// arrays and objects) all read as "not set".
    pub fn is_set(&self, key: &str) -> bool {
        self.0.get(key).is_some_and(is_truthy)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Insert a value, returning the previous one.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Iterate in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Layer `self` on top of `defaults`: keys present here win.
    pub fn overlay(&self, defaults: &Properties) -> Properties {
        let mut merged = defaults.clone();
        for (key, value) in &self.0 {
            merged.0.insert(key.clone(), value.clone());
        }
        merged
    }

    /// Convert into a JSON object.
    pub fn into_json_map(self) -> serde_json::Map<String, Value> {
        self.0.into_iter().collect()
    }
}

impl FromIterator<(String, Value)> for Properties {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl From<serde_json::Map<String, Value>> for Properties {
    fn from(map: serde_json::Map<String, Value>) -> Self {
        map.into_iter().collect()
    }
}

/// JSON truthiness.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}
