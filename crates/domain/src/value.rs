//! Dynamic key/value mapping exchanged at the tool-call boundary.

use std::ops::{Deref, DerefMut};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Reserved response key carrying a tool handler's failure text.
pub const ERROR_KEY: &str = "_error";

/// An untyped string-keyed mapping (function-call arguments and results).
///
/// The coercion accessors are total: a missing key or a value of the
/// wrong shape yields the supplied default instead of an error.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JsonMap(Map<String, Value>);

impl JsonMap {
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Build a map from any JSON value; non-objects yield `None`.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(m) => Some(Self(m)),
            _ => None,
        }
    }

    /// Response carrying only the reserved error field.
    pub fn from_error(message: impl Into<String>) -> Self {
        let mut m = Map::new();
        m.insert(ERROR_KEY.into(), Value::String(message.into()));
        Self(m)
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }

    /// Failure text in the reserved `_error` field, if any.
    pub fn error(&self) -> Option<String> {
        match self.0.get(ERROR_KEY)? {
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Copy every key from `defaults` that this map does not already hold.
    pub fn merge_missing(&mut self, defaults: &JsonMap) {
        for (k, v) in defaults.iter() {
            if !self.0.contains_key(k) {
                self.0.insert(k.clone(), v.clone());
            }
        }
    }

    // ── Coercions ────────────────────────────────────────────────────

    pub fn int(&self, key: &str, default: i64) -> i64 {
        self.0.get(key).and_then(as_int).unwrap_or(default)
    }

    pub fn float(&self, key: &str, default: f64) -> f64 {
        self.0.get(key).and_then(Value::as_f64).unwrap_or(default)
    }

    pub fn string(&self, key: &str, default: &str) -> String {
        self.0
            .get(key)
            .and_then(Value::as_str)
            .unwrap_or(default)
            .to_string()
    }

    pub fn bool(&self, key: &str, default: bool) -> bool {
        self.0.get(key).and_then(Value::as_bool).unwrap_or(default)
    }

    /// Elements that are not numbers become `0`.
    pub fn int_array(&self, key: &str, default: &[i64]) -> Vec<i64> {
        match self.0.get(key) {
            Some(Value::Array(items)) => items.iter().map(|v| as_int(v).unwrap_or(0)).collect(),
            _ => default.to_vec(),
        }
    }

    pub fn float_array(&self, key: &str, default: &[f64]) -> Vec<f64> {
        match self.0.get(key) {
            Some(Value::Array(items)) => items.iter().map(|v| v.as_f64().unwrap_or(0.0)).collect(),
            _ => default.to_vec(),
        }
    }

    pub fn string_array(&self, key: &str, default: &[String]) -> Vec<String> {
        match self.0.get(key) {
            Some(Value::Array(items)) => items
                .iter()
                .map(|v| v.as_str().unwrap_or_default().to_string())
                .collect(),
            _ => default.to_vec(),
        }
    }

    pub fn bool_array(&self, key: &str, default: &[bool]) -> Vec<bool> {
        match self.0.get(key) {
            Some(Value::Array(items)) => items.iter().map(|v| v.as_bool().unwrap_or(false)).collect(),
            _ => default.to_vec(),
        }
    }

    pub fn object(&self, key: &str) -> Option<JsonMap> {
        match self.0.get(key) {
            Some(Value::Object(m)) => Some(JsonMap(m.clone())),
            _ => None,
        }
    }

    /// Elements that are not objects become empty maps.
    pub fn object_array(&self, key: &str, default: &[JsonMap]) -> Vec<JsonMap> {
        match self.0.get(key) {
            Some(Value::Array(items)) => items
                .iter()
                .map(|v| match v {
                    Value::Object(m) => JsonMap(m.clone()),
                    _ => JsonMap::new(),
                })
                .collect(),
            _ => default.to_vec(),
        }
    }
}

fn as_int(v: &Value) -> Option<i64> {
    v.as_i64().or_else(|| v.as_f64().map(|f| f as i64))
}

impl Deref for JsonMap {
    type Target = Map<String, Value>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for JsonMap {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl From<Map<String, Value>> for JsonMap {
    fn from(m: Map<String, Value>) -> Self {
        Self(m)
    }
}

impl From<JsonMap> for Value {
    fn from(m: JsonMap) -> Self {
        Value::Object(m.0)
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for JsonMap {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> JsonMap {
        JsonMap::from_value(json!({
            "a": 35,
            "f": 2.5,
            "whole": 4.0,
            "s": "hi",
            "b": true,
            "ids": [1, 2.0, "x"],
            "nested": {"k": 1},
            "rows": [{"x": 1}, 7],
        }))
        .unwrap()
    }

    #[test]
    fn scalar_coercions() {
        let m = sample();
        assert_eq!(m.int("a", 0), 35);
        assert_eq!(m.int("whole", 0), 4);
        assert_eq!(m.float("a", 0.0), 35.0);
        assert_eq!(m.float("f", 0.0), 2.5);
        assert_eq!(m.string("s", "d"), "hi");
        assert!(m.bool("b", false));
    }

    #[test]
    fn wrong_shape_falls_back_to_default() {
        let m = sample();
        assert_eq!(m.int("s", 9), 9);
        assert_eq!(m.string("a", "d"), "d");
        assert!(!m.bool("missing", false));
        assert_eq!(m.int_array("s", &[3]), vec![3]);
        assert!(m.object("a").is_none());
    }

    #[test]
    fn arrays_coerce_elementwise() {
        let m = sample();
        assert_eq!(m.int_array("ids", &[]), vec![1, 2, 0]);
        let rows = m.object_array("rows", &[]);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].int("x", 0), 1);
        assert!(rows[1].is_empty());
        assert_eq!(m.object("nested").unwrap().int("k", 0), 1);
    }

    #[test]
    fn error_field_round_trips() {
        let m = JsonMap::from_error("division by zero");
        assert_eq!(m.len(), 1);
        assert_eq!(m.error().as_deref(), Some("division by zero"));
        assert!(sample().error().is_none());
    }

    #[test]
    fn merge_missing_keeps_existing_values() {
        let mut args = JsonMap::new().with("a", 1);
        let defaults = JsonMap::new().with("a", 99).with("user", "u1");
        args.merge_missing(&defaults);
        assert_eq!(args.int("a", 0), 1);
        assert_eq!(args.string("user", ""), "u1");
    }

    #[test]
    fn serializes_transparently() {
        let m = JsonMap::new().with("result", 56);
        assert_eq!(serde_json::to_string(&m).unwrap(), r#"{"result":56}"#);
    }
}
