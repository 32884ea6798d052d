//! Native values carried by shell variables.
//!
//! Environment variables hold `NativeValue` rather than flat strings, so a
//! loop over a list-valued variable can iterate element by element. Values
//! stay native until they cross a text boundary (command arguments, indexing,
//! concatenation), at which point `to_text` renders them.

use std::fmt;

use indexmap::IndexMap;
use serde_json::Value as JsonValue;

/// Closed sum type for everything a shell variable can hold.
#[derive(Debug, Clone, PartialEq)]
pub enum NativeValue {
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Null,
    /// Insertion-ordered so JSON rendering is deterministic.
    Map(IndexMap<String, NativeValue>),
    List(Vec<NativeValue>),
}

impl NativeValue {
    /// Render the value at a text boundary.
    ///
    /// Maps and lists render as compact JSON, booleans as `true`/`false`,
    /// null as the empty string.
    pub fn to_text(&self) -> String {
        match self {
            NativeValue::String(s) => s.clone(),
            NativeValue::Integer(n) => n.to_string(),
            NativeValue::Float(f) => f.to_string(),
            NativeValue::Boolean(b) => b.to_string(),
            NativeValue::Null => String::new(),
            NativeValue::Map(_) | NativeValue::List(_) => {
                serde_json::to_string(&self.to_json()).unwrap_or_default()
            }
        }
    }

    /// Parse a literal as typed data, falling back to a plain string.
    ///
    /// `[1,2,3]`, `{"a":1}`, `true`, `null` and numerics come back native;
    /// anything that is not valid JSON stays a string.
    pub fn parse_literal(text: &str) -> NativeValue {
        match serde_json::from_str::<JsonValue>(text.trim()) {
            Ok(json) => NativeValue::from_json(json),
            Err(_) => NativeValue::String(text.to_string()),
        }
    }

    pub fn from_json(json: JsonValue) -> NativeValue {
        match json {
            JsonValue::Null => NativeValue::Null,
            JsonValue::Bool(b) => NativeValue::Boolean(b),
            JsonValue::Number(n) => {
                if let Some(i) = n.as_i64() {
                    NativeValue::Integer(i)
                } else {
                    NativeValue::Float(n.as_f64().unwrap_or(0.0))
                }
            }
            JsonValue::String(s) => NativeValue::String(s),
            JsonValue::Array(items) => {
                NativeValue::List(items.into_iter().map(NativeValue::from_json).collect())
            }
            JsonValue::Object(entries) => NativeValue::Map(
                entries
                    .into_iter()
                    .map(|(k, v)| (k, NativeValue::from_json(v)))
                    .collect(),
            ),
        }
    }

    pub fn to_json(&self) -> JsonValue {
        match self {
            NativeValue::String(s) => JsonValue::String(s.clone()),
            NativeValue::Integer(n) => JsonValue::from(*n),
            NativeValue::Float(f) => {
                serde_json::Number::from_f64(*f).map_or(JsonValue::Null, JsonValue::Number)
            }
            NativeValue::Boolean(b) => JsonValue::Bool(*b),
            NativeValue::Null => JsonValue::Null,
            NativeValue::Map(entries) => JsonValue::Object(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
            NativeValue::List(items) => {
                JsonValue::Array(items.iter().map(NativeValue::to_json).collect())
            }
        }
    }
}

impl fmt::Display for NativeValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.to_text())
    }
}

impl From<&str> for NativeValue {
    fn from(s: &str) -> Self {
        NativeValue::String(s.to_string())
    }
}

impl From<String> for NativeValue {
    fn from(s: String) -> Self {
        NativeValue::String(s)
    }
}
