//! Literal value type shared by expressions, resolved data, and formula
//! results.
//!
//! Mirrors the shape of a JSON value closely enough to round-trip through
//! `serde_json` (used by the validator's dynamic-node coercion and by the
//! wire form), while keeping a dedicated `Null` variant so the operator
//! kernel's null-handling rules have a single case to match on.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// A literal value: the unit the operator kernel and formula subsystem both
/// operate on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum Value {
    /// Absence of a value.
    #[default]
    Null,
    /// Boolean value.
    Bool(bool),
    /// 64-bit signed integer.
    Int(i64),
    /// 64-bit floating point.
    Float(f64),
    /// UTF-8 string.
    String(String),
    /// Ordered sequence of values.
    Array(Vec<Value>),
    /// String-keyed map of values.
    Map(HashMap<String, Value>),
}

impl Value {
    /// True for `Null`, an empty string, an empty array, or an empty map —
    /// the domain of `is_empty`/`is_not_empty`.
    pub fn is_empty_value(&self) -> bool {
        match self {
            Value::Null => true,
            Value::String(s) => s.is_empty(),
            Value::Array(a) => a.is_empty(),
            Value::Map(m) => m.is_empty(),
            Value::Bool(_) | Value::Int(_) | Value::Float(_) => false,
        }
    }

    /// Coerce to `f64` if this value is any numeric type. Strings are never
    /// numerically coerced.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Text rendering used for lexicographic fallback comparison and for
    /// `contains`/`starts_with`/`ends_with` needle matching.
    pub fn render(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => {
                if f.fract() == 0.0 && f.is_finite() {
                    format!("{f:.0}")
                } else {
                    f.to_string()
                }
            }
            Value::String(s) => s.clone(),
            Value::Array(items) => items
                .iter()
                .map(Value::render)
                .collect::<Vec<_>>()
                .join(","),
            Value::Map(_) => "[object]".to_string(),
        }
    }

    /// True for `Value::Array`.
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Convert to a [`rhai::Dynamic`] for use as a formula environment
    /// variable.
    pub fn to_dynamic(&self) -> rhai::Dynamic {
        match self {
            Value::Null => rhai::Dynamic::UNIT,
            Value::Bool(b) => (*b).into(),
            Value::Int(i) => (*i).into(),
            Value::Float(f) => (*f).into(),
            Value::String(s) => s.clone().into(),
            Value::Array(items) => {
                let arr: Vec<rhai::Dynamic> = items.iter().map(Value::to_dynamic).collect();
                arr.into()
            }
            Value::Map(map) => {
                let mut m = rhai::Map::new();
                for (k, v) in map {
                    m.insert(k.into(), v.to_dynamic());
                }
                m.into()
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.render())
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else {
                    Value::Float(n.as_f64().unwrap_or(0.0))
                }
            }
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(a) => Value::Array(a.into_iter().map(Value::from).collect()),
            serde_json::Value::Object(o) => {
                Value::Map(o.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}
