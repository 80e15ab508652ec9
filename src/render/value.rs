//! Runtime values
//!
//! `FxValue` is the value model shared by template locals, globals,
//! tool arguments and results. It mirrors JavaScript semantics where
//! templates can observe them: `undefined` and `null` are distinct,
//! empty arrays and objects are truthy, and string coercion follows
//! `String(value)`.

use indexmap::IndexMap;
use std::cmp::Ordering;

/// A value visible to a template
#[derive(Debug, Clone, PartialEq)]
pub enum FxValue {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Vec<FxValue>),
    Object(IndexMap<String, FxValue>),
}

impl FxValue {
    /// An empty object, the usual starting point for render locals.
    pub fn object() -> Self {
        FxValue::Object(IndexMap::new())
    }

    /// String form used when splicing a value into template output
    pub fn to_output_string(&self) -> String {
        match self {
            FxValue::Undefined => "undefined".to_string(),
            FxValue::Null => "null".to_string(),
            FxValue::Bool(b) => b.to_string(),
            FxValue::Number(n) => {
                if n.fract() == 0.0 && n.is_finite() {
                    (*n as i64).to_string()
                } else {
                    n.to_string()
                }
            }
            FxValue::String(s) => s.clone(),
            FxValue::Array(arr) => arr
                .iter()
                .map(|v| v.to_output_string())
                .collect::<Vec<_>>()
                .join(","),
            FxValue::Object(_) => "[object Object]".to_string(),
        }
    }

    /// JavaScript truthiness: empty string, 0, NaN, null and undefined
    /// are falsy; arrays and objects are always truthy.
    pub fn is_truthy(&self) -> bool {
        match self {
            FxValue::Undefined | FxValue::Null => false,
            FxValue::Bool(b) => *b,
            FxValue::Number(n) => *n != 0.0 && !n.is_nan(),
            FxValue::String(s) => !s.is_empty(),
            FxValue::Array(_) | FxValue::Object(_) => true,
        }
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self, FxValue::Undefined | FxValue::Null)
    }

    /// Get a property from an object, or an index from an array when
    /// the key parses as one
    pub fn get_property(&self, key: &str) -> Option<&FxValue> {
        match self {
            FxValue::Object(obj) => obj.get(key),
            FxValue::Array(arr) => {
                if key == "length" {
                    None
                } else if let Ok(idx) = key.parse::<usize>() {
                    arr.get(idx)
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    /// Get an element by numeric index
    pub fn get_index(&self, idx: usize) -> Option<&FxValue> {
        match self {
            FxValue::Array(arr) => arr.get(idx),
            FxValue::Object(obj) => obj.get(&idx.to_string()),
            _ => None,
        }
    }

    /// Strict equality (`===`): no coercion across types
    pub fn strict_eq(&self, other: &FxValue) -> bool {
        match (self, other) {
            (FxValue::Undefined, FxValue::Undefined) => true,
            (FxValue::Null, FxValue::Null) => true,
            (FxValue::Bool(a), FxValue::Bool(b)) => a == b,
            (FxValue::Number(a), FxValue::Number(b)) => a == b,
            (FxValue::String(a), FxValue::String(b)) => a == b,
            _ => false,
        }
    }

    /// Loose equality (`==`): nullish values match each other, strings
    /// and numbers compare numerically, booleans coerce to numbers
    pub fn loose_eq(&self, other: &FxValue) -> bool {
        match (self, other) {
            (FxValue::Undefined | FxValue::Null, FxValue::Undefined | FxValue::Null) => true,
            (FxValue::Number(a), FxValue::String(s)) | (FxValue::String(s), FxValue::Number(a)) => {
                s.trim().parse::<f64>().map(|b| *a == b).unwrap_or(false)
            }
            (FxValue::Bool(b), other) | (other, FxValue::Bool(b)) => {
                let n = if *b { 1.0 } else { 0.0 };
                FxValue::Number(n).loose_eq(other)
            }
            _ => self.strict_eq(other),
        }
    }

    /// Ordering for `<`, `>`, `<=`, `>=`; `None` when the operands are
    /// not comparable (every comparison on them is false)
    pub fn compare(&self, other: &FxValue) -> Option<Ordering> {
        match (self, other) {
            (FxValue::Number(a), FxValue::Number(b)) => a.partial_cmp(b),
            (FxValue::String(a), FxValue::String(b)) => Some(a.cmp(b)),
            (FxValue::Number(a), FxValue::String(s)) => {
                s.trim().parse::<f64>().ok().and_then(|b| a.partial_cmp(&b))
            }
            (FxValue::String(s), FxValue::Number(b)) => {
                s.trim().parse::<f64>().ok().and_then(|a| a.partial_cmp(b))
            }
            _ => None,
        }
    }

    /// Convert from serde_json::Value
    pub fn from_json(json: &serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => FxValue::Null,
            serde_json::Value::Bool(b) => FxValue::Bool(*b),
            serde_json::Value::Number(n) => FxValue::Number(n.as_f64().unwrap_or(0.0)),
            serde_json::Value::String(s) => FxValue::String(s.clone()),
            serde_json::Value::Array(arr) => {
                FxValue::Array(arr.iter().map(FxValue::from_json).collect())
            }
            serde_json::Value::Object(obj) => {
                let mut map = IndexMap::new();
                for (k, v) in obj {
                    map.insert(k.clone(), FxValue::from_json(v));
                }
                FxValue::Object(map)
            }
        }
    }

    /// Convert to serde_json::Value; `undefined` has no JSON form and
    /// maps to null
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            FxValue::Undefined | FxValue::Null => serde_json::Value::Null,
            FxValue::Bool(b) => serde_json::Value::Bool(*b),
            FxValue::Number(n) => {
                // Integer-valued numbers stay integers in JSON
                if n.fract() == 0.0 && n.is_finite() && *n >= i64::MIN as f64 && *n <= i64::MAX as f64
                {
                    serde_json::Value::Number(serde_json::Number::from(*n as i64))
                } else {
                    serde_json::Number::from_f64(*n)
                        .map(serde_json::Value::Number)
                        .unwrap_or(serde_json::Value::Null)
                }
            }
            FxValue::String(s) => serde_json::Value::String(s.clone()),
            FxValue::Array(arr) => {
                serde_json::Value::Array(arr.iter().map(|v| v.to_json()).collect())
            }
            FxValue::Object(obj) => {
                let map: serde_json::Map<String, serde_json::Value> =
                    obj.iter().map(|(k, v)| (k.clone(), v.to_json())).collect();
                serde_json::Value::Object(map)
            }
        }
    }
}

impl serde::Serialize for FxValue {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> serde::Deserialize<'de> for FxValue {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        Ok(FxValue::from_json(&value))
    }
}

impl From<&str> for FxValue {
    fn from(s: &str) -> Self {
        FxValue::String(s.to_string())
    }
}

impl From<String> for FxValue {
    fn from(s: String) -> Self {
        FxValue::String(s)
    }
}

impl From<bool> for FxValue {
    fn from(b: bool) -> Self {
        FxValue::Bool(b)
    }
}

impl From<i32> for FxValue {
    fn from(n: i32) -> Self {
        FxValue::Number(n as f64)
    }
}

impl From<i64> for FxValue {
    fn from(n: i64) -> Self {
        FxValue::Number(n as f64)
    }
}

impl From<f64> for FxValue {
    fn from(n: f64) -> Self {
        FxValue::Number(n)
    }
}

impl From<usize> for FxValue {
    fn from(n: usize) -> Self {
        FxValue::Number(n as f64)
    }
}

impl<T: Into<FxValue>> From<Vec<T>> for FxValue {
    fn from(items: Vec<T>) -> Self {
        FxValue::Array(items.into_iter().map(Into::into).collect())
    }
}
