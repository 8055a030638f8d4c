//! Dynamic values carried through recipes and run memory.
//!
//! Step inputs, setups, outputs and variables are free-form trees. They are
//! modelled as a tagged union over scalars, ordered sequences and ordered
//! maps so rendering and evaluation can recurse over them without runtime
//! reflection.

mod path;

pub use path::{Path, PathError, PathSegment};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// 2^63: floats in `-I64_BOUND..I64_BOUND` convert to `i64` exactly.
const I64_BOUND: f64 = 9_223_372_036_854_775_808.0;

/// Ordered map used for object values.
pub type Map = IndexMap<String, Value>;

/// A dynamically typed value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum Value {
    /// Absence of a value.
    #[default]
    Null,
    /// A boolean.
    Bool(bool),
    /// A signed integer.
    Int(i64),
    /// A floating point number.
    Float(f64),
    /// A UTF-8 string.
    String(String),
    /// An ordered sequence.
    Array(Vec<Value>),
    /// An ordered map.
    Map(Map),
}

impl Value {
    /// Creates an empty map value.
    #[must_use]
    pub fn empty_map() -> Self {
        Self::Map(Map::new())
    }

    /// Builds a map value from key/value pairs.
    pub fn map_from<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Self)>,
    {
        Self::Map(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Returns the type name used in error messages.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "boolean",
            Self::Int(_) => "integer",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::Array(_) => "array",
            Self::Map(_) => "map",
        }
    }

    /// Returns true for `Null`.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns the boolean, if this is one.
    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the integer, if this is one.
    #[must_use]
    pub const fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Returns the number as a float, for both integers and floats.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub const fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Returns an integer for integral numbers (`3` and `3.0`).
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            Self::Float(f) if f.fract() == 0.0 && (-I64_BOUND..I64_BOUND).contains(f) => {
                Some(*f as i64)
            }
            _ => None,
        }
    }

    /// Returns the string slice, if this is a string.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the elements, if this is an array.
    #[must_use]
    pub const fn as_array(&self) -> Option<&Vec<Self>> {
        match self {
            Self::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Returns the entries, if this is a map.
    #[must_use]
    pub const fn as_map(&self) -> Option<&Map> {
        match self {
            Self::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Returns the entries mutably, if this is a map.
    pub fn as_map_mut(&mut self) -> Option<&mut Map> {
        match self {
            Self::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Looks up a key of a map value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Self> {
        self.as_map().and_then(|m| m.get(key))
    }

    /// Resolves a parsed path against this value.
    pub fn lookup(&self, path: &Path) -> Result<&Self, PathError> {
        let mut current = self;
        for segment in path.segments() {
            current = match (segment, current) {
                (PathSegment::Key(key), Self::Map(map)) => map
                    .get(key)
                    .ok_or_else(|| PathError::KeyNotFound(key.clone()))?,
                (PathSegment::Key(key), other) => {
                    return Err(PathError::NotAMap {
                        key: key.clone(),
                        found: other.type_name(),
                    })
                }
                (PathSegment::Index(idx), Self::Array(items)) => {
                    items.get(*idx).ok_or(PathError::IndexOutOfBounds {
                        index: *idx,
                        len: items.len(),
                    })?
                }
                (PathSegment::Index(idx), other) => {
                    return Err(PathError::NotAnArray {
                        index: *idx,
                        found: other.type_name(),
                    })
                }
            };
        }
        Ok(current)
    }

    /// Parses and resolves a textual path such as `foo.bar[0]`.
    pub fn lookup_str(&self, path: &str) -> Result<&Self, PathError> {
        let path = Path::parse(path)?;
        self.lookup(&path)
    }

    /// Serializes to compact JSON text.
    ///
    /// Non-finite floats have no JSON form and are written as `null`.
    #[must_use]
    pub fn to_json_string(&self) -> String {
        serde_json::Value::from(self.clone()).to_string()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => write!(f, "{s}"),
            other => write!(f, "{}", other.to_json_string()),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Self::Int(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<Vec<Self>> for Value {
    fn from(items: Vec<Self>) -> Self {
        Self::Array(items)
    }
}

impl From<Map> for Value {
    fn from(map: Map) -> Self {
        Self::Map(map)
    }
}

impl<T: Into<Self>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

impl From<serde_json::Value> for Value {
    #[allow(clippy::option_if_let_else)]
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Self::Int(i)
                } else {
                    Self::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            serde_json::Value::String(s) => Self::String(s),
            serde_json::Value::Array(items) => {
                Self::Array(items.into_iter().map(Self::from).collect())
            }
            serde_json::Value::Object(map) => {
                Self::Map(map.into_iter().map(|(k, v)| (k, Self::from(v))).collect())
            }
        }
    }
}

impl From<Value> for serde_json::Value {
    fn from(v: Value) -> Self {
        match v {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(b),
            Value::Int(i) => Self::from(i),
            Value::Float(f) => serde_json::Number::from_f64(f).map_or(Self::Null, Self::Number),
            Value::String(s) => Self::String(s),
            Value::Array(items) => Self::Array(items.into_iter().map(Self::from).collect()),
            Value::Map(map) => {
                Self::Object(map.into_iter().map(|(k, v)| (k, Self::from(v))).collect())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn sample() -> Value {
        Value::from(json!({
            "foo": {"bar": ["test", {"baz": 3}]},
            "my-step": {"output": {"text": "hi"}}
        }))
    }

    #[test]
    fn test_from_json_keeps_numeric_kinds() {
        assert_eq!(Value::from(json!(3)), Value::Int(3));
        assert_eq!(Value::from(json!(3.5)), Value::Float(3.5));
        assert_eq!(Value::from(json!(null)), Value::Null);
    }

    #[test]
    fn test_lookup_nested_path() {
        let v = sample();
        assert_eq!(v.lookup_str("foo.bar[0]").unwrap(), &Value::from("test"));
        assert_eq!(v.lookup_str("foo.bar[1].baz").unwrap(), &Value::Int(3));
        assert_eq!(v.lookup_str("my-step.output.text").unwrap(), &Value::from("hi"));
    }

    #[test]
    fn test_lookup_errors() {
        let v = sample();
        assert_eq!(
            v.lookup_str("foo.missing"),
            Err(PathError::KeyNotFound("missing".to_string()))
        );
        assert_eq!(
            v.lookup_str("foo.bar[5]"),
            Err(PathError::IndexOutOfBounds { index: 5, len: 2 })
        );
        assert!(matches!(
            v.lookup_str("foo.bar.baz"),
            Err(PathError::NotAMap { .. })
        ));
    }

    #[test]
    fn test_deserialize_preserves_order() {
        let v: Value = serde_json::from_str(r#"{"z": 1, "a": 2, "m": [true, 1.5, "x"]}"#).unwrap();
        let keys: Vec<_> = v.as_map().unwrap().keys().cloned().collect();
        assert_eq!(keys, vec!["z", "a", "m"]);
        assert_eq!(
            v.get("m").unwrap(),
            &Value::Array(vec![Value::Bool(true), Value::Float(1.5), Value::from("x")])
        );
    }

    #[test]
    fn test_display_and_json() {
        assert_eq!(Value::from("plain").to_string(), "plain");
        assert_eq!(Value::Array(vec![Value::Int(1), Value::Int(2)]).to_string(), "[1,2]");
        assert_eq!(
            Value::map_from([("a", Value::Bool(true))]).to_json_string(),
            r#"{"a":true}"#
        );
    }

    #[test]
    fn test_as_integer_accepts_integral_floats() {
        assert_eq!(Value::Float(4.0).as_integer(), Some(4));
        assert_eq!(Value::Float(4.5).as_integer(), None);
        assert_eq!(Value::from("4").as_integer(), None);
    }

    #[test]
    fn test_as_integer_rejects_out_of_range_floats() {
        assert_eq!(Value::Float(1e300).as_integer(), None);
        assert_eq!(Value::Float(-1e19).as_integer(), None);
        assert_eq!(Value::Float(9_223_372_036_854_775_808.0).as_integer(), None);
        assert_eq!(Value::Float(-9_223_372_036_854_775_808.0).as_integer(), Some(i64::MIN));
        assert_eq!(Value::Float(f64::INFINITY).as_integer(), None);
    }
}
