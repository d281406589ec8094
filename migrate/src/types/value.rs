use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A self-describing property value flowing through the migration engine.
///
/// Source rows, destination properties, and plugin configuration constants are
/// all expressed as [`Value`]s. The variants mirror what a legacy relational
/// source can actually hand us: scalars, raw bytes, and the compound shapes
/// produced by per-row enrichment (multi-valued fields, keyed records).
///
/// Serialization is untagged and deterministic (maps are ordered), which makes
/// the serialized form suitable as input to the persisted row hash. `Bytes`
/// is declared after the compound variants so that untagged deserialization
/// reads a JSON number array as a list, never as raw bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
    Bytes(Vec<u8>),
}

impl Value {
    /// Returns true for [`Value::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns true when the value carries no usable content: null, an empty
    /// string, an empty list, or an empty map.
    ///
    /// Numeric zero and `false` are NOT empty; a legacy `0` is a real value
    /// (e.g. an "unpublished" flag) and must survive the pipeline.
    pub fn is_empty(&self) -> bool {
        match self {
            Value::Null => true,
            Value::String(s) => s.is_empty(),
            Value::List(items) => items.is_empty(),
            Value::Map(entries) => entries.is_empty(),
            _ => false,
        }
    }

    /// Returns the string slice for string values.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns an integer interpretation of the value.
    ///
    /// Strings holding decimal integers are parsed, matching how identifiers
    /// arrive from legacy schemas that store everything as text.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            Value::String(s) => s.trim().parse().ok(),
            Value::Bool(b) => Some(*b as i64),
            _ => None,
        }
    }

    /// Returns the list elements for list values.
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    /// Renders the value as a string, when it has a defined string conversion.
    ///
    /// Scalars convert; [`Value::Bytes`], [`Value::List`], and [`Value::Map`]
    /// do not. The placeholder boundary in [`crate::message`] rejects exactly
    /// the values this method refuses.
    pub fn to_display_string(&self) -> Option<String> {
        match self {
            Value::Null => Some(String::new()),
            Value::Bool(b) => Some(b.to_string()),
            Value::Int(n) => Some(n.to_string()),
            Value::Float(x) => Some(x.to_string()),
            Value::String(s) => Some(s.clone()),
            Value::Bytes(_) | Value::List(_) | Value::Map(_) => None,
        }
    }

    /// Short variant name used in diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::List(_) => "list",
            Value::Map(_) => "map",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_display_string() {
            Some(rendered) => write!(f, "{rendered}"),
            None => write!(f, "<{}>", self.type_name()),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(value as i64)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl<V: Into<Value>> From<Vec<V>> for Value {
    fn from(values: Vec<V>) -> Self {
        Value::List(values.into_iter().map(Into::into).collect())
    }
}

impl<V: Into<Value>> From<Option<V>> for Value {
    fn from(value: Option<V>) -> Self {
        value.map(Into::into).unwrap_or(Value::Null)
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else {
                    Value::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::List(items.into_iter().map(Into::into).collect())
            }
            serde_json::Value::Object(entries) => Value::Map(
                entries
                    .into_iter()
                    .map(|(key, value)| (key, value.into()))
                    .collect(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_is_not_empty() {
        assert!(!Value::Int(0).is_empty());
        assert!(!Value::Bool(false).is_empty());
        assert!(Value::Null.is_empty());
        assert!(Value::String(String::new()).is_empty());
        assert!(Value::List(vec![]).is_empty());
    }

    #[test]
    fn string_identifiers_parse_as_integers() {
        assert_eq!(Value::from("42").as_i64(), Some(42));
        assert_eq!(Value::from(" 7 ").as_i64(), Some(7));
        assert_eq!(Value::from("x7").as_i64(), None);
        assert_eq!(Value::Int(3).as_i64(), Some(3));
    }

    #[test]
    fn compound_values_have_no_string_conversion() {
        assert_eq!(Value::Null.to_display_string().as_deref(), Some(""));
        assert_eq!(Value::Int(5).to_display_string().as_deref(), Some("5"));
        assert!(Value::List(vec![Value::Int(1)]).to_display_string().is_none());
        assert!(Value::Map(BTreeMap::new()).to_display_string().is_none());
        assert!(Value::Bytes(vec![1]).to_display_string().is_none());
    }
}
