use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::value::Value;

/// Declared type of one source identifier field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdFieldType {
    Integer,
    String,
}

/// Declaration of one field participating in a source's identity.
///
/// The ordered set of these declarations defines the source id tuple. The
/// optional alias disambiguates which underlying table the field is read from
/// when the source joins a table against itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdFieldDefinition {
    pub name: String,
    pub field_type: IdFieldType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

impl IdFieldDefinition {
    /// Declares an integer id field.
    pub fn integer(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            field_type: IdFieldType::Integer,
            alias: None,
        }
    }

    /// Declares a string id field.
    pub fn string(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            field_type: IdFieldType::String,
            alias: None,
        }
    }

    /// Sets the disambiguation alias.
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }
}

/// An ordered tuple of identifier values.
///
/// Used both for source ids (the legacy system's natural key) and destination
/// ids (the created record's key). Destination tuples need not be unique
/// across rows: several source rows may map to the same destination record,
/// e.g. translations of one entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdTuple(Vec<Value>);

impl IdTuple {
    pub fn new(values: Vec<Value>) -> Self {
        Self(values)
    }

    /// Single-component tuple, the common case.
    pub fn single(value: impl Into<Value>) -> Self {
        Self(vec![value.into()])
    }

    pub fn values(&self) -> &[Value] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the first component interpreted as an integer, if possible.
    ///
    /// This is the component the highest-id scans compare; tuples whose
    /// leading component is not numeric simply do not participate.
    pub fn leading_numeric(&self) -> Option<i64> {
        self.0.first().and_then(Value::as_i64)
    }

    /// Canonical string form used as a lookup key by in-memory stores and as
    /// a stable column value by SQL-backed stores.
    pub fn storage_key(&self) -> String {
        serde_json::to_string(&self.0).unwrap_or_default()
    }
}

impl fmt::Display for IdTuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (index, value) in self.0.iter().enumerate() {
            if index > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{value}")?;
        }
        write!(f, ")")
    }
}

impl<V: Into<Value>> FromIterator<V> for IdTuple {
    fn from_iter<I: IntoIterator<Item = V>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_key_is_canonical() {
        let a = IdTuple::new(vec![Value::Int(1), Value::from("en")]);
        let b = IdTuple::new(vec![Value::Int(1), Value::from("en")]);
        let c = IdTuple::new(vec![Value::Int(1), Value::from("fr")]);

        assert_eq!(a.storage_key(), b.storage_key());
        assert_ne!(a.storage_key(), c.storage_key());
    }

    #[test]
    fn display_renders_components() {
        let id = IdTuple::new(vec![Value::Int(3), Value::from("de")]);
        assert_eq!(id.to_string(), "(3, de)");
    }
}
