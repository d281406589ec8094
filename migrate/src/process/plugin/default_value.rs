use async_trait::async_trait;
use serde::Deserialize;

use crate::error::MigrateResult;
use crate::process::{ProcessContext, ProcessOutcome, ProcessPlugin};
use crate::types::Value;

/// Substitutes a configured constant when the incoming value is absent.
///
/// With `strict` set, only null triggers the substitution; otherwise any
/// empty value (null, empty string, empty list, empty map) does. Numeric zero
/// is never considered empty.
#[derive(Debug, Clone, Deserialize)]
pub struct DefaultValue {
    default_value: serde_json::Value,
    #[serde(default)]
    strict: bool,
}

impl DefaultValue {
    pub fn new(default_value: impl Into<serde_json::Value>) -> Self {
        Self {
            default_value: default_value.into(),
            strict: false,
        }
    }

    pub fn strict(mut self) -> Self {
        self.strict = true;
        self
    }
}

#[async_trait]
impl ProcessPlugin for DefaultValue {
    async fn transform(
        &self,
        value: Value,
        _context: &ProcessContext<'_>,
        _destination_property: &str,
    ) -> MigrateResult<ProcessOutcome> {
        let absent = if self.strict {
            value.is_null()
        } else {
            value.is_empty()
        };

        if absent {
            return Ok(ProcessOutcome::Continue(self.default_value.clone().into()));
        }

        Ok(ProcessOutcome::Continue(value))
    }

    // The null/empty check applies to the value as a whole.
    fn handles_multiple(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::idmap::StaticIdMapRegistry;
    use crate::types::{IdFieldDefinition, Row};

    async fn apply(plugin: &DefaultValue, value: Value) -> Value {
        let row = Row::new(
            BTreeMap::from([("id".to_string(), Value::Int(1))]),
            &[IdFieldDefinition::integer("id")],
        )
        .unwrap();
        let registry = StaticIdMapRegistry::new();
        let context = ProcessContext {
            row: &row,
            id_maps: &registry,
        };

        match plugin.transform(value, &context, "x").await.unwrap() {
            ProcessOutcome::Continue(value) => value,
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[tokio::test]
    async fn replaces_empty_values() {
        let plugin = DefaultValue::new("fallback");

        assert_eq!(apply(&plugin, Value::Null).await, Value::from("fallback"));
        assert_eq!(apply(&plugin, Value::from("")).await, Value::from("fallback"));
        assert_eq!(apply(&plugin, Value::from("set")).await, Value::from("set"));
        assert_eq!(apply(&plugin, Value::Int(0)).await, Value::Int(0));
    }

    #[tokio::test]
    async fn strict_replaces_null_only() {
        let plugin = DefaultValue::new(1i64).strict();

        assert_eq!(apply(&plugin, Value::Null).await, Value::Int(1));
        assert_eq!(apply(&plugin, Value::from("")).await, Value::from(""));
    }
}
