use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Deserialize;

use crate::bail;
use crate::error::{ErrorKind, MigrateResult};
use crate::process::{ProcessContext, ProcessOutcome, ProcessPlugin, RowSkip, SkipReason};
use crate::types::Value;

/// Maps a scalar value through a configured lookup table.
///
/// An unmapped value falls back to `default_value` when configured, passes
/// through unchanged when `bypass` is set, and otherwise skips the row — an
/// unmapped legacy code usually means the row cannot be represented.
#[derive(Debug, Clone, Deserialize)]
pub struct StaticMap {
    map: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    bypass: bool,
    #[serde(default)]
    default_value: Option<serde_json::Value>,
}

impl StaticMap {
    pub fn new(map: BTreeMap<String, serde_json::Value>) -> Self {
        Self {
            map,
            bypass: false,
            default_value: None,
        }
    }
}

#[async_trait]
impl ProcessPlugin for StaticMap {
    async fn transform(
        &self,
        value: Value,
        _context: &ProcessContext<'_>,
        _destination_property: &str,
    ) -> MigrateResult<ProcessOutcome> {
        let Some(key) = value.to_display_string() else {
            bail!(
                ErrorKind::ConversionError,
                "Static map keys must be scalar",
                value.type_name()
            );
        };

        if let Some(mapped) = self.map.get(&key) {
            return Ok(ProcessOutcome::Continue(mapped.clone().into()));
        }

        if let Some(default) = &self.default_value {
            return Ok(ProcessOutcome::Continue(default.clone().into()));
        }

        if self.bypass {
            return Ok(ProcessOutcome::Continue(value));
        }

        Ok(ProcessOutcome::SkipRow(RowSkip {
            reason: SkipReason::Explicit,
            record: true,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::idmap::StaticIdMapRegistry;
    use crate::types::{IdFieldDefinition, Row};

    fn plugin() -> StaticMap {
        StaticMap::new(BTreeMap::from([
            ("story".to_string(), serde_json::json!("article")),
            ("1".to_string(), serde_json::json!(10)),
        ]))
    }

    async fn apply(plugin: &StaticMap, value: Value) -> ProcessOutcome {
        let row = Row::new(
            std::collections::BTreeMap::from([("id".to_string(), Value::Int(1))]),
            &[IdFieldDefinition::integer("id")],
        )
        .unwrap();
        let registry = StaticIdMapRegistry::new();
        let context = ProcessContext {
            row: &row,
            id_maps: &registry,
        };
        plugin.transform(value, &context, "x").await.unwrap()
    }

    #[tokio::test]
    async fn mapped_values_translate() {
        assert_eq!(
            apply(&plugin(), Value::from("story")).await,
            ProcessOutcome::Continue(Value::from("article"))
        );
        // Numeric keys match through their string rendering.
        assert_eq!(
            apply(&plugin(), Value::Int(1)).await,
            ProcessOutcome::Continue(Value::Int(10))
        );
    }

    #[tokio::test]
    async fn unmapped_value_skips_row_by_default() {
        assert_eq!(
            apply(&plugin(), Value::from("poll")).await,
            ProcessOutcome::SkipRow(RowSkip {
                reason: SkipReason::Explicit,
                record: true,
            })
        );
    }

    #[tokio::test]
    async fn bypass_and_default_override_the_skip() {
        let mut bypass = plugin();
        bypass.bypass = true;
        assert_eq!(
            apply(&bypass, Value::from("poll")).await,
            ProcessOutcome::Continue(Value::from("poll"))
        );

        let mut with_default = plugin();
        with_default.default_value = Some(serde_json::json!("page"));
        assert_eq!(
            apply(&with_default, Value::from("poll")).await,
            ProcessOutcome::Continue(Value::from("page"))
        );
    }
}
