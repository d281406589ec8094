use async_trait::async_trait;
use serde::Deserialize;

use crate::error::MigrateResult;
use crate::process::{ProcessContext, ProcessOutcome, ProcessPlugin};
use crate::types::Value;

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum SourceSpec {
    One(String),
    Many(Vec<String>),
}

/// Copies one or more properties off the row.
///
/// A `@`-prefixed key reads an already-computed destination property instead
/// of a source property. With several keys the result is a list in key order.
/// Missing properties read as null.
#[derive(Debug, Clone, Deserialize)]
pub struct Get {
    source: SourceSpec,
}

impl Get {
    pub fn single(source: impl Into<String>) -> Self {
        Self {
            source: SourceSpec::One(source.into()),
        }
    }

    fn fetch(context: &ProcessContext<'_>, key: &str) -> Value {
        context.row.get(key).cloned().unwrap_or(Value::Null)
    }
}

#[async_trait]
impl ProcessPlugin for Get {
    async fn transform(
        &self,
        _value: Value,
        context: &ProcessContext<'_>,
        _destination_property: &str,
    ) -> MigrateResult<ProcessOutcome> {
        let value = match &self.source {
            SourceSpec::One(key) => Self::fetch(context, key),
            SourceSpec::Many(keys) => {
                Value::List(keys.iter().map(|key| Self::fetch(context, key)).collect())
            }
        };

        Ok(ProcessOutcome::Continue(value))
    }

    // Replaces whatever is flowing through the pipeline; fanning the call out
    // over list elements would just repeat the fetch.
    fn handles_multiple(&self) -> bool {
        true
    }
}
