use async_trait::async_trait;
use serde::Deserialize;

use crate::error::MigrateResult;
use crate::process::{ProcessContext, ProcessOutcome, ProcessPlugin, RowSkip, SkipReason};
use crate::types::Value;

/// How an empty value is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipMethod {
    /// Skip the entire row; an Ignored id map entry is recorded.
    Row,
    /// Stop this property's pipeline with a null value; the row continues.
    Process,
}

/// Control plugin reacting to empty values.
///
/// The two methods realize the two pipeline control outcomes: `row` halts the
/// row with a missing-source-value disposition, `process` finalizes the
/// property as null and moves on.
#[derive(Debug, Clone, Deserialize)]
pub struct SkipOnEmpty {
    method: SkipMethod,
}

impl SkipOnEmpty {
    pub fn new(method: SkipMethod) -> Self {
        Self { method }
    }
}

#[async_trait]
impl ProcessPlugin for SkipOnEmpty {
    async fn transform(
        &self,
        value: Value,
        _context: &ProcessContext<'_>,
        _destination_property: &str,
    ) -> MigrateResult<ProcessOutcome> {
        if !value.is_empty() {
            return Ok(ProcessOutcome::Continue(value));
        }

        match self.method {
            SkipMethod::Row => Ok(ProcessOutcome::SkipRow(RowSkip {
                reason: SkipReason::MissingSource,
                record: true,
            })),
            SkipMethod::Process => Ok(ProcessOutcome::Stop(Value::Null)),
        }
    }

    // Emptiness is a property of the value as a whole; an empty list must not
    // silently pass because it has no elements to check.
    fn handles_multiple(&self) -> bool {
        true
    }
}
