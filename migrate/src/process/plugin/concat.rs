use async_trait::async_trait;
use serde::Deserialize;

use crate::bail;
use crate::error::{ErrorKind, MigrateResult};
use crate::process::{ProcessContext, ProcessOutcome, ProcessPlugin};
use crate::types::Value;

fn default_delimiter() -> String {
    String::new()
}

/// Joins the elements of a list into one string.
#[derive(Debug, Clone, Deserialize)]
pub struct Concat {
    #[serde(default = "default_delimiter")]
    delimiter: String,
}

impl Concat {
    pub fn new(delimiter: impl Into<String>) -> Self {
        Self {
            delimiter: delimiter.into(),
        }
    }
}

#[async_trait]
impl ProcessPlugin for Concat {
    async fn transform(
        &self,
        value: Value,
        _context: &ProcessContext<'_>,
        _destination_property: &str,
    ) -> MigrateResult<ProcessOutcome> {
        let Value::List(elements) = value else {
            bail!(
                ErrorKind::ConversionError,
                "Concat requires a list value",
                value.type_name()
            );
        };

        let mut rendered = Vec::with_capacity(elements.len());
        for element in &elements {
            let Some(piece) = element.to_display_string() else {
                bail!(
                    ErrorKind::ConversionError,
                    "Concat elements must be scalar",
                    element.type_name()
                );
            };
            rendered.push(piece);
        }

        Ok(ProcessOutcome::Continue(Value::from(
            rendered.join(&self.delimiter),
        )))
    }

    // Consumes the list wholesale; fanning out would defeat the join.
    fn handles_multiple(&self) -> bool {
        true
    }
}
