use tracing::trace;

use crate::error::MigrateResult;
use crate::process::{ProcessContext, ProcessOutcome, ProcessPlugin, RowSkip};
use crate::types::Value;

/// Final result of running one property's pipeline.
#[derive(Debug, PartialEq)]
pub enum PipelineOutcome {
    /// The property's final value.
    Value(Value),
    /// The row must be skipped; nothing is written.
    SkipRow(RowSkip),
}

/// The ordered steps producing one destination property.
pub struct ProcessPipeline {
    destination_property: String,
    steps: Vec<(String, Box<dyn ProcessPlugin>)>,
}

impl ProcessPipeline {
    pub fn new(destination_property: impl Into<String>) -> Self {
        Self {
            destination_property: destination_property.into(),
            steps: Vec::new(),
        }
    }

    /// Appends a named step. Steps execute in append order.
    pub fn push(&mut self, name: impl Into<String>, plugin: Box<dyn ProcessPlugin>) {
        self.steps.push((name.into(), plugin));
    }

    pub fn destination_property(&self) -> &str {
        &self.destination_property
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Runs the steps left to right over an initial null value.
    ///
    /// A [`ProcessOutcome::Stop`] finalizes the value and skips the remaining
    /// steps for this property only; a [`ProcessOutcome::SkipRow`] aborts
    /// immediately. When the current value is a list and the next plugin does
    /// not handle multiples, the plugin fans out over the elements and the
    /// results are re-joined in order; an element-level skip-row aborts the
    /// row, an element-level stop finalizes the re-joined list.
    pub async fn run(&self, context: &ProcessContext<'_>) -> MigrateResult<PipelineOutcome> {
        let mut value = Value::Null;

        for (name, plugin) in &self.steps {
            trace!(
                step = name.as_str(),
                property = self.destination_property,
                "running process step"
            );

            let fan_out = !plugin.handles_multiple() && matches!(value, Value::List(_));
            if fan_out {
                let Value::List(elements) = std::mem::replace(&mut value, Value::Null) else {
                    unreachable!("fan_out implies a list value");
                };

                let mut transformed = Vec::with_capacity(elements.len());
                let mut stopped = false;
                for element in elements {
                    match plugin
                        .transform(element, context, &self.destination_property)
                        .await?
                    {
                        ProcessOutcome::Continue(result) => transformed.push(result),
                        ProcessOutcome::Stop(result) => {
                            transformed.push(result);
                            stopped = true;
                        }
                        ProcessOutcome::SkipRow(skip) => {
                            return Ok(PipelineOutcome::SkipRow(skip));
                        }
                    }
                }

                value = Value::List(transformed);
                if stopped {
                    return Ok(PipelineOutcome::Value(value));
                }
                continue;
            }

            match plugin
                .transform(value, context, &self.destination_property)
                .await?
            {
                ProcessOutcome::Continue(result) => value = result,
                ProcessOutcome::Stop(result) => {
                    return Ok(PipelineOutcome::Value(result));
                }
                ProcessOutcome::SkipRow(skip) => {
                    return Ok(PipelineOutcome::SkipRow(skip));
                }
            }
        }

        Ok(PipelineOutcome::Value(value))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use async_trait::async_trait;

    use super::*;
    use crate::idmap::StaticIdMapRegistry;
    use crate::process::SkipReason;
    use crate::types::{IdFieldDefinition, Row};

    struct Upper;

    #[async_trait]
    impl ProcessPlugin for Upper {
        async fn transform(
            &self,
            value: Value,
            _context: &ProcessContext<'_>,
            _destination_property: &str,
        ) -> MigrateResult<ProcessOutcome> {
            let rendered = value.to_display_string().unwrap_or_default();
            Ok(ProcessOutcome::Continue(Value::from(rendered.to_uppercase())))
        }
    }

    struct Seed(Value);

    #[async_trait]
    impl ProcessPlugin for Seed {
        async fn transform(
            &self,
            _value: Value,
            _context: &ProcessContext<'_>,
            _destination_property: &str,
        ) -> MigrateResult<ProcessOutcome> {
            Ok(ProcessOutcome::Continue(self.0.clone()))
        }

        fn handles_multiple(&self) -> bool {
            true
        }
    }

    struct StopWith(Value);

    #[async_trait]
    impl ProcessPlugin for StopWith {
        async fn transform(
            &self,
            _value: Value,
            _context: &ProcessContext<'_>,
            _destination_property: &str,
        ) -> MigrateResult<ProcessOutcome> {
            Ok(ProcessOutcome::Stop(self.0.clone()))
        }
    }

    fn context_row() -> Row {
        let source = BTreeMap::from([("id".to_string(), Value::Int(1))]);
        Row::new(source, &[IdFieldDefinition::integer("id")]).unwrap()
    }

    #[tokio::test]
    async fn steps_chain_left_to_right() {
        let row = context_row();
        let registry = StaticIdMapRegistry::new();
        let context = ProcessContext {
            row: &row,
            id_maps: &registry,
        };

        let mut pipeline = ProcessPipeline::new("title");
        pipeline.push("seed", Box::new(Seed(Value::from("abc"))));
        pipeline.push("upper", Box::new(Upper));

        let outcome = pipeline.run(&context).await.unwrap();
        assert_eq!(outcome, PipelineOutcome::Value(Value::from("ABC")));
    }

    #[tokio::test]
    async fn stop_skips_later_steps_only() {
        let row = context_row();
        let registry = StaticIdMapRegistry::new();
        let context = ProcessContext {
            row: &row,
            id_maps: &registry,
        };

        let mut pipeline = ProcessPipeline::new("title");
        pipeline.push("stop", Box::new(StopWith(Value::from("final"))));
        pipeline.push("upper", Box::new(Upper));

        let outcome = pipeline.run(&context).await.unwrap();
        assert_eq!(outcome, PipelineOutcome::Value(Value::from("final")));
    }

    #[tokio::test]
    async fn lists_fan_out_in_order() {
        let row = context_row();
        let registry = StaticIdMapRegistry::new();
        let context = ProcessContext {
            row: &row,
            id_maps: &registry,
        };

        let mut pipeline = ProcessPipeline::new("tags");
        pipeline.push(
            "seed",
            Box::new(Seed(Value::from(vec!["a", "b", "c"]))),
        );
        pipeline.push("upper", Box::new(Upper));

        let outcome = pipeline.run(&context).await.unwrap();
        assert_eq!(
            outcome,
            PipelineOutcome::Value(Value::from(vec!["A", "B", "C"]))
        );
    }

    #[tokio::test]
    async fn skip_row_propagates_immediately() {
        struct SkipAll;

        #[async_trait]
        impl ProcessPlugin for SkipAll {
            async fn transform(
                &self,
                _value: Value,
                _context: &ProcessContext<'_>,
                _destination_property: &str,
            ) -> MigrateResult<ProcessOutcome> {
                Ok(ProcessOutcome::SkipRow(RowSkip {
                    reason: SkipReason::Explicit,
                    record: true,
                }))
            }
        }

        let row = context_row();
        let registry = StaticIdMapRegistry::new();
        let context = ProcessContext {
            row: &row,
            id_maps: &registry,
        };

        let mut pipeline = ProcessPipeline::new("title");
        pipeline.push("skip", Box::new(SkipAll));
        pipeline.push("upper", Box::new(Upper));

        let outcome = pipeline.run(&context).await.unwrap();
        assert_eq!(
            outcome,
            PipelineOutcome::SkipRow(RowSkip {
                reason: SkipReason::Explicit,
                record: true,
            })
        );
    }
}
