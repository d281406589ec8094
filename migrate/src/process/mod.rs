//! Process plugins: the transformation steps between source and destination.
//!
//! Each destination property is produced by an ordered list of configured
//! steps. A step is a small pure transform over the current value; besides
//! transforming it can stop its own pipeline early or skip the whole row.
//! Plugins are selected by name through [`ProcessPluginRegistry`] — tagged
//! configuration, not subclassing.

use async_trait::async_trait;

use crate::error::MigrateResult;
use crate::idmap::IdMapRegistry;
use crate::types::{Row, Value};

mod pipeline;
pub mod plugin;
mod registry;

pub use pipeline::{PipelineOutcome, ProcessPipeline};
pub use registry::{PluginBuilder, ProcessPluginRegistry};

/// Why a row is being skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// A plugin decided the row must not be migrated.
    Explicit,
    /// A required source value was missing or empty.
    MissingSource,
}

/// A skip-row control outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowSkip {
    pub reason: SkipReason,
    /// Whether to record an Ignored id map entry so the row is not retried
    /// needlessly. When false the skip is silent.
    pub record: bool,
}

/// Result of one plugin invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessOutcome {
    /// Pass the value to the next step.
    Continue(Value),
    /// The value is final for this destination property; remaining steps for
    /// this property are skipped. The row continues.
    Stop(Value),
    /// Halt the entire row. No destination write occurs.
    SkipRow(RowSkip),
}

/// Read-only state a plugin can consult while transforming.
///
/// The id map registry is how migration-lookup plugins reach the maps of
/// previously executed migrations; plugins must not cache mappings across
/// rows beyond this context's lifetime.
pub struct ProcessContext<'a> {
    pub row: &'a Row,
    pub id_maps: &'a dyn IdMapRegistry,
}

/// One transformation step.
///
/// Transforms are stateless across rows; a plugin may cache expensive static
/// lookups for the lifetime of one run, keyed by stable inputs, but never id
/// mappings.
#[async_trait]
pub trait ProcessPlugin: Send + Sync {
    /// Applies the step to the current value.
    async fn transform(
        &self,
        value: Value,
        context: &ProcessContext<'_>,
        destination_property: &str,
    ) -> MigrateResult<ProcessOutcome>;

    /// Whether the plugin consumes a multi-valued input wholesale. When
    /// false, a list value fans out: the plugin runs once per element and the
    /// results are re-joined in the original order.
    fn handles_multiple(&self) -> bool {
        false
    }
}
