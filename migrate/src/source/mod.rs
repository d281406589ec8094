//! Source plugins: lazy, restartable row production from a legacy system.

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::error::MigrateResult;
use crate::types::{IdFieldDefinition, Row};

mod query;
mod revision;
mod table;

pub use query::{Comparison, Condition, Dataset, SortDirection, SourceQuery, TableRows};
pub use revision::RevisionTranslationSource;
pub use table::{PrepareRowFn, TableSource};

/// Contract for producing migration rows from an external system.
///
/// A source declares its identity fields and field catalog statically, opens a
/// lazy iteration over the legacy records described by its query, and enriches
/// each row before the pipeline sees it. Re-calling [`Source::open`] restarts
/// the iteration from the beginning.
#[async_trait]
pub trait Source: Send {
    /// Declarative description of which external records this source fetches.
    fn query(&self) -> SourceQuery;

    /// Catalog of available property names with human-readable descriptions.
    /// Documentation only; not enforced at runtime.
    fn fields(&self) -> BTreeMap<String, String>;

    /// Ordered id field declarations. The tuple of their values is the source
    /// id and must be unique per logical record within one migration.
    fn ids(&self) -> Vec<IdFieldDefinition>;

    /// Pre-flight validation; a failure here aborts the run before any row.
    fn check_requirements(&self) -> MigrateResult<()> {
        Ok(())
    }

    /// Starts (or restarts) iteration. Connection and query failures are
    /// run-fatal and surface as `SourceUnavailable`.
    async fn open(&mut self) -> MigrateResult<()>;

    /// Produces the next raw row, or `None` when the source is exhausted.
    async fn next(&mut self) -> MigrateResult<Option<Row>>;

    /// Per-row enrichment: auxiliary joins, encoding normalization, resolving
    /// denormalized child data. Returning `false` means "skip this row, do
    /// not migrate it" — the caller stops immediately, runs no pipeline, and
    /// writes no id map entry.
    async fn prepare_row(&mut self, row: &mut Row) -> MigrateResult<bool> {
        let _ = row;
        Ok(true)
    }
}

/// Derives the property names a source configuration exposes, without
/// constructing a live migration around it.
pub fn derive_field_names(source: &dyn Source) -> Vec<String> {
    source.fields().into_keys().collect()
}
