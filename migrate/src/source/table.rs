use std::collections::{BTreeMap, VecDeque};

use async_trait::async_trait;
use tracing::warn;

use crate::bail;
use crate::error::{ErrorKind, MigrateResult};
use crate::source::query::{Dataset, SourceQuery, TableRows};
use crate::source::Source;
use crate::types::{IdFieldDefinition, Row, Value};

/// Per-row enrichment callback for [`TableSource`].
///
/// Receives the dataset so it can resolve auxiliary joins, and the row under
/// preparation. Returning `Ok(false)` skips the row.
pub type PrepareRowFn = Box<dyn FnMut(&Dataset, &mut Row) -> MigrateResult<bool> + Send>;

/// Rewrites the entity id of translation-set members to the set key, so every
/// member of a set maps to one destination entity.
struct SetCollapse {
    set_field: String,
    entity_field: String,
}

/// A source reading one legacy table through a declarative query.
///
/// The general-purpose source: identity fields, field catalog, filter and
/// order come from configuration; per-row enrichment is an injected callback.
/// A failed enrichment skips the row unless the source is marked
/// integrity-critical, in which case it fails the run.
pub struct TableSource {
    dataset: Dataset,
    query: SourceQuery,
    ids: Vec<IdFieldDefinition>,
    fields: BTreeMap<String, String>,
    set_collapse: Option<SetCollapse>,
    prepare: Option<PrepareRowFn>,
    integrity_critical: bool,
    buffer: VecDeque<BTreeMap<String, Value>>,
    opened: bool,
}

impl TableSource {
    pub fn new(dataset: Dataset, query: SourceQuery, ids: Vec<IdFieldDefinition>) -> Self {
        Self {
            dataset,
            query,
            ids,
            fields: BTreeMap::new(),
            set_collapse: None,
            prepare: None,
            integrity_critical: false,
            buffer: VecDeque::new(),
            opened: false,
        }
    }

    /// Documents one available field.
    pub fn with_field(
        mut self,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        self.fields.insert(name.into(), description.into());
        self
    }

    /// Installs the per-row enrichment callback.
    pub fn with_prepare(mut self, prepare: PrepareRowFn) -> Self {
        self.prepare = Some(prepare);
        self
    }

    /// Collapses translation sets: when `set_field` is non-zero on a row, the
    /// row's `entity_field` property is rewritten to the set value during
    /// preparation. The row's identity (captured before preparation) is not
    /// affected.
    pub fn with_set_collapse(
        mut self,
        set_field: impl Into<String>,
        entity_field: impl Into<String>,
    ) -> Self {
        self.set_collapse = Some(SetCollapse {
            set_field: set_field.into(),
            entity_field: entity_field.into(),
        });
        self
    }

    /// Marks enrichment data as integrity-critical: a failed enrichment fails
    /// the run instead of skipping the row.
    pub fn integrity_critical(mut self) -> Self {
        self.integrity_critical = true;
        self
    }
}

#[async_trait]
impl Source for TableSource {
    fn query(&self) -> SourceQuery {
        self.query.clone()
    }

    fn fields(&self) -> BTreeMap<String, String> {
        self.fields.clone()
    }

    fn ids(&self) -> Vec<IdFieldDefinition> {
        self.ids.clone()
    }

    async fn open(&mut self) -> MigrateResult<()> {
        let rows: TableRows = self.query.run(&self.dataset)?;
        self.buffer = rows.into();
        self.opened = true;

        Ok(())
    }

    async fn next(&mut self) -> MigrateResult<Option<Row>> {
        if !self.opened {
            bail!(
                ErrorKind::InvalidState,
                "Source must be opened before iteration"
            );
        }

        match self.buffer.pop_front() {
            Some(values) => Ok(Some(Row::new(values, &self.ids)?)),
            None => Ok(None),
        }
    }

    async fn prepare_row(&mut self, row: &mut Row) -> MigrateResult<bool> {
        if let Some(collapse) = &self.set_collapse {
            let set_value = row
                .get_source(&collapse.set_field)
                .and_then(Value::as_i64)
                .unwrap_or(0);
            if set_value != 0 {
                row.set_source_property(collapse.entity_field.clone(), Value::Int(set_value))?;
            }
        }

        let Some(prepare) = self.prepare.as_mut() else {
            return Ok(true);
        };

        match prepare(&self.dataset, row) {
            Ok(keep) => Ok(keep),
            Err(error) if !self.integrity_critical => {
                warn!(
                    source_id = %row.source_id(),
                    "row enrichment failed, skipping row: {error}"
                );
                Ok(false)
            }
            Err(error) => Err(error),
        }
    }
}
