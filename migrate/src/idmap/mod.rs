//! Persistent mapping between source ids and destination ids.
//!
//! The id map is the single source of truth for idempotency: it records, per
//! migrated row, the destination id tuple, the source row hash, and a status.
//! Imports consult it to skip unchanged rows, rollback walks it in reverse to
//! undo a run, and the auditor compares it against live destination stores.

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::MigrateResult;
use crate::types::IdTuple;

mod memory;
mod postgres;

pub use memory::MemoryIdMap;
pub use postgres::PostgresIdMap;

/// Disposition of one mapped row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    /// The row was written to the destination and the mapping is current.
    Imported,
    /// The mapping exists but the row must be re-processed on the next run.
    NeedsUpdate,
    /// The row was deliberately skipped; do not retry it needlessly.
    Ignored,
    /// Processing the row failed; re-runs will try it again.
    Failed,
}

impl RecordStatus {
    pub fn as_i16(self) -> i16 {
        match self {
            RecordStatus::Imported => 0,
            RecordStatus::NeedsUpdate => 1,
            RecordStatus::Ignored => 2,
            RecordStatus::Failed => 3,
        }
    }

    pub fn from_i16(raw: i16) -> Option<Self> {
        match raw {
            0 => Some(RecordStatus::Imported),
            1 => Some(RecordStatus::NeedsUpdate),
            2 => Some(RecordStatus::Ignored),
            3 => Some(RecordStatus::Failed),
            _ => None,
        }
    }
}

/// What rollback should do with the mapped destination record.
///
/// Rows that created their destination record are deleted with it; rows that
/// merely updated a pre-existing record keep the record and lose only the
/// mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RollbackAction {
    Delete,
    Preserve,
}

impl RollbackAction {
    pub fn as_i16(self) -> i16 {
        match self {
            RollbackAction::Delete => 0,
            RollbackAction::Preserve => 1,
        }
    }

    pub fn from_i16(raw: i16) -> Option<Self> {
        match raw {
            0 => Some(RollbackAction::Delete),
            1 => Some(RollbackAction::Preserve),
            _ => None,
        }
    }
}

/// One persisted mapping entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdMapEntry {
    pub source_id: IdTuple,
    pub destination_id: Option<IdTuple>,
    pub source_hash: String,
    pub status: RecordStatus,
    pub rollback_action: RollbackAction,
    /// Creation order within the map; rollback iterates entries in reverse of
    /// this sequence. Upserts preserve the original value.
    pub sequence: u64,
    pub last_imported_at: DateTime<Utc>,
}

impl IdMapEntry {
    /// Builds an entry with no destination id yet and an unassigned sequence.
    /// Stores assign the sequence on first save.
    pub fn new(
        source_id: IdTuple,
        source_hash: String,
        status: RecordStatus,
        rollback_action: RollbackAction,
    ) -> Self {
        Self {
            source_id,
            destination_id: None,
            source_hash,
            status,
            rollback_action,
            sequence: 0,
            last_imported_at: Utc::now(),
        }
    }
}

/// Severity of a per-row diagnostic message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageLevel {
    Error,
    Warning,
    Info,
}

impl MessageLevel {
    pub fn as_i16(self) -> i16 {
        match self {
            MessageLevel::Error => 0,
            MessageLevel::Warning => 1,
            MessageLevel::Info => 2,
        }
    }

    pub fn from_i16(raw: i16) -> Option<Self> {
        match raw {
            0 => Some(MessageLevel::Error),
            1 => Some(MessageLevel::Warning),
            2 => Some(MessageLevel::Info),
            _ => None,
        }
    }
}

/// A diagnostic message recorded against one source id.
#[derive(Debug, Clone, PartialEq)]
pub struct IdMapMessage {
    pub source_id: IdTuple,
    pub message: String,
    pub level: MessageLevel,
}

/// Storage contract for the id map.
///
/// All reads and writes of mapping state go through this trait; no other
/// component may cache id mappings across rows. Implementations must make
/// [`IdMapStore::save_mapping`] an idempotent upsert keyed by the source id
/// tuple.
#[async_trait]
pub trait IdMapStore: Send + Sync + fmt::Debug {
    /// Translates a source id into the mapped destination id, if any.
    async fn lookup_destination(&self, source_id: &IdTuple) -> MigrateResult<Option<IdTuple>>;

    /// Inverse lookup, for rollback and existence checks. When several source
    /// rows map to the same destination tuple the earliest mapping wins.
    async fn lookup_source(&self, destination_id: &IdTuple) -> MigrateResult<Option<IdTuple>>;

    /// Returns the full entry for a source id.
    async fn get(&self, source_id: &IdTuple) -> MigrateResult<Option<IdMapEntry>>;

    /// Idempotent upsert keyed by source id. A pre-existing entry keeps its
    /// creation sequence; everything else is replaced.
    async fn save_mapping(
        &self,
        source_id: &IdTuple,
        destination_id: Option<&IdTuple>,
        source_hash: &str,
        status: RecordStatus,
        rollback_action: RollbackAction,
    ) -> MigrateResult<()>;

    /// Removes one mapping. Removing the mapped destination record is the
    /// executor's decision, not the store's.
    async fn delete(&self, source_id: &IdTuple) -> MigrateResult<()>;

    /// All entries in creation-sequence order.
    async fn entries(&self) -> MigrateResult<Vec<IdMapEntry>>;

    /// Source ids whose status is not [`RecordStatus::Imported`] — the rows a
    /// re-run must look at again. Hash-based change detection happens per row
    /// during import, since it needs the freshly computed hash.
    async fn current_source_ids(&self) -> MigrateResult<Vec<IdTuple>>;

    /// Maximum numeric leading destination id component across all entries.
    /// Zero when the map is empty or no destination id is numeric; absence of
    /// data is not an error.
    async fn highest_destination_id(&self) -> MigrateResult<i64>;

    /// Number of entries with status [`RecordStatus::Imported`].
    async fn imported_count(&self) -> MigrateResult<u64>;

    /// Total number of entries.
    async fn processed_count(&self) -> MigrateResult<u64>;

    /// Records a diagnostic message against a source id.
    async fn save_message(
        &self,
        source_id: &IdTuple,
        message: &str,
        level: MessageLevel,
    ) -> MigrateResult<()>;

    /// Messages recorded for one source id, in insertion order.
    async fn messages(&self, source_id: &IdTuple) -> MigrateResult<Vec<IdMapMessage>>;
}

/// Read-only view over the id maps of sibling migrations.
///
/// The migration-lookup process plugin translates foreign ids through the id
/// map of a previously executed migration; this registry is how that map is
/// reached without ambient global state.
#[async_trait]
pub trait IdMapRegistry: Send + Sync {
    /// Looks up `source_id` in the id map of the named migration. Returns
    /// `None` either when the migration is unknown or when it has no mapping
    /// for the id.
    async fn lookup_in(
        &self,
        migration_id: &str,
        source_id: &IdTuple,
    ) -> MigrateResult<Option<IdTuple>>;
}

/// Simple [`IdMapRegistry`] over a map of migration ids to stores.
#[derive(Default)]
pub struct StaticIdMapRegistry {
    maps: BTreeMap<String, std::sync::Arc<dyn IdMapStore>>,
}

impl StaticIdMapRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, migration_id: impl Into<String>, map: std::sync::Arc<dyn IdMapStore>) {
        self.maps.insert(migration_id.into(), map);
    }
}

impl fmt::Debug for StaticIdMapRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticIdMapRegistry")
            .field("migrations", &self.maps.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[async_trait]
impl IdMapRegistry for StaticIdMapRegistry {
    async fn lookup_in(
        &self,
        migration_id: &str,
        source_id: &IdTuple,
    ) -> MigrateResult<Option<IdTuple>> {
        match self.maps.get(migration_id) {
            Some(map) => map.lookup_destination(source_id).await,
            None => Ok(None),
        }
    }
}
