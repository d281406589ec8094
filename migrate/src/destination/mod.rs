//! Destination plugins: where transformed rows are written.

use async_trait::async_trait;

use crate::error::MigrateResult;
use crate::idmap::{IdMapStore, RollbackAction};
use crate::types::{IdTuple, Row};

mod memory;

pub use memory::{MemoryDestination, StoredEntity};

/// Result of importing one row.
#[derive(Debug, Clone, PartialEq)]
pub struct DestinationWrite {
    /// The created or updated record's id tuple.
    pub destination_id: IdTuple,
    /// What rollback should do with the record: delete it when this import
    /// created it, preserve it when the import merely updated a record that
    /// already existed.
    pub rollback_action: RollbackAction,
}

/// Contract for systems that receive migrated rows.
///
/// Implementations should be idempotent per destination id: re-importing a
/// row overwrites the previous write rather than duplicating it. The optional
/// capability accessors advertise audit support; destinations that cannot
/// audit their id space simply leave them unimplemented.
#[async_trait]
pub trait Destination: Send + Sync {
    /// Writes one transformed row, returning the destination id tuple and the
    /// appropriate rollback action.
    async fn import(&self, row: &Row) -> MigrateResult<DestinationWrite>;

    /// Removes the record mapped to a destination id. Absent records are not
    /// an error; rollback must be idempotent.
    async fn rollback(&self, destination_id: &IdTuple) -> MigrateResult<()>;

    /// Pre-flight validation; a failure aborts the run before any row.
    fn check_requirements(&self) -> MigrateResult<()> {
        Ok(())
    }

    /// Audit capability: can this destination detect unsafe id ranges?
    fn as_id_audit(&self) -> Option<&dyn IdAudit> {
        None
    }

    /// Aggregate capability: highest live id in the destination store.
    fn as_highest_id(&self) -> Option<&dyn GetHighestId> {
        None
    }

    /// Aggregate capability: per-field maximum in the destination store.
    fn as_max_id(&self) -> Option<&dyn GetMaxId> {
        None
    }
}

/// Capability of destinations that can audit whether they may encounter
/// unsafe id mappings.
#[async_trait]
pub trait IdAudit: Send + Sync {
    /// Checks whether the live destination store already contains
    /// non-migrated records whose ids fall in the range an import would
    /// assign.
    async fn unsafe_ids_exist(&self, id_map: &dyn IdMapStore) -> MigrateResult<bool>;

    /// The type of entity this destination creates, e.g. `node`.
    fn entity_type_id(&self) -> &str;
}

/// Capability of destinations that can report the highest id value that
/// exists in the live store.
///
/// Returns zero when no ids exist or the concept of a highest id is not
/// meaningful.
#[async_trait]
pub trait GetHighestId: Send + Sync {
    async fn highest_id(&self) -> MigrateResult<i64>;
}

/// Capability of destinations that can report the maximum value of one
/// destination field.
///
/// Returns zero when no values exist or the concept is not meaningful.
#[async_trait]
pub trait GetMaxId: Send + Sync {
    async fn max_id(&self, field: &str) -> MigrateResult<i64>;
}
