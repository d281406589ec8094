//! Pre-import auditing of destination id spaces.

use std::collections::BTreeSet;

use tracing::warn;

use crate::error::MigrateResult;
use crate::executor::Migration;

/// Audits migrations for potential id conflicts.
///
/// Before an import that will assign ids, a destination may already contain
/// non-migrated records in the range the import is about to use. The auditor
/// asks every destination that supports id auditing to compare itself against
/// its own id map, and reports the distinct entity types at risk.
///
/// Detection is advisory: the auditor warns, it does not block or fail
/// migrations.
#[derive(Debug, Default)]
pub struct IdAuditor;

impl IdAuditor {
    pub fn new() -> Self {
        Self
    }

    /// Audits a set of migrations for id conflicts.
    ///
    /// Returns the entity type ids of migrated content that may have
    /// problematic ids; empty when no problems are found. Destinations
    /// without audit support are skipped.
    pub async fn audit_ids<'a, I>(&self, migrations: I) -> MigrateResult<Vec<String>>
    where
        I: IntoIterator<Item = &'a Migration>,
    {
        let mut unsafe_types = BTreeSet::new();
        for migration in migrations {
            let Some(audit) = migration.destination().as_id_audit() else {
                continue;
            };

            if audit.unsafe_ids_exist(migration.id_map()).await? {
                warn!(
                    migration_id = migration.id(),
                    entity_type = audit.entity_type_id(),
                    "destination contains ids in the range this migration would assign"
                );
                unsafe_types.insert(audit.entity_type_id().to_string());
            }
        }

        Ok(unsafe_types.into_iter().collect())
    }
}
