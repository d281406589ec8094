use async_trait::async_trait;
use chrono::{DateTime, Utc};
use migrate_config::PgConnectionConfig;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row as _};
use tracing::debug;

use crate::bail;
use crate::error::{ErrorKind, MigrateResult};
use crate::idmap::{
    IdMapEntry, IdMapMessage, IdMapStore, MessageLevel, RecordStatus, RollbackAction,
};
use crate::types::IdTuple;

const NUM_POOL_CONNECTIONS: u32 = 1;

/// An id map persisted in a Postgres database.
///
/// All migrations share two tables, partitioned by `migration_id`; entries are
/// keyed by the canonical form of the source id tuple, with the raw tuples
/// stored alongside as JSONB for lookups in both directions.
#[derive(Debug, Clone)]
pub struct PostgresIdMap {
    migration_id: String,
    pool: PgPool,
}

impl PostgresIdMap {
    /// Connects to the configured database and ensures the map tables exist.
    pub async fn connect(
        config: &PgConnectionConfig,
        migration_id: impl Into<String>,
    ) -> MigrateResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(NUM_POOL_CONNECTIONS)
            .min_connections(NUM_POOL_CONNECTIONS)
            .connect_with(config.with_db())
            .await?;

        let map = Self {
            migration_id: migration_id.into(),
            pool,
        };
        map.ensure_schema().await?;

        Ok(map)
    }

    /// Wraps an existing pool, for callers that manage their own connections.
    pub async fn with_pool(pool: PgPool, migration_id: impl Into<String>) -> MigrateResult<Self> {
        let map = Self {
            migration_id: migration_id.into(),
            pool,
        };
        map.ensure_schema().await?;

        Ok(map)
    }

    async fn ensure_schema(&self) -> MigrateResult<()> {
        debug!(
            migration_id = %self.migration_id,
            "ensuring id map tables exist"
        );

        sqlx::query(
            r#"
            create table if not exists migrate_map (
                migration_id text not null,
                source_key text not null,
                source_id jsonb not null,
                destination_id jsonb,
                source_hash text not null,
                status smallint not null,
                rollback_action smallint not null,
                sequence bigint generated always as identity,
                last_imported_at timestamptz not null,
                primary key (migration_id, source_key)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            create table if not exists migrate_message (
                id bigint generated always as identity primary key,
                migration_id text not null,
                source_key text not null,
                source_id jsonb not null,
                level smallint not null,
                message text not null
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    fn entry_from_row(row: &PgRow) -> MigrateResult<IdMapEntry> {
        let source_id: serde_json::Value = row.try_get("source_id")?;
        let destination_id: Option<serde_json::Value> = row.try_get("destination_id")?;
        let status: i16 = row.try_get("status")?;
        let rollback_action: i16 = row.try_get("rollback_action")?;
        let sequence: i64 = row.try_get("sequence")?;
        let last_imported_at: DateTime<Utc> = row.try_get("last_imported_at")?;
        let source_hash: String = row.try_get("source_hash")?;

        let Some(status) = RecordStatus::from_i16(status) else {
            bail!(
                ErrorKind::ConversionError,
                "Unknown record status in id map table",
                status
            );
        };
        let Some(rollback_action) = RollbackAction::from_i16(rollback_action) else {
            bail!(
                ErrorKind::ConversionError,
                "Unknown rollback action in id map table",
                rollback_action
            );
        };

        Ok(IdMapEntry {
            source_id: serde_json::from_value(source_id)?,
            destination_id: destination_id.map(serde_json::from_value).transpose()?,
            source_hash,
            status,
            rollback_action,
            sequence: sequence.max(0) as u64,
            last_imported_at,
        })
    }
}

#[async_trait]
impl IdMapStore for PostgresIdMap {
    async fn lookup_destination(&self, source_id: &IdTuple) -> MigrateResult<Option<IdTuple>> {
        let row = sqlx::query(
            "select destination_id from migrate_map where migration_id = $1 and source_key = $2",
        )
        .bind(&self.migration_id)
        .bind(source_id.storage_key())
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let destination_id: Option<serde_json::Value> = row.try_get("destination_id")?;

        Ok(destination_id.map(serde_json::from_value).transpose()?)
    }

    async fn lookup_source(&self, destination_id: &IdTuple) -> MigrateResult<Option<IdTuple>> {
        let row = sqlx::query(
            r#"
            select source_id from migrate_map
            where migration_id = $1 and destination_id = $2
            order by sequence
            limit 1
            "#,
        )
        .bind(&self.migration_id)
        .bind(serde_json::to_value(destination_id)?)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let source_id: serde_json::Value = row.try_get("source_id")?;

        Ok(Some(serde_json::from_value(source_id)?))
    }

    async fn get(&self, source_id: &IdTuple) -> MigrateResult<Option<IdMapEntry>> {
        let row = sqlx::query(
            "select * from migrate_map where migration_id = $1 and source_key = $2",
        )
        .bind(&self.migration_id)
        .bind(source_id.storage_key())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::entry_from_row).transpose()
    }

    async fn save_mapping(
        &self,
        source_id: &IdTuple,
        destination_id: Option<&IdTuple>,
        source_hash: &str,
        status: RecordStatus,
        rollback_action: RollbackAction,
    ) -> MigrateResult<()> {
        sqlx::query(
            r#"
            insert into migrate_map
                (migration_id, source_key, source_id, destination_id, source_hash,
                 status, rollback_action, last_imported_at)
            values ($1, $2, $3, $4, $5, $6, $7, $8)
            on conflict (migration_id, source_key) do update set
                destination_id = excluded.destination_id,
                source_hash = excluded.source_hash,
                status = excluded.status,
                rollback_action = excluded.rollback_action,
                last_imported_at = excluded.last_imported_at
            "#,
        )
        .bind(&self.migration_id)
        .bind(source_id.storage_key())
        .bind(serde_json::to_value(source_id)?)
        .bind(destination_id.map(serde_json::to_value).transpose()?)
        .bind(source_hash)
        .bind(status.as_i16())
        .bind(rollback_action.as_i16())
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete(&self, source_id: &IdTuple) -> MigrateResult<()> {
        sqlx::query("delete from migrate_map where migration_id = $1 and source_key = $2")
            .bind(&self.migration_id)
            .bind(source_id.storage_key())
            .execute(&self.pool)
            .await?;
        sqlx::query("delete from migrate_message where migration_id = $1 and source_key = $2")
            .bind(&self.migration_id)
            .bind(source_id.storage_key())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn entries(&self) -> MigrateResult<Vec<IdMapEntry>> {
        let rows = sqlx::query("select * from migrate_map where migration_id = $1 order by sequence")
            .bind(&self.migration_id)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(Self::entry_from_row).collect()
    }

    async fn current_source_ids(&self) -> MigrateResult<Vec<IdTuple>> {
        let rows = sqlx::query(
            r#"
            select source_id from migrate_map
            where migration_id = $1 and status <> $2
            order by sequence
            "#,
        )
        .bind(&self.migration_id)
        .bind(RecordStatus::Imported.as_i16())
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let source_id: serde_json::Value = row.try_get("source_id")?;
                Ok(serde_json::from_value(source_id)?)
            })
            .collect()
    }

    async fn highest_destination_id(&self) -> MigrateResult<i64> {
        // Only numeric leading components participate in the scan.
        let row = sqlx::query(
            r#"
            select coalesce(max((destination_id->>0)::bigint), 0) as highest
            from migrate_map
            where migration_id = $1
              and destination_id->>0 ~ '^[0-9]+$'
            "#,
        )
        .bind(&self.migration_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.try_get("highest")?)
    }

    async fn imported_count(&self) -> MigrateResult<u64> {
        let row = sqlx::query(
            "select count(*) as total from migrate_map where migration_id = $1 and status = $2",
        )
        .bind(&self.migration_id)
        .bind(RecordStatus::Imported.as_i16())
        .fetch_one(&self.pool)
        .await?;
        let total: i64 = row.try_get("total")?;

        Ok(total.max(0) as u64)
    }

    async fn processed_count(&self) -> MigrateResult<u64> {
        let row = sqlx::query("select count(*) as total from migrate_map where migration_id = $1")
            .bind(&self.migration_id)
            .fetch_one(&self.pool)
            .await?;
        let total: i64 = row.try_get("total")?;

        Ok(total.max(0) as u64)
    }

    async fn save_message(
        &self,
        source_id: &IdTuple,
        message: &str,
        level: MessageLevel,
    ) -> MigrateResult<()> {
        sqlx::query(
            r#"
            insert into migrate_message (migration_id, source_key, source_id, level, message)
            values ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(&self.migration_id)
        .bind(source_id.storage_key())
        .bind(serde_json::to_value(source_id)?)
        .bind(level.as_i16())
        .bind(message)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn messages(&self, source_id: &IdTuple) -> MigrateResult<Vec<IdMapMessage>> {
        let rows = sqlx::query(
            r#"
            select source_id, level, message from migrate_message
            where migration_id = $1 and source_key = $2
            order by id
            "#,
        )
        .bind(&self.migration_id)
        .bind(source_id.storage_key())
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let source_id: serde_json::Value = row.try_get("source_id")?;
                let level: i16 = row.try_get("level")?;
                let Some(level) = MessageLevel::from_i16(level) else {
                    bail!(
                        ErrorKind::ConversionError,
                        "Unknown message level in id map table",
                        level
                    );
                };

                Ok(IdMapMessage {
                    source_id: serde_json::from_value(source_id)?,
                    message: row.try_get("message")?,
                    level,
                })
            })
            .collect()
    }
}
