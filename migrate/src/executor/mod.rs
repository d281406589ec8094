//! The migration orchestrator: Source → ProcessPipeline → Destination → IdMap.

use std::collections::BTreeMap;
use std::sync::Arc;

use migrate_config::MigrationConfig;
use tracing::{error, info, warn};

use crate::concurrency::{create_stop_channel, stop_requested, StopRx, StopTx};
use crate::destination::Destination;
use crate::error::{ErrorKind, MigrateError, MigrateResult};
use crate::idmap::{IdMapRegistry, IdMapStore, MessageLevel, RecordStatus, RollbackAction};
use crate::message::render_placeholders;
use crate::migrate_error;
use crate::process::{
    PipelineOutcome, ProcessContext, ProcessPipeline, ProcessPluginRegistry, RowSkip, SkipReason,
};
use crate::source::Source;
use crate::types::{IdTuple, Row, Value};

/// Lifecycle state of a migration between runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationStatus {
    Idle,
    Importing,
    RollingBack,
}

/// Terminal outcome of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunResult {
    /// Every source row reached a terminal outcome.
    Completed,
    /// A stop was requested; already-written id map entries remain valid and
    /// the run is resumable.
    Stopped,
    /// One or more rollback entries could not be undone.
    Failed,
}

/// Per-run row counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    /// Rows written to the destination for the first time.
    pub imported: u64,
    /// Rows re-written over an existing mapping.
    pub updated: u64,
    /// Rows skipped: unchanged, prepare-row skips, and pipeline skips.
    pub ignored: u64,
    /// Rows that failed and were recorded as such.
    pub failed: u64,
}

/// Result of an import run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportReport {
    pub result: RunResult,
    pub summary: ImportSummary,
}

/// Result of a rollback run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RollbackReport {
    pub result: RunResult,
    /// Mappings removed.
    pub removed: u64,
    /// Entries whose destination record could not be removed.
    pub failed: u64,
}

/// A migration: an id plus its injected collaborators.
///
/// Everything is constructor-injected; the engine never resolves collaborators
/// through ambient global state.
pub struct Migration {
    id: String,
    source: Box<dyn Source>,
    pipelines: Vec<ProcessPipeline>,
    destination: Arc<dyn Destination>,
    id_map: Arc<dyn IdMapStore>,
    dependencies: Vec<String>,
}

impl Migration {
    /// Builds a migration with no pipelines; add them with
    /// [`Migration::with_pipeline`].
    pub fn new(
        id: impl Into<String>,
        source: Box<dyn Source>,
        destination: Arc<dyn Destination>,
        id_map: Arc<dyn IdMapStore>,
    ) -> Self {
        Self {
            id: id.into(),
            source,
            pipelines: Vec::new(),
            destination,
            id_map,
            dependencies: Vec::new(),
        }
    }

    /// Builds a migration from a declarative definition.
    ///
    /// The source and destination instances correspond to the definition's
    /// `source` / `destination` plugin selections; resolving those names to
    /// instances is the caller's plugin-discovery concern. The process
    /// pipelines are built here, through the registry.
    pub fn from_config(
        config: &MigrationConfig,
        source: Box<dyn Source>,
        destination: Arc<dyn Destination>,
        id_map: Arc<dyn IdMapStore>,
        registry: &ProcessPluginRegistry,
    ) -> MigrateResult<Self> {
        config.validate().map_err(|error| {
            migrate_error!(ErrorKind::ConfigError, "Invalid migration definition", error)
        })?;

        let mut migration = Self::new(config.id.clone(), source, destination, id_map);
        migration.dependencies = config.migration_dependencies.clone();
        for (property, process) in &config.process {
            migration
                .pipelines
                .push(registry.build_pipeline(property, process)?);
        }

        Ok(migration)
    }

    /// Appends one destination property's pipeline.
    pub fn with_pipeline(mut self, pipeline: ProcessPipeline) -> Self {
        self.pipelines.push(pipeline);
        self
    }

    /// Declares migrations that must have fully completed before this one.
    pub fn with_dependencies(mut self, dependencies: Vec<String>) -> Self {
        self.dependencies = dependencies;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn id_map(&self) -> &dyn IdMapStore {
        &*self.id_map
    }

    pub fn destination(&self) -> &dyn Destination {
        &*self.destination
    }

    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }
}

/// Empty registry used when a migration has no lookup dependencies.
#[derive(Debug, Default)]
struct NoIdMaps;

#[async_trait::async_trait]
impl IdMapRegistry for NoIdMaps {
    async fn lookup_in(
        &self,
        _migration_id: &str,
        _source_id: &IdTuple,
    ) -> MigrateResult<Option<IdTuple>> {
        Ok(None)
    }
}

/// Runs one migration to completion, row by row.
///
/// Rows are processed strictly sequentially in source order; no row starts
/// before the previous row's id map write has completed. A requested stop
/// takes effect between rows. One executable owns its migration for the
/// duration of the run.
pub struct MigrationExecutable {
    migration: Migration,
    id_maps: Arc<dyn IdMapRegistry>,
    status: MigrationStatus,
    stop_tx: StopTx,
    // Kept alive so stop requests sent before or between runs are never lost
    // to a closed channel.
    stop_rx: StopRx,
}

impl MigrationExecutable {
    pub fn new(migration: Migration) -> Self {
        let (stop_tx, stop_rx) = create_stop_channel();

        Self {
            migration,
            id_maps: Arc::new(NoIdMaps),
            status: MigrationStatus::Idle,
            stop_tx,
            stop_rx,
        }
    }

    /// Injects the id maps of sibling migrations, for lookup plugins.
    pub fn with_id_map_registry(mut self, id_maps: Arc<dyn IdMapRegistry>) -> Self {
        self.id_maps = id_maps;
        self
    }

    pub fn status(&self) -> MigrationStatus {
        self.status
    }

    pub fn migration(&self) -> &Migration {
        &self.migration
    }

    /// Handle for requesting a cooperative stop. The stop is honored between
    /// rows; the current row always completes first.
    pub fn stop_handle(&self) -> StopTx {
        self.stop_tx.clone()
    }

    /// Imports every source row.
    ///
    /// Row-scoped failures are recorded and counted; they never abort the
    /// run. Pre-flight failures and infrastructure errors do, leaving the id
    /// map consistent and re-runnable.
    pub async fn import(&mut self) -> MigrateResult<ImportReport> {
        if self.status != MigrationStatus::Idle {
            return Err(migrate_error!(
                ErrorKind::InvalidState,
                "Migration is already running"
            ));
        }

        self.check_requirements()?;

        info!(migration_id = self.migration.id(), "starting import");
        self.status = MigrationStatus::Importing;
        let result = self.run_import().await;
        self.status = MigrationStatus::Idle;

        match &result {
            Ok(report) => info!(
                migration_id = self.migration.id(),
                imported = report.summary.imported,
                updated = report.summary.updated,
                ignored = report.summary.ignored,
                failed = report.summary.failed,
                "import finished with {:?}",
                report.result
            ),
            Err(err) => error!(
                migration_id = self.migration.id(),
                "import aborted: {err}"
            ),
        }

        result
    }

    /// Pre-flight checks; failures abort before any row is touched.
    fn check_requirements(&self) -> MigrateResult<()> {
        self.migration.source.check_requirements()?;
        self.migration.destination.check_requirements()?;

        Ok(())
    }

    async fn run_import(&mut self) -> MigrateResult<ImportReport> {
        let id_maps = Arc::clone(&self.id_maps);
        let stop_rx = self.stop_rx.clone();
        let Migration {
            source,
            pipelines,
            destination,
            id_map,
            ..
        } = &mut self.migration;

        source.open().await?;

        let mut summary = ImportSummary::default();
        let result = loop {
            if stop_requested(&stop_rx) {
                info!("stop requested, ending import after current row");
                break RunResult::Stopped;
            }

            let Some(mut row) = source.next().await? else {
                break RunResult::Completed;
            };

            if !source.prepare_row(&mut row).await? {
                // Silent skip: no pipeline, no id map entry.
                summary.ignored += 1;
                continue;
            }

            row.freeze_source();
            if let Some(entry) = id_map.get(row.source_id()).await? {
                row.set_id_map_entry(entry);
            }
            if !row.needs_processing() {
                summary.ignored += 1;
                continue;
            }

            process_row(
                &mut row,
                pipelines,
                &**destination,
                &**id_map,
                &*id_maps,
                &mut summary,
            )
            .await?;
        };

        Ok(ImportReport { result, summary })
    }

    /// Rolls back every mapped row, newest first.
    ///
    /// Destination records are removed only when their rollback action says
    /// the import created them; the mapping entry is removed either way.
    /// Per-entry destination failures are counted and the loop continues.
    pub async fn rollback(&mut self) -> MigrateResult<RollbackReport> {
        if self.status != MigrationStatus::Idle {
            return Err(migrate_error!(
                ErrorKind::InvalidState,
                "Migration is already running"
            ));
        }

        info!(migration_id = self.migration.id(), "starting rollback");
        self.status = MigrationStatus::RollingBack;
        let result = self.run_rollback().await;
        self.status = MigrationStatus::Idle;

        result
    }

    async fn run_rollback(&mut self) -> MigrateResult<RollbackReport> {
        let id_map = &self.migration.id_map;
        let destination = &self.migration.destination;

        let mut report = RollbackReport {
            result: RunResult::Completed,
            removed: 0,
            failed: 0,
        };

        let entries = id_map.entries().await?;
        for entry in entries.iter().rev() {
            if entry.rollback_action == RollbackAction::Delete {
                if let Some(destination_id) = &entry.destination_id {
                    if let Err(err) = destination.rollback(destination_id).await {
                        warn!(
                            source_id = %entry.source_id,
                            destination_id = %destination_id,
                            "failed to remove destination record: {err}"
                        );
                        report.failed += 1;
                        continue;
                    }
                }
            }

            id_map.delete(&entry.source_id).await?;
            report.removed += 1;
        }

        if report.failed > 0 {
            report.result = RunResult::Failed;
        }

        Ok(report)
    }
}

/// Runs one prepared row through its pipelines and the destination, recording
/// the outcome in the id map. Row-scoped failures are absorbed into the
/// summary; only infrastructure errors propagate.
async fn process_row(
    row: &mut Row,
    pipelines: &[ProcessPipeline],
    destination: &dyn Destination,
    id_map: &dyn IdMapStore,
    id_maps: &dyn IdMapRegistry,
    summary: &mut ImportSummary,
) -> MigrateResult<()> {
    let hash = row.hash().unwrap_or_default().to_string();
    let source_id = row.source_id().clone();
    let was_mapped = row
        .id_map_entry()
        .is_some_and(|entry| entry.destination_id.is_some());

    let mut skip: Option<RowSkip> = None;
    let mut row_error: Option<MigrateError> = None;
    for pipeline in pipelines {
        let outcome = {
            let context = ProcessContext {
                row: &*row,
                id_maps,
            };
            pipeline.run(&context).await
        };

        match outcome {
            Ok(PipelineOutcome::Value(value)) => {
                row.set_destination_property(pipeline.destination_property().to_string(), value);
            }
            Ok(PipelineOutcome::SkipRow(row_skip)) => {
                skip = Some(row_skip);
                break;
            }
            Err(err) if err.kind().is_row_scoped() => {
                row_error = Some(err);
                break;
            }
            Err(err) => return Err(err),
        }
    }

    if let Some(skip) = skip {
        summary.ignored += 1;
        if skip.record {
            match id_map
                .save_mapping(&source_id, None, &hash, RecordStatus::Ignored, RollbackAction::Delete)
                .await
            {
                Ok(()) => {
                    // Keep the two skip dispositions distinguishable after
                    // the run.
                    if skip.reason == SkipReason::MissingSource {
                        if let Err(err) = id_map
                            .save_message(
                                &source_id,
                                "Row skipped: missing source value",
                                MessageLevel::Info,
                            )
                            .await
                        {
                            warn!(source_id = %source_id, "failed to record skip message: {err}");
                        }
                    }
                }
                Err(err) => {
                    warn!(source_id = %source_id, "failed to record skip: {err}");
                    summary.ignored -= 1;
                    summary.failed += 1;
                }
            }
        }
        return Ok(());
    }

    if let Some(err) = row_error {
        record_row_failure(id_map, &source_id, &hash, &err, summary).await;
        return Ok(());
    }

    match destination.import(row).await {
        Ok(write) => {
            match id_map
                .save_mapping(
                    &source_id,
                    Some(&write.destination_id),
                    &hash,
                    RecordStatus::Imported,
                    write.rollback_action,
                )
                .await
            {
                Ok(()) => {
                    if was_mapped {
                        summary.updated += 1;
                    } else {
                        summary.imported += 1;
                    }
                }
                Err(err) => {
                    // The destination write went through but the mapping did
                    // not; without the mapping the row is not re-runnable as
                    // imported, so it counts as failed.
                    record_row_failure(id_map, &source_id, &hash, &err, summary).await;
                }
            }
        }
        Err(err) if err.kind().is_row_scoped() => {
            record_row_failure(id_map, &source_id, &hash, &err, summary).await;
        }
        Err(err) => return Err(err),
    }

    Ok(())
}

/// Marks a row failed and records a locatable diagnostic against its source
/// id. Storage failures here are logged and absorbed; the row is already
/// counted as failed.
async fn record_row_failure(
    id_map: &dyn IdMapStore,
    source_id: &IdTuple,
    hash: &str,
    err: &MigrateError,
    summary: &mut ImportSummary,
) {
    summary.failed += 1;

    if let Err(save_err) = id_map
        .save_mapping(source_id, None, hash, RecordStatus::Failed, RollbackAction::Delete)
        .await
    {
        warn!(source_id = %source_id, "failed to record row failure: {save_err}");
        return;
    }

    let message = render_placeholders(
        "Row @id failed: @error",
        &BTreeMap::from([
            ("@id".to_string(), Value::from(source_id.to_string())),
            ("@error".to_string(), Value::from(err.to_string())),
        ]),
    )
    .unwrap_or_else(|_| format!("Row {source_id} failed"));

    if let Err(save_err) = id_map
        .save_message(source_id, &message, MessageLevel::Error)
        .await
    {
        warn!(source_id = %source_id, "failed to record row message: {save_err}");
    }
}
