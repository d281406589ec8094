//! Shared fixtures for the integration tests.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use migrate::destination::MemoryDestination;
use migrate::error::{ErrorKind, MigrateResult};
use migrate::executor::Migration;
use migrate::idmap::{IdMapStore, MemoryIdMap};
use migrate::migrate_error;
use migrate::process::ProcessPluginRegistry;
use migrate::source::{Dataset, Source, SourceQuery, TableRows, TableSource};
use migrate::types::{IdFieldDefinition, Row, Value};
use migrate_config::MigrationConfig;

/// One legacy node row.
pub fn node(nid: i64, tnid: i64, language: &str, title: &str) -> BTreeMap<String, Value> {
    BTreeMap::from([
        ("nid".to_string(), Value::Int(nid)),
        ("tnid".to_string(), Value::Int(tnid)),
        ("language".to_string(), Value::from(language)),
        ("title".to_string(), Value::from(title)),
    ])
}

/// The translation-set scenario: node 2 is the French translation of node 1.
pub fn translated_nodes() -> TableRows {
    vec![node(1, 0, "en", "Cat"), node(2, 1, "fr", "Chat")]
}

/// A node source over the given rows, with translation-set collapsing on.
pub fn node_source(rows: TableRows) -> TableSource {
    let dataset = Dataset::new().with_table("node", rows);
    TableSource::new(
        dataset,
        SourceQuery::new("node").order_by("nid", migrate::source::SortDirection::Ascending),
        vec![
            IdFieldDefinition::integer("nid"),
            IdFieldDefinition::string("language"),
        ],
    )
    .with_set_collapse("tnid", "nid")
    .with_field("nid", "Node id")
    .with_field("tnid", "Translation set id")
    .with_field("language", "Language (fr, en, ...)")
    .with_field("title", "Title")
}

/// The standard node migration definition used across tests.
pub fn node_migration_config() -> MigrationConfig {
    serde_json::from_value(serde_json::json!({
        "id": "legacy_nodes",
        "source": { "plugin": "table", "table": "node" },
        "process": {
            "nid": "nid",
            "langcode": "language",
            "title": "title",
        },
        "destination": { "plugin": "memory", "entity_type": "node" },
    }))
    .expect("definition is well formed")
}

/// Builds the node migration over the given legacy rows.
pub fn node_migration(
    rows: TableRows,
    destination: Arc<MemoryDestination>,
    id_map: Arc<dyn IdMapStore>,
) -> Migration {
    Migration::from_config(
        &node_migration_config(),
        Box::new(node_source(rows)),
        destination,
        id_map,
        &ProcessPluginRegistry::new(),
    )
    .expect("definition builds")
}

/// The memory destination shaped for node entities.
pub fn node_destination() -> Arc<MemoryDestination> {
    Arc::new(
        MemoryDestination::new("node")
            .with_key_property("nid")
            .with_language_property("langcode"),
    )
}

pub fn empty_id_map() -> Arc<MemoryIdMap> {
    Arc::new(MemoryIdMap::new())
}

/// A source whose pre-flight requirements always fail.
pub struct UnmetRequirementsSource;

#[async_trait]
impl Source for UnmetRequirementsSource {
    fn query(&self) -> SourceQuery {
        SourceQuery::new("node")
    }

    fn fields(&self) -> BTreeMap<String, String> {
        BTreeMap::new()
    }

    fn ids(&self) -> Vec<IdFieldDefinition> {
        vec![IdFieldDefinition::integer("nid")]
    }

    fn check_requirements(&self) -> MigrateResult<()> {
        Err(migrate_error!(
            ErrorKind::RequirementsNotMet,
            "The legacy schema version is unsupported"
        ))
    }

    async fn open(&mut self) -> MigrateResult<()> {
        Ok(())
    }

    async fn next(&mut self) -> MigrateResult<Option<Row>> {
        Ok(None)
    }
}
