mod common;

use std::collections::BTreeMap;
use std::sync::Arc;

use migrate::destination::MemoryDestination;
use migrate::executor::{Migration, MigrationExecutable};
use migrate::process::ProcessPluginRegistry;
use migrate::source::{derive_field_names, Dataset, RevisionTranslationSource};
use migrate::types::Value;
use migrate_config::MigrationConfig;
use migrate_telemetry::tracing::init_test_tracing;

use common::{empty_id_map, node_source, translated_nodes};

fn revision(nid: i64, vid: i64, language: &str, tnid: i64, title: &str) -> BTreeMap<String, Value> {
    BTreeMap::from([
        ("nid".to_string(), Value::Int(nid)),
        ("vid".to_string(), Value::Int(vid)),
        ("language".to_string(), Value::from(language)),
        ("tnid".to_string(), Value::Int(tnid)),
        ("title".to_string(), Value::from(title)),
    ])
}

fn revision_source() -> RevisionTranslationSource {
    let dataset = Dataset::new().with_table(
        "node_revisions",
        vec![
            revision(1, 1, "en", 1, "Cat v1"),
            revision(2, 2, "fr", 1, "Chat v2"),
            revision(3, 3, "de", 1, "Katze v3"),
            revision(1, 4, "en", 1, "Cat v4"),
        ],
    );
    RevisionTranslationSource::new(dataset, "node_revisions", "nid", "vid", "language")
        .with_set_field("tnid")
        .with_field("title", "Title")
}

#[tokio::test]
async fn revision_history_is_reconstructed_per_language() {
    init_test_tracing();

    let config: MigrationConfig = serde_json::from_value(serde_json::json!({
        "id": "legacy_node_revisions",
        "source": { "plugin": "node_revision", "table": "node_revisions" },
        "process": {
            "vid": "vid",
            "langcode": "language",
            "title": "title",
        },
        "destination": { "plugin": "memory", "entity_type": "node_revision" },
    }))
    .unwrap();

    // One destination record per revision, translations sharing it.
    let destination = Arc::new(
        MemoryDestination::new("node_revision")
            .with_key_property("vid")
            .with_language_property("langcode"),
    );
    let migration = Migration::from_config(
        &config,
        Box::new(revision_source()),
        destination.clone(),
        empty_id_map(),
        &ProcessPluginRegistry::new(),
    )
    .unwrap();

    let report = MigrationExecutable::new(migration).import().await.unwrap();
    assert_eq!(report.summary.imported, 9);
    assert_eq!(destination.len().await, 4);

    // Revision 3 pairs with the latest translation at or before it.
    let v3 = destination.entity(3).await.unwrap();
    assert_eq!(v3.translations["en"]["title"], Value::from("Cat v1"));
    assert_eq!(v3.translations["fr"]["title"], Value::from("Chat v2"));
    assert_eq!(v3.translations["de"]["title"], Value::from("Katze v3"));

    // Revision 4 replaces only the English content.
    let v4 = destination.entity(4).await.unwrap();
    assert_eq!(v4.translations["en"]["title"], Value::from("Cat v4"));
    assert_eq!(v4.translations["fr"]["title"], Value::from("Chat v2"));
    assert_eq!(v4.translations["de"]["title"], Value::from("Katze v3"));

    // Revision 1 predates the translations.
    let v1 = destination.entity(1).await.unwrap();
    assert_eq!(v1.translations.len(), 1);
    assert_eq!(v1.translations["en"]["title"], Value::from("Cat v1"));
}

#[tokio::test]
async fn field_names_derive_without_a_live_migration() {
    init_test_tracing();

    let names = derive_field_names(&revision_source());
    for expected in ["nid", "vid", "language", "content_revision", "title"] {
        assert!(names.iter().any(|name| name == expected), "missing {expected}");
    }

    let table_names = derive_field_names(&node_source(translated_nodes()));
    assert!(table_names.iter().any(|name| name == "tnid"));
}
