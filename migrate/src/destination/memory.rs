use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::info;

use crate::bail;
use crate::destination::{Destination, DestinationWrite, GetHighestId, GetMaxId, IdAudit};
use crate::error::{ErrorKind, MigrateResult};
use crate::idmap::{IdMapStore, RollbackAction};
use crate::types::{IdTuple, Row, Value};

/// One entity held by [`MemoryDestination`].
///
/// Translations share the entity's destination id; the payload written
/// without a language lands under the empty language key.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredEntity {
    pub id: i64,
    pub translations: BTreeMap<String, BTreeMap<String, Value>>,
}

#[derive(Debug)]
struct Inner {
    entities: BTreeMap<i64, StoredEntity>,
    next_id: i64,
}

/// In-memory destination for testing and development.
///
/// Entities live in memory behind a mutex and are lost on process exit. Ids
/// are taken from the configured key property when the transformed row
/// provides one, and allocated sequentially otherwise. The destination
/// implements all three audit capabilities, so id-collision tests can run
/// fully in memory.
#[derive(Debug, Clone)]
pub struct MemoryDestination {
    entity_type: String,
    key_property: Option<String>,
    language_property: Option<String>,
    inner: Arc<Mutex<Inner>>,
}

impl MemoryDestination {
    pub fn new(entity_type: impl Into<String>) -> Self {
        let inner = Inner {
            entities: BTreeMap::new(),
            next_id: 1,
        };

        Self {
            entity_type: entity_type.into(),
            key_property: None,
            language_property: None,
            inner: Arc::new(Mutex::new(inner)),
        }
    }

    /// Names the destination property holding an explicit entity id.
    pub fn with_key_property(mut self, property: impl Into<String>) -> Self {
        self.key_property = Some(property.into());
        self
    }

    /// Names the destination property selecting the translation language.
    pub fn with_language_property(mut self, property: impl Into<String>) -> Self {
        self.language_property = Some(property.into());
        self
    }

    /// Returns a copy of all stored entities, for verification.
    pub async fn entities(&self) -> BTreeMap<i64, StoredEntity> {
        let inner = self.inner.lock().await;
        inner.entities.clone()
    }

    /// Returns one stored entity, for verification.
    pub async fn entity(&self, id: i64) -> Option<StoredEntity> {
        let inner = self.inner.lock().await;
        inner.entities.get(&id).cloned()
    }

    pub async fn len(&self) -> usize {
        let inner = self.inner.lock().await;
        inner.entities.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Seeds a pre-existing (non-migrated) entity, for audit tests and for
    /// update-in-place scenarios.
    pub async fn seed(&self, id: i64, properties: BTreeMap<String, Value>) {
        let mut inner = self.inner.lock().await;
        inner.entities.insert(
            id,
            StoredEntity {
                id,
                translations: BTreeMap::from([(String::new(), properties)]),
            },
        );
        inner.next_id = inner.next_id.max(id + 1);
    }

    /// Clears all stored entities.
    pub async fn clear(&self) {
        let mut inner = self.inner.lock().await;
        inner.entities.clear();
        inner.next_id = 1;
    }
}

#[async_trait]
impl Destination for MemoryDestination {
    async fn import(&self, row: &Row) -> MigrateResult<DestinationWrite> {
        let mut inner = self.inner.lock().await;

        let id = match &self.key_property {
            Some(property) => match row.get_destination(property) {
                Some(value) => {
                    let Some(id) = value.as_i64() else {
                        bail!(
                            ErrorKind::DestinationWriteFailed,
                            "Destination key property is not numeric",
                            format!("{property} = {value}")
                        );
                    };
                    id
                }
                None => inner.next_id,
            },
            None => inner.next_id,
        };

        let language = self
            .language_property
            .as_ref()
            .and_then(|property| row.get_destination(property))
            .and_then(Value::to_display_string)
            .unwrap_or_default();

        let pre_existing = inner.entities.contains_key(&id);
        let entity = inner.entities.entry(id).or_insert_with(|| StoredEntity {
            id,
            translations: BTreeMap::new(),
        });
        entity.translations.insert(language, row.destination().clone());
        inner.next_id = inner.next_id.max(id + 1);

        info!(
            entity_type = %self.entity_type,
            id,
            pre_existing,
            "imported row into memory destination"
        );

        Ok(DestinationWrite {
            destination_id: IdTuple::single(id),
            rollback_action: if pre_existing {
                RollbackAction::Preserve
            } else {
                RollbackAction::Delete
            },
        })
    }

    async fn rollback(&self, destination_id: &IdTuple) -> MigrateResult<()> {
        let Some(id) = destination_id.leading_numeric() else {
            bail!(
                ErrorKind::DestinationWriteFailed,
                "Destination id is not numeric",
                destination_id.to_string()
            );
        };

        let mut inner = self.inner.lock().await;
        if inner.entities.remove(&id).is_some() {
            info!(entity_type = %self.entity_type, id, "rolled back entity");
        }

        Ok(())
    }

    fn as_id_audit(&self) -> Option<&dyn IdAudit> {
        Some(self)
    }

    fn as_highest_id(&self) -> Option<&dyn GetHighestId> {
        Some(self)
    }

    fn as_max_id(&self) -> Option<&dyn GetMaxId> {
        Some(self)
    }
}

#[async_trait]
impl IdAudit for MemoryDestination {
    async fn unsafe_ids_exist(&self, id_map: &dyn IdMapStore) -> MigrateResult<bool> {
        // The store holds ids beyond what this migration assigned; the next
        // import would collide with them.
        Ok(self.highest_id().await? > id_map.highest_destination_id().await?)
    }

    fn entity_type_id(&self) -> &str {
        &self.entity_type
    }
}

#[async_trait]
impl GetHighestId for MemoryDestination {
    async fn highest_id(&self) -> MigrateResult<i64> {
        let inner = self.inner.lock().await;

        Ok(inner.entities.keys().next_back().copied().unwrap_or(0))
    }
}

#[async_trait]
impl GetMaxId for MemoryDestination {
    async fn max_id(&self, field: &str) -> MigrateResult<i64> {
        let inner = self.inner.lock().await;

        Ok(inner
            .entities
            .values()
            .flat_map(|entity| entity.translations.values())
            .filter_map(|properties| properties.get(field))
            .filter_map(Value::as_i64)
            .max()
            .unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::idmap::{MemoryIdMap, RecordStatus};
    use crate::types::IdFieldDefinition;

    fn row_with_destination(pairs: &[(&str, Value)]) -> Row {
        let mut row = Row::new(
            BTreeMap::from([("id".to_string(), Value::Int(1))]),
            &[IdFieldDefinition::integer("id")],
        )
        .unwrap();
        for (property, value) in pairs {
            row.set_destination_property(property.to_string(), value.clone());
        }
        row
    }

    #[tokio::test]
    async fn sequential_ids_are_allocated() {
        let destination = MemoryDestination::new("node");

        let first = destination
            .import(&row_with_destination(&[("title", Value::from("a"))]))
            .await
            .unwrap();
        let second = destination
            .import(&row_with_destination(&[("title", Value::from("b"))]))
            .await
            .unwrap();

        assert_eq!(first.destination_id, IdTuple::single(1));
        assert_eq!(second.destination_id, IdTuple::single(2));
        assert_eq!(first.rollback_action, RollbackAction::Delete);
    }

    #[tokio::test]
    async fn repeat_import_of_same_id_preserves_on_rollback() {
        let destination = MemoryDestination::new("node").with_key_property("nid");

        let row = row_with_destination(&[("nid", Value::Int(7)), ("title", Value::from("a"))]);
        let first = destination.import(&row).await.unwrap();
        let second = destination.import(&row).await.unwrap();

        assert_eq!(first.rollback_action, RollbackAction::Delete);
        assert_eq!(second.rollback_action, RollbackAction::Preserve);
        assert_eq!(destination.len().await, 1);
    }

    #[tokio::test]
    async fn translations_share_one_entity() {
        let destination = MemoryDestination::new("node")
            .with_key_property("nid")
            .with_language_property("langcode");

        let en = row_with_destination(&[
            ("nid", Value::Int(1)),
            ("langcode", Value::from("en")),
            ("title", Value::from("Cat")),
        ]);
        let fr = row_with_destination(&[
            ("nid", Value::Int(1)),
            ("langcode", Value::from("fr")),
            ("title", Value::from("Chat")),
        ]);

        destination.import(&en).await.unwrap();
        destination.import(&fr).await.unwrap();

        let entity = destination.entity(1).await.unwrap();
        assert_eq!(entity.translations.len(), 2);
        assert_eq!(
            entity.translations["fr"]["title"],
            Value::from("Chat")
        );
    }

    #[tokio::test]
    async fn unsafe_ids_detected_against_id_map() {
        let destination = MemoryDestination::new("node");
        let id_map = MemoryIdMap::new();

        // Nothing live, nothing migrated: safe.
        assert!(!destination.unsafe_ids_exist(&id_map).await.unwrap());

        // A non-migrated record exists beyond the map's range: unsafe.
        destination.seed(10, BTreeMap::new()).await;
        assert!(destination.unsafe_ids_exist(&id_map).await.unwrap());

        // Once the map covers that range, the store is consistent again.
        id_map
            .save_mapping(
                &IdTuple::single(1),
                Some(&IdTuple::single(10)),
                "h",
                RecordStatus::Imported,
                crate::idmap::RollbackAction::Delete,
            )
            .await
            .unwrap();
        assert!(!destination.unsafe_ids_exist(&id_map).await.unwrap());
    }

    #[tokio::test]
    async fn max_id_scans_destination_fields() {
        let destination = MemoryDestination::new("node");
        destination
            .import(&row_with_destination(&[("weight", Value::Int(3))]))
            .await
            .unwrap();
        destination
            .import(&row_with_destination(&[("weight", Value::Int(9))]))
            .await
            .unwrap();

        assert_eq!(destination.max_id("weight").await.unwrap(), 9);
        assert_eq!(destination.max_id("absent").await.unwrap(), 0);
    }
}
