use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use crate::error::MigrateResult;
use crate::idmap::{
    IdMapEntry, IdMapMessage, IdMapStore, MessageLevel, RecordStatus, RollbackAction,
};
use crate::types::IdTuple;

#[derive(Debug)]
struct Inner {
    /// Entries keyed by the canonical form of the source id tuple.
    entries: BTreeMap<String, IdMapEntry>,
    /// Append-only diagnostics log.
    messages: Vec<IdMapMessage>,
    next_sequence: u64,
}

/// In-memory id map for tests, development, and dry runs.
///
/// All mapping state is kept in memory behind a mutex and is lost on process
/// exit. Semantics match the persistent stores: upserts preserve the entry's
/// creation sequence, aggregate queries return zero on empty data.
#[derive(Debug, Clone)]
pub struct MemoryIdMap {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryIdMap {
    pub fn new() -> Self {
        let inner = Inner {
            entries: BTreeMap::new(),
            messages: Vec::new(),
            next_sequence: 1,
        };

        Self {
            inner: Arc::new(Mutex::new(inner)),
        }
    }

    /// Clears all entries and messages.
    pub async fn clear(&self) {
        let mut inner = self.inner.lock().await;
        inner.entries.clear();
        inner.messages.clear();
        inner.next_sequence = 1;
    }
}

impl Default for MemoryIdMap {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IdMapStore for MemoryIdMap {
    async fn lookup_destination(&self, source_id: &IdTuple) -> MigrateResult<Option<IdTuple>> {
        let inner = self.inner.lock().await;

        Ok(inner
            .entries
            .get(&source_id.storage_key())
            .and_then(|entry| entry.destination_id.clone()))
    }

    async fn lookup_source(&self, destination_id: &IdTuple) -> MigrateResult<Option<IdTuple>> {
        let inner = self.inner.lock().await;

        let mut matches: Vec<&IdMapEntry> = inner
            .entries
            .values()
            .filter(|entry| entry.destination_id.as_ref() == Some(destination_id))
            .collect();
        matches.sort_by_key(|entry| entry.sequence);

        Ok(matches.first().map(|entry| entry.source_id.clone()))
    }

    async fn get(&self, source_id: &IdTuple) -> MigrateResult<Option<IdMapEntry>> {
        let inner = self.inner.lock().await;

        Ok(inner.entries.get(&source_id.storage_key()).cloned())
    }

    async fn save_mapping(
        &self,
        source_id: &IdTuple,
        destination_id: Option<&IdTuple>,
        source_hash: &str,
        status: RecordStatus,
        rollback_action: RollbackAction,
    ) -> MigrateResult<()> {
        let mut inner = self.inner.lock().await;

        let sequence = match inner.entries.get(&source_id.storage_key()) {
            Some(existing) => existing.sequence,
            None => {
                let sequence = inner.next_sequence;
                inner.next_sequence += 1;
                sequence
            }
        };

        inner.entries.insert(
            source_id.storage_key(),
            IdMapEntry {
                source_id: source_id.clone(),
                destination_id: destination_id.cloned(),
                source_hash: source_hash.to_string(),
                status,
                rollback_action,
                sequence,
                last_imported_at: Utc::now(),
            },
        );

        Ok(())
    }

    async fn delete(&self, source_id: &IdTuple) -> MigrateResult<()> {
        let mut inner = self.inner.lock().await;

        inner.entries.remove(&source_id.storage_key());
        let key = source_id.storage_key();
        inner
            .messages
            .retain(|message| message.source_id.storage_key() != key);

        Ok(())
    }

    async fn entries(&self) -> MigrateResult<Vec<IdMapEntry>> {
        let inner = self.inner.lock().await;

        let mut entries: Vec<IdMapEntry> = inner.entries.values().cloned().collect();
        entries.sort_by_key(|entry| entry.sequence);

        Ok(entries)
    }

    async fn current_source_ids(&self) -> MigrateResult<Vec<IdTuple>> {
        let inner = self.inner.lock().await;

        let mut pending: Vec<&IdMapEntry> = inner
            .entries
            .values()
            .filter(|entry| entry.status != RecordStatus::Imported)
            .collect();
        pending.sort_by_key(|entry| entry.sequence);

        Ok(pending.into_iter().map(|entry| entry.source_id.clone()).collect())
    }

    async fn highest_destination_id(&self) -> MigrateResult<i64> {
        let inner = self.inner.lock().await;

        Ok(inner
            .entries
            .values()
            .filter_map(|entry| entry.destination_id.as_ref())
            .filter_map(IdTuple::leading_numeric)
            .max()
            .unwrap_or(0))
    }

    async fn imported_count(&self) -> MigrateResult<u64> {
        let inner = self.inner.lock().await;

        Ok(inner
            .entries
            .values()
            .filter(|entry| entry.status == RecordStatus::Imported)
            .count() as u64)
    }

    async fn processed_count(&self) -> MigrateResult<u64> {
        let inner = self.inner.lock().await;

        Ok(inner.entries.len() as u64)
    }

    async fn save_message(
        &self,
        source_id: &IdTuple,
        message: &str,
        level: MessageLevel,
    ) -> MigrateResult<()> {
        let mut inner = self.inner.lock().await;

        inner.messages.push(IdMapMessage {
            source_id: source_id.clone(),
            message: message.to_string(),
            level,
        });

        Ok(())
    }

    async fn messages(&self, source_id: &IdTuple) -> MigrateResult<Vec<IdMapMessage>> {
        let inner = self.inner.lock().await;

        let key = source_id.storage_key();
        Ok(inner
            .messages
            .iter()
            .filter(|message| message.source_id.storage_key() == key)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Value;

    fn id(n: i64) -> IdTuple {
        IdTuple::single(n)
    }

    #[tokio::test]
    async fn upsert_preserves_sequence() {
        let map = MemoryIdMap::new();

        map.save_mapping(&id(1), Some(&id(10)), "h1", RecordStatus::Imported, RollbackAction::Delete)
            .await
            .unwrap();
        map.save_mapping(&id(2), Some(&id(20)), "h2", RecordStatus::Imported, RollbackAction::Delete)
            .await
            .unwrap();
        map.save_mapping(&id(1), Some(&id(11)), "h1b", RecordStatus::NeedsUpdate, RollbackAction::Delete)
            .await
            .unwrap();

        let entries = map.entries().await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].source_id, id(1));
        assert_eq!(entries[0].destination_id, Some(id(11)));
        assert_eq!(entries[0].sequence, 1);
        assert_eq!(entries[1].sequence, 2);
    }

    #[tokio::test]
    async fn inverse_lookup_returns_earliest_mapping() {
        let map = MemoryIdMap::new();

        // Two source rows legitimately mapping to one destination entity.
        let en = IdTuple::new(vec![Value::Int(1), Value::from("en")]);
        let fr = IdTuple::new(vec![Value::Int(2), Value::from("fr")]);
        map.save_mapping(&en, Some(&id(1)), "h", RecordStatus::Imported, RollbackAction::Delete)
            .await
            .unwrap();
        map.save_mapping(&fr, Some(&id(1)), "h", RecordStatus::Imported, RollbackAction::Delete)
            .await
            .unwrap();

        assert_eq!(map.lookup_source(&id(1)).await.unwrap(), Some(en));
    }

    #[tokio::test]
    async fn aggregates_return_zero_on_empty_map() {
        let map = MemoryIdMap::new();

        assert_eq!(map.highest_destination_id().await.unwrap(), 0);
        assert_eq!(map.imported_count().await.unwrap(), 0);
        assert_eq!(map.processed_count().await.unwrap(), 0);
        assert!(map.current_source_ids().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn current_source_ids_excludes_imported() {
        let map = MemoryIdMap::new();

        map.save_mapping(&id(1), Some(&id(1)), "h", RecordStatus::Imported, RollbackAction::Delete)
            .await
            .unwrap();
        map.save_mapping(&id(2), None, "h", RecordStatus::Failed, RollbackAction::Delete)
            .await
            .unwrap();
        map.save_mapping(&id(3), None, "h", RecordStatus::Ignored, RollbackAction::Delete)
            .await
            .unwrap();

        assert_eq!(map.current_source_ids().await.unwrap(), vec![id(2), id(3)]);
    }

    #[tokio::test]
    async fn delete_removes_entry_and_messages() {
        let map = MemoryIdMap::new();

        map.save_mapping(&id(1), None, "h", RecordStatus::Failed, RollbackAction::Delete)
            .await
            .unwrap();
        map.save_message(&id(1), "boom", MessageLevel::Error).await.unwrap();
        assert_eq!(map.messages(&id(1)).await.unwrap().len(), 1);

        map.delete(&id(1)).await.unwrap();
        assert!(map.get(&id(1)).await.unwrap().is_none());
        assert!(map.messages(&id(1)).await.unwrap().is_empty());
    }
}
