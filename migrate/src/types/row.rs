use std::collections::BTreeMap;

use sha2::{Digest, Sha256};

use crate::error::{ErrorKind, MigrateResult};
use crate::idmap::IdMapEntry;
use crate::migrate_error;
use crate::types::identity::{IdFieldDefinition, IdTuple};
use crate::types::value::Value;

/// The unit of work flowing through the migration pipeline.
///
/// A row carries two independent property bags: the source bag, set by the
/// source plugin and frozen before pipeline execution, and the destination
/// bag, written incrementally as each destination property's pipeline runs.
/// Destination writes are last-write-wins per property.
#[derive(Debug, Clone)]
pub struct Row {
    source: BTreeMap<String, Value>,
    destination: BTreeMap<String, Value>,
    source_id: IdTuple,
    source_frozen: bool,
    hash: Option<String>,
    id_map_entry: Option<IdMapEntry>,
}

impl Row {
    /// Builds a row from raw source values, extracting the id tuple from the
    /// declared id fields.
    ///
    /// Every declared id field must be present in the source values; a source
    /// emitting rows without their own identity is misconfigured.
    pub fn new(
        source: BTreeMap<String, Value>,
        id_fields: &[IdFieldDefinition],
    ) -> MigrateResult<Self> {
        let mut id_values = Vec::with_capacity(id_fields.len());
        for field in id_fields {
            let value = source.get(&field.name).ok_or_else(|| {
                migrate_error!(
                    ErrorKind::ConfigError,
                    "Source row is missing a declared id field",
                    field.name.clone()
                )
            })?;
            id_values.push(value.clone());
        }

        Ok(Self {
            source,
            destination: BTreeMap::new(),
            source_id: IdTuple::new(id_values),
            source_frozen: false,
            hash: None,
            id_map_entry: None,
        })
    }

    /// The source id tuple extracted at construction.
    ///
    /// Note that `prepare_row` enrichment may rewrite id-field *properties*
    /// (translation-set collapsing does), but the identity captured here is
    /// the one the id map is keyed by.
    pub fn source_id(&self) -> &IdTuple {
        &self.source_id
    }

    /// Reads a source property.
    pub fn get_source(&self, property: &str) -> Option<&Value> {
        self.source.get(property)
    }

    /// Writes a source property during per-row enrichment.
    ///
    /// Fails once the source bag has been frozen; process plugins must not
    /// mutate source data.
    pub fn set_source_property(
        &mut self,
        property: impl Into<String>,
        value: impl Into<Value>,
    ) -> MigrateResult<()> {
        if self.source_frozen {
            return Err(migrate_error!(
                ErrorKind::InvalidState,
                "Source properties cannot be modified after the row is frozen"
            ));
        }
        self.source.insert(property.into(), value.into());
        Ok(())
    }

    /// Freezes the source bag and computes the content hash.
    ///
    /// Called by the executor after `prepare_row` enrichment, before the id
    /// map is consulted.
    pub fn freeze_source(&mut self) {
        self.source_frozen = true;
        self.hash = Some(hash_properties(&self.source));
    }

    pub fn is_frozen(&self) -> bool {
        self.source_frozen
    }

    /// Content fingerprint of the frozen source bag, if computed.
    pub fn hash(&self) -> Option<&str> {
        self.hash.as_deref()
    }

    /// Writes a destination property. Last write wins.
    pub fn set_destination_property(&mut self, property: impl Into<String>, value: Value) {
        self.destination.insert(property.into(), value);
    }

    /// Reads a destination property.
    pub fn get_destination(&self, property: &str) -> Option<&Value> {
        self.destination.get(property)
    }

    /// The full destination bag, for the destination collaborator.
    pub fn destination(&self) -> &BTreeMap<String, Value> {
        &self.destination
    }

    /// Unified pipeline getter: a `@`-prefixed key reads an already-computed
    /// destination property, anything else reads the source bag.
    pub fn get(&self, key: &str) -> Option<&Value> {
        match key.strip_prefix('@') {
            Some(destination_property) => self.destination.get(destination_property),
            None => self.source.get(key),
        }
    }

    /// Attaches prior mapping state found for this row's source id.
    pub fn set_id_map_entry(&mut self, entry: IdMapEntry) {
        self.id_map_entry = Some(entry);
    }

    /// Prior mapping state, present on re-runs.
    pub fn id_map_entry(&self) -> Option<&IdMapEntry> {
        self.id_map_entry.as_ref()
    }

    /// Returns true when no prior imported-and-unchanged mapping exists, i.e.
    /// the row must run through the pipeline.
    pub fn needs_processing(&self) -> bool {
        use crate::idmap::RecordStatus;

        match &self.id_map_entry {
            None => true,
            Some(entry) => {
                entry.status != RecordStatus::Imported
                    || self.hash.as_deref() != Some(entry.source_hash.as_str())
            }
        }
    }
}

/// SHA-256 over the canonical JSON serialization of a property bag.
///
/// The bag is an ordered map, so equal contents always produce equal digests
/// across runs and processes.
fn hash_properties(properties: &BTreeMap<String, Value>) -> String {
    let serialized = serde_json::to_vec(properties).unwrap_or_default();
    let digest = Sha256::digest(&serialized);
    digest.iter().map(|byte| format!("{byte:02x}")).collect()
}
