use async_trait::async_trait;
use serde::Deserialize;
use tracing::trace;

use crate::error::MigrateResult;
use crate::process::{ProcessContext, ProcessOutcome, ProcessPlugin};
use crate::types::{IdTuple, Value};

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum MigrationSpec {
    One(String),
    Many(Vec<String>),
}

impl MigrationSpec {
    fn names(&self) -> Vec<&str> {
        match self {
            MigrationSpec::One(name) => vec![name.as_str()],
            MigrationSpec::Many(names) => names.iter().map(String::as_str).collect(),
        }
    }
}

/// Translates a foreign source id through the id map of a prior migration.
///
/// The named migrations are consulted in order; the first mapping found wins.
/// An unmapped (or null) value stops the pipeline with null, so a dangling
/// foreign key degrades to an absent destination property instead of failing
/// the row.
#[derive(Debug, Clone, Deserialize)]
pub struct MigrationLookup {
    migration: MigrationSpec,
}

impl MigrationLookup {
    pub fn new(migration: impl Into<String>) -> Self {
        Self {
            migration: MigrationSpec::One(migration.into()),
        }
    }

    fn source_tuple(value: &Value) -> IdTuple {
        match value {
            Value::List(components) => IdTuple::new(components.clone()),
            other => IdTuple::new(vec![other.clone()]),
        }
    }

    fn tuple_value(tuple: IdTuple) -> Value {
        let mut components = tuple.values().to_vec();
        if components.len() == 1 {
            components.pop().expect("just checked length is 1")
        } else {
            Value::List(components)
        }
    }

    async fn lookup(
        &self,
        value: &Value,
        context: &ProcessContext<'_>,
    ) -> MigrateResult<Option<IdTuple>> {
        let source_id = Self::source_tuple(value);
        for name in self.migration.names() {
            if let Some(found) = context.id_maps.lookup_in(name, &source_id).await? {
                trace!(migration = name, source_id = %source_id, "foreign id resolved");
                return Ok(Some(found));
            }
        }

        Ok(None)
    }
}

#[async_trait]
impl ProcessPlugin for MigrationLookup {
    async fn transform(
        &self,
        value: Value,
        context: &ProcessContext<'_>,
        _destination_property: &str,
    ) -> MigrateResult<ProcessOutcome> {
        if value.is_null() {
            return Ok(ProcessOutcome::Stop(Value::Null));
        }

        match self.lookup(&value, context).await? {
            Some(found) => Ok(ProcessOutcome::Continue(Self::tuple_value(found))),
            None => Ok(ProcessOutcome::Stop(Value::Null)),
        }
    }
}

/// Looks up the parent of an entity.
///
/// Like [`MigrationLookup`], but a numeric zero bypasses the lookup entirely
/// and becomes the configured `none` sentinel — legacy schemas use zero for
/// "no parent", which never has a mapping.
#[derive(Debug, Clone, Deserialize)]
pub struct EntityParent {
    #[serde(flatten)]
    lookup: MigrationLookup,
    none: serde_json::Value,
}

impl EntityParent {
    pub fn new(migration: impl Into<String>, none: impl Into<serde_json::Value>) -> Self {
        Self {
            lookup: MigrationLookup::new(migration),
            none: none.into(),
        }
    }
}

#[async_trait]
impl ProcessPlugin for EntityParent {
    async fn transform(
        &self,
        value: Value,
        context: &ProcessContext<'_>,
        destination_property: &str,
    ) -> MigrateResult<ProcessOutcome> {
        if value.as_i64() == Some(0) {
            return Ok(ProcessOutcome::Continue(self.none.clone().into()));
        }

        self.lookup
            .transform(value, context, destination_property)
            .await
    }
}
