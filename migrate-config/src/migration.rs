use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised when validating configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("migration id must not be empty")]
    EmptyMigrationId,
    #[error("source plugin name must not be empty")]
    EmptySourcePlugin,
    #[error("destination plugin name must not be empty")]
    EmptyDestinationPlugin,
    #[error("process pipeline for '{0}' contains a step with an empty plugin name")]
    EmptyProcessPlugin(String),
    #[error("migration '{0}' lists itself as a dependency")]
    SelfDependency(String),
    #[error("connection host must not be empty")]
    EmptyConnectionHost,
    #[error("connection port must be non-zero")]
    ZeroConnectionPort,
}

/// A plugin selection: a name plus an opaque bag of static configuration.
///
/// The flattened bag is handed verbatim to the plugin's builder; each plugin
/// decides which keys it understands.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginConfig {
    pub plugin: String,
    #[serde(flatten)]
    pub configuration: serde_json::Map<String, serde_json::Value>,
}

impl PluginConfig {
    pub fn new(plugin: impl Into<String>) -> Self {
        Self {
            plugin: plugin.into(),
            configuration: serde_json::Map::new(),
        }
    }

    /// Adds one configuration key.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.configuration.insert(key.into(), value.into());
        self
    }
}

/// One configured step of a process pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessStepConfig {
    pub plugin: String,
    #[serde(flatten)]
    pub configuration: serde_json::Map<String, serde_json::Value>,
}

impl ProcessStepConfig {
    pub fn new(plugin: impl Into<String>) -> Self {
        Self {
            plugin: plugin.into(),
            configuration: serde_json::Map::new(),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.configuration.insert(key.into(), value.into());
        self
    }
}

/// The process pipeline configured for one destination property.
///
/// Deserializes from three declarative shapes:
/// - shorthand: `title: title` — copy one source property (an implicit `get`);
/// - a single step mapping;
/// - a list of step mappings, executed in order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProcessConfig {
    Shorthand(String),
    Single(ProcessStepConfig),
    Steps(Vec<ProcessStepConfig>),
}

impl ProcessConfig {
    /// Normalizes any declarative shape into the ordered step list.
    pub fn steps(&self) -> Vec<ProcessStepConfig> {
        match self {
            ProcessConfig::Shorthand(source) => {
                vec![ProcessStepConfig::new("get").with("source", source.clone())]
            }
            ProcessConfig::Single(step) => vec![step.clone()],
            ProcessConfig::Steps(steps) => steps.clone(),
        }
    }
}

/// A complete declarative migration definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationConfig {
    /// Unique identifier of the migration; also partitions id map state.
    pub id: String,
    /// Source plugin selection and parameters.
    pub source: PluginConfig,
    /// Per-destination-property process pipelines.
    #[serde(default)]
    pub process: BTreeMap<String, ProcessConfig>,
    /// Destination plugin selection and parameters.
    pub destination: PluginConfig,
    /// Migrations that must have fully completed before this one runs.
    /// Topological run ordering is the caller's responsibility.
    #[serde(default)]
    pub migration_dependencies: Vec<String>,
}

impl MigrationConfig {
    /// Validates the definition's structural invariants.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.id.is_empty() {
            return Err(ValidationError::EmptyMigrationId);
        }

        if self.source.plugin.is_empty() {
            return Err(ValidationError::EmptySourcePlugin);
        }

        if self.destination.plugin.is_empty() {
            return Err(ValidationError::EmptyDestinationPlugin);
        }

        for (property, pipeline) in &self.process {
            if pipeline.steps().iter().any(|step| step.plugin.is_empty()) {
                return Err(ValidationError::EmptyProcessPlugin(property.clone()));
            }
        }

        if self.migration_dependencies.contains(&self.id) {
            return Err(ValidationError::SelfDependency(self.id.clone()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shorthand_normalizes_to_get_step() {
        let config: ProcessConfig = serde_json::from_value(serde_json::json!("title")).unwrap();

        let steps = config.steps();
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].plugin, "get");
        assert_eq!(
            steps[0].configuration.get("source"),
            Some(&serde_json::json!("title"))
        );
    }

    #[test]
    fn step_list_deserializes_in_order() {
        let config: ProcessConfig = serde_json::from_value(serde_json::json!([
            { "plugin": "get", "source": "uid" },
            { "plugin": "migration_lookup", "migration": "users" },
        ]))
        .unwrap();

        let steps = config.steps();
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].plugin, "get");
        assert_eq!(steps[1].plugin, "migration_lookup");
    }

    #[test]
    fn full_definition_deserializes() {
        let config: MigrationConfig = serde_json::from_value(serde_json::json!({
            "id": "legacy_nodes",
            "source": { "plugin": "table", "table": "node" },
            "process": {
                "title": "title",
                "uid": [
                    { "plugin": "get", "source": "node_uid" },
                    { "plugin": "migration_lookup", "migration": "legacy_users" },
                ],
            },
            "destination": { "plugin": "memory", "entity_type": "node" },
            "migration_dependencies": ["legacy_users"],
        }))
        .unwrap();

        assert!(config.validate().is_ok());
        assert_eq!(config.process.len(), 2);
        assert_eq!(config.migration_dependencies, vec!["legacy_users"]);
    }

    #[test]
    fn self_dependency_is_rejected() {
        let mut config = MigrationConfig {
            id: "a".to_string(),
            source: PluginConfig::new("table"),
            process: BTreeMap::new(),
            destination: PluginConfig::new("memory"),
            migration_dependencies: vec![],
        };
        assert!(config.validate().is_ok());

        config.migration_dependencies.push("a".to_string());
        assert_eq!(config.validate(), Err(ValidationError::SelfDependency("a".to_string())));
    }
}
