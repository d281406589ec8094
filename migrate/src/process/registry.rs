use std::collections::BTreeMap;

use migrate_config::ProcessConfig;
use serde::de::DeserializeOwned;

use crate::error::{ErrorKind, MigrateResult};
use crate::migrate_error;
use crate::process::pipeline::ProcessPipeline;
use crate::process::plugin::{
    Concat, DefaultValue, EntityParent, Get, MigrationLookup, SkipOnEmpty, StaticMap,
};
use crate::process::ProcessPlugin;

/// Builds one plugin instance from its flattened configuration bag.
pub type PluginBuilder = Box<
    dyn Fn(&serde_json::Map<String, serde_json::Value>) -> MigrateResult<Box<dyn ProcessPlugin>>
        + Send
        + Sync,
>;

/// Name-indexed process plugin builders.
///
/// Plugins are selected by configuration at runtime; the registry is the
/// single point where a step name becomes executable code. Callers extend it
/// with their own plugins through [`ProcessPluginRegistry::register`].
pub struct ProcessPluginRegistry {
    builders: BTreeMap<String, PluginBuilder>,
}

impl ProcessPluginRegistry {
    /// A registry with no plugins registered.
    pub fn empty() -> Self {
        Self {
            builders: BTreeMap::new(),
        }
    }

    /// A registry carrying the built-in plugin set.
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.register_type::<Get>("get");
        registry.register_type::<DefaultValue>("default_value");
        registry.register_type::<SkipOnEmpty>("skip_on_empty");
        registry.register_type::<StaticMap>("static_map");
        registry.register_type::<Concat>("concat");
        registry.register_type::<MigrationLookup>("migration_lookup");
        registry.register_type::<EntityParent>("entity_parent");
        registry
    }

    /// Registers a custom builder under a name, replacing any previous one.
    pub fn register(&mut self, name: impl Into<String>, builder: PluginBuilder) {
        self.builders.insert(name.into(), builder);
    }

    /// Registers a plugin type whose configuration deserializes directly.
    pub fn register_type<P>(&mut self, name: impl Into<String>)
    where
        P: ProcessPlugin + DeserializeOwned + 'static,
    {
        self.register(
            name,
            Box::new(|configuration| {
                let plugin: P =
                    serde_json::from_value(serde_json::Value::Object(configuration.clone()))
                        .map_err(|error| {
                            migrate_error!(
                                ErrorKind::ConfigError,
                                "Malformed process step configuration",
                                error
                            )
                        })?;
                Ok(Box::new(plugin))
            }),
        );
    }

    /// Builds one plugin instance.
    pub fn build(
        &self,
        name: &str,
        configuration: &serde_json::Map<String, serde_json::Value>,
    ) -> MigrateResult<Box<dyn ProcessPlugin>> {
        let Some(builder) = self.builders.get(name) else {
            return Err(migrate_error!(
                ErrorKind::PluginNotFound,
                "No process plugin registered under this name",
                name
            ));
        };

        builder(configuration)
    }

    /// Builds the full pipeline for one destination property from its
    /// declarative configuration.
    pub fn build_pipeline(
        &self,
        destination_property: &str,
        config: &ProcessConfig,
    ) -> MigrateResult<ProcessPipeline> {
        let mut pipeline = ProcessPipeline::new(destination_property);
        for step in config.steps() {
            let plugin = self.build(&step.plugin, &step.configuration)?;
            pipeline.push(step.plugin.clone(), plugin);
        }

        Ok(pipeline)
    }
}

impl Default for ProcessPluginRegistry {
    fn default() -> Self {
        Self::new()
    }
}
