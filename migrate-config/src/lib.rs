//! Shared configuration types for the row migration engine.
//!
//! The declarative migration definition (source plugin, per-property process
//! pipelines, destination plugin, dependencies) is consumed, not produced, by
//! the core engine. Nothing in this crate reads files; loading definitions
//! from disk is the caller's concern.

mod connection;
mod migration;

pub use connection::PgConnectionConfig;
pub use migration::{
    MigrationConfig, PluginConfig, ProcessConfig, ProcessStepConfig, ValidationError,
};
