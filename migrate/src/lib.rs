//! An embedded ETL migration engine.
//!
//! Reads rows from a legacy schema, runs each through a configurable pipeline
//! of process plugins, writes the result to a destination store, and tracks
//! per-row mapping state so migrations are idempotent, resumable, and
//! reversible.

pub mod audit;
pub mod concurrency;
pub mod destination;
pub mod error;
pub mod executor;
pub mod idmap;
mod macros;
pub mod message;
pub mod process;
pub mod source;
pub mod types;
