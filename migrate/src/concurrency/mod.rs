//! Coordination primitives for migration runs.

mod signal;

pub use signal::{create_stop_channel, stop_requested, StopRx, StopTx};
