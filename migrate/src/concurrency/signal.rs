//! Cooperative stop signaling for migration runs.
//!
//! A run checks the signal between rows only; a row's pipeline, once started,
//! always reaches a terminal outcome before a stop takes effect.

use tokio::sync::watch;

/// Transmitter half of a stop signal.
///
/// Cloneable; any holder can request a stop by sending `true`.
pub type StopTx = watch::Sender<bool>;

/// Receiver half of a stop signal.
pub type StopRx = watch::Receiver<bool>;

/// Creates a stop channel in the "running" state.
pub fn create_stop_channel() -> (StopTx, StopRx) {
    watch::channel(false)
}

/// Returns whether a stop has been requested.
pub fn stop_requested(rx: &StopRx) -> bool {
    *rx.borrow()
}
