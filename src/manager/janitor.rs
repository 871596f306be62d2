//! Background sweep task (§4.3.2).
//!
//! Periodic, cancellable, and defensive: a sweep error is logged and never
//! propagated (a single bad sandbox must not stop the janitor from reaping
//! everything else). Grounded in the teacher's `profiling.rs` periodic-flush
//! pattern (a `tokio::spawn` loop cancelled via a stored `JoinHandle`),
//! generalized here to a manager-owned sweep instead of a profile flush.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use super::LocalManager;

/// Spawns the janitor loop. The returned handle is aborted (and awaited) by
/// `LocalManager::stop` before `cleanup_all_sandboxes` runs (§4.3.2).
pub fn spawn(manager: Arc<LocalManager>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick fires immediately; skip it so the janitor's first
        // real sweep happens one full interval after `start`.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            manager.sweep_once().await;
        }
    })
}
