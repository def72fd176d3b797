//! crates/engine/src/prune.rs

use inventory::Dataset;
use logging::targets;

use crate::error::{EngineError, EngineResult};
use crate::signal::CancellationBroadcaster;
use crate::store::SnapshotStore;

/// Destroys `snapshots` on the destination in the given order.
///
/// Stops at the first failure; snapshots after it are left untouched.
/// `signals` is checked before every destroy; a recorded signal ends the
/// pass. Returns the names that were destroyed.
///
/// # Errors
///
/// The first [`SnapshotStore::destroy`] error, or
/// [`EngineError::SignalAbort`] once a signal has been recorded.
pub fn prune<S>(
    store: &S,
    snapshots: &[Dataset],
    signals: &CancellationBroadcaster,
) -> EngineResult<Vec<String>>
where
    S: SnapshotStore + ?Sized,
{
    let mut destroyed = Vec::with_capacity(snapshots.len());
    for snapshot in snapshots {
        if let Some(reason) = signals.triggered() {
            return Err(EngineError::SignalAbort(reason));
        }
        store.destroy(snapshot)?;
        tracing::info!(target: targets::PROGRESS, "pruned {snapshot}");
        destroyed.push(snapshot.name().to_owned());
    }
    Ok(destroyed)
}
