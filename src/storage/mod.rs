//! Storage backends: the in-memory mock store and the `SQLite` backend.
//!
//! Both backends consume the same parsed predicates and expose the same
//! row-level operations; the gateway picks one at construction time.

mod mock;
mod sqlite;

pub use mock::MockStore;
pub use sqlite::SqliteBackend;

use std::sync::{Mutex, MutexGuard};
use std::time::Instant;

/// Acquires a mutex guard, recovering from poisoning.
///
/// A panic while holding the lock poisons it; the protected state is still
/// structurally valid (every mutation completes before the guard drops), so
/// recovery is safe and keeps the store usable afterward.
pub(crate) fn acquire_lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::warn!("storage lock poisoned, recovering");
            poisoned.into_inner()
        },
    }
}

/// Records per-operation counters and latency for a storage call.
pub(crate) fn record_operation_metrics(backend: &'static str, operation: &'static str, start: Instant) {
    metrics::counter!(
        "rowgate_storage_operations_total",
        "backend" => backend,
        "operation" => operation,
    )
    .increment(1);
    metrics::histogram!(
        "rowgate_storage_operation_duration_seconds",
        "backend" => backend,
        "operation" => operation,
    )
    .record(start.elapsed().as_secs_f64());
}
