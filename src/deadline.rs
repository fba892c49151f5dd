//! First-to-settle race between an operation and a wall-clock deadline.
//!
//! The operation runs on its own task. If the deadline fires first the task
//! is detached, not aborted: it may still finish its network call, but its
//! output is dropped together with the join handle and never reaches the
//! caller.

use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Outcome of [`run_with_deadline`].
#[derive(Debug, PartialEq, Eq)]
pub enum Settled<T> {
    /// The operation finished before the deadline.
    Completed(T),
    /// The deadline fired first (or the task panicked); the result is discarded.
    Abandoned,
}

/// Spawn `operation` and wait for it or for `limit`, whichever comes first.
pub async fn run_with_deadline<F, T>(limit: Duration, operation: F) -> Settled<T>
where
    F: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    let handle = tokio::spawn(operation);
    tokio::select! {
        joined = handle => match joined {
            Ok(value) => Settled::Completed(value),
            Err(e) => {
                warn!(error = %e, "operation task failed");
                Settled::Abandoned
            }
        },
        _ = tokio::time::sleep(limit) => {
            warn!(timeout_ms = limit.as_millis() as u64, "deadline elapsed, abandoning operation");
            Settled::Abandoned
        }
    }
}
