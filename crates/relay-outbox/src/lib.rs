//! Durable delivery of ledger records to the ingest endpoint.
//!
//! This crate provides:
//! - IngestClient: single-request HTTP POST of a drained batch
//! - BatchSender: periodic drain, transmit, and reconcile against the ledger
//! - RetrySweeper: periodic re-queue of unacknowledged records and pruning of stale ones
//! - RelayPipeline: spawns the sender and sweeper as independent tasks

mod client;
mod error;
mod pipeline;
mod sender;
mod sweeper;

pub use client::{IngestClient, PostOutcome};
pub use error::{OutboxError, OutboxResult};
pub use pipeline::{PipelineHandles, RelayPipeline};
pub use sender::{BatchSender, CycleOutcome};
pub use sweeper::{plan_sweep, RetrySweeper, SweepReport};

/// Current time in whole seconds since the Unix epoch.
pub fn unix_now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Run a store operation on the blocking pool.
///
/// Store calls take the store lock and fsync, so they stay off the async workers.
pub(crate) async fn with_store<T, F>(store: &relay_ledger::RelayStore, op: F) -> OutboxResult<T>
where
    F: FnOnce(relay_ledger::RelayStore) -> relay_ledger::StoreResult<T> + Send + 'static,
    T: Send + 'static,
{
    let store = store.clone();
    Ok(tokio::task::spawn_blocking(move || op(store)).await??)
}
