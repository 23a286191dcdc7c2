//! Retry/prune sweeper.

use crate::{unix_now, OutboxResult};
use relay_ledger::{DeliveryStatus, LedgerRewrite, Record, RelayStore};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Summary of one sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SweepReport {
    pub scanned: usize,
    pub retained: usize,
    pub requeued: usize,
    /// Re-queue candidates already waiting in the outbound queue.
    pub already_queued: usize,
    pub pruned: usize,
}

/// Split the ledger into records to keep, to re-queue, and to prune.
///
/// - Unacknowledged and younger than `stale_after`: kept and re-queued.
/// - Unacknowledged and at least `stale_after` old: pruned.
/// - Any other status: kept, not re-queued.
pub fn plan_sweep(
    records: Vec<Record>,
    now: i64,
    stale_after: Duration,
) -> (LedgerRewrite, Vec<Record>) {
    let mut rewrite = LedgerRewrite::default();
    let mut pruned = Vec::new();

    for record in records {
        match record.delivery_status {
            DeliveryStatus::Unacknowledged if record.is_stale(now, stale_after) => {
                pruned.push(record);
            }
            DeliveryStatus::Unacknowledged => {
                rewrite.requeue.push(record.clone());
                rewrite.retained.push(record);
            }
            _ => rewrite.retained.push(record),
        }
    }

    (rewrite, pruned)
}

/// Periodically re-feeds unacknowledged ledger records into the outbound
/// queue and discards stale ones.
#[derive(Clone)]
pub struct RetrySweeper {
    store: RelayStore,
    sweep_interval: Duration,
    stale_after: Duration,
}

impl RetrySweeper {
    pub fn new(store: RelayStore, sweep_interval: Duration, stale_after: Duration) -> Self {
        Self {
            store,
            sweep_interval,
            stale_after,
        }
    }

    /// Sweep the ledger as of `now` (seconds since the epoch).
    pub fn sweep_at(&self, now: i64) -> OutboxResult<SweepReport> {
        let stale_after = self.stale_after;
        let mut pruned = Vec::new();

        let outcome = self.store.rewrite_ledger(|records| {
            let (rewrite, stale) = plan_sweep(records, now, stale_after);
            pruned = stale;
            rewrite
        })?;

        for record in &pruned {
            warn!(
                machine = %record.source_id,
                time = %record.application_time().map(|t| t.to_string()).unwrap_or_default(),
                age_secs = record.age_secs(now),
                "Pruned stale unacknowledged record"
            );
        }

        let report = SweepReport {
            scanned: outcome.scanned,
            retained: outcome.retained,
            requeued: outcome.requeued,
            already_queued: outcome.already_queued,
            pruned: pruned.len(),
        };

        if report.requeued > 0 || report.pruned > 0 {
            info!(
                scanned = report.scanned,
                requeued = report.requeued,
                already_queued = report.already_queued,
                pruned = report.pruned,
                "Sweep complete"
            );
        }

        Ok(report)
    }

    pub fn sweep_once(&self) -> OutboxResult<SweepReport> {
        self.sweep_at(unix_now())
    }

    /// `sweep_once` on the blocking pool.
    pub async fn sweep(&self) -> OutboxResult<SweepReport> {
        let sweeper = self.clone();
        tokio::task::spawn_blocking(move || sweeper.sweep_once()).await?
    }

    /// Sleep, sweep, repeat until `cancel` fires.
    pub async fn run(&self, cancel: CancellationToken) {
        info!(
            interval_secs = self.sweep_interval.as_secs(),
            stale_after_secs = self.stale_after.as_secs(),
            "Sweeper started"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.sweep_interval) => {}
            }

            if let Err(e) = self.sweep().await {
                error!(error = %e, "Sweep failed");
            }
        }

        info!("Sweeper stopped");
    }
}
