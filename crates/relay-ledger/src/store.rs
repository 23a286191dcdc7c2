//! Relay store: Ledger, Outbound Queue, and raw archive behind one lock.
//!
//! Every store read and mutation, including each read-modify-write, runs
//! inside a single critical section shared by all three files. A concurrent
//! append can therefore never be lost between a read and the rewrite that
//! follows it, and the sweep's ledger rewrite and re-queue land together.

use crate::{DeliveryStatus, JsonlFile, Record, StoreError, StoreResult, StoredSummary};
use relay_config_and_utils::Paths;
use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

struct StoreFiles {
    incoming: JsonlFile,
    outbound: JsonlFile,
    ledger: JsonlFile,
}

/// Owner of the relay's durable state.
///
/// Cheap to clone; all clones share the same lock.
#[derive(Clone)]
pub struct RelayStore {
    files: Arc<Mutex<StoreFiles>>,
}

/// Entry counts of the three stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StoreStatus {
    pub incoming: usize,
    pub outbound: usize,
    pub ledger: usize,
}

/// New ledger contents plus records to re-queue, produced by a sweep plan.
#[derive(Debug, Clone, Default)]
pub struct LedgerRewrite {
    pub retained: Vec<Record>,
    pub requeue: Vec<Record>,
}

/// What `RelayStore::rewrite_ledger` actually did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RewriteOutcome {
    /// Ledger entries before the rewrite.
    pub scanned: usize,
    /// Ledger entries after the rewrite.
    pub retained: usize,
    /// Records appended to the outbound queue.
    pub requeued: usize,
    /// Re-queue candidates skipped because an identical copy was already queued.
    pub already_queued: usize,
}

impl RelayStore {
    /// Open the stores under the data directory, creating it if needed.
    pub fn open(paths: &Paths) -> StoreResult<Self> {
        std::fs::create_dir_all(paths.data_dir())?;
        Ok(Self::with_files(
            JsonlFile::new(paths.incoming_file()),
            JsonlFile::new(paths.outbound_file()),
            JsonlFile::new(paths.ledger_file()),
        ))
    }

    pub fn with_files(incoming: JsonlFile, outbound: JsonlFile, ledger: JsonlFile) -> Self {
        Self {
            files: Arc::new(Mutex::new(StoreFiles {
                incoming,
                outbound,
                ledger,
            })),
        }
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, StoreFiles>> {
        self.files.lock().map_err(|_| StoreError::LockPoisoned)
    }

    pub fn ledger(&self) -> Ledger {
        Ledger {
            store: self.clone(),
        }
    }

    pub fn outbound_queue(&self) -> OutboundQueue {
        OutboundQueue {
            store: self.clone(),
        }
    }

    pub fn raw_archive(&self) -> RawArchive {
        RawArchive {
            store: self.clone(),
        }
    }

    /// Record a freshly ingested event: Unacknowledged copy in the ledger,
    /// PendingSend copy in the outbound queue.
    pub fn ingest(&self, record: &Record) -> StoreResult<()> {
        let files = self.lock()?;
        files
            .ledger
            .append(&[record.with_status(DeliveryStatus::Unacknowledged)])?;
        files
            .outbound
            .append(&[record.with_status(DeliveryStatus::PendingSend)])?;
        Ok(())
    }

    /// Rewrite the ledger and re-queue records in one critical section.
    ///
    /// `plan` receives the current ledger and decides what stays and what is
    /// re-queued. Re-queue candidates whose PendingSend copy is already
    /// waiting in the outbound queue are not appended again.
    pub fn rewrite_ledger<F>(&self, plan: F) -> StoreResult<RewriteOutcome>
    where
        F: FnOnce(Vec<Record>) -> LedgerRewrite,
    {
        let files = self.lock()?;

        let current: Vec<Record> = files.ledger.read_all()?;
        let scanned = current.len();
        let LedgerRewrite { retained, requeue } = plan(current);

        files.ledger.replace_all(&retained)?;

        let queued: Vec<Record> = files.outbound.read_all()?;
        let candidates = requeue.len();
        let mut fresh: Vec<Record> = Vec::with_capacity(candidates);
        for record in requeue {
            let copy = record.with_status(DeliveryStatus::PendingSend);
            if !queued.contains(&copy) && !fresh.contains(&copy) {
                fresh.push(copy);
            }
        }
        files.outbound.append(&fresh)?;

        let outcome = RewriteOutcome {
            scanned,
            retained: retained.len(),
            requeued: fresh.len(),
            already_queued: candidates - fresh.len(),
        };
        debug!(?outcome, "Ledger rewritten");
        Ok(outcome)
    }

    /// Entry counts of all three stores.
    pub fn status(&self) -> StoreResult<StoreStatus> {
        let files = self.lock()?;
        Ok(StoreStatus {
            incoming: files.incoming.count()?,
            outbound: files.outbound.count()?,
            ledger: files.ledger.count()?,
        })
    }
}

/// Durable record of every event not yet confirmed downstream.
#[derive(Clone)]
pub struct Ledger {
    store: RelayStore,
}

impl Ledger {
    /// Add one record with status Unacknowledged. Duplicates are allowed.
    pub fn append(&self, record: &Record) -> StoreResult<()> {
        let files = self.store.lock()?;
        files
            .ledger
            .append(&[record.with_status(DeliveryStatus::Unacknowledged)])
    }

    /// Every stored record; empty when the store does not exist yet.
    pub fn read_all(&self) -> StoreResult<Vec<Record>> {
        self.store.lock()?.ledger.read_all()
    }

    /// Atomically replace the whole ledger.
    pub fn replace_all(&self, records: &[Record]) -> StoreResult<()> {
        self.store.lock()?.ledger.replace_all(records)
    }

    /// Remove every Unacknowledged record whose identity matches a stored
    /// summary. Returns the number of records removed.
    ///
    /// Records and summaries without an application time never match.
    pub fn reconcile_acknowledged(&self, stored: &[StoredSummary]) -> StoreResult<usize> {
        let acknowledged: Vec<_> = stored.iter().filter_map(StoredSummary::identity).collect();
        if acknowledged.is_empty() {
            return Ok(0);
        }

        let files = self.store.lock()?;
        let current: Vec<Record> = files.ledger.read_all()?;
        let before = current.len();

        let remaining: Vec<Record> = current
            .into_iter()
            .filter(|record| {
                let confirmed = record.delivery_status == DeliveryStatus::Unacknowledged
                    && record
                        .identity()
                        .is_some_and(|identity| acknowledged.contains(&identity));
                !confirmed
            })
            .collect();

        let removed = before - remaining.len();
        if removed > 0 {
            files.ledger.replace_all(&remaining)?;
        }
        Ok(removed)
    }

    pub fn len(&self) -> StoreResult<usize> {
        self.store.lock()?.ledger.count()
    }

    pub fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.len()? == 0)
    }
}

/// Durable staging list for the next batch send.
#[derive(Clone)]
pub struct OutboundQueue {
    store: RelayStore,
}

impl OutboundQueue {
    pub fn enqueue(&self, record: &Record) -> StoreResult<()> {
        self.enqueue_batch(std::slice::from_ref(record))
    }

    /// Append records, each stored with status PendingSend.
    pub fn enqueue_batch(&self, records: &[Record]) -> StoreResult<()> {
        let queued: Vec<Record> = records
            .iter()
            .map(|r| r.with_status(DeliveryStatus::PendingSend))
            .collect();
        self.store.lock()?.outbound.append(&queued)
    }

    /// Read the full queue and clear it in one critical section.
    ///
    /// Concurrent enqueues land entirely before or entirely after the drain.
    pub fn drain_all(&self) -> StoreResult<Vec<Record>> {
        let files = self.store.lock()?;
        let drained: Vec<Record> = files.outbound.read_all()?;
        if !drained.is_empty() {
            files.outbound.clear()?;
        }
        Ok(drained)
    }

    /// Current queue contents without draining.
    pub fn read_all(&self) -> StoreResult<Vec<Record>> {
        self.store.lock()?.outbound.read_all()
    }

    pub fn len(&self) -> StoreResult<usize> {
        self.store.lock()?.outbound.count()
    }

    pub fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.len()? == 0)
    }
}

/// Append-only archive of raw incoming payloads. Nothing in the relay reads
/// it back; it exists for audit.
#[derive(Clone)]
pub struct RawArchive {
    store: RelayStore,
}

impl RawArchive {
    pub fn append(&self, payload: &Value) -> StoreResult<()> {
        self.store
            .lock()?
            .incoming
            .append(std::slice::from_ref(payload))
    }

    pub fn len(&self) -> StoreResult<usize> {
        self.store.lock()?.incoming.count()
    }

    pub fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.len()? == 0)
    }
}
