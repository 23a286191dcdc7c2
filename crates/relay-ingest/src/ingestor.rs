//! Ingestion entry point into the relay store.

use crate::{transform_payload, IngestError, IngestResult};
use relay_ledger::{DeliveryStatus, Record, RelayStore};
use serde_json::Value;
use tracing::debug;

/// Turns raw message payloads into stored records.
#[derive(Clone)]
pub struct Ingestor {
    store: RelayStore,
    producer_tag: String,
}

impl Ingestor {
    pub fn new(store: RelayStore, producer_tag: impl Into<String>) -> Self {
        Self {
            store,
            producer_tag: producer_tag.into(),
        }
    }

    /// Ingest one raw payload stamped with the current time.
    pub fn ingest(&self, payload: &[u8]) -> IngestResult<Record> {
        self.ingest_at(payload, chrono::Utc::now().timestamp())
    }

    /// Ingest one raw payload stamped with `recorded_at`.
    ///
    /// The raw payload goes to the archive, then the record goes to the
    /// ledger (Unacknowledged) and the outbound queue (PendingSend).
    pub fn ingest_at(&self, payload: &[u8], recorded_at: i64) -> IngestResult<Record> {
        let value: Value = serde_json::from_slice(payload)?;
        if !value.is_object() {
            return Err(IngestError::NotAnObject);
        }

        self.store.raw_archive().append(&value)?;

        let record = transform_payload(
            &value,
            DeliveryStatus::Unacknowledged,
            &self.producer_tag,
            recorded_at,
        );
        self.store.ingest(&record)?;

        debug!(
            machine = %record.source_id,
            time = %record.application_time().map(|t| t.to_string()).unwrap_or_default(),
            "Received record"
        );
        Ok(record)
    }
}
