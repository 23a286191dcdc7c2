//! Durable record storage for the telemetry relay.
//!
//! This crate provides:
//! - Record: one telemetry event with identity, values, and delivery status
//! - RelayStore: owner of the three JSONL stores behind a single lock
//! - Ledger: source of truth for records not yet confirmed downstream
//! - OutboundQueue: staging list drained by each batch send
//! - RawArchive: append-only audit trail of raw incoming payloads

mod error;
mod jsonl;
mod record;
mod store;

pub use error::{StoreError, StoreResult};
pub use jsonl::JsonlFile;
pub use record::{
    ApplicationTime, DeliveryStatus, NamedValue, Record, RecordIdentity, StoredSummary,
    TIME_VALUE_NAME,
};
pub use store::{
    Ledger, LedgerRewrite, OutboundQueue, RawArchive, RelayStore, RewriteOutcome, StoreStatus,
};
