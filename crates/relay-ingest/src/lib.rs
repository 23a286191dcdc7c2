//! Ingestion side of the telemetry relay.
//!
//! This crate provides:
//! - transform_payload: pure mapping from a raw sensor payload to a Record
//! - Ingestor: archives the raw payload and writes the record to ledger and queue
//! - MqttListener: subscribes to the sensor topic and feeds the Ingestor

mod error;
mod ingestor;
mod mqtt;
mod transform;

pub use error::{IngestError, IngestResult};
pub use ingestor::Ingestor;
pub use mqtt::{MqttListener, MqttListenerConfig};
pub use transform::transform_payload;
