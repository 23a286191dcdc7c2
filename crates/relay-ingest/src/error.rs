//! Ingestion error types.

use thiserror::Error;

/// Ingestion error type.
#[derive(Error, Debug)]
pub enum IngestError {
    /// Payload is not JSON
    #[error("Invalid payload: {0}")]
    InvalidPayload(#[from] serde_json::Error),

    /// Payload is JSON but not an object
    #[error("Payload is not a JSON object")]
    NotAnObject,

    /// Store error
    #[error("Store error: {0}")]
    Store(#[from] relay_ledger::StoreError),

    /// MQTT request could not be queued
    #[error("MQTT client error: {0}")]
    MqttClient(#[from] rumqttc::ClientError),

    /// MQTT connection failed or dropped
    #[error("MQTT connection error: {0}")]
    MqttConnection(#[from] rumqttc::ConnectionError),
}

/// Result type alias using IngestError.
pub type IngestResult<T> = Result<T, IngestError>;
