//! Core configuration, paths, and logging for the telemetry relay.

mod config;
mod error;
mod logging;
mod paths;

pub use config::{
    Config, DEFAULT_INGEST_URL, DEFAULT_LOG_LEVEL, DEFAULT_MQTT_TOPIC, DEFAULT_PRODUCER_TAG,
};
pub use error::{CoreError, CoreResult};
pub use logging::{init_logging, parse_level};
pub use paths::Paths;
