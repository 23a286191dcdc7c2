//! Configuration management for the relay.

use crate::{CoreError, CoreResult, Paths};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

/// Default ingestion endpoint.
pub const DEFAULT_INGEST_URL: &str = "https://apis.therefor.in/api/ingest-sensor-data-V2";

/// Default MQTT topic filter carrying sensor payloads.
pub const DEFAULT_MQTT_TOPIC: &str = "Test15X_/sensorData";

/// Default tag written into every record's `consolidatorId`.
pub const DEFAULT_PRODUCER_TAG: &str = "string";

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Main relay configuration.
///
/// Every field has a default so a partial `config.json` is valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
    /// Remote endpoint receiving batched records.
    pub ingest_url: String,
    /// Timeout for a single batch POST.
    pub request_timeout_secs: u64,
    /// Sleep between Batch Sender cycles.
    pub batch_interval_secs: u64,
    /// Sleep between Sweeper cycles.
    pub sweep_interval_secs: u64,
    /// Age after which an unacknowledged record is pruned.
    pub stale_after_secs: u64,
    /// MQTT broker host.
    pub mqtt_host: String,
    /// MQTT broker port.
    pub mqtt_port: u16,
    /// MQTT topic filter to subscribe to.
    pub mqtt_topic: String,
    /// Identifies this relay instance in every record.
    pub producer_tag: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            ingest_url: DEFAULT_INGEST_URL.to_string(),
            request_timeout_secs: 60,
            batch_interval_secs: 60,
            sweep_interval_secs: 60,
            stale_after_secs: 3600,
            mqtt_host: "localhost".to_string(),
            mqtt_port: 1883,
            mqtt_topic: DEFAULT_MQTT_TOPIC.to_string(),
            producer_tag: DEFAULT_PRODUCER_TAG.to_string(),
        }
    }
}

impl Config {
    /// Load configuration from the config file (if any), then apply `RELAY_*`
    /// environment overrides and validate.
    pub fn load(paths: &Paths) -> CoreResult<Self> {
        let config_path = paths.config_file();

        let mut config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            Self::default()
        };

        config.apply_overrides(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to the config file.
    pub fn save(&self, paths: &Paths) -> CoreResult<()> {
        paths.ensure_dirs()?;
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(paths.config_file(), content)?;
        Ok(())
    }

    /// Override fields from variables resolved by `lookup`.
    ///
    /// Blank values are ignored; values that fail to parse are an error.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> CoreResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(name)
                .map(|raw| raw.trim().to_string())
                .filter(|raw| !raw.is_empty())
        };

        if let Some(value) = get("RELAY_LOG_LEVEL") {
            self.log_level = value;
        }
        if let Some(value) = get("RELAY_INGEST_URL") {
            self.ingest_url = value;
        }
        if let Some(value) = get("RELAY_REQUEST_TIMEOUT_SECS") {
            self.request_timeout_secs = parse_env("RELAY_REQUEST_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = get("RELAY_BATCH_INTERVAL_SECS") {
            self.batch_interval_secs = parse_env("RELAY_BATCH_INTERVAL_SECS", &value)?;
        }
        if let Some(value) = get("RELAY_SWEEP_INTERVAL_SECS") {
            self.sweep_interval_secs = parse_env("RELAY_SWEEP_INTERVAL_SECS", &value)?;
        }
        if let Some(value) = get("RELAY_STALE_AFTER_SECS") {
            self.stale_after_secs = parse_env("RELAY_STALE_AFTER_SECS", &value)?;
        }
        if let Some(value) = get("RELAY_MQTT_HOST") {
            self.mqtt_host = value;
        }
        if let Some(value) = get("RELAY_MQTT_PORT") {
            self.mqtt_port = parse_env("RELAY_MQTT_PORT", &value)?;
        }
        if let Some(value) = get("RELAY_MQTT_TOPIC") {
            self.mqtt_topic = value;
        }
        if let Some(value) = get("RELAY_PRODUCER_TAG") {
            self.producer_tag = value;
        }

        Ok(())
    }

    /// Reject configurations the relay cannot run with.
    pub fn validate(&self) -> CoreResult<()> {
        self.ingest_url()?;

        for (name, value) in [
            ("request_timeout_secs", self.request_timeout_secs),
            ("batch_interval_secs", self.batch_interval_secs),
            ("sweep_interval_secs", self.sweep_interval_secs),
            ("stale_after_secs", self.stale_after_secs),
        ] {
            if value == 0 {
                return Err(CoreError::Config(format!("{name} must be greater than zero")));
            }
        }

        if self.mqtt_topic.trim().is_empty() {
            return Err(CoreError::Config("mqtt_topic must not be empty".to_string()));
        }

        Ok(())
    }

    /// Get the ingest URL as a parsed URL.
    pub fn ingest_url(&self) -> CoreResult<Url> {
        Url::parse(&self.ingest_url).map_err(CoreError::from)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn batch_interval(&self) -> Duration {
        Duration::from_secs(self.batch_interval_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs)
    }
}

fn parse_env<T: FromStr>(name: &str, raw: &str) -> CoreResult<T> {
    raw.parse::<T>()
        .map_err(|_| CoreError::Config(format!("{name} has invalid value '{raw}'")))
}
