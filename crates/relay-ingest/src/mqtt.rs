//! MQTT subscription feeding the ingestor.

use crate::{IngestResult, Ingestor};
use relay_config_and_utils::Config;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

const RECONNECT_DELAY: Duration = Duration::from_secs(5);
const KEEP_ALIVE: Duration = Duration::from_secs(30);

/// Connection settings for the MQTT listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MqttListenerConfig {
    pub host: String,
    pub port: u16,
    pub topic: String,
    pub client_id: String,
    /// Wait between a dropped connection and the next attempt.
    pub retry_delay: Duration,
}

impl From<&Config> for MqttListenerConfig {
    fn from(config: &Config) -> Self {
        Self {
            host: config.mqtt_host.clone(),
            port: config.mqtt_port,
            topic: config.mqtt_topic.clone(),
            client_id: format!("telemetry-relay-{}", std::process::id()),
            retry_delay: RECONNECT_DELAY,
        }
    }
}

/// Subscribes to the sensor topic and hands every message to the [`Ingestor`].
pub struct MqttListener {
    config: MqttListenerConfig,
    ingestor: Ingestor,
}

impl MqttListener {
    pub fn new(config: MqttListenerConfig, ingestor: Ingestor) -> Self {
        Self { config, ingestor }
    }

    pub fn config(&self) -> &MqttListenerConfig {
        &self.config
    }

    /// Listen until `cancel` fires, reconnecting after every connection error.
    #[instrument(
        name = "mqtt_listener",
        skip_all,
        fields(host = %self.config.host, port = self.config.port, topic = %self.config.topic)
    )]
    pub async fn run(&self, cancel: CancellationToken) {
        info!("Starting MQTT listener");

        loop {
            if cancel.is_cancelled() {
                break;
            }

            match self.run_connection(&cancel).await {
                Ok(()) => break,
                Err(e) => {
                    error!(error = %e, "MQTT connection error");
                    warn!(
                        retry_in_secs = self.config.retry_delay.as_secs(),
                        "Reconnecting to MQTT broker"
                    );

                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(self.config.retry_delay) => {}
                    }
                }
            }
        }

        info!("MQTT listener stopped");
    }

    /// One connection session. Returns `Ok(())` only on cancellation.
    async fn run_connection(&self, cancel: &CancellationToken) -> IngestResult<()> {
        let mut options = MqttOptions::new(
            self.config.client_id.as_str(),
            self.config.host.as_str(),
            self.config.port,
        );
        options.set_keep_alive(KEEP_ALIVE);
        options.set_clean_session(true);

        let (client, mut eventloop) = AsyncClient::new(options, 100);
        client
            .subscribe(self.config.topic.as_str(), QoS::AtLeastOnce)
            .await?;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    let _ = client.disconnect().await;
                    return Ok(());
                }
                event = eventloop.poll() => match event? {
                    Event::Incoming(Packet::Publish(publish)) => {
                        self.handle_publish(&publish.topic, &publish.payload).await;
                    }
                    Event::Incoming(Packet::ConnAck(_)) => {
                        info!("Connected to MQTT broker");
                    }
                    Event::Incoming(Packet::SubAck(_)) => {
                        info!("Subscription acknowledged");
                    }
                    _ => {}
                },
            }
        }
    }

    /// Ingest one message on the blocking pool. Failures are logged and the
    /// message is dropped.
    pub(crate) async fn handle_publish(&self, topic: &str, payload: &[u8]) {
        let ingestor = self.ingestor.clone();
        let bytes = payload.to_vec();
        let result = tokio::task::spawn_blocking(move || ingestor.ingest(&bytes)).await;

        match result {
            Ok(Ok(record)) => debug!(
                topic = %topic,
                machine = %record.source_id,
                values = record.values.len(),
                "Ingested MQTT message"
            ),
            Ok(Err(e)) => warn!(
                topic = %topic,
                payload_size = payload.len(),
                error = %e,
                "Dropping MQTT message"
            ),
            Err(e) => error!(topic = %topic, error = %e, "Ingest task failed"),
        }
    }
}
