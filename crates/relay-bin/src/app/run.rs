//! Relay startup and signal-driven shutdown.

use relay_config_and_utils::{Config, Paths};
use relay_ingest::{Ingestor, MqttListener, MqttListenerConfig};
use relay_ledger::RelayStore;
use relay_outbox::RelayPipeline;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Run the relay until Ctrl-C.
pub async fn run_relay(config: Config, paths: Paths) -> Result<(), Box<dyn std::error::Error>> {
    info!(
        ingest_url = %config.ingest_url,
        mqtt_host = %config.mqtt_host,
        mqtt_port = config.mqtt_port,
        mqtt_topic = %config.mqtt_topic,
        base_dir = %paths.base_dir().display(),
        "Starting telemetry relay"
    );

    let store = RelayStore::open(&paths)?;
    let status = {
        let store = store.clone();
        tokio::task::spawn_blocking(move || store.status()).await??
    };
    info!(
        incoming = status.incoming,
        outbound = status.outbound,
        ledger = status.ledger,
        "Stores opened"
    );

    let cancel = CancellationToken::new();

    let pipeline = RelayPipeline::new(store.clone(), &config)?;
    let pipeline_handles = pipeline.spawn(cancel.clone());

    let listener = MqttListener::new(
        MqttListenerConfig::from(&config),
        Ingestor::new(store, config.producer_tag.clone()),
    );
    let listener_handle = {
        let cancel = cancel.clone();
        tokio::spawn(async move { listener.run(cancel).await })
    };

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Interrupt received, shutting down"),
        Err(e) => error!(error = %e, "Failed to wait for interrupt, shutting down"),
    }
    cancel.cancel();

    pipeline_handles.join().await;
    if let Err(e) = listener_handle.await {
        error!(error = %e, "MQTT listener ended abnormally");
    }

    info!("Telemetry relay stopped");
    Ok(())
}
