//! Relay pipeline wiring the sender and sweeper to one store.

use crate::{BatchSender, IngestClient, OutboxResult, RetrySweeper};
use relay_config_and_utils::Config;
use relay_ledger::RelayStore;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Owns the two periodic delivery tasks.
///
/// The sender and sweeper are independent failure domains: each catches and
/// logs its own cycle errors.
pub struct RelayPipeline {
    sender: Arc<BatchSender>,
    sweeper: Arc<RetrySweeper>,
}

/// Join handles of a spawned pipeline.
pub struct PipelineHandles {
    pub sender: JoinHandle<()>,
    pub sweeper: JoinHandle<()>,
}

impl PipelineHandles {
    /// Wait for both tasks to finish.
    pub async fn join(self) {
        let (sender, sweeper) = tokio::join!(self.sender, self.sweeper);
        for (name, result) in [("sender", sender), ("sweeper", sweeper)] {
            if let Err(e) = result {
                tracing::error!(task = name, error = %e, "Pipeline task ended abnormally");
            }
        }
    }
}

impl RelayPipeline {
    /// Build the pipeline from configuration.
    pub fn new(store: RelayStore, config: &Config) -> OutboxResult<Self> {
        let url = config.ingest_url()?;
        let client = IngestClient::new(url.as_str(), config.request_timeout())?;

        Ok(Self {
            sender: Arc::new(BatchSender::new(
                store.clone(),
                client,
                config.batch_interval(),
            )),
            sweeper: Arc::new(RetrySweeper::new(
                store,
                config.sweep_interval(),
                config.stale_after(),
            )),
        })
    }

    pub fn sender(&self) -> &BatchSender {
        &self.sender
    }

    pub fn sweeper(&self) -> &RetrySweeper {
        &self.sweeper
    }

    /// Spawn the sender and sweeper; both stop at their next sleep boundary
    /// once `cancel` fires.
    pub fn spawn(&self, cancel: CancellationToken) -> PipelineHandles {
        let sender = {
            let sender = self.sender.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { sender.run(cancel).await })
        };

        let sweeper = {
            let sweeper = self.sweeper.clone();
            tokio::spawn(async move { sweeper.run(cancel).await })
        };

        info!("Relay pipeline started");
        PipelineHandles { sender, sweeper }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_config_and_utils::Paths;
    use std::time::Duration;
    use tempfile::tempdir;

    #[test]
    fn new_rejects_invalid_url() {
        let temp = tempdir().unwrap();
        let store = RelayStore::open(&Paths::with_base_dir(temp.path().to_path_buf())).unwrap();
        let config = Config {
            ingest_url: "not a url".to_string(),
            ..Default::default()
        };

        assert!(RelayPipeline::new(store, &config).is_err());
    }

    #[tokio::test]
    async fn spawned_tasks_stop_on_cancel() {
        let temp = tempdir().unwrap();
        let store = RelayStore::open(&Paths::with_base_dir(temp.path().to_path_buf())).unwrap();
        let pipeline = RelayPipeline::new(store, &Config::default()).unwrap();

        let cancel = CancellationToken::new();
        let handles = pipeline.spawn(cancel.clone());
        cancel.cancel();

        tokio::time::timeout(Duration::from_secs(2), handles.join())
            .await
            .expect("pipeline should stop after cancel");
    }
}
