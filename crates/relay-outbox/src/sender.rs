//! Periodic batch sender.
//!
//! Each cycle drains the outbound queue, posts it as one request, and removes
//! acknowledged records from the ledger. Drained records are never re-queued
//! here: whatever the endpoint did not confirm stays in the ledger and the
//! sweeper re-queues it.

use crate::{with_store, IngestClient, OutboxResult, PostOutcome};
use relay_ledger::RelayStore;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Result of one sender cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The queue was empty; no request was made.
    Idle,
    /// The request never got an answer (connect error, timeout).
    TransportFailed { batch_id: String, drained: usize },
    /// The endpoint answered with a non-success status.
    Rejected {
        batch_id: String,
        drained: usize,
        status: u16,
    },
    /// The endpoint answered 2xx with a body we could not parse.
    MalformedResponse { batch_id: String, drained: usize },
    /// The response was parsed and matched against the ledger.
    Reconciled {
        batch_id: String,
        drained: usize,
        stored: usize,
        acknowledged: usize,
    },
}

/// Drains the outbound queue and reconciles responses against the ledger.
pub struct BatchSender {
    store: RelayStore,
    client: IngestClient,
    batch_interval: Duration,
}

impl BatchSender {
    pub fn new(store: RelayStore, client: IngestClient, batch_interval: Duration) -> Self {
        Self {
            store,
            client,
            batch_interval,
        }
    }

    /// Run one Draining → Transmitting → Reconciling pass.
    ///
    /// Transport and response problems are logged and reported in the
    /// outcome. Only storage failures are returned as errors.
    pub async fn run_cycle(&self) -> OutboxResult<CycleOutcome> {
        let status = with_store(&self.store, |store| store.status()).await?;
        info!(
            incoming = status.incoming,
            outbound = status.outbound,
            ledger = status.ledger,
            "Store status"
        );

        let drained =
            with_store(&self.store, |store| store.outbound_queue().drain_all()).await?;
        if drained.is_empty() {
            debug!("Outbound queue empty, nothing to send");
            return Ok(CycleOutcome::Idle);
        }

        let batch_id = uuid::Uuid::new_v4().to_string();
        let count = drained.len();
        info!(
            batch_id = %batch_id,
            records = count,
            url = %self.client.url(),
            "Sending batch"
        );

        let outcome = match self.client.post_batch(&drained).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(
                    batch_id = %batch_id,
                    records = count,
                    error = %e,
                    "Batch send failed, ledger keeps records for the sweeper"
                );
                return Ok(CycleOutcome::TransportFailed {
                    batch_id,
                    drained: count,
                });
            }
        };

        match outcome {
            PostOutcome::Rejected { status, body } => {
                warn!(
                    batch_id = %batch_id,
                    status = status.as_u16(),
                    body = %body,
                    "Batch rejected by endpoint"
                );
                Ok(CycleOutcome::Rejected {
                    batch_id,
                    drained: count,
                    status: status.as_u16(),
                })
            }
            PostOutcome::MalformedResponse { status, error } => {
                warn!(
                    batch_id = %batch_id,
                    status = status.as_u16(),
                    error = %error,
                    "Unparseable response, nothing acknowledged"
                );
                Ok(CycleOutcome::MalformedResponse {
                    batch_id,
                    drained: count,
                })
            }
            PostOutcome::Stored(stored) => {
                let stored_count = stored.len();
                let acknowledged = with_store(&self.store, move |store| {
                    store.ledger().reconcile_acknowledged(&stored)
                })
                .await?;
                info!(
                    batch_id = %batch_id,
                    records = count,
                    stored = stored_count,
                    acknowledged,
                    "Batch sent"
                );
                Ok(CycleOutcome::Reconciled {
                    batch_id,
                    drained: count,
                    stored: stored_count,
                    acknowledged,
                })
            }
        }
    }

    /// Sleep, cycle, repeat until `cancel` fires.
    ///
    /// A failed cycle is logged and never stops the loop.
    pub async fn run(&self, cancel: CancellationToken) {
        info!(
            interval_secs = self.batch_interval.as_secs(),
            "Batch sender started"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.batch_interval) => {}
            }

            if let Err(e) = self.run_cycle().await {
                error!(error = %e, "Batch sender cycle failed");
            }
        }

        info!("Batch sender stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_config_and_utils::Paths;
    use relay_ledger::{DeliveryStatus, NamedValue, Record};
    use serde_json::json;
    use tempfile::{tempdir, TempDir};
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn open_store() -> (TempDir, RelayStore) {
        let temp = tempdir().unwrap();
        let paths = Paths::with_base_dir(temp.path().to_path_buf());
        (temp, RelayStore::open(&paths).unwrap())
    }

    fn record(source: &str, time: i64) -> Record {
        Record {
            producer_tag: "string".to_string(),
            recorded_at: Some(1_000),
            source_id: source.to_string(),
            network_address: json!(null),
            delivery_status: DeliveryStatus::Unacknowledged,
            values: vec![NamedValue::new("time", time), NamedValue::new("temp", 5)],
        }
    }

    fn sender(store: &RelayStore, url: String) -> BatchSender {
        let client = IngestClient::new(url, Duration::from_secs(5)).unwrap();
        BatchSender::new(store.clone(), client, Duration::from_millis(20))
    }

    #[tokio::test]
    async fn empty_queue_makes_no_request() {
        let (_temp, store) = open_store();
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let outcome = sender(&store, server.uri()).run_cycle().await.unwrap();
        assert_eq!(outcome, CycleOutcome::Idle);
    }

    #[tokio::test]
    async fn acknowledged_records_leave_ledger() {
        let (_temp, store) = open_store();
        store.ingest(&record("M1", 100)).unwrap();
        store.ingest(&record("M1", 101)).unwrap();

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "stored": [{"machine": "M1", "valuesList": [{"name": "time", "value": 100}]}]
            })))
            .mount(&server)
            .await;

        let outcome = sender(&store, server.uri()).run_cycle().await.unwrap();
        assert!(matches!(
            outcome,
            CycleOutcome::Reconciled {
                drained: 2,
                stored: 1,
                acknowledged: 1,
                ..
            }
        ));

        let ledger = store.ledger().read_all().unwrap();
        assert_eq!(ledger, vec![record("M1", 101)]);
        assert!(store.outbound_queue().is_empty().unwrap());
    }

    #[tokio::test]
    async fn transport_failure_keeps_ledger_and_drops_queue_copy() {
        let (_temp, store) = open_store();
        store.ingest(&record("M1", 100)).unwrap();

        // Nothing listens on port 1.
        let outcome = sender(&store, "http://127.0.0.1:1/ingest".to_string())
            .run_cycle()
            .await
            .unwrap();

        assert!(matches!(
            outcome,
            CycleOutcome::TransportFailed { drained: 1, .. }
        ));
        assert_eq!(store.ledger().len().unwrap(), 1);
        assert!(store.outbound_queue().is_empty().unwrap());
    }

    #[tokio::test]
    async fn rejected_batch_acknowledges_nothing() {
        let (_temp, store) = open_store();
        store.ingest(&record("M1", 100)).unwrap();

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({
                "stored": [{"machine": "M1", "valuesList": [{"name": "time", "value": 100}]}]
            })))
            .mount(&server)
            .await;

        let outcome = sender(&store, server.uri()).run_cycle().await.unwrap();
        assert!(matches!(outcome, CycleOutcome::Rejected { status: 500, .. }));
        assert_eq!(store.ledger().len().unwrap(), 1);
        assert!(store.outbound_queue().is_empty().unwrap());
    }

    #[tokio::test]
    async fn accepted_status_leaves_ledger_intact() {
        let (_temp, store) = open_store();
        store.ingest(&record("M1", 100)).unwrap();

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(202).set_body_json(json!({
                "stored": [{"machine": "M1", "valuesList": [{"name": "time", "value": 100}]}]
            })))
            .mount(&server)
            .await;

        let outcome = sender(&store, server.uri()).run_cycle().await.unwrap();
        assert!(matches!(outcome, CycleOutcome::Rejected { status: 202, .. }));
        assert_eq!(store.ledger().read_all().unwrap(), vec![record("M1", 100)]);
    }

    #[tokio::test]
    async fn malformed_response_acknowledges_nothing() {
        let (_temp, store) = open_store();
        store.ingest(&record("M1", 100)).unwrap();

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("stored everything"))
            .mount(&server)
            .await;

        let outcome = sender(&store, server.uri()).run_cycle().await.unwrap();
        assert!(matches!(outcome, CycleOutcome::MalformedResponse { drained: 1, .. }));
        assert_eq!(store.ledger().len().unwrap(), 1);
    }

    #[tokio::test]
    async fn run_loop_sends_then_stops_on_cancel() {
        let (_temp, store) = open_store();
        store.ingest(&record("M1", 100)).unwrap();

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "stored": [{"machine": "M1", "valuesList": [{"name": "time", "value": 100}]}]
            })))
            .mount(&server)
            .await;

        let cancel = CancellationToken::new();
        let task = {
            let sender = sender(&store, server.uri());
            let cancel = cancel.clone();
            tokio::spawn(async move { sender.run(cancel).await })
        };

        tokio::time::sleep(Duration::from_millis(300)).await;
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("sender should stop after cancel")
            .unwrap();

        assert!(store.ledger().is_empty().unwrap());
        assert!(store.outbound_queue().is_empty().unwrap());
    }
}
