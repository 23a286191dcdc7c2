//! HTTP client for the ingest endpoint.

use crate::OutboxResult;
use relay_ledger::{Record, StoredSummary};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

/// Successful response body: the records the endpoint stored.
///
/// Items are kept raw so one unreadable entry does not void the others.
#[derive(Debug, Deserialize)]
struct IngestResponse {
    #[serde(default)]
    stored: Vec<Value>,
}

/// Classified result of one batch POST that reached the endpoint.
#[derive(Debug)]
pub enum PostOutcome {
    /// 200 with a parseable body.
    Stored(Vec<StoredSummary>),
    /// Any status other than 200.
    Rejected { status: StatusCode, body: String },
    /// 200 whose body is not a valid `{"stored": [...]}` document.
    MalformedResponse { status: StatusCode, error: String },
}

/// Posts drained batches as one JSON array per request.
#[derive(Debug, Clone)]
pub struct IngestClient {
    client: Client,
    url: String,
}

impl IngestClient {
    /// Create a client with a bounded per-request timeout.
    pub fn new(url: impl Into<String>, timeout: Duration) -> OutboxResult<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Send one batch.
    ///
    /// Connection errors and timeouts are returned as `OutboxError::Http`;
    /// anything the endpoint answered is classified in `PostOutcome`.
    pub async fn post_batch(&self, records: &[Record]) -> OutboxResult<PostOutcome> {
        debug!(url = %self.url, records = records.len(), "Posting batch");

        let response = self.client.post(&self.url).json(records).send().await?;

        let status = response.status();
        let body = response.text().await?;

        if status != StatusCode::OK {
            return Ok(PostOutcome::Rejected { status, body });
        }

        match serde_json::from_str::<IngestResponse>(&body) {
            Ok(parsed) => Ok(PostOutcome::Stored(parse_stored(parsed.stored))),
            Err(e) => Ok(PostOutcome::MalformedResponse {
                status,
                error: e.to_string(),
            }),
        }
    }
}

/// Convert each `stored` item on its own, skipping the unreadable ones.
fn parse_stored(items: Vec<Value>) -> Vec<StoredSummary> {
    items
        .into_iter()
        .enumerate()
        .filter_map(|(index, item)| match serde_json::from_value(item) {
            Ok(summary) => Some(summary),
            Err(e) => {
                warn!(index, error = %e, "Skipping unreadable stored item");
                None
            }
        })
        .collect()
}
