// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Shipping batches of records to the Firetail bulk logs endpoint.

use crate::errors::{ConversionError, ErrorList, RecordError};
use crate::log_entry::LogEntry;
use crate::record::InvocationRecord;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_SINK_URL: &str = "https://api.logging.eu-west-1.sandbox.firetail.app/logs/bulk";
pub const API_KEY_HEADER: &str = "x-ft-api-key";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Something that can take a batch of records off the delivery loop's hands.
#[async_trait]
pub trait BatchSink: Send + Sync {
    async fn forward(&self, batch: &[InvocationRecord]) -> ForwardReport;
}

#[derive(Debug, Default)]
pub enum Delivery {
    /// No record in the batch could be converted, so nothing was sent.
    #[default]
    NotAttempted,
    Delivered,
    Failed(RecordError),
}

/// Outcome of forwarding one batch.
#[derive(Debug, Default)]
pub struct ForwardReport {
    /// Records written into the request payload, whether or not the sink accepted them.
    pub included: usize,
    /// Conversion failures for records left out of the payload.
    pub skipped: ErrorList,
    pub delivery: Delivery,
}

impl ForwardReport {
    pub fn is_delivered(&self) -> bool {
        matches!(self.delivery, Delivery::Delivered)
    }

    /// Sending the same batch again could still succeed.
    pub fn should_retry(&self) -> bool {
        matches!(self.delivery, Delivery::Failed(_))
    }

    /// All errors from this attempt, or `None` if there were none.
    pub fn into_errors(self) -> Option<ErrorList> {
        let mut errors = self.skipped;
        if let Delivery::Failed(error) = self.delivery {
            errors.push(error);
        }
        if errors.is_empty() {
            None
        } else {
            Some(errors)
        }
    }
}

pub struct FlusherConfig {
    pub api_key: String,
    pub sink_url: String,
    pub timeout: Duration,
}

#[derive(Deserialize)]
struct SinkResponse {
    message: Option<String>,
}

/// Posts batches to the Firetail API as newline delimited JSON.
#[derive(Debug, Clone)]
pub struct Forwarder {
    client: reqwest::Client,
    api_key: String,
    sink_url: String,
}

impl Forwarder {
    pub fn new(config: FlusherConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Forwarder {
            client,
            api_key: config.api_key,
            sink_url: config.sink_url,
        })
    }

    async fn ship(&self, payload: Vec<u8>) -> Result<(), RecordError> {
        let response = self
            .client
            .post(&self.sink_url)
            .header(API_KEY_HEADER, &self.api_key)
            .body(payload)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        let accepted = status.is_success()
            && serde_json::from_str::<SinkResponse>(&body)
                .ok()
                .and_then(|r| r.message)
                .is_some_and(|message| message == "success");
        if accepted {
            Ok(())
        } else {
            Err(RecordError::SinkRejection { status, body })
        }
    }
}

/// Converts every record it can and writes one JSON document per line.
pub fn serialize_batch(batch: &[InvocationRecord]) -> (Vec<u8>, usize, ErrorList) {
    let mut payload = Vec::new();
    let mut included = 0;
    let mut skipped = ErrorList::new();
    for record in batch {
        let entry = match LogEntry::try_from(record) {
            Ok(entry) => entry,
            Err(e) => {
                skipped.push(e);
                continue;
            }
        };
        match serde_json::to_writer(&mut payload, &entry) {
            Ok(()) => {
                payload.push(b'\n');
                included += 1;
            }
            Err(e) => skipped.push(ConversionError::Serialize(e)),
        }
    }
    (payload, included, skipped)
}

#[async_trait]
impl BatchSink for Forwarder {
    async fn forward(&self, batch: &[InvocationRecord]) -> ForwardReport {
        let (payload, included, skipped) = serialize_batch(batch);
        if included == 0 {
            debug!(
                "Forwarder | None of the {} record(s) in the batch could be converted",
                batch.len()
            );
            return ForwardReport {
                included,
                skipped,
                delivery: Delivery::NotAttempted,
            };
        }

        debug!("Forwarder | Sending {included} log entries to {}", self.sink_url);
        let delivery = match self.ship(payload).await {
            Ok(()) => Delivery::Delivered,
            Err(e) => Delivery::Failed(e),
        };
        ForwardReport {
            included,
            skipped,
            delivery,
        }
    }
}
