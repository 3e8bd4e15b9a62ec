// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The loop that moves records from the queue to the sink.
//!
//! A batch that fails to deliver is kept whole and sent again on the next cycle, topped up
//! with whatever arrived in the meantime. A batch the sink received but whose acknowledgment
//! was lost is therefore delivered twice; delivery is at-least-once. Records that cannot be
//! converted are reported once and left out of the retry.

use crate::assembler::BatchAssembler;
use crate::error_sink::ErrorSink;
use crate::flusher::{BatchSink, Delivery};
use crate::log_entry::LogEntry;
use crate::queue::RecordReceiver;
use crate::record::InvocationRecord;
use std::time::Duration;
use tracing::{debug, error};

pub const DEFAULT_MAX_BATCH_SIZE: usize = 100;
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Copy)]
pub struct DeliveryConfig {
    pub max_batch_size: usize,
    /// Pause between a failed delivery and the next attempt.
    pub retry_interval: Duration,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            retry_interval: DEFAULT_RETRY_INTERVAL,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryStats {
    pub delivered: usize,
    /// Records dropped because they could not be converted to log entries.
    pub discarded: usize,
    pub attempts: usize,
}

pub struct DeliveryLoop<S, E> {
    assembler: BatchAssembler,
    sink: S,
    errors: E,
    config: DeliveryConfig,
}

impl<S: BatchSink, E: ErrorSink> DeliveryLoop<S, E> {
    pub fn new(receiver: RecordReceiver, sink: S, errors: E, config: DeliveryConfig) -> Self {
        DeliveryLoop {
            assembler: BatchAssembler::new(receiver),
            sink,
            errors,
            config: DeliveryConfig {
                max_batch_size: config.max_batch_size.max(1),
                ..config
            },
        }
    }

    /// Runs until the queue is closed and every batch has been dealt with.
    pub async fn run(mut self) -> DeliveryStats {
        let max_batch_size = self.config.max_batch_size;
        let mut batch: Vec<InvocationRecord> = Vec::with_capacity(max_batch_size);
        let mut stats = DeliveryStats::default();

        loop {
            let (records, has_more) = self.assembler.drain(max_batch_size - batch.len());
            batch.extend(records);

            if batch.is_empty() {
                if !has_more {
                    break;
                }
                // Idle: wait for the next record instead of polling.
                match self.assembler.wait_for_record().await {
                    Some(record) => {
                        batch.push(record);
                        continue;
                    }
                    None => break,
                }
            }

            let report = self.sink.forward(&batch).await;
            stats.attempts += 1;
            let retry = report.should_retry();
            let included = report.included;
            if let Delivery::Failed(e) = &report.delivery {
                error!(
                    "Failed to deliver batch of {} record(s), keeping it for the next attempt: {e}",
                    batch.len()
                );
            }
            if let Some(errors) = report.into_errors() {
                self.errors.report(errors);
            }

            if retry {
                let before = batch.len();
                batch.retain(|record| LogEntry::try_from(record).is_ok());
                stats.discarded += before - batch.len();
                tokio::time::sleep(self.config.retry_interval).await;
                continue;
            }

            if included > 0 {
                debug!("Delivered {included} record(s) to Firetail");
            }
            stats.delivered += included;
            stats.discarded += batch.len() - included;
            batch.clear();
        }

        debug!("Record queue closed and drained, stopping delivery loop");
        stats
    }
}
