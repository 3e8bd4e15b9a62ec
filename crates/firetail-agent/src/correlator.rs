// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Pairs what the runtime proxy observed into invocation records.
//!
//! Events are kept pending until the runtime submits a result for them. A submission is
//! matched by request id, falling back to the oldest pending event that arrived without one.
//! The Lambda runtime handles one invocation at a time, so more than one pending event means
//! a submission went missing; that is logged and the backlog is capped.

use crate::proxy::{ObservedEvent, Observations, Submission};
use firetail_records::error_sink::ErrorSink;
use firetail_records::errors::RecordError;
use firetail_records::queue::RecordSender;
use firetail_records::record::{InvocationRecord, InvocationResponse};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, warn};

pub const MAX_PENDING_EVENTS: usize = 16;

#[derive(Debug, Default)]
pub struct PendingEvents {
    events: VecDeque<ObservedEvent>,
}

impl PendingEvents {
    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn register(&mut self, event: ObservedEvent) {
        if !self.events.is_empty() {
            warn!(
                "Correlator | New invocation {:?} while {} still pending",
                event.request_id,
                self.events.len()
            );
        }
        if self.events.len() >= MAX_PENDING_EVENTS {
            if let Some(evicted) = self.events.pop_front() {
                warn!(
                    "Correlator | Evicting invocation {:?}, no result was ever submitted",
                    evicted.request_id
                );
            }
        }
        self.events.push_back(event);
    }

    /// Removes and returns the event a submission for `request_id` belongs to.
    pub fn take(&mut self, request_id: Option<&str>) -> Option<ObservedEvent> {
        let position = match request_id {
            Some(id) => self
                .events
                .iter()
                .position(|event| event.request_id.as_deref() == Some(id))
                .or_else(|| {
                    self.events
                        .iter()
                        .position(|event| event.request_id.is_none())
                }),
            None => (!self.events.is_empty()).then_some(0),
        }?;
        self.events.remove(position)
    }
}

pub struct Correlator {
    observations: Observations,
    queue: RecordSender,
    errors: Arc<dyn ErrorSink>,
    pending: PendingEvents,
}

impl Correlator {
    pub fn new(observations: Observations, queue: RecordSender, errors: Arc<dyn ErrorSink>) -> Self {
        Correlator {
            observations,
            queue,
            errors,
            pending: PendingEvents::default(),
        }
    }

    /// Runs until both observation channels are closed and returns how many records it queued.
    pub async fn run(self) -> usize {
        let Correlator {
            mut observations,
            queue,
            errors,
            mut pending,
        } = self;
        let mut queued = 0;

        loop {
            tokio::select! {
                biased;
                Some(event) = observations.events.recv() => pending.register(event),
                Some(submission) = observations.submissions.recv() => {
                    let Some(record) = settle(&mut pending, submission, errors.as_ref()) else {
                        continue;
                    };
                    match queue.push(record).await {
                        Ok(()) => queued += 1,
                        Err(e) => errors.report(e.into()),
                    }
                }
                else => break,
            }
        }

        if !pending.is_empty() {
            debug!(
                "Correlator | Stopping with {} invocation(s) still pending",
                pending.len()
            );
        }
        queued
    }
}

fn settle(
    pending: &mut PendingEvents,
    submission: Submission,
    errors: &dyn ErrorSink,
) -> Option<InvocationRecord> {
    match submission {
        Submission::Response {
            request_id,
            body,
            observed_at,
        } => {
            let Some(event) = pending.take(request_id.as_deref()) else {
                warn!("Correlator | Dropping response for {request_id:?}, no pending invocation");
                return None;
            };
            match build_record(&event, &body, observed_at) {
                Ok(record) => Some(record),
                Err(e) => {
                    errors.report(e.into());
                    None
                }
            }
        }
        Submission::Error { request_id } => {
            if pending.take(request_id.as_deref()).is_some() {
                debug!("Correlator | Invocation {request_id:?} failed, no record produced");
            }
            None
        }
    }
}

pub fn build_record(
    event: &ObservedEvent,
    response: &[u8],
    responded_at: Instant,
) -> Result<InvocationRecord, RecordError> {
    let payload: Value =
        serde_json::from_slice(&event.body).map_err(RecordError::InvalidEvent)?;
    let response: InvocationResponse =
        serde_json::from_slice(response).map_err(RecordError::InvalidResponse)?;
    Ok(InvocationRecord {
        event: Some(payload),
        response,
        execution_time: responded_at
            .saturating_duration_since(event.observed_at)
            .as_secs_f64(),
    })
}
