// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Bounded hand-off of decoded records from the sources to the delivery loop.
//!
//! Producers wait when the queue is full. The queue closes once every [`RecordSender`] is
//! dropped; records already buffered remain available to the receiver.

use crate::errors::RecordError;
use crate::record::InvocationRecord;
use tokio::sync::mpsc::{self, error::TryRecvError};

pub const DEFAULT_QUEUE_CAPACITY: usize = 1000;

pub fn bounded(capacity: usize) -> (RecordSender, RecordReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (RecordSender { tx }, RecordReceiver { rx })
}

#[derive(Debug, Clone)]
pub struct RecordSender {
    tx: mpsc::Sender<InvocationRecord>,
}

impl RecordSender {
    /// Waits for room in the queue, then enqueues the record.
    pub async fn push(&self, record: InvocationRecord) -> Result<(), RecordError> {
        self.tx
            .send(record)
            .await
            .map_err(|_| RecordError::QueueClosed)
    }
}

#[derive(Debug)]
pub struct RecordReceiver {
    rx: mpsc::Receiver<InvocationRecord>,
}

pub enum Received {
    Record(InvocationRecord),
    Empty,
    Closed,
}

impl RecordReceiver {
    pub fn try_recv(&mut self) -> Received {
        match self.rx.try_recv() {
            Ok(record) => Received::Record(record),
            Err(TryRecvError::Empty) => Received::Empty,
            Err(TryRecvError::Disconnected) => Received::Closed,
        }
    }

    /// Waits for the next record. `None` once the queue is closed and empty.
    pub async fn recv(&mut self) -> Option<InvocationRecord> {
        self.rx.recv().await
    }
}
