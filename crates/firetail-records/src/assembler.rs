// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::queue::{Received, RecordReceiver};
use crate::record::InvocationRecord;

/// Pulls whatever is immediately available from the record queue into batches.
#[derive(Debug)]
pub struct BatchAssembler {
    receiver: RecordReceiver,
}

impl BatchAssembler {
    pub fn new(receiver: RecordReceiver) -> Self {
        Self { receiver }
    }

    /// Takes up to `max_additional` records without waiting.
    ///
    /// The flag is `false` only once the queue is closed and nothing is left in it.
    pub fn drain(&mut self, max_additional: usize) -> (Vec<InvocationRecord>, bool) {
        let mut records = Vec::new();
        while records.len() < max_additional {
            match self.receiver.try_recv() {
                Received::Record(record) => records.push(record),
                Received::Empty => return (records, true),
                Received::Closed => return (records, false),
            }
        }
        (records, true)
    }

    pub async fn wait_for_record(&mut self) -> Option<InvocationRecord> {
        self.receiver.recv().await
    }
}
