// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::errors::{ErrorList, RecordError};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Receives the errors collected while handling one request or one batch.
///
/// Reports are for the operator only; nothing upstream waits on them.
pub trait ErrorSink: Send + Sync {
    fn report(&self, errors: ErrorList);
}

/// Writes reports to the extension's own log.
///
/// Reports made up only of ordinary log lines that did not decode go out at debug level.
/// Anything else lost a record and goes out at warn.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogErrorSink;

impl ErrorSink for LogErrorSink {
    fn report(&self, errors: ErrorList) {
        if errors.iter().all(RecordError::is_ordinary_log_line) {
            debug!("{errors}");
        } else {
            warn!("{errors}");
        }
    }
}

/// Forwards reports to a channel, for callers that want to inspect them.
#[derive(Debug, Clone)]
pub struct ChannelErrorSink {
    tx: mpsc::UnboundedSender<ErrorList>,
}

impl ChannelErrorSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ErrorList>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ErrorSink for ChannelErrorSink {
    fn report(&self, errors: ErrorList) {
        // A dropped receiver just means nobody is listening any more.
        let _ = self.tx.send(errors);
    }
}

impl<T: ErrorSink + ?Sized> ErrorSink for Arc<T> {
    fn report(&self, errors: ErrorList) {
        (**self).report(errors);
    }
}
