// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! HTTP endpoint the Lambda Logs API pushes function log lines to.
//!
//! Every request is acknowledged with a 200, whatever happened to its lines. The Logs API
//! stops delivering to destinations that do not acknowledge, and a line that failed to decode
//! will not decode any better the second time.

use crate::http_utils::{self, empty_response, HttpResponse};
use firetail_records::decoder;
use firetail_records::error_sink::ErrorSink;
use firetail_records::errors::{ErrorList, RecordError};
use firetail_records::queue::RecordSender;
use firetail_records::record::InvocationRecord;
use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper::{http, service::service_fn, Request, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use std::fmt::Display;
use std::io;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub const FUNCTION_LOG_TYPE: &str = "function";

/// One entry of a Logs API delivery.
#[derive(Debug, Clone, Deserialize)]
pub struct LogMessage {
    #[serde(default)]
    pub time: String,
    /// Empty when absent, which `extract_record` rejects as the wrong kind.
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub record: Value,
}

pub struct LogsReceiver {
    queue: RecordSender,
    errors: Arc<dyn ErrorSink>,
}

impl LogsReceiver {
    pub fn new(queue: RecordSender, errors: Arc<dyn ErrorSink>) -> Self {
        LogsReceiver { queue, errors }
    }

    /// Serves deliveries on `listener` until `cancel` fires. The receiver, and with it this
    /// source's handle on the record queue, is dropped when this returns.
    pub async fn serve(self, listener: TcpListener, cancel: CancellationToken) -> io::Result<()> {
        let receiver = Arc::new(self);
        let service = service_fn(move |req: Request<Incoming>| {
            let receiver = receiver.clone();
            async move { receiver.handle(req).await }
        });
        debug!(
            "Logs receiver | Listening on {}",
            listener
                .local_addr()
                .map(|addr| addr.to_string())
                .unwrap_or_default()
        );
        http_utils::serve_tcp(listener, service, cancel).await
    }

    pub async fn handle<B>(&self, req: Request<B>) -> http::Result<HttpResponse>
    where
        B: hyper::body::Body,
        B::Error: Display,
    {
        match req.into_body().collect().await {
            Ok(collected) => {
                self.ingest(&collected.to_bytes()).await;
            }
            Err(e) => self
                .errors
                .report(RecordError::RequestBody(e.to_string()).into()),
        }
        empty_response(StatusCode::OK)
    }

    /// Queues every record found in a delivery body and returns how many were queued.
    ///
    /// Only a body that is not a JSON array is rejected as a whole; each element is read on
    /// its own.
    pub async fn ingest(&self, body: &[u8]) -> usize {
        let lines: Vec<Value> = match serde_json::from_slice(body) {
            Ok(messages) => messages,
            Err(e) => {
                self.errors
                    .report(RecordError::RequestBody(e.to_string()).into());
                return 0;
            }
        };

        let mut errors = ErrorList::new();
        let mut queued = 0;
        for line in lines {
            let record = match serde_json::from_value::<LogMessage>(line)
                .map_err(RecordError::InvalidLogLine)
                .and_then(extract_record)
            {
                Ok(record) => record,
                Err(e) => {
                    errors.push(e);
                    continue;
                }
            };
            match self.queue.push(record).await {
                Ok(()) => queued += 1,
                Err(e) => errors.push(e),
            }
        }
        if !errors.is_empty() {
            self.errors.report(errors);
        }
        debug!("Logs receiver | Queued {queued} record(s)");
        queued
    }
}

/// Pulls the invocation record out of a single log line, if it carries one.
pub fn extract_record(message: LogMessage) -> Result<InvocationRecord, RecordError> {
    if message.kind != FUNCTION_LOG_TYPE {
        return Err(RecordError::WrongKind { kind: message.kind });
    }
    let token: String =
        serde_json::from_value(message.record).map_err(RecordError::RecordNotString)?;
    Ok(decoder::decode(&token)?)
}
