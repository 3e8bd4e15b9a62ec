// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Reverse proxy between the function runtime and the Lambda Runtime API.
//!
//! Requests are mirrored to the real Runtime API and its answers relayed untouched. Along the
//! way the proxy publishes the invocation events handed out by `invocation/next` and the
//! results submitted to `invocation/{id}/response` and `invocation/{id}/error`; the
//! [`Correlator`](crate::correlator::Correlator) pairs them into records.

use crate::http_utils::{self, log_and_create_http_response, HttpBody, HttpResponse};
use bytes::Bytes;
use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper::header::{self, HeaderMap, HeaderName};
use hyper::{http, service::service_fn, Method, Request, Response, StatusCode};
use std::fmt::Display;
use std::io;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub const RUNTIME_API_PREFIX: &str = "/2018-06-01/runtime";
pub const REQUEST_ID_HEADER: &str = "lambda-runtime-aws-request-id";
pub const OBSERVATION_CHANNEL_CAPACITY: usize = 8;

/// An invocation event as handed to the runtime by `invocation/next`.
#[derive(Debug, Clone)]
pub struct ObservedEvent {
    pub request_id: Option<String>,
    pub body: Bytes,
    pub observed_at: Instant,
}

/// What the runtime reported back for an invocation.
#[derive(Debug, Clone)]
pub enum Submission {
    Response {
        request_id: Option<String>,
        body: Bytes,
        observed_at: Instant,
    },
    Error {
        request_id: Option<String>,
    },
}

/// Publishing half of the observation channels.
#[derive(Debug, Clone)]
pub struct Observer {
    events: mpsc::Sender<ObservedEvent>,
    submissions: mpsc::Sender<Submission>,
}

impl Observer {
    pub async fn event(&self, event: ObservedEvent) {
        if self.events.send(event).await.is_err() {
            debug!("Runtime proxy | No correlator listening, dropping observed event");
        }
    }

    pub async fn submission(&self, submission: Submission) {
        if self.submissions.send(submission).await.is_err() {
            debug!("Runtime proxy | No correlator listening, dropping observed submission");
        }
    }
}

/// Consuming half of the observation channels. Both close once every [`Observer`] is gone.
#[derive(Debug)]
pub struct Observations {
    pub events: mpsc::Receiver<ObservedEvent>,
    pub submissions: mpsc::Receiver<Submission>,
}

pub fn observation_channel(capacity: usize) -> (Observer, Observations) {
    let (events_tx, events_rx) = mpsc::channel(capacity);
    let (submissions_tx, submissions_rx) = mpsc::channel(capacity);
    (
        Observer {
            events: events_tx,
            submissions: submissions_tx,
        },
        Observations {
            events: events_rx,
            submissions: submissions_rx,
        },
    )
}

#[derive(Debug, PartialEq, Eq)]
enum Route {
    InitError,
    Next,
    Response(String),
    Error(String),
}

fn route(method: &Method, path: &str) -> Option<Route> {
    let rest = path.strip_prefix(RUNTIME_API_PREFIX)?;
    match (method, rest) {
        (&Method::POST, "/init/error") => Some(Route::InitError),
        (&Method::GET, "/invocation/next") => Some(Route::Next),
        (&Method::POST, rest) => {
            let (id, action) = rest.strip_prefix("/invocation/")?.split_once('/')?;
            if id.is_empty() {
                return None;
            }
            match action {
                "response" => Some(Route::Response(id.to_string())),
                "error" => Some(Route::Error(id.to_string())),
                _ => None,
            }
        }
        _ => None,
    }
}

#[derive(Clone)]
pub struct RuntimeProxy {
    client: reqwest::Client,
    runtime_api: String,
    observer: Observer,
}

impl RuntimeProxy {
    /// `runtime_api` is the host:port of the real Runtime API.
    pub fn new(runtime_api: &str) -> Result<(RuntimeProxy, Observations), reqwest::Error> {
        // No timeout: `invocation/next` parks until the next invocation arrives.
        let client = reqwest::Client::builder().build()?;
        let (observer, observations) = observation_channel(OBSERVATION_CHANNEL_CAPACITY);
        Ok((
            RuntimeProxy {
                client,
                runtime_api: runtime_api.to_string(),
                observer,
            },
            observations,
        ))
    }

    /// Serves the runtime until `cancel` fires. The observation channels close when this
    /// returns and the last in-flight request is done.
    pub async fn serve(self, listener: TcpListener, cancel: CancellationToken) -> io::Result<()> {
        let proxy = Arc::new(self);
        let service = service_fn(move |req: Request<Incoming>| {
            let proxy = proxy.clone();
            async move { proxy.handle(req).await }
        });
        debug!(
            "Runtime proxy | Listening on {}",
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
        let received_at = Instant::now();
        let Some(route) = route(req.method(), req.uri().path()) else {
            return log_and_create_http_response(
                &format!(
                    "Runtime proxy | No route for {} {}",
                    req.method(),
                    req.uri().path()
                ),
                StatusCode::NOT_FOUND,
            );
        };

        let (parts, body) = req.into_parts();
        let body = match body.collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) => {
                return log_and_create_http_response(
                    &format!("Runtime proxy | Failed to read request body: {e}"),
                    StatusCode::BAD_REQUEST,
                )
            }
        };
        let path_and_query = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or_else(|| parts.uri.path());
        let url = format!("http://{}{}", self.runtime_api, path_and_query);

        let (status, headers, upstream_body) =
            match self.forward(parts.method, &url, &parts.headers, body.clone()).await {
                Ok(upstream) => upstream,
                Err(e) => {
                    return log_and_create_http_response(
                        &format!("Runtime proxy | Error forwarding to runtime API: {e}"),
                        StatusCode::INTERNAL_SERVER_ERROR,
                    )
                }
            };

        match route {
            Route::Next if status.is_success() => {
                let request_id = headers
                    .get(REQUEST_ID_HEADER)
                    .and_then(|value| value.to_str().ok())
                    .map(str::to_string);
                self.observer
                    .event(ObservedEvent {
                        request_id,
                        body: upstream_body.clone(),
                        observed_at: Instant::now(),
                    })
                    .await;
            }
            Route::Response(id) => {
                self.observer
                    .submission(Submission::Response {
                        request_id: Some(id),
                        body,
                        observed_at: received_at,
                    })
                    .await;
            }
            Route::Error(id) => {
                self.observer
                    .submission(Submission::Error {
                        request_id: Some(id),
                    })
                    .await;
            }
            Route::Next | Route::InitError => {}
        }

        relay(status, &headers, upstream_body)
    }

    async fn forward(
        &self,
        method: Method,
        url: &str,
        headers: &HeaderMap,
        body: Bytes,
    ) -> Result<(StatusCode, HeaderMap, Bytes), reqwest::Error> {
        let mut forwarded = HeaderMap::new();
        for (name, value) in headers {
            if name != header::HOST && !is_connection_specific(name) {
                forwarded.append(name.clone(), value.clone());
            }
        }
        let response = self
            .client
            .request(method, url)
            .headers(forwarded)
            .body(body)
            .send()
            .await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?;
        Ok((status, headers, body))
    }
}

fn relay(status: StatusCode, headers: &HeaderMap, body: Bytes) -> http::Result<HttpResponse> {
    let mut builder = Response::builder().status(status);
    for (name, value) in headers {
        if !is_connection_specific(name) {
            builder = builder.header(name, value);
        }
    }
    builder.body(HttpBody::new(body))
}

/// Headers that describe one hop, or a body framing that no longer holds once the body has
/// been buffered. They are dropped in both directions.
fn is_connection_specific(name: &HeaderName) -> bool {
    matches!(
        name.as_str(),
        "connection"
            | "keep-alive"
            | "proxy-connection"
            | "te"
            | "trailer"
            | "transfer-encoding"
            | "upgrade"
            | "content-length"
    )
}
