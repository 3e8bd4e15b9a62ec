// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Stand-in for the Lambda Runtime API

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::{body::Incoming, Request, Response};
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;

pub const REQUEST_ID: &str = "8476a536-e9f4-11e8-9739-2dfe598c3fcd";

#[derive(Clone, Debug)]
pub struct ReceivedRequest {
    pub method: String,
    pub path: String,
    pub body: Vec<u8>,
}

#[derive(Clone)]
pub struct MockRuntime {
    pub addr: SocketAddr,
    pub received_requests: Arc<Mutex<Vec<ReceivedRequest>>>,
}

impl MockRuntime {
    /// Start a runtime that hands out `event` on every `invocation/next` and accepts
    /// everything else
    pub async fn start(event: &'static str) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind mock runtime");
        let addr = listener.local_addr().expect("Failed to get local addr");

        let received_requests = Arc::new(Mutex::new(Vec::new()));
        let requests_clone = received_requests.clone();

        tokio::spawn(async move {
            loop {
                let (stream, _) = match listener.accept().await {
                    Ok(conn) => conn,
                    Err(_) => break,
                };

                let io = TokioIo::new(stream);
                let requests = requests_clone.clone();

                tokio::spawn(async move {
                    let service = hyper::service::service_fn(move |req: Request<Incoming>| {
                        let requests = requests.clone();
                        async move {
                            let method = req.method().to_string();
                            let path = req.uri().path().to_string();
                            let body = req
                                .into_body()
                                .collect()
                                .await
                                .map(|collected| collected.to_bytes().to_vec())
                                .unwrap_or_default();

                            let response = if path.ends_with("/invocation/next") {
                                Response::builder()
                                    .status(200)
                                    .header("Lambda-Runtime-Aws-Request-Id", REQUEST_ID)
                                    .header("Content-Type", "application/json")
                                    .body(Full::new(Bytes::from_static(event.as_bytes())))
                            } else {
                                Response::builder()
                                    .status(202)
                                    .body(Full::new(Bytes::from_static(br#"{"status":"OK"}"#)))
                            };

                            requests
                                .lock()
                                .unwrap()
                                .push(ReceivedRequest { method, path, body });
                            response
                        }
                    });

                    let _ = hyper::server::conn::http1::Builder::new()
                        .serve_connection(io, service)
                        .await;
                });
            }
        });

        MockRuntime {
            addr,
            received_requests,
        }
    }

    /// host:port, the way `AWS_LAMBDA_RUNTIME_API` carries it
    pub fn runtime_api(&self) -> String {
        self.addr.to_string()
    }

    pub fn get_requests(&self) -> Vec<ReceivedRequest> {
        self.received_requests.lock().unwrap().clone()
    }
}
