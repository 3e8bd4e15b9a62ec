// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use bytes::Bytes;
use http_body_util::Full;
use hyper::{http, Response, StatusCode};
use serde_json::json;
use std::io;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

pub type HttpBody = Full<Bytes>;
pub type HttpResponse = Response<HttpBody>;

/// How long a stopping server waits for open connections to wind down.
pub const CONNECTION_DRAIN_TIMEOUT: Duration = Duration::from_millis(200);

/// Does two things:
/// 1. Logs the given message. A success status code (within 200-299) will cause a debug log to
///    be written, otherwise error will be written.
/// 2. Returns the given message in the body of JSON response with the given status code.
///
/// Response body format:
/// {
///     "message": message
/// }
pub fn log_and_create_http_response(
    message: &str,
    status: StatusCode,
) -> http::Result<HttpResponse> {
    if status.is_success() {
        debug!("{message}");
    } else {
        error!("{message}");
    }
    let body = json!({ "message": message }).to_string();
    Response::builder()
        .status(status)
        .body(HttpBody::from(body))
}

pub fn empty_response(status: StatusCode) -> http::Result<HttpResponse> {
    Response::builder().status(status).body(HttpBody::default())
}

/// Accepts connections until `cancel` fires, then gives open connections
/// [`CONNECTION_DRAIN_TIMEOUT`] to finish before dropping them.
pub async fn serve_tcp<S>(
    listener: tokio::net::TcpListener,
    service: S,
    cancel: CancellationToken,
) -> Result<(), io::Error>
where
    S: hyper::service::Service<hyper::Request<hyper::body::Incoming>, Response = HttpResponse>
        + Clone
        + Send
        + 'static,
    S::Future: Send,
    S::Error: std::error::Error + Send + Sync + 'static,
{
    let server = hyper::server::conn::http1::Builder::new();
    let mut joinset = tokio::task::JoinSet::new();

    loop {
        let conn = tokio::select! {
            con_res = listener.accept() => match con_res {
                Err(e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::ConnectionAborted
                            | io::ErrorKind::ConnectionReset
                            | io::ErrorKind::ConnectionRefused
                    ) =>
                {
                    continue;
                }
                Err(e) => {
                    error!("Server error: {e}");
                    return Err(e);
                }
                Ok((conn, _)) => conn,
            },
            finished = async {
                match joinset.join_next().await {
                    Some(finished) => finished,
                    None => std::future::pending().await,
                }
            } => match finished {
                Err(e) if e.is_panic() => {
                    error!("Connection handler panicked: {:?}", e);
                    continue;
                },
                Ok(()) | Err(_) => continue,
            },
            _ = cancel.cancelled() => break,
        };
        let conn = hyper_util::rt::TokioIo::new(conn);
        let server = server.clone();
        let service = service.clone();
        let cancel = cancel.clone();
        joinset.spawn(async move {
            let connection = server.serve_connection(conn, service);
            tokio::pin!(connection);
            let result = tokio::select! {
                result = connection.as_mut() => result,
                _ = cancel.cancelled() => {
                    connection.as_mut().graceful_shutdown();
                    connection.await
                }
            };
            if let Err(e) = result {
                debug!("Connection error: {e}");
            }
        });
    }

    let drained = tokio::time::timeout(CONNECTION_DRAIN_TIMEOUT, async {
        while joinset.join_next().await.is_some() {}
    })
    .await;
    if drained.is_err() {
        debug!(
            "Dropping {} connection(s) still open after shutdown",
            joinset.len()
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use http_body_util::BodyExt;
    use hyper::StatusCode;

    use super::*;

    async fn get_response_body_as_string(response: HttpResponse) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_log_and_create_http_response() {
        let response =
            log_and_create_http_response("Runtime proxy | not found", StatusCode::NOT_FOUND)
                .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            get_response_body_as_string(response).await,
            r#"{"message":"Runtime proxy | not found"}"#
        );
    }

    #[tokio::test]
    async fn test_empty_response() {
        let response = empty_response(StatusCode::OK).unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(get_response_body_as_string(response).await, "");
    }

    #[tokio::test]
    async fn test_serve_tcp_stops_on_cancel() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let service =
            hyper::service::service_fn(|_req: hyper::Request<hyper::body::Incoming>| async {
                empty_response(StatusCode::OK)
            });
        let cancel = CancellationToken::new();
        let server = tokio::spawn(serve_tcp(listener, service, cancel.clone()));

        cancel.cancel();
        let result = tokio::time::timeout(Duration::from_secs(1), server)
            .await
            .expect("server did not stop")
            .unwrap();
        assert!(result.is_ok());
    }
}
