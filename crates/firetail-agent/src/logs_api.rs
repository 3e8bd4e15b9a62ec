// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::config::LOG_RECEIVER_URI;
use crate::errors::RuntimeApiError;
use crate::extensions_api::EXTENSION_ID_HEADER;
use reqwest::StatusCode;
use serde::Serialize;
use tracing::debug;

pub const SCHEMA_VERSION: &str = "2021-03-18";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Buffering {
    pub max_items: u32,
    pub max_bytes: u32,
    pub timeout_ms: u32,
}

impl Default for Buffering {
    fn default() -> Self {
        Buffering {
            max_items: 10_000,
            max_bytes: 262_144,
            timeout_ms: 25,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Destination {
    pub protocol: String,
    #[serde(rename = "URI")]
    pub uri: String,
    pub method: String,
    pub encoding: String,
}

impl Destination {
    pub fn http(uri: &str) -> Self {
        Destination {
            protocol: "HTTP".to_string(),
            uri: uri.to_string(),
            method: "POST".to_string(),
            encoding: "JSON".to_string(),
        }
    }
}

/// Body of a Logs API subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribeRequest {
    pub schema_version: String,
    pub types: Vec<String>,
    pub buffering: Buffering,
    pub destination: Destination,
}

impl Default for SubscribeRequest {
    /// Function logs only, pushed to the extension's log receiver.
    fn default() -> Self {
        SubscribeRequest {
            schema_version: SCHEMA_VERSION.to_string(),
            types: vec!["function".to_string()],
            buffering: Buffering::default(),
            destination: Destination::http(LOG_RECEIVER_URI),
        }
    }
}

pub struct LogsApiClient {
    client: reqwest::Client,
    url: String,
}

impl LogsApiClient {
    pub fn new(runtime_api: &str) -> Result<Self, RuntimeApiError> {
        Ok(LogsApiClient {
            client: reqwest::Client::builder().build()?,
            url: format!("http://{runtime_api}/2020-08-15/logs"),
        })
    }

    pub async fn subscribe(
        &self,
        extension_id: &str,
        request: &SubscribeRequest,
    ) -> Result<(), RuntimeApiError> {
        let response = self
            .client
            .put(&self.url)
            .header(EXTENSION_ID_HEADER, extension_id)
            .json(request)
            .send()
            .await?;
        match response.status() {
            StatusCode::OK => {
                debug!(
                    "Subscribed to {:?} logs at {}",
                    request.types, request.destination.uri
                );
                Ok(())
            }
            StatusCode::ACCEPTED => Err(RuntimeApiError::LogsApiNotSupported),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(RuntimeApiError::Status { status, body })
            }
        }
    }
}
