// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Client for the Lambda Extensions API: registration, the event loop and error reporting.

use crate::errors::RuntimeApiError;
use reqwest::StatusCode;
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::json;
use tracing::debug;

pub const EXTENSION_NAME_HEADER: &str = "Lambda-Extension-Name";
pub const EXTENSION_ID_HEADER: &str = "Lambda-Extension-Identifier";
pub const FUNCTION_ERROR_TYPE_HEADER: &str = "Lambda-Extension-Function-Error-Type";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    #[serde(default)]
    pub function_name: String,
    #[serde(default)]
    pub function_version: String,
    #[serde(default)]
    pub handler: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    Invoke,
    Shutdown,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Tracing {
    #[serde(rename = "type")]
    pub kind: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NextEventResponse {
    pub event_type: EventType,
    #[serde(default)]
    pub deadline_ms: i64,
    #[serde(default)]
    pub request_id: String,
    #[serde(default)]
    pub invoked_function_arn: String,
    #[serde(default)]
    pub tracing: Option<Tracing>,
    /// Only set on SHUTDOWN events.
    #[serde(default)]
    pub shutdown_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StatusResponse {
    pub status: String,
}

pub struct ExtensionsClient {
    client: reqwest::Client,
    base_url: String,
    extension_id: Option<String>,
}

impl ExtensionsClient {
    /// `runtime_api` is the host:port from `AWS_LAMBDA_RUNTIME_API`.
    pub fn new(runtime_api: &str) -> Result<Self, RuntimeApiError> {
        // `event/next` blocks until the next event, so no request timeout here.
        let client = reqwest::Client::builder().build()?;
        Ok(ExtensionsClient {
            client,
            base_url: format!("http://{runtime_api}/2020-01-01/extension"),
            extension_id: None,
        })
    }

    pub fn extension_id(&self) -> Option<&str> {
        self.extension_id.as_deref()
    }

    pub async fn register(&mut self, name: &str) -> Result<RegisterResponse, RuntimeApiError> {
        let response = self
            .client
            .post(format!("{}/register", self.base_url))
            .header(EXTENSION_NAME_HEADER, name)
            .json(&json!({ "events": ["INVOKE", "SHUTDOWN"] }))
            .send()
            .await?;
        let extension_id = response
            .headers()
            .get(EXTENSION_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let registered: RegisterResponse = read_json(response).await?;
        let extension_id = extension_id.ok_or(RuntimeApiError::MissingExtensionId)?;
        debug!(
            "Registered extension {name} with id {extension_id} for function {}",
            registered.function_name
        );
        self.extension_id = Some(extension_id);
        Ok(registered)
    }

    /// Blocks until Lambda hands out the next INVOKE or SHUTDOWN event.
    pub async fn next_event(&self) -> Result<NextEventResponse, RuntimeApiError> {
        let extension_id = self.registered_id()?;
        let response = self
            .client
            .get(format!("{}/event/next", self.base_url))
            .header(EXTENSION_ID_HEADER, extension_id)
            .send()
            .await?;
        read_json(response).await
    }

    pub async fn init_error(&self, error_type: &str) -> Result<StatusResponse, RuntimeApiError> {
        self.report_error("init", error_type).await
    }

    pub async fn exit_error(&self, error_type: &str) -> Result<StatusResponse, RuntimeApiError> {
        self.report_error("exit", error_type).await
    }

    async fn report_error(
        &self,
        phase: &str,
        error_type: &str,
    ) -> Result<StatusResponse, RuntimeApiError> {
        let extension_id = self.registered_id()?;
        let response = self
            .client
            .post(format!("{}/{phase}/error", self.base_url))
            .header(EXTENSION_ID_HEADER, extension_id)
            .header(FUNCTION_ERROR_TYPE_HEADER, error_type)
            .send()
            .await?;
        read_json(response).await
    }

    fn registered_id(&self) -> Result<&str, RuntimeApiError> {
        self.extension_id
            .as_deref()
            .ok_or(RuntimeApiError::NotRegistered)
    }
}

async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, RuntimeApiError> {
    let status = response.status();
    if status != StatusCode::OK {
        let body = response.text().await.unwrap_or_default();
        return Err(RuntimeApiError::Status { status, body });
    }
    Ok(response.json().await?)
}
