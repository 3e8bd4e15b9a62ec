// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use reqwest::StatusCode;

/// Failures talking to the Lambda Extensions and Logs APIs.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeApiError {
    #[error("request to runtime API failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("request failed with status {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("register response did not include an extension identifier")]
    MissingExtensionId,

    #[error("extension is not registered")]
    NotRegistered,

    #[error("Logs API not supported. Extension may be running in local sandbox.")]
    LogsApiNotSupported,
}
