// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::errors::ConversionError;
use crate::gateway::RequestEvent;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// One observed invocation of the monitored function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvocationRecord {
    /// The request event the function was invoked with, kept as opaque JSON.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<Value>,
    #[serde(default)]
    pub response: InvocationResponse,
    /// Seconds between the event reaching the function and the response leaving it.
    #[serde(default, deserialize_with = "nullable")]
    pub execution_time: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvocationResponse {
    #[serde(rename = "statusCode", default, deserialize_with = "nullable")]
    pub status_code: i64,
    #[serde(default, deserialize_with = "nullable")]
    pub body: String,
    #[serde(default, deserialize_with = "nullable")]
    pub headers: BTreeMap<String, String>,
}

impl InvocationRecord {
    /// Classifies the record's event against the known gateway shapes.
    pub fn request_event(&self) -> Result<RequestEvent, ConversionError> {
        match &self.event {
            None | Some(Value::Null) => Err(ConversionError::MissingEvent),
            Some(event) => Ok(RequestEvent::from_value(event)?),
        }
    }
}

/// Treats an explicit JSON `null` the same as a missing field.
pub(crate) fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
