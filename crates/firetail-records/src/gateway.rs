// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! API Gateway request events, in the two payload formats a Lambda behind a gateway can see.
//!
//! Only the fields needed to build a log entry are modelled, plus the fields that tell the
//! formats apart. Unknown fields are ignored.

use crate::errors::{ShapeMismatch, UnmarshalError};
use crate::record::nullable;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// REST API proxy integration event (payload format 1.0).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiGatewayProxyRequest {
    #[serde(default, deserialize_with = "nullable")]
    pub resource: String,
    #[serde(default, deserialize_with = "nullable")]
    pub path: String,
    pub http_method: String,
    #[serde(default, deserialize_with = "nullable")]
    pub headers: BTreeMap<String, String>,
    #[serde(default, deserialize_with = "nullable")]
    pub multi_value_headers: BTreeMap<String, Vec<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub body: String,
    #[serde(default, deserialize_with = "nullable")]
    pub is_base64_encoded: bool,
    pub request_context: ProxyRequestContext,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyRequestContext {
    #[serde(default, deserialize_with = "nullable")]
    pub request_id: String,
    #[serde(default, deserialize_with = "nullable")]
    pub stage: String,
    #[serde(default, deserialize_with = "nullable")]
    pub domain_name: String,
    #[serde(default, deserialize_with = "nullable")]
    pub path: String,
    #[serde(default, deserialize_with = "nullable")]
    pub protocol: String,
    #[serde(default, deserialize_with = "nullable")]
    pub http_method: String,
    #[serde(default, deserialize_with = "nullable")]
    pub request_time_epoch: i64,
    #[serde(default, deserialize_with = "nullable")]
    pub identity: ProxyRequestIdentity,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyRequestIdentity {
    #[serde(default, deserialize_with = "nullable")]
    pub source_ip: String,
}

/// HTTP API event (payload format 2.0).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiGatewayV2HttpRequest {
    pub version: String,
    #[serde(default, deserialize_with = "nullable")]
    pub route_key: String,
    pub raw_path: String,
    #[serde(default, deserialize_with = "nullable")]
    pub raw_query_string: String,
    #[serde(default, deserialize_with = "nullable")]
    pub headers: BTreeMap<String, String>,
    #[serde(default, deserialize_with = "nullable")]
    pub body: String,
    #[serde(default, deserialize_with = "nullable")]
    pub is_base64_encoded: bool,
    pub request_context: V2HttpRequestContext,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct V2HttpRequestContext {
    #[serde(default, deserialize_with = "nullable")]
    pub request_id: String,
    #[serde(default, deserialize_with = "nullable")]
    pub stage: String,
    #[serde(default, deserialize_with = "nullable")]
    pub domain_name: String,
    #[serde(default, deserialize_with = "nullable")]
    pub time_epoch: i64,
    pub http: V2HttpDescription,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct V2HttpDescription {
    #[serde(default, deserialize_with = "nullable")]
    pub method: String,
    #[serde(default, deserialize_with = "nullable")]
    pub path: String,
    #[serde(default, deserialize_with = "nullable")]
    pub protocol: String,
    #[serde(default, deserialize_with = "nullable")]
    pub source_ip: String,
    #[serde(default, deserialize_with = "nullable")]
    pub user_agent: String,
}

/// A request event recognised as one of the supported gateway shapes.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestEvent {
    Rest(Box<ApiGatewayProxyRequest>),
    Http(Box<ApiGatewayV2HttpRequest>),
}

type ShapeDecoder = fn(&Value) -> Result<RequestEvent, String>;

/// Shapes are tried in this order; the first that reads cleanly wins.
const SHAPES: [(&str, ShapeDecoder); 2] = [
    ("API Gateway REST proxy event", decode_rest),
    ("API Gateway HTTP API event", decode_http),
];

impl RequestEvent {
    pub fn from_value(value: &Value) -> Result<Self, UnmarshalError> {
        let mut reasons = Vec::with_capacity(SHAPES.len());
        for (shape, decode) in SHAPES {
            match decode(value) {
                Ok(event) => return Ok(event),
                Err(reason) => reasons.push(ShapeMismatch { shape, reason }),
            }
        }
        Err(UnmarshalError::UnrecognizedEvent { reasons })
    }
}

fn decode_rest(value: &Value) -> Result<RequestEvent, String> {
    ApiGatewayProxyRequest::deserialize(value)
        .map(|event| RequestEvent::Rest(Box::new(event)))
        .map_err(|e| e.to_string())
}

fn decode_http(value: &Value) -> Result<RequestEvent, String> {
    let event = ApiGatewayV2HttpRequest::deserialize(value).map_err(|e| e.to_string())?;
    if event.version != "2.0" {
        return Err(format!("unsupported payload version {:?}", event.version));
    }
    Ok(RequestEvent::Http(Box::new(event)))
}
