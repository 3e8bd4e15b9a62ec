// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The log entry format accepted by the Firetail bulk logs endpoint.

use crate::errors::ConversionError;
use crate::gateway::{ApiGatewayProxyRequest, ApiGatewayV2HttpRequest, RequestEvent};
use crate::record::{InvocationRecord, InvocationResponse};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Version of the logging schema the entries are written in.
pub const LOG_ENTRY_VERSION: &str = "1.0.0-alpha";
pub const LOG_ENTRY_SOURCE: &str = "lambda-extension";

pub type MultiValueHeaders = BTreeMap<String, Vec<String>>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    /// Epoch milliseconds at which the gateway received the request.
    pub date_created: i64,
    pub execution_time: f64,
    pub request: LogEntryRequest,
    pub response: LogEntryResponse,
    pub version: String,
    pub metadata: LogEntryMetadata,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntryRequest {
    pub body: String,
    pub headers: MultiValueHeaders,
    pub http_protocol: String,
    pub ip: String,
    pub method: String,
    pub uri: String,
    pub resource: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntryResponse {
    pub body: String,
    pub headers: MultiValueHeaders,
    pub status_code: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntryMetadata {
    pub source: String,
}

impl Default for LogEntryMetadata {
    fn default() -> Self {
        Self {
            source: LOG_ENTRY_SOURCE.to_string(),
        }
    }
}

impl TryFrom<&InvocationRecord> for LogEntry {
    type Error = ConversionError;

    fn try_from(record: &InvocationRecord) -> Result<Self, Self::Error> {
        let (date_created, request) = match record.request_event()? {
            RequestEvent::Rest(event) => rest_request(*event),
            RequestEvent::Http(event) => http_request(*event),
        };
        Ok(LogEntry {
            date_created,
            execution_time: record.execution_time,
            request,
            response: LogEntryResponse::from(&record.response),
            version: LOG_ENTRY_VERSION.to_string(),
            metadata: LogEntryMetadata::default(),
        })
    }
}

impl From<&InvocationResponse> for LogEntryResponse {
    fn from(response: &InvocationResponse) -> Self {
        LogEntryResponse {
            body: response.body.clone(),
            headers: single_valued(response.headers.clone()),
            status_code: response.status_code,
        }
    }
}

/// Wraps every header value in a list of one. Values are never split on commas.
fn single_valued(headers: BTreeMap<String, String>) -> MultiValueHeaders {
    headers
        .into_iter()
        .map(|(name, value)| (name, vec![value]))
        .collect()
}

fn rest_request(event: ApiGatewayProxyRequest) -> (i64, LogEntryRequest) {
    let context = event.request_context;
    // Gateways that send no multi-value map still send the single-valued one.
    let headers = if event.multi_value_headers.is_empty() {
        single_valued(event.headers)
    } else {
        event.multi_value_headers
    };
    let request = LogEntryRequest {
        body: event.body,
        headers,
        http_protocol: context.protocol,
        ip: context.identity.source_ip,
        method: context.http_method,
        uri: format!("https://{}{}", context.domain_name, context.path),
        resource: event.resource,
    };
    (context.request_time_epoch, request)
}

fn http_request(event: ApiGatewayV2HttpRequest) -> (i64, LogEntryRequest) {
    let context = event.request_context;
    let request = LogEntryRequest {
        body: event.body,
        headers: single_valued(event.headers),
        http_protocol: context.http.protocol,
        ip: context.http.source_ip,
        method: context.http.method,
        uri: format!("https://{}{}", context.domain_name, context.http.path),
        resource: event.raw_path,
    };
    (context.time_epoch, request)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn response() -> InvocationResponse {
        InvocationResponse {
            status_code: 200,
            body: r#"{"Description":"This is a test response body"}"#.to_string(),
            headers: BTreeMap::from([(
                "Test-Header-Name".to_string(),
                "Test-Header-Value".to_string(),
            )]),
        }
    }

    fn rest_record() -> InvocationRecord {
        InvocationRecord {
            event: Some(json!({
                "resource": "/hi",
                "path": "/hi",
                "httpMethod": "GET",
                "headers": {
                    "Host": "5iagptskg6.execute-api.eu-west-2.amazonaws.com",
                    "accept": "*/*"
                },
                "multiValueHeaders": {
                    "Host": ["5iagptskg6.execute-api.eu-west-2.amazonaws.com"],
                    "X-Forwarded-For": ["37.228.214.117"],
                    "accept": ["*/*"]
                },
                "body": null,
                "isBase64Encoded": false,
                "requestContext": {
                    "resourcePath": "/hi",
                    "httpMethod": "GET",
                    "path": "/hi",
                    "protocol": "HTTP/1.1",
                    "domainName": "5iagptskg6.execute-api.eu-west-2.amazonaws.com",
                    "requestTimeEpoch": 1668685315222_i64,
                    "identity": {"sourceIp": "37.228.214.117"}
                }
            })),
            response: response(),
            execution_time: 50.0,
        }
    }

    #[test]
    fn test_rest_event_conversion() {
        let entry = LogEntry::try_from(&rest_record()).unwrap();
        assert_eq!(entry.date_created, 1668685315222);
        assert_eq!(entry.execution_time, 50.0);
        assert_eq!(entry.request.method, "GET");
        assert_eq!(entry.request.ip, "37.228.214.117");
        assert_eq!(entry.request.http_protocol, "HTTP/1.1");
        assert_eq!(
            entry.request.uri,
            "https://5iagptskg6.execute-api.eu-west-2.amazonaws.com/hi"
        );
        assert_eq!(entry.request.resource, "/hi");
        assert_eq!(
            entry.request.headers.get("X-Forwarded-For"),
            Some(&vec!["37.228.214.117".to_string()])
        );
        assert_eq!(entry.version, LOG_ENTRY_VERSION);
        assert_eq!(entry.metadata.source, LOG_ENTRY_SOURCE);
    }

    #[test]
    fn test_serialized_field_order() {
        let entry = LogEntry::try_from(&rest_record()).unwrap();
        assert_eq!(
            serde_json::to_string(&entry).unwrap(),
            concat!(
                r#"{"dateCreated":1668685315222,"executionTime":50.0,"#,
                r#""request":{"body":"","headers":{"Host":["5iagptskg6.execute-api.eu-west-2.amazonaws.com"],"X-Forwarded-For":["37.228.214.117"],"accept":["*/*"]},"#,
                r#""httpProtocol":"HTTP/1.1","ip":"37.228.214.117","method":"GET","#,
                r#""uri":"https://5iagptskg6.execute-api.eu-west-2.amazonaws.com/hi","resource":"/hi"},"#,
                r#""response":{"body":"{\"Description\":\"This is a test response body\"}","headers":{"Test-Header-Name":["Test-Header-Value"]},"statusCode":200},"#,
                r#""version":"1.0.0-alpha","metadata":{"source":"lambda-extension"}}"#
            )
        );
    }

    #[test]
    fn test_rest_event_without_headers() {
        let mut record = rest_record();
        if let Some(event) = record.event.as_mut().and_then(|e| e.as_object_mut()) {
            event.remove("headers");
            event.remove("multiValueHeaders");
        }
        let entry = LogEntry::try_from(&record).unwrap();
        assert!(entry.request.headers.is_empty());
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["request"]["headers"], json!({}));
    }

    #[test]
    fn test_http_event_conversion() {
        let record = InvocationRecord {
            event: Some(json!({
                "version": "2.0",
                "routeKey": "$default",
                "rawPath": "/hi",
                "rawQueryString": "",
                "headers": {
                    "accept": "text/html,application/json",
                    "host": "abc.execute-api.eu-west-1.amazonaws.com"
                },
                "requestContext": {
                    "domainName": "abc.execute-api.eu-west-1.amazonaws.com",
                    "timeEpoch": 1668685315333_i64,
                    "http": {
                        "method": "POST",
                        "path": "/hi",
                        "protocol": "HTTP/1.1",
                        "sourceIp": "198.51.100.2",
                        "userAgent": "curl/8.0"
                    }
                },
                "body": "{\"hello\":\"world\"}",
                "isBase64Encoded": false
            })),
            response: response(),
            execution_time: 0.75,
        };
        let entry = LogEntry::try_from(&record).unwrap();
        assert_eq!(entry.date_created, 1668685315333);
        assert_eq!(entry.request.method, "POST");
        assert_eq!(entry.request.ip, "198.51.100.2");
        assert_eq!(entry.request.resource, "/hi");
        assert_eq!(
            entry.request.uri,
            "https://abc.execute-api.eu-west-1.amazonaws.com/hi"
        );
        assert_eq!(
            entry.request.headers.get("accept"),
            Some(&vec!["text/html,application/json".to_string()])
        );
        assert_eq!(entry.request.body, "{\"hello\":\"world\"}");
    }

    #[test]
    fn test_rest_event_with_single_valued_headers_only() {
        let mut record = rest_record();
        if let Some(event) = record.event.as_mut().and_then(|e| e.as_object_mut()) {
            event.remove("multiValueHeaders");
            event.insert(
                "headers".to_string(),
                json!({"Accept": "application/json", "Host": "example.com"}),
            );
        }
        let entry = LogEntry::try_from(&record).unwrap();
        assert_eq!(
            entry.request.headers,
            BTreeMap::from([
                ("Accept".to_string(), vec!["application/json".to_string()]),
                ("Host".to_string(), vec!["example.com".to_string()]),
            ])
        );
    }

    #[test]
    fn test_http_event_header_values_are_not_split() {
        let record = InvocationRecord {
            event: Some(json!({
                "version": "2.0",
                "rawPath": "/hi",
                "headers": {
                    "user-agent": "Mozilla/5.0 (KHTML, like Gecko) Chrome/120",
                    "if-modified-since": "Wed, 21 Oct 2015 07:28:00 GMT"
                },
                "requestContext": {"http": {"method": "GET", "path": "/hi"}}
            })),
            response: response(),
            execution_time: 1.0,
        };
        let entry = LogEntry::try_from(&record).unwrap();
        assert_eq!(
            entry.request.headers["user-agent"],
            vec!["Mozilla/5.0 (KHTML, like Gecko) Chrome/120".to_string()]
        );
        assert_eq!(
            entry.request.headers["if-modified-since"],
            vec!["Wed, 21 Oct 2015 07:28:00 GMT".to_string()]
        );
    }

    #[test]
    fn test_response_headers_become_lists() {
        let converted = LogEntryResponse::from(&response());
        assert_eq!(
            converted.headers.get("Test-Header-Name"),
            Some(&vec!["Test-Header-Value".to_string()])
        );
        assert_eq!(converted.status_code, 200);
    }

    #[test]
    fn test_record_without_event_fails() {
        let record = InvocationRecord {
            event: None,
            response: response(),
            execution_time: 1.0,
        };
        assert!(matches!(
            LogEntry::try_from(&record),
            Err(ConversionError::MissingEvent)
        ));
    }

    #[test]
    fn test_record_with_unknown_event_fails() {
        let record = InvocationRecord {
            event: Some(json!({"Headers": "No headers here"})),
            response: response(),
            execution_time: 1.0,
        };
        assert!(matches!(
            LogEntry::try_from(&record),
            Err(ConversionError::UnrecognizedEvent(_))
        ));
    }
}
