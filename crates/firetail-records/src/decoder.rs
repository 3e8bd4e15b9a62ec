// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Encoded record tokens.
//!
//! A function emits a record by printing `firetail:log-ext:<base64 JSON record>`. The runtime
//! may put its own prefix in front of that (timestamp, request id, level), which is ignored.

use crate::errors::{DecodeError, UnmarshalError};
use crate::gateway::RequestEvent;
use crate::record::InvocationRecord;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::Value;

pub const NAMESPACE: &str = "firetail";
pub const SCHEMA_TOKEN: &str = "log-ext";

/// Decodes a token into an [`InvocationRecord`].
pub fn decode(token: &str) -> Result<InvocationRecord, DecodeError> {
    let segments: Vec<&str> = token.split(':').collect();
    let count = segments.len();
    if count < 3 {
        return Err(DecodeError::MalformedToken { segments: count });
    }

    // A namespace/schema pair anywhere but in front of the final segment means
    // something was appended after the payload.
    if let Some(position) = segments
        .windows(2)
        .rposition(|pair| namespace_word(pair[0]) == NAMESPACE && pair[1] == SCHEMA_TOKEN)
    {
        if position + 3 != count {
            return Err(DecodeError::MalformedToken { segments: count });
        }
    }

    let (namespace, schema_token, payload) =
        (segments[count - 3], segments[count - 2], segments[count - 1]);
    if namespace_word(namespace) != NAMESPACE {
        return Err(DecodeError::NamespaceMismatch {
            found: namespace_word(namespace).to_string(),
        });
    }
    if schema_token != SCHEMA_TOKEN {
        return Err(DecodeError::SchemaTokenMismatch {
            found: schema_token.to_string(),
        });
    }

    let bytes = STANDARD.decode(payload.trim())?;
    let record: InvocationRecord =
        serde_json::from_slice(&bytes).map_err(UnmarshalError::Envelope)?;
    match &record.event {
        None | Some(Value::Null) => {}
        Some(event) => {
            RequestEvent::from_value(event)?;
        }
    }
    Ok(record)
}

/// Encodes a record the way the function-side libraries print it.
pub fn encode(record: &InvocationRecord) -> Result<String, serde_json::Error> {
    let json = serde_json::to_vec(record)?;
    Ok(format!(
        "{NAMESPACE}:{SCHEMA_TOKEN}:{}",
        STANDARD.encode(json)
    ))
}

/// The last whitespace separated word of a segment, so that a runtime log prefix such as
/// `2023-02-09T14:12:59.574Z <request id> INFO firetail` still yields `firetail`.
fn namespace_word(segment: &str) -> &str {
    segment.split_whitespace().next_back().unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::InvocationResponse;
    use proptest::prelude::*;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn ok_record() -> InvocationRecord {
        InvocationRecord {
            event: None,
            response: InvocationResponse {
                status_code: 200,
                body: "ok".to_string(),
                headers: BTreeMap::new(),
            },
            execution_time: 1.5,
        }
    }

    fn payload_of(value: serde_json::Value) -> String {
        STANDARD.encode(value.to_string())
    }

    #[test]
    fn test_decode_response() {
        let token = format!(
            "firetail:log-ext:{}",
            payload_of(json!({
                "response": {
                    "statusCode": 200,
                    "body": "{\"message\":\"Hello, world!\"}",
                    "headers": {"Content-Type": "application/json"}
                },
                "execution_time": 0.25
            }))
        );
        let record = decode(&token).unwrap();
        assert_eq!(record.response.status_code, 200);
        assert_eq!(record.response.body, "{\"message\":\"Hello, world!\"}");
        assert_eq!(
            record.response.headers.get("Content-Type").map(String::as_str),
            Some("application/json")
        );
        assert_eq!(record.execution_time, 0.25);
    }

    #[test]
    fn test_decode_with_rest_event() {
        let token = format!(
            "firetail:log-ext:{}",
            payload_of(json!({
                "event": {
                    "resource": "/hi",
                    "httpMethod": "GET",
                    "requestContext": {"domainName": "example.com", "path": "/hi"}
                },
                "response": {"statusCode": 200},
                "execution_time": 50
            }))
        );
        let record = decode(&token).unwrap();
        assert!(record.event.is_some());
        assert_eq!(record.execution_time, 50.0);
    }

    #[test]
    fn test_decode_tolerates_leading_segments() {
        let encoded = encode(&ok_record()).unwrap();
        let plain = decode(&encoded).unwrap();
        let prefixed = decode(&format!("anything:{encoded}")).unwrap();
        assert_eq!(plain, prefixed);
    }

    #[test]
    fn test_decode_tolerates_runtime_log_prefix() {
        let encoded = encode(&ok_record()).unwrap();
        let line = format!(
            "2023-02-09T14:12:59.574Z\t7b9025e7-7a6b-4a2b-a5e0-fb5d42a4c2b6\tINFO\t{encoded}\n"
        );
        assert_eq!(decode(&line).unwrap(), ok_record());
    }

    #[test]
    fn test_decode_ignores_trailing_newline() {
        let encoded = encode(&ok_record()).unwrap();
        assert_eq!(decode(&format!("{encoded}\n")).unwrap(), ok_record());
    }

    #[test]
    fn test_too_few_segments() {
        let error = decode("firetail:payload").unwrap_err();
        assert!(matches!(error, DecodeError::MalformedToken { segments: 2 }));
        assert_eq!(error.to_string(), "record had 2 parts when split by ':'");
    }

    #[test]
    fn test_trailing_segments_are_rejected() {
        let encoded = encode(&ok_record()).unwrap();
        let error = decode(&format!("{encoded}:extra")).unwrap_err();
        assert!(matches!(error, DecodeError::MalformedToken { segments: 4 }));
        assert_eq!(error.to_string(), "record had 4 parts when split by ':'");
    }

    #[test]
    fn test_wrong_namespace() {
        let error = decode("tailfire:log-ext:e30=").unwrap_err();
        assert!(matches!(error, DecodeError::NamespaceMismatch { .. }));
    }

    #[test]
    fn test_wrong_schema_token() {
        let error = decode("firetail:ext-log:e30=").unwrap_err();
        assert!(matches!(error, DecodeError::SchemaTokenMismatch { .. }));
    }

    #[test]
    fn test_invalid_base64() {
        let error = decode("firetail:log-ext:not base64!").unwrap_err();
        assert!(matches!(error, DecodeError::Encoding(_)));
    }

    #[test]
    fn test_invalid_payload_types() {
        let token = format!(
            "firetail:log-ext:{}",
            payload_of(json!({
                "event": "my birthday party",
                "response": 0,
                "execution_time": "tomorrow"
            }))
        );
        let error = decode(&token).unwrap_err();
        assert!(matches!(
            error,
            DecodeError::Unmarshal(UnmarshalError::Envelope(_))
        ));
    }

    #[test]
    fn test_unrecognized_event_shape() {
        let token = format!(
            "firetail:log-ext:{}",
            payload_of(json!({
                "event": {"Records": []},
                "response": {"statusCode": 200}
            }))
        );
        let error = decode(&token).unwrap_err();
        let DecodeError::Unmarshal(UnmarshalError::UnrecognizedEvent { reasons }) = error else {
            panic!("expected an unrecognized event, got {error:?}");
        };
        assert_eq!(reasons.len(), 2);
    }

    fn arb_record() -> impl Strategy<Value = InvocationRecord> {
        (
            any::<i64>(),
            ".*",
            prop::collection::btree_map("[A-Za-z-]{1,16}", ".*", 0..4),
            0.0f64..1.0e6,
        )
            .prop_map(|(status_code, body, headers, execution_time)| InvocationRecord {
                event: None,
                response: InvocationResponse {
                    status_code,
                    body,
                    headers,
                },
                execution_time,
            })
    }

    proptest! {
        #[test]
        fn test_round_trip(record in arb_record()) {
            let decoded = decode(&encode(&record).unwrap()).unwrap();
            prop_assert_eq!(&decoded.response, &record.response);
            prop_assert_eq!(decoded.execution_time, record.execution_time);
        }

        #[test]
        fn test_prefix_tolerance(record in arb_record(), prefix in "[a-z0-9 ]{0,12}") {
            let encoded = encode(&record).unwrap();
            let decoded = decode(&format!("{prefix}:{encoded}")).unwrap();
            prop_assert_eq!(decoded, decode(&encoded).unwrap());
        }
    }
}
