// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use reqwest::StatusCode;
use std::fmt;

/// Failure to turn an encoded token into an [`InvocationRecord`](crate::record::InvocationRecord).
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("record had {segments} parts when split by ':'")]
    MalformedToken { segments: usize },

    #[error("record did not have firetail prefix, found {found:?}")]
    NamespaceMismatch { found: String },

    #[error("firetail prefixed record did not have valid token, found {found:?}")]
    SchemaTokenMismatch { found: String },

    #[error("failed to b64 decode firetail record: {0}")]
    Encoding(#[from] base64::DecodeError),

    #[error("failed to unmarshal firetail record: {0}")]
    Unmarshal(#[from] UnmarshalError),
}

#[derive(Debug, thiserror::Error)]
pub enum UnmarshalError {
    #[error("{0}")]
    Envelope(#[from] serde_json::Error),

    #[error("event did not match any known shape: {}", join_reasons(.reasons))]
    UnrecognizedEvent { reasons: Vec<ShapeMismatch> },
}

/// Why a request event could not be read as one particular gateway shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShapeMismatch {
    pub shape: &'static str,
    pub reason: String,
}

impl fmt::Display for ShapeMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.shape, self.reason)
    }
}

fn join_reasons(reasons: &[ShapeMismatch]) -> String {
    reasons
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, thiserror::Error)]
pub enum ConversionError {
    #[error("record has no request event")]
    MissingEvent,

    #[error("{0}")]
    UnrecognizedEvent(#[from] UnmarshalError),

    #[error("failed to serialize log entry: {0}")]
    Serialize(serde_json::Error),
}

/// Every failure a record can hit between the log line and the Firetail API.
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("log line has type {kind:?}, only \"function\" lines carry records")]
    WrongKind { kind: String },

    #[error("log line is not a valid log message: {0}")]
    InvalidLogLine(serde_json::Error),

    #[error("log line record is not a JSON string: {0}")]
    RecordNotString(serde_json::Error),

    #[error("failed to read logs API request body: {0}")]
    RequestBody(String),

    #[error("invocation event is not valid JSON: {0}")]
    InvalidEvent(serde_json::Error),

    #[error("invocation response is not a valid response object: {0}")]
    InvalidResponse(serde_json::Error),

    #[error("failed to convert record to log entry: {0}")]
    Conversion(#[from] ConversionError),

    #[error("failed to send records to firetail api: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("got err response from firetail api, status {status}: {body}")]
    SinkRejection { status: StatusCode, body: String },

    #[error("record queue is closed")]
    QueueClosed,
}

impl RecordError {
    /// Whether this is just a function log line that was never a record. Anything else means a
    /// record was lost.
    pub fn is_ordinary_log_line(&self) -> bool {
        matches!(
            self,
            RecordError::Decode(_) | RecordError::WrongKind { .. } | RecordError::RecordNotString(_)
        )
    }
}

/// A set of errors collected over one unit of work, reported together.
#[derive(Debug, Default)]
pub struct ErrorList(Vec<RecordError>);

impl ErrorList {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, error: impl Into<RecordError>) {
        self.0.push(error.into());
    }

    pub fn append(&mut self, other: ErrorList) {
        self.0.extend(other.0);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, RecordError> {
        self.0.iter()
    }
}

impl From<RecordError> for ErrorList {
    fn from(error: RecordError) -> Self {
        Self(vec![error])
    }
}

impl From<Vec<RecordError>> for ErrorList {
    fn from(errors: Vec<RecordError>) -> Self {
        Self(errors)
    }
}

impl IntoIterator for ErrorList {
    type Item = RecordError;
    type IntoIter = std::vec::IntoIter<RecordError>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl fmt::Display for ErrorList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.len() {
            1 => write!(f, "1 error occurred:")?,
            n => write!(f, "{n} errors occurred:")?,
        }
        for error in &self.0 {
            write!(f, "\n\t* {error}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ErrorList {}
