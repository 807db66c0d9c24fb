//! Error types for the Loki adapter.

use std::time::Duration;

use thiserror::Error;

/// Result type alias for Loki queries.
pub type LokiResult<T> = Result<T, LokiError>;

/// A query that failed as a whole. The cycle that issued it is skipped.
#[derive(Debug, Error)]
pub enum LokiError {
    #[error("invalid request uri: {0}")]
    InvalidUri(String),

    #[error("query timed out after {0:?}")]
    Timeout(Duration),

    #[error("request failed: {0}")]
    Request(String),

    #[error("loki returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("failed to read response body: {0}")]
    Body(String),

    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),
}

/// A single record that cannot become an event. Dropped, counted, logged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("payload is not JSON: {0:?}")]
    OpaquePayload(String),

    #[error("payload is not a JSON object")]
    NotAnObject,

    #[error("missing field {0}")]
    MissingField(&'static str),

    #[error("invalid value for {field}: {value}")]
    InvalidField { field: &'static str, value: String },

    #[error("invalid timestamp {0:?}")]
    InvalidTimestamp(String),
}
