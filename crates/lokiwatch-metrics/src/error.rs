//! Error types for gauge publication.

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("unknown gauge {0}")]
    UnknownGauge(String),

    #[error("gauge {gauge} expects labels {expected:?}, got {got:?}")]
    LabelMismatch {
        gauge: &'static str,
        expected: &'static [&'static str],
        got: Vec<String>,
    },

    #[error("invalid push uri: {0}")]
    InvalidUri(String),

    #[error("push timed out after {0:?}")]
    Timeout(Duration),

    #[error("push request failed: {0}")]
    Request(String),

    #[error("pushgateway returned {status}: {body}")]
    Status { status: u16, body: String },
}
