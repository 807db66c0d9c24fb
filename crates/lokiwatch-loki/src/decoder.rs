//! Raw Loki records → typed lifecycle events.

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::{debug, warn};

use lokiwatch_core::{EventTime, LogEvent, MessageKind};

use crate::error::DecodeError;

const SERVER_ID_FIELD: &str = "serverid";
const PROJECT_KEY_FIELD: &str = "projectkey";
const MESSAGE_TYPE_FIELD: &str = "messagetypeid";

/// Log line contents of a record.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// The line parsed as JSON.
    Json(Value),
    /// The line did not parse; kept verbatim and never decoded.
    Opaque(String),
}

impl Payload {
    /// Parse a log line, falling back to opaque text.
    pub fn from_line(line: &str) -> Self {
        match serde_json::from_str(line) {
            Ok(value) => Payload::Json(value),
            Err(_) => Payload::Opaque(line.to_string()),
        }
    }
}

/// One value of one Loki stream.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord {
    /// Nanosecond epoch timestamp as Loki returns it (a decimal string).
    pub timestamp: String,
    /// Labels of the stream the value came from.
    pub labels: BTreeMap<String, String>,
    pub payload: Payload,
}

/// Counters for one decode pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DecodeStats {
    pub decoded: usize,
    pub dropped: usize,
}

/// Decode a single record into an event.
pub fn decode_record(record: &RawRecord) -> Result<LogEvent, DecodeError> {
    let fields = match &record.payload {
        Payload::Json(Value::Object(map)) => map,
        Payload::Json(_) => return Err(DecodeError::NotAnObject),
        Payload::Opaque(text) => return Err(DecodeError::OpaquePayload(truncate(text, 200))),
    };

    let server_id = string_field(fields, SERVER_ID_FIELD)?;
    let project_key = string_field(fields, PROJECT_KEY_FIELD)?;
    let message_type = integer_field(fields, MESSAGE_TYPE_FIELD)?;
    let timestamp = parse_timestamp(&record.timestamp)?;

    Ok(LogEvent {
        timestamp,
        server_id,
        project_key,
        kind: MessageKind::from_code(message_type),
    })
}

/// Decode records in order, dropping (and logging) the ones that fail.
pub fn decode_all(records: &[RawRecord]) -> (Vec<LogEvent>, DecodeStats) {
    let mut stats = DecodeStats::default();
    let mut events = Vec::with_capacity(records.len());

    for record in records {
        match decode_record(record) {
            Ok(event) => {
                stats.decoded += 1;
                events.push(event);
            }
            Err(e) => {
                stats.dropped += 1;
                warn!(error = %e, timestamp = %record.timestamp, "dropping incomplete log record");
                debug!(payload = ?record.payload, labels = ?record.labels, "dropped record");
            }
        }
    }

    (events, stats)
}

fn parse_timestamp(raw: &str) -> Result<EventTime, DecodeError> {
    raw.trim()
        .parse::<i64>()
        .map(EventTime::from_nanos)
        .map_err(|_| DecodeError::InvalidTimestamp(raw.to_string()))
}

/// A present, non-null field rendered as a string. Numbers are accepted
/// and rendered in decimal.
fn string_field(fields: &serde_json::Map<String, Value>, name: &'static str) -> Result<String, DecodeError> {
    match fields.get(name) {
        None | Some(Value::Null) => Err(DecodeError::MissingField(name)),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        Some(other) => Err(DecodeError::InvalidField {
            field: name,
            value: other.to_string(),
        }),
    }
}

/// A present integer field. Numeric strings are accepted.
fn integer_field(fields: &serde_json::Map<String, Value>, name: &'static str) -> Result<i64, DecodeError> {
    let invalid = |v: &Value| DecodeError::InvalidField {
        field: name,
        value: v.to_string(),
    };
    match fields.get(name) {
        None | Some(Value::Null) => Err(DecodeError::MissingField(name)),
        Some(v @ Value::Number(n)) => n.as_i64().ok_or_else(|| invalid(v)),
        Some(v @ Value::String(s)) => s.trim().parse().map_err(|_| invalid(v)),
        Some(other) => Err(invalid(other)),
    }
}

fn truncate(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
