//! Parsing of Loki `query_range` responses.
//!
//! A streams response looks like:
//!
//! ```text
//! {"status":"success","data":{"resultType":"streams","result":[
//!   {"stream":{"app":"otel-collector",...},"values":[["<ns>","<line>"],...]}
//! ]}}
//! ```
//!
//! Each `[ns, line]` pair becomes one [`RawRecord`], in stream order and
//! then value order.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::decoder::{Payload, RawRecord};
use crate::error::LokiResult;

#[derive(Debug, Deserialize)]
struct QueryRangeResponse {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    data: Option<QueryData>,
}

#[derive(Debug, Deserialize)]
struct QueryData {
    #[serde(rename = "resultType", default)]
    result_type: Option<String>,
    #[serde(default)]
    result: Option<Vec<StreamResult>>,
}

#[derive(Debug, Deserialize)]
struct StreamResult {
    #[serde(default)]
    stream: BTreeMap<String, String>,
    #[serde(default)]
    values: Vec<Value>,
}

/// Records extracted from a response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedResponse {
    pub records: Vec<RawRecord>,
    /// Values that were not `[ts, line]` pairs or whose line was not JSON.
    pub parse_errors: usize,
}

/// Parse a `query_range` response body.
///
/// Fails only if the body is not JSON at all. A response without
/// `data.result` yields no records.
pub fn parse_query_response(body: &[u8]) -> LokiResult<ParsedResponse> {
    let response: QueryRangeResponse = serde_json::from_slice(body)?;

    let Some(streams) = response.data.and_then(|d| {
        if let Some(kind) = d.result_type.as_deref() {
            if kind != "streams" {
                warn!(result_type = kind, "unexpected loki result type");
            }
        }
        d.result
    }) else {
        warn!(status = ?response.status, "no results found in loki response");
        return Ok(ParsedResponse::default());
    };

    debug!(streams = streams.len(), "parsing result streams");
    let mut parsed = ParsedResponse::default();

    for stream in streams {
        debug!(labels = ?stream.stream, values = stream.values.len(), "processing stream");
        for value in stream.values {
            let Some((timestamp, line)) = as_pair(&value) else {
                warn!(value = %value, "skipping malformed stream value");
                parsed.parse_errors += 1;
                continue;
            };

            let payload = Payload::from_line(line);
            if let Payload::Opaque(_) = payload {
                warn!(%timestamp, "failed to parse log line as JSON");
                parsed.parse_errors += 1;
            }

            parsed.records.push(RawRecord {
                timestamp: timestamp.to_string(),
                labels: stream.stream.clone(),
                payload,
            });
        }
    }

    if parsed.parse_errors > 0 {
        warn!(
            parse_errors = parsed.parse_errors,
            records = parsed.records.len(),
            "encountered parsing errors"
        );
    } else {
        info!(records = parsed.records.len(), "parsed log records without errors");
    }
    Ok(parsed)
}

fn as_pair(value: &Value) -> Option<(&str, &str)> {
    match value.as_array()?.as_slice() {
        [Value::String(ts), Value::String(line)] => Some((ts.as_str(), line.as_str())),
        _ => None,
    }
}
