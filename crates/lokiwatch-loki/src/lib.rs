//! lokiwatch-loki — reading lifecycle events out of Loki.
//!
//! ```text
//! LokiClient::query_range(start, end)
//!   └── parse_query_response() → Vec<RawRecord>   (one per stream value)
//!         └── decode_record() → LogEvent | DecodeError
//! ```
//!
//! Transport failures surface as [`LokiError`]; per-record problems are
//! [`DecodeError`]s that the caller counts and drops.

pub mod client;
pub mod decoder;
pub mod error;
pub mod response;

pub use client::LokiClient;
pub use decoder::{DecodeStats, Payload, RawRecord, decode_all, decode_record};
pub use error::{DecodeError, LokiError, LokiResult};
pub use response::{ParsedResponse, parse_query_response};
