//! lokiwatch-core — shared types for the lokiwatch service.
//!
//! Everything the engine, the Loki adapter, the metrics adapter, and the
//! daemon need to agree on lives here: identifiers, the two clocks
//! (event time vs. observation time), server status codes, the gauge
//! catalogue, and the `lokiwatch.toml` configuration.

pub mod config;
pub mod encoding;
pub mod error;
pub mod gauges;
pub mod types;

pub use config::{WatchConfig, parse_duration};
pub use error::{ConfigError, ConfigResult};
pub use gauges::{GaugeSnapshot, GaugeSpec, LabelSet};
pub use types::*;
