//! lokiwatch-metrics — getting engine state out to Prometheus.
//!
//! # Architecture
//!
//! ```text
//! GaugeSnapshot (from the engine)
//!   └── publish_snapshot() → GaugeRegistry   (publish(name, labels, value))
//!         └── render_prometheus() → text exposition
//!               └── MetricsSink::push()     (PushGateway: PUT /metrics/job/<job>)
//! ```
//!
//! The registry is a plain value owned by whoever runs the poll loop;
//! there is no global metric state.

pub mod error;
pub mod prometheus;
pub mod registry;
pub mod sink;

pub use error::SinkError;
pub use prometheus::render_prometheus;
pub use registry::{GaugeRegistry, publish_snapshot};
pub use sink::{MetricsSink, PushGateway};
