//! lokiwatch-poller — the poll cycle.
//!
//! ```text
//! PollDriver::run(shutdown)
//!   └── every interval: run_cycle(now)
//!         ├── LogSource::fetch([now - window, now])
//!         ├── decode_all → HealthEngine::ingest_batch
//!         ├── HealthEngine::sweep_timeouts(now)
//!         └── snapshot → publish_snapshot → MetricsSink::push
//! ```
//!
//! Cycles are strictly sequential. Shutdown interrupts the wait between
//! cycles, never a cycle in progress.

pub mod driver;
pub mod error;
pub mod retry;
pub mod source;

pub use driver::{CycleReport, PollDriver};
pub use error::CycleError;
pub use retry::RetryPolicy;
pub use source::LogSource;
