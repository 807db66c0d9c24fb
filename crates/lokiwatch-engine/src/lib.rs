//! lokiwatch-engine — in-memory health state for servers and projects.
//!
//! Ingests decoded lifecycle events and keeps one session per server,
//! a derived status per project, and rolling one-hour counters. Time
//! based transitions run in [`HealthEngine::sweep_timeouts`], so a
//! silent server still ages into `Unresponsive` and then `Stopped`.
//!
//! # Architecture
//!
//! ```text
//! HealthEngine
//!   ├── ingest(event, now)   ← one call per decoded event, in order
//!   │   ├── watermark dedup (global, strictly increasing)
//!   │   ├── get_or_create → ServerSession
//!   │   └── refresh project status on change
//!   ├── sweep_timeouts(now)  ← once per cycle, wall clock driven
//!   │   ├── * → Stopped after long silence
//!   │   ├── Error → Running after error timeout
//!   │   ├── Running/Error → Unresponsive after silence
//!   │   └── prune history older than the rolling window
//!   └── snapshot()           → GaugeSnapshot for the publisher
//! ```
//!
//! The engine is single-writer and synchronous. It never fails: bad
//! input is reported through [`IngestOutcome`] and logged.

pub mod engine;
pub mod project;
pub mod session;

pub use engine::{HealthEngine, IngestOutcome, IngestTally, SweepReport};
pub use project::ProjectStatusCounts;
pub use session::{EventHistory, HistoryEntry, HistoryKind, ROLLING_WINDOW, RollingCounts, ServerSession};
