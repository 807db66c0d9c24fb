//! Error types for the poll cycle.

use thiserror::Error;

use lokiwatch_loki::LokiError;

#[derive(Debug, Error)]
pub enum CycleError {
    /// The fetch failed; the engine was not touched this cycle.
    #[error("fetch failed: {0}")]
    Fetch(#[from] LokiError),

    #[error("giving up after {failures} consecutive failed cycles: {last}")]
    Exhausted { failures: u32, last: String },
}
