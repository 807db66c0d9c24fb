//! Backoff between failed cycles.

use std::time::Duration;

use lokiwatch_core::config::PollConfig;

/// Exponential backoff with a cap and a failure budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub base: Duration,
    pub cap: Duration,
    pub max_failures: u32,
}

impl RetryPolicy {
    pub fn from_config(config: &PollConfig) -> Self {
        Self {
            base: config.backoff_base,
            cap: config.backoff_cap,
            max_failures: config.max_consecutive_failures,
        }
    }

    /// Delay after the `failures`-th consecutive failure:
    /// `min(base * 2^(failures - 1), cap)`.
    pub fn backoff(&self, failures: u32) -> Duration {
        if failures == 0 {
            return Duration::ZERO;
        }
        let factor = 2u32.checked_pow(failures - 1).unwrap_or(u32::MAX);
        self.base.checked_mul(factor).unwrap_or(self.cap).min(self.cap)
    }

    pub fn exhausted(&self, failures: u32) -> bool {
        failures >= self.max_failures
    }
}
