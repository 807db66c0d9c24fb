//! The poll loop.

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use lokiwatch_core::ObservedAt;
use lokiwatch_core::config::PollConfig;
use lokiwatch_engine::{HealthEngine, IngestTally, SweepReport};
use lokiwatch_loki::{DecodeStats, decode_all};
use lokiwatch_metrics::{GaugeRegistry, MetricsSink, publish_snapshot};

use crate::error::CycleError;
use crate::retry::RetryPolicy;
use crate::source::LogSource;

/// What one cycle did.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub window_start: ObservedAt,
    pub window_end: ObservedAt,
    /// Records returned by the source.
    pub fetched: usize,
    /// Lines the source could not parse as JSON.
    pub parse_errors: usize,
    pub decode: DecodeStats,
    pub ingest: IngestTally,
    pub sweep: SweepReport,
    /// Gauge series in the registry after the snapshot.
    pub series: usize,
    /// Whether the sink accepted the push.
    pub published: bool,
}

/// Owns the engine and the registry and drives them from a source to a
/// sink.
pub struct PollDriver<S, K> {
    source: S,
    sink: K,
    engine: HealthEngine,
    registry: GaugeRegistry,
    interval: Duration,
    window: Duration,
    retry: RetryPolicy,
}

impl<S: LogSource, K: MetricsSink> PollDriver<S, K> {
    pub fn new(source: S, sink: K, engine: HealthEngine, poll: &PollConfig) -> Self {
        Self {
            source,
            sink,
            engine,
            registry: GaugeRegistry::new(),
            interval: poll.interval,
            window: poll.window,
            retry: RetryPolicy::from_config(poll),
        }
    }

    pub fn engine(&self) -> &HealthEngine {
        &self.engine
    }

    pub fn registry(&self) -> &GaugeRegistry {
        &self.registry
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Start of the fetch range for a cycle ending at `now`.
    ///
    /// The trailing window, narrowed to begin just past the newest accepted
    /// event so a `limit`-capped forward query keeps advancing.
    pub fn fetch_start(&self, now: ObservedAt) -> ObservedAt {
        let window_start = now.saturating_sub(self.window);
        // Loki stamps and the wall clock are both epoch nanoseconds.
        let resume = ObservedAt::from_nanos(self.engine.watermark().as_nanos().saturating_add(1));
        window_start.max(resume).min(now)
    }

    /// Run one cycle over `[fetch_start(now), now]`.
    ///
    /// A failed fetch returns before the engine is touched. A failed push
    /// is logged and reported; engine state from this cycle stays.
    pub async fn run_cycle(&mut self, now: ObservedAt) -> Result<CycleReport, CycleError> {
        let window_start = self.fetch_start(now);
        debug!(start = %window_start, end = %now, "fetching events");

        let response = self.source.fetch(window_start, now).await?;
        let (events, decode) = decode_all(&response.records);

        let ingest = self.engine.ingest_batch(&events, now);
        let sweep = self.engine.sweep_timeouts(now);

        let snapshot = self.engine.snapshot();
        let series = publish_snapshot(&snapshot, &mut self.registry);

        let published = match self.sink.push(&self.registry).await {
            Ok(()) => true,
            Err(e) => {
                error!(error = %e, "failed to publish metrics");
                false
            }
        };

        let report = CycleReport {
            window_start,
            window_end: now,
            fetched: response.records.len(),
            parse_errors: response.parse_errors,
            decode,
            ingest,
            sweep,
            series,
            published,
        };

        info!(
            fetched = report.fetched,
            decoded = decode.decoded,
            dropped = decode.dropped,
            applied = ingest.applied,
            duplicates = ingest.duplicates,
            unrecognized = ingest.unrecognized,
            transitions = sweep.transitions(),
            servers = self.engine.server_count(),
            series,
            published,
            "poll cycle complete"
        );

        Ok(report)
    }

    /// Run cycles until shutdown or until the failure budget is spent.
    ///
    /// Cycle starts are `interval` apart regardless of how long a cycle
    /// takes. After a failed cycle the next one waits for the backoff
    /// delay instead.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> Result<(), CycleError> {
        info!(
            interval_secs = self.interval.as_secs(),
            window_secs = self.window.as_secs(),
            "poll loop started"
        );

        let mut failures: u32 = 0;

        loop {
            if *shutdown.borrow() {
                break;
            }

            let started = Instant::now();
            let delay = match self.run_cycle(ObservedAt::now()).await {
                Ok(_) => {
                    if failures > 0 {
                        info!(failures, "poll cycle recovered");
                        failures = 0;
                    }
                    self.interval.saturating_sub(started.elapsed())
                }
                Err(e) => {
                    failures += 1;
                    if self.retry.exhausted(failures) {
                        error!(failures, error = %e, "too many consecutive failures, stopping");
                        return Err(CycleError::Exhausted {
                            failures,
                            last: e.to_string(),
                        });
                    }
                    let backoff = self.retry.backoff(failures);
                    warn!(
                        failures,
                        max = self.retry.max_failures,
                        retry_in_secs = backoff.as_secs(),
                        error = %e,
                        "poll cycle failed"
                    );
                    backoff
                }
            };

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.changed() => {
                    info!("poll loop shutting down");
                    break;
                }
            }
        }

        Ok(())
    }
}
