//! End-to-end poll cycles against in-memory sources and sinks.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;

use lokiwatch_core::config::{PollConfig, TimeoutConfig};
use lokiwatch_core::{ObservedAt, ServerStatus};
use lokiwatch_engine::HealthEngine;
use lokiwatch_loki::{LokiError, LokiResult, ParsedResponse, Payload, RawRecord};
use lokiwatch_metrics::{GaugeRegistry, MetricsSink, SinkError, render_prometheus};
use lokiwatch_poller::{CycleError, LogSource, PollDriver};

const SEC: i64 = 1_000_000_000;
const NOW: i64 = 1_700_000_000 * SEC;

// ── Fakes ─────────────────────────────────────────────────────────

#[derive(Default)]
struct FakeSource {
    responses: Mutex<VecDeque<LokiResult<ParsedResponse>>>,
    windows: Mutex<Vec<(ObservedAt, ObservedAt)>>,
    /// Signalled when the scripted responses run out.
    on_empty: Option<watch::Sender<bool>>,
}

impl FakeSource {
    fn scripted(responses: Vec<LokiResult<ParsedResponse>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            ..Default::default()
        }
    }

    fn calls(&self) -> usize {
        self.windows.lock().unwrap().len()
    }
}

impl LogSource for FakeSource {
    async fn fetch(&self, start: ObservedAt, end: ObservedAt) -> LokiResult<ParsedResponse> {
        self.windows.lock().unwrap().push((start, end));
        let next = self.responses.lock().unwrap().pop_front();
        match next {
            Some(response) => response,
            None => {
                if let Some(tx) = &self.on_empty {
                    let _ = tx.send(true);
                }
                Ok(ParsedResponse::default())
            }
        }
    }
}

#[derive(Clone, Default)]
struct FakeSink {
    pushed: Arc<Mutex<Vec<String>>>,
    fail: bool,
}

impl MetricsSink for FakeSink {
    async fn push(&self, registry: &GaugeRegistry) -> Result<(), SinkError> {
        if self.fail {
            return Err(SinkError::Request("connection refused".to_string()));
        }
        self.pushed.lock().unwrap().push(render_prometheus(registry));
        Ok(())
    }
}

// ── Helpers ───────────────────────────────────────────────────────

fn line(server: &str, project: &str, kind: i64) -> String {
    format!(r#"{{"serverid":"{server}","projectkey":"{project}","messagetypeid":{kind}}}"#)
}

fn record(ts: i64, line: &str) -> RawRecord {
    RawRecord {
        timestamp: ts.to_string(),
        labels: BTreeMap::from([("app".to_string(), "otel-collector".to_string())]),
        payload: Payload::from_line(line),
    }
}

fn response(records: Vec<RawRecord>) -> LokiResult<ParsedResponse> {
    Ok(ParsedResponse {
        records,
        parse_errors: 0,
    })
}

fn start_and_flow() -> LokiResult<ParsedResponse> {
    response(vec![
        record(NOW - 120 * SEC, &line("s1", "p1", 1)),
        record(NOW - 60 * SEC, &line("s1", "p1", 5)),
    ])
}

fn refused() -> LokiResult<ParsedResponse> {
    Err(LokiError::Request("connection refused".to_string()))
}

fn driver(source: FakeSource, sink: FakeSink) -> PollDriver<FakeSource, FakeSink> {
    PollDriver::new(
        source,
        sink,
        HealthEngine::new(TimeoutConfig::default()),
        &PollConfig::default(),
    )
}

// ── run_cycle ─────────────────────────────────────────────────────

#[tokio::test]
async fn cycle_ingests_sweeps_and_publishes() {
    let sink = FakeSink::default();
    let mut driver = driver(FakeSource::scripted(vec![start_and_flow()]), sink.clone());

    let report = driver.run_cycle(ObservedAt::from_nanos(NOW)).await.unwrap();
    assert_eq!(report.fetched, 2);
    assert_eq!(report.decode.decoded, 2);
    assert_eq!(report.ingest.applied, 2);
    assert_eq!(report.sweep.transitions(), 0);
    assert!(report.published);
    assert_eq!(report.series, driver.registry().len());

    let session = driver.engine().session("s1").unwrap();
    assert_eq!(session.status, ServerStatus::Running);
    assert_eq!(session.flow_count, 1);

    let pushed = sink.pushed.lock().unwrap();
    assert_eq!(pushed.len(), 1);
    assert!(pushed[0].contains("server_count{projectkey=\"p1\"} 1\n"));
    assert!(pushed[0].contains("flows_last_hour{projectkey=\"p1\",serverid=\"s1\"} 1\n"));
    assert!(pushed[0].contains("server_status{projectkey=\"p1\",serverid=\"s1\",status=\"Running\"} 1\n"));
}

#[tokio::test]
async fn cycle_queries_trailing_window() {
    let mut driver = driver(FakeSource::scripted(vec![]), FakeSink::default());
    driver.run_cycle(ObservedAt::from_nanos(NOW)).await.unwrap();

    let windows = driver.source().windows.lock().unwrap().clone();
    assert_eq!(
        windows,
        vec![(ObservedAt::from_nanos(NOW - 300 * SEC), ObservedAt::from_nanos(NOW))]
    );
}

#[tokio::test]
async fn next_cycle_resumes_after_newest_accepted_event() {
    let mut driver = driver(FakeSource::scripted(vec![start_and_flow()]), FakeSink::default());
    driver.run_cycle(ObservedAt::from_nanos(NOW)).await.unwrap();

    let next = ObservedAt::from_nanos(NOW + 60 * SEC);
    let report = driver.run_cycle(next).await.unwrap();
    assert_eq!(report.window_start, ObservedAt::from_nanos(NOW - 60 * SEC + 1));

    let windows = driver.source().windows.lock().unwrap().clone();
    assert_eq!(windows[1], (ObservedAt::from_nanos(NOW - 60 * SEC + 1), next));

    // Once the newest event falls out of the window, the window wins.
    let much_later = ObservedAt::from_nanos(NOW + 3600 * SEC);
    assert_eq!(driver.fetch_start(much_later), much_later.saturating_sub(Duration::from_secs(300)));
}

#[tokio::test]
async fn incomplete_records_are_dropped_before_the_engine() {
    let source = FakeSource::scripted(vec![Ok(ParsedResponse {
        records: vec![
            record(NOW - 30 * SEC, r#"{"serverid":"s1","projectkey":"p1"}"#),
            record(NOW - 20 * SEC, "Body: Map(truncated"),
            record(NOW - 10 * SEC, &line("s2", "p2", 1)),
        ],
        parse_errors: 1,
    })]);
    let mut driver = driver(source, FakeSink::default());

    let report = driver.run_cycle(ObservedAt::from_nanos(NOW)).await.unwrap();
    assert_eq!(report.parse_errors, 1);
    assert_eq!(report.decode.decoded, 1);
    assert_eq!(report.decode.dropped, 2);
    assert!(driver.engine().session("s1").is_none());
    assert!(driver.engine().session("s2").is_some());
}

#[tokio::test]
async fn replayed_window_is_counted_as_duplicates() {
    let source = FakeSource::scripted(vec![start_and_flow(), start_and_flow()]);
    let mut driver = driver(source, FakeSink::default());

    driver.run_cycle(ObservedAt::from_nanos(NOW)).await.unwrap();
    let before = driver.registry().clone();

    let report = driver
        .run_cycle(ObservedAt::from_nanos(NOW + 60 * SEC))
        .await
        .unwrap();
    assert_eq!(report.ingest.applied, 0);
    assert_eq!(report.ingest.duplicates, 2);
    assert_eq!(driver.engine().session("s1").unwrap().flow_count, 1);
    assert_eq!(driver.registry(), &before);
}

#[tokio::test]
async fn fetch_failure_leaves_engine_untouched() {
    let sink = FakeSink::default();
    let source = FakeSource::scripted(vec![start_and_flow(), refused()]);
    let mut driver = driver(source, sink.clone());

    driver.run_cycle(ObservedAt::from_nanos(NOW)).await.unwrap();
    let watermark = driver.engine().watermark();

    // Far enough out that a sweep would have reset the server.
    let later = ObservedAt::from_nanos(NOW + 4 * 3600 * SEC);
    let err = driver.run_cycle(later).await.unwrap_err();
    assert!(matches!(err, CycleError::Fetch(LokiError::Request(_))));

    assert_eq!(driver.engine().watermark(), watermark);
    assert_eq!(driver.engine().session("s1").unwrap().status, ServerStatus::Running);
    assert_eq!(sink.pushed.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn publish_failure_keeps_engine_state() {
    let sink = FakeSink {
        fail: true,
        ..Default::default()
    };
    let mut driver = driver(FakeSource::scripted(vec![start_and_flow()]), sink);

    let report = driver.run_cycle(ObservedAt::from_nanos(NOW)).await.unwrap();
    assert!(!report.published);
    assert_eq!(driver.engine().server_count(), 1);
    assert!(!driver.registry().is_empty());
}

// ── run ───────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn run_gives_up_after_max_consecutive_failures() {
    let source = FakeSource::scripted((0..5).map(|_| refused()).collect());
    let mut driver = driver(source, FakeSink::default());
    let (_tx, rx) = watch::channel(false);

    let err = driver.run(rx).await.unwrap_err();
    assert!(matches!(err, CycleError::Exhausted { failures: 3, .. }), "{err}");
    assert_eq!(driver.source().calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn run_recovers_and_stops_on_shutdown() {
    let (tx, rx) = watch::channel(false);
    let source = FakeSource {
        responses: Mutex::new(VecDeque::from([refused(), start_and_flow()])),
        on_empty: Some(tx),
        ..Default::default()
    };
    let sink = FakeSink::default();
    let mut driver = driver(source, sink.clone());

    let started = tokio::time::Instant::now();
    driver.run(rx).await.unwrap();

    assert_eq!(driver.source().calls(), 3);
    assert_eq!(sink.pushed.lock().unwrap().len(), 2);
    // One backoff after the failure, one interval after the recovery.
    assert!(started.elapsed() >= Duration::from_secs(60 + 60));
}

#[tokio::test]
async fn run_does_nothing_once_shutdown_is_set() {
    let (tx, rx) = watch::channel(false);
    tx.send(true).unwrap();

    let mut driver = driver(FakeSource::scripted(vec![start_and_flow()]), FakeSink::default());
    driver.run(rx).await.unwrap();
    assert_eq!(driver.source().calls(), 0);
}
