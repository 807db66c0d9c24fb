//! Lifecycle scenarios for the health engine.
//!
//! Each test drives the engine through public calls only, with explicit
//! event and wall-clock times.

use std::time::Duration;

use lokiwatch_core::config::TimeoutConfig;
use lokiwatch_core::{EventTime, LabelSet, LogEvent, MessageKind, ObservedAt, ServerStatus};
use lokiwatch_engine::{HealthEngine, IngestOutcome, ProjectStatusCounts};

const SEC: i64 = 1_000_000_000;
const MIN: i64 = 60 * SEC;
const HOUR: i64 = 60 * MIN;
const T0: i64 = 1_720_000_000 * SEC;

fn timeouts() -> TimeoutConfig {
    TimeoutConfig {
        error: Duration::from_secs(3600),
        unresponsive: Duration::from_secs(300),
        reset: Duration::from_secs(3 * 3600),
    }
}

fn event(offset: i64, server: &str, project: &str, kind: MessageKind) -> LogEvent {
    LogEvent::new(EventTime::from_nanos(T0 + offset), server, project, kind)
}

fn wall(offset: i64) -> ObservedAt {
    ObservedAt::from_nanos(T0 + offset)
}

fn status(engine: &HealthEngine, server: &str) -> ServerStatus {
    engine.session(server).map(|s| s.status).unwrap()
}

#[test]
fn error_then_recovery_after_error_timeout() {
    let mut engine = HealthEngine::new(timeouts());

    engine.ingest(&event(0, "S1", "P1", MessageKind::Start), wall(0));
    assert_eq!(status(&engine, "S1"), ServerStatus::Running);
    assert_eq!(engine.session("S1").unwrap().error_count, 0);

    let entered = wall(10);
    engine.ingest(&event(10, "S1", "P1", MessageKind::Error), entered);
    assert_eq!(status(&engine, "S1"), ServerStatus::Error);
    assert_eq!(engine.session("S1").unwrap().error_count, 1);
    assert_eq!(engine.session("S1").unwrap().error_entered_at, Some(entered));

    let sweep_at = entered.saturating_add(Duration::from_secs(3600 + 1));
    let report = engine.sweep_timeouts(sweep_at);
    assert_eq!(report.recovered, 1);
    assert_eq!(status(&engine, "S1"), ServerStatus::Running);
}

#[test]
fn silence_goes_unresponsive_then_stopped_and_cleared() {
    let mut engine = HealthEngine::new(timeouts());
    engine.ingest(&event(0, "S1", "P1", MessageKind::Start), wall(0));
    engine.ingest(&event(MIN, "S1", "P1", MessageKind::FlowCompleted), wall(MIN));
    engine.ingest(&event(2 * MIN, "S1", "P1", MessageKind::Error), wall(2 * MIN));
    engine.ingest(&event(3 * MIN, "S1", "P1", MessageKind::Start), wall(3 * MIN));
    engine.ingest(&event(4 * MIN, "S1", "P1", MessageKind::FlowCompleted), wall(4 * MIN));

    let last_seen = 4 * MIN;
    assert_eq!(status(&engine, "S1"), ServerStatus::Running);

    let report = engine.sweep_timeouts(wall(last_seen + 5 * MIN + SEC));
    assert_eq!(report.unresponsive, 1);
    assert_eq!(status(&engine, "S1"), ServerStatus::Unresponsive);
    assert_eq!(engine.project_status("P1"), Some(ServerStatus::Unresponsive));

    // Nothing more happens until the reset timeout.
    let report = engine.sweep_timeouts(wall(last_seen + HOUR));
    assert_eq!(report.transitions(), 0);

    let report = engine.sweep_timeouts(wall(last_seen + 3 * HOUR + SEC));
    assert_eq!(report.stopped, 1);
    assert_eq!(report.reset, 1);

    let session = engine.session("S1").unwrap();
    assert_eq!(session.status, ServerStatus::Stopped);
    assert_eq!(session.error_count, 0);
    assert_eq!(session.flow_count, 0);
    assert_eq!(session.rolling.errors, 0);
    assert_eq!(session.rolling.flows, 0);
    assert!(session.history().is_empty());

    let snap = engine.snapshot();
    let labels = LabelSet::server("S1", "P1");
    for gauge in [
        "total_errors_current_session",
        "total_flows_current_session",
        "errors_last_hour",
        "flows_last_hour",
        "uptime_current_session_ns",
        "uptime_current_session_sec",
    ] {
        assert_eq!(snap.get(gauge, &labels), Some(0.0), "{gauge}");
    }
}

#[test]
fn start_always_resets_the_session() {
    let mut engine = HealthEngine::new(timeouts());
    engine.ingest(&event(0, "S1", "P1", MessageKind::Start), wall(0));
    for i in 1..=5 {
        engine.ingest(&event(i * SEC, "S1", "P1", MessageKind::FlowCompleted), wall(i * SEC));
    }
    engine.ingest(&event(6 * SEC, "S1", "P1", MessageKind::Error), wall(6 * SEC));
    engine.ingest(&event(7 * SEC, "S1", "P1", MessageKind::Stop), wall(7 * SEC));

    engine.ingest(&event(8 * SEC, "S1", "P1", MessageKind::Start), wall(8 * SEC));
    let session = engine.session("S1").unwrap();
    assert_eq!(session.status, ServerStatus::Running);
    assert_eq!(session.error_count, 0);
    assert_eq!(session.flow_count, 0);
    assert_eq!(session.session_start, EventTime::from_nanos(T0 + 8 * SEC));
    // The trailing hour still remembers what happened before the restart.
    assert_eq!(session.rolling.flows, 5);
    assert_eq!(session.rolling.errors, 1);
}

#[test]
fn replayed_window_is_idempotent() {
    let batch = vec![
        event(0, "S1", "P1", MessageKind::Start),
        event(SEC, "S2", "P1", MessageKind::Start),
        event(2 * SEC, "S1", "P1", MessageKind::FlowCompleted),
        event(3 * SEC, "S2", "P1", MessageKind::Error),
    ];

    let mut engine = HealthEngine::new(timeouts());
    engine.ingest_batch(&batch, wall(4 * SEC));
    let first = engine.snapshot();

    // The next poll overlaps the previous window completely.
    let tally = engine.ingest_batch(&batch, wall(64 * SEC));
    assert_eq!(tally.duplicates, batch.len());
    assert_eq!(engine.snapshot(), first);
}

#[test]
fn rolling_window_counts_only_the_trailing_hour() {
    let mut engine = HealthEngine::new(timeouts());
    engine.ingest(&event(0, "S1", "P1", MessageKind::FlowCompleted), wall(0));
    engine.ingest(&event(30 * MIN, "S1", "P1", MessageKind::FlowCompleted), wall(30 * MIN));
    engine.ingest(&event(HOUR, "S1", "P1", MessageKind::FlowCompleted), wall(HOUR));
    // Entry at 0 is exactly one hour old and excluded.
    assert_eq!(engine.session("S1").unwrap().rolling.flows, 2);

    engine.ingest(&event(HOUR + 30 * MIN + 1, "S1", "P1", MessageKind::Error), wall(HOUR + 30 * MIN));
    let rolling = engine.session("S1").unwrap().rolling;
    assert_eq!(rolling.flows, 1);
    assert_eq!(rolling.errors, 1);
    assert_eq!(engine.session("S1").unwrap().flow_count, 3);
}

#[test]
fn project_status_examples() {
    let cases: [(&[MessageKind], ServerStatus); 3] = [
        (&[MessageKind::Error, MessageKind::Start], ServerStatus::Error),
        (&[MessageKind::Start, MessageKind::Stop], ServerStatus::Running),
        (&[MessageKind::Stop, MessageKind::Stop], ServerStatus::Stopped),
    ];

    for (kinds, expected) in cases {
        let mut engine = HealthEngine::new(timeouts());
        for (i, kind) in kinds.iter().enumerate() {
            let server = format!("S{i}");
            engine.ingest(&event(i as i64 * SEC, &server, "P1", *kind), wall(i as i64 * SEC));
        }
        assert_eq!(engine.project_status("P1"), Some(expected), "{kinds:?}");
    }

    // {Unresponsive, Unresponsive} only arises through a sweep.
    let mut engine = HealthEngine::new(timeouts());
    engine.ingest(&event(0, "S0", "P1", MessageKind::Start), wall(0));
    engine.ingest(&event(SEC, "S1", "P1", MessageKind::Start), wall(SEC));
    engine.sweep_timeouts(wall(10 * MIN));
    assert_eq!(engine.project_status("P1"), Some(ServerStatus::Unresponsive));
    assert_eq!(
        engine.project_counts("P1"),
        Some(ProjectStatusCounts {
            unresponsive: 2,
            ..Default::default()
        })
    );
}

#[test]
fn every_server_has_exactly_one_hot_status() {
    let mut engine = HealthEngine::new(timeouts());
    let kinds = [
        MessageKind::Start,
        MessageKind::Error,
        MessageKind::Stop,
        MessageKind::FlowCompleted,
        MessageKind::Unrecognized(2),
    ];
    for (i, kind) in kinds.iter().enumerate() {
        let server = format!("S{i}");
        engine.ingest(&event(i as i64 * SEC, &server, "P1", *kind), wall(i as i64 * SEC));
    }
    engine.sweep_timeouts(wall(10 * MIN));

    let snap = engine.snapshot();
    for session in engine.sessions() {
        let hot: Vec<(String, f64)> = snap
            .series("server_status")
            .filter(|(labels, v)| labels.get("serverid") == Some(session.server_id.as_str()) && *v != 0.0)
            .map(|(labels, v)| (labels.get("status").unwrap().to_string(), v))
            .collect();
        assert_eq!(
            hot,
            vec![(session.status.label().to_string(), f64::from(session.status.code()))],
            "{}",
            session.server_id
        );
    }

    let project_hot = snap
        .series("project_status")
        .filter(|(_, v)| *v != 0.0)
        .count();
    assert_eq!(project_hot, 1);
}

#[test]
fn duplicate_outcome_reports_current_watermark() {
    let mut engine = HealthEngine::new(timeouts());
    engine.ingest(&event(5 * SEC, "S1", "P1", MessageKind::Start), wall(5 * SEC));
    let outcome = engine.ingest(&event(SEC, "S1", "P1", MessageKind::Stop), wall(6 * SEC));
    assert_eq!(
        outcome,
        IngestOutcome::Duplicate {
            watermark: EventTime::from_nanos(T0 + 5 * SEC)
        }
    );
    assert_eq!(status(&engine, "S1"), ServerStatus::Running);
}
