//! Per-server session record and its event history.

use std::collections::VecDeque;
use std::time::Duration;

use lokiwatch_core::{EventTime, MessageKind, ObservedAt, ProjectKey, ServerId, ServerStatus, nanos_to_secs};

/// Width of the trailing window behind `errors_last_hour` and
/// `flows_last_hour`.
pub const ROLLING_WINDOW: Duration = Duration::from_secs(60 * 60);

/// Kind of a history entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryKind {
    Error,
    Flow,
}

/// One error or flow-completion, stamped with its event time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryEntry {
    pub kind: HistoryKind,
    pub time: EventTime,
}

/// Error and flow counts inside the rolling window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RollingCounts {
    pub errors: u64,
    pub flows: u64,
}

/// Append-only (until pruned) history of a server's errors and flows.
///
/// Entries arrive in strictly increasing event time because the engine
/// rejects anything at or below its watermark, so pruning only ever
/// pops from the front.
#[derive(Debug, Clone, Default)]
pub struct EventHistory {
    entries: VecDeque<HistoryEntry>,
}

impl EventHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, kind: HistoryKind, time: EventTime) {
        self.entries.push_back(HistoryEntry { kind, time });
    }

    /// Count entries with `time > reference - ROLLING_WINDOW`.
    pub fn counts_since(&self, reference: EventTime) -> RollingCounts {
        let floor = reference.saturating_sub(ROLLING_WINDOW);
        self.entries
            .iter()
            .filter(|e| e.time > floor)
            .fold(RollingCounts::default(), |mut acc, e| {
                match e.kind {
                    HistoryKind::Error => acc.errors += 1,
                    HistoryKind::Flow => acc.flows += 1,
                }
                acc
            })
    }

    /// Drop entries with `time <= cutoff`. Returns how many were dropped.
    pub fn prune_through(&mut self, cutoff: EventTime) -> usize {
        let mut dropped = 0;
        while self.entries.front().is_some_and(|e| e.time <= cutoff) {
            self.entries.pop_front();
            dropped += 1;
        }
        dropped
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }
}

/// The current run of one server.
#[derive(Debug, Clone)]
pub struct ServerSession {
    pub server_id: ServerId,
    pub project_key: ProjectKey,
    /// Event time of the Start that opened this session (or of the first
    /// event seen, if no Start was observed).
    pub session_start: EventTime,
    pub status: ServerStatus,
    pub error_count: u64,
    pub flow_count: u64,
    /// Event time of the most recent accepted event.
    pub last_seen: EventTime,
    /// Wall-clock time the server last entered `Error`.
    pub error_entered_at: Option<ObservedAt>,
    /// Rolling counts as of the last recompute.
    pub rolling: RollingCounts,
    pub(crate) history: EventHistory,
}

impl ServerSession {
    pub fn new(server_id: &str, project_key: &str, start: EventTime) -> Self {
        Self {
            server_id: server_id.to_string(),
            project_key: project_key.to_string(),
            session_start: start,
            status: ServerStatus::Running,
            error_count: 0,
            flow_count: 0,
            last_seen: start,
            error_entered_at: None,
            rolling: RollingCounts::default(),
            history: EventHistory::new(),
        }
    }

    /// Apply one accepted event. `now` stamps entry into `Error`.
    pub(crate) fn apply(&mut self, kind: MessageKind, at: EventTime, now: ObservedAt) {
        match kind {
            MessageKind::Start => {
                self.session_start = at;
                self.error_count = 0;
                self.flow_count = 0;
                self.status = ServerStatus::Running;
                self.error_entered_at = None;
            }
            MessageKind::Stop => {
                self.status = ServerStatus::Stopped;
                self.error_entered_at = None;
            }
            MessageKind::Error => {
                self.error_count += 1;
                self.history.push(HistoryKind::Error, at);
                self.status = ServerStatus::Error;
                self.error_entered_at = Some(now);
            }
            MessageKind::FlowCompleted => {
                self.flow_count += 1;
                self.history.push(HistoryKind::Flow, at);
            }
            MessageKind::Unrecognized(_) => {}
        }
        self.last_seen = at;
        self.rolling = self.history.counts_since(at);
    }

    /// Zero every counter and forget history, as when a silent server is
    /// finally declared stopped. Uptime reads zero afterwards.
    pub(crate) fn clear_activity(&mut self) {
        self.error_count = 0;
        self.flow_count = 0;
        self.history.clear();
        self.rolling = RollingCounts::default();
        self.session_start = self.last_seen;
    }

    /// Uptime of the current session in event-time nanoseconds.
    pub fn uptime_nanos(&self) -> i64 {
        self.last_seen.nanos_since(self.session_start)
    }

    pub fn uptime_secs(&self) -> f64 {
        nanos_to_secs(self.uptime_nanos())
    }

    pub fn history(&self) -> &EventHistory {
        &self.history
    }
}
