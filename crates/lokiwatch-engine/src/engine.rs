//! The health-state engine.

use std::collections::{BTreeSet, HashMap};

use tracing::{debug, info, warn};

use lokiwatch_core::config::TimeoutConfig;
use lokiwatch_core::gauges::{self, GaugeSnapshot, LabelSet};
use lokiwatch_core::{EventTime, LogEvent, MessageKind, ObservedAt, ProjectKey, ServerId, ServerStatus};

use crate::project::ProjectStatusCounts;
use crate::session::{ROLLING_WINDOW, ServerSession};

/// What `ingest` did with an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// The event was applied to its server's session.
    Applied,
    /// The event was at or below the watermark and ignored.
    Duplicate { watermark: EventTime },
    /// The message type is unknown. The session exists and `last_seen`
    /// moved, but status and counters are untouched.
    Unrecognized { code: i64 },
}

/// Tally of a batch of `ingest` calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IngestTally {
    pub applied: usize,
    pub duplicates: usize,
    pub unrecognized: usize,
}

impl IngestTally {
    pub fn record(&mut self, outcome: IngestOutcome) {
        match outcome {
            IngestOutcome::Applied => self.applied += 1,
            IngestOutcome::Duplicate { .. } => self.duplicates += 1,
            IngestOutcome::Unrecognized { .. } => self.unrecognized += 1,
        }
    }

    /// Events that reached a session (applied or unrecognized).
    pub fn accepted(&self) -> usize {
        self.applied + self.unrecognized
    }
}

/// Transitions performed by one sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SweepReport {
    /// Error → Running after the error timeout.
    pub recovered: usize,
    /// Running/Error → Unresponsive.
    pub unresponsive: usize,
    /// Anything → Stopped after the reset timeout.
    pub stopped: usize,
    /// Of `stopped`, sessions that were Unresponsive and had their
    /// counters and history cleared.
    pub reset: usize,
    /// History entries dropped for falling out of the rolling window.
    pub pruned: usize,
}

impl SweepReport {
    pub fn transitions(&self) -> usize {
        self.recovered + self.unresponsive + self.stopped
    }
}

/// Per-server sessions, per-project aggregation, and the dedup watermark.
///
/// Single-writer: the poll driver owns it and calls `ingest`,
/// `sweep_timeouts`, and `snapshot` strictly in sequence.
#[derive(Debug)]
pub struct HealthEngine {
    timeouts: TimeoutConfig,
    /// server_id → session. Never shrinks.
    sessions: HashMap<ServerId, ServerSession>,
    /// project_key → member server ids.
    projects: HashMap<ProjectKey, BTreeSet<ServerId>>,
    /// Last derived status per project, for change logging.
    last_project_status: HashMap<ProjectKey, ServerStatus>,
    /// Highest event time accepted so far, across all servers.
    watermark: EventTime,
}

impl HealthEngine {
    pub fn new(timeouts: TimeoutConfig) -> Self {
        Self {
            timeouts,
            sessions: HashMap::new(),
            projects: HashMap::new(),
            last_project_status: HashMap::new(),
            watermark: EventTime::ZERO,
        }
    }

    pub fn timeouts(&self) -> &TimeoutConfig {
        &self.timeouts
    }

    /// Highest event time accepted so far.
    pub fn watermark(&self) -> EventTime {
        self.watermark
    }

    pub fn session(&self, server_id: &str) -> Option<&ServerSession> {
        self.sessions.get(server_id)
    }

    pub fn sessions(&self) -> impl Iterator<Item = &ServerSession> {
        self.sessions.values()
    }

    pub fn server_count(&self) -> usize {
        self.sessions.len()
    }

    /// Member server ids of a project, sorted.
    pub fn project_members(&self, project_key: &str) -> Vec<&str> {
        self.projects
            .get(project_key)
            .map(|m| m.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    // ── Ingest ────────────────────────────────────────────────────

    /// Apply one event. `now` is the wall clock, used only to stamp
    /// entry into `Error`.
    pub fn ingest(&mut self, event: &LogEvent, now: ObservedAt) -> IngestOutcome {
        let server_id = event.server_id.as_str();

        if event.timestamp <= self.watermark {
            debug!(
                %server_id,
                timestamp = %event.timestamp,
                watermark = %self.watermark,
                "skipping already processed event"
            );
            return IngestOutcome::Duplicate {
                watermark: self.watermark,
            };
        }

        debug!(
            %server_id,
            project_key = %event.project_key,
            message_type = event.kind.code(),
            timestamp = %event.timestamp,
            "ingesting event"
        );

        if event.kind == MessageKind::Start {
            self.reassign_project(server_id, &event.project_key);
        }

        let created = !self.sessions.contains_key(server_id);
        let session = self.get_or_create(server_id, &event.project_key, event.timestamp);

        if !created && session.project_key != event.project_key {
            debug!(
                %server_id,
                session_project = %session.project_key,
                event_project = %event.project_key,
                "event project differs from session project, keeping session project"
            );
        }

        let old_status = session.status;
        session.apply(event.kind, event.timestamp, now);
        let new_status = session.status;
        let project_key = session.project_key.clone();

        self.watermark = event.timestamp;

        if created {
            info!(%server_id, %project_key, status = %new_status, "new server session");
        } else if old_status != new_status {
            info!(
                %server_id,
                %project_key,
                from = %old_status,
                to = %new_status,
                "server status changed"
            );
        }
        if created || old_status != new_status {
            self.refresh_project(&project_key);
        }

        match event.kind {
            MessageKind::Unrecognized(code) => {
                warn!(
                    message_type = code,
                    %server_id,
                    %project_key,
                    "received unrecognized message type"
                );
                IngestOutcome::Unrecognized { code }
            }
            _ => IngestOutcome::Applied,
        }
    }

    /// Apply events in the given order.
    pub fn ingest_batch<'a, I>(&mut self, events: I, now: ObservedAt) -> IngestTally
    where
        I: IntoIterator<Item = &'a LogEvent>,
    {
        let mut tally = IngestTally::default();
        for event in events {
            tally.record(self.ingest(event, now));
        }
        tally
    }

    /// Session for `server_id`, created as a fresh Running session
    /// starting at `at` if none exists yet.
    fn get_or_create(&mut self, server_id: &str, project_key: &str, at: EventTime) -> &mut ServerSession {
        let projects = &mut self.projects;
        self.sessions.entry(server_id.to_string()).or_insert_with(|| {
            projects
                .entry(project_key.to_string())
                .or_default()
                .insert(server_id.to_string());
            ServerSession::new(server_id, project_key, at)
        })
    }

    /// Move an existing server to another project (a Start event under a
    /// new project key).
    fn reassign_project(&mut self, server_id: &str, project_key: &str) {
        let Some(session) = self.sessions.get_mut(server_id) else {
            return;
        };
        if session.project_key == project_key {
            return;
        }

        let old_project = std::mem::replace(&mut session.project_key, project_key.to_string());
        info!(%server_id, from = %old_project, to = %project_key, "server moved to another project");

        if let Some(members) = self.projects.get_mut(&old_project) {
            members.remove(server_id);
            if members.is_empty() {
                self.projects.remove(&old_project);
                self.last_project_status.remove(&old_project);
            }
        }
        self.projects
            .entry(project_key.to_string())
            .or_default()
            .insert(server_id.to_string());

        if self.projects.contains_key(&old_project) {
            self.refresh_project(&old_project);
        }
        self.refresh_project(project_key);
    }

    // ── Sweep ─────────────────────────────────────────────────────

    /// Apply the wall-clock transitions to every session and prune
    /// history that can no longer fall inside the rolling window.
    ///
    /// At most one transition applies per server per sweep, checked in
    /// this order: reset to Stopped, error recovery, unresponsive.
    pub fn sweep_timeouts(&mut self, now: ObservedAt) -> SweepReport {
        let mut report = SweepReport::default();
        let mut touched_projects = BTreeSet::new();
        let timeouts = self.timeouts.clone();

        for session in self.sessions.values_mut() {
            let old_status = session.status;

            if old_status != ServerStatus::Stopped
                && now.exceeds_since_event(session.last_seen, timeouts.reset)
            {
                if old_status == ServerStatus::Unresponsive {
                    session.clear_activity();
                    report.reset += 1;
                }
                session.status = ServerStatus::Stopped;
                session.error_entered_at = None;
                report.stopped += 1;
                info!(
                    server_id = %session.server_id,
                    reset_timeout_secs = timeouts.reset.as_secs(),
                    cleared = old_status == ServerStatus::Unresponsive,
                    "server silent past reset timeout, marking stopped"
                );
            } else if old_status == ServerStatus::Error
                && session
                    .error_entered_at
                    .is_some_and(|entered| now.exceeds(entered, timeouts.error))
            {
                session.status = ServerStatus::Running;
                session.error_entered_at = None;
                report.recovered += 1;
                info!(
                    server_id = %session.server_id,
                    error_timeout_secs = timeouts.error.as_secs(),
                    "error timeout expired, marking running"
                );
            } else if matches!(old_status, ServerStatus::Running | ServerStatus::Error)
                && now.exceeds_since_event(session.last_seen, timeouts.unresponsive)
            {
                session.status = ServerStatus::Unresponsive;
                session.error_entered_at = None;
                report.unresponsive += 1;
                info!(
                    server_id = %session.server_id,
                    unresponsive_timeout_secs = timeouts.unresponsive.as_secs(),
                    "server silent past unresponsive timeout, marking unresponsive"
                );
            }

            if session.status != old_status {
                touched_projects.insert(session.project_key.clone());
            }
        }

        // Anything at or below this can never be counted again: future
        // events are strictly above the watermark.
        let cutoff = self.watermark.saturating_sub(ROLLING_WINDOW);
        for session in self.sessions.values_mut() {
            report.pruned += session.history.prune_through(cutoff);
            session.rolling = session.history.counts_since(self.watermark);
        }

        for project_key in &touched_projects {
            self.refresh_project(project_key);
        }

        if report.transitions() > 0 {
            debug!(
                recovered = report.recovered,
                unresponsive = report.unresponsive,
                stopped = report.stopped,
                reset = report.reset,
                pruned = report.pruned,
                "timeout sweep applied"
            );
        }
        report
    }

    // ── Projects ──────────────────────────────────────────────────

    /// Member status tallies, or `None` for an unknown project.
    pub fn project_counts(&self, project_key: &str) -> Option<ProjectStatusCounts> {
        let members = self.projects.get(project_key)?;
        Some(ProjectStatusCounts::from_statuses(
            members
                .iter()
                .filter_map(|id| self.sessions.get(id))
                .map(|s| s.status),
        ))
    }

    /// Derived project status, or `None` for an unknown project.
    pub fn project_status(&self, project_key: &str) -> Option<ServerStatus> {
        self.project_counts(project_key).map(|c| c.derive())
    }

    /// Earliest session start among the project's Running servers.
    pub fn earliest_running_start(&self, project_key: &str) -> Option<EventTime> {
        let earliest = self
            .projects
            .get(project_key)?
            .iter()
            .filter_map(|id| self.sessions.get(id))
            .filter(|s| s.status == ServerStatus::Running)
            .map(|s| s.session_start)
            .min();
        if earliest.is_none() {
            debug!(%project_key, "no running servers in project");
        }
        earliest
    }

    fn refresh_project(&mut self, project_key: &str) {
        let Some(counts) = self.project_counts(project_key) else {
            return;
        };
        let status = counts.derive();
        let previous = self.last_project_status.insert(project_key.to_string(), status);
        if previous != Some(status) {
            info!(
                %project_key,
                from = previous.map(|s| s.label()).unwrap_or("None"),
                to = %status,
                %counts,
                "project status changed"
            );
        }
    }

    // ── Snapshot ──────────────────────────────────────────────────

    /// Current gauge values. Pure read.
    pub fn snapshot(&self) -> GaugeSnapshot {
        let mut snap = GaugeSnapshot::new();

        for session in self.sessions.values() {
            let labels = LabelSet::server(&session.server_id, &session.project_key);

            snap.set(&gauges::PROJECT_NAME, labels.clone(), 1.0);
            snap.set(
                &gauges::CURRENT_SESSION_START,
                labels.clone(),
                session.session_start.as_nanos() as f64,
            );
            snap.set(
                &gauges::LATEST_TRANSACTION_TIME,
                labels.clone(),
                session.last_seen.as_nanos() as f64,
            );
            snap.set(
                &gauges::UPTIME_CURRENT_SESSION_NS,
                labels.clone(),
                session.uptime_nanos() as f64,
            );
            snap.set(&gauges::UPTIME_CURRENT_SESSION_SEC, labels.clone(), session.uptime_secs());
            snap.set(
                &gauges::TOTAL_ERRORS_CURRENT_SESSION,
                labels.clone(),
                session.error_count as f64,
            );
            snap.set(&gauges::ERRORS_LAST_HOUR, labels.clone(), session.rolling.errors as f64);
            snap.set(
                &gauges::TOTAL_FLOWS_CURRENT_SESSION,
                labels.clone(),
                session.flow_count as f64,
            );
            snap.set(&gauges::FLOWS_LAST_HOUR, labels.clone(), session.rolling.flows as f64);

            for status in ServerStatus::ALL {
                let value = if status == session.status {
                    f64::from(status.code())
                } else {
                    0.0
                };
                snap.set(&gauges::SERVER_STATUS, labels.clone().with("status", status.label()), value);
            }
        }

        for (project_key, members) in &self.projects {
            let labels = LabelSet::project(project_key);
            let derived = self.project_status(project_key).unwrap_or(ServerStatus::Running);

            for status in ServerStatus::ALL {
                let value = if status == derived {
                    f64::from(status.code())
                } else {
                    0.0
                };
                snap.set(&gauges::PROJECT_STATUS, labels.clone().with("status", status.label()), value);
            }
            snap.set(&gauges::SERVER_COUNT, labels, members.len() as f64);
        }

        snap
    }
}
