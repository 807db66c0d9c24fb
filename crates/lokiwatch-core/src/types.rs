//! Domain types shared across lokiwatch crates.
//!
//! Two clocks are in play and they are deliberately different types:
//! [`EventTime`] is the nanosecond timestamp carried inside a log record
//! and drives ordering, dedup, and rolling windows. [`ObservedAt`] is the
//! wall clock of this process and drives liveness decisions (error
//! recovery, unresponsive detection, stale reset).

use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Identifier of a monitored server (the `serverid` log field).
pub type ServerId = String;

/// Key of the project a server belongs to (the `projectkey` log field).
pub type ProjectKey = String;

const NANOS_PER_SEC: i64 = 1_000_000_000;

// ── Clocks ────────────────────────────────────────────────────────

/// Nanoseconds since the Unix epoch, as embedded in a log record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct EventTime(pub i64);

impl EventTime {
    pub const ZERO: EventTime = EventTime(0);

    pub fn from_nanos(nanos: i64) -> Self {
        Self(nanos)
    }

    pub fn as_nanos(self) -> i64 {
        self.0
    }

    /// Event time shifted back by `d`, saturating at `i64::MIN`.
    pub fn saturating_sub(self, d: Duration) -> Self {
        Self(self.0.saturating_sub(duration_nanos(d)))
    }

    /// Signed nanoseconds from `earlier` to `self`.
    pub fn nanos_since(self, earlier: EventTime) -> i64 {
        self.0.saturating_sub(earlier.0)
    }
}

impl fmt::Display for EventTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Wall-clock observation time of this process, nanoseconds since the
/// Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ObservedAt(pub i64);

impl ObservedAt {
    /// Current wall-clock time.
    pub fn now() -> Self {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        Self(i64::try_from(nanos).unwrap_or(i64::MAX))
    }

    pub fn from_nanos(nanos: i64) -> Self {
        Self(nanos)
    }

    pub fn as_nanos(self) -> i64 {
        self.0
    }

    pub fn saturating_add(self, d: Duration) -> Self {
        Self(self.0.saturating_add(duration_nanos(d)))
    }

    pub fn saturating_sub(self, d: Duration) -> Self {
        Self(self.0.saturating_sub(duration_nanos(d)))
    }

    /// Whether strictly more than `timeout` has elapsed since the earlier
    /// observation `since`.
    pub fn exceeds(self, since: ObservedAt, timeout: Duration) -> bool {
        self.0.saturating_sub(since.0) > duration_nanos(timeout)
    }

    /// Whether strictly more than `timeout` of wall-clock time separates
    /// this observation from the event timestamp `seen`.
    ///
    /// This is the one place the two clocks are compared; it assumes the
    /// log producer stamps events with a Unix-epoch clock.
    pub fn exceeds_since_event(self, seen: EventTime, timeout: Duration) -> bool {
        self.0.saturating_sub(seen.0) > duration_nanos(timeout)
    }
}

impl fmt::Display for ObservedAt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Convert a `Duration` to signed nanoseconds, saturating at `i64::MAX`.
pub fn duration_nanos(d: Duration) -> i64 {
    i64::try_from(d.as_nanos()).unwrap_or(i64::MAX)
}

/// Convert signed nanoseconds to fractional seconds.
pub fn nanos_to_secs(nanos: i64) -> f64 {
    nanos as f64 / NANOS_PER_SEC as f64
}

// ── Status ────────────────────────────────────────────────────────

/// Health status of a server or, by aggregation, a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ServerStatus {
    Running,
    Stopped,
    Error,
    Unresponsive,
}

impl ServerStatus {
    /// Every status, in code order. Used for one-hot gauge emission.
    pub const ALL: [ServerStatus; 4] = [
        ServerStatus::Running,
        ServerStatus::Stopped,
        ServerStatus::Error,
        ServerStatus::Unresponsive,
    ];

    /// Numeric code published as the gauge value (1–4).
    pub fn code(self) -> u8 {
        match self {
            ServerStatus::Running => 1,
            ServerStatus::Stopped => 2,
            ServerStatus::Error => 3,
            ServerStatus::Unresponsive => 4,
        }
    }

    /// Value of the `status` label.
    pub fn label(self) -> &'static str {
        match self {
            ServerStatus::Running => "Running",
            ServerStatus::Stopped => "Stopped",
            ServerStatus::Error => "Error",
            ServerStatus::Unresponsive => "Unresponsive",
        }
    }
}

impl fmt::Display for ServerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ── Events ────────────────────────────────────────────────────────

/// Lifecycle message carried by a log record (`messagetypeid`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Start,
    Stop,
    FlowCompleted,
    Error,
    /// Any other message type id. Accepted, but has no status effect.
    Unrecognized(i64),
}

impl MessageKind {
    pub fn from_code(code: i64) -> Self {
        match code {
            1 => MessageKind::Start,
            3 => MessageKind::Stop,
            5 => MessageKind::FlowCompleted,
            15 => MessageKind::Error,
            other => MessageKind::Unrecognized(other),
        }
    }

    pub fn code(self) -> i64 {
        match self {
            MessageKind::Start => 1,
            MessageKind::Stop => 3,
            MessageKind::FlowCompleted => 5,
            MessageKind::Error => 15,
            MessageKind::Unrecognized(code) => code,
        }
    }
}

/// A decoded lifecycle event, ready for the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEvent {
    pub timestamp: EventTime,
    pub server_id: ServerId,
    pub project_key: ProjectKey,
    pub kind: MessageKind,
}

impl LogEvent {
    pub fn new(
        timestamp: EventTime,
        server_id: impl Into<ServerId>,
        project_key: impl Into<ProjectKey>,
        kind: MessageKind,
    ) -> Self {
        Self {
            timestamp,
            server_id: server_id.into(),
            project_key: project_key.into(),
            kind,
        }
    }
}
