//! Gauge catalogue and the snapshot shape shared by engine and publisher.
//!
//! The engine produces a [`GaugeSnapshot`] (gauge name → label set →
//! value); the metrics crate turns it into a registry and Prometheus
//! text. Names, help strings, and label names are fixed here so both
//! sides agree.

use std::collections::BTreeMap;

/// Static description of one published gauge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GaugeSpec {
    pub name: &'static str,
    pub help: &'static str,
    pub labels: &'static [&'static str],
}

const SERVER_LABELS: &[&str] = &["serverid", "projectkey"];

pub const PROJECT_NAME: GaugeSpec = GaugeSpec {
    name: "project_name",
    help: "Name of the Project",
    labels: SERVER_LABELS,
};

pub const CURRENT_SESSION_START: GaugeSpec = GaugeSpec {
    name: "current_session_start",
    help: "Current Session Start Time",
    labels: SERVER_LABELS,
};

pub const LATEST_TRANSACTION_TIME: GaugeSpec = GaugeSpec {
    name: "latest_transaction_time",
    help: "Latest Transaction Time",
    labels: SERVER_LABELS,
};

pub const UPTIME_CURRENT_SESSION_NS: GaugeSpec = GaugeSpec {
    name: "uptime_current_session_ns",
    help: "Uptime of Current Session in Nanoseconds",
    labels: SERVER_LABELS,
};

pub const UPTIME_CURRENT_SESSION_SEC: GaugeSpec = GaugeSpec {
    name: "uptime_current_session_sec",
    help: "Uptime of Current Session in Seconds",
    labels: SERVER_LABELS,
};

pub const TOTAL_ERRORS_CURRENT_SESSION: GaugeSpec = GaugeSpec {
    name: "total_errors_current_session",
    help: "Total Errors in Current Session",
    labels: SERVER_LABELS,
};

pub const ERRORS_LAST_HOUR: GaugeSpec = GaugeSpec {
    name: "errors_last_hour",
    help: "Errors in Last Hour",
    labels: SERVER_LABELS,
};

pub const TOTAL_FLOWS_CURRENT_SESSION: GaugeSpec = GaugeSpec {
    name: "total_flows_current_session",
    help: "Total Flows Executed Current Session",
    labels: SERVER_LABELS,
};

pub const FLOWS_LAST_HOUR: GaugeSpec = GaugeSpec {
    name: "flows_last_hour",
    help: "Flows Executed in Last Hour",
    labels: SERVER_LABELS,
};

pub const SERVER_STATUS: GaugeSpec = GaugeSpec {
    name: "server_status",
    help: "Current Server Status",
    labels: &["serverid", "projectkey", "status"],
};

pub const PROJECT_STATUS: GaugeSpec = GaugeSpec {
    name: "project_status",
    help: "Current Project Status",
    labels: &["projectkey", "status"],
};

pub const SERVER_COUNT: GaugeSpec = GaugeSpec {
    name: "server_count",
    help: "Count of Servers",
    labels: &["projectkey"],
};

/// Every gauge, in exposition order.
pub const CATALOGUE: [GaugeSpec; 12] = [
    PROJECT_NAME,
    CURRENT_SESSION_START,
    LATEST_TRANSACTION_TIME,
    UPTIME_CURRENT_SESSION_NS,
    UPTIME_CURRENT_SESSION_SEC,
    TOTAL_ERRORS_CURRENT_SESSION,
    ERRORS_LAST_HOUR,
    TOTAL_FLOWS_CURRENT_SESSION,
    FLOWS_LAST_HOUR,
    SERVER_STATUS,
    PROJECT_STATUS,
    SERVER_COUNT,
];

/// Look up a gauge by name.
pub fn spec_for(name: &str) -> Option<&'static GaugeSpec> {
    CATALOGUE.iter().find(|g| g.name == name)
}

/// An ordered set of `label = value` pairs identifying one gauge series.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LabelSet(BTreeMap<String, String>);

impl LabelSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, name: &str, value: impl Into<String>) -> Self {
        self.0.insert(name.to_string(), value.into());
        self
    }

    /// `{serverid, projectkey}` labels.
    pub fn server(server_id: &str, project_key: &str) -> Self {
        Self::new()
            .with("serverid", server_id)
            .with("projectkey", project_key)
    }

    /// `{projectkey}` labels.
    pub fn project(project_key: &str) -> Self {
        Self::new().with("projectkey", project_key)
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Point-in-time gauge values: gauge name → label set → value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GaugeSnapshot {
    series: BTreeMap<&'static str, BTreeMap<LabelSet, f64>>,
}

impl GaugeSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, gauge: &GaugeSpec, labels: LabelSet, value: f64) {
        self.series
            .entry(gauge.name)
            .or_default()
            .insert(labels, value);
    }

    pub fn get(&self, gauge: &str, labels: &LabelSet) -> Option<f64> {
        self.series.get(gauge).and_then(|s| s.get(labels)).copied()
    }

    /// All series of a gauge, empty if it has none.
    pub fn series(&self, gauge: &str) -> impl Iterator<Item = (&LabelSet, f64)> {
        self.series
            .get(gauge)
            .into_iter()
            .flat_map(|s| s.iter().map(|(labels, v)| (labels, *v)))
    }

    /// Iterate `(gauge name, labels, value)` in gauge then label order.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &LabelSet, f64)> {
        self.series
            .iter()
            .flat_map(|(name, s)| s.iter().map(move |(labels, v)| (*name, labels, *v)))
    }

    /// Total number of series across all gauges.
    pub fn len(&self) -> usize {
        self.series.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
