//! The gauge registry: an explicit, host-owned collection of gauge series.

use tracing::{debug, warn};

use lokiwatch_core::gauges::{self, GaugeSnapshot, GaugeSpec, LabelSet};

use crate::error::SinkError;

/// Current value of every published gauge series.
///
/// Only gauges from the catalogue are accepted, and only with exactly
/// their declared label names.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GaugeRegistry {
    values: GaugeSnapshot,
}

impl GaugeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set one series.
    pub fn publish(&mut self, gauge: &str, labels: LabelSet, value: f64) -> Result<(), SinkError> {
        let spec = gauges::spec_for(gauge).ok_or_else(|| SinkError::UnknownGauge(gauge.to_string()))?;
        check_labels(spec, &labels)?;
        self.values.set(spec, labels, value);
        Ok(())
    }

    pub fn get(&self, gauge: &str, labels: &LabelSet) -> Option<f64> {
        self.values.get(gauge, labels)
    }

    /// Series of one gauge in label order.
    pub fn series(&self, gauge: &str) -> impl Iterator<Item = (&LabelSet, f64)> {
        self.values.series(gauge)
    }

    pub fn clear(&mut self) {
        self.values = GaugeSnapshot::new();
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

fn check_labels(spec: &GaugeSpec, labels: &LabelSet) -> Result<(), SinkError> {
    let mismatch = labels.len() != spec.labels.len()
        || spec.labels.iter().any(|name| labels.get(name).is_none());
    if mismatch {
        return Err(SinkError::LabelMismatch {
            gauge: spec.name,
            expected: spec.labels,
            got: labels.iter().map(|(k, _)| k.to_string()).collect(),
        });
    }
    Ok(())
}

/// Replace the registry contents with an engine snapshot.
///
/// Series the snapshot no longer contains disappear. Returns how many
/// series were published; invalid series are skipped and logged.
pub fn publish_snapshot(snapshot: &GaugeSnapshot, registry: &mut GaugeRegistry) -> usize {
    registry.clear();
    let mut published = 0;
    for (gauge, labels, value) in snapshot.iter() {
        match registry.publish(gauge, labels.clone(), value) {
            Ok(()) => published += 1,
            Err(e) => warn!(error = %e, "skipping invalid gauge series"),
        }
    }
    debug!(series = published, "registry refreshed from snapshot");
    published
}
