//! Prometheus text exposition format.
//!
//! Renders the registry for the Pushgateway (or any scraper). Every
//! catalogue gauge gets its HELP and TYPE lines even with no series.

use lokiwatch_core::gauges::{CATALOGUE, LabelSet};

use crate::registry::GaugeRegistry;

/// Content type of the text exposition format.
pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4";

/// Render every gauge in the registry.
pub fn render_prometheus(registry: &GaugeRegistry) -> String {
    let mut out = String::new();

    for gauge in CATALOGUE {
        out.push_str(&format!("# HELP {} {}\n", gauge.name, gauge.help));
        out.push_str(&format!("# TYPE {} gauge\n", gauge.name));
        for (labels, value) in registry.series(gauge.name) {
            out.push_str(&format!(
                "{}{{{}}} {}\n",
                gauge.name,
                render_labels(labels),
                render_value(value)
            ));
        }
    }

    out
}

fn render_labels(labels: &LabelSet) -> String {
    labels
        .iter()
        .map(|(name, value)| format!("{name}=\"{}\"", escape_label_value(value)))
        .collect::<Vec<_>>()
        .join(",")
}

fn escape_label_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            c => out.push(c),
        }
    }
    out
}

fn render_value(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value.is_infinite() {
        if value > 0.0 { "+Inf" } else { "-Inf" }.to_string()
    } else {
        value.to_string()
    }
}
