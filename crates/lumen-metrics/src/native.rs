//! Native backend over the `metrics` facade

use metrics::Label;

use lumen_core::{MetricTag, TagValue};

use crate::backend::{BackendKind, MetricBackend};

/// Delegates every recording to the process-wide `metrics` recorder,
/// passing tags as labels. If the host never installed a recorder the
/// facade no-ops, which is exactly the desired behavior for a library.
#[derive(Debug, Default)]
pub struct NativeBackend;

impl NativeBackend {
    /// Create the native backend.
    pub fn new() -> Self {
        Self
    }
}

fn labels(tags: &[MetricTag]) -> Vec<Label> {
    tags.iter()
        .map(|tag| Label::new(tag.key.clone(), render(&tag.value)))
        .collect()
}

fn render(value: &TagValue) -> String {
    value.to_display_string()
}

impl MetricBackend for NativeBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Native
    }

    fn describe(
        &self,
        kind: lumen_core::InstrumentKind,
        name: &str,
        unit: Option<&str>,
        description: Option<&str>,
    ) {
        use lumen_core::InstrumentKind;
        use metrics::{describe_counter, describe_gauge, describe_histogram};

        let unit = unit.and_then(metrics::Unit::from_string);
        let description = description.unwrap_or_default().to_string();
        match (kind, unit) {
            (InstrumentKind::Counter, Some(unit)) => {
                describe_counter!(name.to_string(), unit, description);
            }
            (InstrumentKind::Counter, None) => {
                describe_counter!(name.to_string(), description);
            }
            (InstrumentKind::HistogramF64 | InstrumentKind::HistogramU64, Some(unit)) => {
                describe_histogram!(name.to_string(), unit, description);
            }
            (InstrumentKind::HistogramF64 | InstrumentKind::HistogramU64, None) => {
                describe_histogram!(name.to_string(), description);
            }
            (InstrumentKind::ObservableGauge, Some(unit)) => {
                describe_gauge!(name.to_string(), unit, description);
            }
            (InstrumentKind::ObservableGauge, None) => {
                describe_gauge!(name.to_string(), description);
            }
        }
    }

    fn record_counter(&self, name: &str, value: u64, tags: &[MetricTag]) {
        let labels = labels(tags);
        metrics::counter!(name.to_string(), labels).increment(value);
    }

    fn record_histogram_f64(&self, name: &str, value: f64, tags: &[MetricTag]) {
        let labels = labels(tags);
        metrics::histogram!(name.to_string(), labels).record(value);
    }

    fn record_histogram_u64(&self, name: &str, value: u64, tags: &[MetricTag]) {
        let labels = labels(tags);
        metrics::histogram!(name.to_string(), labels).record(value as f64);
    }

    fn record_gauge(&self, name: &str, value: f64, tags: &[MetricTag]) {
        let labels = labels(tags);
        metrics::gauge!(name.to_string(), labels).set(value);
    }
}
