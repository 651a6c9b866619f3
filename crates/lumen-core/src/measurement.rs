//! Metric measurements and tags

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::SystemTime;

use crate::error::{TelemetryError, TelemetryResult};
use crate::span::TagValue;

/// A single metric tag: non-empty key, scalar value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricTag {
    /// Tag key, never empty.
    pub key: String,
    /// Tag value. Arrays are not permitted on metric tags.
    pub value: TagValue,
}

impl MetricTag {
    /// Create a tag.
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError::InvalidArgument`] for an empty key or an
    /// array-typed value.
    pub fn new(key: impl Into<String>, value: impl Into<TagValue>) -> TelemetryResult<Self> {
        let key = key.into();
        if key.trim().is_empty() {
            return Err(TelemetryError::invalid_argument(
                "tag_key",
                "must not be empty",
            ));
        }
        let value = value.into();
        if matches!(
            value,
            TagValue::BoolArray(_)
                | TagValue::I64Array(_)
                | TagValue::F64Array(_)
                | TagValue::StringArray(_)
        ) {
            return Err(TelemetryError::invalid_argument(
                "tag_value",
                "metric tags must be scalar",
            ));
        }
        Ok(Self { key, value })
    }
}

impl fmt::Display for MetricTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.key, self.value.to_display_string())
    }
}

/// Validate a tag set for a single recording call.
///
/// The set is logically unordered and keyed; duplicate keys within one call
/// are a contract violation.
///
/// # Errors
///
/// Returns [`TelemetryError::InvalidArgument`] when two tags share a key.
pub fn validate_tag_set(tags: &[MetricTag]) -> TelemetryResult<()> {
    for (i, tag) in tags.iter().enumerate() {
        if tags[..i].iter().any(|prior| prior.key == tag.key) {
            return Err(TelemetryError::invalid_argument(
                "tags",
                format!("duplicate tag key `{}`", tag.key),
            ));
        }
    }
    Ok(())
}

/// The kind of instrument that produced a measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstrumentKind {
    /// Monotonic counter of non-negative increments.
    Counter,
    /// Integer-valued distribution.
    HistogramU64,
    /// Float-valued distribution.
    HistogramF64,
    /// Pull-based gauge observed on a timer.
    ObservableGauge,
}

/// The recorded value of a measurement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MeasurementValue {
    /// Unsigned integer value (counters, integer histograms).
    U64(u64),
    /// Float value (float histograms, gauges).
    F64(f64),
}

impl MeasurementValue {
    /// The value as a float, widening integers.
    pub fn as_f64(self) -> f64 {
        match self {
            Self::U64(v) => v as f64,
            Self::F64(v) => v,
        }
    }
}

/// One recorded metric sample traveling through the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Measurement {
    /// Instrument name.
    pub instrument: String,
    /// Instrument kind.
    pub kind: InstrumentKind,
    /// Recorded value.
    pub value: MeasurementValue,
    /// Tags attached to this sample, in call order.
    pub tags: Vec<MetricTag>,
    /// Wall-clock time of the recording.
    pub timestamp: SystemTime,
}

impl Measurement {
    /// Build a measurement stamped with the current time.
    pub fn now(
        instrument: impl Into<String>,
        kind: InstrumentKind,
        value: MeasurementValue,
        tags: Vec<MetricTag>,
    ) -> Self {
        Self {
            instrument: instrument.into(),
            kind,
            value,
            tags,
            timestamp: SystemTime::now(),
        }
    }
}
