//! Span records - the unit the pipeline transports
//!
//! A [`Span`] is created by an operation scope, mutated only by that scope,
//! frozen when the scope ends, and then moved into the pipeline. Tag keys
//! are unique within a span (setting an existing key replaces its value) and
//! insertion order is preserved for both tags and events.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, SystemTime};

use crate::ids::{SpanId, TraceId};

/// The role a span plays relative to its trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpanKind {
    /// In-process unit of work (default).
    #[default]
    Internal,
    /// Outbound request to a remote service.
    Client,
    /// Handling of an inbound request.
    Server,
    /// Message published to a broker.
    Producer,
    /// Message consumed from a broker.
    Consumer,
}

impl SpanKind {
    /// Stable lowercase name, used in tags and logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Internal => "internal",
            Self::Client => "client",
            Self::Server => "server",
            Self::Producer => "producer",
            Self::Consumer => "consumer",
        }
    }
}

impl fmt::Display for SpanKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Completion status of a span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpanStatus {
    /// No explicit outcome recorded.
    #[default]
    Unset,
    /// Completed successfully.
    Ok,
    /// Completed with a failure.
    Error,
}

/// A scalar tag value, or a homogeneous array of scalars.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TagValue {
    /// Boolean scalar.
    Bool(bool),
    /// Signed 64-bit integer scalar.
    I64(i64),
    /// Double-precision float scalar.
    F64(f64),
    /// String scalar.
    String(String),
    /// Homogeneous array of booleans.
    BoolArray(Vec<bool>),
    /// Homogeneous array of integers.
    I64Array(Vec<i64>),
    /// Homogeneous array of floats.
    F64Array(Vec<f64>),
    /// Homogeneous array of strings.
    StringArray(Vec<String>),
}

impl TagValue {
    /// Render the value the way the fallback metric backend and log
    /// enrichment print scalars. Arrays join elements with commas.
    pub fn to_display_string(&self) -> String {
        fn join<T: fmt::Display>(items: &[T]) -> String {
            let mut out = String::new();
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&item.to_string());
            }
            out
        }

        match self {
            Self::Bool(v) => v.to_string(),
            Self::I64(v) => v.to_string(),
            Self::F64(v) => v.to_string(),
            Self::String(v) => v.clone(),
            Self::BoolArray(v) => join(v),
            Self::I64Array(v) => join(v),
            Self::F64Array(v) => join(v),
            Self::StringArray(v) => join(v),
        }
    }
}

impl From<bool> for TagValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}
impl From<i64> for TagValue {
    fn from(v: i64) -> Self {
        Self::I64(v)
    }
}
impl From<f64> for TagValue {
    fn from(v: f64) -> Self {
        Self::F64(v)
    }
}
impl From<&str> for TagValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}
impl From<String> for TagValue {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

/// A timestamped event attached to a span.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpanEvent {
    /// Event name.
    pub name: String,
    /// Wall-clock time the event occurred.
    pub timestamp: SystemTime,
    /// Event attributes in insertion order.
    pub attributes: Vec<(String, TagValue)>,
}

/// One finished (or in-flight) unit of traced work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Span {
    /// This span's id, never zero.
    pub span_id: SpanId,
    /// Owning trace id, never zero.
    pub trace_id: TraceId,
    /// Parent span id, absent for root spans.
    pub parent_span_id: Option<SpanId>,
    /// Name of the activity source that produced the span.
    pub source_name: String,
    /// Operation the span measures.
    pub operation_name: String,
    /// Role relative to the trace.
    pub kind: SpanKind,
    /// Wall-clock start time.
    pub start_time: SystemTime,
    /// Elapsed duration, zero until the owning scope ends.
    pub duration: Duration,
    /// Outcome.
    pub status: SpanStatus,
    /// Optional human-readable status detail.
    pub status_description: Option<String>,
    /// Tags in insertion order; keys unique.
    pub tags: Vec<(String, TagValue)>,
    /// Events in insertion order.
    pub events: Vec<SpanEvent>,
}

impl Span {
    /// Start a new span record with the given identity.
    pub fn new(
        trace_id: TraceId,
        span_id: SpanId,
        source_name: impl Into<String>,
        operation_name: impl Into<String>,
        kind: SpanKind,
    ) -> Self {
        Self {
            span_id,
            trace_id,
            parent_span_id: None,
            source_name: source_name.into(),
            operation_name: operation_name.into(),
            kind,
            start_time: SystemTime::now(),
            duration: Duration::ZERO,
            status: SpanStatus::Unset,
            status_description: None,
            tags: Vec::new(),
            events: Vec::new(),
        }
    }

    /// Set the parent span id.
    #[must_use]
    pub fn with_parent(mut self, parent: Option<SpanId>) -> Self {
        self.parent_span_id = parent;
        self
    }

    /// Insert or replace a tag, preserving first-insertion order.
    pub fn set_tag(&mut self, key: impl Into<String>, value: impl Into<TagValue>) {
        let key = key.into();
        let value = value.into();
        if let Some(slot) = self.tags.iter_mut().find(|(k, _)| *k == key) {
            slot.1 = value;
        } else {
            self.tags.push((key, value));
        }
    }

    /// Look up a tag by key.
    pub fn tag(&self, key: &str) -> Option<&TagValue> {
        self.tags.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Append an event with the current timestamp.
    pub fn add_event(&mut self, name: impl Into<String>, attributes: Vec<(String, TagValue)>) {
        self.events.push(SpanEvent {
            name: name.into(),
            timestamp: SystemTime::now(),
            attributes,
        });
    }

    /// Mark the outcome and optional description.
    pub fn set_status(&mut self, status: SpanStatus, description: Option<String>) {
        self.status = status;
        self.status_description = description;
    }
}
