//! Work items - the tagged records the bounded pipeline transports

use serde::{Deserialize, Serialize};
use std::time::SystemTime;

use crate::measurement::Measurement;
use crate::span::{Span, TagValue};

/// A structured, timestamped event record.
///
/// Used by the fallback metric backend and the exception aggregator; sinks
/// that accept events receive them alongside spans and measurements.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredEvent {
    /// Event name.
    pub name: String,
    /// Wall-clock time of the event.
    pub timestamp: SystemTime,
    /// Attributes in insertion order.
    pub attributes: Vec<(String, TagValue)>,
}

impl StructuredEvent {
    /// Build an event stamped with the current time.
    pub fn now(name: impl Into<String>, attributes: Vec<(String, TagValue)>) -> Self {
        Self {
            name: name.into(),
            timestamp: SystemTime::now(),
            attributes,
        }
    }
}

/// The record kinds a sink can accept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    /// Finished span records.
    Span,
    /// Metric measurements.
    Measurement,
    /// Structured events.
    Event,
}

/// One unit of work flowing through the bounded pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WorkItem {
    /// A frozen span, moved in from its operation scope.
    Span(Span),
    /// A metric sample.
    Measurement(Measurement),
    /// A structured event.
    Event(StructuredEvent),
}

impl WorkItem {
    /// The record kind, used by sinks to filter.
    pub fn kind(&self) -> RecordKind {
        match self {
            Self::Span(_) => RecordKind::Span,
            Self::Measurement(_) => RecordKind::Measurement,
            Self::Event(_) => RecordKind::Event,
        }
    }

    /// The operation-type label used to aggregate drop warnings: the
    /// operation name for spans, the instrument name for measurements, the
    /// event name for events.
    pub fn operation_type(&self) -> &str {
        match self {
            Self::Span(span) => &span.operation_name,
            Self::Measurement(m) => &m.instrument,
            Self::Event(e) => &e.name,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{SpanId, TraceId};
    use crate::span::SpanKind;

    #[test]
    fn kinds_match_variants() {
        let span = Span::new(
            TraceId::random(),
            SpanId::random(),
            "src",
            "op",
            SpanKind::Internal,
        );
        let item = WorkItem::Span(span);
        assert_eq!(item.kind(), RecordKind::Span);
        assert_eq!(item.operation_type(), "op");

        let event = WorkItem::Event(StructuredEvent::now("evt", vec![]));
        assert_eq!(event.kind(), RecordKind::Event);
        assert_eq!(event.operation_type(), "evt");
    }
}
