//! Core data model and execution-local context for Lumen
//!
//! This crate is the foundation layer of the Lumen telemetry library. It
//! holds the value types every other crate speaks - ids, trace contexts,
//! spans, measurements, work items - plus the two ambient slots (correlation
//! id and active span) that follow an execution flow across threads and
//! `.await` points.
//!
//! Nothing here talks to a backend or spawns a task; higher layers
//! (`lumen-pipeline`, `lumen-metrics`, `lumen`) build on these types.
//!
//! # Example
//!
//! ```rust
//! use lumen_core::prelude::*;
//!
//! let ctx = TraceContext::parse_traceparent(
//!     "00-0af7651916cd43dd8448eb211c80319c-b7ad6b7169203331-01",
//! )
//! .expect("valid traceparent");
//! assert!(ctx.is_sampled());
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod carrier;
pub mod context;
pub mod error;
pub mod ids;
pub mod item;
pub mod measurement;
pub mod span;
pub mod trace;

pub use carrier::{Carrier, HeaderMapCarrier};
pub use context::{
    ActiveSpan, ActiveSpanGuard, ContextPropagate, ContextSnapshot, CorrelationContext,
    CorrelationGuard, FutureExt,
};
pub use error::{TelemetryError, TelemetryResult};
pub use ids::{CorrelationId, MAX_CORRELATION_ID_LEN, SpanId, TraceId};
pub use item::{RecordKind, StructuredEvent, WorkItem};
pub use measurement::{InstrumentKind, Measurement, MeasurementValue, MetricTag, validate_tag_set};
pub use span::{Span, SpanEvent, SpanKind, SpanStatus, TagValue};
pub use trace::{MAX_TRACE_STATE_LEN, TraceContext, TraceFlags, TraceState};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::carrier::{Carrier, HeaderMapCarrier};
    pub use crate::context::{ActiveSpan, ContextSnapshot, CorrelationContext, FutureExt};
    pub use crate::error::{TelemetryError, TelemetryResult};
    pub use crate::ids::{CorrelationId, SpanId, TraceId};
    pub use crate::item::{RecordKind, StructuredEvent, WorkItem};
    pub use crate::measurement::{InstrumentKind, Measurement, MeasurementValue, MetricTag};
    pub use crate::span::{Span, SpanKind, SpanStatus, TagValue};
    pub use crate::trace::{TraceContext, TraceFlags, TraceState};
}
