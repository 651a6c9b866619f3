//! Process-embedded application telemetry for Rust
//!
//! Lumen captures structured observations about an application's own
//! execution - operation timing, errors, distributed-trace spans,
//! correlation identifiers, and numeric metrics - and moves them through a
//! bounded, drop-oldest pipeline to pluggable sinks. Correlation and trace
//! context follow the execution flow across threads, `.await` points, and
//! wire boundaries (W3C trace context, vendor headers, SOAP headers,
//! broker message headers).
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use lumen::Telemetry;
//! use lumen_config::TelemetryConfig;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let guard = Telemetry::builder()
//!         .config(TelemetryConfig::default())
//!         .init()?;
//!
//!     {
//!         let runtime = guard.runtime();
//!         let mut scope = runtime.begin("startup::warm_caches").start();
//!         scope.set_tag("cache.count", 3i64);
//!         // work happens here; the scope ends on drop
//!     }
//!
//!     guard.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! ```text
//! caller -> OperationScope -> Sampler -> Span
//!                |                        |
//!                +-- Metric Recorder      +-> BoundedWorker -> Sinks
//!                        |                         ^
//!                        +-- Measurements ---------+
//! ```
//!
//! The workspace splits along those seams: `lumen-core` (data model and
//! execution-local context), `lumen-sampling`, `lumen-metrics`,
//! `lumen-pipeline`, `lumen-config`, `lumen-propagation`, and this facade,
//! which owns operation scopes, exception recording, log enrichment, wire
//! adapters, and the runtime lifecycle.

#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod adapters;
pub mod capture;
pub mod enrich;
pub mod exceptions;
mod runtime;
mod scope;

pub use capture::{CapturedParameter, CapturedValue, PiiDetector};
pub use enrich::CorrelationFormat;
pub use exceptions::{ErrorAggregator, ErrorTypeStats, FirstChanceHookConfig, TokenBucket};
pub use runtime::{
    OPERATION_DURATION_METRIC, OPERATION_ERRORS_METRIC, SHUTDOWN_FLUSH_TIMEOUT, Telemetry,
    TelemetryBuilder, TelemetryGuard, TelemetryRuntime,
};
pub use scope::{OperationScope, ScopeBuilder};

// The foundational types, re-exported so most callers need only `lumen`.
pub use lumen_core::{
    ActiveSpan, Carrier, ContextSnapshot, CorrelationContext, CorrelationId, FutureExt,
    HeaderMapCarrier, Measurement, MetricTag, RecordKind, Span, SpanId, SpanKind, SpanStatus,
    StructuredEvent, TagValue, TelemetryError, TelemetryResult, TraceContext, TraceFlags, TraceId,
    TraceState, WorkItem,
};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::adapters;
    pub use crate::capture::CapturedValue;
    pub use crate::runtime::{Telemetry, TelemetryGuard, TelemetryRuntime};
    pub use crate::scope::{OperationScope, ScopeBuilder};
    pub use lumen_config::TelemetryConfig;
    pub use lumen_core::prelude::*;
    pub use lumen_metrics::MetricRecorder;
    pub use lumen_pipeline::{BufferSink, TelemetrySink, TracingSink};
    pub use lumen_sampling::{Sampler, SamplingContext, SamplingDecision, SamplingResult};
}
