//! Bounded asynchronous telemetry pipeline for Lumen
//!
//! The pipeline moves finished records (spans, measurements, events) from
//! producer threads to pluggable sinks through a bounded ring with
//! drop-oldest backpressure:
//!
//! - [`BoundedWorker`] - single-reader multi-writer queue, crash-resilient
//!   worker loop with exponential-backoff restarts and a circuit breaker,
//!   drain-with-timeout flush
//! - [`TelemetrySink`] / [`FanOutDispatcher`] - the consumer contract and
//!   the standard fan-out delivery
//! - [`PipelineStats`] / [`HealthThresholds`] - read-only statistics and
//!   health classification
//!
//! Producers never block and the pipeline never propagates its own failures
//! into the host application: delivery problems are logged and counted.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use lumen_core::{StructuredEvent, WorkItem};
//! use lumen_pipeline::{BoundedWorker, FanOutDispatcher, TracingSink, WorkerConfig};
//!
//! # async fn example() {
//! let dispatcher = Arc::new(FanOutDispatcher::with_sinks(vec![Arc::new(TracingSink::new())]));
//! let worker = BoundedWorker::spawn(WorkerConfig::default(), dispatcher);
//!
//! worker.try_enqueue(WorkItem::Event(StructuredEvent::now("startup", vec![])));
//! let outcome = worker.flush(Duration::from_secs(5)).await.unwrap();
//! assert!(outcome.success);
//! worker.shutdown().await;
//! # }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]

mod sink;
mod stats;
mod worker;

pub use sink::{
    BufferSink, DispatchOutcome, Dispatcher, FanOutDispatcher, TelemetrySink, TracingSink,
};
pub use stats::{
    HealthStatus, HealthThresholds, PipelineStats, RollingErrorRate, WorkerCounters,
};
pub use worker::{
    BoundedWorker, DISPOSE_GRACE, FlushOutcome, MAX_RESTART_BACKOFF, WorkerConfig, WorkerState,
};
