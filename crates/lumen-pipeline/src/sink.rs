//! Sink contract and dispatch
//!
//! A sink is a pluggable consumer of finished records. The worker fans each
//! item out to every sink that accepts its kind; one sink failing (by error
//! or by panic) is logged and counted but never reaches the other sinks or
//! the producer.

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, warn};

use lumen_core::{RecordKind, TelemetryResult, WorkItem};

/// A pluggable consumer of finished telemetry records.
pub trait TelemetrySink: Send + Sync + fmt::Debug {
    /// Stable name used in logs and failure counters.
    fn name(&self) -> &str;

    /// Which record kinds this sink wants. Defaults to all.
    fn accepts(&self, kind: RecordKind) -> bool {
        let _ = kind;
        true
    }

    /// Consume one record.
    ///
    /// # Errors
    ///
    /// Implementations report delivery problems with
    /// [`lumen_core::TelemetryError::SinkFailure`]; the worker logs and
    /// counts the failure without propagating it.
    fn submit(&self, item: &WorkItem) -> TelemetryResult<()>;

    /// Push any buffered records out, bounded by `timeout`.
    fn flush(&self, timeout: Duration) {
        let _ = timeout;
    }
}

/// Outcome of delivering one batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchOutcome {
    /// Items delivered to every accepting sink without failure.
    pub processed: u64,
    /// Items for which at least one sink failed.
    pub failed: u64,
}

/// Delivers batches of work items to their consumers.
///
/// The worker guards each `dispatch` call, so a panicking dispatcher
/// triggers the restart/backoff policy rather than killing the process.
/// [`FanOutDispatcher`] is the standard implementation; custom dispatchers
/// are mostly useful in tests.
pub trait Dispatcher: Send + Sync + fmt::Debug {
    /// Deliver a batch, reporting per-item outcomes.
    fn dispatch(&self, items: Vec<WorkItem>) -> DispatchOutcome;

    /// Flush every underlying consumer, bounded by `timeout`.
    fn flush(&self, timeout: Duration);
}

/// Fans each item out to every registered sink that accepts its kind.
#[derive(Debug, Default)]
pub struct FanOutDispatcher {
    sinks: Mutex<Vec<Arc<dyn TelemetrySink>>>,
}

impl FanOutDispatcher {
    /// Create an empty dispatcher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from an initial sink list.
    pub fn with_sinks(sinks: Vec<Arc<dyn TelemetrySink>>) -> Self {
        Self {
            sinks: Mutex::new(sinks),
        }
    }

    /// Register a sink. Registration order is flush/dispose order
    /// (reversed at shutdown).
    pub fn register(&self, sink: Arc<dyn TelemetrySink>) {
        self.sinks.lock().push(sink);
    }

    /// Snapshot of the registered sinks, in registration order.
    pub fn sinks(&self) -> Vec<Arc<dyn TelemetrySink>> {
        self.sinks.lock().clone()
    }

    fn submit_guarded(sink: &Arc<dyn TelemetrySink>, item: &WorkItem) -> bool {
        match catch_unwind(AssertUnwindSafe(|| sink.submit(item))) {
            Ok(Ok(())) => true,
            Ok(Err(error)) => {
                warn!(
                    sink = sink.name(),
                    operation_type = item.operation_type(),
                    %error,
                    "sink rejected telemetry record"
                );
                false
            }
            Err(_) => {
                warn!(
                    sink = sink.name(),
                    operation_type = item.operation_type(),
                    "sink panicked while consuming telemetry record"
                );
                false
            }
        }
    }
}

impl Dispatcher for FanOutDispatcher {
    fn dispatch(&self, items: Vec<WorkItem>) -> DispatchOutcome {
        let sinks = self.sinks();
        let mut outcome = DispatchOutcome::default();

        for item in items {
            let mut any_failed = false;
            for sink in sinks.iter().filter(|sink| sink.accepts(item.kind())) {
                if !Self::submit_guarded(sink, &item) {
                    any_failed = true;
                }
            }
            if any_failed {
                outcome.failed += 1;
            } else {
                outcome.processed += 1;
            }
        }
        outcome
    }

    fn flush(&self, timeout: Duration) {
        for sink in self.sinks() {
            sink.flush(timeout);
        }
    }
}

/// Forwards spans and events to the structured log stream. The default
/// sink when nothing else is registered, so telemetry is visible out of
/// the box.
#[derive(Debug, Default)]
pub struct TracingSink;

impl TracingSink {
    /// Create the sink.
    pub fn new() -> Self {
        Self
    }
}

impl TelemetrySink for TracingSink {
    fn name(&self) -> &str {
        "tracing"
    }

    fn accepts(&self, kind: RecordKind) -> bool {
        matches!(kind, RecordKind::Span | RecordKind::Event)
    }

    fn submit(&self, item: &WorkItem) -> TelemetryResult<()> {
        match item {
            WorkItem::Span(span) => {
                debug!(
                    trace_id = %span.trace_id,
                    span_id = %span.span_id,
                    operation = %span.operation_name,
                    kind = %span.kind,
                    status = ?span.status,
                    duration_ms = span.duration.as_secs_f64() * 1000.0,
                    "span completed"
                );
            }
            WorkItem::Event(event) => {
                debug!(event = %event.name, attributes = event.attributes.len(), "telemetry event");
            }
            WorkItem::Measurement(_) => {}
        }
        Ok(())
    }
}

/// Buffers every accepted record in memory. Intended for tests and local
/// inspection.
#[derive(Debug, Default)]
pub struct BufferSink {
    items: Mutex<Vec<WorkItem>>,
}

impl BufferSink {
    /// Create an empty buffer sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// All records received so far, in delivery order.
    pub fn items(&self) -> Vec<WorkItem> {
        self.items.lock().clone()
    }

    /// Number of records received.
    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    /// Whether nothing was received yet.
    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    /// Drop all buffered records.
    pub fn clear(&self) {
        self.items.lock().clear();
    }
}

impl TelemetrySink for BufferSink {
    fn name(&self) -> &str {
        "buffer"
    }

    fn submit(&self, item: &WorkItem) -> TelemetryResult<()> {
        self.items.lock().push(item.clone());
        Ok(())
    }
}
