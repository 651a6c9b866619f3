//! Operation scopes
//!
//! An [`OperationScope`] surrounds one observable unit of work. Beginning a
//! scope captures the ambient correlation id, consults the sampler,
//! allocates span identity (inheriting the trace from the ambient parent),
//! and installs itself as the ambient span so nested scopes and outbound
//! calls see it. Ending the scope - explicitly or by drop, on any exit path
//! - computes the duration, records the duration/error metrics, enqueues
//! the frozen span when recording, and restores the prior ambient state.
//!
//! A dropped-by-sampling scope still carries a span context, so downstream
//! children keep propagating; it just produces no span record.
//!
//! # Example
//!
//! ```rust,no_run
//! use lumen::Telemetry;
//!
//! # fn work() -> Result<(), std::io::Error> { Ok(()) }
//! let runtime = Telemetry::global().expect("telemetry initialized");
//! let mut scope = runtime.begin("orders::OrderService::place_order").start();
//! scope.set_tag("order.count", 3i64);
//!
//! match work() {
//!     Ok(()) => {}
//!     Err(error) => {
//!         scope.record_error(&error);
//!     }
//! }
//! // Scope ends at drop; duration and status are recorded either way.
//! ```

use std::future::Future;
use std::time::Instant;
use tracing::debug;

use lumen_core::context::{ContextPropagate, FutureExt as _};
use lumen_core::{
    ActiveSpan, ActiveSpanGuard, ContextSnapshot, CorrelationContext, CorrelationGuard,
    CorrelationId, MetricTag, Span, SpanId, SpanKind, SpanStatus, TagValue, TraceContext,
    TraceFlags, TraceId, WorkItem,
};
use lumen_sampling::{Sampler, SamplingContext};

use crate::capture::{CapturedValue, render_parameters};
use crate::exceptions::{exception_attributes, short_type_name};
use crate::runtime::TelemetryRuntime;

/// Builder for an [`OperationScope`].
#[derive(Debug)]
pub struct ScopeBuilder {
    runtime: Option<TelemetryRuntime>,
    operation_name: String,
    kind: SpanKind,
    source: Option<String>,
    parent: Option<TraceContext>,
    correlation: Option<CorrelationId>,
    tags: Vec<(String, TagValue)>,
    parameters: Vec<(String, CapturedValue)>,
}

impl ScopeBuilder {
    pub(crate) fn new(runtime: Option<TelemetryRuntime>, operation_name: String) -> Self {
        Self {
            runtime,
            operation_name,
            kind: SpanKind::Internal,
            source: None,
            parent: None,
            correlation: None,
            tags: Vec::new(),
            parameters: Vec::new(),
        }
    }

    /// Set the span kind (defaults to internal).
    #[must_use]
    pub fn kind(mut self, kind: SpanKind) -> Self {
        self.kind = kind;
        self
    }

    /// Name the activity source; defaults to the configured service name.
    #[must_use]
    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Use an explicit parent instead of the ambient active span.
    #[must_use]
    pub fn parent(mut self, parent: TraceContext) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Bind this correlation id for the scope's duration instead of
    /// capturing the ambient one.
    #[must_use]
    pub fn correlation(mut self, id: CorrelationId) -> Self {
        self.correlation = Some(id);
        self
    }

    /// Stamp a tag on the span at begin.
    #[must_use]
    pub fn tag(mut self, key: impl Into<String>, value: impl Into<TagValue>) -> Self {
        self.tags.push((key.into(), value.into()));
        self
    }

    /// Offer a parameter for capture; whether and how deep it is captured
    /// follows the configuration for this operation.
    #[must_use]
    pub fn parameter(mut self, name: impl Into<String>, value: impl Into<CapturedValue>) -> Self {
        self.parameters.push((name.into(), value.into()));
        self
    }

    /// Begin the scope.
    pub fn start(self) -> OperationScope {
        OperationScope::begin_with(self)
    }

    /// Run a future inside the scope.
    ///
    /// The scope's context follows the future across `.await` points and
    /// task migration (the ambient slots are installed per poll, not held
    /// across suspension), and the scope ends when the future completes on
    /// any path.
    pub async fn run<F: Future>(self, work: F) -> F::Output {
        let (mut scope, work) = Self::attach(self, work);
        let output = work.await;
        scope.end();
        output
    }

    /// [`ScopeBuilder::run`] for fallible work: an `Err` completion is
    /// recorded on the scope and the span status becomes error.
    pub async fn run_checked<F, T, E>(self, work: F) -> Result<T, E>
    where
        F: Future<Output = Result<T, E>>,
        E: std::error::Error,
    {
        let (mut scope, work) = Self::attach(self, work);
        let result = work.await;
        if let Err(error) = &result {
            scope.record_error(error);
        }
        scope.end();
        result
    }

    fn attach<F: Future>(builder: Self, work: F) -> (OperationScope, ContextPropagate<F>) {
        let mut scope = builder.start();
        // Capture while the new scope is ambient, then release the
        // thread-local guards so nothing is held across suspension.
        let snapshot = ContextSnapshot::capture();
        scope.release_ambient();
        (scope, work.with_context(snapshot))
    }
}

/// A live operation scope. See the [module docs](self) for the lifecycle.
#[derive(Debug)]
pub struct OperationScope {
    runtime: Option<TelemetryRuntime>,
    operation_name: String,
    context: TraceContext,
    span: Option<Span>,
    correlation: CorrelationId,
    started: Instant,
    failed: bool,
    status_description: Option<String>,
    exception_type: Option<String>,
    ended: bool,
    span_guard: Option<ActiveSpanGuard>,
    correlation_guard: Option<CorrelationGuard>,
}

impl OperationScope {
    /// Begin a scope on the process-wide runtime. Without one the scope
    /// still propagates context but records nothing.
    pub fn begin(operation_name: impl Into<String>) -> ScopeBuilder {
        ScopeBuilder::new(crate::runtime::Telemetry::global(), operation_name.into())
    }

    fn begin_with(builder: ScopeBuilder) -> Self {
        let ScopeBuilder {
            runtime,
            operation_name,
            kind,
            source,
            parent,
            correlation,
            tags,
            parameters,
        } = builder;

        // 1. Correlation: bind the supplied id, or capture (materializing)
        //    the ambient one.
        let (correlation, correlation_guard) = match correlation {
            Some(id) => {
                let guard = CorrelationContext::begin_scope_with(id.clone());
                (id, Some(guard))
            }
            None => (CorrelationContext::current(), None),
        };

        // 2. Span identity: inherit the trace from the explicit or ambient
        //    parent, fresh ids otherwise.
        let parent = parent.or_else(ActiveSpan::current);
        let trace_id = parent.as_ref().map_or_else(TraceId::random, |p| p.trace_id);
        let parent_span_id = parent.as_ref().map(|p| p.span_id);
        let span_id = SpanId::random();

        let config = runtime.as_ref().map(|r| r.config());
        let enabled = config.as_ref().is_none_or(|c| c.enabled);
        let source_name = source.unwrap_or_else(|| {
            config
                .as_ref()
                .map_or_else(|| "lumen".to_string(), |c| c.service_name.clone())
        });
        let resolved = config.as_ref().map(|c| c.resolve(&operation_name));

        // 3. Sampling decision, deterministic in the trace id. An explicit
        //    per-operation rate from configuration wins over the family.
        let sampled = if !enabled {
            false
        } else if let Some(runtime) = &runtime {
            let sampling_ctx =
                SamplingContext::new(trace_id, &source_name, &operation_name, kind)
                    .with_tags(&tags);
            match resolved.as_ref().and_then(|r| r.sampling_rate) {
                Some(rate) => sampled_at_rate(rate, trace_id),
                None => {
                    let sampler = runtime.core.sampler.read().clone();
                    sampler.should_sample(&sampling_ctx).is_sampled()
                }
            }
        } else {
            false
        };

        let context = TraceContext::new(trace_id, span_id, TraceFlags::NONE.with_sampled(sampled))
            .with_state(parent.and_then(|p| p.state));

        // 4. The span record, only when recording.
        let span = sampled.then(|| {
            let mut span = Span::new(trace_id, span_id, &source_name, &operation_name, kind)
                .with_parent(parent_span_id);
            if let Some(resolved) = &resolved {
                for (key, value) in &resolved.tags {
                    span.set_tag(key.clone(), value.as_str());
                }
            }
            for (key, value) in tags {
                span.set_tag(key, value);
            }
            if let Some(runtime) = &runtime
                && let Some(resolved) = &resolved
            {
                for parameter in
                    render_parameters(&parameters, resolved.parameter_capture, &runtime.core.pii)
                {
                    match parameter.value {
                        Some(value) => span.set_tag(format!("param.{}", parameter.name), value),
                        None => span.set_tag(
                            format!("param.{}", parameter.name),
                            TagValue::Bool(true),
                        ),
                    }
                }
            }
            span
        });

        // 5. Become the ambient span so children nest under us.
        let span_guard = Some(ActiveSpan::set(context.clone()));

        Self {
            runtime,
            operation_name,
            context,
            span,
            correlation,
            started: Instant::now(),
            failed: false,
            status_description: None,
            exception_type: None,
            ended: false,
            span_guard,
            correlation_guard,
        }
    }

    /// This scope's span context, for propagation.
    pub fn context(&self) -> &TraceContext {
        &self.context
    }

    /// The correlation id captured at begin.
    pub fn correlation(&self) -> &CorrelationId {
        &self.correlation
    }

    /// The operation name.
    pub fn operation_name(&self) -> &str {
        &self.operation_name
    }

    /// Whether a span record will be produced at end.
    pub fn is_recording(&self) -> bool {
        self.span.is_some()
    }

    /// Whether the scope already ended.
    pub fn is_ended(&self) -> bool {
        self.ended
    }

    /// Insert or replace a span tag. A no-op after end or when not
    /// recording.
    pub fn set_tag(&mut self, key: impl Into<String>, value: impl Into<TagValue>) {
        if self.ended {
            debug!(operation = %self.operation_name, "ignoring tag on ended scope");
            return;
        }
        if let Some(span) = &mut self.span {
            span.set_tag(key, value);
        }
    }

    /// Append a span event. A no-op after end or when not recording.
    pub fn add_event(&mut self, name: impl Into<String>, attributes: Vec<(String, TagValue)>) {
        if self.ended {
            debug!(operation = %self.operation_name, "ignoring event on ended scope");
            return;
        }
        if let Some(span) = &mut self.span {
            span.add_event(name, attributes);
        }
    }

    /// Record an error against the scope: an `exception` event on the
    /// span, the type fed to the aggregator, and the status forced to
    /// error at end.
    pub fn record_error<E: std::error::Error + ?Sized>(&mut self, error: &E) {
        let type_name = short_type_name(std::any::type_name_of_val(error));
        self.record_error_parts(type_name, &error.to_string(), None);
    }

    /// [`OperationScope::record_error`] from pre-split parts, for callers
    /// holding only strings (FFI boundaries, log forwarding).
    pub fn record_error_parts(&mut self, type_name: &str, message: &str, backtrace: Option<&str>) {
        if self.ended {
            debug!(operation = %self.operation_name, "ignoring error on ended scope");
            return;
        }
        self.exception_type = Some(type_name.to_string());
        let record = match &self.runtime {
            Some(runtime) => {
                runtime.core.errors.record(type_name);
                runtime.config().resolve(&self.operation_name).record_exceptions
            }
            None => true,
        };
        if record && let Some(span) = &mut self.span {
            span.add_event("exception", exception_attributes(type_name, message, backtrace));
        }
    }

    /// Mark the operation as failed; status becomes error at end.
    pub fn mark_failed(&mut self, description: Option<&str>) {
        if self.ended {
            debug!(operation = %self.operation_name, "ignoring failure mark on ended scope");
            return;
        }
        self.failed = true;
        self.status_description = description.map(ToString::to_string);
    }

    /// End the scope. A second call is a no-op; drop calls this too.
    pub fn end(&mut self) {
        self.finish();
    }

    /// Restore the thread's ambient slots now instead of at end. Used when
    /// the scope's context travels by snapshot instead (async execution),
    /// where thread-local guards must not be held across suspension.
    fn release_ambient(&mut self) {
        self.span_guard.take();
        self.correlation_guard.take();
    }

    fn finish(&mut self) {
        if self.ended {
            debug!(operation = %self.operation_name, "scope already ended");
            return;
        }
        self.ended = true;

        let duration = self.started.elapsed();
        let is_error = self.failed || self.exception_type.is_some();
        let status = if is_error { "error" } else { "ok" };

        if let Some(runtime) = &self.runtime {
            let duration_tags = [
                MetricTag::new("operation", self.operation_name.as_str())
                    .expect("operation tag key is non-empty"),
                MetricTag::new("status", status).expect("status tag key is non-empty"),
            ];
            let _ = runtime
                .core
                .duration_histogram
                .record(duration.as_secs_f64() * 1000.0, &duration_tags);

            if is_error {
                let mut error_tags = vec![
                    MetricTag::new("operation", self.operation_name.as_str())
                        .expect("operation tag key is non-empty"),
                ];
                if let Some(exception_type) = &self.exception_type
                    && let Ok(tag) = MetricTag::new("exception.type", exception_type.as_str())
                {
                    error_tags.push(tag);
                }
                let _ = runtime.core.error_counter.add(1, &error_tags);
            }
        }

        if let Some(mut span) = self.span.take() {
            span.duration = duration;
            let span_status = if is_error { SpanStatus::Error } else { SpanStatus::Ok };
            span.set_status(span_status, self.status_description.take());
            if let Some(runtime) = &self.runtime {
                runtime.core.worker.try_enqueue(WorkItem::Span(span));
            }
        }

        // 6. Restore the prior ambient span and correlation.
        self.span_guard.take();
        self.correlation_guard.take();
    }
}

impl Drop for OperationScope {
    fn drop(&mut self) {
        self.finish();
    }
}

/// Deterministic per-rate decision, identical to the probabilistic
/// sampler's trace-id-hash check.
fn sampled_at_rate(rate: f64, trace_id: TraceId) -> bool {
    if rate >= 1.0 {
        return true;
    }
    if rate <= 0.0 || rate.is_nan() {
        return false;
    }
    trace_id.low_u64() <= (rate * 18_446_744_073_709_551_616.0) as u64
}
