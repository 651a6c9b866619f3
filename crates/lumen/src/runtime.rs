//! Telemetry runtime and lifecycle
//!
//! [`Telemetry::builder`] assembles the whole subsystem: the bounded
//! worker, the sink set, the metric recorder with its gauge timer, the
//! sampler family, configuration with hot reload, and (optionally) the
//! first-chance panic hook. The result is a [`TelemetryGuard`] whose
//! explicit [`TelemetryGuard::shutdown`] drains and disposes everything in
//! order; dropping the guard is a best-effort fallback.
//!
//! # Example
//!
//! ```rust,no_run
//! use lumen::Telemetry;
//! use lumen_config::TelemetryConfig;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let guard = Telemetry::builder()
//!         .config(TelemetryConfig::default())
//!         .install_global(true)
//!         .init()?;
//!
//!     {
//!         let mut scope = guard.runtime().begin("startup").start();
//!         scope.set_tag("app.ready", true);
//!     }
//!
//!     guard.shutdown().await;
//!     Ok(())
//! }
//! ```

use once_cell::sync::Lazy;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{info, warn};

use lumen_config::{ConfigStore, ReloadSubscription, TelemetryConfig};
use lumen_core::{Measurement, TelemetryError, TelemetryResult, WorkItem};
use lumen_metrics::{
    Counter, FALLBACK_OBSERVE_INTERVAL, GaugeDriver, GaugeHandle, HistogramF64, MetricRecorder,
};
use lumen_pipeline::{
    BoundedWorker, FanOutDispatcher, FlushOutcome, HealthStatus, HealthThresholds, PipelineStats,
    TelemetrySink, TracingSink, WorkerConfig,
};
use lumen_propagation::Propagator;
use lumen_sampling::{ConditionalSampler, PerSourceSampler, ProbabilisticSampler, Sampler};

use crate::capture::PiiDetector;
use crate::exceptions::{ErrorAggregator, FirstChanceHookConfig, install_first_chance_hook};

/// How long shutdown waits for the pipeline to drain.
pub const SHUTDOWN_FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

/// Histogram of operation durations in milliseconds.
pub const OPERATION_DURATION_METRIC: &str = "telemetry.operation.duration";

/// Counter of failed operations.
pub const OPERATION_ERRORS_METRIC: &str = "telemetry.operation.errors";

pub(crate) struct RuntimeCore {
    pub(crate) config: Arc<ConfigStore>,
    pub(crate) sampler: RwLock<Arc<dyn Sampler>>,
    pub(crate) worker: BoundedWorker,
    pub(crate) dispatcher: Arc<FanOutDispatcher>,
    pub(crate) recorder: MetricRecorder,
    pub(crate) duration_histogram: HistogramF64,
    pub(crate) error_counter: Counter,
    pub(crate) errors: Arc<ErrorAggregator>,
    pub(crate) propagator: Propagator,
    pub(crate) pii: PiiDetector,
    pub(crate) health_thresholds: HealthThresholds,
    gauge_driver: Mutex<Option<GaugeDriver>>,
    stat_gauges: Mutex<Vec<GaugeHandle>>,
    reload_subscription: Mutex<Option<ReloadSubscription>>,
    shutdown_done: AtomicBool,
}

impl std::fmt::Debug for RuntimeCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeCore")
            .field("service", &self.config.snapshot().service_name)
            .field("worker", &self.worker)
            .finish()
    }
}

/// Cloneable handle to an initialized telemetry subsystem.
#[derive(Debug, Clone)]
pub struct TelemetryRuntime {
    pub(crate) core: Arc<RuntimeCore>,
}

/// Entry points for initializing and reaching telemetry.
#[derive(Debug)]
pub struct Telemetry;

static GLOBAL_RUNTIME: Lazy<Mutex<Option<TelemetryRuntime>>> = Lazy::new(|| Mutex::new(None));

impl Telemetry {
    /// Start assembling a runtime.
    pub fn builder() -> TelemetryBuilder {
        TelemetryBuilder::default()
    }

    /// The process-wide runtime, when one is installed.
    pub fn global() -> Option<TelemetryRuntime> {
        GLOBAL_RUNTIME.lock().clone()
    }

    /// Remove the process-wide runtime. Intended for test isolation;
    /// shutdown still has to be invoked on the guard.
    pub fn reset_global() {
        *GLOBAL_RUNTIME.lock() = None;
    }
}

/// Builds a [`TelemetryRuntime`].
pub struct TelemetryBuilder {
    config: TelemetryConfig,
    sinks: Vec<Arc<dyn TelemetrySink>>,
    sampler_override: Option<Arc<dyn Sampler>>,
    worker_overrides: Option<WorkerConfig>,
    install_global: bool,
}

impl std::fmt::Debug for TelemetryBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelemetryBuilder")
            .field("service", &self.config.service_name)
            .field("sinks", &self.sinks.len())
            .field("install_global", &self.install_global)
            .finish()
    }
}

impl Default for TelemetryBuilder {
    fn default() -> Self {
        Self {
            config: TelemetryConfig::default(),
            sinks: Vec::new(),
            sampler_override: None,
            worker_overrides: None,
            install_global: true,
        }
    }
}

impl TelemetryBuilder {
    /// Use this configuration.
    #[must_use]
    pub fn config(mut self, config: TelemetryConfig) -> Self {
        self.config = config;
        self
    }

    /// Register a sink. Registration order is flush order; disposal runs
    /// in reverse. With no sinks registered a [`TracingSink`] is used.
    #[must_use]
    pub fn sink(mut self, sink: Arc<dyn TelemetrySink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Replace the config-derived sampler family entirely.
    #[must_use]
    pub fn sampler(mut self, sampler: Arc<dyn Sampler>) -> Self {
        self.sampler_override = Some(sampler);
        self
    }

    /// Override the worker parameters (capacity and batch size otherwise
    /// come from the configuration's queue section).
    #[must_use]
    pub fn worker_config(mut self, config: WorkerConfig) -> Self {
        self.worker_overrides = Some(config);
        self
    }

    /// Whether to install the runtime as the process-wide default
    /// (the default). Disable for isolated runtimes in tests.
    #[must_use]
    pub fn install_global(mut self, install: bool) -> Self {
        self.install_global = install;
        self
    }

    /// Construct, start, and (optionally) globally install the runtime.
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError::InitializationFailed`] when no tokio
    /// runtime is active, and propagates configuration errors.
    pub fn init(self) -> TelemetryResult<TelemetryGuard> {
        if tokio::runtime::Handle::try_current().is_err() {
            return Err(TelemetryError::InitializationFailed(
                "telemetry must be initialized within a tokio runtime".to_string(),
            ));
        }

        let worker_config = self.worker_overrides.unwrap_or(WorkerConfig {
            capacity: self.config.queue.capacity,
            batch_size: self.config.queue.batch_size,
            ..WorkerConfig::default()
        });

        let sinks = if self.sinks.is_empty() {
            vec![Arc::new(TracingSink::new()) as Arc<dyn TelemetrySink>]
        } else {
            self.sinks
        };
        let dispatcher = Arc::new(FanOutDispatcher::with_sinks(sinks));
        let worker = BoundedWorker::spawn(worker_config, Arc::clone(&dispatcher) as _);

        let sampler = self
            .sampler_override
            .unwrap_or_else(|| build_sampler(&self.config));

        let recorder = MetricRecorder::new();
        let duration_histogram = recorder.histogram_f64_with(
            OPERATION_DURATION_METRIC,
            Some("milliseconds"),
            Some("Duration of completed operations"),
        )?;
        let error_counter = recorder.counter_with(
            OPERATION_ERRORS_METRIC,
            Some("count"),
            Some("Operations that completed with an error"),
        )?;

        let gauge_driver = GaugeDriver::spawn(
            recorder.gauge_registry(),
            recorder.backend(),
            FALLBACK_OBSERVE_INTERVAL,
        );

        let errors = Arc::new(ErrorAggregator::new());
        if self.config.features.exception_tracking && self.config.first_chance.enabled {
            install_first_chance_hook(
                Arc::clone(&errors),
                FirstChanceHookConfig {
                    max_events_per_second: self.config.first_chance.max_events_per_second,
                    exclude_fragments: self.config.first_chance.exclude_exception_types.clone(),
                },
            );
        }

        let propagator = Propagator::new().with_vendor_headers(self.config.vendor.propagation_enabled);

        let core = Arc::new(RuntimeCore {
            config: Arc::new(ConfigStore::new(self.config)),
            sampler: RwLock::new(sampler),
            worker,
            dispatcher,
            recorder,
            duration_histogram,
            error_counter,
            errors,
            propagator,
            pii: PiiDetector::default(),
            health_thresholds: HealthThresholds::default(),
            gauge_driver: Mutex::new(Some(gauge_driver)),
            stat_gauges: Mutex::new(Vec::new()),
            reload_subscription: Mutex::new(None),
            shutdown_done: AtomicBool::new(false),
        });

        // Pipeline health is itself observable: queue depth and
        // utilization publish as gauges on the observation schedule.
        let weak = Arc::downgrade(&core);
        let depth_gauge = core.recorder.observable_gauge_with(
            "telemetry.queue.depth",
            &[],
            move || {
                weak.upgrade()
                    .map_or(0.0, |core| core.worker.queue_depth() as f64)
            },
            None,
            Some("Items currently queued in the telemetry pipeline"),
        )?;
        let weak = Arc::downgrade(&core);
        let utilization_gauge = core.recorder.observable_gauge_with(
            "telemetry.queue.utilization",
            &[],
            move || {
                weak.upgrade()
                    .map_or(0.0, |core| core.worker.stats().queue_utilization)
            },
            None,
            Some("Fraction of telemetry queue capacity in use"),
        )?;
        *core.stat_gauges.lock() = vec![depth_gauge, utilization_gauge];

        // Rebuild the sampler family whenever configuration is republished.
        let weak = Arc::downgrade(&core);
        let subscription = core.config.subscribe(move |_old, new| {
            if let Some(core) = weak.upgrade() {
                *core.sampler.write() = build_sampler(new);
            }
        });
        *core.reload_subscription.lock() = Some(subscription);

        // Measurements recorded through the metric recorder also travel
        // the pipeline for sinks that accept them.
        let weak = Arc::downgrade(&core);
        core.recorder.set_forwarder(Some(Arc::new(move |measurement: Measurement| {
            if let Some(core) = weak.upgrade() {
                core.worker.try_enqueue(WorkItem::Measurement(measurement));
            }
        })));

        let runtime = TelemetryRuntime { core };
        info!(
            service = %runtime.core.config.snapshot().service_name,
            "telemetry runtime initialized"
        );

        if self.install_global {
            *GLOBAL_RUNTIME.lock() = Some(runtime.clone());
        }

        Ok(TelemetryGuard { runtime })
    }
}

/// Build the sampler family from configuration: a per-source router over
/// probabilistic samplers, wrapped with the error/slow overlay where a
/// source requests it.
fn build_sampler(config: &TelemetryConfig) -> Arc<dyn Sampler> {
    let fallback_rate = if (0.0..=1.0).contains(&config.default_sampling_rate) {
        config.default_sampling_rate
    } else {
        1.0
    };
    let default: Arc<dyn Sampler> = Arc::new(
        ProbabilisticSampler::new(fallback_rate)
            .unwrap_or_else(|_| ProbabilisticSampler::new(1.0).expect("rate 1.0 is valid")),
    );

    let router = PerSourceSampler::new(default);
    for (source, entry) in &config.sampling {
        let rate = entry.rate.clamp(0.0, 1.0);
        let base: Arc<dyn Sampler> = match ProbabilisticSampler::new(rate) {
            Ok(sampler) => Arc::new(sampler),
            Err(_) => continue,
        };
        let sampler: Arc<dyn Sampler> = if entry.always_sample_errors {
            Arc::new(ConditionalSampler::new(base))
        } else {
            base
        };
        router.set_source(source.clone(), sampler);
    }
    Arc::new(router)
}

impl TelemetryRuntime {
    /// Begin building an operation scope. See
    /// [`ScopeBuilder`](crate::scope::ScopeBuilder).
    pub fn begin(&self, operation_name: impl Into<String>) -> crate::scope::ScopeBuilder {
        crate::scope::ScopeBuilder::new(Some(self.clone()), operation_name.into())
    }

    /// Lock-free snapshot of the current configuration.
    pub fn config(&self) -> Arc<TelemetryConfig> {
        self.core.config.snapshot()
    }

    /// Publish a new configuration; the sampler family and other
    /// subscribers rebuild from it.
    pub fn reload_config(&self, config: TelemetryConfig) {
        self.core.config.update(config);
    }

    /// Subscribe to configuration reloads.
    pub fn subscribe_config(
        &self,
        callback: impl Fn(&Arc<TelemetryConfig>, &Arc<TelemetryConfig>) + Send + Sync + 'static,
    ) -> ReloadSubscription {
        self.core.config.subscribe(callback)
    }

    /// The metric recorder backing this runtime.
    pub fn recorder(&self) -> &MetricRecorder {
        &self.core.recorder
    }

    /// The error aggregator backing this runtime.
    pub fn errors(&self) -> Arc<ErrorAggregator> {
        Arc::clone(&self.core.errors)
    }

    /// The propagator configured for this runtime.
    pub fn propagator(&self) -> &Propagator {
        &self.core.propagator
    }

    /// Offer a record directly to the pipeline.
    pub fn submit(&self, item: WorkItem) -> bool {
        self.core.worker.try_enqueue(item)
    }

    /// Close the pipeline to writes and drain it, bounded by `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError::ObjectDisposed`] after shutdown.
    pub async fn flush(&self, timeout: Duration) -> TelemetryResult<FlushOutcome> {
        self.core.worker.flush(timeout).await
    }

    /// Pipeline statistics with the sampler's current state folded in.
    pub fn stats(&self) -> PipelineStats {
        let mut stats = self.core.worker.stats();
        stats.current_sampling_rate = self.current_sampling_rate();
        stats
    }

    /// Health classification of the pipeline.
    pub fn health(&self) -> HealthStatus {
        self.core.health_thresholds.evaluate(&self.stats())
    }

    fn current_sampling_rate(&self) -> Option<f64> {
        let config = self.core.config.snapshot();
        Some(config.default_sampling_rate)
    }

    /// Drain and dispose everything, in order: flush the pipeline, stop
    /// the gauge timer, flush sinks in reverse registration order, dispose
    /// the worker. Idempotent.
    pub async fn shutdown(&self) {
        let core = &self.core;
        if core.shutdown_done.swap(true, Ordering::SeqCst) {
            return;
        }

        match core.worker.flush(SHUTDOWN_FLUSH_TIMEOUT).await {
            Ok(outcome) if !outcome.success => {
                warn!(
                    items_remaining = outcome.items_remaining,
                    "telemetry pipeline did not fully drain before shutdown"
                );
            }
            Err(error) => warn!(%error, "telemetry flush failed during shutdown"),
            _ => {}
        }

        core.stat_gauges.lock().clear();
        if let Some(driver) = core.gauge_driver.lock().take() {
            driver.stop();
        }
        core.recorder.set_forwarder(None);

        for sink in core.dispatcher.sinks().into_iter().rev() {
            sink.flush(SHUTDOWN_FLUSH_TIMEOUT);
        }

        core.worker.shutdown().await;
        core.reload_subscription.lock().take();

        // Uninstall ourselves if we are the process-wide default.
        let mut global = GLOBAL_RUNTIME.lock();
        if global
            .as_ref()
            .is_some_and(|runtime| Arc::ptr_eq(&runtime.core, &self.core))
        {
            *global = None;
        }
        drop(global);

        info!("telemetry runtime shut down");
    }
}

/// Owns the runtime lifecycle; keep it alive for the life of the
/// application and call [`TelemetryGuard::shutdown`] on exit.
#[derive(Debug)]
#[must_use = "dropping the guard tears telemetry down"]
pub struct TelemetryGuard {
    runtime: TelemetryRuntime,
}

impl TelemetryGuard {
    /// The runtime this guard owns.
    pub fn runtime(&self) -> &TelemetryRuntime {
        &self.runtime
    }

    /// Drain and dispose the runtime.
    pub async fn shutdown(self) {
        self.runtime.shutdown().await;
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        // Explicit `shutdown().await` is the clean path; from a destructor
        // the best we can do is stop accepting work and release the
        // process-wide slot.
        if !self.runtime.core.shutdown_done.load(Ordering::SeqCst) {
            let mut global = GLOBAL_RUNTIME.lock();
            if global
                .as_ref()
                .is_some_and(|runtime| Arc::ptr_eq(&runtime.core, &self.runtime.core))
            {
                *global = None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_config::SourceSampling;
    use lumen_core::{SpanKind, TraceId};
    use lumen_sampling::{SamplingContext, SamplingDecision};

    #[test]
    fn build_sampler_routes_sources() {
        let mut config = TelemetryConfig::default();
        config.default_sampling_rate = 0.0;
        config.sampling.insert(
            "noisy".to_string(),
            SourceSampling {
                rate: 1.0,
                always_sample_errors: false,
            },
        );

        let sampler = build_sampler(&config);
        let noisy = SamplingContext::new(TraceId::random(), "noisy", "op", SpanKind::Internal);
        let other = SamplingContext::new(TraceId::random(), "other", "op", SpanKind::Internal);
        assert_eq!(
            sampler.should_sample(&noisy).decision,
            SamplingDecision::RecordAndSample
        );
        assert_eq!(sampler.should_sample(&other).decision, SamplingDecision::Drop);
    }

    // The process-wide slot is shared across test threads, so its whole
    // lifecycle is exercised in a single test.
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn global_install_and_shutdown_lifecycle() {
        Telemetry::reset_global();

        let isolated = Telemetry::builder().install_global(false).init().unwrap();
        assert!(Telemetry::global().is_none());
        isolated.shutdown().await;

        let guard = Telemetry::builder().install_global(true).init().unwrap();
        assert!(Telemetry::global().is_some());

        let runtime = guard.runtime().clone();
        guard.shutdown().await;
        runtime.shutdown().await; // second call is a no-op
        assert!(Telemetry::global().is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn reload_rebuilds_sampler_family() {
        Telemetry::reset_global();
        let guard = Telemetry::builder().install_global(false).init().unwrap();
        let runtime = guard.runtime().clone();

        let mut config = TelemetryConfig::default();
        config.default_sampling_rate = 0.0;
        runtime.reload_config(config);

        let sampler = runtime.core.sampler.read().clone();
        let ctx = SamplingContext::new(TraceId::random(), "any", "op", SpanKind::Internal);
        assert_eq!(sampler.should_sample(&ctx).decision, SamplingDecision::Drop);
        guard.shutdown().await;
    }

    #[test]
    fn init_outside_tokio_fails_cleanly() {
        let result = Telemetry::builder().install_global(false).init();
        assert!(matches!(
            result,
            Err(TelemetryError::InitializationFailed(_))
        ));
    }
}
