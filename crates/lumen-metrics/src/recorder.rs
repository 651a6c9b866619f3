//! The metric recorder - the single public contract for instruments

use std::sync::Arc;

use lumen_core::{
    InstrumentKind, Measurement, MeasurementValue, MetricTag, TelemetryError, TelemetryResult,
    validate_tag_set,
};

use crate::backend::{BackendKind, MetricBackend, select_backend};
use crate::cardinality::CardinalityTracker;
use crate::gauge::{GaugeHandle, GaugeRegistry};

type MeasurementForwarder = dyn Fn(Measurement) + Send + Sync;

/// Shared internals behind every instrument handle.
struct RecorderInner {
    backend: Arc<dyn MetricBackend>,
    cardinality: CardinalityTracker,
    gauges: Arc<GaugeRegistry>,
    forwarder: parking_lot::RwLock<Option<Arc<MeasurementForwarder>>>,
}

impl std::fmt::Debug for RecorderInner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecorderInner")
            .field("backend", &self.backend.kind())
            .field("gauges", &self.gauges.len())
            .field("has_forwarder", &self.forwarder.read().is_some())
            .finish()
    }
}

impl RecorderInner {
    fn forward(&self, instrument: &str, kind: InstrumentKind, value: MeasurementValue, tags: &[MetricTag]) {
        let forwarder = self.forwarder.read().clone();
        if let Some(forwarder) = forwarder {
            forwarder(Measurement::now(instrument, kind, value, tags.to_vec()));
        }
    }
}

/// Creates counters, histograms, and observable gauges over whichever
/// backend the process offers.
///
/// Handles are cheap `Arc` clones; the recorder itself is usually owned by
/// the telemetry runtime and shared.
///
/// # Example
///
/// ```rust
/// use lumen_core::MetricTag;
/// use lumen_metrics::MetricRecorder;
///
/// let recorder = MetricRecorder::new();
/// let requests = recorder.counter("app.requests").unwrap();
/// requests
///     .add(1, &[MetricTag::new("status", "ok").unwrap()])
///     .unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct MetricRecorder {
    inner: Arc<RecorderInner>,
}

impl Default for MetricRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricRecorder {
    /// Create a recorder, probing for the native backend.
    pub fn new() -> Self {
        Self::with_backend(select_backend())
    }

    /// Create a recorder over an explicit backend.
    pub fn with_backend(backend: Arc<dyn MetricBackend>) -> Self {
        Self {
            inner: Arc::new(RecorderInner {
                backend,
                cardinality: CardinalityTracker::default(),
                gauges: Arc::new(GaugeRegistry::new()),
                forwarder: parking_lot::RwLock::new(None),
            }),
        }
    }

    /// Which backend is active.
    pub fn backend_kind(&self) -> BackendKind {
        self.inner.backend.kind()
    }

    /// The backing gauge registry, for the observation driver.
    pub fn gauge_registry(&self) -> Arc<GaugeRegistry> {
        Arc::clone(&self.inner.gauges)
    }

    /// The active backend, for the observation driver.
    pub fn backend(&self) -> Arc<dyn MetricBackend> {
        Arc::clone(&self.inner.backend)
    }

    /// Forward every recorded measurement into the telemetry pipeline as
    /// well. Installed by the runtime so sinks that accept measurements see
    /// them; `None` (the default) records to the backend only.
    pub fn set_forwarder(&self, forwarder: Option<Arc<MeasurementForwarder>>) {
        *self.inner.forwarder.write() = forwarder;
    }

    /// Create a counter.
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError::InvalidArgument`] for an empty (after
    /// trimming) name.
    pub fn counter(&self, name: impl AsRef<str>) -> TelemetryResult<Counter> {
        Ok(Counter {
            name: validated_name(name.as_ref())?,
            inner: Arc::clone(&self.inner),
        })
    }

    /// [`MetricRecorder::counter`] with unit and description metadata.
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError::InvalidArgument`] for an empty name.
    pub fn counter_with(
        &self,
        name: impl AsRef<str>,
        unit: Option<&str>,
        description: Option<&str>,
    ) -> TelemetryResult<Counter> {
        let counter = self.counter(name)?;
        self.inner
            .backend
            .describe(InstrumentKind::Counter, counter.name(), unit, description);
        Ok(counter)
    }

    /// Create a float-valued histogram.
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError::InvalidArgument`] for an empty name.
    pub fn histogram_f64(&self, name: impl AsRef<str>) -> TelemetryResult<HistogramF64> {
        Ok(HistogramF64 {
            name: validated_name(name.as_ref())?,
            inner: Arc::clone(&self.inner),
        })
    }

    /// [`MetricRecorder::histogram_f64`] with unit and description
    /// metadata.
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError::InvalidArgument`] for an empty name.
    pub fn histogram_f64_with(
        &self,
        name: impl AsRef<str>,
        unit: Option<&str>,
        description: Option<&str>,
    ) -> TelemetryResult<HistogramF64> {
        let histogram = self.histogram_f64(name)?;
        self.inner.backend.describe(
            InstrumentKind::HistogramF64,
            histogram.name(),
            unit,
            description,
        );
        Ok(histogram)
    }

    /// Create an integer-valued histogram.
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError::InvalidArgument`] for an empty name.
    pub fn histogram_u64(&self, name: impl AsRef<str>) -> TelemetryResult<HistogramU64> {
        Ok(HistogramU64 {
            name: validated_name(name.as_ref())?,
            inner: Arc::clone(&self.inner),
        })
    }

    /// Register an observable gauge; `observe` is invoked on the
    /// observation schedule until the handle is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError::InvalidArgument`] for an empty name or an
    /// invalid tag set.
    pub fn observable_gauge(
        &self,
        name: impl AsRef<str>,
        tags: &[MetricTag],
        observe: impl Fn() -> f64 + Send + Sync + 'static,
    ) -> TelemetryResult<GaugeHandle> {
        let name = validated_name(name.as_ref())?;
        validate_tag_set(tags)?;
        let id = self
            .inner
            .gauges
            .register(name, tags.to_vec(), Box::new(observe));
        Ok(GaugeHandle::new(id, &self.inner.gauges))
    }

    /// [`MetricRecorder::observable_gauge`] with unit and description
    /// metadata.
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError::InvalidArgument`] for an empty name or an
    /// invalid tag set.
    pub fn observable_gauge_with(
        &self,
        name: impl AsRef<str>,
        tags: &[MetricTag],
        observe: impl Fn() -> f64 + Send + Sync + 'static,
        unit: Option<&str>,
        description: Option<&str>,
    ) -> TelemetryResult<GaugeHandle> {
        let validated = validated_name(name.as_ref())?;
        self.inner.backend.describe(
            InstrumentKind::ObservableGauge,
            &validated,
            unit,
            description,
        );
        self.observable_gauge(validated, tags, observe)
    }
}

fn validated_name(name: &str) -> TelemetryResult<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(TelemetryError::invalid_argument(
            "name",
            "instrument name must not be empty",
        ));
    }
    Ok(trimmed.to_string())
}

/// A monotonic counter handle.
#[derive(Debug, Clone)]
pub struct Counter {
    name: String,
    inner: Arc<RecorderInner>,
}

impl Counter {
    /// Add `value` with the given tags.
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError::InvalidArgument`] for a negative value or
    /// a tag set with duplicate keys. State is unchanged on rejection.
    pub fn add(&self, value: i64, tags: &[MetricTag]) -> TelemetryResult<()> {
        if value < 0 {
            return Err(TelemetryError::invalid_argument(
                "value",
                format!("counter increments must be non-negative, got {value}"),
            ));
        }
        validate_tag_set(tags)?;

        self.inner.cardinality.observe(&self.name, tags);
        self.inner.backend.record_counter(&self.name, value as u64, tags);
        self.inner.forward(
            &self.name,
            InstrumentKind::Counter,
            MeasurementValue::U64(value as u64),
            tags,
        );
        Ok(())
    }

    /// The instrument name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// A float histogram handle.
#[derive(Debug, Clone)]
pub struct HistogramF64 {
    name: String,
    inner: Arc<RecorderInner>,
}

impl HistogramF64 {
    /// Record one sample with the given tags.
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError::InvalidArgument`] for a tag set with
    /// duplicate keys.
    pub fn record(&self, value: f64, tags: &[MetricTag]) -> TelemetryResult<()> {
        validate_tag_set(tags)?;
        self.inner.cardinality.observe(&self.name, tags);
        self.inner.backend.record_histogram_f64(&self.name, value, tags);
        self.inner.forward(
            &self.name,
            InstrumentKind::HistogramF64,
            MeasurementValue::F64(value),
            tags,
        );
        Ok(())
    }

    /// Start a timer that records the elapsed milliseconds into this
    /// histogram when completed or dropped.
    #[must_use]
    pub fn start_timer(&self, tags: &[MetricTag]) -> HistogramTimer {
        HistogramTimer {
            histogram: self.clone(),
            tags: tags.to_vec(),
            started: std::time::Instant::now(),
            recorded: false,
        }
    }

    /// The instrument name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Measures a duration and records it on completion or drop.
#[derive(Debug)]
#[must_use = "dropping the timer records the elapsed time"]
pub struct HistogramTimer {
    histogram: HistogramF64,
    tags: Vec<MetricTag>,
    started: std::time::Instant,
    recorded: bool,
}

impl HistogramTimer {
    /// Record now and return the measured duration.
    pub fn complete(mut self) -> std::time::Duration {
        self.record_once()
    }

    fn record_once(&mut self) -> std::time::Duration {
        let elapsed = self.started.elapsed();
        if !self.recorded {
            self.recorded = true;
            let _ = self
                .histogram
                .record(elapsed.as_secs_f64() * 1000.0, &self.tags);
        }
        elapsed
    }
}

impl Drop for HistogramTimer {
    fn drop(&mut self) {
        self.record_once();
    }
}

/// An integer histogram handle.
#[derive(Debug, Clone)]
pub struct HistogramU64 {
    name: String,
    inner: Arc<RecorderInner>,
}

impl HistogramU64 {
    /// Record one sample with the given tags.
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError::InvalidArgument`] for a tag set with
    /// duplicate keys.
    pub fn record(&self, value: u64, tags: &[MetricTag]) -> TelemetryResult<()> {
        validate_tag_set(tags)?;
        self.inner.cardinality.observe(&self.name, tags);
        self.inner.backend.record_histogram_u64(&self.name, value, tags);
        self.inner.forward(
            &self.name,
            InstrumentKind::HistogramU64,
            MeasurementValue::U64(value),
            tags,
        );
        Ok(())
    }

    /// The instrument name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fallback::FallbackBackend;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn fallback_recorder() -> (MetricRecorder, Arc<FallbackBackend>) {
        let backend = Arc::new(FallbackBackend::new());
        let recorder = MetricRecorder::with_backend(backend.clone() as Arc<dyn MetricBackend>);
        (recorder, backend)
    }

    #[test]
    fn rejects_empty_and_blank_names() {
        let (recorder, _) = fallback_recorder();
        assert!(recorder.counter("").is_err());
        assert!(recorder.counter("   ").is_err());
        assert!(recorder.histogram_f64("\t").is_err());
    }

    #[test]
    fn names_are_trimmed() {
        let (recorder, _) = fallback_recorder();
        let counter = recorder.counter("  app.requests  ").unwrap();
        assert_eq!(counter.name(), "app.requests");
    }

    #[test]
    fn counter_rejects_negative_without_mutating() {
        let (recorder, backend) = fallback_recorder();
        let counter = recorder.counter("c").unwrap();
        counter.add(5, &[]).unwrap();
        assert!(counter.add(-1, &[]).is_err());
        assert_eq!(backend.counter_value("c"), 5);
    }

    #[test]
    fn counter_rejects_duplicate_tag_keys() {
        let (recorder, _) = fallback_recorder();
        let counter = recorder.counter("c").unwrap();
        let tags = vec![
            MetricTag::new("k", 1i64).unwrap(),
            MetricTag::new("k", 2i64).unwrap(),
        ];
        assert!(counter.add(1, &tags).is_err());
    }

    #[test]
    fn increments_accumulate_per_tag_set() {
        let (recorder, backend) = fallback_recorder();
        let counter = recorder.counter("hits").unwrap();
        let tags = vec![MetricTag::new("zone", "eu").unwrap()];
        counter.add(1, &tags).unwrap();
        counter.add(2, &tags).unwrap();
        assert_eq!(backend.counter_value("hits.zone=eu"), 3);
    }

    #[test]
    fn forwarder_receives_measurements() {
        let (recorder, _) = fallback_recorder();
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_in_forwarder = Arc::clone(&seen);
        recorder.set_forwarder(Some(Arc::new(move |m: Measurement| {
            assert_eq!(m.instrument, "fwd");
            seen_in_forwarder.fetch_add(1, Ordering::Relaxed);
        })));

        let histogram = recorder.histogram_f64("fwd").unwrap();
        histogram.record(1.5, &[]).unwrap();
        histogram.record(2.5, &[]).unwrap();
        assert_eq!(seen.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn timer_records_once_even_with_drop_after_complete() {
        let (recorder, _) = fallback_recorder();
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_in_forwarder = Arc::clone(&seen);
        recorder.set_forwarder(Some(Arc::new(move |_m: Measurement| {
            seen_in_forwarder.fetch_add(1, Ordering::Relaxed);
        })));

        let histogram = recorder.histogram_f64("timed").unwrap();
        let timer = histogram.start_timer(&[]);
        let elapsed = timer.complete();
        assert!(elapsed.as_nanos() > 0);
        assert_eq!(seen.load(Ordering::Relaxed), 1);

        // Drop-based recording fires for an uncompleted timer.
        drop(histogram.start_timer(&[]));
        assert_eq!(seen.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn gauge_registration_and_disposal() {
        let (recorder, _) = fallback_recorder();
        let handle = recorder
            .observable_gauge("depth", &[], || 4.0)
            .unwrap();
        assert_eq!(recorder.gauge_registry().len(), 1);
        handle.close();
        assert_eq!(recorder.gauge_registry().len(), 0);
    }
}
