//! Exception recording and the first-chance panic hook
//!
//! Explicit recording attaches an `exception` event to the current
//! operation scope and feeds a process-wide aggregator (count, first/last
//! seen, per type). The opt-in panic hook observes every panic in the
//! process, rate-limited by a token bucket and filtered by a type-name
//! exclusion list. The hook chains the previously-installed hook and must
//! never itself panic.

use dashmap::DashMap;
use parking_lot::Mutex;
use std::panic::{AssertUnwindSafe, PanicHookInfo, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Instant, SystemTime};
use tracing::warn;

/// Per-type aggregate of observed errors.
#[derive(Debug, Clone)]
pub struct ErrorTypeStats {
    /// Observations of this type.
    pub count: u64,
    /// When the type was first observed.
    pub first_seen: SystemTime,
    /// When the type was last observed.
    pub last_seen: SystemTime,
}

/// Process-wide error aggregation by type name.
#[derive(Debug, Default)]
pub struct ErrorAggregator {
    by_type: DashMap<String, ErrorTypeStats>,
}

impl ErrorAggregator {
    /// Create an empty aggregator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one observation of `type_name`.
    pub fn record(&self, type_name: &str) {
        let now = SystemTime::now();
        self.by_type
            .entry(type_name.to_string())
            .and_modify(|stats| {
                stats.count += 1;
                stats.last_seen = now;
            })
            .or_insert(ErrorTypeStats {
                count: 1,
                first_seen: now,
                last_seen: now,
            });
    }

    /// Aggregate for one type, if ever observed.
    pub fn stats_for(&self, type_name: &str) -> Option<ErrorTypeStats> {
        self.by_type.get(type_name).map(|entry| entry.clone())
    }

    /// Snapshot of every observed type.
    pub fn snapshot(&self) -> Vec<(String, ErrorTypeStats)> {
        self.by_type
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    /// Forget everything. Intended for test isolation.
    pub fn clear(&self) {
        self.by_type.clear();
    }
}

/// A simple token bucket: `capacity` events, refilled at `capacity` per
/// second.
#[derive(Debug)]
pub struct TokenBucket {
    capacity: f64,
    state: Mutex<BucketState>,
}

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    refilled_at: Instant,
}

impl TokenBucket {
    /// Create a bucket allowing `per_second` events per second.
    pub fn new(per_second: u32) -> Self {
        let capacity = f64::from(per_second.max(1));
        Self {
            capacity,
            state: Mutex::new(BucketState {
                tokens: capacity,
                refilled_at: Instant::now(),
            }),
        }
    }

    /// Take one token if available.
    pub fn try_acquire(&self) -> bool {
        let mut state = self.state.lock();
        let elapsed = state.refilled_at.elapsed().as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.capacity).min(self.capacity);
        state.refilled_at = Instant::now();

        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// Configuration for the first-chance hook.
#[derive(Debug, Clone)]
pub struct FirstChanceHookConfig {
    /// Events allowed per second.
    pub max_events_per_second: u32,
    /// Message fragments that mute an observation (cancellation-like
    /// conditions by default).
    pub exclude_fragments: Vec<String>,
}

impl Default for FirstChanceHookConfig {
    fn default() -> Self {
        Self {
            max_events_per_second: 100,
            exclude_fragments: vec!["Cancelled".to_string(), "Elapsed".to_string()],
        }
    }
}

static HOOK_INSTALLED: AtomicBool = AtomicBool::new(false);

/// Install the first-chance panic hook, chaining the existing hook.
///
/// Observations feed `aggregator`, capped by the configured token bucket;
/// panics whose payload matches an exclusion fragment are ignored. The
/// hook swallows its own failures. Installing twice is a no-op.
pub fn install_first_chance_hook(aggregator: Arc<ErrorAggregator>, config: FirstChanceHookConfig) {
    if HOOK_INSTALLED.swap(true, Ordering::SeqCst) {
        return;
    }

    let bucket = TokenBucket::new(config.max_events_per_second);
    let previous = std::panic::take_hook();

    std::panic::set_hook(Box::new(move |info: &PanicHookInfo<'_>| {
        // The hook must never panic; a panic here would abort the process.
        let _ = catch_unwind(AssertUnwindSafe(|| {
            observe_panic(info, &aggregator, &bucket, &config.exclude_fragments);
        }));
        previous(info);
    }));
}

fn observe_panic(
    info: &PanicHookInfo<'_>,
    aggregator: &ErrorAggregator,
    bucket: &TokenBucket,
    exclude: &[String],
) {
    let message = panic_message(info);
    if exclude.iter().any(|fragment| message.contains(fragment.as_str())) {
        return;
    }
    if !bucket.try_acquire() {
        return;
    }
    aggregator.record("panic");
    warn!(
        message = %message,
        location = %info.location().map(ToString::to_string).unwrap_or_default(),
        "first-chance panic observed"
    );
}

fn panic_message(info: &PanicHookInfo<'_>) -> String {
    if let Some(message) = info.payload().downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = info.payload().downcast_ref::<String>() {
        message.clone()
    } else {
        "<non-string panic payload>".to_string()
    }
}

/// Record an error against the ambient execution flow.
///
/// Without a live borrow of the owning [`OperationScope`]
/// (`crate::OperationScope::record_error` is the right call when one is at
/// hand), this updates the process-wide aggregator and emits a structured
/// `exception` event into the pipeline stamped with the ambient trace,
/// span, and correlation ids. A no-op when no runtime is installed.
pub fn record<E: std::error::Error + ?Sized>(error: &E) {
    let type_name = short_type_name(std::any::type_name_of_val(error));
    let Some(runtime) = crate::Telemetry::global() else {
        return;
    };
    runtime.errors().record(type_name);

    let mut attributes = exception_attributes(type_name, &error.to_string(), None);
    if let Some(span) = lumen_core::ActiveSpan::current() {
        attributes.push((
            "trace_id".to_string(),
            lumen_core::TagValue::from(span.trace_id.to_string()),
        ));
        attributes.push((
            "span_id".to_string(),
            lumen_core::TagValue::from(span.span_id.to_string()),
        ));
    }
    if let Some(correlation) = lumen_core::CorrelationContext::raw() {
        attributes.push((
            "correlation_id".to_string(),
            lumen_core::TagValue::from(correlation.as_str()),
        ));
    }
    runtime.submit(lumen_core::WorkItem::Event(
        lumen_core::StructuredEvent::now("exception", attributes),
    ));
}

/// The unqualified name of a (possibly path-qualified) type.
pub(crate) fn short_type_name(full: &str) -> &str {
    full.rsplit("::").next().unwrap_or(full)
}

/// Attributes attached to an `exception` span event.
pub fn exception_attributes(
    type_name: &str,
    message: &str,
    backtrace: Option<&str>,
) -> Vec<(String, lumen_core::TagValue)> {
    let mut attributes = vec![
        (
            "exception.type".to_string(),
            lumen_core::TagValue::from(type_name),
        ),
        (
            "exception.message".to_string(),
            lumen_core::TagValue::from(message),
        ),
    ];
    if let Some(backtrace) = backtrace {
        attributes.push((
            "exception.stacktrace".to_string(),
            lumen_core::TagValue::from(backtrace),
        ));
    }
    attributes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregator_tracks_counts_and_timestamps() {
        let aggregator = ErrorAggregator::new();
        aggregator.record("TimeoutError");
        aggregator.record("TimeoutError");
        aggregator.record("IoError");

        let timeout = aggregator.stats_for("TimeoutError").unwrap();
        assert_eq!(timeout.count, 2);
        assert!(timeout.first_seen <= timeout.last_seen);
        assert_eq!(aggregator.stats_for("IoError").unwrap().count, 1);
        assert!(aggregator.stats_for("Unseen").is_none());
    }

    #[test]
    fn token_bucket_caps_burst() {
        let bucket = TokenBucket::new(5);
        let granted = (0..20).filter(|_| bucket.try_acquire()).count();
        assert_eq!(granted, 5);
    }

    #[test]
    fn token_bucket_refills_over_time() {
        let bucket = TokenBucket::new(100);
        while bucket.try_acquire() {}
        std::thread::sleep(std::time::Duration::from_millis(50));
        // ~5 tokens refilled at 100/s.
        assert!(bucket.try_acquire());
    }

    #[test]
    fn exception_attributes_include_backtrace_when_given() {
        let attributes = exception_attributes("IoError", "boom", Some("frame0\nframe1"));
        assert_eq!(attributes.len(), 3);
        assert_eq!(attributes[0].0, "exception.type");
        assert_eq!(attributes[2].0, "exception.stacktrace");

        let without = exception_attributes("IoError", "boom", None);
        assert_eq!(without.len(), 2);
    }
}
