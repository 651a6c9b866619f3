//! Metric backend selection
//!
//! Two backends can host measurements:
//!
//! - **Native** delegates to the process-wide [`metrics`] facade, passing
//!   tags as key-value labels. This is the right choice whenever the host
//!   application installed a metrics recorder (Prometheus exporter, OTLP
//!   bridge, ...).
//! - **Fallback** aggregates counters in per-tag-set atomics and emits
//!   histogram/gauge samples to the structured log stream under a derived
//!   name. It needs nothing from the host.
//!
//! Selection probes the native backend by constructing a throwaway
//! instrument inside a panic guard. A failed probe is retried on the next
//! recorder construction rather than memoized, so a recorder installed late
//! in process startup is still picked up.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::OnceLock;

use tracing::debug;

use lumen_core::MetricTag;

use crate::fallback::FallbackBackend;
use crate::native::NativeBackend;

/// Which backend hosts the measurements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// The host's `metrics` facade.
    Native,
    /// Self-contained aggregation plus structured-event emission.
    Fallback,
}

/// The operations a backend must host. Tag sets reaching a backend are
/// already validated.
pub trait MetricBackend: Send + Sync + std::fmt::Debug {
    /// Which kind this backend is.
    fn kind(&self) -> BackendKind;

    /// Register unit and description metadata for an instrument. Backends
    /// without a metadata concept ignore this.
    fn describe(
        &self,
        kind: lumen_core::InstrumentKind,
        name: &str,
        unit: Option<&str>,
        description: Option<&str>,
    ) {
        let _ = (kind, name, unit, description);
    }

    /// Add a non-negative increment to a counter.
    fn record_counter(&self, name: &str, value: u64, tags: &[MetricTag]);

    /// Record a float histogram sample.
    fn record_histogram_f64(&self, name: &str, value: f64, tags: &[MetricTag]);

    /// Record an integer histogram sample.
    fn record_histogram_u64(&self, name: &str, value: u64, tags: &[MetricTag]);

    /// Record a gauge observation.
    fn record_gauge(&self, name: &str, value: f64, tags: &[MetricTag]);
}

/// Set once the native probe has ever succeeded; success is sticky,
/// failure is not.
static NATIVE_PROBED_OK: OnceLock<()> = OnceLock::new();

/// Choose a backend: native when the probe succeeds, fallback otherwise.
pub fn select_backend() -> Arc<dyn MetricBackend> {
    if NATIVE_PROBED_OK.get().is_some() || probe_native() {
        let _ = NATIVE_PROBED_OK.set(());
        Arc::new(NativeBackend::new())
    } else {
        debug!("native metrics backend probe failed; using fallback backend");
        Arc::new(FallbackBackend::new())
    }
}

/// Attempt a trivial native construction inside a panic guard.
fn probe_native() -> bool {
    catch_unwind(AssertUnwindSafe(|| {
        let counter = metrics::counter!("lumen.backend.probe");
        counter.increment(0);
    }))
    .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_selects_a_backend() {
        // The `metrics` facade never panics on an uninstalled recorder (it
        // no-ops), so in-process the probe succeeds and native is chosen.
        let backend = select_backend();
        assert_eq!(backend.kind(), BackendKind::Native);
    }

    #[test]
    fn successful_probe_is_sticky() {
        let _ = select_backend();
        assert!(NATIVE_PROBED_OK.get().is_some());
    }
}
