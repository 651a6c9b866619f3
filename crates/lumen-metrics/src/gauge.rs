//! Observable gauges
//!
//! An observable gauge is pull-based: the recorder holds a user-supplied
//! zero-argument callback and invokes it on a timer tick. The callback is
//! user code, so every invocation runs inside a panic guard; a panicking
//! callback simply produces no sample this tick. Dropping the returned
//! handle stops further invocations.

use dashmap::DashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::debug;

use lumen_core::MetricTag;

use crate::backend::MetricBackend;

/// Observation interval used when no sink schedule drives observations.
pub const FALLBACK_OBSERVE_INTERVAL: Duration = Duration::from_secs(1);

type GaugeCallback = Box<dyn Fn() -> f64 + Send + Sync>;

struct GaugeEntry {
    name: String,
    tags: Vec<MetricTag>,
    callback: GaugeCallback,
}

impl std::fmt::Debug for GaugeEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GaugeEntry")
            .field("name", &self.name)
            .field("tags", &self.tags)
            .finish()
    }
}

/// Holds registered gauge callbacks and observes them on demand.
#[derive(Debug, Default)]
pub struct GaugeRegistry {
    entries: DashMap<u64, GaugeEntry>,
    next_id: AtomicU64,
}

impl GaugeRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback; the returned id keys later removal.
    pub(crate) fn register(
        &self,
        name: String,
        tags: Vec<MetricTag>,
        callback: GaugeCallback,
    ) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.entries.insert(
            id,
            GaugeEntry {
                name,
                tags,
                callback,
            },
        );
        id
    }

    pub(crate) fn unregister(&self, id: u64) {
        self.entries.remove(&id);
    }

    /// Number of live gauges.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no gauges are registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Invoke every callback once and record the produced samples.
    ///
    /// A panicking callback is swallowed; that gauge skips this tick.
    pub fn observe_all(&self, backend: &dyn MetricBackend) {
        for entry in self.entries.iter() {
            let observed = catch_unwind(AssertUnwindSafe(|| (entry.callback)()));
            match observed {
                Ok(value) => backend.record_gauge(&entry.name, value, &entry.tags),
                Err(_) => {
                    debug!(gauge = %entry.name, "observable gauge callback panicked; skipping tick");
                }
            }
        }
    }
}

/// RAII handle for a registered gauge. Dropping it (or calling
/// [`GaugeHandle::close`]) stops further callback invocations.
#[derive(Debug)]
#[must_use = "dropping the handle unregisters the gauge"]
pub struct GaugeHandle {
    id: u64,
    registry: Weak<GaugeRegistry>,
}

impl GaugeHandle {
    pub(crate) fn new(id: u64, registry: &Arc<GaugeRegistry>) -> Self {
        Self {
            id,
            registry: Arc::downgrade(registry),
        }
    }

    /// Unregister now instead of at drop. Idempotent.
    pub fn close(mut self) {
        self.unregister();
    }

    fn unregister(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.unregister(self.id);
        }
        self.registry = Weak::new();
    }
}

impl Drop for GaugeHandle {
    fn drop(&mut self) {
        self.unregister();
    }
}

/// Drives periodic observation of a registry on a tokio timer.
///
/// Created by the lifecycle layer; dropping the driver (or calling
/// [`GaugeDriver::stop`]) ends the timer task.
#[derive(Debug)]
pub struct GaugeDriver {
    handle: tokio::task::JoinHandle<()>,
}

impl GaugeDriver {
    /// Spawn the observation loop on the current tokio runtime.
    pub fn spawn(
        registry: Arc<GaugeRegistry>,
        backend: Arc<dyn MetricBackend>,
        interval: Duration,
    ) -> Self {
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                registry.observe_all(backend.as_ref());
            }
        });
        Self { handle }
    }

    /// Stop the observation loop. Idempotent.
    pub fn stop(&self) {
        if !self.handle.is_finished() {
            self.handle.abort();
        }
    }
}

impl Drop for GaugeDriver {
    fn drop(&mut self) {
        self.stop();
    }
}
