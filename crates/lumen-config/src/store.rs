//! Atomic configuration publishing and hot reload
//!
//! Readers take lock-free snapshots through `arc-swap`; writers build a new
//! immutable [`TelemetryConfig`], take a short lock, swap it in, and notify
//! subscribers with `(old, new)` atomically. Subscribers rebuild whatever
//! they derive from configuration (the sampler family, most notably).

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::debug;

use crate::model::TelemetryConfig;

type ReloadCallback = dyn Fn(&Arc<TelemetryConfig>, &Arc<TelemetryConfig>) + Send + Sync;

/// Publishes configuration snapshots and fans out reload notifications.
pub struct ConfigStore {
    current: ArcSwap<TelemetryConfig>,
    subscribers: Mutex<Vec<(u64, Arc<ReloadCallback>)>>,
    next_subscriber_id: Mutex<u64>,
}

impl std::fmt::Debug for ConfigStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigStore")
            .field("current", &self.current.load())
            .field("subscribers", &self.subscribers.lock().len())
            .finish()
    }
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self::new(TelemetryConfig::default())
    }
}

impl ConfigStore {
    /// Create a store with an initial configuration.
    pub fn new(config: TelemetryConfig) -> Self {
        Self {
            current: ArcSwap::from_pointee(config),
            subscribers: Mutex::new(Vec::new()),
            next_subscriber_id: Mutex::new(0),
        }
    }

    /// Lock-free snapshot of the current configuration.
    pub fn snapshot(&self) -> Arc<TelemetryConfig> {
        self.current.load_full()
    }

    /// Publish a new configuration and notify subscribers with
    /// `(old, new)`.
    pub fn update(&self, config: TelemetryConfig) {
        let new = Arc::new(config);
        let old = self.current.swap(Arc::clone(&new));

        // The subscriber list is locked for the whole notification pass so
        // every subscriber sees each transition exactly once, in order.
        let subscribers = self.subscribers.lock();
        debug!(
            subscribers = subscribers.len(),
            "telemetry configuration updated"
        );
        for (_, callback) in subscribers.iter() {
            callback(&old, &new);
        }
    }

    /// Subscribe to reload notifications. Dropping the returned handle
    /// unsubscribes.
    pub fn subscribe(
        self: &Arc<Self>,
        callback: impl Fn(&Arc<TelemetryConfig>, &Arc<TelemetryConfig>) + Send + Sync + 'static,
    ) -> ReloadSubscription {
        let id = {
            let mut next = self.next_subscriber_id.lock();
            *next += 1;
            *next
        };
        self.subscribers.lock().push((id, Arc::new(callback)));
        ReloadSubscription {
            store: Arc::downgrade(self),
            id,
        }
    }

    fn unsubscribe(&self, id: u64) {
        self.subscribers
            .lock()
            .retain(|(subscriber_id, _)| *subscriber_id != id);
    }
}

/// RAII handle for a reload subscription.
#[must_use = "dropping the subscription stops reload notifications"]
pub struct ReloadSubscription {
    store: std::sync::Weak<ConfigStore>,
    id: u64,
}

impl std::fmt::Debug for ReloadSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReloadSubscription").field("id", &self.id).finish()
    }
}

impl Drop for ReloadSubscription {
    fn drop(&mut self) {
        if let Some(store) = self.store.upgrade() {
            store.unsubscribe(self.id);
        }
    }
}
