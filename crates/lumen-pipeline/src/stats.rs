//! Pipeline statistics and health evaluation
//!
//! Counters live in lock-free atomics updated by the worker and producers;
//! [`PipelineStats`] is the serializable snapshot handed to callers. Health
//! is a pure function of the snapshot and two threshold pairs.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Lock-free running totals for the pipeline.
#[derive(Debug, Default)]
pub struct WorkerCounters {
    /// Items accepted into the ring.
    pub enqueued: AtomicU64,
    /// Items delivered to every accepting sink.
    pub processed: AtomicU64,
    /// Items evicted by drop-oldest or rejected at the gate.
    pub dropped: AtomicU64,
    /// Items that failed dispatch (sink failure or loop failure).
    pub failed: AtomicU64,
    /// Worker loop restarts after a loop-level failure.
    pub restarts: AtomicU64,
}

impl WorkerCounters {
    /// Bump a counter by `n`.
    pub fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    /// Read a counter.
    pub fn get(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }
}

/// Rolling error-rate window over recent item outcomes.
///
/// Keeps the most recent outcomes up to a bounded count and a time horizon;
/// the rate is failures over total inside the window.
#[derive(Debug)]
pub struct RollingErrorRate {
    window: Mutex<VecDeque<(Instant, bool)>>,
    horizon: Duration,
    max_samples: usize,
}

impl Default for RollingErrorRate {
    fn default() -> Self {
        Self::new(Duration::from_secs(60), 4096)
    }
}

impl RollingErrorRate {
    /// Create a window with an explicit time horizon and sample cap.
    pub fn new(horizon: Duration, max_samples: usize) -> Self {
        Self {
            window: Mutex::new(VecDeque::new()),
            horizon,
            max_samples,
        }
    }

    /// Record one item outcome.
    pub fn record(&self, failed: bool) {
        let mut window = self.window.lock();
        window.push_back((Instant::now(), failed));
        while window.len() > self.max_samples {
            window.pop_front();
        }
    }

    /// Failures over total within the window, `0.0` when empty.
    pub fn rate(&self) -> f64 {
        let mut window = self.window.lock();
        let cutoff = Instant::now().checked_sub(self.horizon);
        if let Some(cutoff) = cutoff {
            while window.front().is_some_and(|(at, _)| *at < cutoff) {
                window.pop_front();
            }
        }
        if window.is_empty() {
            return 0.0;
        }
        let failures = window.iter().filter(|(_, failed)| *failed).count();
        failures as f64 / window.len() as f64
    }
}

/// A consistent, serializable view of the pipeline at one instant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineStats {
    /// Items currently queued.
    pub queue_depth: usize,
    /// Ring capacity.
    pub queue_capacity: usize,
    /// `queue_depth / queue_capacity`, in `[0, 1]`.
    pub queue_utilization: f64,
    /// Items accepted into the ring since start.
    pub enqueued: u64,
    /// Items delivered successfully.
    pub processed: u64,
    /// Items dropped (evicted or rejected).
    pub dropped: u64,
    /// Items that failed dispatch.
    pub failed: u64,
    /// Worker restarts.
    pub restarts: u64,
    /// Whether the circuit breaker has opened.
    pub circuit_open: bool,
    /// Sampling rate currently in effect, when a sampler reports one.
    pub current_sampling_rate: Option<f64>,
    /// Failures over total in the rolling window, in `[0, 1]`.
    pub error_rate: f64,
}

/// Health classification derived from a [`PipelineStats`] snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Everything under thresholds.
    Healthy,
    /// Queue or error rate past the degraded threshold.
    Degraded,
    /// Queue or error rate past the unhealthy threshold, or circuit open.
    Unhealthy,
}

/// Threshold pairs for health evaluation. Each pair is
/// (queue utilization, error rate), both in `[0, 1]`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct HealthThresholds {
    /// Degraded when either value is reached.
    pub degraded_queue_utilization: f64,
    /// Degraded error-rate bound.
    pub degraded_error_rate: f64,
    /// Unhealthy when either value is reached.
    pub unhealthy_queue_utilization: f64,
    /// Unhealthy error-rate bound.
    pub unhealthy_error_rate: f64,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            degraded_queue_utilization: 0.75,
            degraded_error_rate: 0.05,
            unhealthy_queue_utilization: 0.95,
            unhealthy_error_rate: 0.20,
        }
    }
}

impl HealthThresholds {
    /// Classify a snapshot.
    pub fn evaluate(&self, stats: &PipelineStats) -> HealthStatus {
        if stats.circuit_open
            || stats.queue_utilization >= self.unhealthy_queue_utilization
            || stats.error_rate >= self.unhealthy_error_rate
        {
            return HealthStatus::Unhealthy;
        }
        if stats.queue_utilization >= self.degraded_queue_utilization
            || stats.error_rate >= self.degraded_error_rate
        {
            return HealthStatus::Degraded;
        }
        HealthStatus::Healthy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(utilization: f64, error_rate: f64, circuit_open: bool) -> PipelineStats {
        PipelineStats {
            queue_depth: 0,
            queue_capacity: 100,
            queue_utilization: utilization,
            enqueued: 0,
            processed: 0,
            dropped: 0,
            failed: 0,
            restarts: 0,
            circuit_open,
            current_sampling_rate: None,
            error_rate,
        }
    }

    #[test]
    fn default_thresholds_classify() {
        let thresholds = HealthThresholds::default();
        assert_eq!(
            thresholds.evaluate(&stats(0.10, 0.0, false)),
            HealthStatus::Healthy
        );
        assert_eq!(
            thresholds.evaluate(&stats(0.80, 0.0, false)),
            HealthStatus::Degraded
        );
        assert_eq!(
            thresholds.evaluate(&stats(0.10, 0.06, false)),
            HealthStatus::Degraded
        );
        assert_eq!(
            thresholds.evaluate(&stats(0.96, 0.0, false)),
            HealthStatus::Unhealthy
        );
        assert_eq!(
            thresholds.evaluate(&stats(0.10, 0.25, false)),
            HealthStatus::Unhealthy
        );
    }

    #[test]
    fn open_circuit_is_unhealthy() {
        let thresholds = HealthThresholds::default();
        assert_eq!(
            thresholds.evaluate(&stats(0.0, 0.0, true)),
            HealthStatus::Unhealthy
        );
    }

    #[test]
    fn rolling_rate_counts_failures_over_total() {
        let window = RollingErrorRate::new(Duration::from_secs(60), 100);
        for _ in 0..8 {
            window.record(false);
        }
        window.record(true);
        window.record(true);
        assert!((window.rate() - 0.2).abs() < 1e-9);
    }

    #[test]
    fn empty_window_rates_zero() {
        let window = RollingErrorRate::default();
        assert_eq!(window.rate(), 0.0);
    }

    #[test]
    fn sample_cap_evicts_oldest() {
        let window = RollingErrorRate::new(Duration::from_secs(60), 4);
        window.record(true);
        for _ in 0..4 {
            window.record(false);
        }
        // The single failure fell out of the capped window.
        assert_eq!(window.rate(), 0.0);
    }
}
