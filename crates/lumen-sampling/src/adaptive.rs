//! Throughput-targeted adaptive sampling

use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use lumen_core::{TelemetryError, TelemetryResult};
use tracing::debug;

use crate::probabilistic::ProbabilisticSampler;
use crate::{Sampler, SamplingContext, SamplingDecision, SamplingResult};

/// Tuning parameters for [`AdaptiveSampler`].
#[derive(Debug, Clone)]
pub struct AdaptiveSamplerConfig {
    /// Target sampled operations per second.
    pub target_per_second: f64,
    /// Lower bound for the adjusted rate.
    pub min_rate: f64,
    /// Upper bound for the adjusted rate.
    pub max_rate: f64,
    /// Rate to start from before the first adjustment.
    pub initial_rate: f64,
}

impl Default for AdaptiveSamplerConfig {
    fn default() -> Self {
        Self {
            target_per_second: 10.0,
            min_rate: 0.001,
            max_rate: 1.0,
            initial_rate: 1.0,
        }
    }
}

/// Adjustments never happen more often than this.
const ADJUST_INTERVAL: Duration = Duration::from_secs(1);

/// Grow factor applied when sampled throughput falls below 80% of target.
const GROW_FACTOR: f64 = 1.2;

/// A probabilistic sampler whose rate chases a target sampled throughput.
///
/// Per-call decisions are the same deterministic low-64 trace-id check as
/// [`ProbabilisticSampler`], against the rate current at that moment. At
/// most once per second one caller recomputes the rate from the observed
/// window: above target shrinks to `target / observed_total`, below 80% of
/// target grows by 20%, both clamped to the configured bounds.
#[derive(Debug)]
pub struct AdaptiveSampler {
    config: AdaptiveSamplerConfig,
    /// Current rate, stored as f64 bits for lock-free reads.
    rate_bits: AtomicU64,
    /// Decisions taken since the last adjustment.
    total_seen: AtomicU64,
    /// Positive decisions since the last adjustment.
    total_sampled: AtomicU64,
    /// Guards the adjustment so a single thread recomputes per interval.
    adjust_state: Mutex<Instant>,
    sample_reason: Arc<str>,
    drop_reason: Arc<str>,
}

impl AdaptiveSampler {
    /// Create an adaptive sampler.
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError::InvalidArgument`] when the target is not
    /// positive, a bound is outside `[0, 1]`, or `min_rate > max_rate`.
    pub fn new(config: AdaptiveSamplerConfig) -> TelemetryResult<Self> {
        if config.target_per_second.is_nan() || config.target_per_second <= 0.0 {
            return Err(TelemetryError::invalid_argument(
                "target_per_second",
                "must be positive",
            ));
        }
        for (name, value) in [
            ("min_rate", config.min_rate),
            ("max_rate", config.max_rate),
            ("initial_rate", config.initial_rate),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(TelemetryError::invalid_argument(
                    "config",
                    format!("{name} must be within [0, 1], got {value}"),
                ));
            }
        }
        if config.min_rate > config.max_rate {
            return Err(TelemetryError::invalid_argument(
                "min_rate",
                "must not exceed max_rate",
            ));
        }

        let initial = config.initial_rate.clamp(config.min_rate, config.max_rate);
        Ok(Self {
            config,
            rate_bits: AtomicU64::new(initial.to_bits()),
            total_seen: AtomicU64::new(0),
            total_sampled: AtomicU64::new(0),
            adjust_state: Mutex::new(Instant::now()),
            sample_reason: Arc::from("adaptive(sampled)"),
            drop_reason: Arc::from("adaptive(dropped)"),
        })
    }

    /// The rate in effect right now.
    pub fn current_rate(&self) -> f64 {
        f64::from_bits(self.rate_bits.load(Ordering::Relaxed))
    }

    fn maybe_adjust(&self) {
        let Some(mut last) = self.adjust_state.try_lock() else {
            return; // another thread is adjusting
        };
        let elapsed = last.elapsed();
        if elapsed < ADJUST_INTERVAL {
            return; // within the current window
        }

        let seen = self.total_seen.swap(0, Ordering::Relaxed) as f64;
        let sampled = self.total_sampled.swap(0, Ordering::Relaxed) as f64;
        *last = Instant::now();
        drop(last);

        let elapsed_secs = elapsed.as_secs_f64();
        let observed_total_rate = seen / elapsed_secs;
        let observed_sampled_rate = sampled / elapsed_secs;
        let target = self.config.target_per_second;
        let current = self.current_rate();

        let new_rate = if observed_sampled_rate > target {
            if observed_total_rate > 0.0 {
                (target / observed_total_rate).max(self.config.min_rate)
            } else {
                current
            }
        } else if observed_sampled_rate < 0.8 * target {
            (current * GROW_FACTOR).min(self.config.max_rate)
        } else {
            current
        };

        if (new_rate - current).abs() > f64::EPSILON {
            self.rate_bits.store(new_rate.to_bits(), Ordering::Relaxed);
            debug!(
                previous_rate = current,
                new_rate,
                observed_sampled_per_sec = observed_sampled_rate,
                target_per_sec = target,
                "adaptive sampler adjusted rate"
            );
        }
    }
}

impl Sampler for AdaptiveSampler {
    fn should_sample(&self, ctx: &SamplingContext<'_>) -> SamplingResult {
        self.maybe_adjust();

        let rate = self.current_rate();
        let sampled = ProbabilisticSampler::decide_low64(rate, ctx.trace_id.low_u64());

        self.total_seen.fetch_add(1, Ordering::Relaxed);
        if sampled {
            self.total_sampled.fetch_add(1, Ordering::Relaxed);
        }

        if sampled {
            SamplingResult::new(SamplingDecision::RecordAndSample, self.sample_reason.clone())
        } else {
            SamplingResult::new(SamplingDecision::Drop, self.drop_reason.clone())
        }
    }
}
