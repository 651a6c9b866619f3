//! Deterministic trace-id-hash probabilistic sampling

use std::sync::Arc;

use lumen_core::{TelemetryError, TelemetryResult};

use crate::{Sampler, SamplingContext, SamplingDecision, SamplingResult};

/// Samples a fixed fraction of traces, deterministically in the trace id.
///
/// The rate is converted once at construction into a 64-bit threshold
/// (`rate * 2^64`); a trace is sampled when the unsigned interpretation of
/// its low 64 bits is at or below that threshold. Identical (rate, trace id)
/// inputs therefore produce identical decisions in every process, which is
/// what lets distributed peers agree without exchanging decisions.
#[derive(Debug, Clone)]
pub struct ProbabilisticSampler {
    rate: f64,
    threshold: Threshold,
    sample_reason: Arc<str>,
    drop_reason: Arc<str>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Threshold {
    Always,
    Never,
    Bound(u64),
}

impl ProbabilisticSampler {
    /// Create a sampler for `rate` in `[0, 1]`.
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError::InvalidArgument`] for NaN or out-of-range
    /// rates.
    pub fn new(rate: f64) -> TelemetryResult<Self> {
        if !(0.0..=1.0).contains(&rate) {
            return Err(TelemetryError::invalid_argument(
                "rate",
                format!("must be within [0, 1], got {rate}"),
            ));
        }

        let threshold = if rate >= 1.0 {
            Threshold::Always
        } else if rate <= 0.0 {
            Threshold::Never
        } else {
            // rate * 2^64, computed in f64 and saturated into u64 range.
            Threshold::Bound((rate * 18_446_744_073_709_551_616.0) as u64)
        };

        Ok(Self {
            rate,
            threshold,
            sample_reason: Arc::from(format!("probabilistic(rate={rate}, sampled)")),
            drop_reason: Arc::from(format!("probabilistic(rate={rate}, dropped)")),
        })
    }

    /// The configured rate.
    pub fn rate(&self) -> f64 {
        self.rate
    }

    /// The raw decision for a low-64 trace-id value, shared with the
    /// adaptive sampler.
    pub(crate) fn decide_low64(threshold_rate: f64, low: u64) -> bool {
        if threshold_rate >= 1.0 {
            return true;
        }
        if threshold_rate <= 0.0 {
            return false;
        }
        low <= (threshold_rate * 18_446_744_073_709_551_616.0) as u64
    }
}

impl Sampler for ProbabilisticSampler {
    fn should_sample(&self, ctx: &SamplingContext<'_>) -> SamplingResult {
        let sampled = match self.threshold {
            Threshold::Always => true,
            Threshold::Never => false,
            Threshold::Bound(threshold) => ctx.trace_id.low_u64() <= threshold,
        };

        if sampled {
            SamplingResult::new(SamplingDecision::RecordAndSample, self.sample_reason.clone())
        } else {
            SamplingResult::new(SamplingDecision::Drop, self.drop_reason.clone())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_core::{SpanKind, TraceId};

    fn ctx_for(trace_id: TraceId) -> SamplingContext<'static> {
        SamplingContext::new(trace_id, "src", "op", SpanKind::Internal)
    }

    #[test]
    fn rejects_invalid_rates() {
        assert!(ProbabilisticSampler::new(-0.1).is_err());
        assert!(ProbabilisticSampler::new(1.1).is_err());
        assert!(ProbabilisticSampler::new(f64::NAN).is_err());
    }

    #[test]
    fn rate_one_samples_everything() {
        let sampler = ProbabilisticSampler::new(1.0).unwrap();
        for _ in 0..100 {
            assert!(sampler.should_sample(&ctx_for(TraceId::random())).is_sampled());
        }
    }

    #[test]
    fn rate_zero_samples_nothing() {
        let sampler = ProbabilisticSampler::new(0.0).unwrap();
        for _ in 0..100 {
            assert!(!sampler.should_sample(&ctx_for(TraceId::random())).is_sampled());
        }
    }

    // The reference trace id from the W3C examples: its low 64 bits are
    // 0x8448eb211c80319c ~= 9.53e18, above the 0.25 threshold (~4.61e18)
    // and below the 0.60 threshold (~1.11e19).
    const REFERENCE_TRACE: &str = "0af7651916cd43dd8448eb211c80319c";

    #[test]
    fn reference_trace_dropped_at_quarter_rate() {
        let trace_id = TraceId::from_hex(REFERENCE_TRACE).unwrap();
        let sampler = ProbabilisticSampler::new(0.25).unwrap();
        let result = sampler.should_sample(&ctx_for(trace_id));
        assert_eq!(result.decision, SamplingDecision::Drop);
    }

    #[test]
    fn reference_trace_sampled_at_sixty_percent() {
        let trace_id = TraceId::from_hex(REFERENCE_TRACE).unwrap();
        let sampler = ProbabilisticSampler::new(0.60).unwrap();
        let result = sampler.should_sample(&ctx_for(trace_id));
        assert_eq!(result.decision, SamplingDecision::RecordAndSample);
    }

    #[test]
    fn decisions_are_deterministic_across_instances() {
        let a = ProbabilisticSampler::new(0.5).unwrap();
        let b = ProbabilisticSampler::new(0.5).unwrap();
        for _ in 0..200 {
            let ctx = ctx_for(TraceId::random());
            assert_eq!(
                a.should_sample(&ctx).decision,
                b.should_sample(&ctx).decision
            );
        }
    }

    #[test]
    fn reason_strings_are_shared_not_rebuilt() {
        let sampler = ProbabilisticSampler::new(1.0).unwrap();
        let ctx = ctx_for(TraceId::random());
        let first = sampler.should_sample(&ctx).reason;
        let second = sampler.should_sample(&ctx).reason;
        assert!(Arc::ptr_eq(&first, &second));
    }
}
