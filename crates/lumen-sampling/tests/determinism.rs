//! Cross-instance determinism properties for the sampler family
//!
//! Distributed peers must reach identical decisions for the same trace id
//! and rate without exchanging any state. These tests pin the documented
//! reference decisions and verify determinism over arbitrary ids.

use proptest::prelude::*;

use lumen_core::{SpanKind, TraceId};
use lumen_sampling::{
    AdaptiveSampler, AdaptiveSamplerConfig, ProbabilisticSampler, Sampler, SamplingContext,
    SamplingDecision,
};

const REFERENCE_TRACE: &str = "0af7651916cd43dd8448eb211c80319c";

fn ctx_for(trace_id: TraceId) -> SamplingContext<'static> {
    SamplingContext::new(trace_id, "checkout", "place-order", SpanKind::Server)
}

#[test]
fn reference_decisions_match_specified_thresholds() {
    let trace_id = TraceId::from_hex(REFERENCE_TRACE).unwrap();

    // Low 64 bits ~9.53e18: above 0.25 * 2^64 (~4.61e18), below
    // 0.60 * 2^64 (~1.11e19).
    let quarter = ProbabilisticSampler::new(0.25).unwrap();
    assert_eq!(
        quarter.should_sample(&ctx_for(trace_id)).decision,
        SamplingDecision::Drop
    );

    let sixty = ProbabilisticSampler::new(0.60).unwrap();
    assert_eq!(
        sixty.should_sample(&ctx_for(trace_id)).decision,
        SamplingDecision::RecordAndSample
    );
}

#[test]
fn adaptive_sampler_agrees_with_probabilistic_at_same_rate() {
    let trace_id = TraceId::from_hex(REFERENCE_TRACE).unwrap();
    let fixed = ProbabilisticSampler::new(0.5).unwrap();
    let adaptive = AdaptiveSampler::new(AdaptiveSamplerConfig {
        initial_rate: 0.5,
        ..Default::default()
    })
    .unwrap();

    assert_eq!(
        fixed.should_sample(&ctx_for(trace_id)).decision,
        adaptive.should_sample(&ctx_for(trace_id)).decision
    );
}

proptest! {
    /// Two independently constructed samplers with the same rate always
    /// agree, for any rate and any trace id.
    #[test]
    fn prop_identical_inputs_identical_outputs(
        rate in 0.0f64..=1.0,
        raw_id in 1u128..
    ) {
        let trace_id = TraceId::new(raw_id).unwrap();
        let a = ProbabilisticSampler::new(rate).unwrap();
        let b = ProbabilisticSampler::new(rate).unwrap();
        prop_assert_eq!(
            a.should_sample(&ctx_for(trace_id)).decision,
            b.should_sample(&ctx_for(trace_id)).decision
        );
    }

    /// Rate 1.0 samples every valid context; rate 0.0 samples none.
    #[test]
    fn prop_rate_extremes(raw_id in 1u128..) {
        let trace_id = TraceId::new(raw_id).unwrap();
        let on = ProbabilisticSampler::new(1.0).unwrap();
        let off = ProbabilisticSampler::new(0.0).unwrap();
        prop_assert!(on.should_sample(&ctx_for(trace_id)).is_sampled());
        prop_assert!(!off.should_sample(&ctx_for(trace_id)).is_sampled());
    }

    /// The decision only depends on the low 64 bits of the trace id.
    #[test]
    fn prop_decision_ignores_high_bits(
        rate in 0.0f64..=1.0,
        low in 1u64..,
        high in 0u64..
    ) {
        let with_high = TraceId::new((u128::from(high) << 64) | u128::from(low)).unwrap();
        let without_high = TraceId::new(u128::from(low)).unwrap();
        let sampler = ProbabilisticSampler::new(rate).unwrap();
        prop_assert_eq!(
            sampler.should_sample(&ctx_for(with_high)).decision,
            sampler.should_sample(&ctx_for(without_high)).decision
        );
    }
}
