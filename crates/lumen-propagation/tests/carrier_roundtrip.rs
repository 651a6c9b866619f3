//! Inject-then-extract round trips across every carrier type

use proptest::prelude::*;

use lumen_core::{Carrier, HeaderMapCarrier, SpanId, TraceContext, TraceFlags, TraceId, TraceState};
use lumen_propagation::{MessageHeaderCarrier, Propagator, SoapHeaderCarrier};

const CANONICAL: &str = "00-0af7651916cd43dd8448eb211c80319c-b7ad6b7169203331-01";

#[test]
fn parse_then_emit_reference_header_is_identity() {
    let ctx = TraceContext::parse_traceparent(CANONICAL).unwrap();
    assert_eq!(ctx.to_traceparent(), CANONICAL);
}

#[test]
fn tracestate_survives_inject_extract() {
    let ctx = TraceContext::parse_traceparent(CANONICAL)
        .unwrap()
        .with_state(TraceState::new("congo=t61rcWkgMzE"));
    let propagator = Propagator::new();

    let mut carrier = HeaderMapCarrier::new();
    propagator.inject(&ctx, &mut carrier);
    let extracted = propagator.extract(&carrier).unwrap();

    assert_eq!(extracted, ctx);
}

fn round_trip_on<C: Carrier + Default>(ctx: &TraceContext) -> TraceContext {
    let propagator = Propagator::new();
    let mut carrier = C::default();
    propagator.inject(ctx, &mut carrier);
    propagator.extract(&carrier).expect("context extracts")
}

#[test]
fn every_carrier_round_trips_the_same_context() {
    let ctx = TraceContext::parse_traceparent(CANONICAL)
        .unwrap()
        .with_state(TraceState::new("vendor=abc"));

    assert_eq!(round_trip_on::<HeaderMapCarrier>(&ctx), ctx);
    assert_eq!(round_trip_on::<SoapHeaderCarrier>(&ctx), ctx);
    assert_eq!(round_trip_on::<MessageHeaderCarrier>(&ctx), ctx);
}

#[test]
fn vendor_only_inbound_falls_back() {
    let propagator = Propagator::new().with_vendor_headers(true);
    let mut carrier = HeaderMapCarrier::new();
    carrier.set("x-datadog-trace-id", "9532127138774266268".to_string());
    carrier.set("x-datadog-parent-id", "13235353014750515761".to_string());
    carrier.set("x-datadog-sampling-priority", "1".to_string());

    let ctx = propagator.extract(&carrier).unwrap();
    assert_eq!(ctx.trace_id.low_u64(), 9_532_127_138_774_266_268);
    assert_eq!(ctx.span_id.as_u64(), 13_235_353_014_750_515_761);
    assert!(ctx.is_sampled());
}

proptest! {
    /// Inject then extract restores trace id, span id, flags, and state on
    /// any carrier, for arbitrary valid contexts.
    #[test]
    fn prop_inject_extract_is_identity(
        trace_raw in 1u128..,
        span_raw in 1u64..,
        flags in 0u8..,
        state in proptest::option::of("[a-z][a-z0-9=,_-]{0,80}")
    ) {
        let ctx = TraceContext::new(
            TraceId::new(trace_raw).unwrap(),
            SpanId::new(span_raw).unwrap(),
            TraceFlags::new(flags),
        )
        .with_state(state.and_then(TraceState::new));

        prop_assert_eq!(round_trip_on::<HeaderMapCarrier>(&ctx), ctx.clone());
        prop_assert_eq!(round_trip_on::<MessageHeaderCarrier>(&ctx), ctx.clone());
        prop_assert_eq!(round_trip_on::<SoapHeaderCarrier>(&ctx), ctx);
    }

    /// Emission is canonical lowercase and parses back to the same context.
    #[test]
    fn prop_emit_is_canonical(trace_raw in 1u128.., span_raw in 1u64.., flags in 0u8..) {
        let ctx = TraceContext::new(
            TraceId::new(trace_raw).unwrap(),
            SpanId::new(span_raw).unwrap(),
            TraceFlags::new(flags),
        );
        let emitted = ctx.to_traceparent();
        prop_assert_eq!(emitted.to_lowercase(), emitted.clone());
        prop_assert_eq!(TraceContext::parse_traceparent(&emitted), Some(ctx));
    }
}
