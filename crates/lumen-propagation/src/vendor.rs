//! Datadog-native propagation headers
//!
//! The vendor pair carries the low 64 bits of the trace id and the full
//! span id, both in decimal. The optional sampling-priority header maps any
//! positive value to the sampled flag. Inbound values that fail to parse
//! (or parse to zero) are ignored.

use tracing::debug;

use lumen_core::{Carrier, SpanId, TraceContext, TraceFlags, TraceId};

/// Decimal low-64 of the trace id.
pub const VENDOR_TRACE_ID_HEADER: &str = "x-datadog-trace-id";

/// Decimal span id of the sender.
pub const VENDOR_PARENT_ID_HEADER: &str = "x-datadog-parent-id";

/// Optional sampling priority; positive means sampled.
pub const VENDOR_SAMPLING_PRIORITY_HEADER: &str = "x-datadog-sampling-priority";

pub(crate) fn inject(ctx: &TraceContext, carrier: &mut dyn Carrier) {
    carrier.set(VENDOR_TRACE_ID_HEADER, ctx.trace_id.low_u64().to_string());
    carrier.set(VENDOR_PARENT_ID_HEADER, ctx.span_id.as_u64().to_string());
    carrier.set(
        VENDOR_SAMPLING_PRIORITY_HEADER,
        if ctx.is_sampled() { "1" } else { "0" }.to_string(),
    );
}

pub(crate) fn extract(carrier: &dyn Carrier) -> Option<TraceContext> {
    let raw_trace = carrier.get(VENDOR_TRACE_ID_HEADER)?;
    let raw_parent = carrier.get(VENDOR_PARENT_ID_HEADER)?;

    let trace_low: u64 = match raw_trace.trim().parse() {
        Ok(value) => value,
        Err(_) => {
            debug!(header = raw_trace, "ignoring malformed vendor trace id");
            return None;
        }
    };
    let parent: u64 = match raw_parent.trim().parse() {
        Ok(value) => value,
        Err(_) => {
            debug!(header = raw_parent, "ignoring malformed vendor parent id");
            return None;
        }
    };

    let trace_id = TraceId::new(u128::from(trace_low))?;
    let span_id = SpanId::new(parent)?;

    let sampled = carrier
        .get(VENDOR_SAMPLING_PRIORITY_HEADER)
        .and_then(|value| value.trim().parse::<i32>().ok())
        .is_some_and(|priority| priority > 0);

    Some(TraceContext::new(
        trace_id,
        span_id,
        TraceFlags::NONE.with_sampled(sampled),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_core::HeaderMapCarrier;

    #[test]
    fn inject_emits_decimal_low_64() {
        let ctx = TraceContext::new(
            TraceId::from_hex("0af7651916cd43dd8448eb211c80319c").unwrap(),
            SpanId::from_hex("b7ad6b7169203331").unwrap(),
            TraceFlags::new(0x01),
        );
        let mut carrier = HeaderMapCarrier::new();
        inject(&ctx, &mut carrier);

        assert_eq!(
            carrier.get(VENDOR_TRACE_ID_HEADER),
            Some(0x8448_eb21_1c80_319c_u64.to_string().as_str())
        );
        assert_eq!(
            carrier.get(VENDOR_PARENT_ID_HEADER),
            Some(0xb7ad_6b71_6920_3331_u64.to_string().as_str())
        );
        assert_eq!(carrier.get(VENDOR_SAMPLING_PRIORITY_HEADER), Some("1"));
    }

    #[test]
    fn extract_round_trips_ids_and_priority() {
        let mut carrier = HeaderMapCarrier::new();
        carrier.set(VENDOR_TRACE_ID_HEADER, "123456789".to_string());
        carrier.set(VENDOR_PARENT_ID_HEADER, "987654321".to_string());
        carrier.set(VENDOR_SAMPLING_PRIORITY_HEADER, "2".to_string());

        let ctx = extract(&carrier).unwrap();
        assert_eq!(ctx.trace_id.as_u128(), 123_456_789);
        assert_eq!(ctx.span_id.as_u64(), 987_654_321);
        assert!(ctx.is_sampled());
    }

    #[test]
    fn missing_priority_means_unsampled() {
        let mut carrier = HeaderMapCarrier::new();
        carrier.set(VENDOR_TRACE_ID_HEADER, "1".to_string());
        carrier.set(VENDOR_PARENT_ID_HEADER, "2".to_string());
        assert!(!extract(&carrier).unwrap().is_sampled());
    }

    #[test]
    fn zero_or_garbage_ids_extract_nothing() {
        let mut carrier = HeaderMapCarrier::new();
        carrier.set(VENDOR_TRACE_ID_HEADER, "0".to_string());
        carrier.set(VENDOR_PARENT_ID_HEADER, "2".to_string());
        assert!(extract(&carrier).is_none());

        let mut carrier = HeaderMapCarrier::new();
        carrier.set(VENDOR_TRACE_ID_HEADER, "not-a-number".to_string());
        carrier.set(VENDOR_PARENT_ID_HEADER, "2".to_string());
        assert!(extract(&carrier).is_none());
    }
}
