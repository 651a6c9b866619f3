//! Wire-carrier context propagation for Lumen
//!
//! One [`Propagator`] writes and reads trace context on any
//! [`Carrier`](lumen_core::Carrier): HTTP header maps, RPC metadata, SOAP
//! headers, broker message headers. The W3C `traceparent`/`tracestate` pair
//! is always understood; the Datadog-native header pair is emitted and
//! accepted when enabled. Correlation ids travel under a configurable
//! header (default `x-correlation-id`).
//!
//! Extraction never fails loudly: a malformed inbound header is ignored
//! (with a debug log) and the operation simply starts a new trace.
//!
//! # Example
//!
//! ```rust
//! use lumen_core::{HeaderMapCarrier, TraceContext};
//! use lumen_propagation::Propagator;
//!
//! let propagator = Propagator::new();
//! let outbound = TraceContext::new_root(true);
//!
//! let mut headers = HeaderMapCarrier::new();
//! propagator.inject(&outbound, &mut headers);
//!
//! let inbound = propagator.extract(&headers).unwrap();
//! assert_eq!(inbound.trace_id, outbound.trace_id);
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]

mod correlation;
mod messaging;
mod soap;
mod vendor;

pub use correlation::{DEFAULT_CORRELATION_HEADER, extract_correlation, inject_correlation};
pub use messaging::MessageHeaderCarrier;
pub use soap::{DEFAULT_SOAP_NAMESPACE, SoapHeader, SoapHeaderCarrier};
pub use vendor::{
    VENDOR_PARENT_ID_HEADER, VENDOR_SAMPLING_PRIORITY_HEADER, VENDOR_TRACE_ID_HEADER,
};

use tracing::debug;

use lumen_core::{Carrier, TraceContext, TraceState};

/// The W3C trace parent header name.
pub const TRACEPARENT_HEADER: &str = "traceparent";

/// The W3C trace state header name.
pub const TRACESTATE_HEADER: &str = "tracestate";

/// Injects and extracts trace context over any carrier.
#[derive(Debug, Clone, Default)]
pub struct Propagator {
    vendor_enabled: bool,
}

impl Propagator {
    /// W3C-only propagator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Also emit and accept the Datadog-native header pair.
    #[must_use]
    pub fn with_vendor_headers(mut self, enabled: bool) -> Self {
        self.vendor_enabled = enabled;
        self
    }

    /// Write `ctx` onto the carrier: `traceparent`, `tracestate` when
    /// present, and the vendor pair when enabled.
    pub fn inject(&self, ctx: &TraceContext, carrier: &mut dyn Carrier) {
        carrier.set(TRACEPARENT_HEADER, ctx.to_traceparent());
        if let Some(state) = &ctx.state {
            carrier.set(TRACESTATE_HEADER, state.as_str().to_string());
        }
        if self.vendor_enabled {
            vendor::inject(ctx, carrier);
        }
    }

    /// Read trace context off the carrier: W3C first, the vendor pair as a
    /// fallback. Returns `None` when nothing valid is present.
    pub fn extract(&self, carrier: &dyn Carrier) -> Option<TraceContext> {
        if let Some(raw) = carrier.get(TRACEPARENT_HEADER) {
            match TraceContext::parse_traceparent(raw) {
                Some(ctx) => {
                    let state = carrier
                        .get(TRACESTATE_HEADER)
                        .filter(|value| !value.is_empty())
                        .and_then(TraceState::new);
                    return Some(ctx.with_state(state));
                }
                None => {
                    debug!(header = raw, "ignoring malformed traceparent header");
                }
            }
        }

        if self.vendor_enabled
            && let Some(ctx) = vendor::extract(carrier)
        {
            return Some(ctx);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_core::{HeaderMapCarrier, SpanId, TraceFlags, TraceId};

    fn context() -> TraceContext {
        TraceContext::new(
            TraceId::from_hex("0af7651916cd43dd8448eb211c80319c").unwrap(),
            SpanId::from_hex("b7ad6b7169203331").unwrap(),
            TraceFlags::new(0x01),
        )
    }

    #[test]
    fn inject_writes_canonical_traceparent() {
        let mut carrier = HeaderMapCarrier::new();
        Propagator::new().inject(&context(), &mut carrier);
        assert_eq!(
            carrier.get(TRACEPARENT_HEADER),
            Some("00-0af7651916cd43dd8448eb211c80319c-b7ad6b7169203331-01")
        );
        assert!(carrier.get(TRACESTATE_HEADER).is_none());
    }

    #[test]
    fn tracestate_travels_when_present() {
        let ctx = context().with_state(TraceState::new("congo=t61rcWkgMzE"));
        let mut carrier = HeaderMapCarrier::new();
        let propagator = Propagator::new();
        propagator.inject(&ctx, &mut carrier);

        let extracted = propagator.extract(&carrier).unwrap();
        assert_eq!(extracted.state.unwrap().as_str(), "congo=t61rcWkgMzE");
    }

    #[test]
    fn malformed_traceparent_extracts_nothing() {
        let mut carrier = HeaderMapCarrier::new();
        carrier.set(TRACEPARENT_HEADER, "00-bogus-bogus-01".to_string());
        assert!(Propagator::new().extract(&carrier).is_none());
    }

    #[test]
    fn empty_tracestate_is_treated_as_absent() {
        let mut carrier = HeaderMapCarrier::new();
        Propagator::new().inject(&context(), &mut carrier);
        carrier.set(TRACESTATE_HEADER, String::new());
        let extracted = Propagator::new().extract(&carrier).unwrap();
        assert!(extracted.state.is_none());
    }

    #[test]
    fn vendor_headers_absent_unless_enabled() {
        let mut carrier = HeaderMapCarrier::new();
        Propagator::new().inject(&context(), &mut carrier);
        assert!(carrier.get(VENDOR_TRACE_ID_HEADER).is_none());

        let mut carrier = HeaderMapCarrier::new();
        Propagator::new()
            .with_vendor_headers(true)
            .inject(&context(), &mut carrier);
        assert!(carrier.get(VENDOR_TRACE_ID_HEADER).is_some());
        assert!(carrier.get(VENDOR_PARENT_ID_HEADER).is_some());
    }

    #[test]
    fn w3c_wins_over_vendor_on_extract() {
        let propagator = Propagator::new().with_vendor_headers(true);
        let mut carrier = HeaderMapCarrier::new();
        propagator.inject(&context(), &mut carrier);
        // Conflicting vendor trace id; W3C must win.
        carrier.set(VENDOR_TRACE_ID_HEADER, "12345".to_string());

        let extracted = propagator.extract(&carrier).unwrap();
        assert_eq!(extracted.trace_id, context().trace_id);
    }
}
