//! W3C Trace Context parsing and emission
//!
//! Implements version `00` of the `traceparent` header exactly:
//! `00-<32 hex trace id>-<16 hex span id>-<2 hex flags>`. Parsing accepts
//! either hex case and tolerates future-version suffixes after the flags
//! field; emission is always canonical lowercase. Any structural violation
//! makes [`TraceContext::parse_traceparent`] return `None` - a malformed
//! inbound header simply starts a new trace.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ids::{SpanId, TraceId};

/// Maximum accepted length of a `tracestate` value.
pub const MAX_TRACE_STATE_LEN: usize = 512;

/// The only traceparent version this library emits or understands.
const SUPPORTED_VERSION: &str = "00";

/// Trace flags byte. Bit 0 is the "sampled" flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TraceFlags(u8);

impl TraceFlags {
    /// Bit 0: the span was sampled upstream.
    pub const SAMPLED: TraceFlags = TraceFlags(0x01);

    /// No flags set.
    pub const NONE: TraceFlags = TraceFlags(0x00);

    /// Construct from a raw byte.
    pub fn new(bits: u8) -> Self {
        Self(bits)
    }

    /// The raw byte.
    #[inline]
    pub fn bits(self) -> u8 {
        self.0
    }

    /// Whether the sampled bit is set.
    #[inline]
    pub fn is_sampled(self) -> bool {
        self.0 & Self::SAMPLED.0 != 0
    }

    /// Return a copy with the sampled bit set or cleared.
    pub fn with_sampled(self, sampled: bool) -> Self {
        if sampled {
            Self(self.0 | Self::SAMPLED.0)
        } else {
            Self(self.0 & !Self::SAMPLED.0)
        }
    }
}

/// Free-form `tracestate` value, non-empty and capped at
/// [`MAX_TRACE_STATE_LEN`] characters.
///
/// The library does not interpret entries; the value travels opaquely so
/// participating vendors can round-trip their own state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TraceState(String);

impl TraceState {
    /// Wrap a tracestate value, rejecting empty or oversized input.
    pub fn new(value: impl Into<String>) -> Option<Self> {
        let value = value.into();
        if value.is_empty() || value.len() > MAX_TRACE_STATE_LEN {
            return None;
        }
        Some(Self(value))
    }

    /// The value as a string slice.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TraceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An immutable W3C trace context: trace id, span id, flags, and optional
/// vendor state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceContext {
    /// 128-bit trace identifier, never zero.
    pub trace_id: TraceId,
    /// 64-bit span identifier, never zero.
    pub span_id: SpanId,
    /// Trace flags byte.
    pub flags: TraceFlags,
    /// Opaque `tracestate` carried alongside, when present.
    pub state: Option<TraceState>,
}

impl TraceContext {
    /// Build a context from ids and flags, with no vendor state.
    pub fn new(trace_id: TraceId, span_id: SpanId, flags: TraceFlags) -> Self {
        Self {
            trace_id,
            span_id,
            flags,
            state: None,
        }
    }

    /// Attach a `tracestate` value.
    #[must_use]
    pub fn with_state(mut self, state: Option<TraceState>) -> Self {
        self.state = state;
        self
    }

    /// Start a fresh root context with random ids.
    pub fn new_root(sampled: bool) -> Self {
        Self::new(
            TraceId::random(),
            SpanId::random(),
            TraceFlags::NONE.with_sampled(sampled),
        )
    }

    /// Derive a child context: same trace id, state, and flags, fresh span id.
    pub fn child(&self) -> Self {
        Self {
            trace_id: self.trace_id,
            span_id: SpanId::random(),
            flags: self.flags,
            state: self.state.clone(),
        }
    }

    /// Parse a `traceparent` header value.
    ///
    /// Returns `None` on any violation: wrong version, wrong field lengths,
    /// non-hex characters, or an all-zero trace or span id. Fields after the
    /// flags (future versions append more) are ignored.
    pub fn parse_traceparent(value: &str) -> Option<Self> {
        let mut parts = value.trim().splitn(4, '-');

        let version = parts.next()?;
        if version != SUPPORTED_VERSION {
            return None;
        }

        let trace_id = TraceId::from_hex(parts.next()?)?;
        let span_id = SpanId::from_hex(parts.next()?)?;

        let rest = parts.next()?;
        // Flags are exactly two hex chars; a future-version suffix may follow
        // after another separator.
        let flags_field = rest.split('-').next()?;
        if flags_field.len() != 2 || !flags_field.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        let flags = u8::from_str_radix(flags_field, 16).ok()?;

        Some(Self::new(trace_id, span_id, TraceFlags::new(flags)))
    }

    /// Emit the canonical lowercase `traceparent` value.
    pub fn to_traceparent(&self) -> String {
        format!(
            "{SUPPORTED_VERSION}-{}-{}-{:02x}",
            self.trace_id,
            self.span_id,
            self.flags.bits()
        )
    }

    /// Whether the sampled flag is set.
    #[inline]
    pub fn is_sampled(&self) -> bool {
        self.flags.is_sampled()
    }
}

impl fmt::Display for TraceContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_traceparent())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CANONICAL: &str = "00-0af7651916cd43dd8448eb211c80319c-b7ad6b7169203331-01";

    #[test]
    fn parse_then_emit_is_identity() {
        let ctx = TraceContext::parse_traceparent(CANONICAL).unwrap();
        assert_eq!(ctx.to_traceparent(), CANONICAL);
    }

    #[test]
    fn parse_accepts_uppercase_hex() {
        let upper = "00-0AF7651916CD43DD8448EB211C80319C-B7AD6B7169203331-01";
        let ctx = TraceContext::parse_traceparent(upper).unwrap();
        assert_eq!(ctx.to_traceparent(), CANONICAL);
    }

    #[test]
    fn parse_rejects_unsupported_version() {
        let v1 = "01-0af7651916cd43dd8448eb211c80319c-b7ad6b7169203331-01";
        assert!(TraceContext::parse_traceparent(v1).is_none());
    }

    #[test]
    fn parse_rejects_zero_ids() {
        let zero_trace = "00-00000000000000000000000000000000-b7ad6b7169203331-01";
        let zero_span = "00-0af7651916cd43dd8448eb211c80319c-0000000000000000-01";
        assert!(TraceContext::parse_traceparent(zero_trace).is_none());
        assert!(TraceContext::parse_traceparent(zero_span).is_none());
    }

    #[test]
    fn parse_rejects_bad_lengths() {
        assert!(TraceContext::parse_traceparent("00-abc-b7ad6b7169203331-01").is_none());
        assert!(
            TraceContext::parse_traceparent("00-0af7651916cd43dd8448eb211c80319c-b7ad-01")
                .is_none()
        );
        assert!(
            TraceContext::parse_traceparent("00-0af7651916cd43dd8448eb211c80319c-b7ad6b7169203331-1")
                .is_none()
        );
    }

    #[test]
    fn parse_tolerates_future_version_suffix() {
        let with_suffix = "00-0af7651916cd43dd8448eb211c80319c-b7ad6b7169203331-01-extra";
        let ctx = TraceContext::parse_traceparent(with_suffix).unwrap();
        assert!(ctx.is_sampled());
        assert_eq!(ctx.to_traceparent(), CANONICAL);
    }

    #[test]
    fn sampled_flag_round_trip() {
        let flags = TraceFlags::NONE.with_sampled(true);
        assert!(flags.is_sampled());
        assert!(!flags.with_sampled(false).is_sampled());
    }

    #[test]
    fn trace_state_enforces_bounds() {
        assert!(TraceState::new("").is_none());
        assert!(TraceState::new("a".repeat(MAX_TRACE_STATE_LEN + 1)).is_none());
        assert_eq!(
            TraceState::new("congo=t61rcWkgMzE").unwrap().as_str(),
            "congo=t61rcWkgMzE"
        );
    }

    #[test]
    fn child_keeps_trace_id_and_state() {
        let parent = TraceContext::parse_traceparent(CANONICAL)
            .unwrap()
            .with_state(TraceState::new("congo=t61rcWkgMzE"));
        let child = parent.child();
        assert_eq!(child.trace_id, parent.trace_id);
        assert_eq!(child.state, parent.state);
        assert_ne!(child.span_id, parent.span_id);
    }
}
