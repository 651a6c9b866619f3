//! Trace, span, and correlation identifiers
//!
//! All three id types are cheap value types. Trace and span ids enforce the
//! W3C nonzero invariant at construction; correlation ids are opaque
//! non-empty strings, generated as 32-character lowercase hex when the
//! library materializes one itself.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{TelemetryError, TelemetryResult};

/// Maximum accepted length for an externally-supplied correlation id.
pub const MAX_CORRELATION_ID_LEN: usize = 256;

/// A 128-bit trace identifier.
///
/// Identifies one distributed trace; every span in the trace shares it.
/// The zero value is invalid per the W3C Trace Context specification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TraceId(u128);

impl TraceId {
    /// Create a trace id, rejecting the invalid all-zero value.
    pub fn new(value: u128) -> Option<Self> {
        (value != 0).then_some(Self(value))
    }

    /// Generate a random nonzero trace id.
    pub fn random() -> Self {
        loop {
            let value = (u128::from(fastrand::u64(..)) << 64) | u128::from(fastrand::u64(..));
            if value != 0 {
                return Self(value);
            }
        }
    }

    /// The raw 128-bit value.
    #[inline]
    pub fn as_u128(self) -> u128 {
        self.0
    }

    /// Low 64 bits, used by deterministic sampling and vendor-native
    /// propagation headers.
    #[inline]
    pub fn low_u64(self) -> u64 {
        self.0 as u64
    }

    /// Parse from exactly 32 hex characters (either case accepted).
    pub fn from_hex(hex: &str) -> Option<Self> {
        if hex.len() != 32 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        u128::from_str_radix(hex, 16).ok().and_then(Self::new)
    }
}

impl fmt::Display for TraceId {
    /// Canonical lowercase 32-hex form.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

/// A 64-bit span identifier.
///
/// Identifies one span within a trace. Zero is invalid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SpanId(u64);

impl SpanId {
    /// Create a span id, rejecting the invalid all-zero value.
    pub fn new(value: u64) -> Option<Self> {
        (value != 0).then_some(Self(value))
    }

    /// Generate a random nonzero span id.
    pub fn random() -> Self {
        loop {
            let value = fastrand::u64(..);
            if value != 0 {
                return Self(value);
            }
        }
    }

    /// The raw 64-bit value.
    #[inline]
    pub fn as_u64(self) -> u64 {
        self.0
    }

    /// Parse from exactly 16 hex characters (either case accepted).
    pub fn from_hex(hex: &str) -> Option<Self> {
        if hex.len() != 16 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        u64::from_str_radix(hex, 16).ok().and_then(Self::new)
    }
}

impl fmt::Display for SpanId {
    /// Canonical lowercase 16-hex form.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// An opaque, non-empty correlation identifier.
///
/// Produced at ingress and propagated through all related work. When the
/// library generates one itself it uses 32 lowercase hex characters
/// (128 random bits), but externally-supplied values are accepted verbatim
/// up to [`MAX_CORRELATION_ID_LEN`] characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(String);

impl CorrelationId {
    /// Wrap an externally-supplied id.
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError::InvalidArgument`] if the value is empty or
    /// longer than [`MAX_CORRELATION_ID_LEN`].
    pub fn new(value: impl Into<String>) -> TelemetryResult<Self> {
        let value = value.into();
        if value.is_empty() {
            return Err(TelemetryError::invalid_argument(
                "correlation_id",
                "must not be empty",
            ));
        }
        if value.len() > MAX_CORRELATION_ID_LEN {
            return Err(TelemetryError::invalid_argument(
                "correlation_id",
                format!("must be at most {MAX_CORRELATION_ID_LEN} characters"),
            ));
        }
        Ok(Self(value))
    }

    /// Generate a fresh 32-hex correlation id.
    pub fn generate() -> Self {
        let high = fastrand::u64(..);
        let low = fastrand::u64(..);
        Self(format!("{high:016x}{low:016x}"))
    }

    /// The id as a string slice.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CorrelationId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
