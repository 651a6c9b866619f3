//! Sampler family for Lumen
//!
//! Every sampler answers one question - keep or drop this span - through the
//! common [`Sampler`] trait. Decisions are made locally from the trace id,
//! so distributed peers configured with the same rate agree without any
//! cross-process coordination.
//!
//! Four implementations cover the practical space:
//!
//! - [`ProbabilisticSampler`] - deterministic trace-id-hash sampling at a
//!   fixed rate
//! - [`PerSourceSampler`] - routes to inner samplers by source and
//!   (source, operation)
//! - [`ConditionalSampler`] - overlays always-sample-errors/slow rules on a
//!   base sampler
//! - [`AdaptiveSampler`] - steers its rate toward a target sampled
//!   throughput
//!
//! # Example
//!
//! ```rust
//! use lumen_core::{SpanKind, TraceId};
//! use lumen_sampling::{ProbabilisticSampler, Sampler, SamplingContext, SamplingDecision};
//!
//! let sampler = ProbabilisticSampler::new(1.0).unwrap();
//! let ctx = SamplingContext::new(TraceId::random(), "payments", "charge", SpanKind::Server);
//! assert_eq!(
//!     sampler.should_sample(&ctx).decision,
//!     SamplingDecision::RecordAndSample
//! );
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]

mod adaptive;
mod conditional;
mod per_source;
mod probabilistic;

pub use adaptive::{AdaptiveSampler, AdaptiveSamplerConfig};
pub use conditional::ConditionalSampler;
pub use per_source::PerSourceSampler;
pub use probabilistic::ProbabilisticSampler;

use std::fmt;
use std::sync::Arc;

use lumen_core::{SpanKind, TagValue, TraceId};

/// Keep or drop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SamplingDecision {
    /// Do not record the span. Context still propagates downstream.
    Drop,
    /// Record the span and mark it sampled for downstream peers.
    RecordAndSample,
}

/// A sampling decision plus the reason that produced it.
///
/// Reasons are shared `Arc<str>` values cached by the samplers, so taking a
/// decision does not allocate on the hot path.
#[derive(Debug, Clone)]
pub struct SamplingResult {
    /// The decision.
    pub decision: SamplingDecision,
    /// Why the decision was taken, for diagnostics.
    pub reason: Arc<str>,
}

impl SamplingResult {
    /// Build a result.
    pub fn new(decision: SamplingDecision, reason: Arc<str>) -> Self {
        Self { decision, reason }
    }

    /// Whether the decision is [`SamplingDecision::RecordAndSample`].
    #[inline]
    pub fn is_sampled(&self) -> bool {
        self.decision == SamplingDecision::RecordAndSample
    }
}

/// Everything a sampler may consult when deciding.
#[derive(Debug, Clone)]
pub struct SamplingContext<'a> {
    /// Trace id of the span under decision.
    pub trace_id: TraceId,
    /// Activity source producing the span.
    pub source_name: &'a str,
    /// Operation name of the span.
    pub operation_name: &'a str,
    /// Span kind.
    pub kind: SpanKind,
    /// Tags known at decision time, if any.
    pub tags: Option<&'a [(String, TagValue)]>,
}

impl<'a> SamplingContext<'a> {
    /// Build a context without tags.
    pub fn new(
        trace_id: TraceId,
        source_name: &'a str,
        operation_name: &'a str,
        kind: SpanKind,
    ) -> Self {
        Self {
            trace_id,
            source_name,
            operation_name,
            kind,
            tags: None,
        }
    }

    /// Attach decision-time tags.
    #[must_use]
    pub fn with_tags(mut self, tags: &'a [(String, TagValue)]) -> Self {
        self.tags = Some(tags);
        self
    }

    /// Look up a tag by key.
    pub fn tag(&self, key: &str) -> Option<&TagValue> {
        self.tags?.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }
}

/// The common decision contract all samplers implement.
pub trait Sampler: Send + Sync + fmt::Debug {
    /// Decide whether the span described by `ctx` should be recorded.
    ///
    /// Implementations must be deterministic in the trace id wherever they
    /// sample probabilistically, so peers deciding for the same trace agree.
    fn should_sample(&self, ctx: &SamplingContext<'_>) -> SamplingResult;
}

impl<S: Sampler + ?Sized> Sampler for Arc<S> {
    fn should_sample(&self, ctx: &SamplingContext<'_>) -> SamplingResult {
        (**self).should_sample(ctx)
    }
}

/// A sampler that always records. Useful as a default and in tests.
#[derive(Debug, Clone, Default)]
pub struct AlwaysOnSampler;

impl Sampler for AlwaysOnSampler {
    fn should_sample(&self, _ctx: &SamplingContext<'_>) -> SamplingResult {
        SamplingResult::new(SamplingDecision::RecordAndSample, reason_always_on())
    }
}

/// A sampler that never records.
#[derive(Debug, Clone, Default)]
pub struct AlwaysOffSampler;

impl Sampler for AlwaysOffSampler {
    fn should_sample(&self, _ctx: &SamplingContext<'_>) -> SamplingResult {
        SamplingResult::new(SamplingDecision::Drop, reason_always_off())
    }
}

fn reason_always_on() -> Arc<str> {
    static REASON: std::sync::OnceLock<Arc<str>> = std::sync::OnceLock::new();
    REASON.get_or_init(|| Arc::from("always_on")).clone()
}

fn reason_always_off() -> Arc<str> {
    static REASON: std::sync::OnceLock<Arc<str>> = std::sync::OnceLock::new();
    REASON.get_or_init(|| Arc::from("always_off")).clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn always_on_and_off() {
        let ctx = SamplingContext::new(TraceId::random(), "src", "op", SpanKind::Internal);
        assert!(AlwaysOnSampler.should_sample(&ctx).is_sampled());
        assert!(!AlwaysOffSampler.should_sample(&ctx).is_sampled());
    }

    #[test]
    fn context_tag_lookup() {
        let tags = vec![("error".to_string(), TagValue::Bool(true))];
        let ctx = SamplingContext::new(TraceId::random(), "src", "op", SpanKind::Internal)
            .with_tags(&tags);
        assert_eq!(ctx.tag("error"), Some(&TagValue::Bool(true)));
        assert!(ctx.tag("missing").is_none());
    }
}
