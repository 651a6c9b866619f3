//! Conditional always-sample overlay

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Duration;

use lumen_core::TagValue;
use tracing::debug;

use crate::{Sampler, SamplingContext, SamplingDecision, SamplingResult};

type ForcePredicate = dyn Fn(&SamplingContext<'_>) -> bool + Send + Sync;

/// Wraps a base sampler and forces `RecordAndSample` for spans that are
/// worth keeping regardless of rate: errors, spans carrying an exception,
/// and slow operations.
///
/// A user-supplied predicate is consulted first; if it panics the panic is
/// swallowed and treated as "no opinion", so a buggy predicate can never
/// take the pipeline down or force-drop a span.
pub struct ConditionalSampler {
    base: Arc<dyn Sampler>,
    slow_threshold: Option<Duration>,
    predicate: Option<Box<ForcePredicate>>,
    forced_reason: Arc<str>,
}

impl std::fmt::Debug for ConditionalSampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConditionalSampler")
            .field("base", &self.base)
            .field("slow_threshold", &self.slow_threshold)
            .field("has_predicate", &self.predicate.is_some())
            .finish()
    }
}

impl ConditionalSampler {
    /// Wrap `base` with the default overlay (errors and exceptions force
    /// sampling; no slow threshold, no predicate).
    pub fn new(base: Arc<dyn Sampler>) -> Self {
        Self {
            base,
            slow_threshold: None,
            predicate: None,
            forced_reason: Arc::from("conditional(forced)"),
        }
    }

    /// Force-sample spans whose `duration.ms` tag exceeds `threshold`.
    #[must_use]
    pub fn with_slow_threshold(mut self, threshold: Duration) -> Self {
        self.slow_threshold = Some(threshold);
        self
    }

    /// Add a custom force-sample predicate, consulted before the built-in
    /// rules.
    #[must_use]
    pub fn with_predicate(
        mut self,
        predicate: impl Fn(&SamplingContext<'_>) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.predicate = Some(Box::new(predicate));
        self
    }

    fn is_forced(&self, ctx: &SamplingContext<'_>) -> bool {
        if let Some(predicate) = &self.predicate {
            match catch_unwind(AssertUnwindSafe(|| predicate(ctx))) {
                Ok(true) => return true,
                Ok(false) => {}
                Err(_) => {
                    debug!("conditional sampler predicate panicked; ignoring");
                }
            }
        }

        if matches!(ctx.tag("error"), Some(TagValue::Bool(true))) {
            return true;
        }
        if ctx.tag("exception.type").is_some() {
            return true;
        }
        if let Some(threshold) = self.slow_threshold {
            let duration_ms = match ctx.tag("duration.ms") {
                Some(TagValue::F64(ms)) => Some(*ms),
                Some(TagValue::I64(ms)) => Some(*ms as f64),
                _ => None,
            };
            if let Some(ms) = duration_ms
                && ms > threshold.as_secs_f64() * 1000.0
            {
                return true;
            }
        }
        false
    }
}

impl Sampler for ConditionalSampler {
    fn should_sample(&self, ctx: &SamplingContext<'_>) -> SamplingResult {
        if self.is_forced(ctx) {
            return SamplingResult::new(
                SamplingDecision::RecordAndSample,
                self.forced_reason.clone(),
            );
        }
        self.base.should_sample(ctx)
    }
}
