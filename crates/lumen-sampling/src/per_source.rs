//! Per-source and per-operation sampler routing

use dashmap::DashMap;
use std::sync::Arc;

use crate::{Sampler, SamplingContext, SamplingResult};

/// Routes sampling decisions to inner samplers keyed by activity source,
/// with operation-specific overrides.
///
/// Lookup order: `(source, operation)` entry, then `source` entry, then the
/// user-supplied default. The maps are concurrent so configuration can be
/// swapped while decisions are in flight; a decision sees either the old or
/// the new sampler, never a torn state.
#[derive(Debug)]
pub struct PerSourceSampler {
    by_source: DashMap<String, Arc<dyn Sampler>>,
    by_operation: DashMap<(String, String), Arc<dyn Sampler>>,
    default: Arc<dyn Sampler>,
}

impl PerSourceSampler {
    /// Create a router falling back to `default` for unknown sources.
    pub fn new(default: Arc<dyn Sampler>) -> Self {
        Self {
            by_source: DashMap::new(),
            by_operation: DashMap::new(),
            default,
        }
    }

    /// Install (or replace) the sampler for every operation of `source`.
    pub fn set_source(&self, source: impl Into<String>, sampler: Arc<dyn Sampler>) {
        self.by_source.insert(source.into(), sampler);
    }

    /// Install (or replace) the sampler for one `(source, operation)` pair.
    /// Operation entries win over source entries.
    pub fn set_operation(
        &self,
        source: impl Into<String>,
        operation: impl Into<String>,
        sampler: Arc<dyn Sampler>,
    ) {
        self.by_operation
            .insert((source.into(), operation.into()), sampler);
    }

    /// Remove the source-level entry, if present.
    pub fn remove_source(&self, source: &str) {
        self.by_source.remove(source);
    }

    /// Drop every configured override, reverting all sources to the default.
    pub fn clear(&self) {
        self.by_source.clear();
        self.by_operation.clear();
    }

    fn resolve(&self, source: &str, operation: &str) -> Arc<dyn Sampler> {
        if let Some(entry) = self
            .by_operation
            .get(&(source.to_string(), operation.to_string()))
        {
            return Arc::clone(entry.value());
        }
        if let Some(entry) = self.by_source.get(source) {
            return Arc::clone(entry.value());
        }
        Arc::clone(&self.default)
    }
}

impl Sampler for PerSourceSampler {
    fn should_sample(&self, ctx: &SamplingContext<'_>) -> SamplingResult {
        self.resolve(ctx.source_name, ctx.operation_name)
            .should_sample(ctx)
    }
}
