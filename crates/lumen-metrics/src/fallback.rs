//! Self-contained fallback backend
//!
//! Counters aggregate into per-tag-set atomic integers; histogram and gauge
//! samples are written to the structured log stream as events keyed by a
//! derived name. The derived-name format is an observable contract:
//! `name` for an untagged instrument, `name.k1=v1.k2=v2...` for a tagged
//! one, tags in original call order, numbers rendered with Rust's default
//! (locale-invariant) formatting.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

use lumen_core::MetricTag;

use crate::backend::{BackendKind, MetricBackend};

/// Build the derived instrument name for a tag set.
///
/// Tags are appended in call order. User-chosen names or tag values that
/// themselves contain `.` or `=` are not escaped; callers picking such
/// names accept the ambiguity.
pub fn derived_name(name: &str, tags: &[MetricTag]) -> String {
    if tags.is_empty() {
        return name.to_string();
    }
    let mut out = String::with_capacity(name.len() + tags.len() * 16);
    out.push_str(name);
    for tag in tags {
        out.push('.');
        out.push_str(&tag.key);
        out.push('=');
        out.push_str(&tag.value.to_display_string());
    }
    out
}

/// Aggregating backend used when no native metrics host is available.
#[derive(Debug, Default)]
pub struct FallbackBackend {
    counters: DashMap<String, AtomicU64>,
}

impl FallbackBackend {
    /// Create an empty fallback backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current total for a derived counter name, zero if never incremented.
    pub fn counter_value(&self, derived: &str) -> u64 {
        self.counters
            .get(derived)
            .map_or(0, |counter| counter.load(Ordering::Relaxed))
    }
}

impl MetricBackend for FallbackBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Fallback
    }

    fn record_counter(&self, name: &str, value: u64, tags: &[MetricTag]) {
        let key = derived_name(name, tags);
        self.counters
            .entry(key)
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(value, Ordering::Relaxed);
    }

    fn record_histogram_f64(&self, name: &str, value: f64, tags: &[MetricTag]) {
        info!(
            metric = %derived_name(name, tags),
            kind = "histogram",
            value,
            "metric sample"
        );
    }

    fn record_histogram_u64(&self, name: &str, value: u64, tags: &[MetricTag]) {
        info!(
            metric = %derived_name(name, tags),
            kind = "histogram",
            value,
            "metric sample"
        );
    }

    fn record_gauge(&self, name: &str, value: f64, tags: &[MetricTag]) {
        info!(
            metric = %derived_name(name, tags),
            kind = "gauge",
            value,
            "metric sample"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(pairs: &[(&str, &str)]) -> Vec<MetricTag> {
        pairs
            .iter()
            .map(|(k, v)| MetricTag::new(*k, *v).unwrap())
            .collect()
    }

    #[test]
    fn derived_name_untagged_is_bare() {
        assert_eq!(derived_name("requests", &[]), "requests");
    }

    #[test]
    fn derived_name_appends_tags_in_call_order() {
        let tags = tags(&[("zone", "eu"), ("code", "200")]);
        assert_eq!(derived_name("requests", &tags), "requests.zone=eu.code=200");
    }

    #[test]
    fn derived_name_renders_floats_invariantly() {
        let tags = vec![MetricTag::new("ratio", 1.25f64).unwrap()];
        assert_eq!(derived_name("load", &tags), "load.ratio=1.25");
    }

    #[test]
    fn counters_aggregate_per_tag_set() {
        let backend = FallbackBackend::new();
        let eu = tags(&[("zone", "eu")]);
        let us = tags(&[("zone", "us")]);

        backend.record_counter("hits", 1, &eu);
        backend.record_counter("hits", 2, &eu);
        backend.record_counter("hits", 5, &us);

        assert_eq!(backend.counter_value("hits.zone=eu"), 3);
        assert_eq!(backend.counter_value("hits.zone=us"), 5);
        assert_eq!(backend.counter_value("hits"), 0);
    }
}
