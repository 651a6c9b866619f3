//! Tag cardinality tracking
//!
//! Unbounded tag cardinality is a classic failure mode in metric systems:
//! every distinct tag-value combination becomes a new time series at the
//! backend. The tracker watches unique combinations per instrument, warns
//! once per instrument past a soft threshold, and stops tracking entirely at
//! a hard cap so its own memory stays bounded. Emission is never affected -
//! past the cap samples still flow, they just stop being counted here.

use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::warn;

use lumen_core::MetricTag;

/// Soft threshold: one warning per instrument when crossed.
pub const DEFAULT_WARN_THRESHOLD: usize = 100;

/// Hard cap: tracking stops per instrument at this many combinations.
pub const DEFAULT_TRACK_CAP: usize = 1000;

#[derive(Debug, Default)]
struct InstrumentCardinality {
    // A short lock keeps the check-then-insert atomic, so the cap is exact
    // even across concurrent writers.
    combinations: Mutex<HashSet<String>>,
    warned: AtomicBool,
}

/// Per-instrument tracker of unique tag-value combinations.
#[derive(Debug)]
pub struct CardinalityTracker {
    instruments: DashMap<String, InstrumentCardinality>,
    warn_threshold: usize,
    track_cap: usize,
}

impl Default for CardinalityTracker {
    fn default() -> Self {
        Self::new(DEFAULT_WARN_THRESHOLD, DEFAULT_TRACK_CAP)
    }
}

impl CardinalityTracker {
    /// Create a tracker with explicit thresholds.
    pub fn new(warn_threshold: usize, track_cap: usize) -> Self {
        Self {
            instruments: DashMap::new(),
            warn_threshold,
            track_cap,
        }
    }

    /// Record one emission's tag set for `instrument`.
    ///
    /// Returns the number of combinations tracked so far for the
    /// instrument (stable once the cap is reached).
    pub fn observe(&self, instrument: &str, tags: &[MetricTag]) -> usize {
        let entry = self
            .instruments
            .entry(instrument.to_string())
            .or_default();

        let count = {
            let mut combinations = entry.combinations.lock();
            if combinations.len() >= self.track_cap {
                // Tracking only - the measurement itself was already emitted.
                return combinations.len();
            }
            combinations.insert(combination_key(tags));
            combinations.len()
        };

        if count > self.warn_threshold
            && entry
                .warned
                .compare_exchange(false, true, Ordering::Relaxed, Ordering::Relaxed)
                .is_ok()
        {
            warn!(
                instrument,
                unique_tag_combinations = count,
                threshold = self.warn_threshold,
                "metric tag cardinality exceeded warning threshold"
            );
        }

        count
    }

    /// Combinations tracked for `instrument`, zero if never seen.
    pub fn tracked(&self, instrument: &str) -> usize {
        self.instruments
            .get(instrument)
            .map_or(0, |entry| entry.combinations.lock().len())
    }

    /// Whether the warning already fired for `instrument`.
    pub fn has_warned(&self, instrument: &str) -> bool {
        self.instruments
            .get(instrument)
            .is_some_and(|entry| entry.warned.load(Ordering::Relaxed))
    }
}

/// A combination key is the tag set sorted by key, so call-order differences
/// do not inflate cardinality.
fn combination_key(tags: &[MetricTag]) -> String {
    let mut pairs: Vec<String> = tags
        .iter()
        .map(|tag| format!("{}={}", tag.key, tag.value.to_display_string()))
        .collect();
    pairs.sort_unstable();
    pairs.join(",")
}
