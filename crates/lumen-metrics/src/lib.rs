//! Runtime-adaptive metric recorder for Lumen
//!
//! One public contract - counters, histograms, observable gauges - over two
//! possible hosts:
//!
//! - **Native**: the process-wide [`metrics`] facade, when a recorder is
//!   (or may later be) installed by the host application
//! - **Fallback**: self-contained aggregation with structured-event
//!   emission, when the facade is unusable
//!
//! The recorder also guards against the classic operational hazards of
//! embedded metrics: tag cardinality is tracked and capped per instrument,
//! and observable-gauge callbacks (user code) run inside panic guards.
//!
//! # Example
//!
//! ```rust
//! use lumen_core::MetricTag;
//! use lumen_metrics::MetricRecorder;
//!
//! let recorder = MetricRecorder::new();
//! let latency = recorder.histogram_f64("app.request.duration").unwrap();
//! latency
//!     .record(12.5, &[MetricTag::new("route", "/users").unwrap()])
//!     .unwrap();
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]

mod backend;
mod cardinality;
mod fallback;
mod gauge;
mod native;
mod recorder;

pub use backend::{BackendKind, MetricBackend, select_backend};
pub use cardinality::{CardinalityTracker, DEFAULT_TRACK_CAP, DEFAULT_WARN_THRESHOLD};
pub use fallback::{FallbackBackend, derived_name};
pub use native::NativeBackend;
pub use gauge::{FALLBACK_OBSERVE_INTERVAL, GaugeDriver, GaugeHandle, GaugeRegistry};
pub use recorder::{Counter, HistogramF64, HistogramTimer, HistogramU64, MetricRecorder};
