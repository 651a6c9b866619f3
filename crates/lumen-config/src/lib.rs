//! Hierarchical configuration with hot reload for Lumen
//!
//! Configuration is an immutable snapshot resolved from four scopes -
//! Global, Namespace (longest prefix), Type (exact), Method (exact) - with
//! child scopes overriding only the options they set. Snapshots publish
//! through a read-copy-update store: reads are lock-free, writers swap in a
//! new snapshot and notify hot-reload subscribers with `(old, new)`
//! atomically.
//!
//! The on-disk document format and the `DD_*` environment fallbacks live in
//! [`ConfigDocument`].
//!
//! # Example
//!
//! ```rust
//! use lumen_config::{ConfigDocument, ConfigStore};
//!
//! let config = ConfigDocument::from_json(r#"{"ServiceName": "checkout"}"#)
//!     .unwrap()
//!     .into_config()
//!     .unwrap();
//!
//! let store = ConfigStore::new(config);
//! assert_eq!(store.snapshot().service_name, "checkout");
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]

mod document;
mod model;
mod store;

pub use document::{
    ConfigDocument, FeaturesDocument, FirstChanceDocument, OverridesDocument, QueueDocument,
    SamplingDocument, ScopeOptionsDocument,
};
pub use model::{
    FeatureFlags, FirstChanceOptions, ParameterCaptureMode, QueueOptions, ResolvedOptions,
    ScopeOptions, ScopeTree, SourceSampling, TelemetryConfig, VendorOptions,
};
pub use store::{ConfigStore, ReloadSubscription};
