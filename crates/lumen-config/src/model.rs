//! The runtime configuration model
//!
//! A configuration is a tree of option sets keyed by scope. Resolution for a
//! fully-qualified operation path starts from the global defaults and
//! overlays, in order, the longest matching namespace prefix, the exact type
//! entry, and the exact method entry; each scope overrides only the options
//! it sets.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// How much of an operation's parameters to capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterCaptureMode {
    /// Capture nothing.
    #[default]
    None,
    /// Capture parameter names only.
    NamesOnly,
    /// Capture names and stringified values, depth 1.
    NamesAndValues,
    /// Names and values with recursion depth 2 and a 10-item collection cap.
    Full,
}

/// The options any scope may set. Unset options inherit from the parent
/// scope.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScopeOptions {
    /// Probabilistic sampling rate for matching operations.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sampling_rate: Option<f64>,
    /// Parameter capture behavior.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameter_capture: Option<ParameterCaptureMode>,
    /// Whether exceptions are recorded onto spans.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_exceptions: Option<bool>,
    /// Duration past which the operation is tagged as slow.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_threshold: Option<Duration>,
    /// Fixed tags stamped on matching spans.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<(String, String)>>,
}

impl ScopeOptions {
    /// Overlay `other` on top of `self`: options set in `other` win.
    pub fn overlay(&self, other: &ScopeOptions) -> ScopeOptions {
        ScopeOptions {
            sampling_rate: other.sampling_rate.or(self.sampling_rate),
            parameter_capture: other.parameter_capture.or(self.parameter_capture),
            record_exceptions: other.record_exceptions.or(self.record_exceptions),
            timeout_threshold: other.timeout_threshold.or(self.timeout_threshold),
            tags: other.tags.clone().or_else(|| self.tags.clone()),
        }
    }
}

/// Fully resolved options for one operation, with defaults applied.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedOptions {
    /// Sampling rate set by some scope; `None` means no scope overrides the
    /// sampler family's own default.
    pub sampling_rate: Option<f64>,
    /// Effective capture mode.
    pub parameter_capture: ParameterCaptureMode,
    /// Whether exceptions are recorded.
    pub record_exceptions: bool,
    /// Slow-operation threshold, if configured.
    pub timeout_threshold: Option<Duration>,
    /// Fixed tags for matching spans.
    pub tags: Vec<(String, String)>,
}

impl ResolvedOptions {
    fn from_options(options: &ScopeOptions) -> Self {
        Self {
            sampling_rate: options.sampling_rate,
            parameter_capture: options.parameter_capture.unwrap_or_default(),
            record_exceptions: options.record_exceptions.unwrap_or(true),
            timeout_threshold: options.timeout_threshold,
            tags: options.tags.clone().unwrap_or_default(),
        }
    }
}

/// The Global / Namespace / Type / Method override tree.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScopeTree {
    /// Options applying everywhere.
    pub global: ScopeOptions,
    /// Prefix-matched namespace entries; the longest matching prefix wins.
    pub namespaces: HashMap<String, ScopeOptions>,
    /// Exact type-name entries.
    pub types: HashMap<String, ScopeOptions>,
    /// Exact method-path entries.
    pub methods: HashMap<String, ScopeOptions>,
}

impl ScopeTree {
    /// Resolve the effective options for a fully-qualified operation path
    /// such as `app::orders::OrderService::place_order`.
    pub fn resolve(&self, operation_path: &str) -> ResolvedOptions {
        let mut merged = self.global.clone();

        if let Some(namespace) = self
            .namespaces
            .iter()
            .filter(|(prefix, _)| operation_path.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len())
        {
            merged = merged.overlay(namespace.1);
        }

        let type_name = operation_path
            .rsplit_once("::")
            .map(|(type_name, _)| type_name);
        if let Some(type_options) = type_name.and_then(|name| self.types.get(name)) {
            merged = merged.overlay(type_options);
        }

        if let Some(method_options) = self.methods.get(operation_path) {
            merged = merged.overlay(method_options);
        }

        ResolvedOptions::from_options(&merged)
    }
}

/// Per-source sampling entry from the configuration document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceSampling {
    /// Sampling rate for the source.
    pub rate: f64,
    /// Whether errors from this source are always sampled.
    #[serde(default)]
    pub always_sample_errors: bool,
}

/// Queue sizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueOptions {
    /// Ring capacity in items.
    pub capacity: usize,
    /// Maximum items per dispatch pass.
    pub batch_size: usize,
}

impl Default for QueueOptions {
    fn default() -> Self {
        Self {
            capacity: 2048,
            batch_size: 64,
        }
    }
}

/// Coarse feature switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureFlags {
    /// Wrap HTTP client/server boundaries in operation scopes.
    pub http_instrumentation: bool,
    /// Install the process-wide error hook.
    pub exception_tracking: bool,
    /// Allow parameter capture where scopes request it.
    pub parameter_capture: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            http_instrumentation: true,
            exception_tracking: true,
            parameter_capture: false,
        }
    }
}

/// Process-wide error-hook options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FirstChanceOptions {
    /// Whether the hook observes every raised error.
    pub enabled: bool,
    /// Log level the hook emits at.
    pub minimum_log_level: String,
    /// Token-bucket rate cap.
    pub max_events_per_second: u32,
    /// Type-name fragments to ignore.
    pub exclude_exception_types: Vec<String>,
}

impl Default for FirstChanceOptions {
    fn default() -> Self {
        Self {
            enabled: false,
            minimum_log_level: "warn".to_string(),
            max_events_per_second: 100,
            exclude_exception_types: vec!["Cancelled".to_string(), "Elapsed".to_string()],
        }
    }
}

/// Vendor-native propagation and env-var integration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VendorOptions {
    /// Emit and accept the vendor-native header pair.
    pub propagation_enabled: bool,
    /// Agent host, when exporting through a local agent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_host: Option<String>,
    /// Agent port.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_port: Option<u16>,
}

/// The complete runtime configuration snapshot.
///
/// Immutable once published; updates build a new snapshot and swap it in
/// atomically (see [`crate::ConfigStore`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Logical service name stamped on telemetry.
    pub service_name: String,
    /// Service version.
    pub service_version: String,
    /// Deployment environment (production, staging, ...).
    pub environment: String,
    /// Master switch; everything no-ops when false.
    pub enabled: bool,
    /// Rate used when no scope sets one.
    pub default_sampling_rate: f64,
    /// Queue sizing.
    pub queue: QueueOptions,
    /// Feature switches.
    pub features: FeatureFlags,
    /// Per-source sampling entries.
    pub sampling: HashMap<String, SourceSampling>,
    /// Error-hook options.
    pub first_chance: FirstChanceOptions,
    /// Hierarchical per-operation overrides.
    pub scopes: ScopeTree,
    /// Correlation header name on wire adapters.
    pub correlation_header: String,
    /// Vendor integration.
    pub vendor: VendorOptions,
    /// Operation names suppressed on server adapters.
    pub suppressed_operations: Vec<String>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "unknown-service".to_string(),
            service_version: String::new(),
            environment: String::new(),
            enabled: true,
            default_sampling_rate: 1.0,
            queue: QueueOptions::default(),
            features: FeatureFlags::default(),
            sampling: HashMap::new(),
            first_chance: FirstChanceOptions::default(),
            scopes: ScopeTree::default(),
            correlation_header: "x-correlation-id".to_string(),
            vendor: VendorOptions::default(),
            suppressed_operations: vec![
                "grpc.health.v1.Health/Check".to_string(),
                "grpc.reflection.v1alpha.ServerReflection/ServerReflectionInfo".to_string(),
            ],
        }
    }
}

impl TelemetryConfig {
    /// Resolve effective options for one operation path.
    pub fn resolve(&self, operation_path: &str) -> ResolvedOptions {
        self.scopes.resolve(operation_path)
    }

    /// Whether `operation` is on the suppression list.
    pub fn is_suppressed(&self, operation: &str) -> bool {
        self.suppressed_operations
            .iter()
            .any(|suppressed| suppressed == operation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree() -> ScopeTree {
        let mut tree = ScopeTree {
            global: ScopeOptions {
                sampling_rate: Some(0.5),
                record_exceptions: Some(true),
                ..Default::default()
            },
            ..Default::default()
        };
        tree.namespaces.insert(
            "app::orders".to_string(),
            ScopeOptions {
                sampling_rate: Some(0.8),
                ..Default::default()
            },
        );
        tree.namespaces.insert(
            "app".to_string(),
            ScopeOptions {
                sampling_rate: Some(0.1),
                parameter_capture: Some(ParameterCaptureMode::NamesOnly),
                ..Default::default()
            },
        );
        tree.types.insert(
            "app::orders::OrderService".to_string(),
            ScopeOptions {
                record_exceptions: Some(false),
                ..Default::default()
            },
        );
        tree.methods.insert(
            "app::orders::OrderService::place_order".to_string(),
            ScopeOptions {
                sampling_rate: Some(1.0),
                parameter_capture: Some(ParameterCaptureMode::Full),
                ..Default::default()
            },
        );
        tree
    }

    #[test]
    fn global_applies_when_nothing_matches() {
        let resolved = tree().resolve("other::Service::call");
        assert_eq!(resolved.sampling_rate, Some(0.5));
        assert!(resolved.record_exceptions);
        assert_eq!(resolved.parameter_capture, ParameterCaptureMode::None);
    }

    #[test]
    fn longest_namespace_prefix_wins() {
        let resolved = tree().resolve("app::orders::Repo::save");
        // app::orders (0.8) beats app (0.1); capture inherits from app.
        assert_eq!(resolved.sampling_rate, Some(0.8));
        assert_eq!(resolved.parameter_capture, ParameterCaptureMode::NamesOnly);
    }

    #[test]
    fn type_overlay_beats_namespace() {
        let resolved = tree().resolve("app::orders::OrderService::cancel");
        assert_eq!(resolved.sampling_rate, Some(0.8));
        assert!(!resolved.record_exceptions);
    }

    #[test]
    fn method_overlay_is_most_specific() {
        let resolved = tree().resolve("app::orders::OrderService::place_order");
        assert_eq!(resolved.sampling_rate, Some(1.0));
        assert_eq!(resolved.parameter_capture, ParameterCaptureMode::Full);
        // Inherited from the type entry.
        assert!(!resolved.record_exceptions);
    }

    #[test]
    fn no_scope_set_means_no_override() {
        let tree = ScopeTree::default();
        let resolved = tree.resolve("x::Y::z");
        assert_eq!(resolved.sampling_rate, None);
    }

    #[test]
    fn suppression_list_matches_exactly() {
        let config = TelemetryConfig::default();
        assert!(config.is_suppressed("grpc.health.v1.Health/Check"));
        assert!(!config.is_suppressed("app.Orders/Place"));
    }
}
