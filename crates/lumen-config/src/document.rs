//! The configuration document and environment fallbacks
//!
//! The on-disk document is JSON with PascalCase keys; every field is
//! optional and unset fields keep their defaults. Datadog-style environment
//! variables (`DD_SERVICE`, `DD_ENV`, `DD_VERSION`, `DD_AGENT_HOST`,
//! `DD_TRACE_AGENT_PORT`) fill in identity and agent fields that the
//! explicit document left unset - explicit configuration always wins.

use serde::Deserialize;
use std::collections::HashMap;

use lumen_core::{TelemetryError, TelemetryResult};

use crate::model::{
    FeatureFlags, FirstChanceOptions, ParameterCaptureMode, QueueOptions, SourceSampling,
    TelemetryConfig,
};

/// Root of the JSON configuration document.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct ConfigDocument {
    /// `ServiceName`
    pub service_name: Option<String>,
    /// `ServiceVersion`
    pub service_version: Option<String>,
    /// `Environment`
    pub environment: Option<String>,
    /// `Enabled`
    pub enabled: Option<bool>,
    /// `DefaultSamplingRate`
    pub default_sampling_rate: Option<f64>,
    /// `Queue`
    pub queue: Option<QueueDocument>,
    /// `Features`
    pub features: Option<FeaturesDocument>,
    /// `Sampling`
    pub sampling: Option<HashMap<String, SamplingDocument>>,
    /// `FirstChanceExceptions`
    pub first_chance_exceptions: Option<FirstChanceDocument>,
    /// `CorrelationHeader`
    pub correlation_header: Option<String>,
    /// `Overrides`
    pub overrides: Option<OverridesDocument>,
}

/// `Overrides` section: the Global / Namespace / Type / Method tree.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct OverridesDocument {
    /// `Global`
    pub global: Option<ScopeOptionsDocument>,
    /// `Namespaces`: prefix -> options.
    pub namespaces: Option<HashMap<String, ScopeOptionsDocument>>,
    /// `Types`: exact type name -> options.
    pub types: Option<HashMap<String, ScopeOptionsDocument>>,
    /// `Methods`: exact method path -> options.
    pub methods: Option<HashMap<String, ScopeOptionsDocument>>,
}

/// One scope's option subset.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct ScopeOptionsDocument {
    /// `SamplingRate`
    pub sampling_rate: Option<f64>,
    /// `ParameterCapture`: one of `None`, `NamesOnly`, `NamesAndValues`,
    /// `Full`.
    pub parameter_capture: Option<String>,
    /// `RecordExceptions`
    pub record_exceptions: Option<bool>,
    /// `TimeoutThresholdMs`
    pub timeout_threshold_ms: Option<u64>,
    /// `Tags`
    pub tags: Option<HashMap<String, String>>,
}

impl ScopeOptionsDocument {
    fn into_options(self, context: &str) -> TelemetryResult<crate::model::ScopeOptions> {
        if let Some(rate) = self.sampling_rate {
            validate_rate(&format!("{context}.SamplingRate"), rate)?;
        }
        let parameter_capture = match self.parameter_capture.as_deref() {
            None => None,
            Some("None") => Some(ParameterCaptureMode::None),
            Some("NamesOnly") => Some(ParameterCaptureMode::NamesOnly),
            Some("NamesAndValues") => Some(ParameterCaptureMode::NamesAndValues),
            Some("Full") => Some(ParameterCaptureMode::Full),
            Some(other) => {
                return Err(TelemetryError::InvalidConfiguration(format!(
                    "{context}.ParameterCapture has unknown mode `{other}`"
                )));
            }
        };
        Ok(crate::model::ScopeOptions {
            sampling_rate: self.sampling_rate,
            parameter_capture,
            record_exceptions: self.record_exceptions,
            timeout_threshold: self
                .timeout_threshold_ms
                .map(std::time::Duration::from_millis),
            tags: self.tags.map(|tags| tags.into_iter().collect()),
        })
    }
}

/// `Queue` section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct QueueDocument {
    /// `Capacity`
    pub capacity: Option<usize>,
    /// `BatchSize`
    pub batch_size: Option<usize>,
}

/// `Features` section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct FeaturesDocument {
    /// `EnableHttpInstrumentation`
    pub enable_http_instrumentation: Option<bool>,
    /// `EnableExceptionTracking`
    pub enable_exception_tracking: Option<bool>,
    /// `EnableParameterCapture`
    pub enable_parameter_capture: Option<bool>,
}

/// One `Sampling` entry.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct SamplingDocument {
    /// `Rate`
    pub rate: f64,
    /// `AlwaysSampleErrors`
    #[serde(default)]
    pub always_sample_errors: bool,
}

/// `FirstChanceExceptions` section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct FirstChanceDocument {
    /// `Enabled`
    pub enabled: Option<bool>,
    /// `MinimumLogLevel`
    pub minimum_log_level: Option<String>,
    /// `MaxEventsPerSecond`
    pub max_events_per_second: Option<u32>,
    /// `ExcludeExceptionTypes`
    pub exclude_exception_types: Option<Vec<String>>,
}

impl ConfigDocument {
    /// Parse a JSON document.
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError::InvalidConfiguration`] for malformed JSON
    /// or unknown keys.
    pub fn from_json(json: &str) -> TelemetryResult<Self> {
        serde_json::from_str(json)
            .map_err(|error| TelemetryError::InvalidConfiguration(error.to_string()))
    }

    /// Read and parse a JSON document from disk.
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError::InvalidConfiguration`] when the file
    /// cannot be read or parsed.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> TelemetryResult<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|error| {
            TelemetryError::InvalidConfiguration(format!(
                "cannot read {}: {error}",
                path.display()
            ))
        })?;
        Self::from_json(&contents)
    }

    /// Build the runtime configuration: document values over defaults,
    /// environment fallbacks for fields the document left unset.
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError::InvalidConfiguration`] for out-of-range
    /// sampling rates.
    pub fn into_config(self) -> TelemetryResult<TelemetryConfig> {
        let mut config = TelemetryConfig::default();

        if let Some(rate) = self.default_sampling_rate {
            validate_rate("DefaultSamplingRate", rate)?;
            config.default_sampling_rate = rate;
        }
        if let Some(name) = self.service_name {
            config.service_name = name;
        }
        if let Some(version) = self.service_version {
            config.service_version = version;
        }
        if let Some(environment) = self.environment {
            config.environment = environment;
        }
        if let Some(enabled) = self.enabled {
            config.enabled = enabled;
        }
        if let Some(queue) = self.queue {
            let defaults = QueueOptions::default();
            config.queue = QueueOptions {
                capacity: queue.capacity.unwrap_or(defaults.capacity),
                batch_size: queue.batch_size.unwrap_or(defaults.batch_size),
            };
        }
        if let Some(features) = self.features {
            let defaults = FeatureFlags::default();
            config.features = FeatureFlags {
                http_instrumentation: features
                    .enable_http_instrumentation
                    .unwrap_or(defaults.http_instrumentation),
                exception_tracking: features
                    .enable_exception_tracking
                    .unwrap_or(defaults.exception_tracking),
                parameter_capture: features
                    .enable_parameter_capture
                    .unwrap_or(defaults.parameter_capture),
            };
        }
        if let Some(sampling) = self.sampling {
            for (source, entry) in sampling {
                validate_rate(&format!("Sampling.{source}.Rate"), entry.rate)?;
                config.sampling.insert(
                    source,
                    SourceSampling {
                        rate: entry.rate,
                        always_sample_errors: entry.always_sample_errors,
                    },
                );
            }
        }
        if let Some(first_chance) = self.first_chance_exceptions {
            let defaults = FirstChanceOptions::default();
            config.first_chance = FirstChanceOptions {
                enabled: first_chance.enabled.unwrap_or(defaults.enabled),
                minimum_log_level: first_chance
                    .minimum_log_level
                    .unwrap_or(defaults.minimum_log_level),
                max_events_per_second: first_chance
                    .max_events_per_second
                    .unwrap_or(defaults.max_events_per_second),
                exclude_exception_types: first_chance
                    .exclude_exception_types
                    .unwrap_or(defaults.exclude_exception_types),
            };
        }
        if let Some(header) = self.correlation_header {
            config.correlation_header = header;
        }
        if let Some(overrides) = self.overrides {
            if let Some(global) = overrides.global {
                config.scopes.global = global.into_options("Overrides.Global")?;
            }
            for (prefix, options) in overrides.namespaces.unwrap_or_default() {
                let context = format!("Overrides.Namespaces.{prefix}");
                config
                    .scopes
                    .namespaces
                    .insert(prefix, options.into_options(&context)?);
            }
            for (type_name, options) in overrides.types.unwrap_or_default() {
                let context = format!("Overrides.Types.{type_name}");
                config
                    .scopes
                    .types
                    .insert(type_name, options.into_options(&context)?);
            }
            for (method, options) in overrides.methods.unwrap_or_default() {
                let context = format!("Overrides.Methods.{method}");
                config
                    .scopes
                    .methods
                    .insert(method, options.into_options(&context)?);
            }
        }

        apply_env_fallbacks(&mut config);
        Ok(config)
    }
}

fn validate_rate(field: &str, rate: f64) -> TelemetryResult<()> {
    if !(0.0..=1.0).contains(&rate) {
        return Err(TelemetryError::InvalidConfiguration(format!(
            "{field} must be within [0, 1], got {rate}"
        )));
    }
    Ok(())
}

/// Fill identity and agent fields from `DD_*` variables where the document
/// left them at defaults.
fn apply_env_fallbacks(config: &mut TelemetryConfig) {
    let defaults = TelemetryConfig::default();

    if config.service_name == defaults.service_name
        && let Ok(service) = std::env::var("DD_SERVICE")
        && !service.is_empty()
    {
        config.service_name = service;
    }
    if config.environment.is_empty()
        && let Ok(environment) = std::env::var("DD_ENV")
        && !environment.is_empty()
    {
        config.environment = environment;
    }
    if config.service_version.is_empty()
        && let Ok(version) = std::env::var("DD_VERSION")
        && !version.is_empty()
    {
        config.service_version = version;
    }
    if config.vendor.agent_host.is_none()
        && let Ok(host) = std::env::var("DD_AGENT_HOST")
        && !host.is_empty()
    {
        config.vendor.agent_host = Some(host);
    }
    if config.vendor.agent_port.is_none()
        && let Ok(port) = std::env::var("DD_TRACE_AGENT_PORT")
        && let Ok(port) = port.parse()
    {
        config.vendor.agent_port = Some(port);
    }
}
