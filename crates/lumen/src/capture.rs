//! Bounded, explicit parameter capture
//!
//! There is no cheap runtime reflection in Rust, so capture is an explicit
//! contract: callers hand the scope builder named [`CapturedValue`]s.
//! Rendering is bounded - collections are cut at a fixed item cap, nesting
//! at a fixed depth - and parameter names matching the redaction list never
//! expose their value.

use std::fmt::Write as _;

/// Most parameters captured per operation.
pub const MAX_CAPTURED_PARAMETERS: usize = 10;

/// Most collection items rendered per value.
pub const MAX_COLLECTION_ITEMS: usize = 10;

/// Deepest nesting rendered in `Full` capture mode.
pub const MAX_CAPTURE_DEPTH: usize = 2;

/// A value offered for capture: a printable scalar, a collection of
/// values, or an opaque marker carrying only a type name.
#[derive(Debug, Clone, PartialEq)]
pub enum CapturedValue {
    /// Boolean scalar.
    Bool(bool),
    /// Integer scalar.
    Int(i64),
    /// Float scalar.
    Float(f64),
    /// String scalar.
    Text(String),
    /// A collection; rendering caps items and depth.
    List(Vec<CapturedValue>),
    /// A non-scalar value reduced to its type name.
    Opaque(&'static str),
}

impl CapturedValue {
    /// Capture a non-scalar value as its type name.
    pub fn opaque<T>() -> Self {
        Self::Opaque(std::any::type_name::<T>())
    }

    /// Render within the given remaining depth. Depth zero renders
    /// collections as an elision marker.
    fn render(&self, depth: usize, out: &mut String) {
        match self {
            Self::Bool(value) => {
                let _ = write!(out, "{value}");
            }
            Self::Int(value) => {
                let _ = write!(out, "{value}");
            }
            Self::Float(value) => {
                let _ = write!(out, "{value}");
            }
            Self::Text(value) => out.push_str(value),
            Self::Opaque(type_name) => {
                let _ = write!(out, "<{type_name}>");
            }
            Self::List(items) => {
                if depth == 0 {
                    let _ = write!(out, "[...{} items]", items.len());
                    return;
                }
                out.push('[');
                for (index, item) in items.iter().take(MAX_COLLECTION_ITEMS).enumerate() {
                    if index > 0 {
                        out.push_str(", ");
                    }
                    item.render(depth - 1, out);
                }
                if items.len() > MAX_COLLECTION_ITEMS {
                    let _ = write!(out, ", ...{} more", items.len() - MAX_COLLECTION_ITEMS);
                }
                out.push(']');
            }
        }
    }
}

impl From<bool> for CapturedValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}
impl From<i64> for CapturedValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}
impl From<i32> for CapturedValue {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}
impl From<f64> for CapturedValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}
impl From<&str> for CapturedValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}
impl From<String> for CapturedValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}
impl<V: Into<CapturedValue>> From<Vec<V>> for CapturedValue {
    fn from(values: Vec<V>) -> Self {
        Self::List(values.into_iter().map(Into::into).collect())
    }
}

/// Parameter names whose values are never captured.
#[derive(Debug, Clone)]
pub struct PiiDetector {
    fragments: Vec<String>,
}

impl Default for PiiDetector {
    fn default() -> Self {
        Self {
            fragments: [
                "password",
                "secret",
                "token",
                "authorization",
                "api_key",
                "apikey",
                "ssn",
                "credit_card",
            ]
            .iter()
            .map(|s| (*s).to_string())
            .collect(),
        }
    }
}

impl PiiDetector {
    /// Build a detector from explicit name fragments.
    pub fn new(fragments: Vec<String>) -> Self {
        Self { fragments }
    }

    /// Whether a parameter name looks sensitive.
    pub fn is_sensitive(&self, name: &str) -> bool {
        let lowered = name.to_ascii_lowercase();
        self.fragments.iter().any(|fragment| lowered.contains(fragment))
    }
}

/// One captured parameter ready to be stamped on a span.
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedParameter {
    /// Parameter name.
    pub name: String,
    /// Rendered value; `None` in names-only mode or when redacted.
    pub value: Option<String>,
}

/// Render a parameter list under a capture mode's bounds.
pub fn render_parameters(
    parameters: &[(String, CapturedValue)],
    mode: lumen_config::ParameterCaptureMode,
    detector: &PiiDetector,
) -> Vec<CapturedParameter> {
    use lumen_config::ParameterCaptureMode;

    let depth = match mode {
        ParameterCaptureMode::None => return Vec::new(),
        ParameterCaptureMode::NamesOnly => None,
        ParameterCaptureMode::NamesAndValues => Some(1),
        ParameterCaptureMode::Full => Some(MAX_CAPTURE_DEPTH),
    };

    parameters
        .iter()
        .take(MAX_CAPTURED_PARAMETERS)
        .map(|(name, value)| {
            let rendered = depth.map(|depth| {
                if detector.is_sensitive(name) {
                    "<redacted>".to_string()
                } else {
                    let mut out = String::new();
                    value.render(depth, &mut out);
                    out
                }
            });
            CapturedParameter {
                name: name.clone(),
                value: rendered,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_config::ParameterCaptureMode;

    fn params(pairs: Vec<(&str, CapturedValue)>) -> Vec<(String, CapturedValue)> {
        pairs.into_iter().map(|(n, v)| (n.to_string(), v)).collect()
    }

    #[test]
    fn none_mode_captures_nothing() {
        let rendered = render_parameters(
            &params(vec![("a", 1i64.into())]),
            ParameterCaptureMode::None,
            &PiiDetector::default(),
        );
        assert!(rendered.is_empty());
    }

    #[test]
    fn names_only_omits_values() {
        let rendered = render_parameters(
            &params(vec![("order_id", 42i64.into())]),
            ParameterCaptureMode::NamesOnly,
            &PiiDetector::default(),
        );
        assert_eq!(rendered[0].name, "order_id");
        assert!(rendered[0].value.is_none());
    }

    #[test]
    fn values_render_scalars() {
        let rendered = render_parameters(
            &params(vec![("qty", 3i64.into()), ("note", "rush".into())]),
            ParameterCaptureMode::NamesAndValues,
            &PiiDetector::default(),
        );
        assert_eq!(rendered[0].value.as_deref(), Some("3"));
        assert_eq!(rendered[1].value.as_deref(), Some("rush"));
    }

    #[test]
    fn sensitive_names_are_redacted() {
        let rendered = render_parameters(
            &params(vec![("user_password", "hunter2".into())]),
            ParameterCaptureMode::Full,
            &PiiDetector::default(),
        );
        assert_eq!(rendered[0].value.as_deref(), Some("<redacted>"));
    }

    #[test]
    fn parameter_count_is_capped() {
        let many: Vec<(String, CapturedValue)> = (0..25)
            .map(|i| (format!("p{i}"), CapturedValue::from(i as i64)))
            .collect();
        let rendered =
            render_parameters(&many, ParameterCaptureMode::NamesAndValues, &PiiDetector::default());
        assert_eq!(rendered.len(), MAX_CAPTURED_PARAMETERS);
    }

    #[test]
    fn collections_cap_items_and_depth() {
        let nested = CapturedValue::List(vec![
            CapturedValue::List(vec![CapturedValue::Int(1), CapturedValue::Int(2)]),
            CapturedValue::Int(3),
        ]);
        let rendered = render_parameters(
            &params(vec![("matrix", nested.clone())]),
            ParameterCaptureMode::Full,
            &PiiDetector::default(),
        );
        assert_eq!(rendered[0].value.as_deref(), Some("[[1, 2], 3]"));

        // Depth 1 elides the inner collection.
        let shallow = render_parameters(
            &params(vec![("matrix", nested)]),
            ParameterCaptureMode::NamesAndValues,
            &PiiDetector::default(),
        );
        assert_eq!(shallow[0].value.as_deref(), Some("[[...2 items], 3]"));

        let long: CapturedValue = (0..15).map(|i| i as i64).collect::<Vec<i64>>().into();
        let rendered = render_parameters(
            &params(vec![("ids", long)]),
            ParameterCaptureMode::Full,
            &PiiDetector::default(),
        );
        let text = rendered[0].value.clone().unwrap();
        assert!(text.ends_with("...5 more]"), "got {text}");
    }

    #[test]
    fn opaque_values_render_type_names() {
        struct Widget;
        let rendered = render_parameters(
            &params(vec![("widget", CapturedValue::opaque::<Widget>())]),
            ParameterCaptureMode::NamesAndValues,
            &PiiDetector::default(),
        );
        assert!(rendered[0].value.as_deref().unwrap().contains("Widget"));
    }
}
