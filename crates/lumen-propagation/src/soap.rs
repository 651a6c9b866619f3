//! SOAP header carrier
//!
//! Trace context travels in SOAP envelopes as header elements under a fixed
//! namespace, local names `traceparent` and `tracestate`, content being the
//! UTF-8 bytes of the same strings the HTTP headers would carry. SOAP
//! inspectors hand the header collection to this carrier; the propagation
//! logic stays identical to every other transport.

use lumen_core::Carrier;

/// Default namespace for the telemetry header elements.
pub const DEFAULT_SOAP_NAMESPACE: &str = "http://lumen.rs/telemetry";

/// One SOAP header element: qualified name plus UTF-8 content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoapHeader {
    /// Element namespace URI.
    pub namespace: String,
    /// Element local name.
    pub local_name: String,
    /// Element content, UTF-8 encoded.
    pub content: Vec<u8>,
}

/// Adapts a SOAP header collection to the [`Carrier`] contract.
#[derive(Debug, Clone)]
pub struct SoapHeaderCarrier {
    namespace: String,
    headers: Vec<SoapHeader>,
}

impl Default for SoapHeaderCarrier {
    fn default() -> Self {
        Self::new(DEFAULT_SOAP_NAMESPACE)
    }
}

impl SoapHeaderCarrier {
    /// Create an empty carrier over a namespace.
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            headers: Vec::new(),
        }
    }

    /// Wrap an existing header collection (e.g. parsed from an inbound
    /// envelope).
    pub fn from_headers(namespace: impl Into<String>, headers: Vec<SoapHeader>) -> Self {
        Self {
            namespace: namespace.into(),
            headers,
        }
    }

    /// The namespace this carrier reads and writes.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// The header elements, for serialization into an envelope.
    pub fn headers(&self) -> &[SoapHeader] {
        &self.headers
    }
}

impl Carrier for SoapHeaderCarrier {
    fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|header| header.namespace == self.namespace && header.local_name == name)
            .and_then(|header| std::str::from_utf8(&header.content).ok())
    }

    fn set(&mut self, name: &str, value: String) {
        let content = value.into_bytes();
        if let Some(existing) = self
            .headers
            .iter_mut()
            .find(|header| header.namespace == self.namespace && header.local_name == name)
        {
            existing.content = content;
        } else {
            self.headers.push(SoapHeader {
                namespace: self.namespace.clone(),
                local_name: name.to_string(),
                content,
            });
        }
    }
}
