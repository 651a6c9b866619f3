//! Broker message-header carrier
//!
//! Message brokers carry headers as byte strings. Trace context headers are
//! the UTF-8 encodings of the same values the HTTP headers would hold;
//! non-UTF-8 inbound values read as absent.

use std::collections::HashMap;

use lumen_core::Carrier;

/// Adapts a byte-string header map to the [`Carrier`] contract.
#[derive(Debug, Clone, Default)]
pub struct MessageHeaderCarrier {
    headers: HashMap<String, Vec<u8>>,
}

impl MessageHeaderCarrier {
    /// Create an empty carrier.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap existing broker headers (e.g. from a consumed message).
    pub fn from_headers(headers: HashMap<String, Vec<u8>>) -> Self {
        Self { headers }
    }

    /// The raw byte-string headers, for attaching to an outbound message.
    pub fn into_headers(self) -> HashMap<String, Vec<u8>> {
        self.headers
    }

    /// Raw access to one header's bytes.
    pub fn raw(&self, name: &str) -> Option<&[u8]> {
        self.headers.get(name).map(Vec::as_slice)
    }
}

impl Carrier for MessageHeaderCarrier {
    fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .get(name)
            .and_then(|bytes| std::str::from_utf8(bytes).ok())
    }

    fn set(&mut self, name: &str, value: String) {
        self.headers.insert(name.to_string(), value.into_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_are_stored_as_utf8_bytes() {
        let mut carrier = MessageHeaderCarrier::new();
        carrier.set("traceparent", "00-abc".to_string());
        assert_eq!(carrier.raw("traceparent"), Some(b"00-abc".as_slice()));
        assert_eq!(carrier.get("traceparent"), Some("00-abc"));
    }

    #[test]
    fn non_utf8_reads_as_absent() {
        let mut headers = HashMap::new();
        headers.insert("traceparent".to_string(), vec![0xff, 0x00]);
        let carrier = MessageHeaderCarrier::from_headers(headers);
        assert!(carrier.get("traceparent").is_none());
    }

    #[test]
    fn into_headers_round_trips() {
        let mut carrier = MessageHeaderCarrier::new();
        carrier.set("tracestate", "congo=t61rcWkgMzE".to_string());
        let headers = carrier.into_headers();
        assert_eq!(
            headers.get("tracestate").map(Vec::as_slice),
            Some(b"congo=t61rcWkgMzE".as_slice())
        );
    }
}
