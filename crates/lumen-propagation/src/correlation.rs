//! Correlation-id header propagation

use tracing::debug;

use lumen_core::{Carrier, CorrelationId};

/// Default header carrying the correlation id.
pub const DEFAULT_CORRELATION_HEADER: &str = "x-correlation-id";

/// Write the correlation id under `header`.
pub fn inject_correlation(header: &str, id: &CorrelationId, carrier: &mut dyn Carrier) {
    carrier.set(header, id.as_str().to_string());
}

/// Read a correlation id from `header`. Empty, missing, or oversized
/// values read as absent - the operation simply starts a fresh correlation.
pub fn extract_correlation(header: &str, carrier: &dyn Carrier) -> Option<CorrelationId> {
    let raw = carrier.get(header)?;
    match CorrelationId::new(raw) {
        Ok(id) => Some(id),
        Err(_) => {
            debug!(header, "ignoring invalid inbound correlation id");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_core::{HeaderMapCarrier, MAX_CORRELATION_ID_LEN};

    #[test]
    fn inject_then_extract_round_trips() {
        let id = CorrelationId::new("corr-42").unwrap();
        let mut carrier = HeaderMapCarrier::new();
        inject_correlation(DEFAULT_CORRELATION_HEADER, &id, &mut carrier);
        assert_eq!(
            extract_correlation(DEFAULT_CORRELATION_HEADER, &carrier),
            Some(id)
        );
    }

    #[test]
    fn custom_header_name_is_honored() {
        let id = CorrelationId::new("corr-7").unwrap();
        let mut carrier = HeaderMapCarrier::new();
        inject_correlation("x-request-id", &id, &mut carrier);
        assert!(extract_correlation(DEFAULT_CORRELATION_HEADER, &carrier).is_none());
        assert_eq!(extract_correlation("x-request-id", &carrier), Some(id));
    }

    #[test]
    fn oversized_inbound_value_is_ignored() {
        let mut carrier = HeaderMapCarrier::new();
        carrier.set(
            DEFAULT_CORRELATION_HEADER,
            "x".repeat(MAX_CORRELATION_ID_LEN + 1),
        );
        assert!(extract_correlation(DEFAULT_CORRELATION_HEADER, &carrier).is_none());
    }

    #[test]
    fn empty_inbound_value_is_ignored() {
        let mut carrier = HeaderMapCarrier::new();
        carrier.set(DEFAULT_CORRELATION_HEADER, String::new());
        assert!(extract_correlation(DEFAULT_CORRELATION_HEADER, &carrier).is_none());
    }
}
