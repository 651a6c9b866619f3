//! Wire-boundary adapters
//!
//! Each adapter wraps one cross-boundary operation in an operation scope
//! with the right span kind and moves context through the carrier:
//! outbound adapters inject the new scope's trace context and the current
//! correlation id; inbound adapters extract the remote trace context as
//! the parent and bind the inbound correlation id for the scope's
//! duration. Malformed inbound headers are ignored and a fresh trace
//! begins. Operations on the configured suppression list produce no scope.
//!
//! # Example
//!
//! ```rust,no_run
//! use lumen::{Telemetry, adapters};
//! use lumen_core::HeaderMapCarrier;
//!
//! let runtime = Telemetry::global().expect("telemetry initialized");
//!
//! // Client side: open a scope and stamp the outbound request.
//! let mut headers = HeaderMapCarrier::new();
//! let scope = adapters::http::client_request(&runtime, "GET /users", &mut headers);
//! // ... send the request with `headers`, then drop `scope`.
//! # drop(scope);
//! ```

use lumen_core::{Carrier, SpanKind};
use lumen_propagation::{extract_correlation, inject_correlation};

use crate::runtime::TelemetryRuntime;
use crate::scope::OperationScope;

/// Open a scope for an outbound operation and stamp the carrier with its
/// trace context and the current correlation id.
pub fn begin_outbound(
    runtime: &TelemetryRuntime,
    operation_name: &str,
    kind: SpanKind,
    carrier: &mut dyn Carrier,
) -> OperationScope {
    let scope = runtime.begin(operation_name).kind(kind).start();
    runtime.propagator().inject(scope.context(), carrier);
    let header = runtime.config().correlation_header.clone();
    inject_correlation(&header, scope.correlation(), carrier);
    scope
}

/// Open a scope for an inbound operation: the extracted remote context
/// becomes the parent and the inbound correlation id is bound for the
/// scope's duration. Returns `None` for suppressed operations.
pub fn begin_inbound(
    runtime: &TelemetryRuntime,
    operation_name: &str,
    kind: SpanKind,
    carrier: &dyn Carrier,
) -> Option<OperationScope> {
    let config = runtime.config();
    if config.is_suppressed(operation_name) {
        return None;
    }

    let mut builder = runtime.begin(operation_name).kind(kind);
    if let Some(parent) = runtime.propagator().extract(carrier) {
        builder = builder.parent(parent);
    }
    if let Some(correlation) = extract_correlation(&config.correlation_header, carrier) {
        builder = builder.correlation(correlation);
    }
    Some(builder.start())
}

/// HTTP client and server instrumentation.
pub mod http {
    use super::*;

    /// Wrap an outbound HTTP request; inject into its header map.
    pub fn client_request(
        runtime: &TelemetryRuntime,
        operation_name: &str,
        headers: &mut dyn Carrier,
    ) -> OperationScope {
        begin_outbound(runtime, operation_name, SpanKind::Client, headers)
    }

    /// Wrap the handling of an inbound HTTP request; extract from its
    /// header map.
    pub fn server_request(
        runtime: &TelemetryRuntime,
        operation_name: &str,
        headers: &dyn Carrier,
    ) -> Option<OperationScope> {
        begin_inbound(runtime, operation_name, SpanKind::Server, headers)
    }
}

/// RPC client and server instrumentation over metadata maps.
pub mod rpc {
    use super::*;

    /// Wrap an outbound RPC; inject into its metadata.
    pub fn client_call(
        runtime: &TelemetryRuntime,
        method: &str,
        metadata: &mut dyn Carrier,
    ) -> OperationScope {
        begin_outbound(runtime, method, SpanKind::Client, metadata)
    }

    /// Wrap the handling of an inbound RPC; extract from its metadata.
    /// Health and reflection methods on the suppression list yield `None`.
    pub fn server_call(
        runtime: &TelemetryRuntime,
        method: &str,
        metadata: &dyn Carrier,
    ) -> Option<OperationScope> {
        begin_inbound(runtime, method, SpanKind::Server, metadata)
    }
}

/// SOAP client and server instrumentation over envelope headers.
pub mod soap {
    use super::*;
    use lumen_propagation::SoapHeaderCarrier;

    /// Wrap an outbound SOAP call; inject into the envelope's header
    /// collection.
    pub fn client_call(
        runtime: &TelemetryRuntime,
        action: &str,
        headers: &mut SoapHeaderCarrier,
    ) -> OperationScope {
        begin_outbound(runtime, action, SpanKind::Client, headers)
    }

    /// Wrap the handling of an inbound SOAP call; extract from the
    /// envelope's header collection.
    pub fn server_call(
        runtime: &TelemetryRuntime,
        action: &str,
        headers: &SoapHeaderCarrier,
    ) -> Option<OperationScope> {
        begin_inbound(runtime, action, SpanKind::Server, headers)
    }
}

/// Message-broker producer and consumer instrumentation.
pub mod messaging {
    use super::*;
    use lumen_propagation::MessageHeaderCarrier;

    /// Wrap a publish; inject into the message's byte-string headers.
    pub fn producer_send(
        runtime: &TelemetryRuntime,
        destination: &str,
        headers: &mut MessageHeaderCarrier,
    ) -> OperationScope {
        begin_outbound(runtime, destination, SpanKind::Producer, headers)
    }

    /// Wrap the handling of a consumed message; extract from its headers.
    pub fn consumer_receive(
        runtime: &TelemetryRuntime,
        source: &str,
        headers: &MessageHeaderCarrier,
    ) -> Option<OperationScope> {
        begin_inbound(runtime, source, SpanKind::Consumer, headers)
    }
}

/// Database command instrumentation. No carrier is involved; the scope
/// just times the command as a client span.
pub mod db {
    use super::*;

    /// Wrap one database command.
    pub fn command(runtime: &TelemetryRuntime, operation_name: &str) -> OperationScope {
        runtime
            .begin(operation_name)
            .kind(SpanKind::Client)
            .start()
    }
}
