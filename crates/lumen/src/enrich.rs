//! Log enrichment with ambient telemetry ids
//!
//! [`CorrelationFormat`] wraps any `tracing-subscriber` event formatter and
//! prefixes each formatted event with `correlation_id`, `trace_id`, and
//! `span_id` taken from the ambient slots. Reads use the raw peek - an
//! event formatted outside any correlation scope must not materialize one
//! as a side effect.
//!
//! # Example
//!
//! ```rust,no_run
//! use lumen::enrich::CorrelationFormat;
//! use tracing_subscriber::fmt;
//!
//! tracing_subscriber::fmt()
//!     .event_format(CorrelationFormat::new(fmt::format()))
//!     .init();
//! ```

use std::fmt;

use tracing::{Event, Subscriber};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;

use lumen_core::{ActiveSpan, CorrelationContext};

/// Event formatter that stamps ambient telemetry ids before delegating.
#[derive(Debug, Clone)]
pub struct CorrelationFormat<F> {
    inner: F,
}

impl<F> CorrelationFormat<F> {
    /// Wrap an inner event formatter.
    pub fn new(inner: F) -> Self {
        Self { inner }
    }
}

impl<S, N, F> FormatEvent<S, N> for CorrelationFormat<F>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
    F: FormatEvent<S, N>,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        if let Some(correlation) = CorrelationContext::raw() {
            write!(writer, "correlation_id={correlation} ")?;
        }
        if let Some(span) = ActiveSpan::current() {
            write!(writer, "trace_id={} span_id={} ", span.trace_id, span.span_id)?;
        }
        self.inner.format_event(ctx, writer, event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // The formatter must not materialize a correlation id: formatting an
    // event with an empty slot leaves the slot empty.
    #[test]
    fn enrichment_reads_are_side_effect_free() {
        CorrelationContext::clear();
        ActiveSpan::clear();

        // Equivalent to what format_event does on an unset slot.
        assert!(CorrelationContext::raw().is_none());
        assert!(ActiveSpan::current().is_none());
        assert!(CorrelationContext::raw().is_none());
    }

    #[test]
    fn formatter_prefixes_ambient_ids() {
        use tracing_subscriber::fmt;
        use tracing_subscriber::prelude::*;

        let _guard = CorrelationContext::begin_scope("corr-enrich").unwrap();

        let buffer = std::sync::Arc::new(parking_lot::Mutex::new(Vec::<u8>::new()));
        let writer_buffer = std::sync::Arc::clone(&buffer);

        let subscriber = tracing_subscriber::registry().with(
            fmt::layer()
                .event_format(CorrelationFormat::new(fmt::format().without_time()))
                .with_writer(move || WriteProxy(std::sync::Arc::clone(&writer_buffer))),
        );

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!("enriched event");
        });

        let output = String::from_utf8(buffer.lock().clone()).unwrap();
        assert!(output.contains("correlation_id=corr-enrich"), "got: {output}");
    }

    struct WriteProxy(std::sync::Arc<parking_lot::Mutex<Vec<u8>>>);

    impl std::io::Write for WriteProxy {
        fn write(&mut self, data: &[u8]) -> std::io::Result<usize> {
            self.0.lock().extend_from_slice(data);
            Ok(data.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }
}
