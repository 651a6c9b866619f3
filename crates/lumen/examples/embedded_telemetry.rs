//! Minimal end-to-end usage: initialize telemetry, trace a unit of work
//! across an async boundary, and shut down cleanly.
//!
//! Run with: `cargo run --example embedded_telemetry -p lumen`

use std::sync::Arc;
use std::time::Duration;

use lumen::prelude::*;
use lumen_pipeline::BufferSink;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let sink = Arc::new(BufferSink::new());
    let mut config = TelemetryConfig::default();
    config.service_name = "example-service".to_string();

    let guard = Telemetry::builder()
        .config(config)
        .sink(Arc::clone(&sink) as Arc<dyn lumen_pipeline::TelemetrySink>)
        .init()?;
    let runtime = guard.runtime().clone();

    // A synchronous scope: tags, an event, automatic end at drop.
    {
        let mut scope = runtime
            .begin("startup::warm_caches")
            .tag("cache.count", 3i64)
            .start();
        scope.add_event("warmed", vec![]);
    }

    // An async scope: the context follows the work across awaits and the
    // Err outcome is recorded on the span.
    let outcome: Result<(), std::io::Error> = runtime
        .begin("jobs::refresh_feed")
        .run_checked(async {
            tokio::time::sleep(Duration::from_millis(25)).await;
            Err(std::io::Error::other("upstream unavailable"))
        })
        .await;
    println!("job outcome: {outcome:?}");

    // Outbound propagation: stamp a request with trace + correlation.
    let mut headers = HeaderMapCarrier::new();
    let scope = lumen::adapters::http::client_request(&runtime, "GET /feed", &mut headers);
    println!("traceparent: {}", headers.get("traceparent").unwrap());
    drop(scope);

    runtime.flush(Duration::from_secs(2)).await?;
    println!(
        "captured {} records; pipeline stats: {:?}",
        sink.len(),
        runtime.stats()
    );

    guard.shutdown().await;
    Ok(())
}
