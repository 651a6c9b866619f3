//! Recorder behavior over the fallback backend, end to end

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use lumen_core::MetricTag;
use lumen_metrics::{
    BackendKind, FallbackBackend, GaugeDriver, MetricBackend, MetricRecorder, derived_name,
};

fn fallback_recorder() -> (MetricRecorder, Arc<FallbackBackend>) {
    let backend = Arc::new(FallbackBackend::new());
    let recorder = MetricRecorder::with_backend(backend.clone() as Arc<dyn MetricBackend>);
    (recorder, backend)
}

#[test]
fn fallback_counters_aggregate_by_derived_name() {
    let (recorder, backend) = fallback_recorder();
    assert_eq!(recorder.backend_kind(), BackendKind::Fallback);

    let requests = recorder.counter("app.requests").unwrap();
    let ok = vec![MetricTag::new("status", "ok").unwrap()];
    let err = vec![MetricTag::new("status", "error").unwrap()];

    for _ in 0..5 {
        requests.add(1, &ok).unwrap();
    }
    requests.add(2, &err).unwrap();
    requests.add(0, &ok).unwrap(); // zero increments are legal

    assert_eq!(backend.counter_value("app.requests.status=ok"), 5);
    assert_eq!(backend.counter_value("app.requests.status=error"), 2);
}

#[test]
fn derived_names_follow_the_documented_format() {
    let tags = vec![
        MetricTag::new("zone", "eu").unwrap(),
        MetricTag::new("ratio", 1.25f64).unwrap(),
    ];
    assert_eq!(
        derived_name("app.load", &tags),
        "app.load.zone=eu.ratio=1.25"
    );
    assert_eq!(derived_name("app.load", &[]), "app.load");
}

#[tokio::test(start_paused = true)]
async fn gauges_tick_until_handle_drops() {
    let (recorder, _backend) = fallback_recorder();
    let observations = Arc::new(AtomicUsize::new(0));
    let observations_in_cb = Arc::clone(&observations);

    let handle = recorder
        .observable_gauge("app.inflight", &[], move || {
            observations_in_cb.fetch_add(1, Ordering::Relaxed);
            7.0
        })
        .unwrap();

    let driver = GaugeDriver::spawn(
        recorder.gauge_registry(),
        recorder.backend(),
        Duration::from_secs(1),
    );

    tokio::time::sleep(Duration::from_millis(2500)).await;
    let while_registered = observations.load(Ordering::Relaxed);
    assert!(while_registered >= 2);

    handle.close();
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(
        observations.load(Ordering::Relaxed),
        while_registered,
        "no observations after the handle was dropped"
    );
    driver.stop();
}

#[test]
fn cardinality_cap_does_not_block_emission() {
    let (recorder, backend) = fallback_recorder();
    let counter = recorder.counter("bursty").unwrap();

    for i in 0..2000 {
        let tags = vec![MetricTag::new("id", i as i64).unwrap()];
        counter.add(1, &tags).unwrap();
    }

    // Well past the tracking cap, emissions still landed.
    assert_eq!(backend.counter_value("bursty.id=1999"), 1);
}
