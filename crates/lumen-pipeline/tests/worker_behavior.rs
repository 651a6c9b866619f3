//! End-to-end behavior of the bounded worker: saturation, circuit breaking,
//! and flush timeouts.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use lumen_core::{StructuredEvent, WorkItem};
use lumen_pipeline::{
    BoundedWorker, BufferSink, DispatchOutcome, Dispatcher, FanOutDispatcher, WorkerConfig,
    WorkerState,
};

fn item(name: &str) -> WorkItem {
    WorkItem::Event(StructuredEvent::now(name, vec![]))
}

/// Saturating a capacity-4 queue with six items keeps the newest four and
/// drops two, while the worker is not consuming.
#[test]
fn drop_oldest_under_saturation() {
    let worker = BoundedWorker::new(
        WorkerConfig {
            capacity: 4,
            ..Default::default()
        },
        Arc::new(FanOutDispatcher::new()),
    );

    let names = ["A", "B", "C", "D", "E", "F"];
    let mut accepted = 0;
    for name in names {
        if worker.try_enqueue(item(name)) {
            accepted += 1;
        }
    }

    // A and B were evicted to admit E and F.
    assert_eq!(accepted, 4);
    assert_eq!(worker.queue_depth(), 4);

    let stats = worker.stats();
    assert_eq!(stats.dropped, 2);
    assert_eq!(stats.enqueued, 6);
}

/// The suffix retained after saturation is exactly the newest items.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn drop_oldest_retains_newest_suffix() {
    let buffer = Arc::new(BufferSink::new());
    let worker = BoundedWorker::new(
        WorkerConfig {
            capacity: 4,
            ..Default::default()
        },
        Arc::new(FanOutDispatcher::with_sinks(vec![buffer.clone()])),
    );

    for name in ["A", "B", "C", "D", "E", "F"] {
        worker.try_enqueue(item(name));
    }

    // Start consuming only after the saturation happened.
    worker.start();
    let outcome = worker.flush(Duration::from_secs(5)).await.unwrap();
    assert!(outcome.success);

    let delivered: Vec<String> = buffer
        .items()
        .iter()
        .map(|i| i.operation_type().to_string())
        .collect();
    assert_eq!(delivered, vec!["C", "D", "E", "F"]);
    worker.shutdown().await;
}

#[derive(Debug)]
struct AlwaysPanicDispatcher;

impl Dispatcher for AlwaysPanicDispatcher {
    fn dispatch(&self, _items: Vec<WorkItem>) -> DispatchOutcome {
        panic!("injected loop failure")
    }
    fn flush(&self, _timeout: Duration) {}
}

/// A loop failure on every pass opens the circuit after the configured
/// number of restarts; afterwards the pipeline refuses writes.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn circuit_breaker_opens_after_exhausted_restarts() {
    let worker = BoundedWorker::spawn(
        WorkerConfig {
            capacity: 64,
            batch_size: 1,
            max_restart_attempts: 3,
            base_restart_delay: Duration::from_millis(10),
        },
        Arc::new(AlwaysPanicDispatcher),
    );

    for i in 0..16 {
        worker.try_enqueue(item(&format!("op-{i}")));
    }

    // Backoffs are 10 + 20 + 40 ms; give the worker ample real time.
    let mut waited = Duration::ZERO;
    while worker.state() != WorkerState::CircuitOpen && waited < Duration::from_secs(5) {
        tokio::time::sleep(Duration::from_millis(20)).await;
        waited += Duration::from_millis(20);
    }

    assert_eq!(worker.state(), WorkerState::CircuitOpen);
    assert!(worker.is_circuit_open());
    assert_eq!(worker.stats().restarts, 3);
    assert!(!worker.try_enqueue(item("rejected")));
    worker.shutdown().await;
}

#[derive(Debug)]
struct FlakyDispatcher {
    failures_left: AtomicU64,
    delivered: AtomicU64,
}

impl Dispatcher for FlakyDispatcher {
    fn dispatch(&self, items: Vec<WorkItem>) -> DispatchOutcome {
        if self.failures_left.load(Ordering::Relaxed) > 0 {
            self.failures_left.fetch_sub(1, Ordering::Relaxed);
            panic!("transient loop failure");
        }
        let count = items.len() as u64;
        self.delivered.fetch_add(count, Ordering::Relaxed);
        DispatchOutcome {
            processed: count,
            failed: 0,
        }
    }
    fn flush(&self, _timeout: Duration) {}
}

/// Transient loop failures below the restart limit recover: the failure
/// streak resets on the first successful pass and the circuit stays
/// closed.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn worker_recovers_from_transient_loop_failures() {
    let dispatcher = Arc::new(FlakyDispatcher {
        failures_left: AtomicU64::new(2),
        delivered: AtomicU64::new(0),
    });
    let worker = BoundedWorker::spawn(
        WorkerConfig {
            capacity: 64,
            batch_size: 1,
            max_restart_attempts: 3,
            base_restart_delay: Duration::from_millis(5),
        },
        Arc::clone(&dispatcher) as Arc<dyn Dispatcher>,
    );

    for i in 0..10 {
        worker.try_enqueue(item(&format!("op-{i}")));
    }

    let outcome = worker.flush(Duration::from_secs(5)).await.unwrap();
    assert!(outcome.success);
    assert!(!worker.is_circuit_open());

    let stats = worker.stats();
    assert_eq!(stats.restarts, 2);
    assert_eq!(stats.failed, 2);
    assert_eq!(stats.processed, 8);
    assert_eq!(dispatcher.delivered.load(Ordering::Relaxed), 8);
    worker.shutdown().await;
}

#[derive(Debug)]
struct SlowDispatcher {
    delivered: AtomicU64,
}

impl Dispatcher for SlowDispatcher {
    fn dispatch(&self, items: Vec<WorkItem>) -> DispatchOutcome {
        // 20ms of sink work per item.
        std::thread::sleep(Duration::from_millis(20) * items.len() as u32);
        let count = items.len() as u64;
        self.delivered.fetch_add(count, Ordering::Relaxed);
        DispatchOutcome {
            processed: count,
            failed: 0,
        }
    }
    fn flush(&self, _timeout: Duration) {}
}

/// Flushing 100 slow items with a 100ms budget times out with work left.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn flush_times_out_with_items_remaining() {
    let dispatcher = Arc::new(SlowDispatcher {
        delivered: AtomicU64::new(0),
    });
    let worker = BoundedWorker::spawn(
        WorkerConfig {
            capacity: 128,
            batch_size: 1,
            ..Default::default()
        },
        dispatcher,
    );

    for i in 0..100 {
        assert!(worker.try_enqueue(item(&format!("op-{i}"))));
    }

    let outcome = worker.flush(Duration::from_millis(100)).await.unwrap();
    assert!(!outcome.success);
    assert!(outcome.timed_out);
    assert!(outcome.items_remaining > 0);
    assert!(outcome.items_flushed <= 100);
    worker.shutdown().await;
}

/// Within one producer, delivery preserves enqueue order (minus evictions).
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn single_producer_order_is_preserved() {
    let buffer = Arc::new(BufferSink::new());
    let worker = BoundedWorker::spawn(
        WorkerConfig::default(),
        Arc::new(FanOutDispatcher::with_sinks(vec![buffer.clone()])),
    );

    for i in 0..200 {
        worker.try_enqueue(item(&format!("{i:04}")));
    }
    worker.flush(Duration::from_secs(10)).await.unwrap();

    let delivered: Vec<String> = buffer
        .items()
        .iter()
        .map(|i| i.operation_type().to_string())
        .collect();
    let mut sorted = delivered.clone();
    sorted.sort();
    assert_eq!(delivered, sorted);
    worker.shutdown().await;
}
