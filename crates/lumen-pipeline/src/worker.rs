//! The bounded telemetry worker
//!
//! A single-reader, multi-writer bounded ring with drop-oldest backpressure.
//! Producers never block: when the ring is full the oldest pending item is
//! evicted to make room. One background task owns the consuming side,
//! delivering batches to the dispatcher under a panic guard; a loop-level
//! failure triggers exponential-backoff restarts until a circuit breaker
//! gives up and closes the pipeline to writes.

use crossbeam_queue::ArrayQueue;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::future::Future;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, error, warn};

use lumen_core::{TelemetryError, TelemetryResult, WorkItem};

use crate::sink::Dispatcher;
use crate::stats::{PipelineStats, RollingErrorRate, WorkerCounters};

/// Restart backoff never exceeds this.
pub const MAX_RESTART_BACKOFF: Duration = Duration::from_secs(30);

/// How long disposal waits for the worker task before giving up.
pub const DISPOSE_GRACE: Duration = Duration::from_secs(5);

/// Construction parameters for [`BoundedWorker`].
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Ring capacity in items.
    pub capacity: usize,
    /// Maximum items taken per dispatch pass.
    pub batch_size: usize,
    /// Loop restarts allowed before the circuit opens.
    pub max_restart_attempts: u32,
    /// Base delay for the exponential restart backoff.
    pub base_restart_delay: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            capacity: 2048,
            batch_size: 64,
            max_restart_attempts: 5,
            base_restart_delay: Duration::from_millis(100),
        }
    }
}

/// Observable worker lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WorkerState {
    /// Waiting for items.
    Idle = 0,
    /// Delivering a batch.
    Processing = 1,
    /// Backing off after a loop failure.
    Sleeping = 2,
    /// No more writes; consuming the remainder.
    Draining = 3,
    /// Terminal: drained after close.
    Closed = 4,
    /// Terminal: too many consecutive loop failures.
    CircuitOpen = 5,
}

impl WorkerState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Processing,
            2 => Self::Sleeping,
            3 => Self::Draining,
            4 => Self::Closed,
            5 => Self::CircuitOpen,
            _ => Self::Idle,
        }
    }
}

/// Result of a flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlushOutcome {
    /// The queue fully drained within the timeout.
    pub success: bool,
    /// Items that left the queue while the flush waited.
    pub items_flushed: u64,
    /// Items still queued when the flush returned.
    pub items_remaining: usize,
    /// The timeout elapsed or the cancellation signal fired.
    pub timed_out: bool,
}

struct WorkerShared {
    queue: ArrayQueue<WorkItem>,
    dispatcher: Arc<dyn Dispatcher>,
    config: WorkerConfig,
    /// Producer -> worker wakeup.
    wakeup: Notify,
    /// Worker -> flush-waiter signal, fired whenever the queue runs dry.
    drained: Notify,
    counters: WorkerCounters,
    error_window: RollingErrorRate,
    state: AtomicU8,
    /// No further writes accepted (flush or disposal).
    closed: AtomicBool,
    disposed: AtomicBool,
    circuit_open: AtomicBool,
    drop_warned: Mutex<HashSet<String>>,
}

impl std::fmt::Debug for WorkerShared {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerShared")
            .field("capacity", &self.config.capacity)
            .field("depth", &self.queue.len())
            .field("state", &WorkerState::from_u8(self.state.load(Ordering::Relaxed)))
            .finish()
    }
}

impl WorkerShared {
    fn set_state(&self, state: WorkerState) {
        self.state.store(state as u8, Ordering::Relaxed);
    }

    fn warn_drop_once(&self, operation_type: &str) {
        let mut warned = self.drop_warned.lock();
        if warned.insert(operation_type.to_string()) {
            warn!(
                operation_type,
                total_dropped = WorkerCounters::get(&self.counters.dropped),
                "telemetry queue full; dropping operations"
            );
        }
    }
}

/// The bounded, crash-resilient telemetry pipeline.
///
/// Construct with [`BoundedWorker::new`], then [`BoundedWorker::start`] the
/// background task on a tokio runtime (or use [`BoundedWorker::spawn`] to do
/// both). Producers call [`BoundedWorker::try_enqueue`] from any thread.
#[derive(Debug)]
pub struct BoundedWorker {
    shared: Arc<WorkerShared>,
    handle: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl BoundedWorker {
    /// Create a worker without starting its background task.
    ///
    /// A zero capacity or batch size is raised to one.
    pub fn new(config: WorkerConfig, dispatcher: Arc<dyn Dispatcher>) -> Self {
        let capacity = config.capacity.max(1);
        let config = WorkerConfig {
            capacity,
            batch_size: config.batch_size.max(1),
            ..config
        };
        Self {
            shared: Arc::new(WorkerShared {
                queue: ArrayQueue::new(capacity),
                dispatcher,
                config,
                wakeup: Notify::new(),
                drained: Notify::new(),
                counters: WorkerCounters::default(),
                error_window: RollingErrorRate::default(),
                state: AtomicU8::new(WorkerState::Idle as u8),
                closed: AtomicBool::new(false),
                disposed: AtomicBool::new(false),
                circuit_open: AtomicBool::new(false),
                drop_warned: Mutex::new(HashSet::new()),
            }),
            handle: Mutex::new(None),
        }
    }

    /// Create and immediately start a worker.
    pub fn spawn(config: WorkerConfig, dispatcher: Arc<dyn Dispatcher>) -> Self {
        let worker = Self::new(config, dispatcher);
        worker.start();
        worker
    }

    /// Start the background task. A second call is a no-op.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    pub fn start(&self) {
        let mut handle = self.handle.lock();
        if handle.is_some() {
            return;
        }
        let shared = Arc::clone(&self.shared);
        *handle = Some(tokio::spawn(run_loop(shared)));
    }

    /// Offer an item to the pipeline. Never blocks.
    ///
    /// Returns `false` when a drop occurred: the ring was full (the oldest
    /// pending item was evicted to admit this one), the worker is disposed
    /// or closed to writes, or the circuit breaker has opened.
    pub fn try_enqueue(&self, item: WorkItem) -> bool {
        let shared = &self.shared;

        if shared.disposed.load(Ordering::Acquire)
            || shared.closed.load(Ordering::Acquire)
            || shared.circuit_open.load(Ordering::Acquire)
        {
            WorkerCounters::add(&shared.counters.dropped, 1);
            shared.warn_drop_once(item.operation_type());
            return false;
        }

        match shared.queue.force_push(item) {
            None => {
                WorkerCounters::add(&shared.counters.enqueued, 1);
                shared.wakeup.notify_one();
                true
            }
            Some(displaced) => {
                // The new item is in; the oldest pending one paid for it.
                WorkerCounters::add(&shared.counters.enqueued, 1);
                WorkerCounters::add(&shared.counters.dropped, 1);
                shared.warn_drop_once(displaced.operation_type());
                shared.wakeup.notify_one();
                false
            }
        }
    }

    /// Close the queue to writes and wait until it drains or `timeout`
    /// elapses.
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError::ObjectDisposed`] when called after
    /// disposal.
    pub async fn flush(&self, timeout: Duration) -> TelemetryResult<FlushOutcome> {
        self.flush_with_cancel(timeout, std::future::pending::<()>())
            .await
    }

    /// [`BoundedWorker::flush`] with an external cancellation signal; when
    /// `cancel` completes first the flush reports `timed_out` immediately.
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError::ObjectDisposed`] when called after
    /// disposal.
    pub async fn flush_with_cancel(
        &self,
        timeout: Duration,
        cancel: impl Future<Output = ()>,
    ) -> TelemetryResult<FlushOutcome> {
        let shared = &self.shared;
        if shared.disposed.load(Ordering::Acquire) {
            return Err(TelemetryError::disposed("BoundedWorker"));
        }

        let consumed_before = self.consumed_total();
        shared.closed.store(true, Ordering::Release);
        if !shared.queue.is_empty()
            && shared.state.load(Ordering::Relaxed) != WorkerState::CircuitOpen as u8
        {
            shared.set_state(WorkerState::Draining);
        }
        shared.wakeup.notify_one();

        let drain_wait = async {
            loop {
                if self.drain_complete() {
                    return;
                }
                tokio::select! {
                    _ = shared.drained.notified() => {}
                    _ = tokio::time::sleep(Duration::from_millis(10)) => {}
                }
            }
        };

        let timed_out = tokio::select! {
            _ = drain_wait => false,
            _ = tokio::time::sleep(timeout) => true,
            _ = cancel => true,
        };

        let items_remaining = shared.queue.len();
        let items_flushed = self.consumed_total().saturating_sub(consumed_before);
        if !timed_out {
            self.shared.dispatcher.flush(timeout);
        }

        Ok(FlushOutcome {
            success: !timed_out && items_remaining == 0,
            items_flushed,
            items_remaining,
            timed_out,
        })
    }

    /// Stop the worker: cancel, join the task bounded by the 5-second
    /// grace period, and refuse all further work. Idempotent.
    pub async fn shutdown(&self) {
        let shared = &self.shared;
        if shared.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        shared.closed.store(true, Ordering::Release);
        shared.wakeup.notify_one();

        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            let abort = handle.abort_handle();
            if tokio::time::timeout(DISPOSE_GRACE, handle).await.is_err() {
                warn!(
                    grace_secs = DISPOSE_GRACE.as_secs(),
                    "telemetry worker did not stop within the disposal grace period; aborting"
                );
                abort.abort();
            }
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> WorkerState {
        WorkerState::from_u8(self.shared.state.load(Ordering::Relaxed))
    }

    /// Whether the circuit breaker has opened.
    pub fn is_circuit_open(&self) -> bool {
        self.shared.circuit_open.load(Ordering::Acquire)
    }

    /// Items currently queued.
    pub fn queue_depth(&self) -> usize {
        self.shared.queue.len()
    }

    /// A consistent snapshot of the pipeline counters.
    pub fn stats(&self) -> PipelineStats {
        let shared = &self.shared;
        let depth = shared.queue.len();
        let capacity = shared.config.capacity;
        PipelineStats {
            queue_depth: depth,
            queue_capacity: capacity,
            queue_utilization: depth as f64 / capacity as f64,
            enqueued: WorkerCounters::get(&shared.counters.enqueued),
            processed: WorkerCounters::get(&shared.counters.processed),
            dropped: WorkerCounters::get(&shared.counters.dropped),
            failed: WorkerCounters::get(&shared.counters.failed),
            restarts: WorkerCounters::get(&shared.counters.restarts),
            circuit_open: shared.circuit_open.load(Ordering::Acquire),
            current_sampling_rate: None,
            error_rate: shared.error_window.rate(),
        }
    }

    fn consumed_total(&self) -> u64 {
        WorkerCounters::get(&self.shared.counters.processed)
            + WorkerCounters::get(&self.shared.counters.failed)
    }

    fn drain_complete(&self) -> bool {
        let state = self.state();
        if state == WorkerState::CircuitOpen {
            // Nothing further will be processed; waiting cannot help.
            return true;
        }
        self.shared.queue.is_empty() && matches!(state, WorkerState::Closed | WorkerState::Idle)
    }
}

impl Drop for BoundedWorker {
    fn drop(&mut self) {
        // Best-effort: disposal without a runtime cannot join the task.
        self.shared.disposed.store(true, Ordering::Release);
        self.shared.closed.store(true, Ordering::Release);
        self.shared.wakeup.notify_one();
        if let Some(handle) = self.handle.lock().take() {
            handle.abort();
        }
    }
}

/// Exponential backoff for restart attempt `n` (1-based), capped at
/// [`MAX_RESTART_BACKOFF`].
fn restart_backoff(base: Duration, attempt: u32) -> Duration {
    let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
    base.checked_mul(factor)
        .map_or(MAX_RESTART_BACKOFF, |delay| delay.min(MAX_RESTART_BACKOFF))
}

async fn run_loop(shared: Arc<WorkerShared>) {
    let mut consecutive_failures: u32 = 0;

    loop {
        if shared.disposed.load(Ordering::Acquire) {
            shared.set_state(WorkerState::Closed);
            shared.drained.notify_waiters();
            break;
        }

        if shared.queue.is_empty() {
            shared.drained.notify_waiters();
            if shared.closed.load(Ordering::Acquire) {
                shared.set_state(WorkerState::Closed);
                break;
            }
            shared.set_state(WorkerState::Idle);
            shared.wakeup.notified().await;
            continue;
        }

        if shared.closed.load(Ordering::Acquire) {
            shared.set_state(WorkerState::Draining);
        } else {
            shared.set_state(WorkerState::Processing);
        }

        let mut batch = Vec::with_capacity(shared.config.batch_size);
        while batch.len() < shared.config.batch_size {
            match shared.queue.pop() {
                Some(item) => batch.push(item),
                None => break,
            }
        }
        let batch_len = batch.len() as u64;

        let dispatcher = Arc::clone(&shared.dispatcher);
        match catch_unwind(AssertUnwindSafe(move || dispatcher.dispatch(batch))) {
            Ok(outcome) => {
                consecutive_failures = 0;
                WorkerCounters::add(&shared.counters.processed, outcome.processed);
                WorkerCounters::add(&shared.counters.failed, outcome.failed);
                for _ in 0..outcome.processed {
                    shared.error_window.record(false);
                }
                for _ in 0..outcome.failed {
                    shared.error_window.record(true);
                }
                if shared.queue.is_empty() {
                    shared.drained.notify_waiters();
                }
            }
            Err(_) => {
                // Loop-level failure: the whole batch is gone.
                WorkerCounters::add(&shared.counters.failed, batch_len);
                for _ in 0..batch_len {
                    shared.error_window.record(true);
                }
                consecutive_failures += 1;

                if consecutive_failures > shared.config.max_restart_attempts {
                    shared.circuit_open.store(true, Ordering::Release);
                    shared.set_state(WorkerState::CircuitOpen);
                    shared.drained.notify_waiters();
                    error!(
                        consecutive_failures,
                        max_restart_attempts = shared.config.max_restart_attempts,
                        "telemetry worker circuit breaker opened; pipeline closed to writes"
                    );
                    break;
                }

                let delay = restart_backoff(shared.config.base_restart_delay, consecutive_failures);
                WorkerCounters::add(&shared.counters.restarts, 1);
                debug!(
                    consecutive_failures,
                    backoff_ms = delay.as_millis() as u64,
                    "telemetry worker loop failed; restarting after backoff"
                );
                shared.set_state(WorkerState::Sleeping);
                tokio::time::sleep(delay).await;
            }
        }
    }
}
