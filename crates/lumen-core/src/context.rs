//! Execution-local correlation and span context
//!
//! Two ambient slots travel with the current execution flow: the correlation
//! id and the active span context. Both live in a thread-local cell for
//! synchronous code; async code carries them across `.await` points with
//! [`ContextPropagate`], a future combinator that installs the captured
//! snapshot for the duration of every poll (the same mechanism
//! `tracing::Instrument` uses for spans).
//!
//! # Example
//!
//! ```rust
//! use lumen_core::context::{CorrelationContext, FutureExt};
//!
//! # async fn example() {
//! let guard = CorrelationContext::begin_scope("corr-A").unwrap();
//! let task = async {
//!     assert_eq!(CorrelationContext::current().as_str(), "corr-A");
//! }
//! .in_current_context();
//! drop(guard);
//! task.await; // still sees "corr-A": the snapshot was captured eagerly
//! # }
//! ```

use pin_project_lite::pin_project;
use std::cell::RefCell;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll};

use crate::error::TelemetryResult;
use crate::ids::CorrelationId;
use crate::trace::TraceContext;

thread_local! {
    static SLOTS: RefCell<ContextSlots> = RefCell::new(ContextSlots::default());
}

/// Process-wide switch for correlation auto-materialization. On by default.
static AUTO_MATERIALIZE: AtomicBool = AtomicBool::new(true);

#[derive(Debug, Clone, Default)]
struct ContextSlots {
    correlation: Option<CorrelationId>,
    active_span: Option<TraceContext>,
}

/// The ambient correlation-id slot.
///
/// Reads with [`CorrelationContext::current`] materialize an id on first
/// access (unless disabled); enrichers that must not side-effect use
/// [`CorrelationContext::raw`].
#[derive(Debug)]
pub struct CorrelationContext;

impl CorrelationContext {
    /// The current correlation id.
    ///
    /// If the slot is unset and auto-materialization is enabled (the
    /// default), a fresh 32-hex id is generated, stored for the rest of the
    /// current execution flow, and returned. With auto-materialization
    /// disabled an unset slot yields a fresh id that is *not* stored.
    pub fn current() -> CorrelationId {
        SLOTS.with(|slots| {
            let mut slots = slots.borrow_mut();
            if let Some(id) = &slots.correlation {
                return id.clone();
            }
            let id = CorrelationId::generate();
            if AUTO_MATERIALIZE.load(Ordering::Relaxed) {
                slots.correlation = Some(id.clone());
            }
            id
        })
    }

    /// Peek at the slot without materializing.
    pub fn raw() -> Option<CorrelationId> {
        SLOTS.with(|slots| slots.borrow().correlation.clone())
    }

    /// Install `id` as the ambient correlation id, returning a guard that
    /// restores the previous value (including "unset") on drop.
    ///
    /// # Errors
    ///
    /// Returns [`crate::TelemetryError::InvalidArgument`] for an empty or
    /// oversized id.
    pub fn begin_scope(id: impl Into<String>) -> TelemetryResult<CorrelationGuard> {
        let id = CorrelationId::new(id)?;
        Ok(Self::begin_scope_with(id))
    }

    /// Install an already-validated id. Infallible variant of
    /// [`CorrelationContext::begin_scope`].
    pub fn begin_scope_with(id: CorrelationId) -> CorrelationGuard {
        let previous = SLOTS.with(|slots| slots.borrow_mut().correlation.replace(id));
        CorrelationGuard {
            previous,
            restored: false,
        }
    }

    /// Enable or disable auto-materialization process-wide.
    pub fn set_auto_materialize(enabled: bool) {
        AUTO_MATERIALIZE.store(enabled, Ordering::Relaxed);
    }

    /// Clear the slot on the current thread. Intended for test isolation.
    pub fn clear() {
        SLOTS.with(|slots| slots.borrow_mut().correlation = None);
    }
}

/// Restores the previous correlation id on drop. Release is idempotent.
#[derive(Debug)]
#[must_use = "dropping the guard is what ends the scope"]
pub struct CorrelationGuard {
    previous: Option<CorrelationId>,
    restored: bool,
}

impl CorrelationGuard {
    /// Restore the previous value now instead of at drop.
    pub fn release(mut self) {
        self.restore();
    }

    fn restore(&mut self) {
        if self.restored {
            return;
        }
        self.restored = true;
        let previous = self.previous.take();
        SLOTS.with(|slots| slots.borrow_mut().correlation = previous);
    }
}

impl Drop for CorrelationGuard {
    fn drop(&mut self) {
        self.restore();
    }
}

/// The ambient active-span slot.
///
/// Operation scopes push their span context here so nested scopes pick it up
/// as their parent and wire adapters inject the innermost context.
#[derive(Debug)]
pub struct ActiveSpan;

impl ActiveSpan {
    /// The innermost active span context, if any.
    pub fn current() -> Option<TraceContext> {
        SLOTS.with(|slots| slots.borrow().active_span.clone())
    }

    /// Install `ctx` as the active span, returning a guard that restores
    /// the previous value on drop.
    pub fn set(ctx: TraceContext) -> ActiveSpanGuard {
        let previous = SLOTS.with(|slots| slots.borrow_mut().active_span.replace(ctx));
        ActiveSpanGuard {
            previous,
            restored: false,
        }
    }

    /// Clear the slot on the current thread. Intended for test isolation.
    pub fn clear() {
        SLOTS.with(|slots| slots.borrow_mut().active_span = None);
    }
}

/// Restores the previous active span on drop. Release is idempotent.
#[derive(Debug)]
#[must_use = "dropping the guard is what ends the scope"]
pub struct ActiveSpanGuard {
    previous: Option<TraceContext>,
    restored: bool,
}

impl ActiveSpanGuard {
    /// Restore the previous value now instead of at drop.
    pub fn release(mut self) {
        self.restore();
    }

    fn restore(&mut self) {
        if self.restored {
            return;
        }
        self.restored = true;
        let previous = self.previous.take();
        SLOTS.with(|slots| slots.borrow_mut().active_span = previous);
    }
}

impl Drop for ActiveSpanGuard {
    fn drop(&mut self) {
        self.restore();
    }
}

/// A captured copy of both ambient slots, attachable on another thread or
/// task.
#[derive(Debug, Clone, Default)]
pub struct ContextSnapshot {
    correlation: Option<CorrelationId>,
    active_span: Option<TraceContext>,
}

impl ContextSnapshot {
    /// Capture the current thread's slots without materializing anything.
    pub fn capture() -> Self {
        SLOTS.with(|slots| {
            let slots = slots.borrow();
            Self {
                correlation: slots.correlation.clone(),
                active_span: slots.active_span.clone(),
            }
        })
    }

    /// The captured correlation id.
    pub fn correlation(&self) -> Option<&CorrelationId> {
        self.correlation.as_ref()
    }

    /// The captured span context.
    pub fn active_span(&self) -> Option<&TraceContext> {
        self.active_span.as_ref()
    }

    fn install(&self) -> ContextSlots {
        SLOTS.with(|slots| {
            std::mem::replace(
                &mut *slots.borrow_mut(),
                ContextSlots {
                    correlation: self.correlation.clone(),
                    active_span: self.active_span.clone(),
                },
            )
        })
    }

    fn restore(saved: ContextSlots) {
        SLOTS.with(|slots| *slots.borrow_mut() = saved);
    }

    /// Run `f` with this snapshot installed, restoring the previous slots
    /// afterwards on all exit paths.
    pub fn scope<T>(&self, f: impl FnOnce() -> T) -> T {
        let saved = self.install();
        // Restore even if `f` unwinds.
        struct Restore(Option<ContextSlots>);
        impl Drop for Restore {
            fn drop(&mut self) {
                if let Some(saved) = self.0.take() {
                    ContextSnapshot::restore(saved);
                }
            }
        }
        let _restore = Restore(Some(saved));
        f()
    }
}

pin_project! {
    /// A future that polls with a captured [`ContextSnapshot`] installed.
    ///
    /// Created by [`FutureExt::in_current_context`]. Every poll installs the
    /// snapshot into the executing thread's slots and restores the previous
    /// values afterwards, so the wrapped future observes the captured
    /// context across any number of task or thread hops.
    #[derive(Debug)]
    pub struct ContextPropagate<F> {
        #[pin]
        inner: F,
        snapshot: ContextSnapshot,
    }
}

impl<F: Future> Future for ContextPropagate<F> {
    type Output = F::Output;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        let inner = this.inner;
        this.snapshot.scope(|| inner.poll(cx))
    }
}

/// Extension methods for carrying telemetry context across futures.
pub trait FutureExt: Future + Sized {
    /// Capture the current ambient context and replay it on every poll of
    /// `self`.
    fn in_current_context(self) -> ContextPropagate<Self> {
        self.with_context(ContextSnapshot::capture())
    }

    /// Replay an explicit snapshot on every poll of `self`.
    fn with_context(self, snapshot: ContextSnapshot) -> ContextPropagate<Self> {
        ContextPropagate {
            inner: self,
            snapshot,
        }
    }
}

impl<F: Future + Sized> FutureExt for F {}
