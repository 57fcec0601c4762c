//! Reactive Runtime
//!
//! The runtime owns the batch controller: a re-entrant depth counter and a
//! deduplicated set of pending wake callbacks.
//!
//! # How It Works
//!
//! 1. Writing a signal hands each wake callback of each subscriber thread to
//!    [`Runtime::dispatch`].
//!
//! 2. Outside a batch, dispatch invokes the callback immediately.
//!
//! 3. Inside a batch, dispatch queues the callback instead. A callback queued
//!    twice runs once.
//!
//! 4. When the outermost [`batch`] returns, the depth drops back to zero and
//!    the queue is drained once, in the order callbacks were first queued.
//!
//! A flush runs in two phases. First every queued callback runs; active
//! wires reached this way are only marked invalid and their eager recompute
//! is held back. Then each held-back wire recomputes once, so it sees every
//! write made in the batch.
//!
//! Callbacks that a flush triggers are not folded into that flush: with no
//! batch open they run through the immediate path.
//!
//! # Thread Safety
//!
//! Reactive values are `!Send`, so the runtime state lives in thread-local
//! storage. Each OS thread has its own independent batch controller.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use indexmap::IndexMap;
use tracing::{debug, trace};

use super::subscriber::{SourceId, Subscriber, SubscriberId};

thread_local! {
    static BATCH_DEPTH: Cell<usize> = const { Cell::new(0) };
    static PENDING: RefCell<IndexMap<SubscriberId, Subscriber>> = RefCell::new(IndexMap::new());
    static DEFERRING: Cell<bool> = const { Cell::new(false) };
    static DEFERRED: RefCell<IndexMap<SourceId, Rc<dyn Fn()>>> = RefCell::new(IndexMap::new());
}

/// The per-thread reactive runtime.
///
/// All state is thread-local; this type only groups the associated
/// functions.
pub struct Runtime;

impl Runtime {
    /// Route a wake callback through the batch controller.
    ///
    /// Queued (deduplicated by [`SubscriberId`]) while a batch is open,
    /// invoked immediately otherwise.
    pub fn dispatch(subscriber: Subscriber) {
        if Self::in_batch() {
            trace!(subscriber = ?subscriber.id(), "queueing wake");
            PENDING.with(|pending| {
                pending
                    .borrow_mut()
                    .entry(subscriber.id())
                    .or_insert(subscriber);
            });
        } else {
            subscriber.notify();
        }
    }

    /// Drain the pending set, invoking every queued callback once.
    ///
    /// The set is snapshotted and cleared before any callback runs, so
    /// callbacks queued by the flush itself wait for the next one. Eager
    /// recomputes requested while the callbacks run are held back and
    /// performed once each afterwards, in the order first requested.
    pub fn flush() {
        let queued = PENDING.with(|pending| std::mem::take(&mut *pending.borrow_mut()));
        if queued.is_empty() {
            return;
        }

        debug!(count = queued.len(), "flushing batched wakes");
        {
            let _deferring = Deferring::enter();
            for subscriber in queued.into_values() {
                subscriber.notify();
            }
        }

        let deferred = DEFERRED.with(|deferred| std::mem::take(&mut *deferred.borrow_mut()));
        if !deferred.is_empty() {
            debug!(count = deferred.len(), "recomputing active wires");
        }
        for recompute in deferred.into_values() {
            recompute();
        }
    }

    /// Hold back the eager recompute of `source` while a flush is delivering
    /// wakes.
    ///
    /// Returns `false` when no flush is delivering wakes; the caller should
    /// recompute immediately. `recompute` is only built on the first request
    /// for `source` in a flush.
    pub(crate) fn defer_recompute(
        source: SourceId,
        recompute: impl FnOnce() -> Rc<dyn Fn()>,
    ) -> bool {
        if !DEFERRING.with(Cell::get) {
            return false;
        }
        trace!(wire = %source, "deferring recompute");
        DEFERRED.with(|deferred| {
            deferred
                .borrow_mut()
                .entry(source)
                .or_insert_with(recompute);
        });
        true
    }

    /// Current batch nesting depth.
    pub fn batch_depth() -> usize {
        BATCH_DEPTH.with(Cell::get)
    }

    /// Check whether a batch is open.
    pub fn in_batch() -> bool {
        Self::batch_depth() > 0
    }

    /// Number of callbacks waiting for the outermost batch to close.
    pub fn pending_count() -> usize {
        PENDING.with(|pending| pending.borrow().len())
    }
}

/// Open batch scope. Restores the depth on every exit path.
struct BatchScope {
    exited: bool,
}

impl BatchScope {
    fn enter() -> Self {
        BATCH_DEPTH.with(|depth| depth.set(depth.get() + 1));
        Self { exited: false }
    }

    /// Close the scope, returning whether it was the outermost one.
    fn exit(mut self) -> bool {
        self.exited = true;
        Self::decrement() == 0
    }

    fn decrement() -> usize {
        BATCH_DEPTH.with(|depth| {
            let next = depth.get().saturating_sub(1);
            depth.set(next);
            next
        })
    }
}

impl Drop for BatchScope {
    fn drop(&mut self) {
        if !self.exited {
            // Unwinding out of the batch body: queued wakes stay pending.
            Self::decrement();
        }
    }
}

/// Marks the wake-delivery phase of a flush.
struct Deferring {
    previous: bool,
}

impl Deferring {
    fn enter() -> Self {
        Self {
            previous: DEFERRING.with(|deferring| deferring.replace(true)),
        }
    }
}

impl Drop for Deferring {
    fn drop(&mut self) {
        DEFERRING.with(|deferring| deferring.set(self.previous));
    }
}

/// Run `f` with signal propagation deferred until the outermost batch closes.
///
/// Batches nest. Wake callbacks dispatched while any batch is open are
/// deduplicated and run once, after `f` returns and the depth is back to
/// zero, so they observe every write made inside the batch.
///
/// If `f` panics the depth is still restored and the queued callbacks remain
/// pending until the next outermost batch closes or [`Runtime::flush`] is
/// called.
///
/// # Example
///
/// ```rust
/// use wires_core::{batch, effect, Signal};
///
/// let a = Signal::new(1);
/// let b = Signal::new(2);
/// let (a2, b2) = (a.clone(), b.clone());
/// let sum = effect(move |t| println!("{}", a2.get_tracked(t) + b2.get_tracked(t)));
///
/// batch(|| {
///     a.set(10);
///     b.set(20);
/// }); // prints "30" once
/// # sum.stop();
/// ```
pub fn batch<R>(f: impl FnOnce() -> R) -> R {
    let scope = BatchScope::enter();
    let result = f();
    if scope.exit() {
        Runtime::flush();
    }
    result
}

/// Check whether a batch is open on this thread.
pub fn in_batch() -> bool {
    Runtime::in_batch()
}
