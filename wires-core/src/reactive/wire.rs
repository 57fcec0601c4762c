//! Wire Implementation
//!
//! A Wire is a derived computation over signals and other wires. It owns one
//! [`Thread`], which it passes to its evaluation function; reads made
//! through that thread become the wire's dependencies.
//!
//! # Passive and Active Wires
//!
//! A new wire is passive. It is lazy: nothing runs until the first read, and
//! a read only re-evaluates when an upstream change has marked the wire
//! invalid. Between invalidations any number of reads return the cache.
//!
//! [`Wire::run`] makes the wire active (an effect). An active wire evaluates
//! immediately and from then on recomputes eagerly whenever it is woken.
//! [`Wire::stop`] reverts it to passive.
//!
//! # Invalidation
//!
//! The wake callback every wire installs into its own thread:
//!
//! 1. marks the wire invalid,
//! 2. recomputes it if it is active,
//! 3. signals every thread that read this wire, cascading upward.
//!
//! Passive wires therefore only propagate staleness; active wires do the work
//! immediately and still cascade so their own readers see the change. While a
//! batch flush is delivering wakes the recompute waits until every queued
//! wake has run. An active wire woken during its own evaluation evaluates
//! again once the current pass returns.
//!
//! # Lifetime
//!
//! An active wire keeps itself alive so that `effect(..)` continues to run
//! after its handle is dropped. `stop` releases that root.

use std::cell::{Cell, RefCell};
use std::fmt::Debug;
use std::rc::{Rc, Weak};

use tracing::{debug, trace, warn};

use super::runtime::Runtime;
use super::subscriber::{SourceId, SubscriberId, ThreadId};
use super::thread::{Source, Thread, ThreadSet};
use crate::error::{ReactiveError, Result};

/// Evaluations an active wire may run for one wake before it is left invalid.
const MAX_PASSES: usize = 100;

struct WireInner<R> {
    id: SourceId,
    compute: Box<dyn Fn(&Thread) -> R>,
    thread: Thread,
    value: RefCell<Option<R>>,
    invalid: Cell<bool>,
    running: Cell<bool>,
    evaluating: Cell<bool>,
    eval_count: Cell<usize>,
    wake: Cell<Option<SubscriberId>>,
    dependents: ThreadSet,
    weak_self: Weak<WireInner<R>>,
    keep_alive: RefCell<Option<Rc<WireInner<R>>>>,
}

impl<R> Source for WireInner<R> {
    fn source_id(&self) -> SourceId {
        self.id
    }

    fn unsubscribe(&self, thread: ThreadId) {
        self.dependents.remove(thread);
    }
}

impl<R: 'static> WireInner<R> {
    /// Install the wake callback into the wire's own thread.
    fn install_wake(&self) {
        if self.wake.get().is_some() {
            return;
        }
        let weak = self.weak_self.clone();
        let id = self.thread.on_wake(move || {
            if let Some(inner) = weak.upgrade() {
                inner.invalidate();
            }
        });
        self.wake.set(Some(id));
    }

    /// The wake protocol: invalidate, recompute if active, cascade.
    fn invalidate(&self) {
        self.invalid.set(true);

        if self.running.get() {
            if self.evaluating.get() {
                trace!(wire = %self.id, "wire woken during its own evaluation; rerun pending");
            } else if !Runtime::defer_recompute(self.id, || self.deferred_recompute()) {
                self.recompute();
            }
        }

        for thread in self.dependents.live() {
            thread.signal();
        }
    }

    /// Re-evaluate an active wire until no wake arrives during evaluation.
    fn recompute(&self) {
        let mut passes = 0;
        while self.running.get() && self.invalid.get() && !self.evaluating.get() {
            if passes == MAX_PASSES {
                warn!(wire = %self.id, passes, "wire keeps waking itself; left invalid");
                return;
            }
            passes += 1;
            if let Err(err) = self.evaluate() {
                warn!(wire = %self.id, %err, "eager recompute skipped");
                return;
            }
        }
    }

    fn deferred_recompute(&self) -> Rc<dyn Fn()> {
        let weak = self.weak_self.clone();
        Rc::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.recompute();
            }
        })
    }

    /// Run the evaluation function and cache its result.
    fn evaluate(&self) -> Result<()> {
        if self.evaluating.get() {
            return Err(ReactiveError::Cycle { wire: self.id });
        }

        trace!(wire = %self.id, running = self.running.get(), "evaluating wire");
        let guard = Evaluation::begin(self);
        let value = self.thread.scope(|thread| (self.compute)(thread));
        let previous = self.value.replace(Some(value));
        self.eval_count.set(self.eval_count.get() + 1);
        guard.complete();

        // Drop the old value only after the wire is consistent again.
        drop(previous);
        Ok(())
    }

    /// Bring the cache up to date for a pull-based read.
    fn refresh(&self) -> Result<()> {
        if self.evaluating.get() {
            return Err(ReactiveError::Cycle { wire: self.id });
        }

        let stale = self.invalid.get() && !self.running.get();
        if stale || self.value.borrow().is_none() {
            self.evaluate()?;
        }
        Ok(())
    }
}

impl<R: Clone + 'static> WireInner<R> {
    fn cached(&self) -> R {
        self.value
            .borrow()
            .clone()
            .expect("evaluated wire should have a value")
    }
}

/// Marks a wire as evaluating; re-marks it invalid if evaluation unwinds.
struct Evaluation<'a> {
    invalid: &'a Cell<bool>,
    evaluating: &'a Cell<bool>,
    completed: bool,
}

impl<'a> Evaluation<'a> {
    fn begin<R>(wire: &'a WireInner<R>) -> Self {
        wire.evaluating.set(true);
        // Cleared up front so that a wake arriving mid-evaluation sticks.
        wire.invalid.set(false);
        Self {
            invalid: &wire.invalid,
            evaluating: &wire.evaluating,
            completed: false,
        }
    }

    fn complete(mut self) {
        self.completed = true;
    }
}

impl Drop for Evaluation<'_> {
    fn drop(&mut self) {
        self.evaluating.set(false);
        if !self.completed {
            self.invalid.set(true);
        }
    }
}

/// A derived computation, lazy until [`Wire::run`] makes it an effect.
///
/// # Type Parameters
///
/// - `R`: The type of the computed value. Reads return a clone of the cache.
///
/// # Example
///
/// ```rust
/// use wires_core::{Signal, Wire};
///
/// let count = Signal::new(2);
/// let source = count.clone();
/// let doubled = Wire::new(move |t| source.get_tracked(t) * 2);
///
/// assert_eq!(doubled.get(), 4);
/// count.set(5);
/// assert_eq!(doubled.get(), 10);
/// ```
pub struct Wire<R> {
    inner: Rc<WireInner<R>>,
}

impl<R> Wire<R>
where
    R: Clone + 'static,
{
    /// Create a passive wire. `compute` is not called until the first read
    /// or [`Wire::run`].
    ///
    /// `compute` receives the wire's own thread; pass it to every
    /// `get_tracked` call inside, or those reads will not be tracked.
    pub fn new<F>(compute: F) -> Self
    where
        F: Fn(&Thread) -> R + 'static,
    {
        let inner = Rc::new_cyclic(|weak_self| WireInner {
            id: SourceId::new(),
            compute: Box::new(compute),
            thread: Thread::new(),
            value: RefCell::new(None),
            invalid: Cell::new(true),
            running: Cell::new(false),
            evaluating: Cell::new(false),
            eval_count: Cell::new(0),
            wake: Cell::new(None),
            dependents: ThreadSet::new(),
            weak_self: weak_self.clone(),
            keep_alive: RefCell::new(None),
        });
        inner.install_wake();
        Self { inner }
    }

    /// Get the wire's unique ID.
    pub fn id(&self) -> SourceId {
        self.inner.id
    }

    /// The thread this wire evaluates under.
    pub fn thread(&self) -> &Thread {
        &self.inner.thread
    }

    /// Get the current value, evaluating first if the wire is passive and
    /// invalid.
    ///
    /// # Panics
    ///
    /// Panics on a dependency cycle; see [`Wire::try_get`].
    pub fn get(&self) -> R {
        self.try_get().unwrap_or_else(|err| panic!("{err}"))
    }

    /// Get the current value, or an error if this wire is already evaluating.
    pub fn try_get(&self) -> Result<R> {
        self.inner.refresh()?;
        Ok(self.inner.cached())
    }

    /// Get the current value and register `thread` as a dependent, so that
    /// invalidating this wire wakes it.
    ///
    /// # Panics
    ///
    /// Panics on a dependency cycle; see [`Wire::try_get_tracked`].
    pub fn get_tracked(&self, thread: &Thread) -> R {
        self.try_get_tracked(thread)
            .unwrap_or_else(|err| panic!("{err}"))
    }

    /// Tracked read that reports a dependency cycle instead of panicking.
    pub fn try_get_tracked(&self, thread: &Thread) -> Result<R> {
        self.inner.refresh()?;
        self.inner.dependents.insert(thread);
        let source: Rc<dyn Source> = self.inner.clone();
        thread.track(&source);
        Ok(self.inner.cached())
    }

    /// Activate the wire: evaluate now and recompute eagerly on every
    /// upstream change until [`Wire::stop`].
    ///
    /// # Panics
    ///
    /// Panics on a dependency cycle; see [`Wire::try_run`].
    pub fn run(&self) {
        self.try_run().unwrap_or_else(|err| panic!("{err}"))
    }

    /// Activate the wire, or report that it is already evaluating.
    pub fn try_run(&self) -> Result<()> {
        let inner = &self.inner;
        if inner.evaluating.get() {
            return Err(ReactiveError::Cycle { wire: inner.id });
        }

        debug!(wire = %inner.id, "running wire");
        inner.running.set(true);
        inner.install_wake();
        *inner.keep_alive.borrow_mut() = Some(Rc::clone(inner));
        inner.invalidate();
        Ok(())
    }

    /// Deactivate the wire, reverting it to a passive derivation.
    ///
    /// The wake callback is removed from the wire's thread, so upstream
    /// changes no longer reach it. Reads still re-evaluate if the wire was
    /// left invalid.
    pub fn stop(&self) {
        let inner = &self.inner;
        debug!(wire = %inner.id, "stopping wire");
        inner.running.set(false);
        if let Some(wake) = inner.wake.take() {
            inner.thread.remove_wake(wake);
        }
        let root = inner.keep_alive.borrow_mut().take();
        drop(root);
    }

    /// Whether the cache is stale.
    pub fn is_invalid(&self) -> bool {
        self.inner.invalid.get()
    }

    /// Whether the wire is active (between `run` and `stop`).
    pub fn is_running(&self) -> bool {
        self.inner.running.get()
    }

    /// Check if the wire has a cached value.
    pub fn has_value(&self) -> bool {
        self.inner.value.borrow().is_some()
    }

    /// Number of completed evaluations.
    pub fn eval_count(&self) -> usize {
        self.inner.eval_count.get()
    }

    /// Get the number of live dependent threads.
    pub fn dependent_count(&self) -> usize {
        self.inner.dependents.len()
    }
}

impl<R> Clone for Wire<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<R> Debug for Wire<R>
where
    R: Clone + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Wire")
            .field("id", &self.id())
            .field("invalid", &self.is_invalid())
            .field("running", &self.is_running())
            .field("has_value", &self.has_value())
            .field("dependent_count", &self.dependent_count())
            .finish()
    }
}

/// Create a passive wire. Same as [`Wire::new`].
pub fn computed<R, F>(compute: F) -> Wire<R>
where
    R: Clone + 'static,
    F: Fn(&Thread) -> R + 'static,
{
    Wire::new(compute)
}

/// Alias of [`computed`].
pub fn memo<R, F>(compute: F) -> Wire<R>
where
    R: Clone + 'static,
    F: Fn(&Thread) -> R + 'static,
{
    Wire::new(compute)
}

/// Create a wire and run it immediately.
///
/// The effect stays active after the returned handle is dropped; keep the
/// handle to [`Wire::stop`] it.
pub fn effect<R, F>(compute: F) -> Wire<R>
where
    R: Clone + 'static,
    F: Fn(&Thread) -> R + 'static,
{
    let wire = Wire::new(compute);
    wire.run();
    wire
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::Signal;
    use std::panic::{catch_unwind, AssertUnwindSafe};

    fn counter() -> (Rc<Cell<i32>>, Rc<Cell<i32>>) {
        let count = Rc::new(Cell::new(0));
        (count.clone(), count)
    }

    #[test]
    fn wire_computes_on_first_access() {
        let (call_count, call_count_clone) = counter();

        let wire = Wire::new(move |_| {
            call_count_clone.set(call_count_clone.get() + 1);
            42
        });

        // Not computed yet
        assert!(!wire.has_value());
        assert!(wire.is_invalid());
        assert_eq!(call_count.get(), 0);

        // First access triggers computation
        assert_eq!(wire.get(), 42);
        assert_eq!(call_count.get(), 1);
        assert!(wire.has_value());
        assert!(!wire.is_invalid());
    }

    #[test]
    fn wire_caches_value_when_valid() {
        let (call_count, call_count_clone) = counter();

        let wire = Wire::new(move |_| {
            call_count_clone.set(call_count_clone.get() + 1);
            42
        });

        assert_eq!(wire.get(), 42);
        assert_eq!(wire.get(), 42);
        assert_eq!(wire.get(), 42);
        assert_eq!(call_count.get(), 1);
        assert_eq!(wire.eval_count(), 1);
    }

    #[test]
    fn wire_invalidated_by_signal_recomputes_on_read() {
        let signal = Signal::new(1);
        let source = signal.clone();
        let wire = Wire::new(move |t| source.get_tracked(t) + 1);

        assert_eq!(wire.get(), 2);

        signal.set(10);
        assert!(wire.is_invalid());
        assert_eq!(wire.eval_count(), 1);

        assert_eq!(wire.get(), 11);
        assert_eq!(wire.eval_count(), 2);
    }

    #[test]
    fn run_evaluates_immediately_and_eagerly() {
        let signal = Signal::new(1);
        let source = signal.clone();
        let (call_count, call_count_clone) = counter();

        let wire = Wire::new(move |t| {
            call_count_clone.set(call_count_clone.get() + 1);
            source.get_tracked(t)
        });
        wire.run();
        assert!(wire.is_running());
        assert_eq!(call_count.get(), 1);

        signal.set(2);
        assert_eq!(call_count.get(), 2);
        assert!(!wire.is_invalid());

        // Reads of an active wire use the eagerly computed cache
        assert_eq!(wire.get(), 2);
        assert_eq!(call_count.get(), 2);
    }

    #[test]
    fn stop_reverts_to_passive() {
        let signal = Signal::new(1);
        let source = signal.clone();
        let (call_count, call_count_clone) = counter();

        let wire = effect(move |t| {
            call_count_clone.set(call_count_clone.get() + 1);
            source.get_tracked(t)
        });
        assert_eq!(call_count.get(), 1);

        wire.stop();
        assert!(!wire.is_running());
        assert_eq!(wire.thread().wake_count(), 0);

        signal.set(5);
        assert_eq!(call_count.get(), 1);

        // The wake never arrived, so the cache is still considered valid
        assert_eq!(wire.get(), 1);
    }

    #[test]
    fn run_after_stop_listens_again() {
        let signal = Signal::new(1);
        let source = signal.clone();
        let wire = effect(move |t| source.get_tracked(t));

        wire.stop();
        wire.run();
        assert_eq!(wire.thread().wake_count(), 1);

        signal.set(3);
        assert_eq!(wire.get(), 3);
        assert_eq!(wire.eval_count(), 3);
    }

    #[test]
    fn dropped_effect_handle_keeps_running() {
        let signal = Signal::new(0);
        let source = signal.clone();
        let seen = Rc::new(Cell::new(0));
        let seen_clone = seen.clone();

        drop(effect(move |t| seen_clone.set(source.get_tracked(t))));

        signal.set(9);
        assert_eq!(seen.get(), 9);
    }

    #[test]
    fn stopped_wire_is_reclaimed() {
        let wire = effect(|_| 1);
        let weak = Rc::downgrade(&wire.inner);

        wire.stop();
        drop(wire);
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn self_read_is_a_cycle() {
        let slot: Rc<RefCell<Option<Wire<i32>>>> = Rc::new(RefCell::new(None));
        let slot_clone = slot.clone();

        let wire = Wire::new(move |_| {
            let me = slot_clone.borrow().clone().expect("wire stored");
            match me.try_get() {
                Err(ReactiveError::Cycle { .. }) => -1,
                Ok(value) => value,
            }
        });
        *slot.borrow_mut() = Some(wire.clone());

        assert_eq!(wire.get(), -1);
        slot.borrow_mut().take();
    }

    #[test]
    fn panicking_evaluation_leaves_wire_invalid() {
        let fail = Rc::new(Cell::new(true));
        let fail_clone = fail.clone();

        let wire = Wire::new(move |_| {
            if fail_clone.get() {
                panic!("evaluation failed");
            }
            7
        });

        let result = catch_unwind(AssertUnwindSafe(|| wire.get()));
        assert!(result.is_err());
        assert!(wire.is_invalid());
        assert!(!wire.has_value());

        fail.set(false);
        assert_eq!(wire.get(), 7);
        assert_eq!(wire.eval_count(), 1);
    }

    #[test]
    fn effect_writing_its_own_dependency_reruns_until_settled() {
        let signal = Signal::new(-5);
        let seen = Rc::new(RefCell::new(Vec::new()));

        let (source, seen_clone) = (signal.clone(), seen.clone());
        let wire = effect(move |t| {
            let value = source.get_tracked(t);
            seen_clone.borrow_mut().push(value);
            if value < 0 {
                source.set(0);
            }
            value
        });

        // The nested wake did not recurse; the wire ran again afterwards
        assert_eq!(*seen.borrow(), vec![-5, 0]);
        assert_eq!(wire.eval_count(), 2);
        assert!(!wire.is_invalid());
        assert_eq!(wire.get(), 0);

        signal.set(-1);
        assert_eq!(*seen.borrow(), vec![-5, 0, -1, 0]);
        assert_eq!(signal.get(), 0);

        wire.stop();
    }

    #[test]
    fn effect_that_always_wakes_itself_gives_up() {
        let signal = Signal::new(0);
        let source = signal.clone();

        let wire = effect(move |t| {
            let value = source.get_tracked(t);
            source.set(value + 1);
            value
        });

        assert_eq!(wire.eval_count(), MAX_PASSES);
        assert!(wire.is_invalid());
        assert_eq!(signal.get(), MAX_PASSES as i32);

        wire.stop();
    }

    #[test]
    fn wire_clone_shares_state() {
        let wire1 = Wire::new(|_| 42);
        assert_eq!(wire1.get(), 42);

        let wire2 = wire1.clone();
        assert_eq!(wire1.id(), wire2.id());
        assert!(wire2.has_value());
        assert_eq!(wire2.eval_count(), 1);
    }
}
