//! Signal Implementation
//!
//! A Signal is the fundamental reactive primitive. It holds a value and
//! tracks which threads depend on it.
//!
//! # How Signals Work
//!
//! 1. When a signal is read through a [`Thread`] (`get_tracked`), the signal
//!    registers that thread as a subscriber.
//!
//! 2. When a signal's value is set, every wake callback of every subscriber
//!    thread is dispatched through the batch runtime.
//!
//! 3. Wakes invalidate (or eagerly re-run) the wires that own those threads.
//!
//! # Memory Layout
//!
//! Each signal consists of:
//! - A unique ID (8 bytes)
//! - The value, behind a `RefCell`
//! - A set of weak subscriber thread handles (grows with number of dependents)

use std::cell::RefCell;
use std::fmt::Debug;
use std::rc::Rc;

use tracing::trace;

use super::runtime::Runtime;
use super::subscriber::{SourceId, ThreadId};
use super::thread::{Source, Thread, ThreadSet};

struct SignalInner<T> {
    id: SourceId,
    value: RefCell<T>,
    subscribers: ThreadSet,
}

impl<T> Source for SignalInner<T> {
    fn source_id(&self) -> SourceId {
        self.id
    }

    fn unsubscribe(&self, thread: ThreadId) {
        self.subscribers.remove(thread);
    }
}

/// A reactive cell holding a value of type T.
///
/// Cloning a signal yields another handle to the same cell.
///
/// # Example
///
/// ```rust
/// use wires_core::Signal;
///
/// let count = Signal::new(0);
///
/// // Read the value
/// assert_eq!(count.get(), 0);
///
/// // Update the value (notifies subscribers)
/// count.set(5);
/// assert_eq!(count.get(), 5);
/// ```
pub struct Signal<T> {
    inner: Rc<SignalInner<T>>,
}

impl<T> Signal<T>
where
    T: Clone + 'static,
{
    /// Create a new signal with the given initial value.
    pub fn new(value: T) -> Self {
        Self {
            inner: Rc::new(SignalInner {
                id: SourceId::new(),
                value: RefCell::new(value),
                subscribers: ThreadSet::new(),
            }),
        }
    }

    /// Get the signal's unique ID.
    pub fn id(&self) -> SourceId {
        self.inner.id
    }

    /// Get the current value without tracking.
    pub fn get(&self) -> T {
        self.inner.value.borrow().clone()
    }

    /// Get the current value and subscribe `thread` to future writes.
    ///
    /// Subscribing is idempotent.
    pub fn get_tracked(&self, thread: &Thread) -> T {
        self.subscribe(thread);
        self.get()
    }

    /// Borrow the current value without cloning it or tracking.
    ///
    /// # Panics
    ///
    /// The value stays borrowed while `f` runs, so writing this signal from
    /// inside `f` (`set` or `update`) panics. Use [`Signal::get`] when `f`
    /// needs to write back.
    pub fn with<U>(&self, f: impl FnOnce(&T) -> U) -> U {
        f(&self.inner.value.borrow())
    }

    /// Set a new value and wake every subscriber.
    ///
    /// The value is accepted unconditionally; subscribers are woken even if
    /// it is equal to the previous one.
    pub fn set(&self, value: T) {
        *self.inner.value.borrow_mut() = value;
        self.notify_subscribers();
    }

    /// Update the value using a function of the current one.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&T) -> T,
    {
        let next = f(&self.inner.value.borrow());
        self.set(next);
    }

    /// Register `thread` as a subscriber.
    ///
    /// This is what [`Signal::get_tracked`] does on every read; it is exposed
    /// for composing a signal into another reactive primitive by hand.
    pub fn subscribe(&self, thread: &Thread) {
        self.inner.subscribers.insert(thread);
        let source: Rc<dyn Source> = self.inner.clone();
        thread.track(&source);
    }

    /// Remove `thread` from the subscribers.
    pub fn unsubscribe(&self, thread: &Thread) -> bool {
        self.inner.subscribers.remove(thread.id())
    }

    /// Get the number of live subscriber threads.
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.len()
    }

    /// Dispatch the wake callbacks of every subscriber thread.
    fn notify_subscribers(&self) {
        let threads = self.inner.subscribers.live();
        trace!(signal = %self.inner.id, subscribers = threads.len(), "signal set");
        for thread in threads {
            for wake in thread.wakes() {
                Runtime::dispatch(wake);
            }
        }
    }
}

impl<T> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T> Debug for Signal<T>
where
    T: Clone + Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signal")
            .field("id", &self.inner.id)
            .field("value", &*self.inner.value.borrow())
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

/// Create a signal. Shorthand for [`Signal::new`].
pub fn signal<T>(value: T) -> Signal<T>
where
    T: Clone + 'static,
{
    Signal::new(value)
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::batch;
    use std::cell::Cell;

    fn counting_thread() -> (Thread, Rc<Cell<i32>>) {
        let thread = Thread::new();
        let count = Rc::new(Cell::new(0));
        let count_clone = count.clone();
        thread.on_wake(move || count_clone.set(count_clone.get() + 1));
        (thread, count)
    }

    #[test]
    fn signal_get_and_set() {
        let signal = Signal::new(0);
        assert_eq!(signal.get(), 0);

        signal.set(42);
        assert_eq!(signal.get(), 42);
    }

    #[test]
    fn signal_update() {
        let signal = Signal::new(10);
        signal.update(|v| v + 5);
        assert_eq!(signal.get(), 15);
    }

    #[test]
    fn signal_with_borrows() {
        let signal = Signal::new(vec![1, 2, 3]);
        assert_eq!(signal.with(|v| v.len()), 3);
    }

    #[test]
    fn untracked_read_does_not_subscribe() {
        let signal = Signal::new(0);
        let _ = signal.get();
        assert_eq!(signal.subscriber_count(), 0);
    }

    #[test]
    fn tracked_read_subscribes_once() {
        let signal = Signal::new(0);
        let (thread, count) = counting_thread();

        signal.get_tracked(&thread);
        signal.get_tracked(&thread);
        assert_eq!(signal.subscriber_count(), 1);

        signal.set(1);
        assert_eq!(count.get(), 1);

        signal.set(2);
        assert_eq!(count.get(), 2);
    }

    #[test]
    fn equal_value_still_notifies() {
        let signal = Signal::new(7);
        let (thread, count) = counting_thread();
        signal.subscribe(&thread);

        signal.set(7);
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn signal_unsubscribe() {
        let signal = Signal::new(0);
        let (thread, count) = counting_thread();

        signal.subscribe(&thread);
        signal.set(1);
        assert_eq!(count.get(), 1);

        assert!(signal.unsubscribe(&thread));
        signal.set(2);
        // Should not have been called again
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn dropped_thread_is_not_retained() {
        let signal = Signal::new(0);
        {
            let thread = Thread::new();
            signal.subscribe(&thread);
            assert_eq!(signal.subscriber_count(), 1);
        }
        assert_eq!(signal.subscriber_count(), 0);

        // Writing with only dead subscribers is fine
        signal.set(1);
    }

    #[test]
    fn writes_inside_batch_are_visible_but_deferred() {
        let signal = Signal::new(0);
        let (thread, count) = counting_thread();
        signal.subscribe(&thread);

        batch(|| {
            signal.set(1);
            signal.set(2);
            assert_eq!(signal.get(), 2);
            assert_eq!(count.get(), 0);
        });

        assert_eq!(count.get(), 1);
    }

    #[test]
    fn signal_clone_shares_state() {
        let signal1 = Signal::new(0);
        let signal2 = signal1.clone();

        signal1.set(42);
        assert_eq!(signal2.get(), 42);

        signal2.set(100);
        assert_eq!(signal1.get(), 100);
        assert_eq!(signal1.id(), signal2.id());
    }

    #[test]
    fn signal_ids_are_unique() {
        let s1 = Signal::new(0);
        let s2 = Signal::new(0);
        let s3 = signal(0);

        assert_ne!(s1.id(), s2.id());
        assert_ne!(s2.id(), s3.id());
        assert_ne!(s1.id(), s3.id());
    }

    #[test]
    #[should_panic(expected = "already borrowed")]
    fn writing_inside_with_panics() {
        let signal = Signal::new(1);
        signal.with(|value| signal.set(*value + 1));
    }
}
