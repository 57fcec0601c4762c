//! Threads: explicit dependency contexts.
//!
//! A [`Thread`] is the set of wake callbacks that must run when something
//! changes upstream of it. Every wire owns exactly one thread and passes it to
//! its evaluation function; any signal or wire read through that thread with
//! `get_tracked` records the thread as a subscriber.
//!
//! # Dependency epochs
//!
//! Subscriptions are bidirectional but weak in both directions. Upstream
//! values keep a set of weak thread handles, and each thread keeps
//! weak handles to the sources it read, stamped with the epoch in which they
//! were read. [`Thread::scope`] opens a new epoch; when the scope returns,
//! every source that was not read again is explicitly unsubscribed. A
//! dependency read on one evaluation but not the next therefore stops waking
//! the thread.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;
use smallvec::SmallVec;
use tracing::trace;

use super::subscriber::{SourceId, Subscriber, SubscriberId, ThreadId};

/// Something a thread can subscribe to.
pub(crate) trait Source {
    fn source_id(&self) -> SourceId;

    /// Forget `thread` as a subscriber.
    fn unsubscribe(&self, thread: ThreadId);
}

/// A source read by a thread, stamped with the epoch of the read.
struct Tracked {
    source: Weak<dyn Source>,
    epoch: u64,
}

pub(crate) struct ThreadInner {
    id: ThreadId,
    wakes: RefCell<IndexMap<SubscriberId, Subscriber>>,
    sources: RefCell<IndexMap<SourceId, Tracked>>,
    epoch: Cell<u64>,
    scope_depth: Cell<usize>,
}

/// A set of wake callbacks and the dependency context they are tracked under.
///
/// Cloning a `Thread` yields another handle to the same set; identity is
/// given by [`Thread::id`].
///
/// # Example
///
/// ```rust
/// use wires_core::{Signal, Thread};
///
/// let count = Signal::new(1);
/// let thread = Thread::new();
/// thread.on_wake(|| println!("count changed"));
///
/// assert_eq!(count.get_tracked(&thread), 1);
/// count.set(2); // prints "count changed"
/// ```
#[derive(Clone)]
pub struct Thread {
    inner: Rc<ThreadInner>,
}

impl Thread {
    /// Create a thread with no wake callbacks.
    pub fn new() -> Self {
        Self {
            inner: Rc::new(ThreadInner {
                id: ThreadId::new(),
                wakes: RefCell::new(IndexMap::new()),
                sources: RefCell::new(IndexMap::new()),
                epoch: Cell::new(0),
                scope_depth: Cell::new(0),
            }),
        }
    }

    /// Get the thread's identity.
    pub fn id(&self) -> ThreadId {
        self.inner.id
    }

    /// Add a wake callback, returning its ID.
    pub fn on_wake<F>(&self, wake: F) -> SubscriberId
    where
        F: Fn() + 'static,
    {
        self.add_wake(Subscriber::new(wake))
    }

    /// Add an existing subscriber. Adding the same subscriber twice is a no-op.
    pub fn add_wake(&self, subscriber: Subscriber) -> SubscriberId {
        let id = subscriber.id();
        self.inner.wakes.borrow_mut().entry(id).or_insert(subscriber);
        id
    }

    /// Remove a wake callback. Returns whether it was present.
    pub fn remove_wake(&self, id: SubscriberId) -> bool {
        self.inner.wakes.borrow_mut().shift_remove(&id).is_some()
    }

    /// Number of wake callbacks currently installed.
    pub fn wake_count(&self) -> usize {
        self.inner.wakes.borrow().len()
    }

    /// Number of upstream sources this thread is subscribed to.
    pub fn source_count(&self) -> usize {
        self.inner.sources.borrow().len()
    }

    /// Invoke every wake callback directly, bypassing any open batch.
    pub fn signal(&self) {
        for wake in self.wakes() {
            wake.notify();
        }
    }

    /// Run `f` as one evaluation pass of this thread.
    ///
    /// Sources read through the thread during `f` form its new dependency
    /// set; sources from earlier passes that were not read again are
    /// unsubscribed once `f` returns. If `f` panics nothing is pruned. A
    /// scope opened inside another scope of the same thread joins the outer
    /// pass.
    pub fn scope<R>(&self, f: impl FnOnce(&Thread) -> R) -> R {
        let depth = self.inner.scope_depth.get();
        if depth > 0 {
            return f(self);
        }

        let epoch = self.inner.epoch.get() + 1;
        self.inner.epoch.set(epoch);
        self.inner.scope_depth.set(1);
        let _depth = ScopeDepth(&self.inner.scope_depth);

        let result = f(self);
        self.prune(epoch);
        result
    }

    /// Unsubscribe from every upstream source.
    pub fn release(&self) {
        let released: SmallVec<[Weak<dyn Source>; 4]> = self
            .inner
            .sources
            .borrow_mut()
            .drain(..)
            .map(|(_, tracked)| tracked.source)
            .collect();
        trace!(thread = ?self.id(), count = released.len(), "releasing sources");
        for source in released {
            if let Some(source) = source.upgrade() {
                source.unsubscribe(self.id());
            }
        }
    }

    /// Snapshot of the wake callbacks, safe to invoke while the set changes.
    pub(crate) fn wakes(&self) -> SmallVec<[Subscriber; 2]> {
        self.inner.wakes.borrow().values().cloned().collect()
    }

    /// Record that `source` was read in the current epoch.
    pub(crate) fn track(&self, source: &Rc<dyn Source>) {
        let epoch = self.inner.epoch.get();
        self.inner.sources.borrow_mut().insert(
            source.source_id(),
            Tracked {
                source: Rc::downgrade(source),
                epoch,
            },
        );
    }

    pub(crate) fn downgrade(&self) -> WeakThread {
        WeakThread(Rc::downgrade(&self.inner))
    }

    fn prune(&self, epoch: u64) {
        let mut stale: SmallVec<[Weak<dyn Source>; 4]> = SmallVec::new();
        self.inner.sources.borrow_mut().retain(|_, tracked| {
            if tracked.epoch == epoch {
                true
            } else {
                stale.push(tracked.source.clone());
                false
            }
        });

        if !stale.is_empty() {
            trace!(thread = ?self.id(), count = stale.len(), "dropping stale dependencies");
        }
        for source in stale {
            if let Some(source) = source.upgrade() {
                source.unsubscribe(self.id());
            }
        }
    }
}

impl Default for Thread {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Thread {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Thread")
            .field("id", &self.id())
            .field("wake_count", &self.wake_count())
            .field("source_count", &self.source_count())
            .finish()
    }
}

/// Resets the scope depth even if the evaluation unwinds.
struct ScopeDepth<'a>(&'a Cell<usize>);

impl Drop for ScopeDepth<'_> {
    fn drop(&mut self) {
        self.0.set(0);
    }
}

/// Weak handle to a thread, held by upstream values.
#[derive(Clone)]
pub(crate) struct WeakThread(Weak<ThreadInner>);

impl WeakThread {
    pub(crate) fn upgrade(&self) -> Option<Thread> {
        self.0.upgrade().map(|inner| Thread { inner })
    }
}

/// The subscriber threads of a signal or wire.
///
/// Entries are weak; threads that have been dropped are pruned whenever the
/// set is walked.
#[derive(Default)]
pub(crate) struct ThreadSet {
    threads: RefCell<IndexMap<ThreadId, WeakThread>>,
}

impl ThreadSet {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Add `thread`. Re-adding an existing subscriber is a no-op.
    pub(crate) fn insert(&self, thread: &Thread) {
        self.threads
            .borrow_mut()
            .entry(thread.id())
            .or_insert_with(|| thread.downgrade());
    }

    pub(crate) fn remove(&self, thread: ThreadId) -> bool {
        self.threads.borrow_mut().shift_remove(&thread).is_some()
    }

    #[cfg(test)]
    pub(crate) fn contains(&self, thread: ThreadId) -> bool {
        self.threads.borrow().contains_key(&thread)
    }

    /// Snapshot of the live subscriber threads, in subscription order.
    pub(crate) fn live(&self) -> SmallVec<[Thread; 4]> {
        let mut live = SmallVec::new();
        self.threads.borrow_mut().retain(|_, weak| match weak.upgrade() {
            Some(thread) => {
                live.push(thread);
                true
            }
            None => false,
        });
        live
    }

    pub(crate) fn len(&self) -> usize {
        self.threads
            .borrow()
            .values()
            .filter(|weak| weak.0.strong_count() > 0)
            .count()
    }
}
