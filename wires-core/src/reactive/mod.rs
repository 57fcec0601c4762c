//! Reactive Primitives
//!
//! This module implements the reactive core: signals, wires, threads, and the
//! batch runtime.
//!
//! # Concepts
//!
//! ## Signals
//!
//! A Signal is a container for mutable state. When a signal is read through a
//! [`Thread`], the signal registers that thread as a subscriber. When the
//! signal is set, every subscriber thread is woken.
//!
//! ## Wires
//!
//! A Wire is a derived value that caches its result. A passive wire
//! re-evaluates only when read after a dependency changed. A running wire
//! (an effect) re-evaluates as soon as a dependency changes.
//!
//! ## Threads
//!
//! A Thread is the set of wake callbacks owned by a wire, and the explicit
//! dependency context handed to its evaluation function. There is no ambient
//! "current computation": a read is tracked only when the caller passes a
//! thread to `get_tracked`.
//!
//! ## Batches
//!
//! [`batch`] defers wakes caused by signal writes until the outermost batch
//! closes, then runs each affected wake once.

mod runtime;
mod signal;
mod subscriber;
mod thread;
mod wire;

pub use runtime::{batch, in_batch, Runtime};
pub use signal::{signal, Signal};
pub use subscriber::{SourceId, Subscriber, SubscriberId, ThreadId};
pub use thread::Thread;
pub use wire::{computed, effect, memo, Wire};
