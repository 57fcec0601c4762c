//! Wires Core
//!
//! This crate provides a fine-grained, push-pull reactive engine.
//! It implements:
//!
//! - Mutable reactive cells ([`Signal`])
//! - Lazy derived computations with dynamic dependency discovery ([`Wire`])
//! - Eager effects (a [`Wire`] after [`Wire::run`])
//! - Write batching ([`batch`])
//!
//! Dependency tracking is explicit. Every evaluation function receives the
//! [`Thread`] of the wire being evaluated, and reads made with
//! `get_tracked(thread)` become that wire's dependencies. Untracked reads
//! (`get`) never subscribe.
//!
//! Everything is single-threaded and synchronous: a write, read or batch
//! returns only after the cascade it triggered has finished.
//!
//! # Architecture
//!
//! - `reactive`: signals, wires, threads, and the batch runtime
//! - `record`: the [`reactive_record!`] adapter for plain structs
//! - `error`: [`ReactiveError`]
//!
//! # Example
//!
//! ```rust
//! use std::cell::Cell;
//! use std::rc::Rc;
//! use wires_core::{batch, computed, effect, Signal};
//!
//! let count = Signal::new(1);
//!
//! // A lazy derived value
//! let c = count.clone();
//! let doubled = computed(move |t| c.get_tracked(t) * 2);
//!
//! // An effect that re-runs whenever `doubled` changes
//! let seen = Rc::new(Cell::new(0));
//! let (d, s) = (doubled.clone(), seen.clone());
//! let log = effect(move |t| s.set(d.get_tracked(t)));
//! assert_eq!(seen.get(), 2);
//!
//! count.set(5);
//! assert_eq!(seen.get(), 10);
//!
//! batch(|| {
//!     count.set(6);
//!     count.set(7);
//! });
//! assert_eq!(seen.get(), 14);
//! log.stop();
//! ```

pub mod error;
pub mod reactive;
pub mod record;

pub use error::{ReactiveError, Result};
pub use reactive::{
    batch, computed, effect, in_batch, memo, signal, Runtime, Signal, SourceId, Subscriber,
    SubscriberId, Thread, ThreadId, Wire,
};
pub use record::MakeReactive;
