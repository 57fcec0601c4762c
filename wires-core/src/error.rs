//! Error types for the reactive engine.

use thiserror::Error;

use crate::reactive::SourceId;

/// Errors surfaced by [`Wire`](crate::Wire) reads and activation.
///
/// Panics raised by user evaluation functions are not wrapped; they unwind
/// through whichever read, write or run call triggered the evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ReactiveError {
    /// A wire was read (or run) while its own evaluation was in progress.
    #[error("dependency cycle: wire {wire} was read during its own evaluation")]
    Cycle {
        /// The wire that was re-entered.
        wire: SourceId,
    },
}

/// Result alias used throughout the crate.
pub type Result<T, E = ReactiveError> = std::result::Result<T, E>;
