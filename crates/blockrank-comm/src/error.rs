//! Error types for blockrank-comm.

use thiserror::Error;

/// Errors from communicator operations and grid construction.
#[derive(Debug, Error)]
pub enum CommError {
    /// Broadcast root outside the communicator.
    #[error("broadcast root {root} out of range for communicator of size {size}")]
    RootOutOfRange {
        /// Requested root rank.
        root: usize,
        /// Communicator size.
        size: usize,
    },

    /// Receive buffer length differs from the broadcast payload.
    #[error("broadcast payload of {sent} bytes does not fit receive buffer of {expected} bytes")]
    PayloadMismatch {
        /// Bytes published by the root.
        sent: usize,
        /// Bytes expected by the receiver.
        expected: usize,
    },

    /// A reduction buffer length differs across ranks.
    #[error("reduction buffer of {got} bytes does not match {expected} bytes contributed earlier")]
    ReduceMismatch {
        /// Bytes contributed by an earlier rank.
        expected: usize,
        /// Bytes contributed by this rank.
        got: usize,
    },

    /// The collective split could not place this rank.
    #[error("communicator split failed: calling rank missing from the split table")]
    SplitFailed,

    /// Shared state was poisoned by a panicking rank.
    #[error("communicator state poisoned by a panicked rank")]
    Poisoned,

    /// Requested more active processes than the communicator holds.
    #[error("grid requested {requested} processes, communicator has {available}")]
    GridSize {
        /// Requested process count.
        requested: usize,
        /// Communicator size.
        available: usize,
    },
}

/// Result alias for communicator operations.
pub type Result<T> = std::result::Result<T, CommError>;
