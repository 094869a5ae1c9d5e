//! Communicator seam and 2D processor grid for the blockrank BLR engine.
//!
//! The distributed algorithms only touch [`Communicator`]: an object-safe
//! trait over byte-buffer collectives. [`SelfComm`] degenerates everything to
//! one rank; [`ThreadComm`] runs a multi-rank group inside one process for
//! tests. [`ProcessorGrid2D`] arranges the active ranks as a `Pr × Pc` grid
//! with row/column sub-communicators.

pub mod comm;
pub mod error;
pub mod grid;
pub mod helpers;
pub mod thread;

pub use comm::{Communicator, DType, ReduceOp, SelfComm};
pub use error::{CommError, Result};
pub use grid::ProcessorGrid2D;
pub use helpers::{allreduce_scalars, allreduce_u64, bcast_scalars, bcast_vec, CommElem};
pub use thread::ThreadComm;
