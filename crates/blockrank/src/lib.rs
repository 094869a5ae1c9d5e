//! Convenience crate re-exporting the blockrank BLR engine.
//!
//! - [`dense`]: column-major dense matrices and BLAS/LAPACK-style kernels.
//! - [`lowrank`]: RRQR and ACA compression, Jacobi SVD.
//! - [`comm`]: communicator seam, in-process communicators, 2D grid.
//! - The crate root re-exports the BLR matrix engine itself.

pub use blockrank_comm as comm;
pub use blockrank_dense as dense;
pub use blockrank_lowrank as lowrank;

pub use blockrank_core::{
    gemm, gemv, trsm, trsv, Admissibility, BlrError, BlrMatrix, BlrOptions, BlrScalar,
    CyclicMatrix, LowRankAlgorithm, Result, Tile,
};

pub use blockrank_comm::{Communicator, ProcessorGrid2D, SelfComm, ThreadComm};
pub use blockrank_dense::{Diag, Matrix, Scalar, Side, Trans, UpLo};
