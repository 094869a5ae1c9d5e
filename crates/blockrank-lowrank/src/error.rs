//! Error types for blockrank-lowrank.

use thiserror::Error;

/// Errors from the compression kernels.
#[derive(Debug, Error)]
pub enum LowRankError {
    /// A dense kernel underneath the compression failed.
    #[error(transparent)]
    Dense(#[from] blockrank_dense::DenseError),

    /// The Jacobi SVD did not converge within the sweep limit.
    #[error("Jacobi SVD did not converge after {sweeps} sweeps")]
    NoConvergence {
        /// Number of sweeps performed.
        sweeps: usize,
    },
}

/// Result alias for compression kernels.
pub type Result<T> = std::result::Result<T, LowRankError>;
