//! Error types for blockrank-dense.

use thiserror::Error;

/// Errors from the dense matrix kernels.
#[derive(Debug, Error)]
pub enum DenseError {
    /// Operand shapes do not match the requested operation.
    #[error("{op}: shape mismatch, left is ({lhs_rows}, {lhs_cols}), right is ({rhs_rows}, {rhs_cols})")]
    ShapeMismatch {
        /// Name of the failing operation.
        op: &'static str,
        /// Rows of the left operand (after any transposition).
        lhs_rows: usize,
        /// Columns of the left operand (after any transposition).
        lhs_cols: usize,
        /// Rows of the right operand (after any transposition).
        rhs_rows: usize,
        /// Columns of the right operand (after any transposition).
        rhs_cols: usize,
    },

    /// A triangular or LU kernel hit an exactly zero pivot.
    #[error("singular pivot at elimination step {step}")]
    SingularPivot {
        /// Elimination step at which the zero pivot appeared.
        step: usize,
    },

    /// A pivot vector has the wrong length for the matrix it is applied to.
    #[error("pivot vector of length {len} does not cover {rows} rows")]
    PivotLength {
        /// Length of the supplied pivot vector.
        len: usize,
        /// Number of matrix rows to permute.
        rows: usize,
    },
}

/// Result alias for dense kernels.
pub type Result<T> = std::result::Result<T, DenseError>;
