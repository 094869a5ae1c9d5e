//! Dense column-major matrix primitives for the blockrank BLR engine.
//!
//! Owning `m×n` blocks with leading dimension, non-owning sub-views, and the
//! BLAS/LAPACK-style kernels the tile algebra is built from: `gemm`, `gemv`,
//! `trsm`, `trsv`, `getrf` with partial pivoting, and `laswp`.

pub mod blas;
pub mod error;
pub mod lapack;
pub mod matrix;
pub mod scalar;

pub use blas::{dotu, gemm, gemv, trsm, trsv, Diag, Side, Trans, UpLo};
pub use error::{DenseError, Result};
pub use lapack::{getrf, laswp};
pub use matrix::{Matrix, MatrixMut, MatrixRef};
pub use scalar::Scalar;
