//! Low-rank compression kernels for the blockrank BLR engine.
//!
//! Two compression paths: deterministic truncated rank-revealing QR of a
//! stored dense block, and adaptive cross approximation driven by an element
//! or row/column oracle. A one-sided Jacobi SVD is included for small-block
//! reference decompositions.

pub mod aca;
pub mod error;
pub mod rrqr;
pub mod svd;

pub use aca::{aca, aca_rowcol, AcaApprox};
pub use error::{LowRankError, Result};
pub use rrqr::rrqr;
pub use svd::{jacobi_svd, SvdResult};
