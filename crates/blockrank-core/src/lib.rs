//! Distributed block low-rank (BLR) matrix engine.
//!
//! A BLR matrix partitions a dense matrix into tiles; admissible
//! off-diagonal tiles are stored as low-rank factorizations `U·V`. Tiles are
//! dealt 2D block-cyclically over a process grid. The engine provides
//! compression, right-looking LU with block-row pivoting, a 2×2 partial
//! factorization with Schur complement, triangular solves,
//! matrix-vector/matrix-matrix products, and block-cyclic import/export.

pub mod admissibility;
pub mod bcast;
pub mod blr;
pub mod cyclic;
pub mod error;
pub mod factor;
pub mod ops;
pub mod options;
pub mod tile;

pub use admissibility::Admissibility;
pub use blr::{BlrMatrix, BlrScalar};
pub use cyclic::CyclicMatrix;
pub use error::{BlrError, Result};
pub use ops::{gemm, gemv, trsm, trsv};
pub use options::{BlrOptions, LowRankAlgorithm};
pub use tile::{gemm_tiles, DenseTile, LrTile, Tile};
