//! Configuration record for compression and factorization.

use crate::error::{BlrError, Result};

/// Low-rank compression algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LowRankAlgorithm {
    /// Truncated rank-revealing QR of the stored dense block.
    #[default]
    Rrqr,
    /// Adaptive cross approximation sampling the block through an element
    /// oracle.
    Aca,
}

/// Options for BLR compression and factorization.
#[derive(Debug, Clone)]
pub struct BlrOptions {
    /// Compression algorithm for admissible tiles.
    pub low_rank_algorithm: LowRankAlgorithm,
    /// Relative compression tolerance.
    pub rel_tol: f64,
    /// Absolute compression tolerance.
    pub abs_tol: f64,
    /// Rank cap for compressed tiles.
    pub max_rank: usize,
    /// Uniform tile size used when a partition is derived from a matrix
    /// rather than supplied.
    pub tile_size: usize,
    /// Remaining task-recursion levels handed to the dense kernels
    /// (0 runs them sequentially).
    pub task_recursion_cutoff_level: usize,
    /// Pivot replacement threshold of the diagonal LU; zero keeps plain
    /// partial pivoting.
    pub pivot_threshold: f64,
    /// Diagnostic output level; zero is silent.
    pub verbosity: usize,
}

impl Default for BlrOptions {
    fn default() -> Self {
        Self {
            low_rank_algorithm: LowRankAlgorithm::default(),
            rel_tol: 1e-8,
            abs_tol: 1e-12,
            max_rank: 5000,
            tile_size: 256,
            task_recursion_cutoff_level: 0,
            pivot_threshold: 0.0,
            verbosity: 0,
        }
    }
}

impl BlrOptions {
    /// Set the compression algorithm.
    pub fn with_algorithm(mut self, algo: LowRankAlgorithm) -> Self {
        self.low_rank_algorithm = algo;
        self
    }

    /// Set the relative tolerance.
    pub fn with_rel_tol(mut self, rel_tol: f64) -> Self {
        self.rel_tol = rel_tol;
        self
    }

    /// Set the absolute tolerance.
    pub fn with_abs_tol(mut self, abs_tol: f64) -> Self {
        self.abs_tol = abs_tol;
        self
    }

    /// Set the rank cap.
    pub fn with_max_rank(mut self, max_rank: usize) -> Self {
        self.max_rank = max_rank;
        self
    }

    /// Set the uniform tile size.
    pub fn with_tile_size(mut self, tile_size: usize) -> Self {
        self.tile_size = tile_size;
        self
    }

    /// Set the task recursion cutoff.
    pub fn with_task_recursion_cutoff_level(mut self, level: usize) -> Self {
        self.task_recursion_cutoff_level = level;
        self
    }

    /// Set the pivot replacement threshold.
    pub fn with_pivot_threshold(mut self, threshold: f64) -> Self {
        self.pivot_threshold = threshold;
        self
    }

    /// Set the verbosity level.
    pub fn with_verbosity(mut self, verbosity: usize) -> Self {
        self.verbosity = verbosity;
        self
    }

    /// Check the record for out-of-range fields.
    pub fn validate(&self) -> Result<()> {
        if !(self.rel_tol >= 0.0) {
            return Err(BlrError::BadOptions { what: "rel_tol must be non-negative" });
        }
        if !(self.abs_tol >= 0.0) {
            return Err(BlrError::BadOptions { what: "abs_tol must be non-negative" });
        }
        if self.max_rank == 0 {
            return Err(BlrError::BadOptions { what: "max_rank must be positive" });
        }
        if self.tile_size == 0 {
            return Err(BlrError::BadOptions { what: "tile_size must be positive" });
        }
        if !(self.pivot_threshold >= 0.0) {
            return Err(BlrError::BadOptions { what: "pivot_threshold must be non-negative" });
        }
        Ok(())
    }
}
