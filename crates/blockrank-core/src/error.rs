//! Error types for blockrank-core.

use thiserror::Error;

/// Errors from the distributed BLR engine.
#[derive(Debug, Error)]
pub enum BlrError {
    /// A dense kernel failed.
    #[error(transparent)]
    Dense(#[from] blockrank_dense::DenseError),

    /// A compression kernel failed.
    #[error(transparent)]
    LowRank(#[from] blockrank_lowrank::LowRankError),

    /// A collective failed.
    #[error(transparent)]
    Comm(#[from] blockrank_comm::CommError),

    /// Operands live on different process grids.
    #[error("operands live on different process grids")]
    GridMismatch,

    /// Block partitions of two operands do not line up.
    #[error("partition mismatch in {what}")]
    PartitionMismatch {
        /// Which compatibility requirement failed.
        what: &'static str,
    },

    /// A tile partition is empty or contains a zero-size tile.
    #[error("invalid tile partition: {what}")]
    BadPartition {
        /// What was wrong with the partition.
        what: &'static str,
    },

    /// The diagonal LU hit an exactly zero pivot; the remaining block loop
    /// was aborted on every active rank.
    #[error("zero pivot in diagonal block {block} at elimination step {step}")]
    ZeroPivot {
        /// Block row of the failing diagonal tile.
        block: usize,
        /// Elimination step within the tile.
        step: usize,
    },

    /// A low-rank tile was built with a rank exceeding its block size.
    #[error("rank {rank} exceeds tile size {rows}x{cols}")]
    RankExceedsTile {
        /// Offending rank.
        rank: usize,
        /// Tile rows.
        rows: usize,
        /// Tile columns.
        cols: usize,
    },

    /// An operation needed a dense tile but found a low-rank one.
    #[error("tile ({i}, {j}) is low-rank where a dense tile is required")]
    TileNotDense {
        /// Tile row.
        i: usize,
        /// Tile column.
        j: usize,
    },

    /// A factored tile came out with NaN or infinite entries.
    #[error("tile ({i}, {j}) contains non-finite values after factorization")]
    NonFiniteTile {
        /// Tile row.
        i: usize,
        /// Tile column.
        j: usize,
    },

    /// Element or tile access outside the caller's locally owned part.
    #[error("global index ({i}, {j}) is not stored on this rank")]
    NotLocal {
        /// Global row or tile row.
        i: usize,
        /// Global column or tile column.
        j: usize,
    },

    /// A serialized tile carried an unknown variant tag.
    #[error("unknown tile variant tag {tag}")]
    BadTileTag {
        /// Tag byte found in the header.
        tag: u8,
    },

    /// A serialized tile payload was shorter than its header promised.
    #[error("serialized tile truncated: need {need} bytes, have {have}")]
    TileTruncated {
        /// Bytes required by the header.
        need: usize,
        /// Bytes available.
        have: usize,
    },

    /// The requested configuration is not supported by the distributed
    /// algorithm.
    #[error("unsupported configuration: {what}")]
    Unsupported {
        /// What is unsupported.
        what: &'static str,
    },

    /// The options record failed validation.
    #[error("invalid options: {what}")]
    BadOptions {
        /// Which field was invalid.
        what: &'static str,
    },
}

/// Result alias for the BLR engine.
pub type Result<T> = std::result::Result<T, BlrError>;
