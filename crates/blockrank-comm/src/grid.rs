//! 2D processor grid with row and column sub-communicators.

use std::sync::Arc;

use crate::comm::Communicator;
use crate::error::{CommError, Result};

/// A `Pr × Pc` arrangement of the first `Pr·Pc` ranks of a communicator.
///
/// Grid position of an active rank: `prow = rank mod Pr`,
/// `pcol = rank div Pr`. Remaining ranks are inactive; they hold no
/// sub-communicators and skip all grid-local work, participating only in
/// collectives on the full communicator.
pub struct ProcessorGrid2D {
    comm: Arc<dyn Communicator>,
    nprows: usize,
    npcols: usize,
    prow: usize,
    pcol: usize,
    active: bool,
    rowcomm: Option<Arc<dyn Communicator>>,
    colcomm: Option<Arc<dyn Communicator>>,
    activecomm: Option<Arc<dyn Communicator>>,
}

impl std::fmt::Debug for ProcessorGrid2D {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessorGrid2D")
            .field("nprows", &self.nprows)
            .field("npcols", &self.npcols)
            .field("prow", &self.prow)
            .field("pcol", &self.pcol)
            .field("active", &self.active)
            .finish()
    }
}

impl ProcessorGrid2D {
    /// Build a grid over all ranks of `comm`.
    pub fn new(comm: Arc<dyn Communicator>) -> Result<Self> {
        let p = comm.size();
        Self::with_procs(comm, p)
    }

    /// Build a grid over the first `p` ranks of `comm`; the rest stay
    /// inactive.
    pub fn with_procs(comm: Arc<dyn Communicator>, p: usize) -> Result<Self> {
        if p == 0 || p > comm.size() {
            return Err(CommError::GridSize {
                requested: p,
                available: comm.size(),
            });
        }
        // Largest divisor of p not exceeding sqrt(p).
        let mut nprows = (p as f64).sqrt().floor() as usize;
        nprows = nprows.max(1);
        while p % nprows != 0 {
            nprows -= 1;
        }
        let npcols = p / nprows;

        let rank = comm.rank();
        let active = rank < nprows * npcols;
        let (prow, pcol) = if active {
            (rank % nprows, rank / nprows)
        } else {
            (0, 0)
        };

        // Three collective splits: grid rows, grid columns, and the set of
        // active ranks. Inactive ranks pass no color and get none of them.
        let rowcomm = comm.split(active.then_some(prow), pcol)?;
        let colcomm = comm.split(active.then_some(pcol), prow)?;
        let activecomm = comm.split(active.then_some(0), rank)?;

        Ok(Self {
            comm,
            nprows,
            npcols,
            prow,
            pcol,
            active,
            rowcomm,
            colcomm,
            activecomm,
        })
    }

    /// Full communicator the grid was built from.
    pub fn comm(&self) -> &Arc<dyn Communicator> {
        &self.comm
    }

    /// Grid rows.
    pub fn nprows(&self) -> usize {
        self.nprows
    }

    /// Grid columns.
    pub fn npcols(&self) -> usize {
        self.npcols
    }

    /// Grid row of this rank (meaningful only when [`active`](Self::active)).
    pub fn prow(&self) -> usize {
        self.prow
    }

    /// Grid column of this rank (meaningful only when
    /// [`active`](Self::active)).
    pub fn pcol(&self) -> usize {
        self.pcol
    }

    /// Rank in the full communicator.
    pub fn rank(&self) -> usize {
        self.comm.rank()
    }

    /// Number of active ranks, `Pr·Pc`.
    pub fn npactives(&self) -> usize {
        self.nprows * self.npcols
    }

    /// Whether this rank holds a grid position.
    pub fn active(&self) -> bool {
        self.active
    }

    /// Sub-communicator of this rank's grid row (ranks ordered by `pcol`).
    pub fn row_comm(&self) -> Option<&Arc<dyn Communicator>> {
        self.rowcomm.as_ref()
    }

    /// Sub-communicator of this rank's grid column (ranks ordered by `prow`).
    pub fn col_comm(&self) -> Option<&Arc<dyn Communicator>> {
        self.colcomm.as_ref()
    }

    /// Sub-communicator of all active ranks (ordered by rank).
    pub fn active_comm(&self) -> Option<&Arc<dyn Communicator>> {
        self.activecomm.as_ref()
    }

    /// Does tile row `i` live on this rank's grid row?
    pub fn is_local_row(&self, i: usize) -> bool {
        self.active && i % self.nprows == self.prow
    }

    /// Does tile column `j` live on this rank's grid column?
    pub fn is_local_col(&self, j: usize) -> bool {
        self.active && j % self.npcols == self.pcol
    }

    /// Does tile `(i, j)` live on this rank?
    pub fn is_local(&self, i: usize, j: usize) -> bool {
        self.is_local_row(i) && self.is_local_col(j)
    }

    /// Grid row owning tile row `i`.
    pub fn rg2p(&self, i: usize) -> usize {
        i % self.nprows
    }

    /// Grid column owning tile column `j`.
    pub fn cg2p(&self, j: usize) -> usize {
        j % self.npcols
    }

    /// Rank owning tile `(i, j)`.
    pub fn g2p(&self, i: usize, j: usize) -> usize {
        self.rg2p(i) + self.cg2p(j) * self.nprows
    }

    /// Print the grid shape on the root rank.
    pub fn print(&self) {
        if self.comm.is_root() {
            println!("# ProcessorGrid2D: [{} x {}]", self.nprows, self.npcols);
        }
    }
}
