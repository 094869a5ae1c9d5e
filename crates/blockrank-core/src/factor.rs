//! Distributed BLR factorization.
//!
//! Right-looking LU with row pivoting restricted to single block rows. Every
//! active rank walks the same sequence of block steps; each step broadcasts
//! the diagonal pivot data along the grid row and column, solves the panels,
//! optionally compresses them, broadcasts the panels for the trailing
//! update, and updates locally owned trailing tiles with the rank-aware
//! product kernels.

use blockrank_comm::bcast_scalars;
use blockrank_dense::{getrf, Diag, Side, Trans, UpLo};

use crate::admissibility::Admissibility;
use crate::blr::{BlrMatrix, BlrScalar};
use crate::error::{BlrError, Result};
use crate::options::BlrOptions;
use crate::tile::Tile;

/// Per-step status flag broadcast to every active rank.
const STATUS_OK: u64 = 0;
const STATUS_NOT_DENSE: u64 = u64::MAX;
const STATUS_NOT_FINITE: u64 = u64::MAX - 1;

impl<T: BlrScalar> BlrMatrix<T> {
    /// LU-factor in place with the default (weak) admissibility.
    pub fn factor(&mut self, opts: &BlrOptions) -> Result<Vec<usize>> {
        let adm = Admissibility::weak(self.rowblocks(), self.colblocks());
        self.factor_with(&adm, opts)
    }

    /// LU-factor in place. Diagonal tiles receive `getrf` with the options'
    /// pivot threshold; panel tiles are solved against the diagonal factors
    /// and compressed where admissible; trailing tiles receive rank-aware
    /// Schur updates. Returns the concatenated 0-based pivot vector (length
    /// `rows()`, block-restricted) on every active rank; inactive ranks get
    /// an empty vector.
    pub fn factor_with(&mut self, adm: &Admissibility, opts: &BlrOptions) -> Result<Vec<usize>> {
        opts.validate()?;
        if self.row_offsets() != self.col_offsets() {
            return Err(BlrError::PartitionMismatch {
                what: "factor requires identical row and column partitions",
            });
        }
        if adm.brows() != self.rowblocks() || adm.bcols() != self.colblocks() {
            return Err(BlrError::PartitionMismatch {
                what: "admissibility dimensions",
            });
        }
        if !self.active() {
            return Ok(Vec::new());
        }
        let mut piv = vec![0u64; self.rows()];
        let brows = self.rowblocks();
        for i in 0..brows {
            let piv_i = self.diag_step(i, &mut piv, opts)?;
            self.panel_step(i, &piv_i, Some(adm), opts)?;
            let urow = self.bcast_row_of_tiles_along_cols(i, i + 1, brows)?;
            let lcol = self.bcast_col_of_tiles_along_rows(i + 1, brows, i)?;
            self.trailing_update(i + 1, brows, i + 1, brows, &lcol, &urow, opts)?;
        }
        self.assemble_pivots(piv)
    }

    /// Factor the `A11` block of a 2×2 partitioning: `A11 = P·L11·U11`,
    /// `A12 ← L11⁻¹·P·A12`, `A21 ← A21·U11⁻¹`, and
    /// `A22 ← A22 − A21·A12` (the Schur complement). Returns `A11`'s pivot
    /// sequence.
    pub fn partial_factor(
        a11: &mut Self,
        a12: &mut Self,
        a21: &mut Self,
        a22: &mut Self,
        adm: &Admissibility,
        opts: &BlrOptions,
    ) -> Result<Vec<usize>> {
        opts.validate()?;
        if !(a11.same_grid(a12) && a11.same_grid(a21) && a11.same_grid(a22)) {
            return Err(BlrError::GridMismatch);
        }
        if a11.row_offsets() != a11.col_offsets() {
            return Err(BlrError::PartitionMismatch {
                what: "A11 must have identical row and column partitions",
            });
        }
        if a12.row_offsets() != a11.row_offsets()
            || a21.col_offsets() != a11.col_offsets()
            || a22.row_offsets() != a21.row_offsets()
            || a22.col_offsets() != a12.col_offsets()
        {
            return Err(BlrError::PartitionMismatch {
                what: "2x2 partitioning blocks do not line up",
            });
        }
        if adm.brows() != a11.rowblocks() || adm.bcols() != a11.colblocks() {
            return Err(BlrError::PartitionMismatch {
                what: "admissibility dimensions",
            });
        }
        if !a11.active() {
            return Ok(Vec::new());
        }
        let mut piv = vec![0u64; a11.rows()];
        let brows = a11.rowblocks();
        for i in 0..brows {
            let piv_i = a11.diag_step(i, &mut piv, opts)?;
            a11.panel_step(i, &piv_i, Some(adm), opts)?;
            a12.offdiag_row_panel_step(a11, i, &piv_i, opts)?;
            a21.offdiag_col_panel_step(a11, i, opts)?;

            let urow11 = a11.bcast_row_of_tiles_along_cols(i, i + 1, brows)?;
            let urow12 = a12.bcast_row_of_tiles_along_cols(i, 0, a12.colblocks())?;
            let lcol11 = a11.bcast_col_of_tiles_along_rows(i + 1, brows, i)?;
            let lcol21 = a21.bcast_col_of_tiles_along_rows(0, a21.rowblocks(), i)?;

            a11.trailing_update(i + 1, brows, i + 1, brows, &lcol11, &urow11, opts)?;
            a12.trailing_update(i + 1, brows, 0, a12.colblocks(), &lcol11, &urow12, opts)?;
            a21.trailing_update(0, a21.rowblocks(), i + 1, brows, &lcol21, &urow11, opts)?;
            a22.trailing_update(0, a22.rowblocks(), 0, a22.colblocks(), &lcol21, &urow12, opts)?;
        }
        a11.assemble_pivots(piv)
    }

    /// Diagonal LU of block `i` plus the step-status and pivot broadcasts.
    /// Returns the local pivot vector of the diagonal tile on every rank of
    /// grid row `rg2p(i)` (empty elsewhere).
    fn diag_step(&mut self, i: usize, piv: &mut [u64], opts: &BlrOptions) -> Result<Vec<usize>> {
        let mut status = STATUS_OK;
        let mut piv_i: Vec<usize> = Vec::new();
        if self.grid().is_local(i, i) {
            let off = self.tileroff(i);
            match self.tile_dense_mut(i, i) {
                Err(_) => status = STATUS_NOT_DENSE,
                Ok(d) => match getrf(d.as_mut(), opts.pivot_threshold) {
                    Ok(p) => {
                        if d.has_non_finite() {
                            status = STATUS_NOT_FINITE;
                        } else {
                            for (k, &pk) in p.iter().enumerate() {
                                piv[off + k] = (off + pk) as u64;
                            }
                            piv_i = p;
                        }
                    }
                    Err(blockrank_dense::DenseError::SingularPivot { step }) => {
                        status = step as u64 + 1;
                    }
                    Err(_) => status = STATUS_NOT_DENSE,
                },
            }
        }
        let acomm = self
            .grid()
            .active_comm()
            .ok_or(BlrError::Unsupported {
                what: "factor called on an inactive rank",
            })?
            .clone();
        let mut st = [status];
        bcast_scalars(acomm.as_ref(), &mut st, self.grid().g2p(i, i))?;
        match st[0] {
            STATUS_OK => {}
            STATUS_NOT_DENSE => {
                return Err(BlrError::TileNotDense { i, j: i });
            }
            STATUS_NOT_FINITE => {
                return Err(BlrError::NonFiniteTile { i, j: i });
            }
            step => {
                return Err(BlrError::ZeroPivot {
                    block: i,
                    step: (step - 1) as usize,
                });
            }
        }
        // Pivot vector to the rest of the grid row.
        if self.grid().is_local_row(i) {
            let rcomm = self
                .grid()
                .row_comm()
                .ok_or(BlrError::Unsupported {
                    what: "factor called on an inactive rank",
                })?
                .clone();
            let mut p64: Vec<u64> = piv_i.iter().map(|&p| p as u64).collect();
            blockrank_comm::bcast_vec(rcomm.as_ref(), &mut p64, self.cg2p(i))?;
            piv_i = p64.into_iter().map(|p| p as usize).collect();
        }
        Ok(piv_i)
    }

    /// Panel solves of step `i` within this matrix: pivot application and
    /// unit-lower solves on tiles `(i, j > i)`, upper solves on tiles
    /// `(i' > i, i)`, with optional compression.
    fn panel_step(
        &mut self,
        i: usize,
        piv_i: &[usize],
        adm: Option<&Admissibility>,
        opts: &BlrOptions,
    ) -> Result<()> {
        let tasks = opts.task_recursion_cutoff_level;
        if self.grid().is_local_row(i) {
            // The whole block row is permuted, including the already-solved
            // factors left of the diagonal, as in a dense panel
            // factorization; solves against the returned pivot sequence stay
            // plain triangular solves.
            for j in 0..i {
                if self.grid().is_local_col(j) {
                    self.tile_mut(i, j)?.laswp(piv_i, true)?;
                }
            }
            let aii = self.bcast_dense_tile_along_row(i, i)?;
            for j in i + 1..self.colblocks() {
                if !self.grid().is_local_col(j) {
                    continue;
                }
                let tile = self.tile_mut(i, j)?;
                tile.laswp(piv_i, true)?;
                tile.trsm_b(
                    Side::Left,
                    UpLo::Lower,
                    Trans::NoTrans,
                    Diag::Unit,
                    T::one(),
                    aii.as_ref(),
                    tasks,
                )?;
                if adm.map_or(true, |a| a.at(i, j)) {
                    self.compress_tile(i, j, opts)?;
                }
            }
        }
        if self.grid().is_local_col(i) {
            let aii = self.bcast_dense_tile_along_col(i, i)?;
            for i2 in i + 1..self.rowblocks() {
                if !self.grid().is_local_row(i2) {
                    continue;
                }
                let tile = self.tile_mut(i2, i)?;
                tile.trsm_b(
                    Side::Right,
                    UpLo::Upper,
                    Trans::NoTrans,
                    Diag::NonUnit,
                    T::one(),
                    aii.as_ref(),
                    tasks,
                )?;
                if adm.map_or(true, |a| a.at(i2, i)) {
                    self.compress_tile(i2, i, opts)?;
                }
            }
        }
        Ok(())
    }

    /// Panel solves of step `i` on an off-diagonal block row (`A12` of a 2×2
    /// partitioning): pivots and unit-lower solves against `a11`'s diagonal
    /// tile, over every tile column, with compression.
    fn offdiag_row_panel_step(
        &mut self,
        a11: &Self,
        i: usize,
        piv_i: &[usize],
        opts: &BlrOptions,
    ) -> Result<()> {
        if !self.grid().is_local_row(i) {
            return Ok(());
        }
        let tasks = opts.task_recursion_cutoff_level;
        let aii = a11.bcast_dense_tile_along_row(i, i)?;
        for j in 0..self.colblocks() {
            if !self.grid().is_local_col(j) {
                continue;
            }
            let tile = self.tile_mut(i, j)?;
            tile.laswp(piv_i, true)?;
            tile.trsm_b(
                Side::Left,
                UpLo::Lower,
                Trans::NoTrans,
                Diag::Unit,
                T::one(),
                aii.as_ref(),
                tasks,
            )?;
            self.compress_tile(i, j, opts)?;
        }
        Ok(())
    }

    /// Panel solves of step `i` on an off-diagonal block column (`A21`):
    /// upper solves against `a11`'s diagonal tile, over every tile row, with
    /// compression.
    fn offdiag_col_panel_step(&mut self, a11: &Self, i: usize, opts: &BlrOptions) -> Result<()> {
        if !self.grid().is_local_col(i) {
            return Ok(());
        }
        let tasks = opts.task_recursion_cutoff_level;
        let aii = a11.bcast_dense_tile_along_col(i, i)?;
        for i2 in 0..self.rowblocks() {
            if !self.grid().is_local_row(i2) {
                continue;
            }
            let tile = self.tile_mut(i2, i)?;
            tile.trsm_b(
                Side::Right,
                UpLo::Upper,
                Trans::NoTrans,
                Diag::NonUnit,
                T::one(),
                aii.as_ref(),
                tasks,
            )?;
            self.compress_tile(i2, i, opts)?;
        }
        Ok(())
    }

    /// Rank-aware product accumulation `C(i,j) += α·L(i)·U(j)` on locally
    /// owned tiles in the given global tile range. `lcol` holds the
    /// broadcast left panel indexed by local tile row; `urow` the right
    /// panel indexed by local tile column. Low-rank destinations are
    /// materialized to dense scratch of the tile's shape; they are
    /// re-compressed when they later enter a panel.
    pub(crate) fn accumulate_panel_product(
        &mut self,
        i0: usize,
        i1: usize,
        j0: usize,
        j1: usize,
        lcol: &[Option<Tile<T>>],
        urow: &[Option<Tile<T>>],
        alpha: T,
        tasks: usize,
    ) -> Result<()> {
        for j in j0..j1 {
            if !self.grid().is_local_col(j) {
                continue;
            }
            let jl = self.tilecg2l(j);
            for i in i0..i1 {
                if !self.grid().is_local_row(i) {
                    continue;
                }
                let il = self.tilerg2l(i);
                let l = lcol[il].as_ref().ok_or(BlrError::NotLocal { i, j })?;
                let u = urow[jl].as_ref().ok_or(BlrError::NotLocal { i, j })?;
                self.densify_tile(i, j)?;
                let dest = self.tile_dense_mut(i, j)?;
                l.gemm_a(
                    Trans::NoTrans,
                    Trans::NoTrans,
                    alpha,
                    u,
                    T::one(),
                    dest.as_mut(),
                    tasks,
                )?;
            }
        }
        Ok(())
    }

    /// Schur update of the trailing tiles: `C ← C − L·U`.
    pub(crate) fn trailing_update(
        &mut self,
        i0: usize,
        i1: usize,
        j0: usize,
        j1: usize,
        lcol: &[Option<Tile<T>>],
        urow: &[Option<Tile<T>>],
        opts: &BlrOptions,
    ) -> Result<()> {
        self.accumulate_panel_product(
            i0,
            i1,
            j0,
            j1,
            lcol,
            urow,
            -T::one(),
            opts.task_recursion_cutoff_level,
        )
    }

    /// Combine per-block pivots written by the diagonal owners into the
    /// globally known concatenated vector.
    fn assemble_pivots(&self, mut piv: Vec<u64>) -> Result<Vec<usize>> {
        let acomm = self
            .grid()
            .active_comm()
            .ok_or(BlrError::Unsupported {
                what: "factor called on an inactive rank",
            })?
            .clone();
        blockrank_comm::allreduce_scalars(
            acomm.as_ref(),
            &mut piv,
            blockrank_comm::ReduceOp::Sum,
        )?;
        Ok(piv.into_iter().map(|p| p as usize).collect())
    }
}
