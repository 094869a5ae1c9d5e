//! 2D block-cyclic dense matrix and BLR import/export.
//!
//! `CyclicMatrix` plays the role of the ScaLAPACK-distributed dense matrix:
//! elements are dealt to the grid in `mb × nb` blocks, each rank holding its
//! share in a column-major local buffer. The BLR import/export walks the
//! tile partition and matches element owners on both sides through
//! owner-writes all-reduces on the grid communicator.

use std::sync::Arc;

use blockrank_comm::{allreduce_scalars, ProcessorGrid2D, ReduceOp};
use blockrank_dense::Matrix;

use crate::blr::{BlrMatrix, BlrScalar};
use crate::error::{BlrError, Result};
use crate::options::BlrOptions;
use crate::tile::Tile;

/// Block-cyclically distributed dense matrix on a 2D grid.
pub struct CyclicMatrix<T: BlrScalar> {
    rows: usize,
    cols: usize,
    mb: usize,
    nb: usize,
    lrows: usize,
    lcols: usize,
    data: Matrix<T>,
    grid: Arc<ProcessorGrid2D>,
}

impl<T: BlrScalar> CyclicMatrix<T> {
    /// Zero matrix of `rows × cols` dealt in `mb × nb` blocks.
    pub fn new(
        grid: Arc<ProcessorGrid2D>,
        rows: usize,
        cols: usize,
        mb: usize,
        nb: usize,
    ) -> Result<Self> {
        if mb == 0 || nb == 0 {
            return Err(BlrError::BadPartition {
                what: "block-cyclic block sizes must be positive",
            });
        }
        let (lrows, lcols) = if grid.active() {
            (
                Self::local_count(rows, mb, grid.nprows(), grid.prow()),
                Self::local_count(cols, nb, grid.npcols(), grid.pcol()),
            )
        } else {
            (0, 0)
        };
        Ok(Self {
            rows,
            cols,
            mb,
            nb,
            lrows,
            lcols,
            data: Matrix::zeros(lrows, lcols),
            grid,
        })
    }

    /// Build and fill from a generator on global coordinates.
    pub fn from_fn(
        grid: Arc<ProcessorGrid2D>,
        rows: usize,
        cols: usize,
        mb: usize,
        nb: usize,
        f: impl Fn(usize, usize) -> T,
    ) -> Result<Self> {
        let mut m = Self::new(grid, rows, cols, mb, nb)?;
        if m.grid.active() {
            for j in 0..cols {
                if !m.is_local_elem_col(j) {
                    continue;
                }
                let lj = m.cl2l(j);
                for i in 0..rows {
                    if m.is_local_elem_row(i) {
                        let li = m.rl2l(i);
                        m.data[[li, lj]] = f(i, j);
                    }
                }
            }
        }
        Ok(m)
    }

    fn local_count(n: usize, block: usize, np: usize, p: usize) -> usize {
        let mut count = 0;
        let nblocks = n.div_ceil(block);
        for b in 0..nblocks {
            if b % np == p {
                count += block.min(n - b * block);
            }
        }
        count
    }

    /// Global rows.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Global columns.
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Row block size.
    pub fn mb(&self) -> usize {
        self.mb
    }

    /// Column block size.
    pub fn nb(&self) -> usize {
        self.nb
    }

    /// Rows of the local buffer.
    pub fn lrows(&self) -> usize {
        self.lrows
    }

    /// Columns of the local buffer.
    pub fn lcols(&self) -> usize {
        self.lcols
    }

    /// Leading dimension of the local buffer.
    pub fn ld(&self) -> usize {
        self.data.ld()
    }

    /// The local buffer.
    pub fn local(&self) -> &Matrix<T> {
        &self.data
    }

    /// The local buffer, mutable.
    pub fn local_mut(&mut self) -> &mut Matrix<T> {
        &mut self.data
    }

    /// The grid this matrix is distributed over.
    pub fn grid(&self) -> &Arc<ProcessorGrid2D> {
        &self.grid
    }

    /// Grid row owning global row `i`.
    pub fn row_owner(&self, i: usize) -> usize {
        (i / self.mb) % self.grid.nprows()
    }

    /// Grid column owning global column `j`.
    pub fn col_owner(&self, j: usize) -> usize {
        (j / self.nb) % self.grid.npcols()
    }

    /// Whether global row `i` has elements on this rank.
    pub fn is_local_elem_row(&self, i: usize) -> bool {
        self.grid.active() && self.row_owner(i) == self.grid.prow()
    }

    /// Whether global column `j` has elements on this rank.
    pub fn is_local_elem_col(&self, j: usize) -> bool {
        self.grid.active() && self.col_owner(j) == self.grid.pcol()
    }

    /// Whether global element `(i, j)` is stored on this rank.
    pub fn is_local_elem(&self, i: usize, j: usize) -> bool {
        self.is_local_elem_row(i) && self.is_local_elem_col(j)
    }

    /// Local row index of a locally stored global row.
    pub fn rl2l(&self, i: usize) -> usize {
        (i / (self.mb * self.grid.nprows())) * self.mb + i % self.mb
    }

    /// Local column index of a locally stored global column.
    pub fn cl2l(&self, j: usize) -> usize {
        (j / (self.nb * self.grid.npcols())) * self.nb + j % self.nb
    }

    /// Element at global `(i, j)`; must be stored locally.
    pub fn global(&self, i: usize, j: usize) -> Result<T> {
        if !self.is_local_elem(i, j) {
            return Err(BlrError::NotLocal { i, j });
        }
        Ok(self.data[[self.rl2l(i), self.cl2l(j)]])
    }

    /// Write an element at global `(i, j)`; must be stored locally.
    pub fn set_global(&mut self, i: usize, j: usize, v: T) -> Result<()> {
        if !self.is_local_elem(i, j) {
            return Err(BlrError::NotLocal { i, j });
        }
        let (li, lj) = (self.rl2l(i), self.cl2l(j));
        self.data[[li, lj]] = v;
        Ok(())
    }

    /// Assemble the full matrix on every rank (collective; test-scale only).
    pub fn to_replicated(&self) -> Result<Matrix<T>> {
        let mut buf = vec![T::zero(); self.rows * self.cols];
        if self.grid.active() {
            for j in 0..self.cols {
                if !self.is_local_elem_col(j) {
                    continue;
                }
                for i in 0..self.rows {
                    if self.is_local_elem_row(i) {
                        buf[i + j * self.rows] = self.data[[self.rl2l(i), self.cl2l(j)]];
                    }
                }
            }
        }
        allreduce_scalars(self.grid.comm().as_ref(), &mut buf, ReduceOp::Sum)?;
        Ok(Matrix::from_col_major(self.rows, self.cols, buf))
    }
}

impl<T: BlrScalar> BlrMatrix<T> {
    /// Redistribute a block-cyclic dense matrix into a BLR matrix with the
    /// given tile partitions. All tiles come out dense; a collective on the
    /// grid communicator.
    pub fn from_block_cyclic(
        a: &CyclicMatrix<T>,
        grid: Arc<ProcessorGrid2D>,
        rt: &[usize],
        ct: &[usize],
    ) -> Result<Self> {
        if !Arc::ptr_eq(a.grid(), &grid) {
            return Err(BlrError::GridMismatch);
        }
        let mut blr = BlrMatrix::new(grid, rt, ct)?;
        if blr.rows() != a.rows() || blr.cols() != a.cols() {
            return Err(BlrError::PartitionMismatch {
                what: "tile partition does not cover the dense matrix",
            });
        }
        for tj in 0..blr.colblocks() {
            for ti in 0..blr.rowblocks() {
                let r0 = blr.tileroff(ti);
                let c0 = blr.tilecoff(tj);
                let m = blr.tilerows(ti);
                let n = blr.tilecols(tj);
                let mut buf = vec![T::zero(); m * n];
                for c in 0..n {
                    for r in 0..m {
                        if a.is_local_elem(r0 + r, c0 + c) {
                            buf[r + c * m] = a.global(r0 + r, c0 + c)?;
                        }
                    }
                }
                allreduce_scalars(blr.grid().comm().as_ref(), &mut buf, ReduceOp::Sum)?;
                if blr.grid().is_local(ti, tj) {
                    blr.set_tile(ti, tj, Tile::from_dense(Matrix::from_col_major(m, n, buf)))?;
                }
            }
        }
        Ok(blr)
    }

    /// Redistribute with a uniform partition of `opts.tile_size`.
    pub fn from_block_cyclic_opts(
        a: &CyclicMatrix<T>,
        grid: Arc<ProcessorGrid2D>,
        opts: &BlrOptions,
    ) -> Result<Self> {
        opts.validate()?;
        let rt = Self::uniform_partition(a.rows(), opts.tile_size);
        let ct = Self::uniform_partition(a.cols(), opts.tile_size);
        Self::from_block_cyclic(a, grid, &rt, &ct)
    }

    /// Redistribute this BLR matrix into a block-cyclic dense matrix on the
    /// same grid. Low-rank tiles are materialized. Collective on the grid
    /// communicator.
    pub fn to_block_cyclic(&self, out: &mut CyclicMatrix<T>) -> Result<()> {
        if !Arc::ptr_eq(out.grid(), self.grid()) {
            return Err(BlrError::GridMismatch);
        }
        if out.rows() != self.rows() || out.cols() != self.cols() {
            return Err(BlrError::PartitionMismatch {
                what: "destination dimensions",
            });
        }
        for tj in 0..self.colblocks() {
            for ti in 0..self.rowblocks() {
                let r0 = self.tileroff(ti);
                let c0 = self.tilecoff(tj);
                let m = self.tilerows(ti);
                let n = self.tilecols(tj);
                let mut buf = vec![T::zero(); m * n];
                if self.grid().is_local(ti, tj) {
                    let d = self.tile(ti, tj)?.to_dense()?;
                    buf.copy_from_slice(d.data());
                }
                allreduce_scalars(self.grid().comm().as_ref(), &mut buf, ReduceOp::Sum)?;
                for c in 0..n {
                    for r in 0..m {
                        if out.is_local_elem(r0 + r, c0 + c) {
                            out.set_global(r0 + r, c0 + c, buf[r + c * m])?;
                        }
                    }
                }
            }
        }
        Ok(())
    }
}
