//! The distributed block low-rank matrix.
//!
//! Tiles are distributed 2D block-cyclically: tile `(I, J)` lives on grid
//! position `(I mod Pr, J mod Pc)`. Each rank stores its tiles in
//! column-major order of local tile coordinates. Inactive ranks store
//! nothing.

use std::io::Write;
use std::sync::Arc;

use blockrank_comm::{allreduce_u64, CommElem, ProcessorGrid2D, ReduceOp};
use blockrank_dense::{Matrix, Scalar};

use crate::admissibility::Admissibility;
use crate::error::{BlrError, Result};
use crate::options::BlrOptions;
use crate::tile::Tile;

/// Scalar usable in a distributed BLR matrix: numeric and transportable.
pub trait BlrScalar: Scalar + CommElem {}

impl<T: Scalar + CommElem> BlrScalar for T {}

/// Distributed block low-rank matrix over a 2D process grid.
pub struct BlrMatrix<T: BlrScalar> {
    rows: usize,
    cols: usize,
    lrows: usize,
    lcols: usize,
    brows: usize,
    bcols: usize,
    lbrows: usize,
    lbcols: usize,
    roff: Vec<usize>,
    coff: Vec<usize>,
    rl2t: Vec<usize>,
    cl2t: Vec<usize>,
    rl2l: Vec<usize>,
    cl2l: Vec<usize>,
    rl2g: Vec<usize>,
    cl2g: Vec<usize>,
    blocks: Vec<Tile<T>>,
    grid: Arc<ProcessorGrid2D>,
}

fn offsets(tiles: &[usize]) -> Result<Vec<usize>> {
    if tiles.is_empty() {
        return Err(BlrError::BadPartition {
            what: "partition has no tiles",
        });
    }
    let mut off = Vec::with_capacity(tiles.len() + 1);
    off.push(0);
    for &t in tiles {
        if t == 0 {
            return Err(BlrError::BadPartition {
                what: "zero-size tile",
            });
        }
        off.push(off[off.len() - 1] + t);
    }
    Ok(off)
}

impl<T: BlrScalar> BlrMatrix<T> {
    /// Create a zero matrix with tile-size partitions `rt` (rows) and `ct`
    /// (columns), distributed over `grid`. Every tile starts dense.
    pub fn new(grid: Arc<ProcessorGrid2D>, rt: &[usize], ct: &[usize]) -> Result<Self> {
        let roff = offsets(rt)?;
        let coff = offsets(ct)?;
        let brows = rt.len();
        let bcols = ct.len();
        let rows = roff[brows];
        let cols = coff[bcols];

        let mut m = Self {
            rows,
            cols,
            lrows: 0,
            lcols: 0,
            brows,
            bcols,
            lbrows: 0,
            lbcols: 0,
            roff,
            coff,
            rl2t: Vec::new(),
            cl2t: Vec::new(),
            rl2l: Vec::new(),
            cl2l: Vec::new(),
            rl2g: Vec::new(),
            cl2g: Vec::new(),
            blocks: Vec::new(),
            grid,
        };
        if !m.grid.active() {
            return Ok(m);
        }
        for i in 0..brows {
            if m.grid.is_local_row(i) {
                m.lbrows += 1;
                for l in 0..m.tilerows(i) {
                    m.rl2t.push(i);
                    m.rl2l.push(l);
                    m.rl2g.push(m.roff[i] + l);
                }
            }
        }
        for j in 0..bcols {
            if m.grid.is_local_col(j) {
                m.lbcols += 1;
                for l in 0..m.tilecols(j) {
                    m.cl2t.push(j);
                    m.cl2l.push(l);
                    m.cl2g.push(m.coff[j] + l);
                }
            }
        }
        m.lrows = m.rl2g.len();
        m.lcols = m.cl2g.len();

        m.blocks.reserve(m.lbrows * m.lbcols);
        for jl in 0..m.lbcols {
            let j = m.grid.pcol() + jl * m.grid.npcols();
            for il in 0..m.lbrows {
                let i = m.grid.prow() + il * m.grid.nprows();
                let tile = Tile::zeros(m.tilerows(i), m.tilecols(j));
                m.blocks.push(tile);
            }
        }
        Ok(m)
    }

    /// Uniform tile-size partition of an `n`-long dimension.
    pub fn uniform_partition(n: usize, tile_size: usize) -> Vec<usize> {
        let mut parts = Vec::new();
        let mut left = n;
        while left > 0 {
            let t = tile_size.min(left);
            parts.push(t);
            left -= t;
        }
        parts
    }

    /// Global rows.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Global columns.
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Rows stored on this rank.
    pub fn lrows(&self) -> usize {
        self.lrows
    }

    /// Columns stored on this rank.
    pub fn lcols(&self) -> usize {
        self.lcols
    }

    /// Tile rows of the partition.
    pub fn rowblocks(&self) -> usize {
        self.brows
    }

    /// Tile columns of the partition.
    pub fn colblocks(&self) -> usize {
        self.bcols
    }

    /// Tile rows stored on this rank.
    pub fn rowblockslocal(&self) -> usize {
        self.lbrows
    }

    /// Tile columns stored on this rank.
    pub fn colblockslocal(&self) -> usize {
        self.lbcols
    }

    /// Height of tile row `i`.
    pub fn tilerows(&self, i: usize) -> usize {
        self.roff[i + 1] - self.roff[i]
    }

    /// Width of tile column `j`.
    pub fn tilecols(&self, j: usize) -> usize {
        self.coff[j + 1] - self.coff[j]
    }

    /// First global row of tile row `i`.
    pub fn tileroff(&self, i: usize) -> usize {
        self.roff[i]
    }

    /// First global column of tile column `j`.
    pub fn tilecoff(&self, j: usize) -> usize {
        self.coff[j]
    }

    /// Row offset sequence, length `rowblocks() + 1`.
    pub fn row_offsets(&self) -> &[usize] {
        &self.roff
    }

    /// Column offset sequence, length `colblocks() + 1`.
    pub fn col_offsets(&self) -> &[usize] {
        &self.coff
    }

    /// The process grid (referenced, not owned).
    pub fn grid(&self) -> &Arc<ProcessorGrid2D> {
        &self.grid
    }

    /// Whether this rank holds a grid position.
    pub fn active(&self) -> bool {
        self.grid.active()
    }

    /// Grid row owning tile row `i`.
    pub fn rg2p(&self, i: usize) -> usize {
        self.grid.rg2p(i)
    }

    /// Grid column owning tile column `j`.
    pub fn cg2p(&self, j: usize) -> usize {
        self.grid.cg2p(j)
    }

    /// Global row of local row `i`.
    pub fn rl2g(&self, i: usize) -> usize {
        self.rl2g[i]
    }

    /// Global column of local column `j`.
    pub fn cl2g(&self, j: usize) -> usize {
        self.cl2g[j]
    }

    /// Tile row of global row `i`.
    pub fn rg2t(&self, i: usize) -> usize {
        match self.roff.binary_search(&i) {
            Ok(t) => t,
            Err(t) => t - 1,
        }
    }

    /// Tile column of global column `j`.
    pub fn cg2t(&self, j: usize) -> usize {
        match self.coff.binary_search(&j) {
            Ok(t) => t,
            Err(t) => t - 1,
        }
    }

    pub(crate) fn tilerg2l(&self, i: usize) -> usize {
        debug_assert!(self.grid.is_local_row(i));
        i / self.grid.nprows()
    }

    pub(crate) fn tilecg2l(&self, j: usize) -> usize {
        debug_assert!(self.grid.is_local_col(j));
        j / self.grid.npcols()
    }

    /// Locally stored tile `(i, j)` by global tile coordinates.
    pub fn tile(&self, i: usize, j: usize) -> Result<&Tile<T>> {
        if !self.grid.is_local(i, j) {
            return Err(BlrError::NotLocal { i, j });
        }
        Ok(self.ltile(self.tilerg2l(i), self.tilecg2l(j)))
    }

    /// Locally stored tile `(i, j)`, mutable.
    pub fn tile_mut(&mut self, i: usize, j: usize) -> Result<&mut Tile<T>> {
        if !self.grid.is_local(i, j) {
            return Err(BlrError::NotLocal { i, j });
        }
        let il = self.tilerg2l(i);
        let jl = self.tilecg2l(j);
        Ok(self.ltile_mut(il, jl))
    }

    /// Replace the locally stored tile `(i, j)`.
    pub fn set_tile(&mut self, i: usize, j: usize, tile: Tile<T>) -> Result<()> {
        if tile.rows() != self.tilerows(i) || tile.cols() != self.tilecols(j) {
            return Err(BlrError::PartitionMismatch {
                what: "tile dimensions",
            });
        }
        *self.tile_mut(i, j)? = tile;
        Ok(())
    }

    /// The dense block of tile `(i, j)`, failing on a low-rank tile.
    pub fn tile_dense(&self, i: usize, j: usize) -> Result<&Matrix<T>> {
        match self.tile(i, j)? {
            Tile::Dense(t) => Ok(t.d()),
            Tile::LowRank(_) => Err(BlrError::TileNotDense { i, j }),
        }
    }

    /// The dense block of tile `(i, j)`, mutable.
    pub fn tile_dense_mut(&mut self, i: usize, j: usize) -> Result<&mut Matrix<T>> {
        match self.tile_mut(i, j)? {
            Tile::Dense(t) => Ok(t.d_mut()),
            Tile::LowRank(_) => Err(BlrError::TileNotDense { i, j }),
        }
    }

    /// Materialize tile `(i, j)` in place if it is low-rank.
    pub fn densify_tile(&mut self, i: usize, j: usize) -> Result<()> {
        let tile = self.tile(i, j)?;
        if tile.is_low_rank() {
            let d = tile.to_dense()?;
            *self.tile_mut(i, j)? = Tile::from_dense(d);
        }
        Ok(())
    }

    pub(crate) fn ltile(&self, il: usize, jl: usize) -> &Tile<T> {
        &self.blocks[il + jl * self.lbrows]
    }

    pub(crate) fn ltile_mut(&mut self, il: usize, jl: usize) -> &mut Tile<T> {
        &mut self.blocks[il + jl * self.lbrows]
    }

    /// Iterate over locally stored tile coordinates (global `(i, j)` pairs),
    /// in column-major local order.
    pub fn local_tiles(&self) -> Vec<(usize, usize)> {
        let mut out = Vec::with_capacity(self.lbrows * self.lbcols);
        for jl in 0..self.lbcols {
            let j = self.grid.pcol() + jl * self.grid.npcols();
            for il in 0..self.lbrows {
                let i = self.grid.prow() + il * self.grid.nprows();
                out.push((i, j));
            }
        }
        out
    }

    /// Set every locally stored tile to the dense constant `v`.
    pub fn fill(&mut self, v: T) {
        self.fill_fn(|_, _| v);
    }

    /// Fill locally stored tiles element-wise from a generator on global
    /// coordinates. Tiles become dense.
    pub fn fill_fn(&mut self, f: impl Fn(usize, usize) -> T) {
        for (il, jl, i, j) in self.local_tile_indices() {
            let r0 = self.tileroff(i);
            let c0 = self.tilecoff(j);
            let d = Matrix::from_fn(self.tilerows(i), self.tilecols(j), |r, c| {
                f(r0 + r, c0 + c)
            });
            *self.ltile_mut(il, jl) = Tile::from_dense(d);
        }
    }

    fn local_tile_indices(&self) -> Vec<(usize, usize, usize, usize)> {
        let mut out = Vec::with_capacity(self.lbrows * self.lbcols);
        for jl in 0..self.lbcols {
            let j = self.grid.pcol() + jl * self.grid.npcols();
            for il in 0..self.lbrows {
                let i = self.grid.prow() + il * self.grid.nprows();
                out.push((il, jl, i, j));
            }
        }
        out
    }

    /// Element at local indices `(i, j)`; works for both tile variants.
    pub fn local(&self, i: usize, j: usize) -> Result<T> {
        if i >= self.lrows || j >= self.lcols {
            return Err(BlrError::NotLocal { i, j });
        }
        let tile = self.ltile(self.rl2t[i] / self.grid.nprows(), self.cl2t[j] / self.grid.npcols());
        Ok(tile.get(self.rl2l[i], self.cl2l[j]))
    }

    /// Element at global indices `(i, j)`; the element must be stored
    /// locally.
    pub fn global(&self, i: usize, j: usize) -> Result<T> {
        let ti = self.rg2t(i);
        let tj = self.cg2t(j);
        let tile = self.tile(ti, tj)?;
        Ok(tile.get(i - self.roff[ti], j - self.coff[tj]))
    }

    /// Write an element at global indices; the holding tile must be local
    /// and dense.
    pub fn set_global(&mut self, i: usize, j: usize, v: T) -> Result<()> {
        let ti = self.rg2t(i);
        let tj = self.cg2t(j);
        let (li, lj) = (i - self.roff[ti], j - self.coff[tj]);
        let d = self.tile_dense_mut(ti, tj)?;
        d[[li, lj]] = v;
        Ok(())
    }

    /// Scalars stored on this rank.
    pub fn memory(&self) -> usize {
        self.blocks.iter().map(|t| t.memory()).sum()
    }

    /// Nonzeros stored on this rank.
    pub fn nonzeros(&self) -> usize {
        self.blocks.iter().map(|t| t.nonzeros()).sum()
    }

    /// Largest tile rank on this rank.
    pub fn rank(&self) -> usize {
        self.blocks.iter().map(|t| t.rank()).max().unwrap_or(0)
    }

    /// Scalars stored across all ranks (collective on the full
    /// communicator).
    pub fn total_memory(&self) -> Result<usize> {
        let v = allreduce_u64(self.grid.comm().as_ref(), self.memory() as u64, ReduceOp::Sum)?;
        Ok(v as usize)
    }

    /// Nonzeros across all ranks (collective).
    pub fn total_nonzeros(&self) -> Result<usize> {
        let v = allreduce_u64(
            self.grid.comm().as_ref(),
            self.nonzeros() as u64,
            ReduceOp::Sum,
        )?;
        Ok(v as usize)
    }

    /// Largest tile rank across all ranks (collective).
    pub fn max_rank(&self) -> Result<usize> {
        let v = allreduce_u64(self.grid.comm().as_ref(), self.rank() as u64, ReduceOp::Max)?;
        Ok(v as usize)
    }

    /// Apply a concatenated pivot sequence block-row-wise. `piv` has length
    /// `rows()`; entry `k` inside block row `I` names a global row within
    /// the same block.
    pub fn laswp(&mut self, piv: &[usize], fwd: bool) -> Result<()> {
        if !self.active() {
            return Ok(());
        }
        if piv.len() != self.rows {
            return Err(BlrError::PartitionMismatch {
                what: "pivot vector length",
            });
        }
        for i in 0..self.brows {
            if !self.grid.is_local_row(i) {
                continue;
            }
            let lo = self.roff[i];
            let hi = self.roff[i + 1];
            let mut local = Vec::with_capacity(hi - lo);
            for k in lo..hi {
                let p = piv[k];
                if p < lo || p >= hi {
                    return Err(BlrError::PartitionMismatch {
                        what: "pivot crosses block row boundary",
                    });
                }
                local.push(p - lo);
            }
            for j in 0..self.bcols {
                if self.grid.is_local_col(j) {
                    self.tile_mut(i, j)?.laswp(&local, fwd)?;
                }
            }
        }
        Ok(())
    }

    /// Compress locally owned strictly off-diagonal tiles (default
    /// admissibility).
    pub fn compress(&mut self, opts: &BlrOptions) -> Result<()> {
        let adm = Admissibility::weak(self.brows, self.bcols);
        self.compress_with(&adm, opts)
    }

    /// Compress locally owned tiles marked admissible.
    pub fn compress_with(&mut self, adm: &Admissibility, opts: &BlrOptions) -> Result<()> {
        opts.validate()?;
        if adm.brows() != self.brows || adm.bcols() != self.bcols {
            return Err(BlrError::PartitionMismatch {
                what: "admissibility dimensions",
            });
        }
        for (i, j) in self.local_tiles() {
            if i != j && adm.at(i, j) {
                self.compress_tile(i, j, opts)?;
            }
        }
        Ok(())
    }

    /// Try to compress one locally owned tile; the dense tile is replaced
    /// only when the factored form is smaller (`r·(m+n) < m·n`). Low-rank
    /// tiles are left alone.
    pub(crate) fn compress_tile(&mut self, i: usize, j: usize, opts: &BlrOptions) -> Result<()> {
        let (candidate, converged) = match self.tile(i, j)? {
            Tile::LowRank(_) => return Ok(()),
            Tile::Dense(t) => Tile::compressed(t.d().as_ref(), opts)?,
        };
        if !converged && opts.verbosity > 0 {
            println!(
                "# tile ({}, {}): compression stopped at rank {} before reaching tolerance",
                i,
                j,
                candidate.rank()
            );
        }
        let (m, n) = (candidate.rows(), candidate.cols());
        if candidate.rank() * (m + n) < m * n {
            *self.tile_mut(i, j)? = candidate;
        }
        Ok(())
    }

    /// Write a gnuplot-style dump: one rectangle per locally stored tile,
    /// colored by rank over block size.
    pub fn draw<W: Write>(&self, out: &mut W) -> std::io::Result<()> {
        for (i, j) in self.local_tiles() {
            let tile = match self.tile(i, j) {
                Ok(t) => t,
                Err(_) => continue,
            };
            let minmn = tile.rows().min(tile.cols()).max(1);
            let red = (255 * tile.rank().min(minmn)) / minmn;
            let blue = 255 - red;
            writeln!(
                out,
                "set obj rect from {}, {} to {}, {} fc rgb '#{:02x}00{:02x}'",
                self.tileroff(i),
                self.tilecoff(j),
                self.tileroff(i) + tile.rows(),
                self.tilecoff(j) + tile.cols(),
                red,
                blue
            )?;
        }
        Ok(())
    }

    /// Print the local tile structure.
    pub fn print(&self, name: &str) {
        println!(
            "# {} on rank {}: {}x{} ({}x{} tiles, {}x{} local)",
            name,
            self.grid.rank(),
            self.rows,
            self.cols,
            self.brows,
            self.bcols,
            self.lbrows,
            self.lbcols
        );
        for (i, j) in self.local_tiles() {
            if let Ok(t) = self.tile(i, j) {
                let kind = if t.is_low_rank() { "lr" } else { "dense" };
                println!("#   tile ({}, {}): {}x{} {} rank {}", i, j, t.rows(), t.cols(), kind, t.rank());
            }
        }
    }

    /// Check that two matrices share a grid.
    pub(crate) fn same_grid(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.grid, &other.grid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blockrank_comm::SelfComm;

    fn grid1() -> Arc<ProcessorGrid2D> {
        Arc::new(ProcessorGrid2D::new(Arc::new(SelfComm)).unwrap())
    }

    #[test]
    fn test_construction_and_maps() {
        let g = grid1();
        let a = BlrMatrix::<f64>::new(g, &[2, 3], &[1, 4]).unwrap();
        assert_eq!(a.rows(), 5);
        assert_eq!(a.cols(), 5);
        assert_eq!(a.rowblocks(), 2);
        assert_eq!(a.colblocks(), 2);
        assert_eq!(a.tilerows(1), 3);
        assert_eq!(a.tilecoff(1), 1);
        assert_eq!(a.lrows(), 5);
        assert_eq!(a.rg2t(0), 0);
        assert_eq!(a.rg2t(2), 1);
        assert_eq!(a.rg2t(4), 1);
        assert_eq!(a.cg2t(1), 1);
    }

    #[test]
    fn test_tile_dimensions_invariant() {
        let g = grid1();
        let a = BlrMatrix::<f64>::new(g, &[2, 3], &[4, 1]).unwrap();
        for (i, j) in a.local_tiles() {
            let t = a.tile(i, j).unwrap();
            assert_eq!(t.rows(), a.tilerows(i));
            assert_eq!(t.cols(), a.tilecols(j));
        }
    }

    #[test]
    fn test_bad_partition() {
        let g = grid1();
        assert!(BlrMatrix::<f64>::new(g.clone(), &[], &[1]).is_err());
        assert!(BlrMatrix::<f64>::new(g, &[1, 0], &[1]).is_err());
    }

    #[test]
    fn test_fill_fn_and_access() {
        let g = grid1();
        let mut a = BlrMatrix::<f64>::new(g, &[2, 2], &[2, 2]).unwrap();
        a.fill_fn(|i, j| (10 * i + j) as f64);
        assert_eq!(a.global(3, 1).unwrap(), 31.0);
        assert_eq!(a.local(2, 3).unwrap(), 23.0);
        a.set_global(0, 0, -5.0).unwrap();
        assert_eq!(a.global(0, 0).unwrap(), -5.0);
    }

    #[test]
    fn test_memory_counts() {
        let g = grid1();
        let mut a = BlrMatrix::<f64>::new(g, &[4, 4], &[4, 4]).unwrap();
        assert_eq!(a.memory(), 64);
        // Replace an off-diagonal tile with a rank-1 factorization.
        let u = Matrix::from_fn(4, 1, |i, _| i as f64);
        let v = Matrix::from_fn(1, 4, |_, j| j as f64);
        a.set_tile(0, 1, Tile::from_factors(u, v).unwrap()).unwrap();
        assert_eq!(a.memory(), 48 + 8);
        assert_eq!(a.rank(), 4);
        assert_eq!(a.total_memory().unwrap(), 56);
    }

    #[test]
    fn test_laswp_roundtrip() {
        let g = grid1();
        let mut a = BlrMatrix::<f64>::new(g, &[2, 2], &[2, 2]).unwrap();
        a.fill_fn(|i, j| (i * 4 + j) as f64);
        let before: Vec<f64> = (0..4)
            .flat_map(|i| (0..4).map(move |j| (i, j)))
            .map(|(i, j)| a.global(i, j).unwrap())
            .collect();
        // Swap within each block row.
        let piv = vec![1, 1, 3, 3];
        a.laswp(&piv, true).unwrap();
        assert_ne!(a.global(0, 0).unwrap(), before[0]);
        a.laswp(&piv, false).unwrap();
        let after: Vec<f64> = (0..4)
            .flat_map(|i| (0..4).map(move |j| (i, j)))
            .map(|(i, j)| a.global(i, j).unwrap())
            .collect();
        assert_eq!(before, after);
    }

    #[test]
    fn test_laswp_rejects_cross_block_pivot() {
        let g = grid1();
        let mut a = BlrMatrix::<f64>::new(g, &[2, 2], &[2, 2]).unwrap();
        let piv = vec![2, 1, 2, 3];
        assert!(a.laswp(&piv, true).is_err());
    }

    #[test]
    fn test_compress_respects_diagonal() {
        let g = grid1();
        let mut a = BlrMatrix::<f64>::new(g, &[4, 4], &[4, 4]).unwrap();
        // Rank-1 data everywhere.
        a.fill_fn(|i, j| ((i + 1) * (j + 1)) as f64);
        let opts = BlrOptions::default().with_rel_tol(1e-10);
        a.compress(&opts).unwrap();
        assert!(!a.tile(0, 0).unwrap().is_low_rank());
        assert!(!a.tile(1, 1).unwrap().is_low_rank());
        assert!(a.tile(0, 1).unwrap().is_low_rank());
        assert_eq!(a.tile(0, 1).unwrap().rank(), 1);
        assert!(a.tile(1, 0).unwrap().is_low_rank());
    }

    #[test]
    fn test_compress_keeps_dense_when_not_worth_it() {
        let g = grid1();
        let mut a = BlrMatrix::<f64>::new(g, &[3, 3], &[3, 3]).unwrap();
        // Full-rank random-ish data: factored form would not be smaller.
        a.fill_fn(|i, j| ((7 * i + 5 * j + 3) % 11) as f64 - 5.0);
        let opts = BlrOptions::default().with_rel_tol(1e-14).with_abs_tol(0.0);
        a.compress(&opts).unwrap();
        assert!(!a.tile(0, 1).unwrap().is_low_rank());
    }

    #[test]
    fn test_draw_writes_rects() {
        let g = grid1();
        let a = BlrMatrix::<f64>::new(g, &[2, 2], &[2, 2]).unwrap();
        let mut out = Vec::new();
        a.draw(&mut out).unwrap();
        let s = String::from_utf8(out).unwrap();
        assert_eq!(s.lines().count(), 4);
        assert!(s.contains("set obj rect from 0, 0 to 2, 2"));
    }
}
