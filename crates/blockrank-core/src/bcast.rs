//! Tile broadcasts along grid rows and columns.
//!
//! Dense diagonal blocks travel as raw scalar buffers (their dimensions are
//! known from the partition on every rank). Panel strips of mixed tiles are
//! serialized with the variant-preserving header, so receivers reconstruct
//! dense and low-rank tiles exactly as stored by the owner.

use blockrank_comm::{bcast_scalars, bcast_vec, Communicator};
use blockrank_dense::Matrix;

use crate::blr::{BlrMatrix, BlrScalar};
use crate::error::{BlrError, Result};
use crate::tile::Tile;

impl<T: BlrScalar> BlrMatrix<T> {
    /// Broadcast the dense tile `(i, j)` across its grid row. Every rank of
    /// grid row `rg2p(i)` must call this; others must not.
    pub(crate) fn bcast_dense_tile_along_row(&self, i: usize, j: usize) -> Result<Matrix<T>> {
        let comm = self
            .grid()
            .row_comm()
            .ok_or(BlrError::NotLocal { i, j })?
            .clone();
        self.bcast_dense_tile(comm.as_ref(), i, j, self.cg2p(j))
    }

    /// Broadcast the dense tile `(i, j)` across its grid column. Every rank
    /// of grid column `cg2p(j)` must call this; others must not.
    pub(crate) fn bcast_dense_tile_along_col(&self, i: usize, j: usize) -> Result<Matrix<T>> {
        let comm = self
            .grid()
            .col_comm()
            .ok_or(BlrError::NotLocal { i, j })?
            .clone();
        self.bcast_dense_tile(comm.as_ref(), i, j, self.rg2p(i))
    }

    fn bcast_dense_tile(
        &self,
        comm: &dyn Communicator,
        i: usize,
        j: usize,
        root: usize,
    ) -> Result<Matrix<T>> {
        let m = self.tilerows(i);
        let n = self.tilecols(j);
        let mut buf = if self.grid().is_local(i, j) {
            self.tile_dense(i, j)?.data().to_vec()
        } else {
            vec![T::zero(); m * n]
        };
        bcast_scalars(comm, &mut buf, root)?;
        Ok(Matrix::from_col_major(m, n, buf))
    }

    /// Broadcast tile row `i`, columns `[j0, j1)`, down the grid columns.
    /// A collective over every column sub-communicator; the result holds the
    /// received tiles indexed by local tile column.
    pub(crate) fn bcast_row_of_tiles_along_cols(
        &self,
        i: usize,
        j0: usize,
        j1: usize,
    ) -> Result<Vec<Option<Tile<T>>>> {
        let comm = match self.grid().col_comm() {
            Some(c) => c.clone(),
            None => return Ok(Vec::new()),
        };
        let root = self.rg2p(i);
        let mine = self.grid().is_local_row(i);
        let mut out: Vec<Option<Tile<T>>> = (0..self.colblockslocal()).map(|_| None).collect();
        for j in j0..j1 {
            if !self.grid().is_local_col(j) {
                continue;
            }
            let jl = self.tilecg2l(j);
            let mut bytes = if mine {
                self.tile(i, j)?.to_bytes()
            } else {
                Vec::new()
            };
            bcast_vec(comm.as_ref(), &mut bytes, root)?;
            out[jl] = Some(Tile::from_bytes(&bytes)?);
        }
        Ok(out)
    }

    /// Broadcast tile column `j`, rows `[i0, i1)`, across the grid rows.
    /// A collective over every row sub-communicator; the result holds the
    /// received tiles indexed by local tile row.
    pub(crate) fn bcast_col_of_tiles_along_rows(
        &self,
        i0: usize,
        i1: usize,
        j: usize,
    ) -> Result<Vec<Option<Tile<T>>>> {
        let comm = match self.grid().row_comm() {
            Some(c) => c.clone(),
            None => return Ok(Vec::new()),
        };
        let root = self.cg2p(j);
        let mine = self.grid().is_local_col(j);
        let mut out: Vec<Option<Tile<T>>> = (0..self.rowblockslocal()).map(|_| None).collect();
        for i in i0..i1 {
            if !self.grid().is_local_row(i) {
                continue;
            }
            let il = self.tilerg2l(i);
            let mut bytes = if mine {
                self.tile(i, j)?.to_bytes()
            } else {
                Vec::new()
            };
            bcast_vec(comm.as_ref(), &mut bytes, root)?;
            out[il] = Some(Tile::from_bytes(&bytes)?);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use blockrank_comm::{ProcessorGrid2D, ThreadComm};
    use blockrank_dense::Matrix;

    use crate::blr::BlrMatrix;
    use crate::tile::Tile;

    #[test]
    fn test_dense_tile_bcast_along_row_bitwise() {
        let results = ThreadComm::run(4, |comm| {
            let grid = Arc::new(ProcessorGrid2D::new(comm).unwrap());
            let mut a = BlrMatrix::<f64>::new(grid.clone(), &[2, 2], &[2, 2]).unwrap();
            a.fill_fn(|i, j| (i * 10 + j) as f64);
            if grid.is_local_row(0) {
                // Tile (0, 1) lives on grid column 1; every rank of grid
                // row 0 receives the same block.
                Some(a.bcast_dense_tile_along_row(0, 1).unwrap())
            } else {
                None
            }
        });
        let expect = Matrix::from_fn(2, 2, |i, j| (i * 10 + (j + 2)) as f64);
        let got: Vec<&Matrix<f64>> = results.iter().flatten().collect();
        assert_eq!(got.len(), 2);
        for m in got {
            assert_eq!(m, &expect);
        }
    }

    #[test]
    fn test_row_of_tiles_bcast_preserves_variant() {
        let results = ThreadComm::run(4, |comm| {
            let grid = Arc::new(ProcessorGrid2D::new(comm).unwrap());
            let mut a = BlrMatrix::<f64>::new(grid.clone(), &[2, 2], &[2, 2]).unwrap();
            a.fill_fn(|i, j| (i + j) as f64);
            if grid.is_local(0, 1) {
                let u = Matrix::from_fn(2, 1, |i, _| (i + 1) as f64);
                let v = Matrix::from_fn(1, 2, |_, j| (j + 3) as f64);
                a.set_tile(0, 1, Tile::from_factors(u, v).unwrap()).unwrap();
            }
            let tiles = a.bcast_row_of_tiles_along_cols(0, 0, 2).unwrap();
            // One local tile column per rank on the 2x2 grid.
            let t = tiles[0].as_ref().unwrap();
            (grid.pcol(), t.is_low_rank(), t.rank(), t.get(1, 1))
        });
        for (pcol, lr, rank, v11) in results {
            if pcol == 0 {
                assert!(!lr);
                assert_eq!(rank, 2);
                assert_eq!(v11, 2.0);
            } else {
                assert!(lr);
                assert_eq!(rank, 1);
                // U·V at (1, 1) = 2 * 4.
                assert_eq!(v11, 8.0);
            }
        }
    }

    #[test]
    fn test_col_of_tiles_bcast_range() {
        let results = ThreadComm::run(4, |comm| {
            let grid = Arc::new(ProcessorGrid2D::new(comm).unwrap());
            let mut a = BlrMatrix::<f64>::new(grid.clone(), &[2, 2, 2], &[2, 2, 2]).unwrap();
            a.fill_fn(|i, j| (100 * i + j) as f64);
            let tiles = a.bcast_col_of_tiles_along_rows(1, 3, 0).unwrap();
            let mut got = Vec::new();
            for (il, t) in tiles.iter().enumerate() {
                if let Some(t) = t {
                    got.push((il, t.get(0, 0)));
                }
            }
            (grid.prow(), got)
        });
        for (prow, got) in results {
            // Tile rows 1 and 2 of column 0; rows owned by this grid row.
            for (il, v) in got {
                let i = prow + il * 2;
                assert!(i >= 1);
                assert_eq!(v, (100 * (2 * i)) as f64);
            }
        }
    }
}
