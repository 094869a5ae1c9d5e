//! Tiles: dense or low-rank blocks with a uniform numeric operation set.
//!
//! The double dispatch of the product kernels is enumerated explicitly over
//! the four variant pairs, so each combination forms its intermediates in
//! rank-sized space: whenever either operand has rank `r`, a product against
//! an `m×n` block costs `O(r·(m+n))` scratch instead of `O(m·n)`.

use blockrank_dense::{
    gemm, gemv, laswp, trsm, DenseError, Diag, Matrix, MatrixMut, MatrixRef, Scalar, Side, Trans,
    UpLo,
};
use blockrank_lowrank::{aca, rrqr};

use crate::error::{BlrError, Result};
use crate::options::{BlrOptions, LowRankAlgorithm};

/// Dense tile: a full `m×n` block.
#[derive(Debug, Clone)]
pub struct DenseTile<T: Scalar> {
    d: Matrix<T>,
}

/// Low-rank tile: factors `U (m×r)` and `V (r×n)`.
#[derive(Debug, Clone)]
pub struct LrTile<T: Scalar> {
    u: Matrix<T>,
    v: Matrix<T>,
}

/// A block of a BLR matrix, dense or compressed.
#[derive(Debug, Clone)]
pub enum Tile<T: Scalar> {
    /// Full block.
    Dense(DenseTile<T>),
    /// Factored block `U·V`.
    LowRank(LrTile<T>),
}

const TAG_DENSE: u8 = 0;
const TAG_LOW_RANK: u8 = 1;
const HEADER_LEN: usize = 13;

impl<T: Scalar> DenseTile<T> {
    /// The stored block.
    pub fn d(&self) -> &Matrix<T> {
        &self.d
    }

    /// The stored block, mutable.
    pub fn d_mut(&mut self) -> &mut Matrix<T> {
        &mut self.d
    }
}

impl<T: Scalar> LrTile<T> {
    /// Left factor `U`.
    pub fn u(&self) -> &Matrix<T> {
        &self.u
    }

    /// Right factor `V`.
    pub fn v(&self) -> &Matrix<T> {
        &self.v
    }
}

impl<T: Scalar> Tile<T> {
    /// Zero-filled dense tile.
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Tile::Dense(DenseTile {
            d: Matrix::zeros(rows, cols),
        })
    }

    /// Dense tile around an existing block.
    pub fn from_dense(d: Matrix<T>) -> Self {
        Tile::Dense(DenseTile { d })
    }

    /// Low-rank tile from factors; the rank may not exceed the block size.
    pub fn from_factors(u: Matrix<T>, v: Matrix<T>) -> Result<Self> {
        let r = u.cols();
        if v.rows() != r {
            return Err(BlrError::Dense(DenseError::ShapeMismatch {
                op: "from_factors",
                lhs_rows: u.rows(),
                lhs_cols: u.cols(),
                rhs_rows: v.rows(),
                rhs_cols: v.cols(),
            }));
        }
        if r > u.rows().min(v.cols()) {
            return Err(BlrError::RankExceedsTile {
                rank: r,
                rows: u.rows(),
                cols: v.cols(),
            });
        }
        Ok(Tile::LowRank(LrTile { u, v }))
    }

    /// Compress a dense block with the configured algorithm. Returns the
    /// candidate low-rank tile and whether the tolerance was actually met
    /// (RRQR under its rank cap, or a converged ACA run).
    pub fn compressed(t: MatrixRef<'_, T>, opts: &BlrOptions) -> Result<(Self, bool)> {
        let max_rank = opts.max_rank.min(t.rows()).min(t.cols());
        match opts.low_rank_algorithm {
            LowRankAlgorithm::Rrqr => {
                let (u, v) = rrqr(t, opts.rel_tol, opts.abs_tol, max_rank)?;
                let hit_cap = u.cols() == max_rank && max_rank < t.rows().min(t.cols());
                Ok((Tile::LowRank(LrTile { u, v }), !hit_cap))
            }
            LowRankAlgorithm::Aca => {
                let approx = aca(
                    t.rows(),
                    t.cols(),
                    |i, j| t.at(i, j),
                    opts.rel_tol,
                    opts.abs_tol,
                    max_rank,
                )?;
                let converged = approx.converged;
                Ok((
                    Tile::LowRank(LrTile {
                        u: approx.u,
                        v: approx.v,
                    }),
                    converged,
                ))
            }
        }
    }

    /// Block rows.
    pub fn rows(&self) -> usize {
        match self {
            Tile::Dense(t) => t.d.rows(),
            Tile::LowRank(t) => t.u.rows(),
        }
    }

    /// Block columns.
    pub fn cols(&self) -> usize {
        match self {
            Tile::Dense(t) => t.d.cols(),
            Tile::LowRank(t) => t.v.cols(),
        }
    }

    /// Rank: `r` for low-rank tiles, `min(m, n)` for dense ones.
    pub fn rank(&self) -> usize {
        match self {
            Tile::Dense(t) => t.d.rows().min(t.d.cols()),
            Tile::LowRank(t) => t.u.cols(),
        }
    }

    /// Whether this is the factored variant.
    pub fn is_low_rank(&self) -> bool {
        matches!(self, Tile::LowRank(_))
    }

    /// Scalars held: `m·n` dense, `r·(m+n)` low-rank.
    pub fn memory(&self) -> usize {
        match self {
            Tile::Dense(t) => t.d.memory(),
            Tile::LowRank(t) => t.u.memory() + t.v.memory(),
        }
    }

    /// Nonzero count, same accounting as [`memory`](Self::memory).
    pub fn nonzeros(&self) -> usize {
        self.memory()
    }

    /// Materialize into `out`.
    pub fn dense_into(&self, mut out: MatrixMut<'_, T>, tasks: usize) -> Result<()> {
        match self {
            Tile::Dense(t) => out.copy_from(t.d.as_ref())?,
            Tile::LowRank(t) => gemm(
                Trans::NoTrans,
                Trans::NoTrans,
                T::one(),
                t.u.as_ref(),
                t.v.as_ref(),
                T::zero(),
                out,
                tasks,
            )?,
        }
        Ok(())
    }

    /// Materialize into a fresh matrix.
    pub fn to_dense(&self) -> Result<Matrix<T>> {
        let mut out = Matrix::zeros(self.rows(), self.cols());
        self.dense_into(out.as_mut(), 0)?;
        Ok(out)
    }

    /// Element `(i, j)`; low-rank tiles form the inner product
    /// `⟨U(i,·), V(·,j)⟩`.
    pub fn get(&self, i: usize, j: usize) -> T {
        match self {
            Tile::Dense(t) => t.d[[i, j]],
            Tile::LowRank(t) => {
                let r = t.u.cols();
                if r == 0 {
                    return T::zero();
                }
                blockrank_dense::dotu(r, &t.u.data()[i..], t.u.rows(), t.v.col(j), 1)
            }
        }
    }

    /// Scale the tile by `alpha` (the `U` factor for low-rank tiles).
    pub fn scale(&mut self, alpha: T) {
        match self {
            Tile::Dense(t) => t.d.scale(alpha),
            Tile::LowRank(t) => t.u.scale(alpha),
        }
    }

    /// Permute block rows: the whole block for dense tiles, the rows of `U`
    /// for low-rank ones.
    pub fn laswp(&mut self, piv: &[usize], fwd: bool) -> Result<()> {
        match self {
            Tile::Dense(t) => laswp(t.d.as_mut(), piv, fwd)?,
            Tile::LowRank(t) => laswp(t.u.as_mut(), piv, fwd)?,
        }
        Ok(())
    }

    /// Multiply by the inverse of triangular `a`: acts on the whole block for
    /// dense tiles; on `U` (left) or `V` (right) for low-rank ones.
    pub fn trsm_b(
        &mut self,
        side: Side,
        uplo: UpLo,
        ta: Trans,
        diag: Diag,
        alpha: T,
        a: MatrixRef<'_, T>,
        tasks: usize,
    ) -> Result<()> {
        match self {
            Tile::Dense(t) => trsm(side, uplo, ta, diag, alpha, a, t.d.as_mut(), tasks)?,
            Tile::LowRank(t) => match side {
                Side::Left => trsm(side, uplo, ta, diag, alpha, a, t.u.as_mut(), tasks)?,
                Side::Right => trsm(side, uplo, ta, diag, alpha, a, t.v.as_mut(), tasks)?,
            },
        }
        Ok(())
    }

    /// `y ← α·op(T)·x + β·y` with strided vectors.
    pub fn gemv_a(
        &self,
        ta: Trans,
        alpha: T,
        x: &[T],
        incx: usize,
        beta: T,
        y: &mut [T],
        incy: usize,
    ) -> Result<()> {
        match self {
            Tile::Dense(t) => gemv(ta, alpha, t.d.as_ref(), x, incx, beta, y, incy)?,
            Tile::LowRank(t) => {
                let r = t.u.cols();
                let mut tmp = vec![T::zero(); r];
                match ta {
                    Trans::NoTrans => {
                        gemv(ta, T::one(), t.v.as_ref(), x, incx, T::zero(), &mut tmp, 1)?;
                        gemv(ta, alpha, t.u.as_ref(), &tmp, 1, beta, y, incy)?;
                    }
                    Trans::Trans | Trans::ConjTrans => {
                        gemv(ta, T::one(), t.u.as_ref(), x, incx, T::zero(), &mut tmp, 1)?;
                        gemv(ta, alpha, t.v.as_ref(), &tmp, 1, beta, y, incy)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Rows of `op(T)`.
    pub fn op_rows(&self, ta: Trans) -> usize {
        match ta {
            Trans::NoTrans => self.rows(),
            Trans::Trans | Trans::ConjTrans => self.cols(),
        }
    }

    /// Columns of `op(T)`.
    pub fn op_cols(&self, ta: Trans) -> usize {
        match ta {
            Trans::NoTrans => self.cols(),
            Trans::Trans | Trans::ConjTrans => self.rows(),
        }
    }

    /// `C ← α·op(self)·op(b) + β·C`, dispatching over both variants.
    pub fn gemm_a(
        &self,
        ta: Trans,
        tb: Trans,
        alpha: T,
        b: &Tile<T>,
        beta: T,
        c: MatrixMut<'_, T>,
        tasks: usize,
    ) -> Result<()> {
        gemm_tiles(ta, tb, alpha, self, b, beta, c, tasks)
    }

    /// Subtract column `col` of `self·b` from the strided vector `c`.
    pub fn schur_update_col(
        &self,
        col: usize,
        b: &Tile<T>,
        c: &mut [T],
        incc: usize,
    ) -> Result<()> {
        let k = self.cols();
        if b.rows() != k || col >= b.cols() {
            return Err(BlrError::Dense(DenseError::ShapeMismatch {
                op: "schur_update_col",
                lhs_rows: self.rows(),
                lhs_cols: k,
                rhs_rows: b.rows(),
                rhs_cols: b.cols(),
            }));
        }
        let minus = -T::one();
        let one = T::one();
        let zero = T::zero();
        // Column `col` of b, shrunk to rank size when b is low-rank.
        match (self, b) {
            (Tile::Dense(a), Tile::Dense(bt)) => {
                gemv(Trans::NoTrans, minus, a.d.as_ref(), bt.d.col(col), 1, one, c, incc)?;
            }
            (Tile::Dense(a), Tile::LowRank(bt)) => {
                let mut t = vec![zero; bt.u.rows()];
                gemv(Trans::NoTrans, one, bt.u.as_ref(), bt.v.col(col), 1, zero, &mut t, 1)?;
                gemv(Trans::NoTrans, minus, a.d.as_ref(), &t, 1, one, c, incc)?;
            }
            (Tile::LowRank(a), Tile::Dense(bt)) => {
                let mut t = vec![zero; a.v.rows()];
                gemv(Trans::NoTrans, one, a.v.as_ref(), bt.d.col(col), 1, zero, &mut t, 1)?;
                gemv(Trans::NoTrans, minus, a.u.as_ref(), &t, 1, one, c, incc)?;
            }
            (Tile::LowRank(a), Tile::LowRank(bt)) => {
                let mut t1 = vec![zero; bt.u.rows()];
                gemv(Trans::NoTrans, one, bt.u.as_ref(), bt.v.col(col), 1, zero, &mut t1, 1)?;
                let mut t2 = vec![zero; a.v.rows()];
                gemv(Trans::NoTrans, one, a.v.as_ref(), &t1, 1, zero, &mut t2, 1)?;
                gemv(Trans::NoTrans, minus, a.u.as_ref(), &t2, 1, one, c, incc)?;
            }
        }
        Ok(())
    }

    /// Subtract row `row` of `self·b` from the strided vector `c`.
    pub fn schur_update_row(
        &self,
        row: usize,
        b: &Tile<T>,
        c: &mut [T],
        incc: usize,
    ) -> Result<()> {
        let k = self.cols();
        if b.rows() != k || row >= self.rows() {
            return Err(BlrError::Dense(DenseError::ShapeMismatch {
                op: "schur_update_row",
                lhs_rows: self.rows(),
                lhs_cols: k,
                rhs_rows: b.rows(),
                rhs_cols: b.cols(),
            }));
        }
        if k == 0 || self.rank() == 0 {
            return Ok(());
        }
        let minus = -T::one();
        let one = T::one();
        let zero = T::zero();
        // Row `row` of self as a column vector, via transposed products.
        match (self, b) {
            (Tile::Dense(a), Tile::Dense(bt)) => {
                gemv(
                    Trans::Trans,
                    minus,
                    bt.d.as_ref(),
                    &a.d.data()[row..],
                    a.d.ld(),
                    one,
                    c,
                    incc,
                )?;
            }
            (Tile::Dense(a), Tile::LowRank(bt)) => {
                let mut t = vec![zero; bt.u.cols()];
                gemv(
                    Trans::Trans,
                    one,
                    bt.u.as_ref(),
                    &a.d.data()[row..],
                    a.d.ld(),
                    zero,
                    &mut t,
                    1,
                )?;
                gemv(Trans::Trans, minus, bt.v.as_ref(), &t, 1, one, c, incc)?;
            }
            (Tile::LowRank(a), Tile::Dense(bt)) => {
                let mut t = vec![zero; a.v.cols()];
                gemv(
                    Trans::Trans,
                    one,
                    a.v.as_ref(),
                    &a.u.data()[row..],
                    a.u.ld(),
                    zero,
                    &mut t,
                    1,
                )?;
                gemv(Trans::Trans, minus, bt.d.as_ref(), &t, 1, one, c, incc)?;
            }
            (Tile::LowRank(a), Tile::LowRank(bt)) => {
                let mut t1 = vec![zero; a.v.cols()];
                gemv(
                    Trans::Trans,
                    one,
                    a.v.as_ref(),
                    &a.u.data()[row..],
                    a.u.ld(),
                    zero,
                    &mut t1,
                    1,
                )?;
                let mut t2 = vec![zero; bt.u.cols()];
                gemv(Trans::Trans, one, bt.u.as_ref(), &t1, 1, zero, &mut t2, 1)?;
                gemv(Trans::Trans, minus, bt.v.as_ref(), &t2, 1, one, c, incc)?;
            }
        }
        Ok(())
    }

    /// Serialize as `[tag][m][n][rank][payload]` with little-endian `u32`
    /// header fields and native scalar payload.
    pub fn to_bytes(&self) -> Vec<u8> {
        let m = self.rows() as u32;
        let n = self.cols() as u32;
        let (tag, r, payload): (u8, u32, Vec<&[T]>) = match self {
            Tile::Dense(t) => (TAG_DENSE, 0, vec![t.d.data()]),
            Tile::LowRank(t) => (TAG_LOW_RANK, t.u.cols() as u32, vec![t.u.data(), t.v.data()]),
        };
        let scalars: usize = payload.iter().map(|p| p.len()).sum();
        let mut out = Vec::with_capacity(HEADER_LEN + scalars * std::mem::size_of::<T>());
        out.push(tag);
        out.extend_from_slice(&m.to_le_bytes());
        out.extend_from_slice(&n.to_le_bytes());
        out.extend_from_slice(&r.to_le_bytes());
        for p in payload {
            out.extend_from_slice(bytemuck::cast_slice(p));
        }
        out
    }

    /// Rebuild a tile from its serialized form, allocating the variant named
    /// by the header before reading the payload.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(BlrError::TileTruncated {
                need: HEADER_LEN,
                have: bytes.len(),
            });
        }
        let tag = bytes[0];
        let m = u32::from_le_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]) as usize;
        let n = u32::from_le_bytes([bytes[5], bytes[6], bytes[7], bytes[8]]) as usize;
        let r = u32::from_le_bytes([bytes[9], bytes[10], bytes[11], bytes[12]]) as usize;
        let body = &bytes[HEADER_LEN..];
        let elem = std::mem::size_of::<T>();

        let read_block = |offset: usize, rows: usize, cols: usize| -> Result<Matrix<T>> {
            let need = rows * cols * elem;
            if body.len() < offset + need {
                return Err(BlrError::TileTruncated {
                    need: HEADER_LEN + offset + need,
                    have: bytes.len(),
                });
            }
            let mut data = vec![T::zero(); rows * cols];
            bytemuck::cast_slice_mut::<T, u8>(&mut data)
                .copy_from_slice(&body[offset..offset + need]);
            Ok(Matrix::from_col_major(rows, cols, data))
        };

        match tag {
            TAG_DENSE => Ok(Tile::Dense(DenseTile {
                d: read_block(0, m, n)?,
            })),
            TAG_LOW_RANK => {
                let u = read_block(0, m, r)?;
                let v = read_block(m * r * elem, r, n)?;
                Tile::from_factors(u, v)
            }
            tag => Err(BlrError::BadTileTag { tag }),
        }
    }
}

/// `C ← α·op(a)·op(b) + β·C` over the four variant pairs, each forming its
/// intermediates in rank-sized space.
pub fn gemm_tiles<T: Scalar>(
    ta: Trans,
    tb: Trans,
    alpha: T,
    a: &Tile<T>,
    b: &Tile<T>,
    beta: T,
    c: MatrixMut<'_, T>,
    tasks: usize,
) -> Result<()> {
    let (m, ka) = (a.op_rows(ta), a.op_cols(ta));
    let (kb, n) = (b.op_rows(tb), b.op_cols(tb));
    if ka != kb || m != c.rows() || n != c.cols() {
        return Err(BlrError::Dense(DenseError::ShapeMismatch {
            op: "gemm_tiles",
            lhs_rows: m,
            lhs_cols: ka,
            rhs_rows: kb,
            rhs_cols: n,
        }));
    }
    let one = T::one();
    let zero = T::zero();
    let no = Trans::NoTrans;
    match (a, b) {
        (Tile::Dense(at), Tile::Dense(bt)) => {
            gemm(ta, tb, alpha, at.d.as_ref(), bt.d.as_ref(), beta, c, tasks)?;
        }
        (Tile::Dense(at), Tile::LowRank(bt)) => {
            let rb = bt.u.cols();
            let (bfirst, bsecond) = match tb {
                Trans::NoTrans => (&bt.u, &bt.v),
                _ => (&bt.v, &bt.u),
            };
            let mut tmp = Matrix::<T>::zeros(m, rb);
            gemm(ta, tb, one, at.d.as_ref(), bfirst.as_ref(), zero, tmp.as_mut(), tasks)?;
            gemm(no, tb, alpha, tmp.as_ref(), bsecond.as_ref(), beta, c, tasks)?;
        }
        (Tile::LowRank(at), Tile::Dense(bt)) => {
            let ra = at.u.cols();
            let (afirst, asecond) = match ta {
                Trans::NoTrans => (&at.v, &at.u),
                _ => (&at.u, &at.v),
            };
            let mut tmp = Matrix::<T>::zeros(ra, n);
            gemm(ta, tb, one, afirst.as_ref(), bt.d.as_ref(), zero, tmp.as_mut(), tasks)?;
            gemm(ta, no, alpha, asecond.as_ref(), tmp.as_ref(), beta, c, tasks)?;
        }
        (Tile::LowRank(at), Tile::LowRank(bt)) => {
            let ra = at.u.cols();
            let rb = bt.u.cols();
            let (ainner, aouter) = match ta {
                Trans::NoTrans => (&at.v, &at.u),
                _ => (&at.u, &at.v),
            };
            let (binner, bouter) = match tb {
                Trans::NoTrans => (&bt.u, &bt.v),
                _ => (&bt.v, &bt.u),
            };
            let mut tmp1 = Matrix::<T>::zeros(ra, rb);
            gemm(ta, tb, one, ainner.as_ref(), binner.as_ref(), zero, tmp1.as_mut(), tasks)?;
            let mut tmp2 = Matrix::<T>::zeros(m, rb);
            gemm(ta, no, one, aouter.as_ref(), tmp1.as_ref(), zero, tmp2.as_mut(), tasks)?;
            gemm(no, tb, alpha, tmp2.as_ref(), bouter.as_ref(), beta, c, tasks)?;
        }
    }
    Ok(())
}
