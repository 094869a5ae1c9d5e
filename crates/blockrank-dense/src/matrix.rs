//! Column-major dense matrix storage with leading dimension.
//!
//! `Matrix<T>` owns an `m×n` block stored column by column with `ld == m`.
//! `MatrixRef`/`MatrixMut` are non-owning views onto a rectangular sub-block
//! of some matrix, with `ld ≥ m` giving the stride between columns. All
//! kernels in this crate operate on views, so a tile, a panel of a tile, or
//! a single column can be passed without copying.

use crate::error::{DenseError, Result};
use crate::scalar::Scalar;

/// Owning column-major `m×n` matrix, `ld == rows`.
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix<T> {
    rows: usize,
    cols: usize,
    data: Vec<T>,
}

/// Non-owning immutable view of a column-major block.
#[derive(Debug, Clone, Copy)]
pub struct MatrixRef<'a, T> {
    rows: usize,
    cols: usize,
    ld: usize,
    data: &'a [T],
}

/// Non-owning mutable view of a column-major block.
#[derive(Debug)]
pub struct MatrixMut<'a, T> {
    rows: usize,
    cols: usize,
    ld: usize,
    data: &'a mut [T],
}

impl<T: Scalar> Matrix<T> {
    /// Zero-initialized `m×n` matrix.
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![T::zero(); rows * cols],
        }
    }

    /// Build a matrix from a generator on `(row, col)`.
    pub fn from_fn(rows: usize, cols: usize, mut f: impl FnMut(usize, usize) -> T) -> Self {
        let mut data = Vec::with_capacity(rows * cols);
        for j in 0..cols {
            for i in 0..rows {
                data.push(f(i, j));
            }
        }
        Self { rows, cols, data }
    }

    /// Wrap an existing column-major buffer of length `rows * cols`.
    pub fn from_col_major(rows: usize, cols: usize, data: Vec<T>) -> Self {
        assert_eq!(data.len(), rows * cols, "buffer length mismatch");
        Self { rows, cols, data }
    }

    /// The `n×n` identity.
    pub fn identity(n: usize) -> Self {
        Self::from_fn(n, n, |i, j| if i == j { T::one() } else { T::zero() })
    }

    /// Number of rows.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Number of columns.
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Leading dimension (equal to `rows` for owning storage).
    pub fn ld(&self) -> usize {
        self.rows
    }

    /// Underlying column-major buffer.
    pub fn data(&self) -> &[T] {
        &self.data
    }

    /// Underlying column-major buffer, mutable.
    pub fn data_mut(&mut self) -> &mut [T] {
        &mut self.data
    }

    /// Scalars held, `m·n`.
    pub fn memory(&self) -> usize {
        self.rows * self.cols
    }

    /// Nonzero count is reported as the full block, `m·n`.
    pub fn nonzeros(&self) -> usize {
        self.rows * self.cols
    }

    /// View of the whole matrix.
    pub fn as_ref(&self) -> MatrixRef<'_, T> {
        MatrixRef {
            rows: self.rows,
            cols: self.cols,
            ld: self.rows,
            data: &self.data,
        }
    }

    /// Mutable view of the whole matrix.
    pub fn as_mut(&mut self) -> MatrixMut<'_, T> {
        MatrixMut {
            rows: self.rows,
            cols: self.cols,
            ld: self.rows,
            data: &mut self.data,
        }
    }

    /// View of the sub-block `rows × cols` at `(r0, c0)`.
    pub fn view(
        &self,
        r0: usize,
        c0: usize,
        rows: usize,
        cols: usize,
    ) -> MatrixRef<'_, T> {
        self.as_ref().view(r0, c0, rows, cols)
    }

    /// Mutable view of the sub-block `rows × cols` at `(r0, c0)`.
    pub fn view_mut(
        &mut self,
        r0: usize,
        c0: usize,
        rows: usize,
        cols: usize,
    ) -> MatrixMut<'_, T> {
        self.as_mut().into_view(r0, c0, rows, cols)
    }

    /// Column `j` as a contiguous slice.
    pub fn col(&self, j: usize) -> &[T] {
        &self.data[j * self.rows..(j + 1) * self.rows]
    }

    /// Column `j` as a contiguous mutable slice.
    pub fn col_mut(&mut self, j: usize) -> &mut [T] {
        &mut self.data[j * self.rows..(j + 1) * self.rows]
    }

    /// Set every element to `v`.
    pub fn fill(&mut self, v: T) {
        self.data.fill(v);
    }

    /// Scale every element by `alpha`.
    pub fn scale(&mut self, alpha: T) {
        for x in &mut self.data {
            *x = *x * alpha;
        }
    }

    /// Frobenius norm in f64.
    pub fn norm_frobenius(&self) -> f64 {
        self.as_ref().norm_frobenius()
    }

    /// New matrix `Aᵀ`.
    pub fn transpose(&self) -> Matrix<T> {
        Matrix::from_fn(self.cols, self.rows, |i, j| self[[j, i]])
    }

    /// New matrix `Aᴴ`.
    pub fn conj_transpose(&self) -> Matrix<T> {
        Matrix::from_fn(self.cols, self.rows, |i, j| self[[j, i]].conj())
    }

    /// Overwrite with the contents of `src` (shapes must match).
    pub fn copy_from(&mut self, src: MatrixRef<'_, T>) -> Result<()> {
        self.as_mut().copy_from(src)
    }

    /// True if any element is NaN or infinite.
    pub fn has_non_finite(&self) -> bool {
        self.data.iter().any(|x| !x.is_finite())
    }
}

impl<T: Scalar> std::ops::Index<[usize; 2]> for Matrix<T> {
    type Output = T;

    #[inline]
    fn index(&self, [i, j]: [usize; 2]) -> &T {
        debug_assert!(i < self.rows && j < self.cols);
        &self.data[i + j * self.rows]
    }
}

impl<T: Scalar> std::ops::IndexMut<[usize; 2]> for Matrix<T> {
    #[inline]
    fn index_mut(&mut self, [i, j]: [usize; 2]) -> &mut T {
        debug_assert!(i < self.rows && j < self.cols);
        &mut self.data[i + j * self.rows]
    }
}

impl<'a, T: Scalar> MatrixRef<'a, T> {
    /// Assemble a view from raw parts. `data` must hold at least
    /// `ld·(cols-1) + rows` elements.
    pub fn from_raw(rows: usize, cols: usize, ld: usize, data: &'a [T]) -> Self {
        assert!(ld >= rows.max(1));
        if cols > 0 {
            assert!(data.len() >= ld * (cols - 1) + rows);
        }
        Self {
            rows,
            cols,
            ld,
            data,
        }
    }

    /// Number of rows.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Number of columns.
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Stride between consecutive columns.
    pub fn ld(&self) -> usize {
        self.ld
    }

    /// Element at `(i, j)`.
    #[inline]
    pub fn at(&self, i: usize, j: usize) -> T {
        debug_assert!(i < self.rows && j < self.cols);
        self.data[i + j * self.ld]
    }

    /// Column `j` as a slice of length `rows`.
    pub fn col(&self, j: usize) -> &'a [T] {
        &self.data[j * self.ld..j * self.ld + self.rows]
    }

    /// Sub-view `rows × cols` at `(r0, c0)`.
    pub fn view(&self, r0: usize, c0: usize, rows: usize, cols: usize) -> MatrixRef<'a, T> {
        assert!(r0 + rows <= self.rows && c0 + cols <= self.cols);
        let start = r0 + c0 * self.ld;
        let end = if cols == 0 {
            start
        } else {
            start + (cols - 1) * self.ld + rows
        };
        MatrixRef {
            rows,
            cols,
            ld: self.ld,
            data: &self.data[start..end],
        }
    }

    /// Copy into a fresh owning matrix.
    pub fn to_owned(&self) -> Matrix<T> {
        Matrix::from_fn(self.rows, self.cols, |i, j| self.at(i, j))
    }

    /// Frobenius norm in f64.
    pub fn norm_frobenius(&self) -> f64 {
        let mut acc = 0.0;
        for j in 0..self.cols {
            for i in 0..self.rows {
                acc += self.at(i, j).abs_sq();
            }
        }
        acc.sqrt()
    }
}

impl<'a, T: Scalar> MatrixMut<'a, T> {
    /// Assemble a mutable view from raw parts.
    pub fn from_raw(rows: usize, cols: usize, ld: usize, data: &'a mut [T]) -> Self {
        assert!(ld >= rows.max(1));
        if cols > 0 {
            assert!(data.len() >= ld * (cols - 1) + rows);
        }
        Self {
            rows,
            cols,
            ld,
            data,
        }
    }

    /// Number of rows.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Number of columns.
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Stride between consecutive columns.
    pub fn ld(&self) -> usize {
        self.ld
    }

    /// Element at `(i, j)`.
    #[inline]
    pub fn at(&self, i: usize, j: usize) -> T {
        debug_assert!(i < self.rows && j < self.cols);
        self.data[i + j * self.ld]
    }

    /// Store `v` at `(i, j)`.
    #[inline]
    pub fn set(&mut self, i: usize, j: usize, v: T) {
        debug_assert!(i < self.rows && j < self.cols);
        self.data[i + j * self.ld] = v;
    }

    /// Immutable reborrow of this view.
    pub fn rb(&self) -> MatrixRef<'_, T> {
        MatrixRef {
            rows: self.rows,
            cols: self.cols,
            ld: self.ld,
            data: self.data,
        }
    }

    /// Mutable reborrow (shorter lifetime) of this view.
    pub fn rb_mut(&mut self) -> MatrixMut<'_, T> {
        MatrixMut {
            rows: self.rows,
            cols: self.cols,
            ld: self.ld,
            data: self.data,
        }
    }

    /// Consume into a sub-view `rows × cols` at `(r0, c0)`.
    pub fn into_view(self, r0: usize, c0: usize, rows: usize, cols: usize) -> MatrixMut<'a, T> {
        assert!(r0 + rows <= self.rows && c0 + cols <= self.cols);
        let start = r0 + c0 * self.ld;
        let end = if cols == 0 {
            start
        } else {
            start + (cols - 1) * self.ld + rows
        };
        MatrixMut {
            rows,
            cols,
            ld: self.ld,
            data: &mut self.data[start..end],
        }
    }

    /// Split into columns `[0, k)` and `[k, cols)`. Column splits are
    /// contiguous in column-major storage, so both halves stay safe slices.
    pub fn split_cols(self, k: usize) -> (MatrixMut<'a, T>, MatrixMut<'a, T>) {
        assert!(k <= self.cols);
        let (left, right) = self.data.split_at_mut(k * self.ld);
        (
            MatrixMut {
                rows: self.rows,
                cols: k,
                ld: self.ld,
                data: left,
            },
            MatrixMut {
                rows: self.rows,
                cols: self.cols - k,
                ld: self.ld,
                data: right,
            },
        )
    }

    /// Column `j` as a contiguous mutable slice of length `rows`.
    pub fn col_mut(&mut self, j: usize) -> &mut [T] {
        &mut self.data[j * self.ld..j * self.ld + self.rows]
    }

    /// Set every element to `v`.
    pub fn fill(&mut self, v: T) {
        for j in 0..self.cols {
            for i in 0..self.rows {
                self.data[i + j * self.ld] = v;
            }
        }
    }

    /// Scale every element by `alpha`.
    pub fn scale(&mut self, alpha: T) {
        for j in 0..self.cols {
            for i in 0..self.rows {
                let idx = i + j * self.ld;
                self.data[idx] = self.data[idx] * alpha;
            }
        }
    }

    /// Overwrite with the contents of `src`.
    pub fn copy_from(&mut self, src: MatrixRef<'_, T>) -> Result<()> {
        if src.rows() != self.rows || src.cols() != self.cols {
            return Err(DenseError::ShapeMismatch {
                op: "copy_from",
                lhs_rows: self.rows,
                lhs_cols: self.cols,
                rhs_rows: src.rows(),
                rhs_cols: src.cols(),
            });
        }
        for j in 0..self.cols {
            for i in 0..self.rows {
                self.data[i + j * self.ld] = src.at(i, j);
            }
        }
        Ok(())
    }

    /// `self += alpha · src`.
    pub fn axpy(&mut self, alpha: T, src: MatrixRef<'_, T>) -> Result<()> {
        if src.rows() != self.rows || src.cols() != self.cols {
            return Err(DenseError::ShapeMismatch {
                op: "axpy",
                lhs_rows: self.rows,
                lhs_cols: self.cols,
                rhs_rows: src.rows(),
                rhs_cols: src.cols(),
            });
        }
        for j in 0..self.cols {
            for i in 0..self.rows {
                let idx = i + j * self.ld;
                self.data[idx] = self.data[idx] + alpha * src.at(i, j);
            }
        }
        Ok(())
    }

    /// Swap rows `r1` and `r2` over all columns.
    pub fn swap_rows(&mut self, r1: usize, r2: usize) {
        if r1 == r2 {
            return;
        }
        for j in 0..self.cols {
            self.data.swap(r1 + j * self.ld, r2 + j * self.ld);
        }
    }
}
