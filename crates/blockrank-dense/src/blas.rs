//! Level-1/2/3 kernels over column-major views.
//!
//! The `gemm` entry point recursively splits the output over columns and
//! hands the halves to rayon, bounded by the explicit `tasks` argument
//! (remaining recursion levels; `0` runs sequentially). Column splits keep
//! both halves contiguous safe slices.

use crate::error::{DenseError, Result};
use crate::matrix::{MatrixMut, MatrixRef};
use crate::scalar::Scalar;

/// Which side a triangular operand multiplies from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    /// `op(A)·X = B`.
    Left,
    /// `X·op(A) = B`.
    Right,
}

/// Which triangle of a triangular operand is referenced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpLo {
    /// Lower triangle.
    Lower,
    /// Upper triangle.
    Upper,
}

/// Transposition applied to an operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trans {
    /// Use the operand as stored.
    NoTrans,
    /// Use the transpose.
    Trans,
    /// Use the conjugate transpose.
    ConjTrans,
}

/// Whether a triangular operand has an implicit unit diagonal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Diag {
    /// Diagonal entries are implicitly one and not referenced.
    Unit,
    /// Diagonal entries are read from the operand.
    NonUnit,
}

/// Minimum number of output columns worth splitting into a rayon task pair.
const GEMM_TASK_MIN_COLS: usize = 64;

#[inline]
fn op_at<T: Scalar>(a: MatrixRef<'_, T>, t: Trans, i: usize, j: usize) -> T {
    match t {
        Trans::NoTrans => a.at(i, j),
        Trans::Trans => a.at(j, i),
        Trans::ConjTrans => a.at(j, i).conj(),
    }
}

#[inline]
fn op_dims<T: Scalar>(a: MatrixRef<'_, T>, t: Trans) -> (usize, usize) {
    match t {
        Trans::NoTrans => (a.rows(), a.cols()),
        Trans::Trans | Trans::ConjTrans => (a.cols(), a.rows()),
    }
}

/// Unconjugated dot product of two strided vectors of length `n`.
#[inline]
pub fn dotu<T: Scalar>(n: usize, x: &[T], incx: usize, y: &[T], incy: usize) -> T {
    let mut acc = T::zero();
    for k in 0..n {
        acc += x[k * incx] * y[k * incy];
    }
    acc
}

/// `C ← α·op(A)·op(B) + β·C`.
pub fn gemm<T: Scalar>(
    ta: Trans,
    tb: Trans,
    alpha: T,
    a: MatrixRef<'_, T>,
    b: MatrixRef<'_, T>,
    beta: T,
    mut c: MatrixMut<'_, T>,
    tasks: usize,
) -> Result<()> {
    let (m, k) = op_dims(a, ta);
    let (kb, n) = op_dims(b, tb);
    if k != kb || m != c.rows() || n != c.cols() {
        return Err(DenseError::ShapeMismatch {
            op: "gemm",
            lhs_rows: m,
            lhs_cols: k,
            rhs_rows: kb,
            rhs_cols: n,
        });
    }
    if beta == T::zero() {
        c.fill(T::zero());
    } else if beta != T::one() {
        c.scale(beta);
    }
    gemm_accum(ta, tb, alpha, a, b, c, tasks);
    Ok(())
}

/// `C += α·op(A)·op(B)`; shapes already validated.
fn gemm_accum<T: Scalar>(
    ta: Trans,
    tb: Trans,
    alpha: T,
    a: MatrixRef<'_, T>,
    b: MatrixRef<'_, T>,
    mut c: MatrixMut<'_, T>,
    tasks: usize,
) {
    let m = c.rows();
    let n = c.cols();
    let k = op_dims(a, ta).1;
    if m == 0 || n == 0 || k == 0 || alpha == T::zero() {
        return;
    }
    if tasks > 0 && n >= GEMM_TASK_MIN_COLS {
        let half = n / 2;
        let (cl, cr) = c.split_cols(half);
        let (bl, br) = match tb {
            Trans::NoTrans => (
                b.view(0, 0, b.rows(), half),
                b.view(0, half, b.rows(), n - half),
            ),
            Trans::Trans | Trans::ConjTrans => (
                b.view(0, 0, half, b.cols()),
                b.view(half, 0, n - half, b.cols()),
            ),
        };
        rayon::join(
            || gemm_accum(ta, tb, alpha, a, bl, cl, tasks - 1),
            || gemm_accum(ta, tb, alpha, a, br, cr, tasks - 1),
        );
        return;
    }
    for j in 0..n {
        for l in 0..k {
            let bv = op_at(b, tb, l, j);
            if bv == T::zero() {
                continue;
            }
            let w = alpha * bv;
            for i in 0..m {
                let v = c.at(i, j) + op_at(a, ta, i, l) * w;
                c.set(i, j, v);
            }
        }
    }
}

/// `y ← α·op(A)·x + β·y` with strided vectors.
pub fn gemv<T: Scalar>(
    ta: Trans,
    alpha: T,
    a: MatrixRef<'_, T>,
    x: &[T],
    incx: usize,
    beta: T,
    y: &mut [T],
    incy: usize,
) -> Result<()> {
    let (m, n) = op_dims(a, ta);
    let xlen = if n == 0 { 0 } else { (n - 1) * incx + 1 };
    let ylen = if m == 0 { 0 } else { (m - 1) * incy + 1 };
    if x.len() < xlen || y.len() < ylen {
        return Err(DenseError::ShapeMismatch {
            op: "gemv",
            lhs_rows: m,
            lhs_cols: n,
            rhs_rows: x.len(),
            rhs_cols: y.len(),
        });
    }
    if beta == T::zero() {
        for i in 0..m {
            y[i * incy] = T::zero();
        }
    } else if beta != T::one() {
        for i in 0..m {
            y[i * incy] = y[i * incy] * beta;
        }
    }
    if alpha == T::zero() {
        return Ok(());
    }
    for j in 0..n {
        let w = alpha * x[j * incx];
        if w == T::zero() {
            continue;
        }
        for i in 0..m {
            y[i * incy] += op_at(a, ta, i, j) * w;
        }
    }
    Ok(())
}

/// Triangular solve against a column vector, in place.
pub fn trsv<T: Scalar>(
    uplo: UpLo,
    ta: Trans,
    diag: Diag,
    a: MatrixRef<'_, T>,
    x: &mut [T],
    incx: usize,
) -> Result<()> {
    let t = a.rows();
    if a.cols() != t {
        return Err(DenseError::ShapeMismatch {
            op: "trsv",
            lhs_rows: a.rows(),
            lhs_cols: a.cols(),
            rhs_rows: t,
            rhs_cols: 1,
        });
    }
    if t > 0 && x.len() < (t - 1) * incx + 1 {
        return Err(DenseError::ShapeMismatch {
            op: "trsv",
            lhs_rows: t,
            lhs_cols: t,
            rhs_rows: x.len(),
            rhs_cols: 1,
        });
    }
    trsv_in_place(uplo, ta, diag, a, x, incx);
    Ok(())
}

/// Solve loop shared by `trsv` and `trsm_left`; shapes already validated.
fn trsv_in_place<T: Scalar>(
    uplo: UpLo,
    ta: Trans,
    diag: Diag,
    a: MatrixRef<'_, T>,
    x: &mut [T],
    incx: usize,
) {
    let t = a.rows();
    // Transposing flips the referenced triangle.
    let lower = match (uplo, ta) {
        (UpLo::Lower, Trans::NoTrans) | (UpLo::Upper, Trans::Trans | Trans::ConjTrans) => true,
        _ => false,
    };
    if lower {
        for i in 0..t {
            let mut s = x[i * incx];
            for l in 0..i {
                s -= op_at(a, ta, i, l) * x[l * incx];
            }
            if diag == Diag::NonUnit {
                s = s / op_at(a, ta, i, i);
            }
            x[i * incx] = s;
        }
    } else {
        for i in (0..t).rev() {
            let mut s = x[i * incx];
            for l in i + 1..t {
                s -= op_at(a, ta, i, l) * x[l * incx];
            }
            if diag == Diag::NonUnit {
                s = s / op_at(a, ta, i, i);
            }
            x[i * incx] = s;
        }
    }
}

/// Triangular solve with multiple right-hand sides, in place:
/// `B ← α·op(A)⁻¹·B` (left) or `B ← α·B·op(A)⁻¹` (right).
pub fn trsm<T: Scalar>(
    side: Side,
    uplo: UpLo,
    ta: Trans,
    diag: Diag,
    alpha: T,
    a: MatrixRef<'_, T>,
    mut b: MatrixMut<'_, T>,
    tasks: usize,
) -> Result<()> {
    let t = a.rows();
    let dim = match side {
        Side::Left => b.rows(),
        Side::Right => b.cols(),
    };
    if a.cols() != t || t != dim {
        return Err(DenseError::ShapeMismatch {
            op: "trsm",
            lhs_rows: a.rows(),
            lhs_cols: a.cols(),
            rhs_rows: b.rows(),
            rhs_cols: b.cols(),
        });
    }
    if alpha != T::one() {
        b.scale(alpha);
    }
    match side {
        Side::Left => trsm_left(uplo, ta, diag, a, b, tasks),
        Side::Right => trsm_right(uplo, ta, diag, a, b),
    }
    Ok(())
}

fn trsm_left<T: Scalar>(
    uplo: UpLo,
    ta: Trans,
    diag: Diag,
    a: MatrixRef<'_, T>,
    mut b: MatrixMut<'_, T>,
    tasks: usize,
) {
    let n = b.cols();
    if tasks > 0 && n >= GEMM_TASK_MIN_COLS {
        let (bl, br) = b.split_cols(n / 2);
        rayon::join(
            || trsm_left(uplo, ta, diag, a, bl, tasks - 1),
            || trsm_left(uplo, ta, diag, a, br, tasks - 1),
        );
        return;
    }
    for j in 0..n {
        trsv_in_place(uplo, ta, diag, a, b.col_mut(j), 1);
    }
}

fn trsm_right<T: Scalar>(
    uplo: UpLo,
    ta: Trans,
    diag: Diag,
    a: MatrixRef<'_, T>,
    mut b: MatrixMut<'_, T>,
) {
    let t = a.rows();
    let m = b.rows();
    // X·op(A) = B column recurrences; transposing flips the triangle.
    let upper = match (uplo, ta) {
        (UpLo::Upper, Trans::NoTrans) | (UpLo::Lower, Trans::Trans | Trans::ConjTrans) => true,
        _ => false,
    };
    if upper {
        for j in 0..t {
            for l in 0..j {
                let w = op_at(a, ta, l, j);
                if w == T::zero() {
                    continue;
                }
                for i in 0..m {
                    let v = b.at(i, j) - b.at(i, l) * w;
                    b.set(i, j, v);
                }
            }
            if diag == Diag::NonUnit {
                let d = op_at(a, ta, j, j);
                for i in 0..m {
                    let v = b.at(i, j) / d;
                    b.set(i, j, v);
                }
            }
        }
    } else {
        for j in (0..t).rev() {
            for l in j + 1..t {
                let w = op_at(a, ta, l, j);
                if w == T::zero() {
                    continue;
                }
                for i in 0..m {
                    let v = b.at(i, j) - b.at(i, l) * w;
                    b.set(i, j, v);
                }
            }
            if diag == Diag::NonUnit {
                let d = op_at(a, ta, j, j);
                for i in 0..m {
                    let v = b.at(i, j) / d;
                    b.set(i, j, v);
                }
            }
        }
    }
}
