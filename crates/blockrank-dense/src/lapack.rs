//! LU factorization with partial pivoting and row permutation.

use crate::error::{DenseError, Result};
use crate::matrix::MatrixMut;
use crate::scalar::Scalar;

/// LU factorization with partial pivoting, in place.
///
/// On return `A` holds the unit-lower factor `L` (diagonal not stored) and
/// the upper factor `U`. The pivot vector has length `min(m, n)`; entry `k`
/// is the 0-based row index that was swapped with row `k`.
///
/// A positive `pivot_threshold` replaces any pivot of smaller magnitude with
/// one of magnitude `pivot_threshold` and the same phase, so the
/// factorization continues on nearly singular blocks (static pivoting). With
/// a zero threshold an exactly zero pivot column fails with
/// [`DenseError::SingularPivot`].
pub fn getrf<T: Scalar>(mut a: MatrixMut<'_, T>, pivot_threshold: f64) -> Result<Vec<usize>> {
    let m = a.rows();
    let n = a.cols();
    let minmn = m.min(n);
    let mut piv = Vec::with_capacity(minmn);

    for k in 0..minmn {
        // Pivot search: max |A[i, k]| over i in k..m.
        let mut p = k;
        let mut pmag = a.at(k, k).abs_sq();
        for i in k + 1..m {
            let mag = a.at(i, k).abs_sq();
            if mag > pmag {
                pmag = mag;
                p = i;
            }
        }
        if pmag == 0.0 && pivot_threshold == 0.0 {
            return Err(DenseError::SingularPivot { step: k });
        }
        piv.push(p);
        a.swap_rows(k, p);

        let mut akk = a.at(k, k);
        if pivot_threshold > 0.0 && akk.abs_val() < pivot_threshold {
            // Keep the phase of the stored pivot; a zero pivot gets +threshold.
            akk = if akk == T::zero() {
                T::from_f64(pivot_threshold)
            } else {
                akk.mul_real(pivot_threshold / akk.abs_val())
            };
            a.set(k, k, akk);
        }

        for i in k + 1..m {
            let v = a.at(i, k) / akk;
            a.set(i, k, v);
        }
        for j in k + 1..n {
            let u = a.at(k, j);
            if u == T::zero() {
                continue;
            }
            for i in k + 1..m {
                let v = a.at(i, j) - a.at(i, k) * u;
                a.set(i, j, v);
            }
        }
    }
    Ok(piv)
}

/// Apply a sequence of row swaps to a block, forward or backward.
///
/// Forward applies `swap(i, piv[i])` for `i = 0, 1, …`; backward undoes a
/// forward application by running the swaps in reverse order.
pub fn laswp<T: Scalar>(mut a: MatrixMut<'_, T>, piv: &[usize], fwd: bool) -> Result<()> {
    if piv.len() > a.rows() || piv.iter().any(|&p| p >= a.rows()) {
        return Err(DenseError::PivotLength {
            len: piv.len(),
            rows: a.rows(),
        });
    }
    if fwd {
        for (i, &p) in piv.iter().enumerate() {
            a.swap_rows(i, p);
        }
    } else {
        for (i, &p) in piv.iter().enumerate().rev() {
            a.swap_rows(i, p);
        }
    }
    Ok(())
}
