//! Adaptive cross approximation with partial pivoting.
//!
//! Builds `U·V` from an element oracle or a row/column oracle pair, sampling
//! one cross (a row and a column of the residual) per step and never
//! materializing the full block.

use blockrank_dense::{Matrix, Scalar};

use crate::error::Result;

/// Consecutive steps the residual estimator must stay below the tolerance
/// before the iteration is declared converged.
const ACA_CONVERGED_STEPS: usize = 2;

/// Outcome of an ACA run.
#[derive(Debug, Clone)]
pub struct AcaApprox<T> {
    /// Left factor, `m×r`.
    pub u: Matrix<T>,
    /// Right factor, `r×n`.
    pub v: Matrix<T>,
    /// False when the iteration stagnated (ran out of pivots) or hit
    /// `max_rank` before the tolerance was met; the factors still hold the
    /// best approximation found.
    pub converged: bool,
}

impl<T: Scalar> AcaApprox<T> {
    /// Rank of the approximation.
    pub fn rank(&self) -> usize {
        self.u.cols()
    }
}

/// ACA from a single element oracle `(i, j) → T`.
pub fn aca<T, F>(
    m: usize,
    n: usize,
    elem: F,
    rel_tol: f64,
    abs_tol: f64,
    max_rank: usize,
) -> Result<AcaApprox<T>>
where
    T: Scalar,
    F: Fn(usize, usize) -> T,
{
    aca_rowcol(
        m,
        n,
        |i, out: &mut [T]| {
            for (j, o) in out.iter_mut().enumerate() {
                *o = elem(i, j);
            }
        },
        |j, out: &mut [T]| {
            for (i, o) in out.iter_mut().enumerate() {
                *o = elem(i, j);
            }
        },
        rel_tol,
        abs_tol,
        max_rank,
    )
}

/// ACA from a whole-row / whole-column oracle pair.
///
/// `row(i, out)` fills `out` with row `i` (length `n`); `col(j, out)` fills
/// `out` with column `j` (length `m`).
pub fn aca_rowcol<T, R, C>(
    m: usize,
    n: usize,
    row: R,
    col: C,
    rel_tol: f64,
    abs_tol: f64,
    max_rank: usize,
) -> Result<AcaApprox<T>>
where
    T: Scalar,
    R: Fn(usize, &mut [T]),
    C: Fn(usize, &mut [T]),
{
    let rmax = max_rank.min(m).min(n);
    let mut ucols: Vec<Vec<T>> = Vec::new();
    let mut vrows: Vec<Vec<T>> = Vec::new();
    let mut used_row = vec![false; m];
    let mut used_col = vec![false; n];

    // Frobenius norm of the running approximation, accumulated via the
    // cross-term recurrence.
    let mut approx_sq = 0.0f64;
    let mut small_steps = 0usize;
    let mut converged = rmax == 0;

    let mut next_row = 0usize;
    let mut rbuf = vec![T::zero(); n];
    let mut cbuf = vec![T::zero(); m];

    while ucols.len() < rmax {
        // Residual row at the current pivot row.
        row(next_row, &mut rbuf);
        for (uk, vk) in ucols.iter().zip(vrows.iter()) {
            let w = uk[next_row];
            if w != T::zero() {
                for j in 0..n {
                    rbuf[j] -= w * vk[j];
                }
            }
        }
        let mut pj = None;
        let mut pmag = 0.0;
        for (j, used) in used_col.iter().enumerate() {
            if *used {
                continue;
            }
            let mag = rbuf[j].abs_sq();
            if pj.is_none() || mag > pmag {
                pmag = mag;
                pj = Some(j);
            }
        }
        let pj = match pj {
            Some(j) => j,
            None => {
                // Every column is interpolated exactly; the residual is zero.
                converged = true;
                break;
            }
        };
        if pmag == 0.0 {
            // Row of the residual is exactly zero: retire it and move on.
            // Zero rows stay zero under later cross updates.
            used_row[next_row] = true;
            match used_row.iter().position(|u| !u) {
                Some(i) => {
                    next_row = i;
                    continue;
                }
                None => {
                    converged = true;
                    break;
                }
            }
        }
        let delta = rbuf[pj];

        // Residual column at the pivot column.
        col(pj, &mut cbuf);
        for (uk, vk) in ucols.iter().zip(vrows.iter()) {
            let w = vk[pj];
            if w != T::zero() {
                for i in 0..m {
                    cbuf[i] -= uk[i] * w;
                }
            }
        }

        let uk: Vec<T> = cbuf.iter().map(|&c| c / delta).collect();
        let vk: Vec<T> = rbuf.clone();

        let u_sq: f64 = uk.iter().map(|x| x.abs_sq()).sum();
        let v_sq: f64 = vk.iter().map(|x| x.abs_sq()).sum();
        let mut cross = 0.0f64;
        for (ul, vl) in ucols.iter().zip(vrows.iter()) {
            let mut uu = T::zero();
            for i in 0..m {
                uu += ul[i].conj() * uk[i];
            }
            let mut vv = T::zero();
            for j in 0..n {
                vv += vk[j] * vl[j].conj();
            }
            cross += (uu * vv).re();
        }
        approx_sq += 2.0 * cross + u_sq * v_sq;
        if approx_sq < 0.0 {
            approx_sq = 0.0;
        }

        used_row[next_row] = true;
        used_col[pj] = true;
        ucols.push(uk);
        vrows.push(vk);

        let step_norm = (u_sq * v_sq).sqrt();
        if step_norm <= abs_tol.max(rel_tol * approx_sq.sqrt()) {
            small_steps += 1;
            if small_steps >= ACA_CONVERGED_STEPS {
                converged = true;
                break;
            }
        } else {
            small_steps = 0;
        }

        // Next pivot row: largest entry of the newest column among the
        // rows not yet visited.
        let latest = ucols.last().map(|u| u.as_slice()).unwrap_or(&[]);
        let mut best = None;
        let mut best_mag = -1.0;
        for (i, used) in used_row.iter().enumerate() {
            if *used {
                continue;
            }
            let mag = latest[i].abs_sq();
            if mag > best_mag {
                best_mag = mag;
                best = Some(i);
            }
        }
        match best {
            Some(i) => next_row = i,
            None => {
                converged = true;
                break;
            }
        }
    }

    let r = ucols.len();
    let u = Matrix::from_fn(m, r, |i, k| ucols[k][i]);
    let v = Matrix::from_fn(r, n, |k, j| vrows[k][j]);
    Ok(AcaApprox { u, v, converged })
}

#[cfg(test)]
mod tests {
    use super::*;
    use blockrank_dense::{gemm, Trans};

    fn approx_error(t: &Matrix<f64>, a: &AcaApprox<f64>) -> f64 {
        let mut res = t.clone();
        gemm(
            Trans::NoTrans,
            Trans::NoTrans,
            -1.0,
            a.u.as_ref(),
            a.v.as_ref(),
            1.0,
            res.as_mut(),
            0,
        )
        .unwrap();
        res.norm_frobenius()
    }

    #[test]
    fn test_aca_rank_one() {
        let t = Matrix::from_fn(5, 7, |i, j| ((i + 1) as f64) * ((j + 1) as f64));
        let a = aca(5, 7, |i, j| t[[i, j]], 1e-10, 0.0, 7).unwrap();
        assert!(a.rank() <= 2);
        assert!(approx_error(&t, &a) < 1e-9 * t.norm_frobenius());
    }

    #[test]
    fn test_aca_smooth_kernel() {
        let t = Matrix::from_fn(16, 16, |i, j| {
            1.0 / (1.0 + (i as f64 - j as f64 + 16.0).abs())
        });
        let a = aca(16, 16, |i, j| t[[i, j]], 1e-8, 0.0, 16).unwrap();
        assert!(a.converged);
        assert!(approx_error(&t, &a) < 1e-6 * t.norm_frobenius());
    }

    #[test]
    fn test_aca_max_rank_cap() {
        let t = Matrix::from_fn(8, 8, |i, j| if i == j { 1.0 } else { 0.0 });
        let a = aca(8, 8, |i, j| t[[i, j]], 1e-14, 0.0, 1).unwrap();
        assert_eq!(a.rank(), 1);
        assert!(!a.converged);
    }

    #[test]
    fn test_aca_zero_matrix() {
        let a = aca(4, 4, |_, _| 0.0f64, 1e-10, 0.0, 4).unwrap();
        assert_eq!(a.rank(), 0);
    }

    #[test]
    fn test_aca_rowcol_oracle() {
        let t = Matrix::from_fn(6, 6, |i, j| (i as f64 + 1.0) / (j as f64 + 2.0));
        let a = aca_rowcol(
            6,
            6,
            |i, out: &mut [f64]| {
                for (j, o) in out.iter_mut().enumerate() {
                    *o = t[[i, j]];
                }
            },
            |j, out: &mut [f64]| {
                for (i, o) in out.iter_mut().enumerate() {
                    *o = t[[i, j]];
                }
            },
            1e-10,
            0.0,
            6,
        )
        .unwrap();
        assert!(a.rank() <= 2);
        assert!(approx_error(&t, &a) < 1e-8 * t.norm_frobenius());
    }

    #[test]
    fn test_aca_complex() {
        use num_complex::Complex64;
        let t = Matrix::from_fn(6, 6, |i, j| {
            Complex64::new(0.0, 1.0) * Complex64::from_f64((i as f64 + 1.0) * (j as f64 + 1.0))
        });
        let a = aca(6, 6, |i, j| t[[i, j]], 1e-10, 0.0, 6).unwrap();
        assert!(a.rank() <= 2);
        let mut res = t.clone();
        gemm(
            Trans::NoTrans,
            Trans::NoTrans,
            -Complex64::from_f64(1.0),
            a.u.as_ref(),
            a.v.as_ref(),
            Complex64::from_f64(1.0),
            res.as_mut(),
            0,
        )
        .unwrap();
        assert!(res.norm_frobenius() < 1e-9 * t.norm_frobenius());
    }
}
