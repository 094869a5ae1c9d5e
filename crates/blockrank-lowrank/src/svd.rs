//! One-sided Jacobi SVD for small blocks.

use blockrank_dense::{Matrix, MatrixRef, Scalar};

use crate::error::{LowRankError, Result};

/// Maximum number of Jacobi sweeps before giving up.
const MAX_SWEEPS: usize = 30;

/// Singular value decomposition `A = U·diag(σ)·Vᴴ`.
#[derive(Debug, Clone)]
pub struct SvdResult<T> {
    /// Left singular vectors, `m×k` with `k = min(m, n)`.
    pub u: Matrix<T>,
    /// Singular values in descending order.
    pub s: Vec<f64>,
    /// Conjugate-transposed right singular vectors, `k×n`.
    pub vh: Matrix<T>,
}

/// Compute the SVD of a small block by one-sided Jacobi rotations.
pub fn jacobi_svd<T: Scalar>(a: MatrixRef<'_, T>) -> Result<SvdResult<T>> {
    let m = a.rows();
    let n = a.cols();
    if m < n {
        // Factor the conjugate transpose instead, then swap roles.
        let at = a.to_owned().conj_transpose();
        let r = jacobi_svd_tall(at.as_ref())?;
        return Ok(SvdResult {
            u: r.vh.conj_transpose(),
            s: r.s,
            vh: r.u.conj_transpose(),
        });
    }
    jacobi_svd_tall(a)
}

/// One-sided Jacobi on a block with `m ≥ n`: orthogonalize column pairs of a
/// working copy while accumulating the right rotations.
fn jacobi_svd_tall<T: Scalar>(a: MatrixRef<'_, T>) -> Result<SvdResult<T>> {
    let m = a.rows();
    let n = a.cols();
    let mut w = a.to_owned();
    let mut v = Matrix::<T>::identity(n);
    let tol = T::epsilon() * (n.max(1) as f64);

    let mut sweeps = 0;
    loop {
        let mut rotated = false;
        for p in 0..n {
            for q in p + 1..n {
                let mut alpha = 0.0f64;
                let mut beta = 0.0f64;
                let mut gamma = T::zero();
                for i in 0..m {
                    let wp = w[[i, p]];
                    let wq = w[[i, q]];
                    alpha += wp.abs_sq();
                    beta += wq.abs_sq();
                    gamma += wp.conj() * wq;
                }
                let g = gamma.abs_val();
                if g <= tol * (alpha * beta).sqrt() || g == 0.0 {
                    continue;
                }
                rotated = true;
                let phase = gamma.mul_real(1.0 / g);
                let zeta = (beta - alpha) / (2.0 * g);
                let t = if zeta >= 0.0 {
                    1.0 / (zeta + (1.0 + zeta * zeta).sqrt())
                } else {
                    -1.0 / (-zeta + (1.0 + zeta * zeta).sqrt())
                };
                let c = 1.0 / (1.0 + t * t).sqrt();
                let s = c * t;
                // Column update [w_p', w_q'] = [w_p, w_q]·M with
                // M = [[c, s·φ], [-s·φ̄, c]].
                let sp = phase.mul_real(s);
                for i in 0..m {
                    let wp = w[[i, p]];
                    let wq = w[[i, q]];
                    w[[i, p]] = wp.mul_real(c) - wq * sp.conj();
                    w[[i, q]] = wp * sp + wq.mul_real(c);
                }
                for i in 0..n {
                    let vp = v[[i, p]];
                    let vq = v[[i, q]];
                    v[[i, p]] = vp.mul_real(c) - vq * sp.conj();
                    v[[i, q]] = vp * sp + vq.mul_real(c);
                }
            }
        }
        if !rotated {
            break;
        }
        sweeps += 1;
        if sweeps >= MAX_SWEEPS {
            return Err(LowRankError::NoConvergence { sweeps });
        }
    }

    // Singular values are the column norms; sort descending.
    let mut order: Vec<usize> = (0..n).collect();
    let norms: Vec<f64> = (0..n)
        .map(|j| (0..m).map(|i| w[[i, j]].abs_sq()).sum::<f64>().sqrt())
        .collect();
    order.sort_by(|&x, &y| norms[y].partial_cmp(&norms[x]).unwrap_or(std::cmp::Ordering::Equal));

    let mut u = Matrix::<T>::zeros(m, n);
    let mut s = Vec::with_capacity(n);
    let mut vh = Matrix::<T>::zeros(n, n);
    for (k, &j) in order.iter().enumerate() {
        let sigma = norms[j];
        s.push(sigma);
        if sigma > 0.0 {
            for i in 0..m {
                u[[i, k]] = w[[i, j]].mul_real(1.0 / sigma);
            }
        }
        for i in 0..n {
            vh[[k, i]] = v[[i, j]].conj();
        }
    }
    Ok(SvdResult { u, s, vh })
}

#[cfg(test)]
mod tests {
    use super::*;
    use blockrank_dense::{gemm, Trans};
    use num_complex::Complex64;

    fn reconstruct<T: Scalar>(r: &SvdResult<T>) -> Matrix<T> {
        let k = r.s.len();
        let mut us = r.u.clone();
        for j in 0..k {
            for i in 0..us.rows() {
                us[[i, j]] = us[[i, j]].mul_real(r.s[j]);
            }
        }
        let mut out = Matrix::<T>::zeros(us.rows(), r.vh.cols());
        gemm(
            Trans::NoTrans,
            Trans::NoTrans,
            T::one(),
            us.as_ref(),
            r.vh.as_ref(),
            T::zero(),
            out.as_mut(),
            0,
        )
        .unwrap();
        out
    }

    #[test]
    fn test_svd_diagonal() {
        let a = Matrix::from_fn(3, 3, |i, j| if i == j { (3 - i) as f64 } else { 0.0 });
        let r = jacobi_svd(a.as_ref()).unwrap();
        assert!((r.s[0] - 3.0).abs() < 1e-12);
        assert!((r.s[1] - 2.0).abs() < 1e-12);
        assert!((r.s[2] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_svd_reconstruct_tall() {
        let a = Matrix::from_fn(6, 4, |i, j| ((i * 7 + j * 3) % 5) as f64 - 2.0);
        let r = jacobi_svd(a.as_ref()).unwrap();
        let b = reconstruct(&r);
        let mut diff = a.clone();
        diff.as_mut().axpy(-1.0, b.as_ref()).unwrap();
        assert!(diff.norm_frobenius() < 1e-12 * (1.0 + a.norm_frobenius()));
    }

    #[test]
    fn test_svd_reconstruct_wide() {
        let a = Matrix::from_fn(3, 5, |i, j| 1.0 / (1.0 + i as f64 + j as f64));
        let r = jacobi_svd(a.as_ref()).unwrap();
        assert_eq!(r.u.cols(), 3);
        assert_eq!(r.vh.rows(), 3);
        let b = reconstruct(&r);
        let mut diff = a.clone();
        diff.as_mut().axpy(-1.0, b.as_ref()).unwrap();
        assert!(diff.norm_frobenius() < 1e-12 * (1.0 + a.norm_frobenius()));
    }

    #[test]
    fn test_svd_complex_unitary_columns() {
        let a = Matrix::from_fn(4, 4, |i, j| {
            Complex64::new(((i + 2 * j) % 3) as f64, ((i * j) % 2) as f64)
        });
        let r = jacobi_svd(a.as_ref()).unwrap();
        // U^H U = I on the nonzero singular directions.
        for p in 0..4 {
            if r.s[p] == 0.0 {
                continue;
            }
            for q in 0..4 {
                if r.s[q] == 0.0 {
                    continue;
                }
                let mut dot = Complex64::new(0.0, 0.0);
                for i in 0..4 {
                    dot += r.u[[i, p]].conj() * r.u[[i, q]];
                }
                let expect = if p == q { 1.0 } else { 0.0 };
                assert!((dot.re - expect).abs() < 1e-10 && dot.im.abs() < 1e-10);
            }
        }
        let b = reconstruct(&r);
        let mut diff = a.clone();
        diff.as_mut()
            .axpy(Complex64::new(-1.0, 0.0), b.as_ref())
            .unwrap();
        assert!(diff.norm_frobenius() < 1e-10 * (1.0 + a.norm_frobenius()));
    }
}
