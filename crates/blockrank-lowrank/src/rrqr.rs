//! Truncated rank-revealing QR compression.
//!
//! Householder QR with greedy column pivoting on a copy of the block. The
//! factorization stops at the first step where the Frobenius norm of the
//! remaining trailing block drops below `max(abs_tol, rel_tol·‖T‖_F)`, or at
//! `max_rank`. The truncated factors are kept either way.

use blockrank_dense::{Matrix, MatrixRef, Scalar};

use crate::error::Result;

/// Compress a dense block into factors `U (m×r)`, `V (r×n)` with
/// `T ≈ U·V`.
///
/// `r` is the smallest rank whose truncation residual satisfies the
/// tolerances, capped at `max_rank`. A zero block yields rank 0.
pub fn rrqr<T: Scalar>(
    t: MatrixRef<'_, T>,
    rel_tol: f64,
    abs_tol: f64,
    max_rank: usize,
) -> Result<(Matrix<T>, Matrix<T>)> {
    let m = t.rows();
    let n = t.cols();
    let mut w = t.to_owned();
    let mut perm: Vec<usize> = (0..n).collect();
    let cutoff = abs_tol.max(rel_tol * t.norm_frobenius());
    let kmax = m.min(n).min(max_rank);

    let mut taus: Vec<T> = Vec::with_capacity(kmax);
    let mut r = 0;

    for k in 0..kmax {
        // Exact trailing column norms; cheap at tile sizes and immune to
        // downdating cancellation.
        let mut best_j = k;
        let mut best_sq = -1.0;
        let mut resid_sq = 0.0;
        for j in k..n {
            let mut sq = 0.0;
            for i in k..m {
                sq += w[[i, j]].abs_sq();
            }
            resid_sq += sq;
            if sq > best_sq {
                best_sq = sq;
                best_j = j;
            }
        }
        if resid_sq.sqrt() <= cutoff {
            break;
        }

        if best_j != k {
            for i in 0..m {
                let tmp = w[[i, k]];
                w[[i, k]] = w[[i, best_j]];
                w[[i, best_j]] = tmp;
            }
            perm.swap(k, best_j);
        }

        // Householder reflector H = I - tau·v·v^H with v[k] = 1, mapping the
        // pivot column onto beta·e_k.
        let normx = best_sq.sqrt();
        let alpha = w[[k, k]];
        let phase = if alpha == T::zero() {
            T::one()
        } else {
            alpha.mul_real(1.0 / alpha.abs_val())
        };
        let beta = phase.mul_real(-normx);
        let v0 = alpha - beta;
        for i in k + 1..m {
            w[[i, k]] = w[[i, k]] / v0;
        }
        let tau = (beta - alpha) / beta;
        w[[k, k]] = beta;

        for j in k + 1..n {
            let mut s = w[[k, j]];
            for i in k + 1..m {
                s += w[[i, k]].conj() * w[[i, j]];
            }
            let ts = tau * s;
            w[[k, j]] -= ts;
            for i in k + 1..m {
                let vi = w[[i, k]];
                w[[i, j]] -= ts * vi;
            }
        }

        taus.push(tau);
        r = k + 1;
    }

    // U = Q[:, ..r], accumulated by applying the reflectors to the leading
    // identity columns in reverse order.
    let mut u = Matrix::<T>::zeros(m, r);
    for j in 0..r {
        u[[j, j]] = T::one();
    }
    for k in (0..r).rev() {
        let tau = taus[k];
        for j in 0..r {
            let mut s = u[[k, j]];
            for i in k + 1..m {
                s += w[[i, k]].conj() * u[[i, j]];
            }
            let ts = tau * s;
            u[[k, j]] -= ts;
            for i in k + 1..m {
                let vi = w[[i, k]];
                u[[i, j]] -= ts * vi;
            }
        }
    }

    // V = R[..r, :] with the column pivoting undone.
    let mut v = Matrix::<T>::zeros(r, n);
    for j in 0..n {
        let hi = r.min(j + 1);
        for i in 0..hi {
            v[[i, perm[j]]] = w[[i, j]];
        }
    }

    Ok((u, v))
}

#[cfg(test)]
mod tests {
    use super::*;
    use blockrank_dense::{gemm, Trans};

    fn approx_error<T: Scalar>(t: &Matrix<T>, u: &Matrix<T>, v: &Matrix<T>) -> f64 {
        let mut res = t.clone();
        gemm(
            Trans::NoTrans,
            Trans::NoTrans,
            -T::one(),
            u.as_ref(),
            v.as_ref(),
            T::one(),
            res.as_mut(),
            0,
        )
        .unwrap();
        res.norm_frobenius()
    }

    #[test]
    fn test_rrqr_exact_rank_one() {
        let t = Matrix::from_fn(6, 5, |i, j| ((i + 1) * (j + 2)) as f64);
        let (u, v) = rrqr(t.as_ref(), 1e-12, 0.0, 5).unwrap();
        assert_eq!(u.cols(), 1);
        assert_eq!(v.rows(), 1);
        assert!(approx_error(&t, &u, &v) < 1e-9 * t.norm_frobenius());
    }

    #[test]
    fn test_rrqr_tolerance_bound() {
        // A well-separated displacement block, as cut from the off-diagonal
        // of a kernel matrix.
        let t = Matrix::from_fn(16, 16, |i, j| 1.0 / (17.0 + j as f64 - i as f64));
        let rel = 1e-6;
        let (u, v) = rrqr(t.as_ref(), rel, 0.0, 16).unwrap();
        assert!(u.cols() <= 8, "rank {} too large", u.cols());
        assert!(approx_error(&t, &u, &v) <= rel * t.norm_frobenius() * 1.0001);
    }

    #[test]
    fn test_rrqr_max_rank_cap_keeps_truncation() {
        let t = Matrix::from_fn(8, 8, |i, j| if i == j { (i + 1) as f64 } else { 0.0 });
        let (u, v) = rrqr(t.as_ref(), 1e-15, 0.0, 3).unwrap();
        assert_eq!(u.cols(), 3);
        // Greedy pivoting keeps the three largest diagonal entries.
        let err = approx_error(&t, &u, &v);
        let expected = (1.0f64 + 4.0 + 9.0 + 16.0 + 25.0).sqrt();
        assert!((err - expected).abs() < 1e-10);
    }

    #[test]
    fn test_rrqr_lossless_at_full_rank() {
        let t = Matrix::from_fn(5, 5, |i, j| ((2 * i + 3 * j + 1) % 7) as f64 - 3.0);
        let (u, v) = rrqr(t.as_ref(), 0.0, 0.0, 5).unwrap();
        assert!(approx_error(&t, &u, &v) < 1e-12 * (1.0 + t.norm_frobenius()));
    }

    #[test]
    fn test_rrqr_random_low_rank() {
        use rand::{Rng, SeedableRng};
        let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(3);
        let (m, n, r) = (12, 10, 3);
        let a = Matrix::from_fn(m, r, |_, _| rng.random::<f64>() - 0.5);
        let b = Matrix::from_fn(r, n, |_, _| rng.random::<f64>() - 0.5);
        let mut t = Matrix::<f64>::zeros(m, n);
        gemm(
            Trans::NoTrans,
            Trans::NoTrans,
            1.0,
            a.as_ref(),
            b.as_ref(),
            0.0,
            t.as_mut(),
            0,
        )
        .unwrap();
        let (u, v) = rrqr(t.as_ref(), 1e-12, 0.0, 10).unwrap();
        assert_eq!(u.cols(), r);
        assert!(approx_error(&t, &u, &v) < 1e-10 * t.norm_frobenius());
    }

    #[test]
    fn test_rrqr_zero_block() {
        let t = Matrix::<f64>::zeros(4, 3);
        let (u, v) = rrqr(t.as_ref(), 1e-8, 0.0, 3).unwrap();
        assert_eq!(u.cols(), 0);
        assert_eq!(v.rows(), 0);
    }

    #[test]
    fn test_rrqr_complex() {
        use num_complex::Complex64;
        let t = Matrix::from_fn(6, 6, |i, j| {
            Complex64::new((i + 1) as f64, -1.0) * Complex64::new(1.0, (j as f64) / 2.0)
        });
        let (u, v) = rrqr(t.as_ref(), 1e-12, 0.0, 6).unwrap();
        assert_eq!(u.cols(), 1);
        assert!(approx_error(&t, &u, &v) < 1e-9 * t.norm_frobenius());
    }
}
