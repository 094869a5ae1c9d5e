//! Multi-rank scenarios on in-process communicator groups.

use std::sync::Arc;

use blockrank_comm::{Communicator, ProcessorGrid2D, SelfComm, ThreadComm};
use blockrank_core::{
    gemm as blr_gemm, gemv as blr_gemv, trsm as blr_trsm, Admissibility, BlrMatrix, BlrOptions,
    BlrScalar, CyclicMatrix, LowRankAlgorithm,
};
use blockrank_dense::{gemm, laswp, Diag, Matrix, Side, Trans, UpLo};
use num_complex::Complex64;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

fn grid_of(comm: Arc<dyn Communicator>) -> Arc<ProcessorGrid2D> {
    Arc::new(ProcessorGrid2D::new(comm).unwrap())
}

/// Assemble the full matrix of a distributed BLR matrix on every rank.
fn full<T: BlrScalar>(a: &BlrMatrix<T>) -> Matrix<T> {
    let mut cyc = CyclicMatrix::new(a.grid().clone(), a.rows(), a.cols(), 4, 4).unwrap();
    a.to_block_cyclic(&mut cyc).unwrap();
    cyc.to_replicated().unwrap()
}

fn split_lu(f: &Matrix<Complex64>) -> (Matrix<Complex64>, Matrix<Complex64>) {
    let n = f.rows();
    let mut l = Matrix::<Complex64>::identity(n);
    let mut u = Matrix::<Complex64>::zeros(n, n);
    for j in 0..n {
        for i in 0..n {
            if i > j {
                l[[i, j]] = f[[i, j]];
            } else {
                u[[i, j]] = f[[i, j]];
            }
        }
    }
    (l, u)
}

#[test]
fn test_block_cyclic_roundtrip_2x2() {
    let results = ThreadComm::run(4, |comm| {
        let grid = grid_of(comm);
        let a0 = CyclicMatrix::from_fn(grid.clone(), 12, 12, 3, 3, |i, j| {
            (i * 100 + j) as f64
        })
        .unwrap();
        let blr = BlrMatrix::from_block_cyclic(&a0, grid.clone(), &[4, 4, 4], &[4, 4, 4]).unwrap();
        let mut back = CyclicMatrix::new(grid, 12, 12, 3, 3).unwrap();
        blr.to_block_cyclic(&mut back).unwrap();
        let orig = a0.to_replicated().unwrap();
        let after = back.to_replicated().unwrap();
        orig == after
    });
    assert!(results.into_iter().all(|ok| ok));
}

#[test]
fn test_owner_map_invariant_after_factor() {
    ThreadComm::run(4, |comm| {
        let grid = grid_of(comm);
        let mut a = BlrMatrix::<f64>::new(grid.clone(), &[4; 4], &[4; 4]).unwrap();
        a.fill_fn(|i, j| 1.0 / (1.0 + (i as f64 - j as f64).abs()) + if i == j { 2.0 } else { 0.0 });
        a.factor(&BlrOptions::default().with_rel_tol(1e-8)).unwrap();
        for i in 0..4 {
            for j in 0..4 {
                let owned = a.tile(i, j).is_ok();
                assert_eq!(
                    owned,
                    grid.is_local(i, j),
                    "ownership moved for tile ({i}, {j})"
                );
                if owned {
                    let t = a.tile(i, j).unwrap();
                    assert_eq!(t.rows(), 4);
                    assert_eq!(t.cols(), 4);
                }
            }
        }
    });
}

#[test]
fn test_factor_complex_2x2_grid_vs_dense_reference() {
    let n = 32;
    let results = ThreadComm::run(4, |comm| {
        let grid = grid_of(comm);
        // Deterministic random matrix, identical on every rank.
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let a0 = Matrix::from_fn(n, n, |_, _| {
            Complex64::new(rng.random::<f64>() - 0.5, rng.random::<f64>() - 0.5)
        });
        let mut a = BlrMatrix::<Complex64>::new(grid.clone(), &[8; 4], &[8; 4]).unwrap();
        a.fill_fn(|i, j| a0[[i, j]]);
        let adm = Admissibility::none(4, 4);
        let piv = a.factor_with(&adm, &BlrOptions::default()).unwrap();

        let f = full(&a);
        let (l, u) = split_lu(&f);
        let mut pa = a0.clone();
        laswp(pa.as_mut(), &piv, true).unwrap();
        let mut res = pa.clone();
        gemm(
            Trans::NoTrans,
            Trans::NoTrans,
            -Complex64::new(1.0, 0.0),
            l.as_ref(),
            u.as_ref(),
            Complex64::new(1.0, 0.0),
            res.as_mut(),
            0,
        )
        .unwrap();
        res.norm_frobenius() / a0.norm_frobenius()
    });
    let bound = 10.0 * f64::EPSILON * n as f64;
    for r in results {
        assert!(r <= bound, "relative residual {r} > {bound}");
    }
}

#[test]
fn test_2x2_grid_matches_sequential_numerics() {
    let n = 24;
    let kernel =
        |i: usize, j: usize| 1.0 / (1.0 + (i as f64 - j as f64).abs()) + if i == j { 1.5 } else { 0.0 };
    let opts = BlrOptions::default()
        .with_rel_tol(1e-7)
        .with_abs_tol(0.0);

    // Sequential reference.
    let sg = Arc::new(ProcessorGrid2D::new(Arc::new(SelfComm)).unwrap());
    let mut sa = BlrMatrix::<f64>::new(sg, &[6; 4], &[6; 4]).unwrap();
    sa.fill_fn(kernel);
    sa.compress(&opts).unwrap();
    let spiv = sa.factor(&opts).unwrap();
    let sf = Matrix::from_fn(n, n, |i, j| sa.global(i, j).unwrap());

    let results = ThreadComm::run(4, |comm| {
        let grid = grid_of(comm);
        let mut a = BlrMatrix::<f64>::new(grid, &[6; 4], &[6; 4]).unwrap();
        a.fill_fn(kernel);
        a.compress(&opts).unwrap();
        let piv = a.factor(&opts).unwrap();
        (piv, full(&a))
    });
    for (piv, f) in results {
        assert_eq!(piv, spiv);
        for i in 0..n {
            for j in 0..n {
                assert!(
                    (f[[i, j]] - sf[[i, j]]).abs() < 1e-12,
                    "grid/sequential divergence at ({i}, {j})"
                );
            }
        }
    }
}

#[test]
fn test_inactive_ranks_skip_work() {
    let results = ThreadComm::run(5, |comm| {
        let grid = Arc::new(ProcessorGrid2D::with_procs(comm, 4).unwrap());
        let mut a = BlrMatrix::<f64>::new(grid.clone(), &[4, 4], &[4, 4]).unwrap();
        a.fill_fn(|i, j| if i == j { 3.0 } else { 1.0 / (1.0 + i as f64 + j as f64) });
        let piv = a
            .factor_with(&Admissibility::none(2, 2), &BlrOptions::default())
            .unwrap();
        (grid.active(), piv.len(), a.total_memory().unwrap())
    });
    for (active, piv_len, total) in results {
        if active {
            assert_eq!(piv_len, 8);
        } else {
            assert_eq!(piv_len, 0);
        }
        // The aggregate is collective over all five ranks.
        assert_eq!(total, 64);
    }
}

#[test]
fn test_distributed_gemv_matches_dense() {
    let n = 16;
    let results = ThreadComm::run(4, |comm| {
        let grid = grid_of(comm);
        let mut a = BlrMatrix::<f64>::new(grid.clone(), &[4; 4], &[4; 4]).unwrap();
        a.fill_fn(|i, j| ((i as f64) - 0.3 * (j as f64)).sin());
        a.compress(&BlrOptions::default().with_rel_tol(1e-10)).unwrap();

        let mut x = BlrMatrix::<f64>::new(grid.clone(), &[4; 4], &[1]).unwrap();
        x.fill_fn(|i, _| 1.0 + i as f64);
        let mut y = BlrMatrix::<f64>::new(grid, &[4; 4], &[1]).unwrap();
        y.fill_fn(|i, _| 0.5 * i as f64);

        blr_gemv(Trans::NoTrans, 2.0, &a, &x, -1.0, &mut y).unwrap();
        full(&y)
    });
    let a0 = Matrix::from_fn(n, n, |i, j| ((i as f64) - 0.3 * (j as f64)).sin());
    for yv in results {
        for i in 0..n {
            let mut expect = -(0.5 * i as f64);
            for j in 0..n {
                expect += 2.0 * a0[[i, j]] * (1.0 + j as f64);
            }
            // Compression at 1e-10 perturbs the product slightly.
            assert!(
                (yv[[i, 0]] - expect).abs() < 1e-6 * (1.0 + expect.abs()),
                "gemv mismatch at {i}: {} vs {expect}",
                yv[[i, 0]]
            );
        }
    }
}

#[test]
fn test_distributed_trsm_gemm_cancel() {
    // trsm(L, Lower, NoTrans, Unit, 1, A, B) followed by
    // gemm(NoTrans, NoTrans, -1, L(A), B_out, 1, B_orig) returns zero.
    let n = 16;
    ThreadComm::run(4, |comm| {
        let grid = grid_of(comm);
        // Unit-lower BLR A.
        let mut a = BlrMatrix::<f64>::new(grid.clone(), &[4; 4], &[4; 4]).unwrap();
        a.fill_fn(|i, j| {
            if i == j {
                1.0
            } else if i > j {
                0.3 / (1.0 + (i - j) as f64)
            } else {
                0.0
            }
        });
        let mut b = BlrMatrix::<f64>::new(grid.clone(), &[4; 4], &[4; 4]).unwrap();
        b.fill_fn(|i, j| ((2 * i + 3 * j) % 7) as f64 - 3.0);
        let b0 = full(&b);

        blr_trsm(
            Side::Left,
            UpLo::Lower,
            Trans::NoTrans,
            Diag::Unit,
            1.0,
            &a,
            &mut b,
            0,
        )
        .unwrap();

        // c = B_orig - A·X; A's stored upper part is zero, so the plain
        // product applies exactly the unit-lower triangle.
        let mut c = BlrMatrix::<f64>::new(grid, &[4; 4], &[4; 4]).unwrap();
        c.fill_fn(|i, j| b0[[i, j]]);
        blr_gemm(Trans::NoTrans, Trans::NoTrans, -1.0, &a, &b, 1.0, &mut c, 0).unwrap();
        let cf = full(&c);
        for i in 0..n {
            for j in 0..n {
                assert!(cf[[i, j]].abs() < 1e-11, "nonzero residue at ({i}, {j})");
            }
        }
    });
}

#[test]
fn test_distributed_trsv_upper_trans() {
    // Solve op(U)^T x = b on the grid and compare against a dense solve.
    let n = 12;
    let results = ThreadComm::run(4, |comm| {
        let grid = grid_of(comm);
        let mut a = BlrMatrix::<f64>::new(grid.clone(), &[4; 3], &[4; 3]).unwrap();
        a.fill_fn(|i, j| {
            if i == j {
                3.0 + i as f64
            } else if i < j {
                1.0 / (1.0 + (j - i) as f64)
            } else {
                0.0
            }
        });
        let mut b = BlrMatrix::<f64>::new(grid, &[4; 3], &[1]).unwrap();
        b.fill_fn(|i, _| 1.0 + (i % 3) as f64);
        blockrank_core::trsv(UpLo::Upper, Trans::Trans, Diag::NonUnit, &a, &mut b).unwrap();
        full(&b)
    });
    let a0 = Matrix::from_fn(n, n, |i, j| {
        if i == j {
            3.0 + i as f64
        } else if i < j {
            1.0 / (1.0 + (j - i) as f64)
        } else {
            0.0
        }
    });
    let mut x0: Vec<f64> = (0..n).map(|i| 1.0 + (i % 3) as f64).collect();
    blockrank_dense::trsv(UpLo::Upper, Trans::Trans, Diag::NonUnit, a0.as_ref(), &mut x0, 1)
        .unwrap();
    for xv in results {
        for i in 0..n {
            assert!((xv[[i, 0]] - x0[i]).abs() < 1e-11);
        }
    }
}

#[test]
fn test_factor_then_solve_on_grid() {
    // End to end: compress, factor, and solve A·x = b on a 2x2 grid.
    let n = 32;
    let kernel = |i: usize, j: usize| {
        1.0 / (1.0 + (i as f64 - j as f64).abs()) + if i == j { 4.0 } else { 0.0 }
    };
    let results = ThreadComm::run(4, |comm| {
        let grid = grid_of(comm);
        let mut a = BlrMatrix::<f64>::new(grid.clone(), &[8; 4], &[8; 4]).unwrap();
        a.fill_fn(kernel);
        let a0 = full(&a);
        let opts = BlrOptions::default()
            .with_algorithm(LowRankAlgorithm::Rrqr)
            .with_rel_tol(1e-9)
            .with_abs_tol(0.0);
        a.compress(&opts).unwrap();
        let piv = a.factor(&opts).unwrap();

        // b = A·1.
        let mut b = BlrMatrix::<f64>::new(grid, &[8; 4], &[1]).unwrap();
        b.fill_fn(|i, _| (0..n).map(|j| a0[[i, j]]).sum());
        b.laswp(&piv, true).unwrap();
        blockrank_core::trsv(UpLo::Lower, Trans::NoTrans, Diag::Unit, &a, &mut b).unwrap();
        blockrank_core::trsv(UpLo::Upper, Trans::NoTrans, Diag::NonUnit, &a, &mut b).unwrap();
        full(&b)
    });
    for xv in results {
        for i in 0..n {
            assert!((xv[[i, 0]] - 1.0).abs() < 1e-6, "x[{i}] = {}", xv[[i, 0]]);
        }
    }
}

#[test]
fn test_partial_factor_on_grid_matches_sequential() {
    let n = 16;
    let ts = 4;
    let half = 8;
    let gen = |i: usize, j: usize| {
        1.0 / (1.0 + (2 * i) as f64 + j as f64) + if i == j { 3.0 } else { 0.0 }
    };
    let opts = BlrOptions::default().with_rel_tol(0.0).with_abs_tol(0.0);
    let adm = Admissibility::weak(2, 2);

    // Sequential reference.
    let sg = Arc::new(ProcessorGrid2D::new(Arc::new(SelfComm)).unwrap());
    let mk_seq = |r0: usize, c0: usize| {
        let mut m = BlrMatrix::<f64>::new(sg.clone(), &[ts, ts], &[ts, ts]).unwrap();
        m.fill_fn(move |i, j| gen(i + r0, j + c0));
        m
    };
    let mut s11 = mk_seq(0, 0);
    let mut s12 = mk_seq(0, half);
    let mut s21 = mk_seq(half, 0);
    let mut s22 = mk_seq(half, half);
    let spiv =
        BlrMatrix::partial_factor(&mut s11, &mut s12, &mut s21, &mut s22, &adm, &opts).unwrap();
    let s22f = Matrix::from_fn(half, half, |i, j| s22.global(i, j).unwrap());

    let opts2 = opts.clone();
    let results = ThreadComm::run(4, move |comm| {
        let grid = grid_of(comm);
        let mk = |r0: usize, c0: usize| {
            let mut m = BlrMatrix::<f64>::new(grid.clone(), &[ts, ts], &[ts, ts]).unwrap();
            m.fill_fn(move |i, j| gen(i + r0, j + c0));
            m
        };
        let mut a11 = mk(0, 0);
        let mut a12 = mk(0, half);
        let mut a21 = mk(half, 0);
        let mut a22 = mk(half, half);
        let piv =
            BlrMatrix::partial_factor(&mut a11, &mut a12, &mut a21, &mut a22, &adm, &opts2)
                .unwrap();
        (piv, full(&a22))
    });
    for (piv, f22) in results {
        assert_eq!(piv, spiv);
        for i in 0..half {
            for j in 0..half {
                assert!((f22[[i, j]] - s22f[[i, j]]).abs() < 1e-12);
            }
        }
    }
}

#[test]
fn test_blr_laswp_roundtrip_on_grid() {
    ThreadComm::run(4, |comm| {
        let grid = grid_of(comm);
        let mut a = BlrMatrix::<f64>::new(grid, &[4, 4], &[4, 4]).unwrap();
        a.fill_fn(|i, j| (i * 8 + j) as f64);
        let before = full(&a);
        let piv = vec![3, 1, 3, 3, 5, 7, 6, 7];
        a.laswp(&piv, true).unwrap();
        a.laswp(&piv, false).unwrap();
        let after = full(&a);
        assert_eq!(before, after);
    });
}
