//! Distributed level-2/3 operations on BLR matrices.
//!
//! `trsv` and `gemv` work on replicated vectors: the single-block-column
//! operand is assembled on every rank by an owner-writes all-reduce, tiles
//! contribute through the rank-aware `gemv` kernel, and the owners of the
//! result write their slices back. `trsm` and `gemm` reuse the panel
//! broadcasts of the factorization. The triangular and product operands of
//! the distributed `trsm`/`gemm` must be `NoTrans`: a transposed operand
//! would need its tiles redistributed across the grid, which the
//! sub-communicator broadcasts cannot express. Tile-level kernels accept all
//! transposition modes.

use blockrank_comm::{allreduce_scalars, bcast_scalars, ReduceOp};
use blockrank_dense::{Diag, Matrix, Side, Trans, UpLo};

use crate::blr::{BlrMatrix, BlrScalar};
use crate::error::{BlrError, Result};
use crate::tile::Tile;

/// Gather a single-block-column BLR matrix into a replicated dense vector.
/// Collective on the full communicator.
fn replicate_vector<T: BlrScalar>(x: &BlrMatrix<T>) -> Result<Vec<T>> {
    let mut xv = vec![T::zero(); x.rows()];
    if x.active() {
        for (i, j) in x.local_tiles() {
            let tile = x.tile(i, j)?;
            let off = x.tileroff(i);
            for r in 0..x.tilerows(i) {
                xv[off + r] = tile.get(r, 0);
            }
        }
    }
    allreduce_scalars(x.grid().comm().as_ref(), &mut xv, ReduceOp::Sum)?;
    Ok(xv)
}

/// Scatter a replicated dense vector into the owned tiles of a
/// single-block-column BLR matrix.
fn scatter_vector<T: BlrScalar>(y: &mut BlrMatrix<T>, yv: &[T]) -> Result<()> {
    if !y.active() {
        return Ok(());
    }
    for (i, j) in y.local_tiles() {
        let off = y.tileroff(i);
        let d = Matrix::from_fn(y.tilerows(i), 1, |r, _| yv[off + r]);
        y.set_tile(i, j, Tile::from_dense(d))?;
    }
    Ok(())
}

fn check_vector<T: BlrScalar>(v: &BlrMatrix<T>, what: &'static str) -> Result<()> {
    if v.colblocks() != 1 || v.cols() != 1 {
        return Err(BlrError::PartitionMismatch { what });
    }
    Ok(())
}

/// `y ← α·op(A)·x + β·y` with `x` and `y` single-block-column BLR matrices
/// sharing `A`'s partitions in the contracted and result dimensions.
/// Collective on the full communicator.
pub fn gemv<T: BlrScalar>(
    ta: Trans,
    alpha: T,
    a: &BlrMatrix<T>,
    x: &BlrMatrix<T>,
    beta: T,
    y: &mut BlrMatrix<T>,
) -> Result<()> {
    if !(a.same_grid(x) && a.same_grid(y)) {
        return Err(BlrError::GridMismatch);
    }
    check_vector(x, "gemv operand x must be a single block column")?;
    check_vector(y, "gemv operand y must be a single block column")?;
    let (in_offsets, out_offsets) = match ta {
        Trans::NoTrans => (a.col_offsets(), a.row_offsets()),
        Trans::Trans | Trans::ConjTrans => (a.row_offsets(), a.col_offsets()),
    };
    if x.row_offsets() != in_offsets || y.row_offsets() != out_offsets {
        return Err(BlrError::PartitionMismatch {
            what: "gemv vector partitions must match the matrix partition",
        });
    }

    let xv = replicate_vector(x)?;
    let out_len = *out_offsets.last().unwrap_or(&0);
    let mut pv = vec![T::zero(); out_len];
    if a.active() {
        for (i, j) in a.local_tiles() {
            let tile = a.tile(i, j)?;
            let (in_off, out_off) = match ta {
                Trans::NoTrans => (a.tilecoff(j), a.tileroff(i)),
                Trans::Trans | Trans::ConjTrans => (a.tileroff(i), a.tilecoff(j)),
            };
            tile.gemv_a(ta, T::one(), &xv[in_off..], 1, T::one(), &mut pv[out_off..], 1)?;
        }
    }
    allreduce_scalars(a.grid().comm().as_ref(), &mut pv, ReduceOp::Sum)?;

    let yv = replicate_vector(y)?;
    let merged: Vec<T> = yv
        .iter()
        .zip(pv.iter())
        .map(|(&yo, &p)| alpha * p + beta * yo)
        .collect();
    scatter_vector(y, &merged)
}

/// `b ← op(A)⁻¹·b` with a triangular BLR `A` and a single-block-column `b`.
/// Block forward/backward substitution on a replicated vector; each step
/// broadcasts the dense diagonal tile and all-reduces the partial updates.
/// Collective on the full communicator.
pub fn trsv<T: BlrScalar>(
    uplo: UpLo,
    ta: Trans,
    diag: Diag,
    a: &BlrMatrix<T>,
    b: &mut BlrMatrix<T>,
) -> Result<()> {
    if !a.same_grid(b) {
        return Err(BlrError::GridMismatch);
    }
    if a.row_offsets() != a.col_offsets() {
        return Err(BlrError::PartitionMismatch {
            what: "trsv requires identical row and column partitions",
        });
    }
    check_vector(b, "trsv operand b must be a single block column")?;
    if b.row_offsets() != a.row_offsets() {
        return Err(BlrError::PartitionMismatch {
            what: "trsv vector partition must match the matrix partition",
        });
    }

    let mut xv = replicate_vector(b)?;
    let brows = a.rowblocks();
    let forward = matches!(
        (uplo, ta),
        (UpLo::Lower, Trans::NoTrans) | (UpLo::Upper, Trans::Trans | Trans::ConjTrans)
    );
    let order: Vec<usize> = if forward {
        (0..brows).collect()
    } else {
        (0..brows).rev().collect()
    };

    for (step, &k) in order.iter().enumerate() {
        let mk = a.tilerows(k);
        let off_k = a.tileroff(k);
        // Dense diagonal tile to every rank.
        let mut dbuf = if a.grid().is_local(k, k) {
            a.tile_dense(k, k)?.data().to_vec()
        } else {
            vec![T::zero(); mk * mk]
        };
        bcast_scalars(a.grid().comm().as_ref(), &mut dbuf, a.grid().g2p(k, k))?;
        let akk = Matrix::from_col_major(mk, mk, dbuf);
        blockrank_dense::trsv(uplo, ta, diag, akk.as_ref(), &mut xv[off_k..], 1)?;

        // Partial updates of the still-unsolved blocks from owned tiles.
        let mut upd = vec![T::zero(); a.rows()];
        if a.active() {
            for &i2 in order.iter().skip(step + 1) {
                let off_i2 = a.tileroff(i2);
                match ta {
                    Trans::NoTrans => {
                        if a.grid().is_local(i2, k) {
                            a.tile(i2, k)?.gemv_a(
                                ta,
                                -T::one(),
                                &xv[off_k..],
                                1,
                                T::one(),
                                &mut upd[off_i2..],
                                1,
                            )?;
                        }
                    }
                    Trans::Trans | Trans::ConjTrans => {
                        if a.grid().is_local(k, i2) {
                            a.tile(k, i2)?.gemv_a(
                                ta,
                                -T::one(),
                                &xv[off_k..],
                                1,
                                T::one(),
                                &mut upd[off_i2..],
                                1,
                            )?;
                        }
                    }
                }
            }
        }
        allreduce_scalars(a.grid().comm().as_ref(), &mut upd, ReduceOp::Sum)?;
        for (xi, ui) in xv.iter_mut().zip(upd.iter()) {
            *xi += *ui;
        }
    }
    scatter_vector(b, &xv)
}

/// `B ← α·A⁻¹·B` (left) or `B ← α·B·A⁻¹` (right) with a triangular BLR `A`.
/// `A` must be `NoTrans`. Collective on the active ranks.
pub fn trsm<T: BlrScalar>(
    side: Side,
    uplo: UpLo,
    ta: Trans,
    diag: Diag,
    alpha: T,
    a: &BlrMatrix<T>,
    b: &mut BlrMatrix<T>,
    tasks: usize,
) -> Result<()> {
    if ta != Trans::NoTrans {
        return Err(BlrError::Unsupported {
            what: "distributed trsm with a transposed triangular operand",
        });
    }
    if !a.same_grid(b) {
        return Err(BlrError::GridMismatch);
    }
    if a.row_offsets() != a.col_offsets() {
        return Err(BlrError::PartitionMismatch {
            what: "trsm requires identical row and column partitions",
        });
    }
    let contracted = match side {
        Side::Left => b.row_offsets(),
        Side::Right => b.col_offsets(),
    };
    if contracted != a.row_offsets() {
        return Err(BlrError::PartitionMismatch {
            what: "trsm operand must share the triangular partition in the contracting dimension",
        });
    }
    if !a.active() {
        return Ok(());
    }
    if alpha != T::one() {
        for (i, j) in b.local_tiles() {
            b.tile_mut(i, j)?.scale(alpha);
        }
    }

    let nblocks = a.rowblocks();
    let forward = match (side, uplo) {
        (Side::Left, UpLo::Lower) | (Side::Right, UpLo::Upper) => true,
        _ => false,
    };
    let order: Vec<usize> = if forward {
        (0..nblocks).collect()
    } else {
        (0..nblocks).rev().collect()
    };

    for &k in &order {
        match side {
            Side::Left => {
                if a.grid().is_local_row(k) {
                    let akk = a.bcast_dense_tile_along_row(k, k)?;
                    for j in 0..b.colblocks() {
                        if b.grid().is_local_col(j) {
                            b.tile_mut(k, j)?.trsm_b(
                                side,
                                uplo,
                                ta,
                                diag,
                                T::one(),
                                akk.as_ref(),
                                tasks,
                            )?;
                        }
                    }
                }
                let urow = b.bcast_row_of_tiles_along_cols(k, 0, b.colblocks())?;
                let (i0, i1) = if forward { (k + 1, nblocks) } else { (0, k) };
                let lcol = a.bcast_col_of_tiles_along_rows(i0, i1, k)?;
                b.accumulate_panel_product(i0, i1, 0, b.colblocks(), &lcol, &urow, -T::one(), tasks)?;
            }
            Side::Right => {
                if a.grid().is_local_col(k) {
                    let akk = a.bcast_dense_tile_along_col(k, k)?;
                    for i in 0..b.rowblocks() {
                        if b.grid().is_local_row(i) {
                            b.tile_mut(i, k)?.trsm_b(
                                side,
                                uplo,
                                ta,
                                diag,
                                T::one(),
                                akk.as_ref(),
                                tasks,
                            )?;
                        }
                    }
                }
                let lcol = b.bcast_col_of_tiles_along_rows(0, b.rowblocks(), k)?;
                let (j0, j1) = if forward { (k + 1, nblocks) } else { (0, k) };
                let urow = a.bcast_row_of_tiles_along_cols(k, j0, j1)?;
                b.accumulate_panel_product(0, b.rowblocks(), j0, j1, &lcol, &urow, -T::one(), tasks)?;
            }
        }
    }
    Ok(())
}

/// `C ← α·A·B + β·C` over BLR matrices sharing a grid and compatible
/// partitions; `A` and `B` must be `NoTrans`. `C`'s tiles are materialized
/// dense. Collective on the active ranks.
pub fn gemm<T: BlrScalar>(
    ta: Trans,
    tb: Trans,
    alpha: T,
    a: &BlrMatrix<T>,
    b: &BlrMatrix<T>,
    beta: T,
    c: &mut BlrMatrix<T>,
    tasks: usize,
) -> Result<()> {
    if ta != Trans::NoTrans || tb != Trans::NoTrans {
        return Err(BlrError::Unsupported {
            what: "distributed gemm with transposed operands",
        });
    }
    if !(a.same_grid(b) && a.same_grid(c)) {
        return Err(BlrError::GridMismatch);
    }
    if a.col_offsets() != b.row_offsets()
        || c.row_offsets() != a.row_offsets()
        || c.col_offsets() != b.col_offsets()
    {
        return Err(BlrError::PartitionMismatch {
            what: "gemm operands must share partitions in matching dimensions",
        });
    }
    if !a.active() {
        return Ok(());
    }

    for (i, j) in c.local_tiles() {
        if beta == T::zero() {
            let m = c.tilerows(i);
            let n = c.tilecols(j);
            c.set_tile(i, j, Tile::zeros(m, n))?;
        } else {
            c.densify_tile(i, j)?;
            if beta != T::one() {
                c.tile_mut(i, j)?.scale(beta);
            }
        }
    }

    for k in 0..a.colblocks() {
        let lcol = a.bcast_col_of_tiles_along_rows(0, a.rowblocks(), k)?;
        let urow = b.bcast_row_of_tiles_along_cols(k, 0, b.colblocks())?;
        c.accumulate_panel_product(
            0,
            c.rowblocks(),
            0,
            c.colblocks(),
            &lcol,
            &urow,
            alpha,
            tasks,
        )?;
    }
    Ok(())
}
