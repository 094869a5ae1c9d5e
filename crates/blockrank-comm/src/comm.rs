//! Message-passing seam used by the distributed BLR algorithms.
//!
//! The engine only needs a handful of collectives: broadcast, lane-wise
//! all-reduce, barrier, and communicator splitting. They are pinned here as
//! an object-safe trait over byte buffers; typed helpers in
//! [`crate::helpers`] lift them to scalar slices. An MPI-backed
//! implementation can be slotted in without touching the algorithms.

use std::sync::Arc;

use crate::error::{CommError, Result};

/// Element type of a reduction buffer, fixing the lane width and arithmetic.
///
/// Complex buffers reduce component-wise, so they use the lane type of their
/// real representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DType {
    /// 4-byte IEEE float lanes.
    F32,
    /// 8-byte IEEE float lanes.
    F64,
    /// 8-byte unsigned integer lanes.
    U64,
}

/// Combining operation of an all-reduce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReduceOp {
    /// Lane-wise sum.
    Sum,
    /// Lane-wise maximum.
    Max,
}

/// Collective communication endpoint for one rank.
///
/// Every method is a blocking collective: all ranks of the communicator must
/// call it, in the same order, with compatible arguments (the
/// bulk-synchronous contract of the engine).
pub trait Communicator: Send + Sync {
    /// Rank of the caller within this communicator.
    fn rank(&self) -> usize;

    /// Number of ranks in this communicator.
    fn size(&self) -> usize;

    /// True on rank 0.
    fn is_root(&self) -> bool {
        self.rank() == 0
    }

    /// Block until every rank has arrived.
    fn barrier(&self);

    /// Broadcast `buf` from `root` to every rank. Buffer lengths must match
    /// across ranks.
    fn bcast_bytes(&self, buf: &mut [u8], root: usize) -> Result<()>;

    /// Combine `buf` across ranks lane-wise and leave the result in every
    /// rank's buffer.
    fn allreduce(&self, buf: &mut [u8], dtype: DType, op: ReduceOp) -> Result<()>;

    /// Collectively split into sub-communicators by `color`; ranks passing
    /// `None` receive no sub-communicator. Ranks sharing a color are ordered
    /// by `(key, rank)`.
    fn split(&self, color: Option<usize>, key: usize) -> Result<Option<Arc<dyn Communicator>>>;
}

/// Lane-wise combine of `other` into `acc`.
pub(crate) fn combine(acc: &mut [u8], other: &[u8], dtype: DType, op: ReduceOp) -> Result<()> {
    if acc.len() != other.len() {
        return Err(CommError::ReduceMismatch {
            expected: acc.len(),
            got: other.len(),
        });
    }
    match dtype {
        DType::F32 => {
            for (a, b) in acc.chunks_exact_mut(4).zip(other.chunks_exact(4)) {
                let x = f32::from_ne_bytes([a[0], a[1], a[2], a[3]]);
                let y = f32::from_ne_bytes([b[0], b[1], b[2], b[3]]);
                let r = match op {
                    ReduceOp::Sum => x + y,
                    ReduceOp::Max => x.max(y),
                };
                a.copy_from_slice(&r.to_ne_bytes());
            }
        }
        DType::F64 => {
            for (a, b) in acc.chunks_exact_mut(8).zip(other.chunks_exact(8)) {
                let x = f64::from_ne_bytes([a[0], a[1], a[2], a[3], a[4], a[5], a[6], a[7]]);
                let y = f64::from_ne_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]);
                let r = match op {
                    ReduceOp::Sum => x + y,
                    ReduceOp::Max => x.max(y),
                };
                a.copy_from_slice(&r.to_ne_bytes());
            }
        }
        DType::U64 => {
            for (a, b) in acc.chunks_exact_mut(8).zip(other.chunks_exact(8)) {
                let x = u64::from_ne_bytes([a[0], a[1], a[2], a[3], a[4], a[5], a[6], a[7]]);
                let y = u64::from_ne_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]);
                let r = match op {
                    ReduceOp::Sum => x.wrapping_add(y),
                    ReduceOp::Max => x.max(y),
                };
                a.copy_from_slice(&r.to_ne_bytes());
            }
        }
    }
    Ok(())
}

/// Single-rank communicator: every collective is the identity.
#[derive(Debug, Default, Clone, Copy)]
pub struct SelfComm;

impl Communicator for SelfComm {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn barrier(&self) {}

    fn bcast_bytes(&self, _buf: &mut [u8], root: usize) -> Result<()> {
        if root != 0 {
            return Err(CommError::RootOutOfRange { root, size: 1 });
        }
        Ok(())
    }

    fn allreduce(&self, _buf: &mut [u8], _dtype: DType, _op: ReduceOp) -> Result<()> {
        Ok(())
    }

    fn split(&self, color: Option<usize>, _key: usize) -> Result<Option<Arc<dyn Communicator>>> {
        Ok(color.map(|_| Arc::new(SelfComm) as Arc<dyn Communicator>))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_self_comm() {
        let c = SelfComm;
        assert_eq!(c.rank(), 0);
        assert_eq!(c.size(), 1);
        assert!(c.is_root());
        let mut buf = [1u8, 2, 3];
        c.bcast_bytes(&mut buf, 0).unwrap();
        assert_eq!(buf, [1, 2, 3]);
        assert!(c.bcast_bytes(&mut buf, 1).is_err());
        assert!(c.split(Some(0), 0).unwrap().is_some());
        assert!(c.split(None, 0).unwrap().is_none());
    }

    #[test]
    fn test_combine_f64_sum() {
        let mut a = Vec::new();
        a.extend_from_slice(&1.5f64.to_ne_bytes());
        a.extend_from_slice(&(-2.0f64).to_ne_bytes());
        let mut b = Vec::new();
        b.extend_from_slice(&0.5f64.to_ne_bytes());
        b.extend_from_slice(&3.0f64.to_ne_bytes());
        combine(&mut a, &b, DType::F64, ReduceOp::Sum).unwrap();
        let x = f64::from_ne_bytes(a[0..8].try_into().unwrap());
        let y = f64::from_ne_bytes(a[8..16].try_into().unwrap());
        assert_eq!(x, 2.0);
        assert_eq!(y, 1.0);
    }

    #[test]
    fn test_combine_u64_max() {
        let mut a = 7u64.to_ne_bytes().to_vec();
        let b = 9u64.to_ne_bytes().to_vec();
        combine(&mut a, &b, DType::U64, ReduceOp::Max).unwrap();
        assert_eq!(u64::from_ne_bytes(a.try_into().unwrap()), 9);
    }
}
