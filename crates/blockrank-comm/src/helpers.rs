//! Typed helpers over the byte-oriented communicator trait.

use bytemuck::Pod;
use num_complex::{Complex32, Complex64};

use crate::comm::{Communicator, DType, ReduceOp};
use crate::error::Result;

/// POD element that can cross the communicator, with the lane type used for
/// reductions. Complex values reduce component-wise.
pub trait CommElem: Pod {
    /// Reduction lane type.
    const DTYPE: DType;
}

impl CommElem for f32 {
    const DTYPE: DType = DType::F32;
}

impl CommElem for f64 {
    const DTYPE: DType = DType::F64;
}

impl CommElem for u64 {
    const DTYPE: DType = DType::U64;
}

impl CommElem for u8 {
    const DTYPE: DType = DType::U64;
}

impl CommElem for Complex32 {
    const DTYPE: DType = DType::F32;
}

impl CommElem for Complex64 {
    const DTYPE: DType = DType::F64;
}

/// Broadcast a fixed-size scalar slice from `root`.
pub fn bcast_scalars<T: CommElem>(
    comm: &dyn Communicator,
    buf: &mut [T],
    root: usize,
) -> Result<()> {
    comm.bcast_bytes(bytemuck::cast_slice_mut(buf), root)
}

/// Broadcast a variable-length vector from `root`; receivers are resized to
/// the root's length first.
pub fn bcast_vec<T: CommElem>(comm: &dyn Communicator, v: &mut Vec<T>, root: usize) -> Result<()> {
    let mut len = [v.len() as u64];
    bcast_scalars(comm, &mut len, root)?;
    if comm.rank() != root {
        v.resize(len[0] as usize, T::zeroed());
    }
    comm.bcast_bytes(bytemuck::cast_slice_mut(v.as_mut_slice()), root)
}

/// All-reduce a scalar slice lane-wise.
pub fn allreduce_scalars<T: CommElem>(
    comm: &dyn Communicator,
    buf: &mut [T],
    op: ReduceOp,
) -> Result<()> {
    comm.allreduce(bytemuck::cast_slice_mut(buf), T::DTYPE, op)
}

/// All-reduce a single `u64` (counters, status flags).
pub fn allreduce_u64(comm: &dyn Communicator, val: u64, op: ReduceOp) -> Result<u64> {
    let mut buf = [val];
    allreduce_scalars(comm, &mut buf, op)?;
    Ok(buf[0])
}
