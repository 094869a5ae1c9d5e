//! In-process multi-rank communicator backed by threads.
//!
//! `ThreadComm` gives each rank a handle onto shared state guarded by a
//! reusable barrier, so the distributed algorithms can be exercised in one
//! process. Collectives follow a publish / read / clear phase discipline;
//! the bulk-synchronous contract (all ranks call the same collectives in the
//! same order) is assumed, as it is under MPI.

use std::collections::HashMap;
use std::sync::{Arc, Barrier, Mutex, MutexGuard};

use crate::comm::{combine, Communicator, DType, ReduceOp};
use crate::error::{CommError, Result};

struct Shared {
    size: usize,
    barrier: Barrier,
    bcast_slot: Mutex<Vec<u8>>,
    reduce_slot: Mutex<Option<Vec<u8>>>,
    split_table: Mutex<Vec<Option<(Option<usize>, usize)>>>,
    subgroups: Mutex<HashMap<usize, Arc<Shared>>>,
}

impl Shared {
    fn new(size: usize) -> Self {
        Self {
            size,
            barrier: Barrier::new(size),
            bcast_slot: Mutex::new(Vec::new()),
            reduce_slot: Mutex::new(None),
            split_table: Mutex::new(vec![None; size]),
            subgroups: Mutex::new(HashMap::new()),
        }
    }
}

fn lock<T>(m: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    m.lock().map_err(|_| CommError::Poisoned)
}

/// One rank's endpoint of an in-process communicator group.
pub struct ThreadComm {
    shared: Arc<Shared>,
    rank: usize,
}

impl ThreadComm {
    /// Create the endpoints of an `n`-rank group.
    pub fn group(n: usize) -> Vec<Arc<dyn Communicator>> {
        let shared = Arc::new(Shared::new(n));
        (0..n)
            .map(|rank| {
                Arc::new(ThreadComm {
                    shared: shared.clone(),
                    rank,
                }) as Arc<dyn Communicator>
            })
            .collect()
    }

    /// Run an SPMD closure on `n` ranks, one thread per rank, and collect the
    /// per-rank results in rank order. A panicking rank propagates the panic.
    pub fn run<R, F>(n: usize, f: F) -> Vec<R>
    where
        R: Send,
        F: Fn(Arc<dyn Communicator>) -> R + Sync,
    {
        let comms = Self::group(n);
        std::thread::scope(|s| {
            let handles: Vec<_> = comms
                .into_iter()
                .map(|comm| {
                    let f = &f;
                    s.spawn(move || f(comm))
                })
                .collect();
            handles
                .into_iter()
                .map(|h| match h.join() {
                    Ok(r) => r,
                    Err(e) => std::panic::resume_unwind(e),
                })
                .collect()
        })
    }
}

impl Communicator for ThreadComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.shared.size
    }

    fn barrier(&self) {
        self.shared.barrier.wait();
    }

    fn bcast_bytes(&self, buf: &mut [u8], root: usize) -> Result<()> {
        let sh = &self.shared;
        if root >= sh.size {
            return Err(CommError::RootOutOfRange {
                root,
                size: sh.size,
            });
        }
        if sh.size == 1 {
            return Ok(());
        }
        sh.barrier.wait();
        if self.rank == root {
            let mut slot = lock(&sh.bcast_slot)?;
            slot.clear();
            slot.extend_from_slice(buf);
        }
        sh.barrier.wait();
        let result = if self.rank != root {
            let slot = lock(&sh.bcast_slot)?;
            if slot.len() != buf.len() {
                Err(CommError::PayloadMismatch {
                    sent: slot.len(),
                    expected: buf.len(),
                })
            } else {
                buf.copy_from_slice(&slot);
                Ok(())
            }
        } else {
            Ok(())
        };
        sh.barrier.wait();
        result
    }

    fn allreduce(&self, buf: &mut [u8], dtype: DType, op: ReduceOp) -> Result<()> {
        let sh = &self.shared;
        if sh.size == 1 {
            return Ok(());
        }
        sh.barrier.wait();
        {
            let mut slot = lock(&sh.reduce_slot)?;
            match slot.as_mut() {
                None => *slot = Some(buf.to_vec()),
                Some(acc) => combine(acc, buf, dtype, op)?,
            }
        }
        sh.barrier.wait();
        let result = {
            let slot = lock(&sh.reduce_slot)?;
            match slot.as_ref() {
                Some(acc) if acc.len() == buf.len() => {
                    buf.copy_from_slice(acc);
                    Ok(())
                }
                Some(acc) => Err(CommError::ReduceMismatch {
                    expected: acc.len(),
                    got: buf.len(),
                }),
                None => Err(CommError::Poisoned),
            }
        };
        sh.barrier.wait();
        if self.rank == 0 {
            *lock(&sh.reduce_slot)? = None;
        }
        sh.barrier.wait();
        result
    }

    fn split(&self, color: Option<usize>, key: usize) -> Result<Option<Arc<dyn Communicator>>> {
        let sh = &self.shared;
        sh.barrier.wait();
        {
            let mut table = lock(&sh.split_table)?;
            table[self.rank] = Some((color, key));
        }
        sh.barrier.wait();
        let result = (|| -> Result<Option<Arc<dyn Communicator>>> {
            let my_color = match color {
                Some(c) => c,
                None => return Ok(None),
            };
            let table = lock(&sh.split_table)?.clone();
            let mut members: Vec<(usize, usize)> = table
                .iter()
                .enumerate()
                .filter_map(|(r, e)| match e {
                    Some((Some(c), k)) if *c == my_color => Some((*k, r)),
                    _ => None,
                })
                .collect();
            members.sort_unstable();
            let my_index = members
                .iter()
                .position(|&(_, r)| r == self.rank)
                .ok_or(CommError::SplitFailed)?;
            let group = {
                let mut groups = lock(&sh.subgroups)?;
                groups
                    .entry(my_color)
                    .or_insert_with(|| Arc::new(Shared::new(members.len())))
                    .clone()
            };
            Ok(Some(Arc::new(ThreadComm {
                shared: group,
                rank: my_index,
            }) as Arc<dyn Communicator>))
        })();
        sh.barrier.wait();
        if self.rank == 0 {
            lock(&sh.split_table)?.iter_mut().for_each(|e| *e = None);
            lock(&sh.subgroups)?.clear();
        }
        sh.barrier.wait();
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::helpers::{allreduce_scalars, bcast_scalars, bcast_vec};

    #[test]
    fn test_bcast_across_ranks() {
        let vals = ThreadComm::run(4, |comm| {
            let mut buf = if comm.rank() == 2 {
                [10u8, 20, 30]
            } else {
                [0u8; 3]
            };
            comm.bcast_bytes(&mut buf, 2).unwrap();
            buf
        });
        for v in vals {
            assert_eq!(v, [10, 20, 30]);
        }
    }

    #[test]
    fn test_allreduce_sum() {
        let vals = ThreadComm::run(3, |comm| {
            let mut buf = vec![comm.rank() as f64, 1.0];
            allreduce_scalars(comm.as_ref(), &mut buf, ReduceOp::Sum).unwrap();
            buf
        });
        for v in vals {
            assert_eq!(v, vec![3.0, 3.0]);
        }
    }

    #[test]
    fn test_allreduce_max_u64() {
        let vals = ThreadComm::run(4, |comm| {
            let mut buf = vec![comm.rank() as u64 * 10];
            allreduce_scalars(comm.as_ref(), &mut buf, ReduceOp::Max).unwrap();
            buf[0]
        });
        for v in vals {
            assert_eq!(v, 30);
        }
    }

    #[test]
    fn test_split_rows() {
        // 4 ranks in a 2x2 arrangement; split by row index.
        let vals = ThreadComm::run(4, |comm| {
            let prow = comm.rank() % 2;
            let pcol = comm.rank() / 2;
            let sub = comm.split(Some(prow), pcol).unwrap().unwrap();
            // Sub-communicator holds the two ranks of this grid row,
            // ordered by column.
            assert_eq!(sub.size(), 2);
            assert_eq!(sub.rank(), pcol);
            let mut buf = vec![if sub.rank() == 0 { comm.rank() as u64 } else { 0 }];
            bcast_scalars(sub.as_ref(), &mut buf, 0).unwrap();
            buf[0]
        });
        // Roots are global ranks 0 (row 0) and 1 (row 1).
        assert_eq!(vals, vec![0, 1, 0, 1]);
    }

    #[test]
    fn test_split_none_excluded() {
        let vals = ThreadComm::run(3, |comm| {
            let color = if comm.rank() == 2 { None } else { Some(0) };
            let sub = comm.split(color, comm.rank()).unwrap();
            sub.map(|s| s.size())
        });
        assert_eq!(vals, vec![Some(2), Some(2), None]);
    }

    #[test]
    fn test_bcast_vec_resizes() {
        let vals = ThreadComm::run(2, |comm| {
            let mut v: Vec<f64> = if comm.rank() == 0 {
                vec![1.0, 2.0, 3.0]
            } else {
                Vec::new()
            };
            bcast_vec(comm.as_ref(), &mut v, 0).unwrap();
            v
        });
        for v in vals {
            assert_eq!(v, vec![1.0, 2.0, 3.0]);
        }
    }

    #[test]
    fn test_consecutive_collectives() {
        let vals = ThreadComm::run(2, |comm| {
            let mut out = Vec::new();
            for round in 0..5u64 {
                let mut buf = vec![if comm.rank() == 0 { round } else { 0 }];
                bcast_scalars(comm.as_ref(), &mut buf, 0).unwrap();
                out.push(buf[0]);
            }
            out
        });
        for v in vals {
            assert_eq!(v, vec![0, 1, 2, 3, 4]);
        }
    }
}
