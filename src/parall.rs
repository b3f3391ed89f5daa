//! Global reductions over a [`Communicator`].
//!
//! These are collective: every rank must call them in the same order, with
//! the same operation. The exchange is a naive all-to-all, which is the
//! right trade-off for the handful of scalar reductions per timestep the
//! core performs (clip counters, min/max diagnostics, RHS norms).

use crate::comm::{Communicator, Wait};
use crate::error::FvMeshError;

/// All-reduce a fixed-size plain-old-data value with a user combiner.
pub fn allreduce<C, T, F>(comm: &C, value: T, combine: F) -> Result<T, FvMeshError>
where
    C: Communicator,
    T: bytemuck::Pod,
    F: Fn(T, T) -> T,
{
    let size = comm.size();
    if size <= 1 {
        return Ok(value);
    }
    let tag = comm.next_collective_tag();
    let me = comm.rank();
    let bytes = bytemuck::bytes_of(&value).to_vec();

    let mut recvs = Vec::with_capacity(size - 1);
    for peer in 0..size {
        if peer == me {
            continue;
        }
        let mut buf = vec![0u8; bytes.len()];
        recvs.push((peer, comm.irecv(peer, tag, &mut buf)));
    }
    for peer in 0..size {
        if peer == me {
            continue;
        }
        comm.isend(peer, tag, &bytes).wait();
    }
    // Fold in rank order so every rank applies the combiner in the same
    // sequence and floating-point results agree bit-for-bit.
    let mut by_rank: Vec<Option<T>> = vec![None; size];
    by_rank[me] = Some(value);
    for (peer, handle) in recvs {
        let data = handle.wait().ok_or_else(|| FvMeshError::Comm {
            neighbor: peer,
            detail: "reduction receive returned no data".into(),
        })?;
        if data.len() != bytes.len() {
            return Err(FvMeshError::Comm {
                neighbor: peer,
                detail: format!(
                    "reduction size mismatch: got {} bytes, expected {}",
                    data.len(),
                    bytes.len()
                ),
            });
        }
        by_rank[peer] = Some(bytemuck::pod_read_unaligned(&data));
    }
    let mut acc: Option<T> = None;
    for v in by_rank.into_iter().flatten() {
        acc = Some(match acc {
            None => v,
            Some(a) => combine(a, v),
        });
    }
    Ok(acc.expect("reduction over at least one rank"))
}

/// Global sum of an unsigned counter.
pub fn counter<C: Communicator>(comm: &C, value: &mut u64) -> Result<(), FvMeshError> {
    *value = allreduce(comm, *value, |a, b| a + b)?;
    Ok(())
}

/// Global sum of a real value.
pub fn sum_f64<C: Communicator>(comm: &C, value: &mut f64) -> Result<(), FvMeshError> {
    *value = allreduce(comm, *value, |a, b| a + b)?;
    Ok(())
}

/// Global minimum of a real value.
pub fn min_f64<C: Communicator>(comm: &C, value: &mut f64) -> Result<(), FvMeshError> {
    *value = allreduce(comm, *value, f64::min)?;
    Ok(())
}

/// Global maximum of a real value.
pub fn max_f64<C: Communicator>(comm: &C, value: &mut f64) -> Result<(), FvMeshError> {
    *value = allreduce(comm, *value, f64::max)?;
    Ok(())
}

/// Exclusive prefix sum over ranks: returns `(offset, total)` where
/// `offset` is the sum of `value` over all lower ranks.
pub fn exclusive_scan_u64<C: Communicator>(
    comm: &C,
    value: u64,
) -> Result<(u64, u64), FvMeshError> {
    let size = comm.size();
    if size <= 1 {
        return Ok((0, value));
    }
    let me = comm.rank();
    let tag = comm.next_collective_tag();

    let mut recvs = Vec::with_capacity(size - 1);
    for peer in 0..size {
        if peer == me {
            continue;
        }
        let mut buf = [0u8; 8];
        recvs.push((peer, comm.irecv(peer, tag, &mut buf)));
    }
    for peer in 0..size {
        if peer == me {
            continue;
        }
        comm.isend(peer, tag, &value.to_le_bytes()).wait();
    }
    let mut offset = 0u64;
    let mut total = value;
    for (peer, handle) in recvs {
        let data = handle.wait().ok_or_else(|| FvMeshError::Comm {
            neighbor: peer,
            detail: "scan receive returned no data".into(),
        })?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&data[..8]);
        let v = u64::from_le_bytes(raw);
        total += v;
        if peer < me {
            offset += v;
        }
    }
    Ok((offset, total))
}

/// Global dot product over the owned range of two cell arrays.
pub fn gdot<C: Communicator>(comm: &C, x: &[f64], y: &[f64]) -> Result<f64, FvMeshError> {
    debug_assert_eq!(x.len(), y.len());
    let mut local = 0.0;
    for (a, b) in x.iter().zip(y.iter()) {
        local += a * b;
    }
    sum_f64(comm, &mut local)?;
    Ok(local)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::{LocalComm, NoComm};
    use serial_test::serial;

    #[test]
    fn nocomm_reductions_are_identity() {
        let comm = NoComm;
        let mut v = 42u64;
        counter(&comm, &mut v).unwrap();
        assert_eq!(v, 42);
        let mut x = -3.5;
        min_f64(&comm, &mut x).unwrap();
        assert_eq!(x, -3.5);
    }

    #[test]
    #[serial]
    fn two_rank_sum_and_min() {
        LocalComm::clear_mailbox();
        let handles: Vec<_> = (0..2)
            .map(|rank| {
                std::thread::spawn(move || {
                    let comm = LocalComm::new(rank, 2);
                    let mut n = (rank as u64) + 1;
                    counter(&comm, &mut n).unwrap();
                    let mut lo = if rank == 0 { 5.0 } else { -2.0 };
                    min_f64(&comm, &mut lo).unwrap();
                    (n, lo)
                })
            })
            .collect();
        for h in handles {
            let (n, lo) = h.join().unwrap();
            assert_eq!(n, 3);
            assert_eq!(lo, -2.0);
        }
    }
}
