//! Thin façade over intra-process (thread mailbox) or inter-process (MPI)
//! message passing.
//!
//! Messages are *contiguous byte slices* (no zero-copy guarantees).
//! All handles are **waitable** but non-blocking — the halo exchange and
//! the collectives call `.wait()` before they trust that a buffer is ready.

use bytes::Bytes;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicU16, Ordering::Relaxed};
use std::thread::JoinHandle;

/// Non-blocking communication interface (minimal by design).
///
/// Collectives (reductions, halo builds) derive their message tags from
/// [`Communicator::next_collective_tag`]; every rank must issue the same
/// sequence of collective calls for the tags to line up.
pub trait Communicator: Send + Sync {
    /// Handle returned by `isend`.
    type SendHandle: Wait;
    /// Handle returned by `irecv`.
    type RecvHandle: Wait;

    /// Rank of the calling process in `0..size()`.
    fn rank(&self) -> usize;
    /// Number of communicating processes.
    fn size(&self) -> usize;

    fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> Self::SendHandle;
    fn irecv(&self, peer: usize, tag: u16, buf: &mut [u8]) -> Self::RecvHandle;

    /// Per-instance monotonically increasing tag for collective epochs.
    fn next_collective_tag(&self) -> u16;
}

/// Anything that can be waited on.
pub trait Wait {
    /// Wait for completion and return the received data (if any).
    fn wait(self) -> Option<Vec<u8>>;
}

impl Wait for () {
    fn wait(self) -> Option<Vec<u8>> {
        None
    }
}

/// Compile-time no-op comm for pure serial runs and unit tests.
#[derive(Clone, Debug, Default)]
pub struct NoComm;

impl Communicator for NoComm {
    type SendHandle = ();
    type RecvHandle = ();

    fn rank(&self) -> usize {
        0
    }
    fn size(&self) -> usize {
        1
    }

    fn isend(&self, _peer: usize, _tag: u16, _buf: &[u8]) {}
    fn irecv(&self, _peer: usize, _tag: u16, _buf: &mut [u8]) {}

    fn next_collective_tag(&self) -> u16 {
        0
    }
}

// --- LocalComm: intra-process / multi-thread ---

type Key = (usize, usize, u16); // (src, dst, tag)

static MAILBOX: Lazy<DashMap<Key, Bytes>> = Lazy::new(DashMap::new);

pub struct LocalHandle {
    buf: Arc<Mutex<Option<Vec<u8>>>>,
    handle: Option<JoinHandle<()>>,
}

impl Wait for LocalHandle {
    fn wait(mut self) -> Option<Vec<u8>> {
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
        let mut guard = self.buf.lock();
        guard.take()
    }
}

/// Thread-backed communicator: one instance per simulated rank, all sharing
/// a process-global mailbox. Used by the multi-rank integration tests.
#[derive(Debug)]
pub struct LocalComm {
    rank: usize,
    size: usize,
    collective_tag: AtomicU16,
}

impl LocalComm {
    pub fn new(rank: usize, size: usize) -> Self {
        Self {
            rank,
            size,
            collective_tag: AtomicU16::new(0x8000),
        }
    }

    /// Drop any stale message left over by a failed exchange. Tests sharing
    /// the global mailbox call this between scenarios.
    pub fn clear_mailbox() {
        MAILBOX.clear();
    }
}

impl Communicator for LocalComm {
    type SendHandle = ();
    type RecvHandle = LocalHandle;

    fn rank(&self) -> usize {
        self.rank
    }
    fn size(&self) -> usize {
        self.size
    }

    fn isend(&self, peer: usize, tag: u16, buf: &[u8]) {
        let key = (self.rank, peer, tag);
        MAILBOX.insert(key, Bytes::from(buf.to_vec()));
    }

    fn irecv(&self, peer: usize, tag: u16, buf: &mut [u8]) -> LocalHandle {
        let key = (peer, self.rank, tag);
        let buf_arc = Arc::new(Mutex::new(None));
        let buf_arc_clone = buf_arc.clone();
        let buf_len = buf.len();
        let handle = std::thread::spawn(move || {
            loop {
                if let Some(bytes) = MAILBOX.remove(&key).map(|(_, v)| v) {
                    let mut guard = buf_arc_clone.lock();
                    *guard = Some(bytes[..buf_len.min(bytes.len())].to_vec());
                    break;
                }
                std::thread::yield_now();
            }
        });
        LocalHandle {
            buf: buf_arc,
            handle: Some(handle),
        }
    }

    fn next_collective_tag(&self) -> u16 {
        // Wrap inside the collective tag space so long runs stay valid.
        let t = self.collective_tag.fetch_add(1, Relaxed);
        if t == u16::MAX {
            self.collective_tag.store(0x8000, Relaxed);
        }
        t
    }
}

// --- MPI backend (feature = "mpi-support") ---
#[cfg(feature = "mpi-support")]
#[cfg_attr(docsrs, doc(cfg(feature = "mpi-support")))]
mod mpi_backend {
    use super::*;
    use mpi::topology::SimpleCommunicator;
    use mpi::traits::*;

    pub struct MpiComm {
        pub world: &'static SimpleCommunicator,
        pub rank: usize,
        pub size: usize,
        collective_tag: AtomicU16,
    }

    impl MpiComm {
        /// Initialize MPI and leak the world communicator; the process owns
        /// MPI for its whole lifetime, so the leak is intentional.
        pub fn new() -> Self {
            let universe = mpi::initialize().expect("MPI initialization failed");
            let world: &'static SimpleCommunicator = Box::leak(Box::new(universe.world()));
            let rank = world.rank() as usize;
            let size = world.size() as usize;
            std::mem::forget(universe);
            Self {
                world,
                rank,
                size,
                collective_tag: AtomicU16::new(0x8000),
            }
        }
    }

    /// Completed-send marker, or a deferred receive resolved at wait time.
    pub enum MpiHandle {
        Sent,
        Recv {
            world: &'static SimpleCommunicator,
            peer: usize,
            tag: u16,
        },
    }

    impl Wait for MpiHandle {
        fn wait(self) -> Option<Vec<u8>> {
            match self {
                MpiHandle::Sent => None,
                MpiHandle::Recv { world, peer, tag } => {
                    let (data, _status) = world
                        .process_at_rank(peer as i32)
                        .receive_vec_with_tag::<u8>(tag as i32);
                    Some(data)
                }
            }
        }
    }

    impl Communicator for MpiComm {
        type SendHandle = MpiHandle;
        type RecvHandle = MpiHandle;

        fn rank(&self) -> usize {
            self.rank
        }
        fn size(&self) -> usize {
            self.size
        }

        fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> MpiHandle {
            // Standard-mode send: messages here are small relative to the
            // eager threshold, and every receive is posted by wait().
            self.world
                .process_at_rank(peer as i32)
                .send_with_tag(buf, tag as i32);
            MpiHandle::Sent
        }

        fn irecv(&self, peer: usize, tag: u16, _buf: &mut [u8]) -> MpiHandle {
            MpiHandle::Recv {
                world: self.world,
                peer,
                tag,
            }
        }

        fn next_collective_tag(&self) -> u16 {
            let t = self.collective_tag.fetch_add(1, Relaxed);
            if t == u16::MAX {
                self.collective_tag.store(0x8000, Relaxed);
            }
            t
        }
    }
}

#[cfg(feature = "mpi-support")]
pub use mpi_backend::MpiComm;
