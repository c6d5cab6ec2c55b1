//! Thin façade over intra-process (threads) or inter-process (MPI) message passing.
//!
//! Messages are *contiguous byte slices* (no zero-copy guarantees).
//! All handles are **waitable** but non-blocking: exchange.rs calls
//! `.wait()` before it trusts that the buffer is ready.
//!
//! Messages between a given `(source, destination, tag)` triple are delivered
//! in FIFO order. The collective layer relies on that: every rank issues its
//! collectives in the same relative order, so repeated use of one tag pairs up
//! correctly.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use dashmap::DashMap;
use once_cell::sync::Lazy;

/// Non-blocking point-to-point communication interface.
pub trait Communicator: Clone + 'static {
    /// Handle returned by `isend`.
    type SendHandle: Wait;
    /// Handle returned by `irecv`.
    type RecvHandle: Wait;

    /// Rank of the calling process.
    fn rank(&self) -> usize;
    /// Number of ranks sharing this communicator.
    fn size(&self) -> usize;

    fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> Self::SendHandle;
    /// Post a receive of at most `buf.len()` bytes from `peer`.
    fn irecv(&self, peer: usize, tag: u16, buf: &mut [u8]) -> Self::RecvHandle;

    /// True only for the serial no-op communicator.
    fn is_no_comm(&self) -> bool {
        false
    }

    /// Distinguishes independent groups of ranks living in one process.
    /// Backends with one rank per process keep the default.
    fn world_id(&self) -> u64 {
        0
    }
}

// --- vector identities ---
// Distributed vectors are numbered per (world, rank). Ranks agree on a number
// when the vector is laid out; it travels in every message header so that
// collectives issued on different vectors never pair up.
static VECTOR_IDS: Lazy<DashMap<(u64, usize), u32>> = Lazy::new(DashMap::new);

/// The identity this rank would hand to the next vector it lays out.
pub(crate) fn peek_vector_id<C: Communicator>(comm: &C) -> u32 {
    *VECTOR_IDS
        .entry((comm.world_id(), comm.rank()))
        .or_insert(1)
}

/// Record that every identity up to and including `id` is taken.
pub(crate) fn claim_vector_id<C: Communicator>(comm: &C, id: u32) {
    let mut next = VECTOR_IDS
        .entry((comm.world_id(), comm.rank()))
        .or_insert(1);
    *next = (*next).max(id.wrapping_add(1));
}

/// Take the next identity without consulting other ranks. Ranks stay in
/// step as long as they create vectors in the same order.
pub(crate) fn next_vector_id<C: Communicator>(comm: &C) -> u32 {
    let mut next = VECTOR_IDS
        .entry((comm.world_id(), comm.rank()))
        .or_insert(1);
    let id = *next;
    *next = next.wrapping_add(1);
    id
}

/// Anything that can be waited on.
pub trait Wait {
    /// Wait for completion and return the received data (if any).
    fn wait(self) -> Option<Vec<u8>>;
}

/// Typed communication tag.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct CommTag(pub u16);

impl CommTag {
    #[inline]
    pub const fn new(tag: u16) -> Self {
        Self(tag)
    }
    #[inline]
    pub const fn base(self) -> u16 {
        self.0
    }
    #[inline]
    pub const fn as_u16(self) -> u16 {
        self.0
    }
    /// Deterministic derived tag, wrapping on overflow.
    #[inline]
    pub const fn offset(self, by: u16) -> Self {
        Self(self.0.wrapping_add(by))
    }
}

/// Tags used by one vector's two-stage exchanges (sizes, then payloads).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct VectorCommTags {
    pub sizes: CommTag,
    pub data: CommTag,
}

impl VectorCommTags {
    #[inline]
    pub const fn from_base(base: CommTag) -> Self {
        Self {
            sizes: base,
            data: base.offset(1),
        }
    }
}

impl Default for VectorCommTags {
    fn default() -> Self {
        Self::from_base(CommTag::new(0x5EC0))
    }
}

/// Compile-time no-op comm for pure serial use.
#[derive(Clone, Debug, Default)]
pub struct NoComm;

impl Wait for () {
    fn wait(self) -> Option<Vec<u8>> {
        None
    }
}

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
    fn is_no_comm(&self) -> bool {
        true
    }
}

// --- RayonComm: intra-process / multi-thread ---
type Key = (u64, usize, usize, u16); // (world, src, dst, tag)

static MAILBOX: Lazy<DashMap<Key, VecDeque<Bytes>>> = Lazy::new(DashMap::new);
static NEXT_WORLD: AtomicU64 = AtomicU64::new(1);

/// Receive handle for [`RayonComm`]; `wait` blocks until a matching message arrives.
pub struct LocalHandle {
    key: Key,
    len: usize,
}

impl Wait for LocalHandle {
    fn wait(self) -> Option<Vec<u8>> {
        loop {
            let popped = MAILBOX
                .get_mut(&self.key)
                .and_then(|mut queue| queue.pop_front());
            if let Some(bytes) = popped {
                let n = bytes.len().min(self.len);
                return Some(bytes[..n].to_vec());
            }
            std::thread::yield_now();
        }
    }
}

/// Ranks simulated as threads of one process, exchanging through a shared mailbox.
#[derive(Clone, Debug)]
pub struct RayonComm {
    world: u64,
    rank: usize,
    size: usize,
}

impl RayonComm {
    /// A rank of the default world (shared by every `new` caller in the process).
    pub fn new(rank: usize, size: usize) -> Self {
        assert!(rank < size, "rank {rank} out of range for world of size {size}");
        Self {
            world: 0,
            rank,
            size,
        }
    }

    /// All ranks of a fresh world that shares no mailbox slots with any other.
    pub fn world(size: usize) -> Vec<Self> {
        let world = NEXT_WORLD.fetch_add(1, Ordering::Relaxed);
        (0..size).map(|rank| Self { world, rank, size }).collect()
    }
}

impl Communicator for RayonComm {
    type SendHandle = ();
    type RecvHandle = LocalHandle;

    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn world_id(&self) -> u64 {
        self.world
    }

    fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> Self::SendHandle {
        let key = (self.world, self.rank, peer, tag);
        MAILBOX
            .entry(key)
            .or_default()
            .push_back(Bytes::copy_from_slice(buf));
    }

    fn irecv(&self, peer: usize, tag: u16, buf: &mut [u8]) -> Self::RecvHandle {
        LocalHandle {
            key: (self.world, peer, self.rank, tag),
            len: buf.len(),
        }
    }
}

// --- MPI backend (feature = "mpi-support") ---
#[cfg(feature = "mpi-support")]
mod mpi_backend {
    use super::*;
    use mpi::environment::Universe;
    use mpi::topology::SimpleCommunicator;
    use mpi::traits::*;
    use std::sync::Arc;

    /// Bytes reserved for buffered sends so that `isend` never blocks.
    const SEND_BUFFER_BYTES: usize = 64 << 20;

    #[derive(Clone)]
    pub struct MpiComm {
        _universe: Arc<Universe>,
        pub world: Arc<SimpleCommunicator>,
        pub rank: usize,
        size: usize,
    }

    impl MpiComm {
        /// Initialize MPI; `None` if it was already initialized elsewhere.
        pub fn new() -> Option<Self> {
            let mut universe = mpi::initialize()?;
            universe.set_buffer_size(SEND_BUFFER_BYTES);
            let world = universe.world();
            let rank = world.rank() as usize;
            let size = world.size() as usize;
            Some(Self {
                _universe: Arc::new(universe),
                world: Arc::new(world),
                rank,
                size,
            })
        }
    }

    /// Deferred receive: the blocking receive happens in `wait`.
    pub struct MpiRecv {
        world: Arc<SimpleCommunicator>,
        peer: usize,
        tag: u16,
        len: usize,
    }

    impl Wait for MpiRecv {
        fn wait(self) -> Option<Vec<u8>> {
            let (mut data, _status) = self
                .world
                .process_at_rank(self.peer as i32)
                .receive_vec_with_tag::<u8>(self.tag as i32);
            data.truncate(self.len);
            Some(data)
        }
    }

    impl Communicator for MpiComm {
        type SendHandle = ();
        type RecvHandle = MpiRecv;

        fn rank(&self) -> usize {
            self.rank
        }

        fn size(&self) -> usize {
            self.size
        }

        fn isend(&self, peer: usize, tag: u16, buf: &[u8]) {
            self.world
                .process_at_rank(peer as i32)
                .buffered_send_with_tag(buf, tag as i32);
        }

        fn irecv(&self, peer: usize, tag: u16, buf: &mut [u8]) -> MpiRecv {
            MpiRecv {
                world: Arc::clone(&self.world),
                peer,
                tag,
                len: buf.len(),
            }
        }
    }
}

#[cfg(feature = "mpi-support")]
pub use mpi_backend::MpiComm;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_worlds_are_isolated() {
        let a = RayonComm::world(2);
        let b = RayonComm::world(2);
        a[0].isend(1, 7, &[1]);
        b[0].isend(1, 7, &[2]);
        let mut buf = [0u8; 1];
        assert_eq!(b[1].irecv(0, 7, &mut buf).wait(), Some(vec![2]));
        assert_eq!(a[1].irecv(0, 7, &mut buf).wait(), Some(vec![1]));
    }

    #[test]
    fn tags_derive_deterministically() {
        let tags = VectorCommTags::from_base(CommTag::new(0xFFFF));
        assert_eq!(tags.sizes.as_u16(), 0xFFFF);
        assert_eq!(tags.data.as_u16(), 0);
    }

    #[test]
    fn vector_ids_are_per_world_and_rank() {
        let w = RayonComm::world(2);
        assert_eq!(peek_vector_id(&w[0]), 1);
        assert_eq!(next_vector_id(&w[0]), 1);
        assert_eq!(next_vector_id(&w[0]), 2);
        assert_eq!(peek_vector_id(&w[1]), 1);
        claim_vector_id(&w[1], 5);
        assert_eq!(next_vector_id(&w[1]), 6);
        claim_vector_id(&w[0], 1);
        assert_eq!(peek_vector_id(&w[0]), 3);
    }

    #[test]
    fn no_comm_is_a_world_of_one() {
        let c = NoComm;
        assert_eq!((c.rank(), c.size()), (0, 1));
        assert!(c.is_no_comm());
    }
}
