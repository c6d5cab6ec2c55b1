//! Vector: a distributed numeric vector with optional ghost entries.
//!
//! A [`Vector`] is a fixed-size array of scalars partitioned across the ranks
//! of a [`Communicator`]. Each rank owns one contiguous block; a ghosted
//! vector additionally keeps read-only copies of selected entries owned by
//! other ranks, refreshed on every [`close`](Vector::close).
//!
//! The type ties together the [`GhostMap`] (index translation), the
//! [`ArrayCache`] (lazily fetched storage view) and the assembly state
//! machine in [`assembly`]; all storage work is delegated to a
//! [`RawVec`] backend handle.
//!
//! # Example
//! ```rust
//! use ghosted_vector::prelude::*;
//!
//! # fn main() -> Result<(), VectorError> {
//! let mut v = Vector::<f64, _>::with_size(NoComm, 10, 10, ParallelType::Serial)?;
//! v.set(3, 7.5)?;
//! v.close()?;
//! assert_eq!(v.get(3)?, 7.5);
//! assert_eq!(v.max()?, 7.5);
//! # Ok(())
//! # }
//! ```

pub mod array_cache;
pub mod assembly;
pub mod ghost_map;
pub mod io;
pub mod localize;
pub mod ops;

pub use array_cache::{ArrayCache, CachedView};
pub use assembly::VectorState;
pub use ghost_map::GhostMap;

use crate::algs::communicator::{Communicator, VectorCommTags};
use crate::backend::raw_vec::RawVec;
use crate::debug_invariants::CHECKS_ENABLED;
use crate::partition::{ParallelType, StorageType};
use crate::scalar::Scalar;
use crate::vector_error::VectorError;

/// Whether a vector frees its backend storage on teardown.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum StorageOwnership {
    /// Created by this vector; destroyed by `clear()` and on drop.
    Owned,
    /// Borrowed from elsewhere; left alive on teardown.
    Wrapped,
}

/// Backend handle plus the ownership tag that travels with it.
struct Backing<T: Scalar, C: Communicator> {
    raw: RawVec<T, C>,
    ownership: StorageOwnership,
}

/// Distributed vector over scalars `T`, communicating through `C`.
pub struct Vector<T: Scalar, C: Communicator> {
    comm: C,
    tags: VectorCommTags,
    parallel_type: ParallelType,
    backing: Option<Backing<T, C>>,
    ghosts: GhostMap,
    cache: ArrayCache<T>,
    state: VectorState,
}

impl<T: Scalar, C: Communicator> std::fmt::Debug for Vector<T, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vector")
            .field("rank", &self.comm.rank())
            .field("type", &self.parallel_type)
            .field("state", &self.state)
            .field("size", &self.size())
            .field("range", &(self.first_local_index()..self.last_local_index()))
            .field("ghosts", &self.ghosts.len())
            .field("owns_storage", &self.owns_storage())
            .finish()
    }
}

fn backing_raw<T: Scalar, C: Communicator>(
    backing: &Option<Backing<T, C>>,
) -> Result<&RawVec<T, C>, VectorError> {
    backing
        .as_ref()
        .map(|b| &b.raw)
        .ok_or(VectorError::Uninitialized)
}

impl<T: Scalar, C: Communicator> Vector<T, C> {
    // ----- construction -------------------------------------------------

    /// An uninitialized vector (size 0, no storage) with automatic storage type.
    pub fn new(comm: C) -> Self {
        Self::with_tags(comm, ParallelType::Automatic, VectorCommTags::default())
    }

    /// An uninitialized vector that will use `parallel_type` when initialized.
    pub fn with_type(comm: C, parallel_type: ParallelType) -> Self {
        Self::with_tags(comm, parallel_type, VectorCommTags::default())
    }

    /// Like [`with_type`](Self::with_type), with explicit communication tags.
    /// Vectors exchanging messages concurrently on one communicator need
    /// distinct tags.
    pub fn with_tags(comm: C, parallel_type: ParallelType, tags: VectorCommTags) -> Self {
        Self {
            comm,
            tags,
            parallel_type,
            backing: None,
            ghosts: GhostMap::default(),
            cache: ArrayCache::new(),
            state: VectorState::Uninitialized,
        }
    }

    /// Collective for Parallel storage: construct and initialize (zeroed).
    pub fn with_size(
        comm: C,
        n: usize,
        n_local: usize,
        parallel_type: ParallelType,
    ) -> Result<Self, VectorError> {
        let mut v = Self::with_type(comm, parallel_type);
        v.init(n, n_local, false, parallel_type)?;
        Ok(v)
    }

    /// Collective: construct and initialize a ghosted vector (zeroed).
    pub fn with_ghosts(
        comm: C,
        n: usize,
        n_local: usize,
        ghosts: &[usize],
        parallel_type: ParallelType,
    ) -> Result<Self, VectorError> {
        let mut v = Self::with_type(comm, parallel_type);
        v.init_ghosted(n, n_local, ghosts, false, parallel_type)?;
        Ok(v)
    }

    /// Wrap backend storage created elsewhere. The vector never destroys it;
    /// its contents are taken as coherent, so the vector starts Closed.
    pub fn from_raw(raw: RawVec<T, C>) -> Self {
        let mut v = Self::with_tags(raw.comm().clone(), raw.kind().into(), raw.tags());
        v.ghosts = GhostMap::build(raw.layout().local_size(), raw.ghost_indices());
        v.backing = Some(Backing {
            raw,
            ownership: StorageOwnership::Wrapped,
        });
        v.state = VectorState::Closed;
        v
    }

    // ----- initialization -----------------------------------------------

    /// Initialize with `n` global and `n_local` local entries.
    ///
    /// Collective unless the resolved storage type is Serial. Any previous
    /// storage is released first. Unless `fast`, storage is zeroed.
    pub fn init(
        &mut self,
        n: usize,
        n_local: usize,
        fast: bool,
        parallel_type: ParallelType,
    ) -> Result<(), VectorError> {
        self.clear();
        let storage = parallel_type.resolve(n, n_local)?;
        self.parallel_type = parallel_type;
        let raw = match storage {
            StorageType::Serial => RawVec::create_serial(self.comm.clone(), self.tags, n),
            _ => RawVec::create_parallel(self.comm.clone(), self.tags, n_local, n)?,
        };
        self.install(raw, fast)
    }

    /// Initialize with every entry local (`n_local == n`).
    pub fn init_global(
        &mut self,
        n: usize,
        fast: bool,
        parallel_type: ParallelType,
    ) -> Result<(), VectorError> {
        self.init(n, n, fast, parallel_type)
    }

    /// Collective: initialize ghosted storage. Ghost `k` lives at local
    /// offset `n_local + k`. Only Automatic and Ghosted are accepted.
    pub fn init_ghosted(
        &mut self,
        n: usize,
        n_local: usize,
        ghosts: &[usize],
        fast: bool,
        parallel_type: ParallelType,
    ) -> Result<(), VectorError> {
        self.clear();
        parallel_type.resolve_ghosted()?;
        self.parallel_type = parallel_type;
        let raw = RawVec::create_ghosted(self.comm.clone(), self.tags, n_local, n, ghosts)?;
        self.install(raw, fast)
    }

    /// Take the partition, ghost map and storage shape of `other`, without
    /// its values. No communication takes place.
    pub fn init_like(&mut self, other: &Self, fast: bool) -> Result<(), VectorError> {
        let raw = backing_raw(&other.backing)?.duplicate()?;
        self.clear();
        self.comm = other.comm.clone();
        self.tags = other.tags;
        self.install(raw, fast)
    }

    fn install(&mut self, raw: RawVec<T, C>, fast: bool) -> Result<(), VectorError> {
        if !fast {
            raw.fill_local_form(T::zero())?;
        }
        self.ghosts = GhostMap::build(raw.layout().local_size(), raw.ghost_indices());
        self.parallel_type = raw.kind().into();
        log::debug!(
            "[rank {}] vector initialized: {} of {}, owned [{}, {}), {} ghost(s)",
            self.comm.rank(),
            raw.kind().name(),
            raw.layout().global_size(),
            raw.ownership_range().0,
            raw.ownership_range().1,
            self.ghosts.len()
        );
        self.backing = Some(Backing {
            raw,
            ownership: StorageOwnership::Owned,
        });
        self.state = VectorState::Open;
        Ok(())
    }

    /// Release the cache, destroy owned storage and return to Uninitialized.
    pub fn clear(&mut self) {
        self.cache.set_manual(false);
        self.cache.release_mut();
        if let Some(b) = self.backing.take() {
            if b.ownership == StorageOwnership::Owned {
                b.raw.destroy();
            }
        }
        self.ghosts.clear();
        if self.state != VectorState::Uninitialized {
            log::debug!("[rank {}] vector cleared", self.comm.rank());
        }
        self.state = VectorState::Uninitialized;
    }

    /// Exchange everything with `other` in constant time: storage, ownership
    /// tag, ghost map, cache and state.
    pub fn swap(&mut self, other: &mut Self) {
        std::mem::swap(self, other);
    }

    /// A new vector with the same shape, a copy of the local form and of any
    /// off-process writes still waiting for [`close`](Self::close).
    /// The copy keeps the lifecycle state of `self`.
    ///
    /// Every rank must clone its distributed vectors in the same order.
    pub fn try_clone(&self) -> Result<Self, VectorError> {
        let mut out = Self::with_tags(self.comm.clone(), self.parallel_type, self.tags);
        if self.backing.is_none() {
            return Ok(out);
        }
        let src = self.settled()?;
        let raw = src.duplicate()?;
        raw.copy_from(src)?;
        raw.copy_stash_from(src)?;
        out.install(raw, true)?;
        out.state = self.state;
        Ok(out)
    }

    /// A new Closed vector with the same shape, all entries zero.
    pub fn zero_clone(&self) -> Result<Self, VectorError> {
        let mut out = Self::with_tags(self.comm.clone(), self.parallel_type, self.tags);
        if self.backing.is_none() {
            return Ok(out);
        }
        let raw = self.settled()?.duplicate()?;
        out.install(raw, false)?;
        out.state = VectorState::Closed;
        Ok(out)
    }

    // ----- backend access -------------------------------------------------

    /// The backend handle, if initialized.
    pub fn raw(&self) -> Option<&RawVec<T, C>> {
        self.backing.as_ref().map(|b| &b.raw)
    }

    pub(crate) fn raw_ref(&self) -> Result<&RawVec<T, C>, VectorError> {
        backing_raw(&self.backing)
    }

    /// Backend handle for a mutating call: manual arrays must have been
    /// restored, the automatic view is released.
    pub(crate) fn begin_mutation(&mut self) -> Result<&RawVec<T, C>, VectorError> {
        crate::vector_precondition!(
            !self.cache.is_manually_retrieved(),
            "restore_array() must be called before modifying the vector"
        );
        self.cache.release_mut();
        backing_raw(&self.backing)
    }

    /// Backend handle for a whole-vector read (reductions, gathers, or use
    /// as an operand): the cache is released so the storage is free.
    pub(crate) fn settled(&self) -> Result<&RawVec<T, C>, VectorError> {
        crate::vector_precondition!(
            !self.cache.is_manually_retrieved(),
            "restore_array() must be called before using the vector"
        );
        self.cache.release();
        self.raw_ref()
    }

    /// Like [`settled`](Self::settled), and the vector must be Closed.
    pub(crate) fn closed_operand(&self) -> Result<&RawVec<T, C>, VectorError> {
        crate::vector_precondition!(self.closed(), "vector must be closed");
        self.settled()
    }

    // ----- queries ----------------------------------------------------------

    /// Global size `N` (0 when uninitialized).
    pub fn size(&self) -> usize {
        self.raw().map_or(0, |r| r.layout().global_size())
    }

    /// Number of owned entries.
    pub fn local_size(&self) -> usize {
        self.raw().map_or(0, |r| r.layout().local_size())
    }

    pub fn first_local_index(&self) -> usize {
        self.raw().map_or(0, |r| r.ownership_range().0)
    }

    /// One past the last owned global index.
    pub fn last_local_index(&self) -> usize {
        self.raw().map_or(0, |r| r.ownership_range().1)
    }

    /// Owned entries plus ghost slots.
    pub fn local_form_len(&self) -> usize {
        self.raw().map_or(0, |r| r.layout().local_form_len())
    }

    pub fn storage_type(&self) -> Option<StorageType> {
        self.raw().map(|r| r.kind())
    }

    pub fn parallel_type(&self) -> ParallelType {
        self.parallel_type
    }

    pub fn state(&self) -> VectorState {
        self.state
    }

    pub fn closed(&self) -> bool {
        self.state == VectorState::Closed
    }

    pub fn initialized(&self) -> bool {
        self.state != VectorState::Uninitialized
    }

    pub fn owns_storage(&self) -> bool {
        matches!(
            self.backing,
            Some(Backing {
                ownership: StorageOwnership::Owned,
                ..
            })
        )
    }

    /// Global index of each ghost slot, in slot order.
    pub fn ghost_indices(&self) -> &[usize] {
        self.raw().map_or(&[][..], |r| r.ghost_indices())
    }

    pub fn ghost_map(&self) -> &GhostMap {
        &self.ghosts
    }

    /// The lazily acquired array view backing element reads.
    pub fn cache(&self) -> &ArrayCache<T> {
        &self.cache
    }

    pub fn comm(&self) -> &C {
        &self.comm
    }

    pub fn tags(&self) -> VectorCommTags {
        self.tags
    }

    // ----- index translation -------------------------------------------

    /// Local offset of global index `i`: `i - first` for owned entries, the
    /// ghost slot for ghosts.
    ///
    /// # Panics
    /// With checks enabled, panics with an index diagnostic when `i` is
    /// neither owned nor a ghost. With checks compiled out, returns
    /// [`local_form_len`](Self::local_form_len) instead, so the following
    /// read fails its bounds check.
    pub fn map_global_to_local(&self, i: usize) -> usize {
        match self.try_map_global_to_local(i) {
            Ok(l) => l,
            Err(e) => {
                if CHECKS_ENABLED {
                    panic!("{e}");
                }
                self.local_form_len()
            }
        }
    }

    /// Checked form of [`map_global_to_local`](Self::map_global_to_local).
    pub fn try_map_global_to_local(&self, i: usize) -> Result<usize, VectorError> {
        let raw = self.raw_ref()?;
        let (first, last) = self
            .cache
            .bounds()
            .unwrap_or_else(|| raw.ownership_range());
        self.locate(first, last, i)
    }

    fn locate(&self, first: usize, last: usize, i: usize) -> Result<usize, VectorError> {
        if (first..last).contains(&i) {
            return Ok(i - first);
        }
        self.ghosts
            .get(i)
            .ok_or_else(|| VectorError::IndexNotLocal {
                index: i,
                first,
                last,
                ghosts: self.ghost_indices().to_vec(),
            })
    }

    /// Offset of `i` within a view of `len` entries; see `map_global_to_local`.
    fn offset_in_view(&self, view: &CachedView<T>, i: usize) -> usize {
        match self.locate(view.first(), view.last(), i) {
            Ok(l) => l,
            Err(e) => {
                if CHECKS_ENABLED {
                    panic!("{e}");
                }
                view.as_slice().len()
            }
        }
    }
}

impl<T: Scalar, C: Communicator> Drop for Vector<T, C> {
    fn drop(&mut self) {
        self.clear();
    }
}
