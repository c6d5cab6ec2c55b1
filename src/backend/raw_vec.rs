//! Backend storage handle.
//!
//! A [`RawVec`] owns (or shares) one block of local storage laid out as the
//! *local form*: owned entries first, ghost slots after them. Writes to
//! entries owned by another rank are kept in a stash until the next assembly.
//! Several handles may refer to the same storage; only the one that calls
//! [`RawVec::destroy`] frees it.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use parking_lot::{ArcRwLockReadGuard, ArcRwLockWriteGuard, Mutex, RawRwLock, RwLock};

use crate::algs::communicator::{Communicator, VectorCommTags, next_vector_id};
use crate::algs::wire::WireHdr;
use crate::backend::layout::Layout;
use crate::partition::StorageType;
use crate::scalar::Scalar;
use crate::vector_error::VectorError;

/// How a submitted value combines with the current one.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum InsertMode {
    /// Overwrite; the last submission wins.
    Insert,
    /// Accumulate.
    Add,
}

impl InsertMode {
    pub(crate) fn to_wire(self) -> u32 {
        match self {
            InsertMode::Insert => 0,
            InsertMode::Add => 1,
        }
    }
    pub(crate) fn from_wire(v: u32) -> Self {
        if v == 1 { InsertMode::Add } else { InsertMode::Insert }
    }
    #[inline]
    pub(crate) fn apply<T: Scalar>(self, slot: &mut T, value: T) {
        match self {
            InsertMode::Insert => *slot = value,
            InsertMode::Add => *slot += value,
        }
    }
}

/// A value destined for an entry owned by another rank.
#[derive(Copy, Clone, Debug)]
pub(crate) struct StashEntry<T> {
    pub index: usize,
    pub value: T,
    pub mode: InsertMode,
}

pub(crate) struct Shared<T> {
    pub values: Arc<RwLock<Vec<T>>>,
    pub stash: Mutex<Vec<StashEntry<T>>>,
    destroyed: AtomicBool,
    seq: AtomicU32,
}

/// Guard over backend storage handed out to array caches.
///
/// The guard keeps the storage lock for as long as it lives; dropping it
/// returns the array to the backend.
pub enum ArrayGuard<T> {
    Read {
        guard: ArcRwLockReadGuard<RawRwLock, Vec<T>>,
        len: usize,
    },
    Write {
        guard: ArcRwLockWriteGuard<RawRwLock, Vec<T>>,
        len: usize,
    },
}

impl<T> ArrayGuard<T> {
    #[inline]
    pub fn as_slice(&self) -> &[T] {
        match self {
            ArrayGuard::Read { guard, len } => &guard[..*len],
            ArrayGuard::Write { guard, len } => &guard[..*len],
        }
    }

    /// Mutable view; `None` for read-only guards.
    #[inline]
    pub fn as_mut_slice(&mut self) -> Option<&mut [T]> {
        match self {
            ArrayGuard::Read { .. } => None,
            ArrayGuard::Write { guard, len } => Some(&mut guard[..*len]),
        }
    }

    #[inline]
    pub fn is_read_only(&self) -> bool {
        matches!(self, ArrayGuard::Read { .. })
    }
}

/// Handle to backend vector storage.
pub struct RawVec<T: Scalar, C: Communicator> {
    comm: C,
    tags: VectorCommTags,
    layout: Arc<Layout>,
    pub(crate) shared: Arc<Shared<T>>,
}

impl<T: Scalar, C: Communicator> std::fmt::Debug for RawVec<T, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawVec")
            .field("kind", &self.layout.kind())
            .field("global", &self.layout.global_size())
            .field("local", &self.layout.local_size())
            .field("ghosts", &self.layout.ghosts().len())
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}

impl<T: Scalar, C: Communicator> RawVec<T, C> {
    fn with_layout(comm: C, tags: VectorCommTags, layout: Arc<Layout>) -> Self {
        let len = layout.local_form_len();
        Self {
            comm,
            tags,
            layout,
            shared: Arc::new(Shared {
                values: Arc::new(RwLock::new(vec![T::zero(); len])),
                stash: Mutex::new(Vec::new()),
                destroyed: AtomicBool::new(false),
                seq: AtomicU32::new(0),
            }),
        }
    }

    /// A private, non-collective vector of `global` entries.
    pub fn create_serial(comm: C, tags: VectorCommTags, global: usize) -> Self {
        Self::with_layout(comm, tags, Arc::new(Layout::serial(global)))
    }

    /// Collective: a vector partitioned across all ranks of `comm`.
    pub fn create_parallel(
        comm: C,
        tags: VectorCommTags,
        n_local: usize,
        global: usize,
    ) -> Result<Self, VectorError> {
        let layout = Layout::parallel(&comm, tags, global, n_local)?;
        Ok(Self::with_layout(comm, tags, Arc::new(layout)))
    }

    /// Collective: a partitioned vector with ghost slots for `ghosts`.
    pub fn create_ghosted(
        comm: C,
        tags: VectorCommTags,
        n_local: usize,
        global: usize,
        ghosts: &[usize],
    ) -> Result<Self, VectorError> {
        let layout = Layout::ghosted(&comm, tags, global, n_local, ghosts)?;
        Ok(Self::with_layout(comm, tags, Arc::new(layout)))
    }

    /// New storage with the same layout. Contents are backend-default.
    ///
    /// Distributed duplicates take the next vector identity locally, so ranks
    /// must duplicate in the same order.
    pub fn duplicate(&self) -> Result<Self, VectorError> {
        self.ensure_alive()?;
        let layout = if self.layout.is_distributed() {
            Arc::new(self.layout.renumbered(next_vector_id(&self.comm)))
        } else {
            Arc::clone(&self.layout)
        };
        Ok(Self::with_layout(self.comm.clone(), self.tags, layout))
    }

    /// Append a copy of `src`'s pending off-process entries to this stash.
    pub fn copy_stash_from(&self, src: &Self) -> Result<(), VectorError> {
        self.ensure_alive()?;
        src.ensure_alive()?;
        if Arc::ptr_eq(&self.shared, &src.shared) {
            return Ok(());
        }
        let pending = src.shared.stash.lock().clone();
        self.shared.stash.lock().extend(pending);
        Ok(())
    }

    /// Another handle to the same storage.
    pub fn handle(&self) -> Self {
        Self {
            comm: self.comm.clone(),
            tags: self.tags,
            layout: Arc::clone(&self.layout),
            shared: Arc::clone(&self.shared),
        }
    }

    /// Free the storage. Every handle sharing it observes
    /// [`VectorError::StorageDestroyed`] afterwards.
    pub fn destroy(&self) {
        if self.shared.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }
        let mut values = self.shared.values.write();
        values.clear();
        values.shrink_to_fit();
        self.shared.stash.lock().clear();
        log::trace!("destroyed backend storage ({:?})", self.layout.kind());
    }

    #[inline]
    pub fn is_destroyed(&self) -> bool {
        self.shared.destroyed.load(Ordering::Acquire)
    }

    #[inline]
    pub(crate) fn ensure_alive(&self) -> Result<(), VectorError> {
        if self.is_destroyed() {
            Err(VectorError::StorageDestroyed)
        } else {
            Ok(())
        }
    }

    #[inline]
    pub fn comm(&self) -> &C {
        &self.comm
    }
    #[inline]
    pub fn tags(&self) -> VectorCommTags {
        self.tags
    }
    #[inline]
    pub fn layout(&self) -> &Arc<Layout> {
        &self.layout
    }
    #[inline]
    pub fn kind(&self) -> StorageType {
        self.layout.kind()
    }
    /// Owned range `[first, last)`.
    #[inline]
    pub fn ownership_range(&self) -> (usize, usize) {
        let p = self.layout.partition();
        (p.first(), p.last())
    }
    /// Global index of each ghost slot.
    #[inline]
    pub fn ghost_indices(&self) -> &[usize] {
        self.layout.ghosts()
    }

    /// Sequence number for the next collective on this storage.
    pub(crate) fn next_seq(&self) -> u32 {
        self.shared.seq.fetch_add(1, Ordering::Relaxed)
    }

    /// Header for the next collective of `kind` on this storage.
    pub(crate) fn next_header(&self, kind: u16) -> WireHdr {
        WireHdr::new(kind, self.layout.vector_id(), self.next_seq())
    }

    /// Insert or add one value. Owned entries are written immediately,
    /// others are stashed for the next assembly.
    pub fn set_value(&self, i: usize, value: T, mode: InsertMode) -> Result<(), VectorError> {
        self.ensure_alive()?;
        let p = self.layout.partition();
        if p.owns(i) {
            let mut values = self.shared.values.write();
            mode.apply(&mut values[i - p.first()], value);
        } else if i < p.global_size() {
            self.shared.stash.lock().push(StashEntry {
                index: i,
                value,
                mode,
            });
        } else {
            return Err(VectorError::IndexNotLocal {
                index: i,
                first: p.first(),
                last: p.last(),
                ghosts: self.layout.ghosts().to_vec(),
            });
        }
        Ok(())
    }

    /// Insert or add many values at once.
    pub fn set_values(
        &self,
        indices: &[usize],
        values: &[T],
        mode: InsertMode,
    ) -> Result<(), VectorError> {
        if indices.len() != values.len() {
            return Err(VectorError::LayoutMismatch(format!(
                "{} indices but {} values",
                indices.len(),
                values.len()
            )));
        }
        for (&i, &v) in indices.iter().zip(values) {
            self.set_value(i, v, mode)?;
        }
        Ok(())
    }

    /// Read owned entries by global index.
    pub fn get_values(&self, indices: &[usize]) -> Result<Vec<T>, VectorError> {
        self.ensure_alive()?;
        let p = self.layout.partition();
        let values = self.shared.values.read();
        indices
            .iter()
            .map(|&i| {
                if p.owns(i) {
                    Ok(values[i - p.first()])
                } else {
                    Err(VectorError::IndexNotLocal {
                        index: i,
                        first: p.first(),
                        last: p.last(),
                        ghosts: self.layout.ghosts().to_vec(),
                    })
                }
            })
            .collect()
    }

    /// Number of stashed off-process entries.
    pub fn stash_len(&self) -> usize {
        self.shared.stash.lock().len()
    }

    /// Acquire the raw array. With `local_form` the guard covers the ghost
    /// slots too; otherwise only the owned entries.
    pub fn get_array(&self, read_only: bool, local_form: bool) -> Result<ArrayGuard<T>, VectorError> {
        self.ensure_alive()?;
        let len = if local_form {
            self.layout.local_form_len()
        } else {
            self.layout.local_size()
        };
        Ok(if read_only {
            ArrayGuard::Read {
                guard: self.shared.values.read_arc(),
                len,
            }
        } else {
            ArrayGuard::Write {
                guard: self.shared.values.write_arc(),
                len,
            }
        })
    }

    /// Run `f` over the owned entries.
    pub fn with_owned<R>(&self, f: impl FnOnce(&[T]) -> R) -> Result<R, VectorError> {
        self.ensure_alive()?;
        let values = self.shared.values.read();
        Ok(f(&values[..self.layout.local_size()]))
    }

    /// Run `f` over the whole local form.
    pub fn with_local_form<R>(&self, f: impl FnOnce(&[T]) -> R) -> Result<R, VectorError> {
        self.ensure_alive()?;
        let values = self.shared.values.read();
        Ok(f(&values))
    }

    /// Run `f` over the whole local form, mutably.
    pub fn with_local_form_mut<R>(&self, f: impl FnOnce(&mut [T]) -> R) -> Result<R, VectorError> {
        self.ensure_alive()?;
        let mut values = self.shared.values.write();
        Ok(f(&mut values))
    }

    /// Set every owned entry to `value`.
    pub fn fill_owned(&self, value: T) -> Result<(), VectorError> {
        let n = self.layout.local_size();
        self.with_local_form_mut(|v| v[..n].fill(value))
    }

    /// Set the whole local form (owned and ghost slots) to `value`.
    pub fn fill_local_form(&self, value: T) -> Result<(), VectorError> {
        self.with_local_form_mut(|v| v.fill(value))
    }

    /// Apply `f` to every entry of the local form.
    pub fn map_in_place<F>(&self, f: F) -> Result<(), VectorError>
    where
        F: Fn(T) -> T + Send + Sync,
    {
        self.with_local_form_mut(|v| {
            #[cfg(feature = "rayon")]
            {
                use rayon::prelude::*;
                v.par_iter_mut().for_each(|x| *x = f(*x));
            }
            #[cfg(not(feature = "rayon"))]
            for x in v.iter_mut() {
                *x = f(*x);
            }
        })
    }

    /// `self[k] = f(self[k], other[k])` over the local form.
    pub fn zip_in_place<F>(&self, other: &Self, f: F) -> Result<(), VectorError>
    where
        F: Fn(T, T) -> T + Send + Sync,
    {
        self.expect_compatible(other)?;
        other.ensure_alive()?;
        if Arc::ptr_eq(&self.shared, &other.shared) {
            return self.map_in_place(|x| f(x, x));
        }
        let theirs = other.shared.values.read();
        self.with_local_form_mut(|mine| {
            #[cfg(feature = "rayon")]
            {
                use rayon::prelude::*;
                mine.par_iter_mut()
                    .zip(theirs.par_iter())
                    .for_each(|(a, &b)| *a = f(*a, b));
            }
            #[cfg(not(feature = "rayon"))]
            for (a, &b) in mine.iter_mut().zip(theirs.iter()) {
                *a = f(*a, b);
            }
        })
    }

    /// `self[k] = f(a[k], b[k])` over the local form.
    pub fn zip2_into<F>(&self, a: &Self, b: &Self, f: F) -> Result<(), VectorError>
    where
        F: Fn(T, T) -> T + Send + Sync,
    {
        self.expect_compatible(a)?;
        self.expect_compatible(b)?;
        let xs = a.with_local_form(|v| v.to_vec())?;
        let ys = b.with_local_form(|v| v.to_vec())?;
        self.with_local_form_mut(|out| {
            for ((o, &x), &y) in out.iter_mut().zip(&xs).zip(&ys) {
                *o = f(x, y);
            }
        })
    }

    /// Copy the whole local form of `src` into this storage.
    pub fn copy_from(&self, src: &Self) -> Result<(), VectorError> {
        self.expect_compatible(src)?;
        if Arc::ptr_eq(&self.shared, &src.shared) {
            return Ok(());
        }
        let theirs = src.with_local_form(|v| v.to_vec())?;
        self.with_local_form_mut(|mine| mine.copy_from_slice(&theirs))
    }

    pub(crate) fn expect_compatible(&self, other: &Self) -> Result<(), VectorError> {
        if self.layout.compatible_with(&other.layout) {
            Ok(())
        } else {
            Err(VectorError::LayoutMismatch(format!(
                "{:?} vs {:?}",
                self.layout.partition(),
                other.layout.partition()
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algs::communicator::NoComm;

    fn serial(n: usize) -> RawVec<f64, NoComm> {
        RawVec::create_serial(NoComm, VectorCommTags::default(), n)
    }

    #[test]
    fn insert_then_add_owned() {
        let v = serial(3);
        v.set_value(1, 2.0, InsertMode::Insert).unwrap();
        v.set_value(1, 0.5, InsertMode::Add).unwrap();
        assert_eq!(v.get_values(&[0, 1]).unwrap(), vec![0.0, 2.5]);
        assert_eq!(v.stash_len(), 0);
    }

    #[test]
    fn out_of_range_is_an_index_error() {
        let v = serial(3);
        assert!(matches!(
            v.set_value(3, 1.0, InsertMode::Insert),
            Err(VectorError::IndexNotLocal { index: 3, .. })
        ));
    }

    #[test]
    fn destroy_is_seen_by_every_handle() {
        let v = serial(2);
        let h = v.handle();
        v.destroy();
        assert!(h.is_destroyed());
        assert_eq!(h.get_values(&[0]), Err(VectorError::StorageDestroyed));
        assert!(h.duplicate().is_err());
    }

    #[test]
    fn guards_expose_requested_length() {
        let v = serial(4);
        {
            let mut g = v.get_array(false, true).unwrap();
            g.as_mut_slice().unwrap()[2] = 7.0;
        }
        let g = v.get_array(true, false).unwrap();
        assert!(g.is_read_only());
        assert_eq!(g.as_slice(), &[0.0, 0.0, 7.0, 0.0]);
    }

    #[test]
    fn zip_with_itself_does_not_deadlock() {
        let v = serial(2);
        v.fill_local_form(3.0).unwrap();
        v.zip_in_place(&v.handle(), |a, b| a * b).unwrap();
        assert_eq!(v.get_values(&[0, 1]).unwrap(), vec![9.0, 9.0]);
    }
}
