//! ArrayCache: lazily acquired view of a vector's local storage.
//!
//! Element reads go through a contiguous view of the backend array. The view
//! is fetched on first use, kept while reads continue, and returned to the
//! backend before anything else touches the storage. For ghosted storage the
//! view covers the local form: owned entries followed by the ghost slots.
//!
//! Fetching takes the cache lock exclusively; reads against a view that is
//! already present only take it shared, so concurrent readers on one rank
//! proceed in parallel.

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;

use crate::algs::communicator::Communicator;
use crate::backend::raw_vec::{ArrayGuard, RawVec};
use crate::scalar::Scalar;
use crate::vector_error::VectorError;

/// A fetched backend array together with the bounds recorded at fetch time.
pub struct CachedView<T> {
    guard: ArrayGuard<T>,
    first: usize,
    last: usize,
}

impl<T> CachedView<T> {
    /// The whole local form.
    #[inline]
    pub fn as_slice(&self) -> &[T] {
        self.guard.as_slice()
    }
    #[inline]
    pub fn first(&self) -> usize {
        self.first
    }
    #[inline]
    pub fn last(&self) -> usize {
        self.last
    }
    #[inline]
    pub fn local_size(&self) -> usize {
        self.last - self.first
    }
    #[inline]
    pub fn is_read_only(&self) -> bool {
        self.guard.is_read_only()
    }
    #[inline]
    pub(crate) fn as_mut_slice(&mut self) -> Option<&mut [T]> {
        self.guard.as_mut_slice()
    }
}

/// Cache slot plus the presence and manual-retrieval markers.
///
/// # Invariants
///
/// - `present` is true exactly when `slot` holds a view.
/// - At most one access mode is active; a view never outlives a release.
pub struct ArrayCache<T> {
    slot: RwLock<Option<CachedView<T>>>,
    present: AtomicBool,
    manual: AtomicBool,
}

impl<T> Default for ArrayCache<T> {
    fn default() -> Self {
        Self {
            slot: RwLock::new(None),
            present: AtomicBool::new(false),
            manual: AtomicBool::new(false),
        }
    }
}

impl<T: Scalar> ArrayCache<T> {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn is_present(&self) -> bool {
        self.present.load(Ordering::Acquire)
    }

    /// Whether the array was handed out through `get_array`/`get_array_read`
    /// and not yet restored.
    #[inline]
    pub fn is_manually_retrieved(&self) -> bool {
        self.manual.load(Ordering::Acquire)
    }

    #[inline]
    pub(crate) fn set_manual(&self, on: bool) {
        self.manual.store(on, Ordering::Release);
    }

    /// Bounds `(first, last)` recorded when the view was fetched.
    pub fn bounds(&self) -> Option<(usize, usize)> {
        if !self.is_present() {
            return None;
        }
        self.slot.read().as_ref().map(|v| (v.first, v.last))
    }

    /// Make a view in the requested mode present.
    ///
    /// Requesting the other mode while a view is present is a usage error.
    /// With checks compiled out, a read-only request keeps the present view
    /// and a read-write request fetches a fresh one.
    pub fn acquire<C: Communicator>(
        &self,
        raw: &RawVec<T, C>,
        read_only: bool,
    ) -> Result<(), VectorError> {
        let mut slot = self.slot.write();
        if let Some(view) = slot.as_ref() {
            if view.is_read_only() == read_only {
                return Ok(());
            }
            crate::vector_precondition!(false, "array already acquired in a different access mode");
            if read_only {
                return Ok(());
            }
            // the old guard must go before the write lock can be taken
            *slot = None;
        }
        let guard = raw.get_array(read_only, true)?;
        let (first, last) = raw.ownership_range();
        *slot = Some(CachedView { guard, first, last });
        self.present.store(true, Ordering::Release);
        log::trace!(
            "[rank {}] array acquired ({}), owned [{first}, {last})",
            raw.comm().rank(),
            if read_only { "read-only" } else { "read-write" }
        );
        Ok(())
    }

    /// Run `f` against the present view, fetching a read-only one if absent.
    pub fn with_view<C: Communicator, R>(
        &self,
        raw: &RawVec<T, C>,
        f: impl FnOnce(&CachedView<T>) -> R,
    ) -> Result<R, VectorError> {
        loop {
            {
                let slot = self.slot.read();
                if let Some(view) = slot.as_ref() {
                    return Ok(f(view));
                }
            }
            self.acquire(raw, true)?;
        }
    }

    /// Return the view to the backend. No-op when absent.
    pub fn release(&self) {
        if !self.is_present() {
            return;
        }
        let old = self.slot.write().take();
        self.present.store(false, Ordering::Release);
        if old.is_some() {
            log::trace!("array released");
        }
    }

    /// Same as [`release`](Self::release), without locking.
    pub fn release_mut(&mut self) {
        if self.slot.get_mut().take().is_some() {
            log::trace!("array released");
        }
        *self.present.get_mut() = false;
    }

    /// Exclusive access to the present view.
    pub(crate) fn view_mut(&mut self) -> Option<&mut CachedView<T>> {
        self.slot.get_mut().as_mut()
    }
}
