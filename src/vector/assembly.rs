//! Lifecycle states and the assembly protocol.
//!
//! ```text
//!   Uninitialized --init--> Open --close--> Closed
//!        ^                   ^  <--mutate--   |
//!        +------clear--------+----------------+
//! ```
//!
//! Writes to entries owned by another rank wait in the backend stash while
//! the vector is Open. [`Vector::close`] ships them to their owners and then,
//! for ghosted storage, refreshes every ghost slot from its owner.

use serde::{Deserialize, Serialize};

use crate::algs::communicator::Communicator;
use crate::partition::StorageType;
use crate::scalar::Scalar;
use crate::vector::Vector;
use crate::vector_error::VectorError;

/// Lifecycle state of a [`Vector`].
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VectorState {
    /// No storage.
    #[default]
    Uninitialized,
    /// Local writes may be pending; ghost slots may be stale.
    Open,
    /// Every rank agrees on every entry and ghost slots mirror their owners.
    Closed,
}

impl<T: Scalar, C: Communicator> Vector<T, C> {
    /// Collective: reconcile pending writes and refresh ghost slots.
    ///
    /// Off-process inserts resolve to the last submission (submitting ranks
    /// in rank order, then submission order); off-process adds accumulate.
    /// Calling `close` on a vector with nothing pending still communicates
    /// and leaves the contents unchanged.
    pub fn close(&mut self) -> Result<(), VectorError> {
        crate::vector_precondition!(self.initialized(), "close() on an uninitialized vector");
        if self.cache.is_manually_retrieved() {
            log::warn!(
                "[rank {}] close() with a manually retrieved array; restoring it",
                self.comm.rank()
            );
            self.cache.set_manual(false);
        }
        self.cache.release_mut();
        let raw = self.raw_ref()?;
        let stashed = raw.stash_len();

        let pending = raw.assembly_begin()?;
        raw.assembly_end(pending)?;
        if raw.kind() == StorageType::Ghosted {
            let pending = raw.ghost_update_begin()?;
            raw.ghost_update_end(pending)?;
        }

        log::debug!(
            "[rank {}] vector closed ({stashed} off-process entr(ies) sent)",
            self.comm.rank()
        );
        self.state = VectorState::Closed;
        Ok(())
    }

    /// Set every entry to zero. Ghosted vectors zero their ghost slots as
    /// well, so the vector stays Closed without communicating.
    pub fn zero(&mut self) -> Result<(), VectorError> {
        crate::vector_precondition!(self.closed(), "zero() requires a closed vector");
        let raw = self.begin_mutation()?;
        if raw.kind() == StorageType::Ghosted {
            raw.fill_local_form(T::zero())?;
        } else {
            raw.fill_owned(T::zero())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algs::communicator::NoComm;
    use crate::partition::ParallelType;

    #[test]
    fn close_moves_open_to_closed() {
        let mut v = Vector::<f64, _>::with_size(NoComm, 3, 3, ParallelType::Serial).unwrap();
        assert_eq!(v.state(), VectorState::Open);
        v.set(1, 2.0).unwrap();
        v.close().unwrap();
        assert_eq!(v.state(), VectorState::Closed);
        v.set(0, 1.0).unwrap();
        assert_eq!(v.state(), VectorState::Open);
    }

    #[test]
    fn zero_keeps_closed() {
        let mut v = Vector::<f64, _>::with_size(NoComm, 3, 3, ParallelType::Serial).unwrap();
        v.assign_scalar(4.0).unwrap();
        v.close().unwrap();
        v.zero().unwrap();
        assert!(v.closed());
        assert_eq!(v.get_many(&[0, 1, 2]).unwrap(), vec![0.0; 3]);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "zero() requires a closed vector")]
    fn zero_on_open_vector_is_a_usage_error() {
        let mut v = Vector::<f64, _>::with_size(NoComm, 3, 3, ParallelType::Serial).unwrap();
        let _ = v.zero();
    }

    #[test]
    fn close_restores_manual_array() {
        let mut v = Vector::<f64, _>::with_size(NoComm, 2, 2, ParallelType::Serial).unwrap();
        v.get_array().unwrap()[0] = 5.0;
        v.close().unwrap();
        assert_eq!(v.get(0).unwrap(), 5.0);
    }
}
