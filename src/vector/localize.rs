//! Localization: collective gathers into fully local copies, and subvectors.

use crate::algs::communicator::Communicator;
use crate::partition::{ParallelType, StorageType};
use crate::scalar::Scalar;
use crate::vector::{Vector, VectorState};
use crate::vector_error::VectorError;

impl<T: Scalar, C: Communicator> Vector<T, C> {
    /// Collective: all `N` entries, in global order, on every rank.
    pub fn localize(&self) -> Result<Vec<T>, VectorError> {
        self.closed_operand()?.gather_all()
    }

    /// Collective: the entries at `indices`, in the order given, on every
    /// rank. Ranks may ask for different indices.
    pub fn localize_indices(&self, indices: &[usize]) -> Result<Vec<T>, VectorError> {
        let all = self.localize()?;
        indices
            .iter()
            .map(|&i| {
                all.get(i).copied().ok_or_else(|| VectorError::IndexNotLocal {
                    index: i,
                    first: 0,
                    last: all.len(),
                    ghosts: Vec::new(),
                })
            })
            .collect()
    }

    /// Collective: all `N` entries on rank `root` only; `None` elsewhere.
    pub fn localize_to_one(&self, root: usize) -> Result<Option<Vec<T>>, VectorError> {
        self.closed_operand()?.gather_to_one(root)
    }

    /// Collective: fill `target` with this rank's owned entries plus the
    /// entries named in `send_list`. `target` must have the same global size;
    /// entries it cannot hold locally are skipped, the others it does not
    /// receive keep their values. `target` ends up Closed.
    pub fn localize_into(&self, target: &mut Self, send_list: &[usize]) -> Result<(), VectorError> {
        let all = self.localize()?;
        if target.size() != all.len() {
            return Err(VectorError::LayoutMismatch(format!(
                "localize target has size {}, source has {}",
                target.size(),
                all.len()
            )));
        }
        let wanted = (self.first_local_index()..self.last_local_index())
            .chain(send_list.iter().copied())
            .filter_map(|i| Some((target.try_map_global_to_local(i).ok()?, *all.get(i)?)))
            .collect::<Vec<_>>();
        target
            .begin_mutation()?
            .with_local_form_mut(|v| {
                for (l, value) in wanted {
                    v[l] = value;
                }
            })?;
        target.state = VectorState::Closed;
        Ok(())
    }

    /// Collective: a new Parallel vector whose local block holds this
    /// vector's entries at `rows`, in the order given. Its global size is the
    /// total number of rows requested across ranks. A Serial source yields a
    /// Serial subvector.
    pub fn create_subvector(&self, rows: &[usize]) -> Result<Self, VectorError> {
        let raw = self.closed_operand()?;
        let values = self.localize_indices(rows)?;
        let mut sub = Self::with_tags(self.comm.clone(), ParallelType::Automatic, self.tags);
        if raw.kind() == StorageType::Serial {
            sub.init_global(rows.len(), true, ParallelType::Serial)?;
        } else {
            let n = raw.sum_counts(rows.len())?;
            sub.init(n, rows.len(), true, ParallelType::Parallel)?;
        }
        sub.assign_from_slice(&values)?;
        sub.state = VectorState::Closed;
        Ok(sub)
    }
}
