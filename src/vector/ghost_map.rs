//! GhostMap: global index → local offset for entries mirrored from other ranks.
//!
//! A ghosted vector stores its owned entries first and its ghost entries
//! right after them. The `k`-th ghost index passed at construction lives at
//! local offset `n_local + k`; the map answers the reverse question.

use hashbrown::HashMap;

use crate::debug_invariants::DebugInvariants;
use crate::vector_error::VectorError;

/// `GhostMap` maintains:
/// - `offsets`: each ghost's global index mapped to its local offset,
/// - `n_local`: the size of the owned block preceding the ghost slots.
///
/// # Invariants
///
/// - Offsets are unique and fill `[n_local, n_local + len)` exactly.
/// - The map is built once per initialization and never mutated
///   afterwards, apart from [`clear`](Self::clear).
///
/// # Example
/// ```rust
/// use ghosted_vector::vector::ghost_map::GhostMap;
/// let g = GhostMap::build(2, &[7, 3]);
/// assert_eq!(g.get(7), Some(2));
/// assert_eq!(g.get(3), Some(3));
/// assert_eq!(g.get(4), None);
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GhostMap {
    offsets: HashMap<usize, usize>,
    n_local: usize,
}

impl GhostMap {
    /// Assign offsets `n_local, n_local + 1, ...` to `ghosts` in input order.
    ///
    /// `ghosts` is expected to be free of duplicates; the storage layout
    /// rejects duplicate lists before a map is ever built.
    pub fn build(n_local: usize, ghosts: &[usize]) -> Self {
        let offsets = ghosts
            .iter()
            .enumerate()
            .map(|(k, &g)| (g, n_local + k))
            .collect();
        let map = Self { offsets, n_local };
        map.debug_assert_invariants();
        map
    }

    /// Local offset of ghost `global`, if it is a ghost of this rank.
    #[inline]
    pub fn get(&self, global: usize) -> Option<usize> {
        self.offsets.get(&global).copied()
    }

    #[inline]
    pub fn contains(&self, global: usize) -> bool {
        self.offsets.contains_key(&global)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    pub fn clear(&mut self) {
        self.offsets.clear();
        self.n_local = 0;
    }
}

impl DebugInvariants for GhostMap {
    fn debug_assert_invariants(&self) {
        crate::debug_invariants!(self.validate_invariants(), "GhostMap");
    }

    fn validate_invariants(&self) -> Result<(), VectorError> {
        let mut seen = vec![false; self.offsets.len()];
        for (&g, &off) in &self.offsets {
            let k = off.checked_sub(self.n_local).filter(|&k| k < seen.len());
            match k {
                Some(k) if !seen[k] => seen[k] = true,
                _ => {
                    return Err(VectorError::LayoutMismatch(format!(
                        "ghost {g} mapped to offset {off} outside [{}, {})",
                        self.n_local,
                        self.n_local + seen.len()
                    )));
                }
            }
        }
        Ok(())
    }
}
