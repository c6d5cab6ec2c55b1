//! Ownership ranges and storage types.
//!
//! A [`Partition`] records, for every rank, the contiguous block of global
//! indices it owns. The blocks are laid out in rank order and cover `[0, N)`
//! without gaps or overlaps. Serial storage is represented by a one-rank
//! partition covering everything, regardless of the communicator size.

use serde::{Deserialize, Serialize};

use crate::algs::communicator::{
    Communicator, VectorCommTags, claim_vector_id, peek_vector_id,
};
use crate::algs::exchange::all_gather;
use crate::algs::wire::{WireHdr, WireReader, kind, put_u64s};
use crate::debug_invariants::DebugInvariants;
use crate::vector_error::VectorError;

/// Storage type requested by the caller.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParallelType {
    /// Serial when `N == n_local`, Parallel otherwise.
    #[default]
    Automatic,
    Serial,
    Parallel,
    Ghosted,
}

/// Storage type actually backing a vector.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StorageType {
    /// Every rank holds a private copy of all `N` entries.
    Serial,
    /// Each rank holds its owned block only.
    Parallel,
    /// Each rank holds its owned block followed by ghost copies of remote entries.
    Ghosted,
}

impl StorageType {
    pub fn name(self) -> &'static str {
        match self {
            StorageType::Serial => "Serial",
            StorageType::Parallel => "Parallel",
            StorageType::Ghosted => "Ghosted",
        }
    }
}

impl ParallelType {
    /// Resolve the storage type for a vector without a ghost list.
    pub fn resolve(self, global: usize, n_local: usize) -> Result<StorageType, VectorError> {
        match self {
            ParallelType::Automatic if global == n_local => Ok(StorageType::Serial),
            ParallelType::Automatic | ParallelType::Parallel => Ok(StorageType::Parallel),
            ParallelType::Serial if global == n_local => Ok(StorageType::Serial),
            ParallelType::Serial => Err(VectorError::SerialSizeMismatch { global, n_local }),
            ParallelType::Ghosted => Err(VectorError::GhostedWithoutGhosts),
        }
    }

    /// Resolve the storage type for a vector built with a ghost list.
    pub fn resolve_ghosted(self) -> Result<StorageType, VectorError> {
        match self {
            ParallelType::Automatic | ParallelType::Ghosted => Ok(StorageType::Ghosted),
            ParallelType::Serial => Err(VectorError::GhostsOnNonGhosted("Serial")),
            ParallelType::Parallel => Err(VectorError::GhostsOnNonGhosted("Parallel")),
        }
    }
}

impl From<StorageType> for ParallelType {
    fn from(t: StorageType) -> Self {
        match t {
            StorageType::Serial => ParallelType::Serial,
            StorageType::Parallel => ParallelType::Parallel,
            StorageType::Ghosted => ParallelType::Ghosted,
        }
    }
}

/// Contiguous ownership ranges of all ranks.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Partition {
    rank: usize,
    /// `offsets[r]..offsets[r + 1]` is owned by rank `r`.
    offsets: Vec<usize>,
}

impl Partition {
    /// A one-rank partition owning all of `[0, global)`.
    pub fn serial(global: usize) -> Self {
        Self {
            rank: 0,
            offsets: vec![0, global],
        }
    }

    /// Build from per-rank local sizes.
    pub fn from_local_sizes(rank: usize, sizes: &[usize]) -> Self {
        let mut offsets = Vec::with_capacity(sizes.len() + 1);
        offsets.push(0);
        let mut acc = 0usize;
        for &s in sizes {
            acc += s;
            offsets.push(acc);
        }
        Self { rank, offsets }
    }

    /// Collectively compute the partition: every rank contributes its local
    /// size, the global size it asked for, a flag telling whether its own
    /// configuration checks passed, and the vector identity it would assign
    /// next.
    ///
    /// All ranks fail together if any rank reported a problem, if ranks asked
    /// for different global sizes, or if the local sizes do not sum to
    /// `global`. On success the partition is returned with the identity all
    /// ranks agreed on for the new vector.
    pub fn gather<C: Communicator>(
        comm: &C,
        tags: VectorCommTags,
        global: usize,
        n_local: usize,
        local_check: Result<(), VectorError>,
    ) -> Result<(Self, u32), VectorError> {
        let proposed = peek_vector_id(comm);
        let mut payload = Vec::with_capacity(32);
        put_u64s(
            &mut payload,
            [
                n_local,
                usize::from(local_check.is_err()),
                global,
                proposed as usize,
            ],
        );
        let all = all_gather(comm, tags, WireHdr::new(kind::LAYOUT, 0, 0), &payload)?;

        let mut sizes = Vec::with_capacity(all.len());
        let mut rejected_by = None;
        let mut disagreement = None;
        let mut id = proposed;
        for (r, buf) in all.iter().enumerate() {
            let vals = WireReader::new(buf, r).take_u64s(4)?;
            sizes.push(vals[0]);
            if vals[1] != 0 && rejected_by.is_none() {
                rejected_by = Some(r);
            }
            if vals[2] != global && disagreement.is_none() {
                disagreement = Some(VectorError::InconsistentGlobalSize {
                    rank: r,
                    global,
                    theirs: vals[2],
                });
            }
            id = id.max(vals[3] as u32);
        }
        local_check?;
        if let Some(rank) = rejected_by {
            return Err(VectorError::PeerConfiguration { rank });
        }
        if let Some(err) = disagreement {
            return Err(err);
        }
        let sum: usize = sizes.iter().sum();
        if sum != global {
            return Err(VectorError::GlobalSizeMismatch { global, sum });
        }
        claim_vector_id(comm, id);
        let partition = Self::from_local_sizes(comm.rank(), &sizes);
        log::debug!(
            "[rank {}] partition of {global} for vector {id}: owns [{}, {})",
            comm.rank(),
            partition.first(),
            partition.last()
        );
        Ok((partition, id))
    }

    #[inline]
    pub fn rank(&self) -> usize {
        self.rank
    }
    #[inline]
    pub fn n_ranks(&self) -> usize {
        self.offsets.len() - 1
    }
    #[inline]
    pub fn global_size(&self) -> usize {
        self.offsets[self.offsets.len() - 1]
    }
    /// First owned global index.
    #[inline]
    pub fn first(&self) -> usize {
        self.offsets[self.rank]
    }
    /// One past the last owned global index.
    #[inline]
    pub fn last(&self) -> usize {
        self.offsets[self.rank + 1]
    }
    #[inline]
    pub fn local_size(&self) -> usize {
        self.last() - self.first()
    }
    #[inline]
    pub fn owns(&self, i: usize) -> bool {
        (self.first()..self.last()).contains(&i)
    }
    /// Ownership range of rank `r`.
    pub fn range_of(&self, r: usize) -> std::ops::Range<usize> {
        self.offsets[r]..self.offsets[r + 1]
    }
    /// All ownership ranges in rank order.
    pub fn ranges(&self) -> impl Iterator<Item = std::ops::Range<usize>> + '_ {
        self.offsets.windows(2).map(|w| w[0]..w[1])
    }

    /// Rank owning global index `i`, if `i < N`.
    pub fn owner_of(&self, i: usize) -> Option<usize> {
        if i >= self.global_size() {
            return None;
        }
        // first offset strictly greater than i, minus one
        Some(self.offsets.partition_point(|&o| o <= i) - 1)
    }
}

impl DebugInvariants for Partition {
    fn debug_assert_invariants(&self) {
        crate::debug_invariants!(self.validate_invariants(), "Partition");
    }

    fn validate_invariants(&self) -> Result<(), VectorError> {
        if self.offsets.first() != Some(&0) || self.rank + 1 >= self.offsets.len() {
            return Err(VectorError::LayoutMismatch(format!(
                "malformed offsets {:?} for rank {}",
                self.offsets, self.rank
            )));
        }
        if self.offsets.windows(2).any(|w| w[0] > w[1]) {
            return Err(VectorError::LayoutMismatch(format!(
                "offsets not monotone: {:?}",
                self.offsets
            )));
        }
        Ok(())
    }
}
