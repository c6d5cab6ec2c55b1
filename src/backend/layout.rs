//! Storage layout shared by every handle of one backend vector.
//!
//! A layout bundles the ownership partition, the ghost list, the ghost
//! scatter plan and the vector identity stamped on every message. It is
//! immutable once built and shared via `Arc` between handles of one storage.
//! A duplicate copies it under a fresh identity, without communication.

use std::collections::{BTreeMap, BTreeSet};

use hashbrown::HashMap;

use crate::algs::communicator::{Communicator, VectorCommTags};
use crate::algs::exchange::all_to_all;
use crate::algs::wire::{WireHdr, WireReader, kind, put_u64s};
use crate::partition::{Partition, StorageType};
use crate::vector_error::VectorError;

/// Who sends which owned values to whom during a ghost update.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GhostScatter {
    /// peer → local offsets (into the owned block) to send, in the peer's ghost order.
    pub sends: BTreeMap<usize, Vec<usize>>,
    /// peer → ghost slots (0-based, after the owned block) filled from that peer, in order.
    pub recvs: BTreeMap<usize, Vec<usize>>,
}

impl GhostScatter {
    /// Ranks this rank receives ghost values from.
    pub fn sources(&self) -> BTreeSet<usize> {
        self.recvs.keys().copied().collect()
    }
}

/// Immutable layout of one backend vector.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Layout {
    kind: StorageType,
    partition: Partition,
    ghosts: Vec<usize>,
    scatter: GhostScatter,
    /// Identity stamped on every message of this vector; 0 for serial storage.
    vector_id: u32,
}

impl Layout {
    /// Layout of a serial vector: one private block of `global` entries.
    pub fn serial(global: usize) -> Self {
        Self {
            kind: StorageType::Serial,
            partition: Partition::serial(global),
            ghosts: Vec::new(),
            scatter: GhostScatter::default(),
            vector_id: 0,
        }
    }

    /// Collective: layout of a parallel vector.
    pub fn parallel<C: Communicator>(
        comm: &C,
        tags: VectorCommTags,
        global: usize,
        n_local: usize,
    ) -> Result<Self, VectorError> {
        let check = check_local_size(global, n_local);
        let (partition, vector_id) = Partition::gather(comm, tags, global, n_local, check)?;
        Ok(Self {
            kind: StorageType::Parallel,
            partition,
            ghosts: Vec::new(),
            scatter: GhostScatter::default(),
            vector_id,
        })
    }

    /// Collective: layout of a ghosted vector. Ghost indices keep their input order.
    pub fn ghosted<C: Communicator>(
        comm: &C,
        tags: VectorCommTags,
        global: usize,
        n_local: usize,
        ghosts: &[usize],
    ) -> Result<Self, VectorError> {
        let check = check_local_size(global, n_local).and_then(|_| check_ghost_list(global, ghosts));
        let (partition, vector_id) = Partition::gather(comm, tags, global, n_local, check)?;

        // Ownership overlap can only be checked once the partition is known;
        // the verdict travels with the ghost requests so that all ranks agree.
        let overlap = ghosts
            .iter()
            .find(|&&g| partition.owns(g))
            .map(|&index| VectorError::GhostInOwnedRange {
                index,
                first: partition.first(),
                last: partition.last(),
            });

        let mut requests: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        let mut recvs: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        if overlap.is_none() {
            for (slot, &g) in ghosts.iter().enumerate() {
                // bounds were checked above, so every ghost has an owner
                if let Some(owner) = partition.owner_of(g) {
                    requests.entry(owner).or_default().push(g);
                    recvs.entry(owner).or_default().push(slot);
                }
            }
        }

        let mut outgoing = BTreeMap::new();
        for peer in 0..comm.size() {
            let wanted = requests.get(&peer).map_or(&[][..], |v| &v[..]);
            let mut buf = Vec::with_capacity(16 + wanted.len() * 8);
            put_u64s(&mut buf, [usize::from(overlap.is_some()), wanted.len()]);
            put_u64s(&mut buf, wanted.iter().copied());
            outgoing.insert(peer, buf);
        }
        let hdr = WireHdr::new(kind::GHOST_SETUP, vector_id, 0);
        let incoming = all_to_all(comm, tags, hdr, outgoing)?;

        let mut sends = BTreeMap::new();
        let mut rejected_by = None;
        for (peer, buf) in incoming {
            let mut r = WireReader::new(&buf, peer);
            let head = r.take_u64s(2)?;
            if head[0] != 0 && rejected_by.is_none() {
                rejected_by = Some(peer);
            }
            let wanted = r.take_u64s(head[1])?;
            if !wanted.is_empty() {
                let offsets = wanted
                    .into_iter()
                    .map(|g| g - partition.first())
                    .collect::<Vec<_>>();
                sends.insert(peer, offsets);
            }
        }
        if let Some(err) = overlap {
            return Err(err);
        }
        if let Some(rank) = rejected_by {
            return Err(VectorError::PeerConfiguration { rank });
        }

        log::debug!(
            "[rank {}] ghosted layout: {} ghost(s) from {} owner(s), serving {} peer(s)",
            comm.rank(),
            ghosts.len(),
            recvs.len(),
            sends.len()
        );
        Ok(Self {
            kind: StorageType::Ghosted,
            partition,
            ghosts: ghosts.to_vec(),
            scatter: GhostScatter { sends, recvs },
            vector_id,
        })
    }

    /// The same layout under another vector identity.
    pub(crate) fn renumbered(&self, vector_id: u32) -> Self {
        Self {
            vector_id,
            ..self.clone()
        }
    }

    #[inline]
    pub fn kind(&self) -> StorageType {
        self.kind
    }
    #[inline]
    pub fn partition(&self) -> &Partition {
        &self.partition
    }
    /// Global indices of the ghost slots, in slot order (the local-to-global map
    /// of the ghost block).
    #[inline]
    pub fn ghosts(&self) -> &[usize] {
        &self.ghosts
    }
    #[inline]
    pub fn vector_id(&self) -> u32 {
        self.vector_id
    }
    #[inline]
    pub fn scatter(&self) -> &GhostScatter {
        &self.scatter
    }
    #[inline]
    pub fn local_size(&self) -> usize {
        self.partition.local_size()
    }
    /// Length of the local form: owned entries plus ghost slots.
    #[inline]
    pub fn local_form_len(&self) -> usize {
        self.partition.local_size() + self.ghosts.len()
    }
    #[inline]
    pub fn global_size(&self) -> usize {
        self.partition.global_size()
    }
    /// Whether collectives on this layout involve other ranks.
    #[inline]
    pub fn is_distributed(&self) -> bool {
        self.kind != StorageType::Serial
    }

    /// Same global size, same ownership range, same ghost list.
    pub fn compatible_with(&self, other: &Layout) -> bool {
        self.partition == other.partition && self.ghosts == other.ghosts
    }
}

fn check_local_size(global: usize, n_local: usize) -> Result<(), VectorError> {
    if n_local > global {
        Err(VectorError::LocalExceedsGlobal { global, n_local })
    } else {
        Ok(())
    }
}

fn check_ghost_list(global: usize, ghosts: &[usize]) -> Result<(), VectorError> {
    let mut seen: HashMap<usize, usize> = HashMap::with_capacity(ghosts.len());
    for (pos, &g) in ghosts.iter().enumerate() {
        if g >= global {
            return Err(VectorError::GhostOutOfRange { index: g, global });
        }
        if let Some(first_pos) = seen.insert(g, pos) {
            return Err(VectorError::DuplicateGhost {
                index: g,
                first_pos,
                second_pos: pos,
            });
        }
    }
    Ok(())
}
