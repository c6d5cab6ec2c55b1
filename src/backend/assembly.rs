//! Two-phase assembly and ghost update on backend storage.
//!
//! Assembly ships every stashed off-process entry to its owner and folds it
//! in; entries are applied in source-rank order, then in submission order, so
//! conflicting inserts resolve to the last submission and adds accumulate.
//! The ghost update then copies each owned value into every remote ghost slot
//! mirroring it, overwriting whatever the slot held.

use std::collections::BTreeMap;

use crate::algs::communicator::Communicator;
use crate::algs::exchange::{PendingExchange, begin_exchange};
use crate::algs::wire::{WireEntry, WireReader, kind, put, put_u64s};
use crate::backend::raw_vec::{InsertMode, RawVec, StashEntry};
use crate::partition::StorageType;
use crate::scalar::Scalar;
use crate::vector_error::VectorError;

/// Assembly in flight between `assembly_begin` and `assembly_end`.
pub struct PendingAssembly<C: Communicator> {
    exchange: Option<PendingExchange<C>>,
}

/// Ghost update in flight between `ghost_update_begin` and `ghost_update_end`.
pub struct PendingGhostUpdate<C: Communicator> {
    exchange: Option<PendingExchange<C>>,
}

impl<T: Scalar, C: Communicator> RawVec<T, C> {
    /// Collective: ship stashed entries to their owners.
    pub fn assembly_begin(&self) -> Result<PendingAssembly<C>, VectorError> {
        self.ensure_alive()?;
        if !self.layout().is_distributed() {
            return Ok(PendingAssembly { exchange: None });
        }
        let stash: Vec<StashEntry<T>> = std::mem::take(&mut *self.shared.stash.lock());
        let partition = self.layout().partition();

        let mut by_owner: BTreeMap<usize, Vec<StashEntry<T>>> = BTreeMap::new();
        for e in stash {
            // set_value only stashes indices below N
            if let Some(owner) = partition.owner_of(e.index) {
                by_owner.entry(owner).or_default().push(e);
            }
        }

        let mut outgoing = BTreeMap::new();
        for peer in 0..self.comm().size() {
            let entries = by_owner.remove(&peer).unwrap_or_default();
            let heads: Vec<WireEntry> = entries
                .iter()
                .map(|e| WireEntry::new(e.index, e.mode.to_wire()))
                .collect();
            let values: Vec<T> = entries.iter().map(|e| e.value).collect();
            let mut buf = Vec::with_capacity(8 + heads.len() * 16 + values.len() * size_of::<T>());
            put_u64s(&mut buf, [entries.len()]);
            put(&mut buf, &heads);
            put(&mut buf, &values);
            outgoing.insert(peer, buf);
        }
        let sources = (0..self.comm().size()).collect();
        let hdr = self.next_header(kind::ASSEMBLY);
        let exchange = begin_exchange(self.comm(), self.tags(), hdr, outgoing, &sources)?;
        Ok(PendingAssembly {
            exchange: Some(exchange),
        })
    }

    /// Collective: receive and apply entries shipped by `assembly_begin`.
    pub fn assembly_end(&self, pending: PendingAssembly<C>) -> Result<(), VectorError> {
        let Some(exchange) = pending.exchange else {
            return Ok(());
        };
        let incoming = exchange.finish()?;
        let first = self.layout().partition().first();
        let n_local = self.layout().local_size();
        let mut applied = 0usize;
        self.with_local_form_mut(|values| -> Result<(), VectorError> {
            for (src, buf) in &incoming {
                let mut r = WireReader::new(buf, *src);
                let n = r.take_count()?;
                let heads: Vec<WireEntry> = r.take(n)?;
                let vals: Vec<T> = r.take(n)?;
                for (h, v) in heads.iter().zip(vals) {
                    let local = h.index().checked_sub(first).filter(|&l| l < n_local);
                    let Some(local) = local else {
                        return Err(VectorError::CommError {
                            neighbor: *src,
                            source: format!("received entry {} not owned here", h.index()).into(),
                        });
                    };
                    InsertMode::from_wire(h.mode()).apply(&mut values[local], v);
                    applied += 1;
                }
            }
            Ok(())
        })??;
        log::trace!(
            "[rank {}] assembly applied {applied} off-process entr(ies)",
            self.comm().rank()
        );
        Ok(())
    }

    /// Collective: send owned values to the ranks that ghost them.
    pub fn ghost_update_begin(&self) -> Result<PendingGhostUpdate<C>, VectorError> {
        self.ensure_alive()?;
        if self.kind() != StorageType::Ghosted {
            return Ok(PendingGhostUpdate { exchange: None });
        }
        let scatter = self.layout().scatter();
        let outgoing = self.with_owned(|owned| {
            scatter
                .sends
                .iter()
                .map(|(&peer, offsets)| {
                    let vals: Vec<T> = offsets.iter().map(|&o| owned[o]).collect();
                    let mut buf = Vec::with_capacity(vals.len() * size_of::<T>());
                    put(&mut buf, &vals);
                    (peer, buf)
                })
                .collect::<BTreeMap<_, _>>()
        })?;
        let hdr = self.next_header(kind::GHOST_UPDATE);
        let exchange = begin_exchange(self.comm(), self.tags(), hdr, outgoing, &scatter.sources())?;
        Ok(PendingGhostUpdate {
            exchange: Some(exchange),
        })
    }

    /// Collective: overwrite ghost slots with the values sent by their owners.
    pub fn ghost_update_end(&self, pending: PendingGhostUpdate<C>) -> Result<(), VectorError> {
        let Some(exchange) = pending.exchange else {
            return Ok(());
        };
        let incoming = exchange.finish()?;
        let n_local = self.layout().local_size();
        let scatter = self.layout().scatter();
        let mut decoded = Vec::with_capacity(incoming.len());
        for (src, buf) in &incoming {
            let slots = scatter.recvs.get(src).map_or(&[][..], |v| &v[..]);
            let vals: Vec<T> = WireReader::new(buf, *src).take(slots.len())?;
            decoded.push((slots, vals));
        }
        self.with_local_form_mut(|values| {
            for (slots, vals) in decoded {
                for (&slot, v) in slots.iter().zip(vals) {
                    values[n_local + slot] = v;
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algs::communicator::{RayonComm, VectorCommTags};

    #[test]
    fn adds_accumulate_and_inserts_follow_rank_order() {
        let comms = RayonComm::world(3);
        let tags = VectorCommTags::default();
        let out: Vec<Vec<f64>> = std::thread::scope(|s| {
            let hs: Vec<_> = comms
                .iter()
                .cloned()
                .map(|c| {
                    s.spawn(move || {
                        let me = c.rank();
                        let v = RawVec::<f64, _>::create_parallel(c, tags, 1, 3).unwrap();
                        // everyone adds into index 0 and inserts into index 1
                        v.set_value(0, 1.0 + me as f64, InsertMode::Add).unwrap();
                        if me != 1 {
                            v.set_value(1, 10.0 * (me as f64 + 1.0), InsertMode::Insert)
                                .unwrap();
                        }
                        let p = v.assembly_begin().unwrap();
                        v.assembly_end(p).unwrap();
                        v.with_owned(|o| o.to_vec()).unwrap()
                    })
                })
                .collect();
            hs.into_iter().map(|h| h.join().unwrap()).collect()
        });
        assert_eq!(out[0], vec![6.0]);
        // inserts from ranks 0 and 2 land in rank order
        assert_eq!(out[1], vec![30.0]);
        assert_eq!(out[2], vec![0.0]);
    }
}
