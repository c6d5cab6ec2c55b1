//! Two-stage point-to-point exchanges used by every collective.
//!
//! Stage 1 sends each destination a [`WireSize`] (header + payload length);
//! stage 2 sends the payload itself. [`begin_exchange`] runs stage 1 and posts
//! stage 2, [`PendingExchange::finish`] waits for the payloads. Every handle is
//! drained before returning, even if an error occurs.

use std::collections::{BTreeMap, BTreeSet};

use crate::algs::communicator::{Communicator, VectorCommTags, Wait};
use crate::algs::wire::{WireHdr, WireSize};
use crate::vector_error::VectorError;

/// An exchange whose payloads have been posted but not yet received.
pub struct PendingExchange<C: Communicator> {
    hdr: WireHdr,
    recvs: Vec<(usize, usize, C::RecvHandle)>,
    sends: Vec<C::SendHandle>,
    loopback: Option<Vec<u8>>,
    rank: usize,
}

/// Send `outgoing[peer]` to each peer and prepare to receive one payload from
/// every rank in `sources`. A payload addressed to the calling rank is looped
/// back without touching the communicator.
///
/// Senders and receivers must agree: rank `a` lists `b` in `outgoing` exactly
/// when rank `b` lists `a` in `sources`.
pub fn begin_exchange<C: Communicator>(
    comm: &C,
    tags: VectorCommTags,
    hdr: WireHdr,
    mut outgoing: BTreeMap<usize, Vec<u8>>,
    sources: &BTreeSet<usize>,
) -> Result<PendingExchange<C>, VectorError> {
    let me = comm.rank();
    let loopback = outgoing.remove(&me);
    log::trace!(
        "[rank {me}] exchange kind {} #{}: {} dest(s), {} source(s)",
        hdr.kind(),
        hdr.seq(),
        outgoing.len(),
        sources.len()
    );

    // 1) post all size receives
    let mut size_recvs = Vec::with_capacity(sources.len());
    for &src in sources.iter().filter(|&&s| s != me) {
        let mut buf = [0u8; std::mem::size_of::<WireSize>()];
        size_recvs.push((src, comm.irecv(src, tags.sizes.as_u16(), &mut buf)));
    }

    // 2) post all size sends
    let mut sends = Vec::with_capacity(outgoing.len() * 2);
    for (&dst, payload) in &outgoing {
        let msg = WireSize::new(hdr, payload.len());
        sends.push(comm.isend(
            dst,
            tags.sizes.as_u16(),
            bytemuck::bytes_of(&msg),
        ));
    }

    // 3) wait for all sizes (but do not early-return)
    let mut lengths = Vec::with_capacity(size_recvs.len());
    let mut maybe_err = None;
    for (src, h) in size_recvs {
        match h.wait() {
            Some(data) if data.len() == std::mem::size_of::<WireSize>() => {
                let msg: WireSize = bytemuck::pod_read_unaligned(&data);
                if let Err(e) = hdr.expect_matches(&msg.hdr, src) {
                    maybe_err.get_or_insert(e);
                } else {
                    lengths.push((src, msg.len()));
                }
            }
            Some(data) => {
                maybe_err.get_or_insert(VectorError::BufferSizeMismatch {
                    neighbor: src,
                    expected: std::mem::size_of::<WireSize>(),
                    got: data.len(),
                });
            }
            None => {
                maybe_err.get_or_insert(VectorError::CommError {
                    neighbor: src,
                    source: format!("failed to receive size from rank {src}").into(),
                });
            }
        }
    }
    if let Some(err) = maybe_err {
        for s in sends {
            let _ = s.wait();
        }
        return Err(err);
    }

    // 4) post payload receives, then payload sends
    let mut recvs = Vec::with_capacity(lengths.len());
    for (src, len) in lengths {
        let mut buf = vec![0u8; len];
        recvs.push((src, len, comm.irecv(src, tags.data.as_u16(), &mut buf)));
    }
    for (&dst, payload) in &outgoing {
        sends.push(comm.isend(dst, tags.data.as_u16(), payload));
    }

    Ok(PendingExchange {
        hdr,
        recvs,
        sends,
        loopback,
        rank: me,
    })
}

impl<C: Communicator> PendingExchange<C> {
    /// Header of the collective this exchange belongs to.
    pub fn header(&self) -> WireHdr {
        self.hdr
    }

    /// Wait for every payload; returns them keyed by source rank (the calling
    /// rank's own payload included when one was addressed to it).
    pub fn finish(self) -> Result<BTreeMap<usize, Vec<u8>>, VectorError> {
        let mut out = BTreeMap::new();
        let mut maybe_err = None;
        for (src, len, h) in self.recvs {
            match h.wait() {
                Some(data) if data.len() == len => {
                    out.insert(src, data);
                }
                Some(data) => {
                    maybe_err.get_or_insert(VectorError::BufferSizeMismatch {
                        neighbor: src,
                        expected: len,
                        got: data.len(),
                    });
                }
                None if len == 0 => {
                    out.insert(src, Vec::new());
                }
                None => {
                    maybe_err.get_or_insert(VectorError::CommError {
                        neighbor: src,
                        source: "No data received (wait returned None)".into(),
                    });
                }
            }
        }
        for s in self.sends {
            let _ = s.wait();
        }
        if let Some(err) = maybe_err {
            return Err(err);
        }
        if let Some(own) = self.loopback {
            out.insert(self.rank, own);
        }
        Ok(out)
    }
}

/// Every rank contributes `local`; every rank receives all contributions in rank order.
pub fn all_gather<C: Communicator>(
    comm: &C,
    tags: VectorCommTags,
    hdr: WireHdr,
    local: &[u8],
) -> Result<Vec<Vec<u8>>, VectorError> {
    let n = comm.size();
    let outgoing: BTreeMap<usize, Vec<u8>> = (0..n).map(|r| (r, local.to_vec())).collect();
    let sources: BTreeSet<usize> = (0..n).collect();
    let got = begin_exchange(comm, tags, hdr, outgoing, &sources)?.finish()?;
    Ok(got.into_values().collect())
}

/// Every rank sends `outgoing[r]` to rank `r` (absent entries send nothing but
/// an empty payload); every rank receives one payload from every rank.
pub fn all_to_all<C: Communicator>(
    comm: &C,
    tags: VectorCommTags,
    hdr: WireHdr,
    mut outgoing: BTreeMap<usize, Vec<u8>>,
) -> Result<BTreeMap<usize, Vec<u8>>, VectorError> {
    let n = comm.size();
    for r in 0..n {
        outgoing.entry(r).or_default();
    }
    let sources: BTreeSet<usize> = (0..n).collect();
    begin_exchange(comm, tags, hdr, outgoing, &sources)?.finish()
}

/// Every rank sends `local` to `root`; returns all contributions in rank order
/// on `root` and `None` elsewhere.
pub fn gather_to_root<C: Communicator>(
    comm: &C,
    tags: VectorCommTags,
    hdr: WireHdr,
    local: &[u8],
    root: usize,
) -> Result<Option<Vec<Vec<u8>>>, VectorError> {
    let me = comm.rank();
    let mut outgoing = BTreeMap::new();
    outgoing.insert(root, local.to_vec());
    let sources: BTreeSet<usize> = if me == root {
        (0..comm.size()).collect()
    } else {
        BTreeSet::new()
    };
    let got = begin_exchange(comm, tags, hdr, outgoing, &sources)?.finish()?;
    Ok((me == root).then(|| got.into_values().collect()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algs::communicator::{NoComm, RayonComm};
    use crate::algs::wire::kind;

    #[test]
    fn no_comm_gather_is_local() {
        let tags = VectorCommTags::default();
        let got = all_gather(&NoComm, tags, WireHdr::new(kind::GATHER, 1, 0), &[9, 8]).unwrap();
        assert_eq!(got, vec![vec![9, 8]]);
    }

    #[test]
    fn three_rank_all_gather_in_rank_order() {
        let comms = RayonComm::world(3);
        let tags = VectorCommTags::default();
        let results: Vec<_> = std::thread::scope(|s| {
            let handles: Vec<_> = comms
                .iter()
                .map(|c| {
                    s.spawn(move || {
                        let payload = vec![c.rank() as u8; c.rank() + 1];
                        all_gather(c, tags, WireHdr::new(kind::GATHER, 1, 0), &payload).unwrap()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        for got in results {
            assert_eq!(got, vec![vec![0], vec![1, 1], vec![2, 2, 2]]);
        }
    }

    #[test]
    fn gather_to_root_only_fills_root() {
        let comms = RayonComm::world(2);
        let tags = VectorCommTags::default();
        let results: Vec<_> = std::thread::scope(|s| {
            let handles: Vec<_> = comms
                .iter()
                .map(|c| {
                    s.spawn(move || {
                        gather_to_root(c, tags, WireHdr::new(kind::GATHER, 1, 0), &[c.rank() as u8], 1)
                            .unwrap()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        assert_eq!(results[0], None);
        assert_eq!(results[1], Some(vec![vec![0], vec![1]]));
    }

    #[test]
    fn mismatched_collectives_are_detected() {
        let comms = RayonComm::world(2);
        let tags = VectorCommTags::default();
        let results: Vec<_> = std::thread::scope(|s| {
            let handles: Vec<_> = comms
                .iter()
                .map(|c| {
                    s.spawn(move || {
                        let k = if c.rank() == 0 { kind::REDUCE } else { kind::GATHER };
                        all_gather(c, tags, WireHdr::new(k, 1, 0), &[1]).map(|_| ())
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        for r in results {
            assert!(matches!(r, Err(VectorError::CollectiveMismatch { .. })));
        }
    }
}
