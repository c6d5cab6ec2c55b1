//! Fixed, versioned, little-endian wire types for vector exchanges.

use bytemuck::{Pod, Zeroable};

use crate::vector_error::VectorError;

/// Bump when the layout or semantics change in incompatible ways.
pub const WIRE_VERSION: u16 = 1;

/// Collective operation kinds carried in every header.
pub mod kind {
    pub const LAYOUT: u16 = 1;
    pub const GHOST_SETUP: u16 = 2;
    pub const ASSEMBLY: u16 = 3;
    pub const GHOST_UPDATE: u16 = 4;
    pub const REDUCE: u16 = 5;
    pub const GATHER: u16 = 6;
}

/// All multi-byte integers in these structs are **little-endian** on the wire.
/// We store them pre-LE with `.to_le()` and decode with `.from_le()`.
#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable, Debug, PartialEq, Eq)]
pub struct WireHdr {
    pub version_le: u16, // = WIRE_VERSION.to_le()
    pub kind_le: u16,
    pub seq_le: u32,    // per-vector collective sequence number
    pub vector_le: u32, // identity agreed when the vector was laid out; 0 while laying out
    pub reserved_le: u32, // keep zero
}

impl WireHdr {
    pub fn new(kind: u16, vector: u32, seq: u32) -> Self {
        Self {
            version_le: WIRE_VERSION.to_le(),
            kind_le: kind.to_le(),
            seq_le: seq.to_le(),
            vector_le: vector.to_le(),
            reserved_le: 0,
        }
    }
    pub fn kind(&self) -> u16 {
        u16::from_le(self.kind_le)
    }
    pub fn version(&self) -> u16 {
        u16::from_le(self.version_le)
    }
    pub fn seq(&self) -> u32 {
        u32::from_le(self.seq_le)
    }
    pub fn vector(&self) -> u32 {
        u32::from_le(self.vector_le)
    }

    /// Check that `got`, received from `neighbor`, belongs to the same collective as `self`.
    pub fn expect_matches(&self, got: &WireHdr, neighbor: usize) -> Result<(), VectorError> {
        if got.version() != WIRE_VERSION {
            return Err(VectorError::WireVersion {
                neighbor,
                got: got.version(),
            });
        }
        if got.kind() != self.kind() || got.seq() != self.seq() || got.vector() != self.vector() {
            return Err(VectorError::CollectiveMismatch {
                neighbor,
                expected_vector: self.vector(),
                expected_kind: self.kind(),
                expected_seq: self.seq(),
                got_vector: got.vector(),
                got_kind: got.kind(),
                got_seq: got.seq(),
            });
        }
        Ok(())
    }
}

/// First-stage message: header plus the byte length of the payload that follows.
#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable, Debug)]
pub struct WireSize {
    pub hdr: WireHdr,
    pub len_le: u64,
}

impl WireSize {
    pub fn new(hdr: WireHdr, len: usize) -> Self {
        Self {
            hdr,
            len_le: (len as u64).to_le(),
        }
    }
    pub fn len(&self) -> usize {
        u64::from_le(self.len_le) as usize
    }
}

/// An (index, mode) pair describing one stashed off-process entry.
#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable, Debug)]
pub struct WireEntry {
    pub index_le: u64,
    pub mode_le: u32,
    pub reserved_le: u32, // keep zero
}

impl WireEntry {
    pub fn new(index: usize, mode: u32) -> Self {
        Self {
            index_le: (index as u64).to_le(),
            mode_le: mode.to_le(),
            reserved_le: 0,
        }
    }
    pub fn index(&self) -> usize {
        u64::from_le(self.index_le) as usize
    }
    pub fn mode(&self) -> u32 {
        u32::from_le(self.mode_le)
    }
}

static_assertions::assert_eq_size!(WireHdr, [u64; 2]);
static_assertions::assert_eq_size!(WireSize, [u64; 3]);
static_assertions::assert_eq_size!(WireEntry, [u64; 2]);

/// Append the bytes of `items` to `out`.
pub fn put<T: Pod>(out: &mut Vec<u8>, items: &[T]) {
    out.extend_from_slice(bytemuck::cast_slice(items));
}

/// Little-endian u64 helpers for counts and indices.
pub fn put_u64s(out: &mut Vec<u8>, items: impl IntoIterator<Item = usize>) {
    for v in items {
        out.extend_from_slice(&(v as u64).to_le_bytes());
    }
}

/// Sequential reader over a received payload. Copies into aligned storage,
/// so received buffers need no particular alignment.
pub struct WireReader<'a> {
    buf: &'a [u8],
    pos: usize,
    neighbor: usize,
}

impl<'a> WireReader<'a> {
    pub fn new(buf: &'a [u8], neighbor: usize) -> Self {
        Self {
            buf,
            pos: 0,
            neighbor,
        }
    }

    /// Read `n` values of `T`.
    pub fn take<T: Pod>(&mut self, n: usize) -> Result<Vec<T>, VectorError> {
        let bytes = n * std::mem::size_of::<T>();
        let end = self.pos + bytes;
        let chunk = self
            .buf
            .get(self.pos..end)
            .ok_or(VectorError::BufferSizeMismatch {
                neighbor: self.neighbor,
                expected: end,
                got: self.buf.len(),
            })?;
        self.pos = end;
        Ok(bytemuck::pod_collect_to_vec(chunk))
    }

    /// Read `n` little-endian u64 values as indices.
    pub fn take_u64s(&mut self, n: usize) -> Result<Vec<usize>, VectorError> {
        Ok(self
            .take::<u64>(n)?
            .into_iter()
            .map(|v| u64::from_le(v) as usize)
            .collect())
    }

    /// Read one little-endian u64.
    pub fn take_count(&mut self) -> Result<usize, VectorError> {
        Ok(self.take_u64s(1)?[0])
    }

    /// Number of bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }
}
