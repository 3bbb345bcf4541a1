//! Field-slot blob encoding.
//!
//! A blob unit is `slots_per_unit` slots of `slot_size` bytes. Byte 0 of
//! every slot stays zero so the slot, read as a big-endian integer, is below
//! the scalar field modulus; payload goes into bytes `1..slot_size`.
//!
//! A unit alone cannot tell payload zeros from padding. `decode_sized` cuts
//! the payload at the size declared when the chunk was written and is exact.
//! `decode` trims trailing zeros instead, which drops them from every chunk
//! it is applied to; across a multi-chunk download that shifts all later
//! bytes, so it only suits single chunks known not to end in zero.

use bytes::Bytes;

use crate::{StoreError, StoreResult};

/// Field slots per blob
pub const SLOTS_PER_UNIT: usize = 4096;

/// Bytes per field slot
pub const SLOT_SIZE: usize = 32;

/// Total size of one blob
pub const BYTES_PER_BLOB: usize = SLOTS_PER_UNIT * SLOT_SIZE;

/// Usable payload bytes per blob
pub const CHUNK_CAPACITY: usize = SLOTS_PER_UNIT * (SLOT_SIZE - 1);

/// One encoded blob. Always exactly `unit_size` bytes for the codec that
/// produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobUnit(Bytes);

impl BlobUnit {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Bytes {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl AsRef<[u8]> for BlobUnit {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Encoder/decoder for a fixed blob geometry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlobCodec {
    slots_per_unit: usize,
    slot_size: usize,
}

impl Default for BlobCodec {
    fn default() -> Self {
        Self {
            slots_per_unit: SLOTS_PER_UNIT,
            slot_size: SLOT_SIZE,
        }
    }
}

impl BlobCodec {
    pub fn new(slots_per_unit: usize, slot_size: usize) -> StoreResult<Self> {
        if slot_size < 2 {
            return Err(StoreError::config("slot_size must leave room for a guard byte"));
        }
        if slots_per_unit == 0 {
            return Err(StoreError::config("slots_per_unit must be at least 1"));
        }
        Ok(Self {
            slots_per_unit,
            slot_size,
        })
    }

    pub const fn slots_per_unit(&self) -> usize {
        self.slots_per_unit
    }

    pub const fn slot_size(&self) -> usize {
        self.slot_size
    }

    /// Encoded size of every unit
    pub const fn unit_size(&self) -> usize {
        self.slots_per_unit * self.slot_size
    }

    /// Payload bytes one unit can carry
    pub const fn chunk_capacity(&self) -> usize {
        self.slots_per_unit * (self.slot_size - 1)
    }

    /// Encode one chunk into a zero-padded unit
    pub fn encode(&self, chunk: &[u8]) -> StoreResult<BlobUnit> {
        if chunk.len() > self.chunk_capacity() {
            return Err(StoreError::invalid(format!(
                "Chunk of {} bytes exceeds blob capacity {}",
                chunk.len(),
                self.chunk_capacity()
            )));
        }

        let run = self.slot_size - 1;
        let mut buf = vec![0u8; self.unit_size()];
        for (slot, bytes) in chunk.chunks(run).enumerate() {
            let offset = slot * self.slot_size + 1;
            buf[offset..offset + bytes.len()].copy_from_slice(bytes);
        }
        Ok(BlobUnit(Bytes::from(buf)))
    }

    fn payload(&self, unit: &BlobUnit) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.chunk_capacity());
        for slot in unit.as_bytes().chunks(self.slot_size) {
            out.extend_from_slice(&slot[1..]);
        }
        out
    }

    /// Decode a unit, trimming everything after the last non-zero byte
    pub fn decode(&self, unit: &BlobUnit) -> Bytes {
        let mut out = self.payload(unit);
        match out.iter().rposition(|b| *b != 0) {
            Some(last) => out.truncate(last + 1),
            None => out.clear(),
        }
        Bytes::from(out)
    }

    /// Decode a unit whose payload is known to be `size` bytes long
    pub fn decode_sized(&self, unit: &BlobUnit, size: usize) -> StoreResult<Bytes> {
        if size > self.chunk_capacity() {
            return Err(StoreError::invalid(format!(
                "Declared size {} exceeds blob capacity {}",
                size,
                self.chunk_capacity()
            )));
        }
        let mut out = self.payload(unit);
        out.truncate(size);
        Ok(Bytes::from(out))
    }

    /// Wrap raw bytes fetched from the store, checking the unit size
    pub fn unit_from_bytes(&self, bytes: Bytes) -> StoreResult<BlobUnit> {
        if bytes.len() != self.unit_size() {
            return Err(StoreError::invalid(format!(
                "Blob has {} bytes, expected {}",
                bytes.len(),
                self.unit_size()
            )));
        }
        Ok(BlobUnit(bytes))
    }

    /// Partition content into capacity-sized groups and encode each
    pub fn split_into_blobs(&self, content: &[u8]) -> StoreResult<Vec<BlobUnit>> {
        if content.is_empty() {
            return Err(StoreError::invalid("Content must not be empty"));
        }
        content
            .chunks(self.chunk_capacity())
            .map(|chunk| self.encode(chunk))
            .collect()
    }
}
