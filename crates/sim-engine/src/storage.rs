//! Path: crates/sim-engine/src/storage.rs
//! Per-contract storage: a slot-indexed byte store with deterministic
//! indirect-slot derivation and zero-extending reads past the high-water
//! mark.

use std::collections::HashMap;

use sha2::{Digest, Sha256};
use sim_types::Hash32;

/// One contract's byte-addressable, slot-indexed store.
#[derive(Clone, Debug, Default)]
pub struct StoragePartition {
    slots: HashMap<Hash32, Vec<u8>>,
}

impl StoragePartition {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads `length` bytes at `offset` from `slot`; bytes past the stored
    /// length are zero-extended rather than erroring.
    pub fn read(&self, slot: Hash32, offset: u32, length: u32) -> Vec<u8> {
        let mut out = vec![0u8; length as usize];
        let Some(bytes) = self.slots.get(&slot) else {
            return out;
        };
        let start = offset as usize;
        if start >= bytes.len() {
            return out;
        }
        let end = start.saturating_add(length as usize).min(bytes.len());
        out[..end - start].copy_from_slice(&bytes[start..end]);
        out
    }

    /// Writes `data` at `offset` in `slot`, growing the backing buffer
    /// (zero-filling any gap) as needed.
    pub fn write(&mut self, slot: Hash32, offset: u32, data: &[u8]) {
        let buf = self.slots.entry(slot).or_default();
        let end = offset as usize + data.len();
        if buf.len() < end {
            buf.resize(end, 0);
        }
        buf[offset as usize..end].copy_from_slice(data);
    }

    /// Derives a child slot-id deterministically from a parent slot-id and an
    /// offset: `SHA-256(parent || offset-as-little-endian-u32)`.
    pub fn derive_child_slot(parent: Hash32, offset: u32) -> Hash32 {
        let mut hasher = Sha256::new();
        hasher.update(parent.as_bytes());
        hasher.update(offset.to_le_bytes());
        let digest = hasher.finalize();
        Hash32::from_slice(&digest).expect("sha256 output is always 32 bytes")
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot(byte: u8) -> Hash32 {
        Hash32([byte; 32])
    }

    #[test]
    fn write_then_read_round_trips() {
        let mut part = StoragePartition::new();
        part.write(slot(1), 0, b"hello");
        assert_eq!(part.read(slot(1), 0, 5), b"hello");
    }

    #[test]
    fn read_past_high_water_mark_zero_extends() {
        let mut part = StoragePartition::new();
        part.write(slot(1), 0, b"ab");
        assert_eq!(part.read(slot(1), 0, 5), vec![b'a', b'b', 0, 0, 0]);
    }

    #[test]
    fn read_of_unwritten_slot_is_all_zero() {
        let part = StoragePartition::new();
        assert_eq!(part.read(slot(9), 0, 4), vec![0, 0, 0, 0]);
    }

    #[test]
    fn write_beyond_current_length_fills_the_gap() {
        let mut part = StoragePartition::new();
        part.write(slot(1), 0, b"ab");
        part.write(slot(1), 4, b"cd");
        assert_eq!(part.read(slot(1), 0, 6), vec![b'a', b'b', 0, 0, b'c', b'd']);
    }

    #[test]
    fn child_slot_derivation_is_deterministic_and_offset_sensitive() {
        let a = StoragePartition::derive_child_slot(slot(1), 0);
        let b = StoragePartition::derive_child_slot(slot(1), 0);
        let c = StoragePartition::derive_child_slot(slot(1), 1);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
