//! Path: crates/sim-types/src/address.rs
//! Canonical 20-byte addresses and 32-byte hashes shared across the Sim.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The fixed recipient value that signals "this submission is a deploy".
pub const ADDRESS_ZERO: Address = Address([0u8; 20]);

/// A 20-byte address, canonicalized as lowercase `0x`-prefixed hex on the wire.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Address(pub [u8; 20]);

impl Address {
    pub const LEN: usize = 20;

    pub fn from_slice(bytes: &[u8]) -> Result<Self, AddressError> {
        if bytes.len() != Self::LEN {
            return Err(AddressError::WrongLength(bytes.len()));
        }
        let mut out = [0u8; 20];
        out.copy_from_slice(bytes);
        Ok(Self(out))
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Lowercase `0x`-prefixed hex, the canonical wire form.
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    /// Parses a `0x`-prefixed (or bare) hex string, lowercasing implicitly.
    pub fn parse_hex(s: &str) -> Result<Self, AddressError> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(s).map_err(|_| AddressError::InvalidHex(s.to_string()))?;
        Self::from_slice(&bytes)
    }

    /// Left-pads the address into a 32-byte big-endian word, as used for
    /// Ethereum-style log topics.
    pub fn pad_to_32(&self) -> [u8; 32] {
        let mut out = [0u8; 32];
        out[12..].copy_from_slice(&self.0);
        out
    }

    pub fn is_zero(&self) -> bool {
        *self == ADDRESS_ZERO
    }

    /// The `0x0000...00i` fallback addressing scheme for validators the Sim
    /// never materializes as real accounts: used both by Consensus's real
    /// vote map and by the RPC layer's synthetic-vote fallback for
    /// transactions recorded with no per-validator votes (§6.1).
    pub fn synthetic_validator(index: u32) -> Self {
        let mut bytes = [0u8; 20];
        bytes[16..].copy_from_slice(&index.to_be_bytes());
        Self(bytes)
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.to_hex())
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AddressError {
    #[error("address must be {} bytes, got {0}", Address::LEN)]
    WrongLength(usize),
    #[error("invalid hex in address: {0}")]
    InvalidHex(String),
}

/// A 32-byte hash, used for internal hashes, external hashes, slot ids, and
/// log topics alike.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Hash32(pub [u8; 32]);

impl Hash32 {
    pub const ZERO: Hash32 = Hash32([0u8; 32]);

    pub fn from_slice(bytes: &[u8]) -> Result<Self, AddressError> {
        if bytes.len() != 32 {
            return Err(AddressError::WrongLength(bytes.len()));
        }
        let mut out = [0u8; 32];
        out.copy_from_slice(bytes);
        Ok(Self(out))
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    pub fn parse_hex(s: &str) -> Result<Self, AddressError> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(s).map_err(|_| AddressError::InvalidHex(s.to_string()))?;
        Self::from_slice(&bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for Hash32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash32({})", self.to_hex())
    }
}

impl fmt::Display for Hash32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_roundtrips_through_hex() {
        let a = Address([0x11; 20]);
        let s = a.to_hex();
        assert_eq!(Address::parse_hex(&s).unwrap(), a);
    }

    #[test]
    fn zero_address_is_the_deploy_sentinel() {
        assert!(ADDRESS_ZERO.is_zero());
        assert_eq!(ADDRESS_ZERO.to_hex(), format!("0x{}", "00".repeat(20)));
    }

    #[test]
    fn synthetic_validator_addresses_are_stable_and_distinct() {
        assert_eq!(Address::synthetic_validator(0).to_hex(), format!("0x{}", "00".repeat(20)));
        assert_ne!(Address::synthetic_validator(1), Address::synthetic_validator(2));
    }

    #[test]
    fn address_pads_to_32_bytes_big_endian() {
        let a = Address([0xAB; 20]);
        let padded = a.pad_to_32();
        assert_eq!(&padded[..12], &[0u8; 12]);
        assert_eq!(&padded[12..], &a.0[..]);
    }
}
