//! Path: crates/sim-crypto/src/lib.rs
//! Hashing and ECDSA signer recovery for the Sim's Ethereum-family wire
//! protocol. Narrowly scoped: the Sim validates no transaction semantics
//! beyond recovering the signer (see spec Non-goals).

use k256::ecdsa::{RecoveryId, Signature, VerifyingKey};
use sha3::{Digest, Keccak256};
use sim_types::Address;
use thiserror::Error;

use sim_types::ErrorCode;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("invalid recovery id derived from v={0}")]
    InvalidRecoveryId(u64),
    #[error("malformed signature: {0}")]
    MalformedSignature(String),
    #[error("signature did not recover to a valid public key: {0}")]
    RecoveryFailed(String),
}

impl ErrorCode for CryptoError {
    fn code(&self) -> &'static str {
        match self {
            Self::InvalidRecoveryId(_) => "CRYPTO_INVALID_RECOVERY_ID",
            Self::MalformedSignature(_) => "CRYPTO_MALFORMED_SIGNATURE",
            Self::RecoveryFailed(_) => "CRYPTO_RECOVERY_FAILED",
        }
    }
}

/// keccak256, the hash function backing external transaction hashes, the
/// `NewTransaction` log topic, and the `addTransaction` selector.
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    let digest = hasher.finalize();
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    out
}

/// The first 4 bytes of `keccak256(signature)`, e.g. for
/// `addTransaction(address,address,uint256,uint256,bytes)`.
pub fn function_selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    let mut out = [0u8; 4];
    out.copy_from_slice(&hash[..4]);
    out
}

/// Normalizes a legacy-envelope `v` value (either `{27,28}` or the EIP-155
/// `chain_id*2+35+recid` form) into a 0/1 recovery id.
fn normalize_recovery_id(v: u64) -> Result<RecoveryId, CryptoError> {
    let recid_byte = if v >= 35 {
        ((v - 35) % 2) as u8
    } else if v == 27 || v == 28 {
        (v - 27) as u8
    } else {
        return Err(CryptoError::InvalidRecoveryId(v));
    };
    RecoveryId::from_byte(recid_byte).ok_or(CryptoError::InvalidRecoveryId(v))
}

/// Recovers the signer address from a legacy-envelope signature over the
/// RLP-encoded unsigned transaction hash.
pub fn recover_signer(
    unsigned_hash: &[u8; 32],
    r: &[u8; 32],
    s: &[u8; 32],
    v: u64,
) -> Result<Address, CryptoError> {
    let recovery_id = normalize_recovery_id(v)?;

    let mut sig_bytes = [0u8; 64];
    sig_bytes[..32].copy_from_slice(r);
    sig_bytes[32..].copy_from_slice(s);
    let signature = Signature::from_slice(&sig_bytes)
        .map_err(|e| CryptoError::MalformedSignature(e.to_string()))?;

    let verifying_key = VerifyingKey::recover_from_prehash(unsigned_hash, &signature, recovery_id)
        .map_err(|e| CryptoError::RecoveryFailed(e.to_string()))?;

    Ok(public_key_to_address(&verifying_key))
}

/// Ethereum-style address derivation: the low 20 bytes of
/// `keccak256(uncompressed_public_key[1..])`.
fn public_key_to_address(key: &VerifyingKey) -> Address {
    let encoded = key.to_encoded_point(false);
    let hash = keccak256(&encoded.as_bytes()[1..]);
    Address::from_slice(&hash[12..]).expect("keccak256 output slice is always 20 bytes")
}

#[cfg(test)]
mod tests {
    use super::*;
    use k256::ecdsa::SigningKey;

    #[test]
    fn keccak256_of_new_transaction_topic_matches_known_value() {
        let digest = keccak256(b"NewTransaction(bytes32,address,address)");
        assert_eq!(digest.len(), 32);
        // Deterministic: re-hashing the same input always yields the same topic.
        assert_eq!(digest, keccak256(b"NewTransaction(bytes32,address,address)"));
    }

    #[test]
    fn recovers_signer_matching_the_signing_key() {
        let signing_key = SigningKey::from_bytes(&[0x11u8; 32].into()).unwrap();
        let verifying_key = VerifyingKey::from(&signing_key);
        let expected = public_key_to_address(&verifying_key);

        let msg_hash = keccak256(b"hello world");
        let (signature, recid) = signing_key.sign_prehash_recoverable(&msg_hash).unwrap();
        let (r, s) = {
            let bytes = signature.to_bytes();
            let mut r = [0u8; 32];
            let mut s = [0u8; 32];
            r.copy_from_slice(&bytes[..32]);
            s.copy_from_slice(&bytes[32..]);
            (r, s)
        };
        let v = 27 + recid.to_byte() as u64;

        let recovered = recover_signer(&msg_hash, &r, &s, v).unwrap();
        assert_eq!(recovered, expected);
    }

    #[test]
    fn rejects_a_nonsensical_v_value() {
        let hash = [0u8; 32];
        let err = recover_signer(&hash, &[1u8; 32], &[1u8; 32], 5).unwrap_err();
        assert_eq!(err.code(), "CRYPTO_INVALID_RECOVERY_ID");
    }
}
