//! Path: crates/sim-codec/src/envelope.rs
//! Decodes the signed raw-transaction envelope: a legacy-format RLP list
//! carrying an ABI-encoded `addTransaction` call, whose payload is itself an
//! RLP tuple describing a deploy or a call.

use alloy_sol_types::{sol, SolCall};
use rlp::{Rlp, RlpStream};
use sim_crypto::{keccak256, recover_signer};
use sim_types::Address;

use crate::error::CodecError;

sol! {
    function addTransaction(address sender, address recipient, uint256 numValidators, uint256 maxRotations, bytes innerData);
}

/// The decoded outer envelope: the legacy transaction fields plus the
/// recovered sender and the transaction hash (`keccak256` of the signed
/// encoding).
#[derive(Debug, Clone)]
pub struct RawTransaction {
    pub from: Address,
    pub to: Option<Address>,
    pub nonce: u64,
    pub value: u128,
    pub data: Vec<u8>,
    pub hash: [u8; 32],
}

/// The ABI-decoded `addTransaction` payload.
#[derive(Debug, Clone)]
pub struct AddTransactionCall {
    pub sender: Address,
    pub recipient: Address,
    pub num_validators: u32,
    pub max_rotations: u32,
    pub inner_data: Vec<u8>,
}

/// Either shape carried in `innerData`, disambiguated by RLP item count.
#[derive(Debug, Clone)]
pub enum InnerPayload {
    Deploy {
        code: Vec<u8>,
        constructor_calldata: Vec<u8>,
        leader_only: bool,
    },
    Call {
        method_calldata: Vec<u8>,
        leader_only: bool,
    },
}

fn rlp_err(context: &str) -> impl Fn(rlp::DecoderError) -> CodecError + '_ {
    move |e| CodecError::MalformedEnvelope(format!("{context}: {e}"))
}

/// Decodes a signed legacy raw transaction (`0x`-prefixed or bare hex) and
/// recovers its sender.
pub fn decode_raw_transaction(raw_hex: &str) -> Result<RawTransaction, CodecError> {
    let hex_body = raw_hex.strip_prefix("0x").unwrap_or(raw_hex);
    let raw_bytes =
        hex::decode(hex_body).map_err(|e| CodecError::MalformedEnvelope(e.to_string()))?;

    let rlp = Rlp::new(&raw_bytes);
    if rlp.item_count().map_err(rlp_err("outer list"))? != 9 {
        return Err(CodecError::MalformedEnvelope(
            "legacy transaction must have 9 fields".to_string(),
        ));
    }

    let nonce: u64 = rlp.val_at(0).map_err(rlp_err("nonce"))?;
    let gas_price_bytes: Vec<u8> = rlp.val_at(1).map_err(rlp_err("gasPrice"))?;
    let gas_limit_bytes: Vec<u8> = rlp.val_at(2).map_err(rlp_err("gasLimit"))?;
    let to_bytes: Vec<u8> = rlp.at(3).map_err(rlp_err("to"))?.data().map_err(rlp_err("to"))?.to_vec();
    let value_bytes: Vec<u8> = rlp.val_at(4).map_err(rlp_err("value"))?;
    let data: Vec<u8> = rlp.val_at(5).map_err(rlp_err("data"))?;
    let v: u64 = rlp.val_at(6).map_err(rlp_err("v"))?;
    let r_bytes: Vec<u8> = rlp.val_at(7).map_err(rlp_err("r"))?;
    let s_bytes: Vec<u8> = rlp.val_at(8).map_err(rlp_err("s"))?;
    let value = be_bytes_to_u128(&value_bytes)?;

    let to = if to_bytes.is_empty() {
        None
    } else {
        Some(Address::from_slice(&to_bytes).map_err(|e| CodecError::MalformedEnvelope(e.to_string()))?)
    };

    let unsigned_hash =
        unsigned_signing_hash(nonce, &gas_price_bytes, &gas_limit_bytes, &to_bytes, &value_bytes, &data, v);
    let r = left_pad_32(&r_bytes);
    let s = left_pad_32(&s_bytes);
    let from = recover_signer(&unsigned_hash, &r, &s, v)?;

    Ok(RawTransaction {
        from,
        to,
        nonce,
        value,
        data,
        hash: keccak256(&raw_bytes),
    })
}

fn left_pad_32(bytes: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    let start = 32usize.saturating_sub(bytes.len());
    out[start..].copy_from_slice(&bytes[bytes.len().saturating_sub(32)..]);
    out
}

fn be_bytes_to_u128(bytes: &[u8]) -> Result<u128, CodecError> {
    if bytes.len() > 16 {
        return Err(CodecError::MalformedEnvelope(
            "integer field wider than 128 bits".to_string(),
        ));
    }
    let mut buf = [0u8; 16];
    buf[16 - bytes.len()..].copy_from_slice(bytes);
    Ok(u128::from_be_bytes(buf))
}

/// Re-encodes the legacy transaction's unsigned fields (applying the EIP-155
/// `(chainId, 0, 0)` suffix when `v` encodes a chain id) and hashes the
/// result: the digest the signature was produced over. RLP's integer
/// encoding is identical to its minimal-big-endian byte-string encoding, so
/// the already-decoded byte strings are re-appended directly.
fn unsigned_signing_hash(
    nonce: u64,
    gas_price_bytes: &[u8],
    gas_limit_bytes: &[u8],
    to_bytes: &[u8],
    value_bytes: &[u8],
    data: &[u8],
    v: u64,
) -> [u8; 32] {
    let chain_id = if v >= 35 { Some((v - 35) / 2) } else { None };

    let mut stream = RlpStream::new();
    stream.begin_list(if chain_id.is_some() { 9 } else { 6 });
    stream.append(&nonce);
    stream.append(&gas_price_bytes);
    stream.append(&gas_limit_bytes);
    stream.append(&to_bytes);
    stream.append(&value_bytes);
    stream.append(&data);
    if let Some(id) = chain_id {
        stream.append(&id);
        stream.append(&0u8);
        stream.append(&0u8);
    }
    keccak256(&stream.out())
}

/// Decodes the envelope's ABI-encoded `data` field: the `addTransaction`
/// call selector plus its five arguments.
pub fn decode_add_transaction(input_data: &[u8]) -> Result<AddTransactionCall, CodecError> {
    let call = addTransactionCall::abi_decode(input_data, true)
        .map_err(|e| CodecError::MalformedEnvelope(format!("addTransaction ABI decode: {e}")))?;

    let sender = Address::from_slice(call.sender.as_slice())
        .map_err(|e| CodecError::MalformedEnvelope(e.to_string()))?;
    let recipient = Address::from_slice(call.recipient.as_slice())
        .map_err(|e| CodecError::MalformedEnvelope(e.to_string()))?;
    let num_validators: u32 = call
        .numValidators
        .try_into()
        .map_err(|_| CodecError::MalformedEnvelope("numValidators overflows u32".to_string()))?;
    let max_rotations: u32 = call
        .maxRotations
        .try_into()
        .map_err(|_| CodecError::MalformedEnvelope("maxRotations overflows u32".to_string()))?;

    Ok(AddTransactionCall {
        sender,
        recipient,
        num_validators,
        max_rotations,
        inner_data: call.innerData,
    })
}

/// Decodes `innerData` into a deploy or a call payload, disambiguated by
/// arity: a 3-item RLP list is a deploy, a 2-item list is a call.
pub fn decode_inner_payload(inner_data: &[u8]) -> Result<InnerPayload, CodecError> {
    let rlp = Rlp::new(inner_data);
    let count = rlp.item_count().map_err(rlp_err("inner payload"))?;
    match count {
        3 => {
            let code: Vec<u8> = rlp.val_at(0).map_err(rlp_err("code"))?;
            let constructor_calldata: Vec<u8> =
                rlp.val_at(1).map_err(rlp_err("constructor calldata"))?;
            let leader_only = decode_leader_only_flag(&rlp, 2)?;
            Ok(InnerPayload::Deploy {
                code,
                constructor_calldata,
                leader_only,
            })
        }
        2 => {
            let method_calldata: Vec<u8> = rlp.val_at(0).map_err(rlp_err("method calldata"))?;
            let leader_only = decode_leader_only_flag(&rlp, 1)?;
            Ok(InnerPayload::Call {
                method_calldata,
                leader_only,
            })
        }
        other => Err(CodecError::MalformedEnvelope(format!(
            "inner payload must have 2 or 3 items, got {other}"
        ))),
    }
}

fn decode_leader_only_flag(rlp: &Rlp, index: usize) -> Result<bool, CodecError> {
    let bytes: Vec<u8> = rlp.val_at(index).map_err(rlp_err("leaderOnly flag"))?;
    Ok(bytes == [1u8])
}

/// Decodes the RLP pair sent by `gen_call`/`sim_call`: `(calldataBytes,
/// leaderOnlyFlag)`.
pub fn decode_gen_call_data(hex_data: &str) -> Result<(Vec<u8>, bool), CodecError> {
    let hex_body = hex_data.strip_prefix("0x").unwrap_or(hex_data);
    let raw = hex::decode(hex_body).map_err(|e| CodecError::MalformedEnvelope(e.to_string()))?;
    let rlp = Rlp::new(&raw);
    let count = rlp.item_count().map_err(rlp_err("gen_call payload"))?;
    let calldata_bytes: Vec<u8> = rlp.val_at(0).map_err(rlp_err("calldata"))?;
    let leader_only = if count > 1 {
        decode_leader_only_flag(&rlp, 1)?
    } else {
        false
    };
    Ok((calldata_bytes, leader_only))
}

/// Left-pads an address into a 32-byte (64 hex char, no `0x`) log topic.
pub fn pad_address_topic(addr: Address) -> String {
    hex::encode(addr.pad_to_32())
}

#[cfg(test)]
mod tests {
    use super::*;
    use k256::ecdsa::SigningKey;
    use sim_crypto::keccak256 as kc;

    fn sign_legacy(
        signing_key: &SigningKey,
        nonce: u64,
        to: &[u8],
        value: &[u8],
        data: &[u8],
        chain_id: Option<u64>,
    ) -> Vec<u8> {
        let gas_price: &[u8] = &[];
        let gas_limit: &[u8] = &0x5208u32.to_be_bytes()[1..];
        let unsigned_hash = unsigned_signing_hash(
            nonce,
            gas_price,
            gas_limit,
            to,
            value,
            data,
            chain_id.map(|c| c * 2 + 35).unwrap_or(27),
        );
        let (signature, recid) = signing_key.sign_prehash_recoverable(&unsigned_hash).unwrap();
        let bytes = signature.to_bytes();
        let r = bytes[..32].to_vec();
        let s = bytes[32..].to_vec();
        let v = match chain_id {
            Some(id) => id * 2 + 35 + recid.to_byte() as u64,
            None => 27 + recid.to_byte() as u64,
        };

        let mut stream = RlpStream::new();
        stream.begin_list(9);
        stream.append(&nonce);
        stream.append(&gas_price);
        stream.append(&gas_limit);
        stream.append(&to);
        stream.append(&value);
        stream.append(&data);
        stream.append(&v);
        stream.append(&r);
        stream.append(&s);
        stream.out().to_vec()
    }

    #[test]
    fn decodes_and_recovers_sender_of_a_signed_legacy_transaction() {
        let signing_key = SigningKey::from_bytes(&[0x22u8; 32].into()).unwrap();
        let to = [0xABu8; 20];
        let raw = sign_legacy(&signing_key, 3, &to, &[], b"hello", Some(61_999));
        let hex = format!("0x{}", hex::encode(&raw));

        let decoded = decode_raw_transaction(&hex).unwrap();
        assert_eq!(decoded.nonce, 3);
        assert_eq!(decoded.data, b"hello");
        assert_eq!(decoded.hash, kc(&raw));

        let verifying_key = k256::ecdsa::VerifyingKey::from(&signing_key);
        let encoded = verifying_key.to_encoded_point(false);
        let expected_hash = kc(&encoded.as_bytes()[1..]);
        let expected_from = Address::from_slice(&expected_hash[12..]).unwrap();
        assert_eq!(decoded.from, expected_from);
    }

    #[test]
    fn inner_payload_arity_disambiguates_deploy_from_call() {
        let mut deploy_stream = RlpStream::new();
        deploy_stream.begin_list(3);
        deploy_stream.append(&b"code".to_vec());
        deploy_stream.append(&b"ctor".to_vec());
        deploy_stream.append(&vec![1u8]);
        let deploy = decode_inner_payload(&deploy_stream.out()).unwrap();
        assert!(matches!(deploy, InnerPayload::Deploy { leader_only: true, .. }));

        let mut call_stream = RlpStream::new();
        call_stream.begin_list(2);
        call_stream.append(&b"method-call".to_vec());
        call_stream.append(&vec![0u8]);
        let call = decode_inner_payload(&call_stream.out()).unwrap();
        assert!(matches!(call, InnerPayload::Call { leader_only: false, .. }));
    }

    #[test]
    fn rejects_inner_payload_with_wrong_arity() {
        let mut stream = RlpStream::new();
        stream.begin_list(1);
        stream.append(&b"x".to_vec());
        assert!(decode_inner_payload(&stream.out()).is_err());
    }
}
