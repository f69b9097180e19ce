//! Path: crates/sim-codec/src/lib.rs
//! The Codec: the self-describing calldata blob format and the signed
//! submission envelope (legacy RLP transaction → ABI-decoded
//! `addTransaction` call → RLP-decoded deploy/call payload).

pub mod calldata;
pub mod envelope;
pub mod error;

pub use calldata::{
    decode_method_call, decode_status_prefixed, decode_value, encode_method_call,
    encode_rollback_bytes, encode_success_bytes, encode_value,
};
pub use envelope::{
    decode_add_transaction, decode_gen_call_data, decode_inner_payload, decode_raw_transaction,
    pad_address_topic, AddTransactionCall, InnerPayload, RawTransaction,
};
pub use error::CodecError;
