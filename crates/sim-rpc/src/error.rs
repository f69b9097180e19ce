//! Path: crates/sim-rpc/src/error.rs
//! The Dispatcher's error type and the single place (§7) that maps any
//! `ErrorCode` in the Sim — codec, state, engine, consensus, or this crate's
//! own — onto a JSON-RPC 2.0 numeric error code.

use sim_types::ErrorCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("unknown method {0:?}")]
    UnknownMethod(String),
    #[error("invalid params: {0}")]
    InvalidParams(String),
    #[error(transparent)]
    Codec(#[from] sim_codec::CodecError),
    #[error(transparent)]
    Engine(#[from] sim_engine::EngineError),
    #[error(transparent)]
    Consensus(#[from] sim_consensus::ConsensusError),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ErrorCode for DispatchError {
    fn code(&self) -> &'static str {
        match self {
            Self::UnknownMethod(_) => "DISPATCH_UNKNOWN_METHOD",
            Self::InvalidParams(_) => "DISPATCH_INVALID_PARAMS",
            Self::Codec(e) => e.code(),
            Self::Engine(e) => e.code(),
            Self::Consensus(e) => e.code(),
            Self::Internal(_) => "DISPATCH_INTERNAL_ERROR",
        }
    }
}

/// A JSON-RPC 2.0 error object's `{code, message}` pair.
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
}

impl DispatchError {
    /// The table of §7: each `ErrorCode` string maps onto a fixed JSON-RPC
    /// numeric code. Unrecognized/engine-internal codes fall back to the
    /// generic application error `-32000`.
    pub fn to_json_rpc(&self) -> JsonRpcError {
        let code = match self {
            Self::UnknownMethod(_) => -32601,
            Self::InvalidParams(_) | Self::Codec(_) => -32602,
            Self::Internal(_) => -32603,
            Self::Engine(_) | Self::Consensus(_) => -32000,
        };
        JsonRpcError { code, message: self.to_string() }
    }
}
