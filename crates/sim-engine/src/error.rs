//! Path: crates/sim-engine/src/error.rs

use sim_types::{Address, ErrorCode};
use thiserror::Error;

/// An error surfaced by a `ContractHost` implementation, crossing back into
/// the Engine through `construct`/`invoke`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HostError {
    #[error("contract rolled back: {0}")]
    Rollback(String),
    #[error("contract raised an exception: {0}")]
    Exception(String),
    #[error("unknown method {0:?} on this contract class")]
    UnknownMethod(String),
}

impl ErrorCode for HostError {
    fn code(&self) -> &'static str {
        match self {
            Self::Rollback(_) => "HOST_CONTRACT_ROLLBACK",
            Self::Exception(_) => "HOST_CONTRACT_EXCEPTION",
            Self::UnknownMethod(_) => "HOST_UNKNOWN_METHOD",
        }
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("unknown contract: {0}")]
    UnknownContract(Address),
    #[error("unknown method {method:?} on contract {address}")]
    UnknownMethodOnContract { address: Address, method: String },
    #[error("contract rolled back: {0}")]
    ContractRollback(String),
    #[error("contract raised an exception: {0}")]
    ContractException(String),
    #[error("failed to read contract code at {0:?}: {1}")]
    CodeUnreadable(String, String),
    #[error(transparent)]
    Codec(#[from] sim_codec::CodecError),
    #[error(transparent)]
    Host(#[from] HostError),
}

impl ErrorCode for EngineError {
    fn code(&self) -> &'static str {
        match self {
            Self::UnknownContract(_) => "ENGINE_UNKNOWN_CONTRACT",
            Self::UnknownMethodOnContract { .. } => "ENGINE_UNKNOWN_METHOD_ON_CONTRACT",
            Self::ContractRollback(_) => "ENGINE_CONTRACT_ROLLBACK",
            Self::ContractException(_) => "ENGINE_CONTRACT_EXCEPTION",
            Self::CodeUnreadable(..) => "ENGINE_CODE_UNREADABLE",
            Self::Codec(e) => e.code(),
            Self::Host(e) => e.code(),
        }
    }
}

impl EngineError {
    /// Converts a host failure into the matching top-level engine error,
    /// collapsing `HostError::Rollback`/`Exception` into their Engine-level
    /// counterparts (same taxonomy, §7 of the design notes).
    pub fn from_host(err: HostError) -> Self {
        match err {
            HostError::Rollback(msg) => Self::ContractRollback(msg),
            HostError::Exception(msg) => Self::ContractException(msg),
            other => Self::Host(other),
        }
    }

    /// Renders this error the way a status-prefixed rollback payload does:
    /// the plain display message, with no code prefix.
    pub fn as_rollback_message(&self) -> String {
        self.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_error_codes_are_stable() {
        assert_eq!(HostError::Rollback("x".into()).code(), "HOST_CONTRACT_ROLLBACK");
        assert_eq!(HostError::Exception("x".into()).code(), "HOST_CONTRACT_EXCEPTION");
        assert_eq!(HostError::UnknownMethod("x".into()).code(), "HOST_UNKNOWN_METHOD");
    }

    #[test]
    fn engine_error_codes_are_stable() {
        let addr = Address([0u8; 20]);
        assert_eq!(EngineError::UnknownContract(addr).code(), "ENGINE_UNKNOWN_CONTRACT");
        assert_eq!(
            EngineError::UnknownMethodOnContract { address: addr, method: "m".into() }.code(),
            "ENGINE_UNKNOWN_METHOD_ON_CONTRACT"
        );
        assert_eq!(EngineError::ContractRollback("x".into()).code(), "ENGINE_CONTRACT_ROLLBACK");
        assert_eq!(EngineError::ContractException("x".into()).code(), "ENGINE_CONTRACT_EXCEPTION");
        assert_eq!(EngineError::CodeUnreadable("p".into(), "e".into()).code(), "ENGINE_CODE_UNREADABLE");
    }

    #[test]
    fn from_host_collapses_rollback_and_exception_into_engine_variants() {
        assert!(matches!(
            EngineError::from_host(HostError::Rollback("boom".into())),
            EngineError::ContractRollback(m) if m == "boom"
        ));
        assert!(matches!(
            EngineError::from_host(HostError::UnknownMethod("m".into())),
            EngineError::Host(HostError::UnknownMethod(m)) if m == "m"
        ));
    }
}
