//! Path: crates/sim-state/src/error.rs

use sim_types::ErrorCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("amount must be non-negative")]
    NegativeAmount,
    #[error("malformed address: {0}")]
    MalformedAddress(String),
}

impl ErrorCode for StateError {
    fn code(&self) -> &'static str {
        match self {
            Self::NegativeAmount => "STATE_NEGATIVE_AMOUNT",
            Self::MalformedAddress(_) => "STATE_MALFORMED_ADDRESS",
        }
    }
}
