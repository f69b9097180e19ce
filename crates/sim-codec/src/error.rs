//! Path: crates/sim-codec/src/error.rs

use sim_types::ErrorCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),
    #[error("malformed calldata: {0}")]
    MalformedCalldata(String),
    #[error("signer recovery failed: {0}")]
    SignatureRecovery(#[from] sim_crypto::CryptoError),
}

impl ErrorCode for CodecError {
    fn code(&self) -> &'static str {
        match self {
            Self::MalformedEnvelope(_) => "CODEC_MALFORMED_ENVELOPE",
            Self::MalformedCalldata(_) => "CODEC_MALFORMED_CALLDATA",
            Self::SignatureRecovery(_) => "CODEC_SIGNATURE_RECOVERY_FAILED",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_are_stable() {
        assert_eq!(CodecError::MalformedEnvelope("x".into()).code(), "CODEC_MALFORMED_ENVELOPE");
        assert_eq!(CodecError::MalformedCalldata("x".into()).code(), "CODEC_MALFORMED_CALLDATA");
        assert_eq!(
            CodecError::SignatureRecovery(sim_crypto::CryptoError::InvalidRecoveryId(5)).code(),
            "CODEC_SIGNATURE_RECOVERY_FAILED"
        );
    }
}
