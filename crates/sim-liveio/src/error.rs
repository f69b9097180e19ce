//! Path: crates/sim-liveio/src/error.rs

use sim_types::ErrorCode;
use thiserror::Error;

/// Internal failures raised while servicing a live (non-mocked) request.
/// Neither handler ever propagates these as a panic or a `Result` back to
/// the Engine (§4.6) — they are always encoded into the handler's own output
/// shape (`WebResponse { status: 502, .. }` or a tagged `LlmResponse`).
#[derive(Debug, Error, Clone)]
pub enum LiveIoError {
    #[error("http request failed: {0}")]
    Transport(String),
    #[error("browser rendering failed: {0}")]
    Browser(String),
    #[error("unknown llm provider {0:?}")]
    UnknownProvider(String),
    #[error("missing API key for provider {0:?}")]
    MissingApiKey(String),
}

impl ErrorCode for LiveIoError {
    fn code(&self) -> &'static str {
        match self {
            Self::Transport(_) => "LIVEIO_TRANSPORT_FAILURE",
            Self::Browser(_) => "LIVEIO_BROWSER_FAILURE",
            Self::UnknownProvider(_) => "LIVEIO_UNKNOWN_PROVIDER",
            Self::MissingApiKey(_) => "LIVEIO_MISSING_API_KEY",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_are_stable() {
        assert_eq!(LiveIoError::Transport("x".into()).code(), "LIVEIO_TRANSPORT_FAILURE");
        assert_eq!(LiveIoError::UnknownProvider("x".into()).code(), "LIVEIO_UNKNOWN_PROVIDER");
    }
}
