//! Path: crates/sim-consensus/src/error.rs

use sim_types::ErrorCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConsensusError {
    /// The engine reports a snapshot id as missing mid-rotation. Can only
    /// happen if something outside this crate restores or discards a
    /// snapshot concurrently with a run in progress.
    #[error("engine snapshot {0} disappeared mid-rotation")]
    SnapshotMissing(u64),
}

impl ErrorCode for ConsensusError {
    fn code(&self) -> &'static str {
        match self {
            Self::SnapshotMissing(_) => "CONSENSUS_SNAPSHOT_MISSING",
        }
    }
}
