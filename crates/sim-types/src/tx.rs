//! Path: crates/sim-types/src/tx.rs

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::address::{Address, Hash32};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxKind {
    Deploy,
    Call,
}

/// Transaction lifecycle status. A transaction is in exactly one terminal
/// state (`Finalized`, `Undetermined`, or `Failed`) after its handling path
/// completes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxStatus {
    Pending,
    Accepted,
    Finalized,
    Undetermined,
    Failed,
}

impl TxStatus {
    /// The production-compatible wire spelling, e.g. `"FINALIZED"`.
    pub fn as_wire_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Accepted => "ACCEPTED",
            Self::Finalized => "FINALIZED",
            Self::Undetermined => "UNDETERMINED",
            Self::Failed => "FAILED",
        }
    }
}

/// One validator's vote on a consensus attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Vote {
    Agree,
    Disagree,
}

impl Vote {
    pub fn as_wire_str(&self) -> &'static str {
        match self {
            Self::Agree => "agree",
            Self::Disagree => "disagree",
        }
    }
}

/// A record of a cross-contract operation triggered during execution of a
/// top-level call: a child deploy or an enqueued post-message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TriggeredOp {
    Deploy { address: Address },
    Post { address: Address, method: String },
}

/// The world's record of one submitted transaction (deploy or call),
/// indexed three ways by `StateStore`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Transaction {
    pub internal_hash: Hash32,
    pub external_hash: Option<Hash32>,
    pub sequential_id: u64,
    pub sender: Address,
    pub recipient: Option<Address>,
    pub kind: TxKind,
    pub status: TxStatus,
    pub calldata_bytes: Vec<u8>,
    pub result_bytes: Vec<u8>,
    pub num_validators: u32,
    pub consensus_votes: BTreeMap<Address, Vote>,
    pub rotation: u32,
    pub block_number: u64,
    pub error: Option<String>,
    pub triggered_ops: Vec<TriggeredOp>,
}

impl Transaction {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.status,
            TxStatus::Finalized | TxStatus::Undetermined | TxStatus::Failed
        )
    }
}
