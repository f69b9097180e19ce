//! Path: crates/sim-engine/src/witness.rs
//! The record of a non-deterministic operation the leader performed during a
//! call, consulted by Consensus to compute each validator's vote.

use sim_types::CalldataValue;

/// `(captured-leader-result, validator-closure)`. The leader-closure of the
/// design notes needs no separate representation: by the time a `Witness`
/// exists, the leader has already produced `leader_result` from it.
pub struct Witness {
    pub leader_result: CalldataValue,
    pub validate: Box<dyn Fn(&CalldataValue) -> bool + Send + Sync>,
}

impl Witness {
    /// A witness whose validator-closure is structural equality with the
    /// leader's captured result — the default for mocked/deterministic
    /// Web and LLM responses, since every validator consults the same
    /// process-wide mock table the leader did.
    pub fn equality(leader_result: CalldataValue) -> Self {
        let expected = leader_result.clone();
        Self {
            leader_result,
            validate: Box::new(move |candidate| candidate == &expected),
        }
    }

    pub fn agrees(&self) -> bool {
        (self.validate)(&self.leader_result)
    }
}

impl std::fmt::Debug for Witness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Witness")
            .field("leader_result", &self.leader_result)
            .finish_non_exhaustive()
    }
}
