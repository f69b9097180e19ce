//! Path: crates/sim-consensus/src/consensus.rs
//! The leader/validator voting loop (§4.4): snapshot the world, run the
//! leader's execution through the Engine, capture the witnesses it leaves
//! behind, tally each validator's vote against them, and either commit
//! (strict majority agrees) or restore and rotate to the next attempt.

use std::collections::BTreeMap;

use sim_engine::{ContractHost, Engine};
use sim_types::{Address, Vote};

use crate::error::ConsensusError;

/// The terminal outcome of a consensus run. `finalized = false` means every
/// rotation was exhausted without reaching a majority; the caller (the
/// Dispatcher) is responsible for recording `TxStatus::Undetermined` in that
/// case, `TxStatus::Finalized` otherwise — Consensus itself has no notion of
/// a transaction record.
#[derive(Clone, Debug)]
pub struct ConsensusOutcome {
    pub finalized: bool,
    /// The leader's successful result bytes, empty if the final attempt's
    /// leader execution errored.
    pub result_bytes: Vec<u8>,
    /// The leader's error message from the final attempt, if any. A
    /// `finalized` outcome with `error.is_some()` is the legitimate
    /// "FINALIZED + ERROR" state of §7: the transaction committed, but the
    /// contract's own execution failed.
    pub error: Option<String>,
    pub votes: BTreeMap<Address, Vote>,
    pub rotation: u32,
}

/// Runs the rotation loop against `engine`. `execute` performs exactly one
/// leader attempt — typically a closure over `engine.deploy_from_codebytes`
/// or `engine.call_from_calldata` — and must return the status-prefixed
/// success bytes on success, or the error's display message on failure.
/// `execute` is re-invoked once per rotation; the engine's witness list is
/// cleared before each call and inspected immediately after.
pub fn run<H, F>(
    engine: &Engine<H>,
    num_validators: u32,
    max_rotations: u32,
    mut execute: F,
) -> Result<ConsensusOutcome, ConsensusError>
where
    H: ContractHost,
    H::Instance: Clone,
    F: FnMut() -> Result<Vec<u8>, String>,
{
    let max_rotations = max_rotations.max(1);
    let required = num_validators / 2 + 1;

    let mut last_result_bytes = Vec::new();
    let mut last_error: Option<String> = None;
    let mut last_votes = BTreeMap::new();

    for rotation in 0..max_rotations {
        let snapshot_id = engine.snapshot();
        engine.clear_witnesses();

        let (result_bytes, leader_error) = match execute() {
            Ok(bytes) => (bytes, None),
            Err(message) => (Vec::new(), Some(message)),
        };

        let votes = compute_votes(engine, num_validators);
        let agree_count = votes.values().filter(|vote| matches!(vote, Vote::Agree)).count() as u32;

        last_result_bytes = result_bytes.clone();
        last_error = leader_error.clone();
        last_votes = votes.clone();

        if agree_count >= required {
            tracing::info!(
                target: "sim_consensus::rotation",
                rotation,
                agree_count,
                num_validators,
                leader_error = leader_error.as_deref().unwrap_or(""),
                "consensus finalized"
            );
            return Ok(ConsensusOutcome {
                finalized: true,
                result_bytes,
                error: leader_error,
                votes,
                rotation,
            });
        }

        tracing::debug!(
            target: "sim_consensus::rotation",
            rotation,
            agree_count,
            num_validators,
            "consensus attempt disagreed, rotating"
        );
        // Every non-finalizing attempt restores, including the last: an
        // UNDETERMINED outcome must leave the world bit-identical to its
        // state at entry to this run (§8 invariant), not just to whatever
        // the final rotation's execute() happened to leave behind.
        if !engine.restore(snapshot_id) {
            return Err(ConsensusError::SnapshotMissing(snapshot_id));
        }
    }

    tracing::warn!(
        target: "sim_consensus::rotation",
        max_rotations,
        "consensus undetermined after exhausting all rotations"
    );
    Ok(ConsensusOutcome {
        finalized: false,
        result_bytes: last_result_bytes,
        error: last_error,
        votes: last_votes,
        rotation: max_rotations - 1,
    })
}

/// Vote computation (§4.4): a single validator (or none configured) always
/// agrees; otherwise every validator shares the same verdict, since the Sim
/// does not materialize distinct validator identities — each one consults
/// the same witness list the leader produced.
fn compute_votes<H: ContractHost>(engine: &Engine<H>, num_validators: u32) -> BTreeMap<Address, Vote> {
    let n = num_validators.max(1);
    let agree = n <= 1 || engine.witnesses_all_agree();
    (0..n)
        .map(|i| {
            (
                Address::synthetic_validator(i),
                if agree { Vote::Agree } else { Vote::Disagree },
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use sim_engine::test_support::TestHost;
    use sim_engine::Engine;
    use sim_types::{Address, CalldataValue, MethodCall};

    use super::*;

    fn addr(byte: u8) -> Address {
        Address([byte; 20])
    }

    fn ctor(args: Vec<CalldataValue>) -> Vec<u8> {
        sim_codec::encode_method_call(&MethodCall {
            method: None,
            args,
            kwargs: BTreeMap::new(),
        })
    }

    fn call(method: &str) -> Vec<u8> {
        sim_codec::encode_method_call(&MethodCall {
            method: Some(method.to_string()),
            args: vec![],
            kwargs: BTreeMap::new(),
        })
    }

    #[test]
    fn deterministic_contract_finalizes_on_first_rotation_with_all_agree() {
        let engine = Engine::new(TestHost, 31337);
        let sender = addr(1);
        let address = engine
            .deploy_from_codebytes(b"counter", &ctor(vec![CalldataValue::Int(0)]), sender)
            .unwrap();

        let outcome = run(&engine, 5, 1, || {
            engine
                .call_from_calldata(address, &call("increment"), sender)
                .map(|(_, bytes)| bytes)
                .map_err(|e| e.to_string())
        })
        .unwrap();

        assert!(outcome.finalized);
        assert_eq!(outcome.rotation, 0);
        assert_eq!(outcome.votes.len(), 5);
        assert!(outcome.votes.values().all(|v| matches!(v, Vote::Agree)));
        assert_eq!(outcome.votes.get(&Address::synthetic_validator(0)), Some(&Vote::Agree));
    }

    #[test]
    fn always_disagreeing_contract_is_undetermined_and_restores_state() {
        let engine = Engine::new(TestHost, 31337);
        let sender = addr(1);
        let address = engine.deploy_from_codebytes(b"disagreer", &ctor(vec![]), sender).unwrap();
        let nonce_before = engine.state().nonce(sender);

        // The side-effect deploy is deterministic (nonce-keyed address), so
        // its address is identical on every rotation's attempt; if the final
        // rotation's state were not restored, this address would remain
        // registered after an UNDETERMINED outcome.
        let side_effect_address = std::cell::Cell::new(None);
        let outcome = run(&engine, 5, 2, || {
            let deployed = engine.deploy_from_codebytes(b"echo", &ctor(vec![]), sender).map_err(|e| e.to_string())?;
            side_effect_address.set(Some(deployed));
            engine
                .call_from_calldata(address, &call("roll"), sender)
                .map(|(_, bytes)| bytes)
                .map_err(|e| e.to_string())
        })
        .unwrap();

        assert!(!outcome.finalized);
        assert_eq!(outcome.rotation, 1);
        assert!(engine.contract_schema(side_effect_address.get().unwrap()).is_none());
        assert_eq!(engine.state().nonce(sender), nonce_before);
        assert!(outcome.votes.values().all(|v| matches!(v, Vote::Disagree)));
    }

    #[test]
    fn single_validator_always_agrees_even_with_witnesses() {
        let engine = Engine::new(TestHost, 31337);
        let sender = addr(1);
        let address = engine.deploy_from_codebytes(b"disagreer", &ctor(vec![]), sender).unwrap();

        let outcome = run(&engine, 1, 1, || {
            engine
                .call_from_calldata(address, &call("roll"), sender)
                .map(|(_, bytes)| bytes)
                .map_err(|e| e.to_string())
        })
        .unwrap();

        assert!(outcome.finalized);
        assert_eq!(outcome.votes.len(), 1);
        assert_eq!(outcome.votes.get(&Address::synthetic_validator(0)), Some(&Vote::Agree));
    }

    #[test]
    fn leader_exception_is_recorded_without_skipping_the_vote() {
        let engine = Engine::new(TestHost, 31337);
        let sender = addr(1);
        let address = engine.deploy_from_codebytes(b"reverter", &ctor(vec![]), sender).unwrap();

        let outcome = run(&engine, 1, 1, || {
            engine
                .call_from_calldata(
                    address,
                    &sim_codec::encode_method_call(&MethodCall {
                        method: Some("fail".to_string()),
                        args: vec![CalldataValue::Str("boom".to_string())],
                        kwargs: BTreeMap::new(),
                    }),
                    sender,
                )
                .map(|(_, bytes)| bytes)
                .map_err(|e| e.to_string())
        })
        .unwrap();

        assert!(outcome.finalized);
        assert_eq!(outcome.error.as_deref(), Some("contract rolled back: boom"));
        assert!(outcome.votes.values().all(|v| matches!(v, Vote::Agree)));
    }
}
