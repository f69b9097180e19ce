//! Path: crates/sim-engine/src/context.rs
//! The message context injected into the runtime before every top-level
//! call or cross-contract hop, and restored around every call boundary.

use sim_types::Address;

/// Why this message context was installed — a top-level submission, a
/// contract construction, or a cross-contract hop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntryKind {
    Construct,
    Call,
    CrossContractCall,
    PostMessage,
}

/// `{contract-address, sender-address, origin-address, value, chain-id,
/// entry-kind}` — the "global mutable state" of §9's design notes, mutated
/// and restored around every call the Engine drives.
#[derive(Clone, Copy, Debug)]
pub struct MessageContext {
    pub contract: Address,
    pub sender: Address,
    pub origin: Address,
    pub value: u128,
    pub chain_id: u64,
    pub entry_kind: EntryKind,
}

impl MessageContext {
    pub fn top_level(contract: Address, sender: Address, chain_id: u64, entry_kind: EntryKind) -> Self {
        Self {
            contract,
            sender,
            origin: sender,
            value: 0,
            chain_id,
            entry_kind,
        }
    }

    /// A cross-contract hop preserves `origin` but swaps `sender`/`contract`.
    pub fn cross_contract(&self, target: Address) -> Self {
        Self {
            contract: target,
            sender: self.contract,
            origin: self.origin,
            value: 0,
            chain_id: self.chain_id,
            entry_kind: EntryKind::CrossContractCall,
        }
    }
}
