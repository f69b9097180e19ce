//! Path: crates/sim-types/src/account.rs

use serde::{Deserialize, Serialize};

use crate::address::Address;

/// An externally-owned or contract account. Created lazily on first
/// reference; never destroyed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub address: Address,
    pub balance: u128,
    pub nonce: u64,
}

impl Account {
    pub fn new(address: Address) -> Self {
        Self {
            address,
            balance: 0,
            nonce: 0,
        }
    }
}

/// A deployed contract record: address, source locator, and schema.
/// The live instance handle is opaque to the core and lives behind the
/// `ContractHost` boundary (see `sim-engine`).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployedContract {
    pub address: Address,
    pub code_locator: String,
}
