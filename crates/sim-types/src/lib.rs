//! Path: crates/sim-types/src/lib.rs
//! Core data structures shared across the Sim's crates: addresses, accounts,
//! transactions, calldata values, and contract schemas. Kept dependency-light
//! so every other crate can depend on it without pulling in transport,
//! consensus, or host-execution concerns.

pub mod account;
pub mod address;
pub mod calldata;
pub mod error;
pub mod schema;
pub mod tx;

pub use account::{Account, DeployedContract};
pub use address::{Address, AddressError, Hash32, ADDRESS_ZERO};
pub use calldata::{CalldataValue, MethodCall, ResultStatus};
pub use error::ErrorCode;
pub use schema::{ContractSchema, MethodSchema, Param, ParamList};
pub use tx::{Transaction, TriggeredOp, TxKind, TxStatus, Vote};

/// The configurable chain id echoed by `eth_chainId`/`net_version` (default
/// 61999, per the production network's identity constants).
pub const DEFAULT_CHAIN_ID: u64 = 61_999;

/// The fixed consensus-contract address echoed in `eth_getTransactionReceipt`
/// logs.
pub const CONSENSUS_CONTRACT_ADDR_HEX: &str = "0xb7278A61aa25c888815aFC32Ad3cC52fF24fE575";
