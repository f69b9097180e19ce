//! Path: crates/sim-state/src/lib.rs
//! The Transaction & State Store: accounts, deployed-contract records, and
//! the transaction map, plus deep-copy snapshot/restore for consensus
//! rotation and cross-contract rollback.

pub mod error;
pub mod store;

pub use error::StateError;
pub use store::StateStore;
