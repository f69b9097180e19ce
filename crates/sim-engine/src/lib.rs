//! Path: crates/sim-engine/src/lib.rs
//! The Engine: the heart of the core. Drives an external `ContractHost`
//! implementation through deploy/call lifecycles, routes per-contract
//! storage, injects message context, dispatches the single non-deterministic
//! operation callback for cross-contract calls and LiveIO, and owns
//! snapshot/restore of the whole storage graph.

pub mod context;
pub mod engine;
pub mod error;
pub mod host;
pub mod storage;
pub mod witness;

#[cfg(any(test, feature = "test-util"))]
pub mod test_support;

pub use context::{EntryKind, MessageContext};
pub use engine::Engine;
pub use error::{EngineError, HostError};
pub use host::{
    ContractHost, HostServices, LlmHandler, LlmRequest, LlmResponse, NondetRequest,
    NondetResponse, WebHandler, WebRequest, WebResponse,
};
pub use storage::StoragePartition;
pub use witness::Witness;
