//! Path: crates/sim-rpc/src/lib.rs
//! The JSON-RPC gateway: request/response wire shapes, the method table
//! (`dispatcher`), per-submission `simConfig` mock installation, the Axum
//! transport shell (`server`), and the single-mutex world handle every
//! handler runs against (`world`).

pub mod dispatcher;
pub mod error;
pub mod params;
pub mod server;
pub mod sim_config;
pub mod wire;
pub mod world;

pub use dispatcher::{dispatch, DispatcherConfig};
pub use error::{DispatchError, JsonRpcError};
pub use server::{router, run_server, ServerConfig, ServerState};
pub use world::{new_world, with_world, SnapshotGuard, World, WorldHandle};
