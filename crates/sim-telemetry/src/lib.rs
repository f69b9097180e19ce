//! Path: crates/sim-telemetry/src/lib.rs
//! Observability infrastructure for the Sim: structured logging init and a
//! Prometheus metrics surface exposed by `sim-rpc`'s `/metrics` route.

pub mod init;
pub mod metrics;

pub use init::init_tracing;
pub use metrics::{install, metrics_text, Metrics};
