//! Path: crates/sim-rpc/src/world.rs
//! The single process-wide mutual-exclusion discipline of §5: every handler
//! that touches the Engine acquires one `tokio::sync::Mutex<World<H>>` and
//! runs its (synchronous) Engine work on the blocking-task pool, so a
//! long-running contract call or a live LiveIO round trip never blocks an
//! async worker thread. Cancellation safety is a `Drop`-based snapshot guard
//! living on the blocking thread's stack, which fires during ordinary
//! unwinding if a handler panics mid-call.

use std::sync::Arc;

use sim_engine::{ContractHost, Engine};
use tokio::sync::Mutex as AsyncMutex;

/// The bundle of mutable state the Sim's RPC surface serializes access to.
/// `Engine` already owns its embedded `StateStore`; `World` exists as the
/// named unit of mutual exclusion the spec calls for, not as an additional
/// layer of state.
pub struct World<H: ContractHost> {
    pub engine: Engine<H>,
}

pub type WorldHandle<H> = Arc<AsyncMutex<World<H>>>;

pub fn new_world<H: ContractHost>(engine: Engine<H>) -> WorldHandle<H> {
    Arc::new(AsyncMutex::new(World { engine }))
}

/// Restores `snapshot_id` on drop unless `disarm()` was called — the
/// cancellation-safety guard of §5. Held entirely on the blocking-task
/// thread, across the one synchronous Engine call it wraps, so its `Drop`
/// fires on ordinary stack unwinding (a panicking contract host call) with
/// no async re-entry required.
pub struct SnapshotGuard<'a, H: ContractHost>
where
    H::Instance: Clone,
{
    engine: &'a Engine<H>,
    snapshot_id: u64,
    disarmed: bool,
}

impl<'a, H: ContractHost> SnapshotGuard<'a, H>
where
    H::Instance: Clone,
{
    pub fn new(engine: &'a Engine<H>) -> Self {
        let snapshot_id = engine.snapshot();
        Self { engine, snapshot_id, disarmed: false }
    }

    pub fn snapshot_id(&self) -> u64 {
        self.snapshot_id
    }

    /// Commits the snapshot: the guard will no longer restore it on drop.
    pub fn disarm(&mut self) {
        self.disarmed = true;
    }
}

impl<'a, H: ContractHost> Drop for SnapshotGuard<'a, H>
where
    H::Instance: Clone,
{
    fn drop(&mut self) {
        if !self.disarmed {
            tracing::warn!(
                target: "sim_rpc::world",
                snapshot_id = self.snapshot_id,
                "restoring snapshot after abnormal exit"
            );
            self.engine.restore(self.snapshot_id);
        }
    }
}

/// Runs `f` against the locked `World`'s engine on the blocking-task pool.
/// Re-raises the original panic payload if `f` panics, so `CatchPanicLayer`
/// sees the same panic it would have seen running synchronously in-request.
pub async fn with_world<H, F, R>(world: &WorldHandle<H>, f: F) -> R
where
    H: ContractHost + Send + 'static,
    H::Instance: Clone + Send,
    H::Class: Send,
    F: FnOnce(&Engine<H>) -> R + Send + 'static,
    R: Send + 'static,
{
    let guard = world.clone().lock_owned().await;
    let result = tokio::task::spawn_blocking(move || f(&guard.engine)).await;
    match result {
        Ok(value) => value,
        Err(join_err) => std::panic::resume_unwind(join_err.into_panic()),
    }
}
