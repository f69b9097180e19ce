//! Path: crates/sim-node/src/lib.rs
//! Wiring for the Sim's node process: assembles the Engine, its LiveIO
//! handlers, and the RPC `ServerState` that `bin/sim-node.rs` serves.
//!
//! No production `ContractHost` ships in this crate set (§4.8 is a non-goal);
//! the node binds its Engine to `sim_engine::test_support::TestHost`, the
//! same in-crate test double sim-engine/sim-consensus/sim-rpc already use to
//! exercise deploy/call/snapshot/cross-contract/consensus behavior end to
//! end. Swapping in a real contract-language runtime means implementing
//! `ContractHost` and using it in place of `Host` below.

use std::sync::Arc;

use sim_engine::test_support::TestHost;
use sim_engine::Engine;
use sim_liveio::{Bridge, LiveLlmConfig, LiveLlmHandler, LiveWebHandler, MockTable, DEFAULT_PROVIDER};
use sim_rpc::{new_world, DispatcherConfig, ServerState, WorldHandle};

/// The concrete host this node runs. See the module doc for why.
pub type Host = TestHost;

/// The node's runtime configuration, assembled from `bin/sim-node.rs`'s CLI.
#[derive(Clone, Debug)]
pub struct NodeConfig {
    pub host: String,
    pub port: u16,
    pub chain_id: u64,
    pub num_validators: u32,
    pub max_rotations: u32,
    pub llm_provider: String,
    pub no_browser: bool,
    pub rps: u32,
    pub burst: u32,
    pub body_limit_kb: usize,
    pub trusted_proxies: Vec<String>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8545,
            chain_id: sim_types::DEFAULT_CHAIN_ID,
            num_validators: 5,
            max_rotations: 3,
            llm_provider: DEFAULT_PROVIDER.to_string(),
            no_browser: false,
            rps: 50,
            burst: 100,
            body_limit_kb: 512,
            trusted_proxies: Vec::new(),
        }
    }
}

impl NodeConfig {
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Builds the Engine, installs its LiveIO handlers, and returns the world
/// handle plus the shared mock table the Dispatcher installs `simConfig`
/// overrides onto per submission (§4.5/§4.6).
///
/// The background bridge thread (`Bridge::spawn`) is started unconditionally:
/// it is cheap (one idle OS thread) and both the web and LLM handlers share
/// it regardless of whether `--no-browser` narrows the web handler's own
/// live path to HTTP only.
pub fn build_world(config: &NodeConfig) -> (WorldHandle<Host>, Arc<MockTable>) {
    let engine = Engine::new(TestHost, config.chain_id);
    let mocks = Arc::new(MockTable::new());
    let bridge = Bridge::spawn();

    let web_handler = LiveWebHandler::new(mocks.clone(), bridge.clone(), !config.no_browser);
    engine.set_web_handler(Arc::new(web_handler));

    let llm_handler = LiveLlmHandler::new(
        mocks.clone(),
        bridge,
        LiveLlmConfig { default_provider: config.llm_provider.clone() },
    );
    engine.set_llm_handler(Arc::new(llm_handler));

    (new_world(engine), mocks)
}

/// Builds the full `ServerState`, installing the process-wide metrics
/// statics as a side effect. Call this exactly once per process.
pub fn build_server_state(config: &NodeConfig) -> anyhow::Result<ServerState<Host>> {
    let (world, mocks) = build_world(config);
    let metrics = sim_telemetry::install()?;
    Ok(ServerState {
        world,
        mocks,
        config: DispatcherConfig { num_validators: config.num_validators, max_rotations: config.max_rotations },
        metrics,
    })
}

pub fn server_config(config: &NodeConfig) -> sim_rpc::ServerConfig {
    sim_rpc::ServerConfig {
        listen_addr: config.listen_addr(),
        rps: config.rps,
        burst: config.burst,
        body_limit_kb: config.body_limit_kb,
        trusted_proxies: config.trusted_proxies.clone(),
    }
}
