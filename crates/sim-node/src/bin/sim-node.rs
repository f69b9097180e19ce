//! Path: crates/sim-node/src/bin/sim-node.rs
//! The Sim's process entry point: parses the CLI (§6.3), wires the Engine
//! and its LiveIO handlers, installs telemetry, and serves the JSON-RPC
//! surface until Ctrl-C, mirroring the teacher's `ioi-local.rs` shape
//! (tracing init first, status lines during startup, a `tokio::select!`
//! shutdown wait).

use clap::Parser;
use sim_node::{build_server_state, server_config, NodeConfig};

/// Runs a single-process local simulator of the contract network: a
/// JSON-RPC endpoint backed by an in-memory Execution Engine, a
/// leader/validator Consensus Simulator, and a Transaction & State Store.
#[derive(Parser, Debug)]
#[command(name = "sim-node", version, about)]
struct Cli {
    /// Bind address host.
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Bind address port.
    #[arg(long, default_value_t = 8545)]
    port: u16,

    /// Per-consensus validator count.
    #[arg(long = "validators", default_value_t = 5)]
    validators: u32,

    /// Leader rotation cap.
    #[arg(long = "max-rotations", default_value_t = 3)]
    max_rotations: u32,

    /// LiveIO language-model provider, as `"name:model"`.
    #[arg(long = "llm-provider", default_value = sim_liveio::DEFAULT_PROVIDER)]
    llm_provider: String,

    /// Disables the headless-browser path in the web handler.
    #[arg(long = "no-browser")]
    no_browser: bool,

    /// Enables stack-trace echo on internal errors (raises the default log
    /// level when `RUST_LOG` is unset; does not override an explicit one).
    #[arg(long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.verbose && std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "debug");
    }
    sim_telemetry::init_tracing()?;

    let config = NodeConfig {
        host: cli.host,
        port: cli.port,
        num_validators: cli.validators.max(1),
        max_rotations: cli.max_rotations.max(1),
        llm_provider: cli.llm_provider,
        no_browser: cli.no_browser,
        ..NodeConfig::default()
    };

    let state = build_server_state(&config)?;
    let server_config = server_config(&config);

    println!("sim-node listening on http://{}", server_config.listen_addr);
    println!(
        "validators={} max_rotations={} llm_provider={} browser={}",
        config.num_validators,
        config.max_rotations,
        config.llm_provider,
        !config.no_browser
    );

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let mut server_task = tokio::spawn(sim_rpc::run_server(state, server_config, shutdown_rx));

    tokio::select! {
        result = &mut server_task => {
            result??;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!(target: "sim_node", "received ctrl-c, shutting down");
            let _ = shutdown_tx.send(true);
            server_task.await??;
        }
    }

    Ok(())
}
