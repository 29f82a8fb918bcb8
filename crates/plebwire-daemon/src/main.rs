//! plebwire daemon: hosts one subplebbit on the gossip network.
//!
//! Usage:
//!
//!   plebwire-daemon [--config PATH] [--data-dir PATH] [--listen MULTIADDR]
//!                   [--bootstrap MULTIADDR]... [--title TEXT] [--seed-file PATH]
//!
//! The daemon runs until interrupted with Ctrl+C.

use std::sync::Arc;

use libp2p::Multiaddr;
use plebwire_network::{GossipTransport, NetworkConfig};
use plebwire_node::{SubplebbitNode, SubplebbitSettings, TextMathChallenge};
use plebwire_storage::SledStore;

mod config;
mod seed_io;

const STORAGE_DIR: &str = "store";

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = match config::CliArgs::parse_from_env() {
        Ok(cli) => cli,
        Err(e) => {
            eprintln!("{e}");
            eprintln!("use --help for usage information");
            std::process::exit(2);
        }
    };
    if cli.help {
        config::print_help();
        return;
    }

    let daemon_config = match config::DaemonConfig::resolve(&cli) {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::error!("failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = run_daemon(daemon_config).await {
        tracing::error!("daemon error: {e}");
        std::process::exit(1);
    }
}

async fn run_daemon(cfg: config::DaemonConfig) -> Result<(), String> {
    let storage_path = cfg.data_dir.join(STORAGE_DIR);
    std::fs::create_dir_all(&storage_path).map_err(|e| format!("failed to create data directory: {e}"))?;
    tracing::info!(data_dir = %cfg.data_dir.display(), "data directory ready");

    // -----------------------------------------------------------------------
    // 1. Identity and storage
    // -----------------------------------------------------------------------

    let keypair = seed_io::load_or_create(&cfg.seed_path())?;
    let address = keypair.address();
    let store = SledStore::open(&storage_path).map_err(|e| format!("failed to open store: {e}"))?;

    // -----------------------------------------------------------------------
    // 2. Network
    // -----------------------------------------------------------------------

    let listen_addr = cfg
        .listen_addr
        .parse::<Multiaddr>()
        .map_err(|e| format!("invalid listen address '{}': {e}", cfg.listen_addr))?;
    let bootstrap_nodes: Vec<Multiaddr> = cfg
        .bootstrap_nodes
        .iter()
        .filter_map(|s| {
            s.parse::<Multiaddr>()
                .map_err(|e| tracing::warn!("invalid bootstrap addr '{s}': {e}"))
                .ok()
        })
        .collect();
    let net_config = NetworkConfig {
        listen_addr,
        bootstrap_nodes,
        ..NetworkConfig::default()
    };
    tracing::info!(
        listen = %cfg.listen_addr,
        bootstrap_count = net_config.bootstrap_nodes.len(),
        "network config"
    );
    let transport = GossipTransport::start(net_config, &keypair)
        .await
        .map_err(|e| format!("failed to start transport: {e}"))?;

    // -----------------------------------------------------------------------
    // 3. Subplebbit node
    // -----------------------------------------------------------------------

    let settings = SubplebbitSettings {
        title: cfg.title.clone(),
        description: cfg.description.clone(),
        ..SubplebbitSettings::default()
    };
    let mut node = SubplebbitNode::new(
        keypair,
        Arc::new(store),
        Arc::new(transport),
        Arc::new(TextMathChallenge::default()),
        settings,
        cfg.protocol.clone(),
    )
    .map_err(|e| format!("node creation failed: {e}"))?;
    let mut node_handle = node.start().await.map_err(|e| format!("node start failed: {e}"))?;

    println!();
    println!("  plebwire subplebbit running");
    println!("  Address:    {address}");
    println!("  P2P listen: {}", cfg.listen_addr);
    println!("  Data dir:   {}", cfg.data_dir.display());
    println!("  Press Ctrl+C to stop");
    println!();

    // -----------------------------------------------------------------------
    // 4. Wait for shutdown
    // -----------------------------------------------------------------------

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received Ctrl+C, shutting down");
        }
        result = &mut node_handle => {
            return match result {
                Ok(()) => Err("node event loop exited unexpectedly".into()),
                Err(e) => Err(format!("node event loop panicked: {e}")),
            };
        }
    }

    node.shutdown().map_err(|e| format!("shutdown failed: {e}"))?;
    if let Err(e) = node_handle.await {
        tracing::error!(%e, "node event loop panicked");
    }

    tracing::info!("daemon stopped");
    Ok(())
}
