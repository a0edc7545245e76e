//! CLI binary entry point for a BBS board node.
//!
//! Usage:
//!   bbs-node [OPTIONS]
//!
//! Options:
//!   -c, --config <FILE>    Path to configuration TOML file
//!   -r, --rpc <ADDR>       RPC bind address (overrides config)
//!   -v, --verbose          Increase logging verbosity

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use bbs_node::config::BoardConfig;
use bbs_node::{logging, Gateway, Node, NodeConfig, RpcServer};
use bbs_protocol::BoardBody;
use bbs_state::{BoardInstanceConfig, MemoryStore, ObjectStore, StateError, StoreError};
use tokio_util::sync::CancellationToken;

/// BBS node - hosts boards and serves them to local clients.
#[derive(Parser, Debug)]
#[command(name = "bbs-node")]
#[command(about = "Board node with materialized views over synced snapshots")]
#[command(version)]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, value_name = "FILE", default_value = "config/bbs.toml")]
    config: PathBuf,

    /// RPC server bind address (e.g., 127.0.0.1:7410).
    #[arg(short, long, value_name = "ADDR")]
    rpc: Option<String>,

    /// Increase logging verbosity (can be repeated: -v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = NodeConfig::load(Some(cli.config.as_path()))?;
    if let Some(rpc) = cli.rpc {
        config.rpc.bind_addr = rpc;
    }

    logging::init(logging::level_for_verbosity(&config.logging.level, cli.verbose));

    tracing::info!(
        rpc = %config.rpc.bind_addr,
        boards = config.boards.len(),
        "Starting BBS node"
    );

    let store: Arc<dyn ObjectStore> = Arc::new(MemoryStore::new());
    let node = Arc::new(Node::new(store));
    for board in &config.boards {
        if let Err(e) = host_board(&node, board).await {
            tracing::warn!(board = %board.public_key, error = %e, "Board not hosted");
        }
    }

    let shutdown = CancellationToken::new();
    let gateway = Arc::new(Gateway::new(
        Arc::clone(&node),
        config.sync.request_timeout(),
        shutdown.clone(),
    ));

    let rpc_server = RpcServer::new(
        config.rpc.bind_addr.clone(),
        gateway,
        config.rpc.max_connections,
    );
    let rpc_shutdown = shutdown.clone();
    let rpc_task = tokio::spawn(async move {
        if let Err(e) = rpc_server.run(rpc_shutdown).await {
            tracing::error!(error = %e, "RPC server error");
        }
    });

    let sync_node = Arc::clone(&node);
    let sync_shutdown = shutdown.clone();
    let interval = config.sync.interval();
    let sync_task = tokio::spawn(async move { sync_node.run_sync(interval, sync_shutdown).await });

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");
    shutdown.cancel();
    let _ = tokio::join!(rpc_task, sync_task);

    Ok(())
}

/// Host one configured board, creating it first when this node is its
/// master and the store has never seen it.
async fn host_board(node: &Node, board: &BoardConfig) -> Result<(), StateError> {
    let known = match node.store().last_full_root(&board.public_key).await {
        Ok(_) => true,
        Err(StoreError::NoFullRoot(_)) => false,
        Err(e) => return Err(e.into()),
    };

    match (known, board.master, board.secret_key) {
        (false, true, Some(sec_key)) => {
            let body = BoardBody {
                name: board.name.clone(),
                body: board.body.clone(),
                created: bbs_protocol::unix_millis(),
                submission_addresses: Vec::new(),
            };
            node.create_board(sec_key, body).await?;
        }
        _ => {
            node.add_board(BoardInstanceConfig {
                master: board.master,
                pub_key: board.public_key,
                sec_key: board.secret_key,
            })
            .await?;
        }
    }
    Ok(())
}
