//! BBS Node - hosts board instances and exposes them to local clients
//!
//! The node wires the state layer to the outside world:
//! - Node keeps one BoardInstance per hosted board and drives the sync loop
//! - Gateway turns board reads and writes into `[OK]` / `[ERROR]` envelopes
//! - RpcServer speaks a line-delimited JSON protocol over TCP
//! - Config and logging set up the process around them

pub mod config;
pub mod gateway;
pub mod logging;
pub mod node;
pub mod rpc_server;

pub use config::NodeConfig;
pub use gateway::Gateway;
pub use node::Node;
pub use rpc_server::RpcServer;

use std::time::Duration;

use bbs_protocol::ProtocolError;
use bbs_state::StateError;
use thiserror::Error;

/// Errors surfaced by the node layer.
#[derive(Error, Debug)]
pub enum NodeError {
    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("Invalid parameter '{name}': {reason}")]
    InvalidParam { name: &'static str, reason: String },

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Request abandoned before a response arrived")]
    Abandoned,
}
