//! Line-delimited JSON RPC server over TCP.
//!
//! Provides the following methods to local clients:
//! - `bbs.get_boards()` - Summaries of every hosted board
//! - `bbs.get_board(board)` - One board summary
//! - `bbs.get_board_page(board, perspective?)` - Board with its threads
//! - `bbs.get_thread_page(board, thread, perspective?)` - Thread with its posts
//! - `bbs.get_votes(board, target, perspective?)` - Vote tally of a thread or post
//! - `bbs.get_follow_page(board, user)` - Who a user follows and avoids
//! - `bbs.poll_changes(board)` - Drain queued change notifications
//! - `bbs.wait_seq(board, seq)` - Block until a board reaches a sequence
//! - `bbs.new_board(name, body?)` - Create a board owned by this node
//! - `bbs.submit_content(content)` - Append a thread, post or vote
//!
//! Each line received is an [`RpcRequest`]; each line sent is an
//! [`RpcReply`] whose `result` is an encoded envelope.

use std::sync::Arc;

use bbs_protocol::{Content, Envelope, RpcReply, RpcRequest};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

use crate::gateway::Gateway;

pub struct RpcServer {
    bind_addr: String,
    gateway: Arc<Gateway>,
    max_connections: usize,
}

impl RpcServer {
    pub fn new(bind_addr: String, gateway: Arc<Gateway>, max_connections: usize) -> Self {
        Self {
            bind_addr,
            gateway,
            max_connections,
        }
    }

    /// Accept connections until `shutdown` fires.
    pub async fn run(self, shutdown: CancellationToken) -> Result<(), anyhow::Error> {
        let listener = TcpListener::bind(&self.bind_addr).await?;
        tracing::info!(addr = %self.bind_addr, "RPC server listening");
        self.serve(listener, shutdown).await
    }

    /// Serve an already-bound listener.
    pub async fn serve(
        self,
        listener: TcpListener,
        shutdown: CancellationToken,
    ) -> Result<(), anyhow::Error> {
        let semaphore = Arc::new(tokio::sync::Semaphore::new(self.max_connections));

        loop {
            let permit = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                permit = semaphore.clone().acquire_owned() => permit?,
            };
            let (stream, peer_addr) = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                accepted = listener.accept() => accepted?,
            };
            tracing::debug!(peer = %peer_addr, "RPC client connected");

            let gateway = Arc::clone(&self.gateway);

            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, gateway).await {
                    tracing::warn!(
                        peer = %peer_addr,
                        error = %e,
                        "RPC connection error"
                    );
                }
                drop(permit);
            });
        }

        tracing::info!("RPC server stopped");
        Ok(())
    }
}

/// Reads newline-delimited requests and sends back one reply per line.
async fn handle_connection(stream: TcpStream, gateway: Arc<Gateway>) -> Result<(), anyhow::Error> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let reply = process_request(&line, &gateway).await;
        let reply_json = serde_json::to_string(&reply)?;
        writer.write_all(reply_json.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
    }

    Ok(())
}

/// Process a single request line and build its reply.
pub async fn process_request(request_str: &str, gateway: &Gateway) -> RpcReply {
    let request: RpcRequest = match serde_json::from_str(request_str) {
        Ok(r) => r,
        Err(e) => {
            return RpcReply::new(None, &Envelope::error(format!("Invalid JSON: {}", e)));
        }
    };

    let params = &request.params;
    let envelope = match request.method.as_str() {
        "bbs.get_boards" => gateway.get_boards().await,
        "bbs.get_board" => match param_str(params, "board") {
            Ok(board) => gateway.get_board(board).await,
            Err(e) => e,
        },
        "bbs.get_board_page" => match param_str(params, "board") {
            Ok(board) => {
                gateway
                    .get_board_page(board, opt_param_str(params, "perspective"))
                    .await
            }
            Err(e) => e,
        },
        "bbs.get_thread_page" => match (param_str(params, "board"), param_str(params, "thread")) {
            (Ok(board), Ok(thread)) => {
                gateway
                    .get_thread_page(board, thread, opt_param_str(params, "perspective"))
                    .await
            }
            (Err(e), _) | (_, Err(e)) => e,
        },
        "bbs.get_votes" => match (param_str(params, "board"), param_str(params, "target")) {
            (Ok(board), Ok(target)) => {
                gateway
                    .get_votes(board, target, opt_param_str(params, "perspective"))
                    .await
            }
            (Err(e), _) | (_, Err(e)) => e,
        },
        "bbs.get_follow_page" => match (param_str(params, "board"), param_str(params, "user")) {
            (Ok(board), Ok(user)) => gateway.get_follow_page(board, user).await,
            (Err(e), _) | (_, Err(e)) => e,
        },
        "bbs.poll_changes" => match param_str(params, "board") {
            Ok(board) => gateway.poll_changes(board).await,
            Err(e) => e,
        },
        "bbs.wait_seq" => {
            let seq = params.get("seq").and_then(|v| v.as_u64());
            match (param_str(params, "board"), seq) {
                (Ok(board), Some(seq)) => gateway.wait_seq(board, seq).await,
                (Err(e), _) => e,
                (_, None) => Envelope::error("Missing 'seq' parameter"),
            }
        }
        "bbs.new_board" => match param_str(params, "name") {
            Ok(name) => {
                let body = opt_param_str(params, "body").unwrap_or_default();
                gateway.new_board(name, body).await
            }
            Err(e) => e,
        },
        "bbs.submit_content" => match params.get("content").cloned() {
            Some(raw) => match serde_json::from_value::<Content>(raw) {
                Ok(content) => gateway.submit_content(content).await,
                Err(e) => Envelope::error(format!("Invalid content: {}", e)),
            },
            None => Envelope::error("Missing 'content' parameter"),
        },
        _ => Envelope::error(format!("Unknown method: {}", request.method)),
    };

    RpcReply::new(request.id, &envelope)
}

fn param_str<'a>(params: &'a serde_json::Value, name: &str) -> Result<&'a str, Envelope> {
    params
        .get(name)
        .and_then(|v| v.as_str())
        .ok_or_else(|| Envelope::error(format!("Missing '{}' parameter", name)))
}

fn opt_param_str<'a>(params: &'a serde_json::Value, name: &str) -> Option<&'a str> {
    params.get(name).and_then(|v| v.as_str())
}
