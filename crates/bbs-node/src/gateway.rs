//! Envelope-returning read/write surface over the hosted boards.
//!
//! Every method resolves to an [`Envelope`]: `[OK] <json>` on success,
//! `[ERROR] {"message": ...}` otherwise. Keys and hashes arrive as hex
//! strings; an empty perspective means "anonymous".

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use bbs_protocol::{
    BoardBody, Content, ContentHash, ContentHeader, Envelope, ProtocolError, PubKey, Response,
    CONTENT_VIEW, FOLLOW_VIEW,
};
use bbs_state::views::query;
use bbs_state::{Changes, StateError, ViewResult};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::node::Node;
use crate::NodeError;

#[derive(Debug, Serialize)]
struct NewBoard {
    public_key: PubKey,
}

#[derive(Debug, Serialize)]
struct SeqReached {
    seq: u64,
}

pub struct Gateway {
    node: Arc<Node>,
    request_timeout: Duration,
    shutdown: CancellationToken,
}

impl Gateway {
    pub fn new(node: Arc<Node>, request_timeout: Duration, shutdown: CancellationToken) -> Self {
        Self {
            node,
            request_timeout,
            shutdown,
        }
    }

    pub fn node(&self) -> &Arc<Node> {
        &self.node
    }

    // ── Reads ──────────────────────────────────────────────────────

    /// Summary of every hosted board.
    pub async fn get_boards(&self) -> Envelope {
        let mut boards = Vec::new();
        for key in self.node.board_keys().await {
            match self.query(&key, CONTENT_VIEW, query::BOARD, Vec::new()).await {
                Ok(view) => boards.push(view),
                // Removed between listing and reading.
                Err(NodeError::State(StateError::NotFound(_))) => {}
                Err(e) => return fail(e),
            }
        }
        respond(Ok(boards))
    }

    pub async fn get_board(&self, board: &str) -> Envelope {
        respond(self.read(board, CONTENT_VIEW, query::BOARD, Vec::new()).await)
    }

    pub async fn get_board_page(&self, board: &str, perspective: Option<&str>) -> Envelope {
        let args = vec![perspective.unwrap_or_default().to_string()];
        respond(self.read(board, CONTENT_VIEW, query::BOARD_PAGE, args).await)
    }

    pub async fn get_thread_page(
        &self,
        board: &str,
        thread: &str,
        perspective: Option<&str>,
    ) -> Envelope {
        let args = vec![thread.to_string(), perspective.unwrap_or_default().to_string()];
        respond(self.read(board, CONTENT_VIEW, query::THREAD_PAGE, args).await)
    }

    pub async fn get_votes(&self, board: &str, target: &str, perspective: Option<&str>) -> Envelope {
        let args = vec![target.to_string(), perspective.unwrap_or_default().to_string()];
        respond(self.read(board, CONTENT_VIEW, query::VOTES, args).await)
    }

    pub async fn get_follow_page(&self, board: &str, user: &str) -> Envelope {
        let args = vec![user.to_string()];
        respond(self.read(board, FOLLOW_VIEW, query::FOLLOW_PAGE, args).await)
    }

    /// Change notifications queued for `board` since the last poll.
    pub async fn poll_changes(&self, board: &str) -> Envelope {
        respond(self.changes(board).await)
    }

    /// Wait for `board` to reach sequence `seq`, bounded by the request
    /// timeout and node shutdown.
    pub async fn wait_seq(&self, board: &str, seq: u64) -> Envelope {
        respond(self.wait_for_seq(board, seq).await)
    }

    // ── Writes ─────────────────────────────────────────────────────

    /// Create a board owned by this node.
    pub async fn new_board(&self, name: &str, body: &str) -> Envelope {
        let body = BoardBody {
            name: name.to_string(),
            body: body.to_string(),
            created: bbs_protocol::unix_millis(),
            submission_addresses: Vec::new(),
        };
        let result = self
            .node
            .new_board(body)
            .await
            .map(|(public_key, _)| NewBoard { public_key })
            .map_err(NodeError::from);
        respond(result)
    }

    /// Append a thread, post or vote to its board. The edit is published
    /// on the next sync pass.
    pub async fn submit_content(&self, content: Content) -> Envelope {
        respond(self.submit(content).await)
    }

    // ── Request/response correlation ───────────────────────────────

    /// Wait for the response to request `hash`. At most one waiter per
    /// hash; the registration is always released.
    pub async fn await_response(&self, hash: ContentHash) -> Envelope {
        match self.wait_response(hash).await {
            Ok(envelope) => envelope,
            Err(e) => fail(e),
        }
    }

    /// Deliver a response to whoever awaits it.
    pub fn satisfy(&self, response: Response) {
        self.node.dedup().satisfy(response);
    }

    // ── Internals ──────────────────────────────────────────────────

    async fn read(
        &self,
        board: &str,
        view: &str,
        query: &str,
        args: Vec<String>,
    ) -> Result<ViewResult, NodeError> {
        let key: PubKey = parse("board", board)?;
        self.query(&key, view, query, args).await
    }

    async fn query(
        &self,
        board: &PubKey,
        view: &str,
        query: &str,
        args: Vec<String>,
    ) -> Result<ViewResult, NodeError> {
        let board = self.node.board(board).await?;
        Ok(board.get(view, query, &args).await?)
    }

    async fn changes(&self, board: &str) -> Result<Vec<Changes>, NodeError> {
        let key: PubKey = parse("board", board)?;
        Ok(self.node.board(&key).await?.changes_chan().drain())
    }

    async fn wait_for_seq(&self, board: &str, seq: u64) -> Result<SeqReached, NodeError> {
        let key: PubKey = parse("board", board)?;
        let board = self.node.board(&key).await?;
        let cancel = self.shutdown.child_token();
        tokio::time::timeout(self.request_timeout, board.wait_seq(&cancel, seq))
            .await
            .map_err(|_| NodeError::Timeout(self.request_timeout))??;
        Ok(SeqReached {
            seq: board.get_seq(),
        })
    }

    async fn submit(&self, content: Content) -> Result<ContentHeader, NodeError> {
        let key = *content.body().of_board().ok_or_else(|| {
            StateError::NotAllowed("boards are created, not submitted".to_string())
        })?;
        let board = self.node.board(&key).await?;
        let header = *content.header();
        board
            .pack_edit(move |snapshot| snapshot.append(content))
            .await?;

        tracing::info!(board = %key, hash = %header.hash, kind = %header.kind, "Content submitted");
        Ok(header)
    }

    async fn wait_response(&self, hash: ContentHash) -> Result<Envelope, NodeError> {
        let dedup = self.node.dedup();
        let mut rx = dedup.add(hash)?;

        let outcome = tokio::select! {
            _ = self.shutdown.cancelled() => Err(NodeError::State(StateError::Cancelled)),
            received = tokio::time::timeout(self.request_timeout, rx.recv()) => match received {
                Ok(Some(response)) => Ok(response.envelope),
                Ok(None) => Err(NodeError::Abandoned),
                Err(_) => Err(NodeError::Timeout(self.request_timeout)),
            },
        };
        dedup.remove(&hash);
        outcome
    }
}

fn parse<T>(name: &'static str, raw: &str) -> Result<T, NodeError>
where
    T: FromStr<Err = ProtocolError>,
{
    raw.parse().map_err(|e: ProtocolError| NodeError::InvalidParam {
        name,
        reason: e.to_string(),
    })
}

fn respond<T: Serialize>(result: Result<T, NodeError>) -> Envelope {
    match result.and_then(|value| Envelope::ok(&value).map_err(NodeError::from)) {
        Ok(envelope) => envelope,
        Err(e) => fail(e),
    }
}

fn fail(error: NodeError) -> Envelope {
    tracing::debug!(error = %error, "Request failed");
    Envelope::error(error)
}
