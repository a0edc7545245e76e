//! Board hosting and the background sync driver.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bbs_protocol::crypto;
use bbs_protocol::{BoardBody, Content, ContentBody, PubKey, Response, SecretKey};
use bbs_state::views::default_views;
use bbs_state::{
    BoardInstance, BoardInstanceConfig, ObjectStore, RequestDedup, Root, Snapshot, StateError,
};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

/// Hosts the board instances of one process.
pub struct Node {
    store: Arc<dyn ObjectStore>,
    boards: RwLock<HashMap<PubKey, Arc<BoardInstance>>>,
    dedup: RequestDedup<Response>,
}

impl Node {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            store,
            boards: RwLock::new(HashMap::new()),
            dedup: RequestDedup::new(),
        }
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    pub fn dedup(&self) -> &RequestDedup<Response> {
        &self.dedup
    }

    // ── Boards ─────────────────────────────────────────────────────

    /// Start hosting a board already present in the store, from its
    /// latest fully-synced root.
    ///
    /// The board is built without holding the board map, so other boards
    /// stay readable while it loads. If two callers add the same board at
    /// once, the first to finish wins and the other gets `AlreadyExists`.
    pub async fn add_board(
        &self,
        config: BoardInstanceConfig,
    ) -> Result<Arc<BoardInstance>, StateError> {
        let pub_key = config.pub_key;
        if self.boards.read().await.contains_key(&pub_key) {
            return Err(already_hosted(&pub_key));
        }

        let root = self.store.last_full_root(&pub_key).await?;
        let board = Arc::new(
            BoardInstance::new(config, Arc::clone(&self.store), &root, default_views()).await?,
        );

        let mut boards = self.boards.write().await;
        if boards.contains_key(&pub_key) {
            return Err(already_hosted(&pub_key));
        }
        boards.insert(pub_key, Arc::clone(&board));
        drop(boards);

        tracing::info!(board = %pub_key, seq = root.seq, "Hosting board");
        Ok(board)
    }

    /// Create a board under a fresh keypair and host it as master.
    pub async fn new_board(&self, body: BoardBody) -> Result<(PubKey, SecretKey), StateError> {
        let (pub_key, sec_key) = crypto::generate_keypair();
        self.create_board(sec_key, body).await?;
        Ok((pub_key, sec_key))
    }

    /// Publish the genesis tree of a board owned by `sec_key` and host it
    /// as master.
    pub async fn create_board(
        &self,
        sec_key: SecretKey,
        body: BoardBody,
    ) -> Result<Arc<BoardInstance>, StateError> {
        let pub_key = crypto::public_key_of(&sec_key);
        let genesis = Snapshot::genesis(pub_key, Content::new(ContentBody::Board(body)))?;
        self.store.publish(&genesis).await;

        self.add_board(BoardInstanceConfig {
            master: true,
            pub_key,
            sec_key: Some(sec_key),
        })
        .await
    }

    pub async fn remove_board(&self, pub_key: &PubKey) -> Result<(), StateError> {
        match self.boards.write().await.remove(pub_key) {
            Some(_) => {
                tracing::info!(board = %pub_key, "Stopped hosting board");
                Ok(())
            }
            None => Err(StateError::NotFound(format!("board {}", pub_key))),
        }
    }

    pub async fn board(&self, pub_key: &PubKey) -> Result<Arc<BoardInstance>, StateError> {
        self.boards
            .read()
            .await
            .get(pub_key)
            .cloned()
            .ok_or_else(|| StateError::NotFound(format!("board {}", pub_key)))
    }

    /// Keys of every hosted board, sorted.
    pub async fn board_keys(&self) -> Vec<PubKey> {
        let mut keys: Vec<PubKey> = self.boards.read().await.keys().copied().collect();
        keys.sort();
        keys
    }

    async fn all_boards(&self) -> Vec<Arc<BoardInstance>> {
        self.boards.read().await.values().cloned().collect()
    }

    // ── Sync ───────────────────────────────────────────────────────

    /// Install a new root announced for one of the hosted boards.
    pub async fn apply_root(&self, root: Root) -> Result<(), StateError> {
        self.board(&root.pub_key).await?.update(Some(root)).await
    }

    /// One pass of the sync driver. Every board flagged as needing an
    /// update is updated; a failed board keeps its flag for the next
    /// pass. Returns the number of boards updated.
    pub async fn sync_once(&self) -> usize {
        let mut updated = 0;
        for board in self.all_boards().await {
            if !board.update_needed() {
                continue;
            }
            board.clear_update_needed();
            match board.update(None).await {
                Ok(()) => updated += 1,
                Err(e) => {
                    tracing::warn!(board = %board.pub_key(), error = %e, "Board sync failed");
                    board.set_update_needed();
                }
            }
        }
        updated
    }

    /// Run [`Node::sync_once`] every `interval` until `cancel` fires.
    pub async fn run_sync(&self, interval: Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tracing::info!(interval_secs = interval.as_secs(), "Sync driver started");

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let updated = self.sync_once().await;
                    if updated > 0 {
                        tracing::debug!(boards = updated, "Sync pass complete");
                    }
                }
            }
        }

        tracing::info!("Sync driver stopped");
    }
}

fn already_hosted(pub_key: &PubKey) -> StateError {
    StateError::AlreadyExists(format!("board {}", pub_key))
}
