//! In-process object store.
//!
//! Keeps every published snapshot of every board in memory, indexed by
//! sequence number. Useful for single-node deployments and as the store
//! behind tests. Replication is out of scope: a snapshot counts as fully
//! synced as soon as it is published.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use bbs_protocol::crypto;
use bbs_protocol::{Content, ContentType, PubKey, SecretKey};
use parking_lot::RwLock;

use crate::store::{AccessMode, ObjectStore, Root, Snapshot, StoreError};
use crate::StateError;

/// Known versions of one board.
#[derive(Debug, Default)]
struct BoardHistory {
    snapshots: BTreeMap<u64, Snapshot>,
    last_full: Option<Root>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    boards: RwLock<HashMap<PubKey, BoardHistory>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the genesis tree of a new board and return its root.
    pub fn create_board(&self, pub_key: PubKey, board: Content) -> Result<Root, StateError> {
        let mut boards = self.boards.write();
        if boards.contains_key(&pub_key) {
            return Err(StateError::AlreadyExists(format!("board {}", pub_key)));
        }
        let snapshot = Snapshot::genesis(pub_key, board)?;
        let root = *snapshot.root();
        let history = boards.entry(pub_key).or_default();
        history.snapshots.insert(root.seq, snapshot);
        history.last_full = Some(root);

        tracing::info!(board = %pub_key, "board created");
        Ok(root)
    }

    /// Store a snapshot received from elsewhere without marking it fully
    /// synced. Pair with [`MemoryStore::mark_full`].
    pub fn insert(&self, snapshot: Snapshot) -> Root {
        let root = *snapshot.root();
        self.boards
            .write()
            .entry(root.pub_key)
            .or_default()
            .snapshots
            .insert(root.seq, snapshot);
        root
    }

    /// Flag a stored root as fully available. Never moves backwards.
    pub fn mark_full(&self, root: &Root) -> Result<(), StoreError> {
        let mut boards = self.boards.write();
        let history = boards
            .get_mut(&root.pub_key)
            .filter(|h| h.snapshots.get(&root.seq).is_some_and(|s| s.root() == root))
            .ok_or(StoreError::RootNotFound {
                pub_key: root.pub_key,
                seq: root.seq,
            })?;
        if history.last_full.map_or(true, |full| full.seq < root.seq) {
            history.last_full = Some(*root);
        }
        Ok(())
    }

    /// Every stored root of `board`, oldest first.
    pub fn roots(&self, board: &PubKey) -> Vec<Root> {
        self.boards
            .read()
            .get(board)
            .map(|h| h.snapshots.values().map(|s| *s.root()).collect())
            .unwrap_or_default()
    }

    pub fn contains_board(&self, board: &PubKey) -> bool {
        self.boards.read().contains_key(board)
    }

    pub fn board_keys(&self) -> Vec<PubKey> {
        self.boards.read().keys().copied().collect()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn unpack(
        &self,
        root: &Root,
        access: AccessMode,
        schema: &[ContentType],
        key: Option<&SecretKey>,
    ) -> Result<Snapshot, StoreError> {
        if access == AccessMode::ReadWrite {
            let owns_board = key.is_some_and(|k| crypto::public_key_of(k) == root.pub_key);
            if !owns_board {
                return Err(StoreError::AccessDenied(root.pub_key));
            }
        }

        let snapshot = self
            .boards
            .read()
            .get(&root.pub_key)
            .and_then(|h| h.snapshots.get(&root.seq))
            .filter(|s| s.root().hash == root.hash)
            .cloned()
            .ok_or(StoreError::RootNotFound {
                pub_key: root.pub_key,
                seq: root.seq,
            })?;

        snapshot.check_schema(schema)?;
        Ok(snapshot.with_access(access))
    }

    async fn publish(&self, snapshot: &Snapshot) {
        let root = *snapshot.root();
        let mut boards = self.boards.write();
        let history = boards.entry(root.pub_key).or_default();
        history.snapshots.insert(root.seq, snapshot.clone());
        if history.last_full.map_or(true, |full| full.seq <= root.seq) {
            history.last_full = Some(root);
        }
        tracing::debug!(board = %root.pub_key, seq = root.seq, "snapshot published");
    }

    async fn last_full_root(&self, board: &PubKey) -> Result<Root, StoreError> {
        self.boards
            .read()
            .get(board)
            .and_then(|h| h.last_full)
            .ok_or(StoreError::NoFullRoot(*board))
    }
}
