//! Boundary with the external content-addressed object store.
//!
//! The store hands out immutable, versioned snapshots of a board tree
//! rooted at the board's public key, accepts new roots for publication
//! and reports the latest fully-synced root. Everything behind the
//! [`ObjectStore`] trait (replication, persistence) is opaque here.

use std::fmt;

use async_trait::async_trait;
use bbs_protocol::crypto;
use bbs_protocol::{Content, ContentHash, ContentType, PubKey, SecretKey};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::StateError;

/// Failures reported by the object store. Surfaced unchanged.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Root not found: board {pub_key} seq {seq}")]
    RootNotFound { pub_key: PubKey, seq: u64 },

    #[error("No fully-synced root known for board {0}")]
    NoFullRoot(PubKey),

    #[error("Read-write access to board {0} denied")]
    AccessDenied(PubKey),

    #[error("Unpack failed: {0}")]
    Unpack(String),

    #[error("Store error: {0}")]
    Other(String),
}

/// Identifies one version of a board tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Root {
    pub pub_key: PubKey,
    pub seq: u64,
    pub hash: ContentHash,
}

impl fmt::Display for Root {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.pub_key, self.seq)
    }
}

/// Access flag requested when unpacking a root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccessMode {
    /// Snapshot accepts local edits (board master only).
    ReadWrite,
    ViewOnly,
}

/// A thread together with its posts in append order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadPage {
    pub thread: Content,
    pub posts: Vec<Content>,
}

/// Submission history of a single user on this board.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserProfile {
    pub pub_key: PubKey,
    pub submissions: Vec<Content>,
}

/// The full board tree at one sequence number.
#[derive(Debug, Clone)]
pub struct Snapshot {
    root: Root,
    access: AccessMode,
    board: Content,
    threads: Vec<ThreadPage>,
    users: Vec<UserProfile>,
    dirty: bool,
}

impl Snapshot {
    /// Sequence-zero tree of a freshly created board.
    pub fn genesis(pub_key: PubKey, board: Content) -> Result<Self, StateError> {
        if board.kind() != ContentType::Board {
            return Err(StateError::MalformedSnapshot(format!(
                "genesis content is a {}, expected a board",
                board.kind()
            )));
        }
        let hash = crypto::root_hash(&pub_key, 0, [board.hash()]);
        Ok(Self {
            root: Root {
                pub_key,
                seq: 0,
                hash,
            },
            access: AccessMode::ReadWrite,
            board,
            threads: Vec::new(),
            users: Vec::new(),
            dirty: false,
        })
    }

    /// Re-issue this tree under a different access mode (used on unpack).
    pub fn with_access(mut self, access: AccessMode) -> Self {
        self.access = access;
        self
    }

    pub fn root(&self) -> &Root {
        &self.root
    }

    pub fn seq(&self) -> u64 {
        self.root.seq
    }

    pub fn pub_key(&self) -> &PubKey {
        &self.root.pub_key
    }

    pub fn access(&self) -> AccessMode {
        self.access
    }

    pub fn board(&self) -> &Content {
        &self.board
    }

    pub fn threads(&self) -> &[ThreadPage] {
        &self.threads
    }

    pub fn users(&self) -> &[UserProfile] {
        &self.users
    }

    /// Whether local edits are waiting for [`Snapshot::save`].
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Every content item in scan order: the board, each thread followed
    /// by its posts, then every user's submissions.
    pub fn contents(&self) -> impl Iterator<Item = &Content> + '_ {
        std::iter::once(&self.board)
            .chain(
                self.threads
                    .iter()
                    .flat_map(|page| std::iter::once(&page.thread).chain(page.posts.iter())),
            )
            .chain(self.users.iter().flat_map(|user| user.submissions.iter()))
    }

    pub fn contains(&self, hash: &ContentHash) -> bool {
        self.contents().any(|c| c.hash() == hash)
    }

    /// Check that every item is of a registered type and sits where its
    /// type belongs in the tree.
    pub fn check_schema(&self, schema: &[ContentType]) -> Result<(), StoreError> {
        for content in self.contents() {
            if !schema.contains(&content.kind()) {
                return Err(StoreError::Unpack(format!(
                    "content {} has unregistered type {}",
                    content.hash(),
                    content.kind()
                )));
            }
        }
        if self.board.kind() != ContentType::Board {
            return Err(StoreError::Unpack("board page does not hold a board".into()));
        }
        for page in &self.threads {
            if page.thread.kind() != ContentType::Thread {
                return Err(StoreError::Unpack(format!(
                    "thread page holds a {}",
                    page.thread.kind()
                )));
            }
            if page.posts.iter().any(|p| {
                p.as_post().map(|b| &b.of_thread) != Some(page.thread.hash())
            }) {
                return Err(StoreError::Unpack(format!(
                    "thread page {} holds a foreign item",
                    page.thread.hash()
                )));
            }
        }
        Ok(())
    }

    /// Record a local edit. Only read-write snapshots accept edits; the
    /// change becomes part of the root on the next [`Snapshot::save`].
    pub fn append(&mut self, content: Content) -> Result<(), StateError> {
        if self.access == AccessMode::ViewOnly {
            return Err(StateError::NotAllowed(format!(
                "board {} is view-only",
                self.root.pub_key
            )));
        }
        if self.contains(content.hash()) {
            return Err(StateError::AlreadyExists(format!(
                "content {}",
                content.hash()
            )));
        }
        if let Some(owner) = content.body().of_board() {
            if owner != &self.root.pub_key {
                return Err(StateError::NotAllowed(format!(
                    "content {} belongs to board {}",
                    content.hash(),
                    owner
                )));
            }
        }

        match content.kind() {
            ContentType::Board => self.board = content,
            ContentType::Thread => self.threads.push(ThreadPage {
                thread: content,
                posts: Vec::new(),
            }),
            ContentType::Post => {
                let of_thread = content
                    .as_post()
                    .map(|b| b.of_thread)
                    .ok_or_else(|| StateError::MalformedSnapshot("post without body".into()))?;
                let page = self
                    .threads
                    .iter_mut()
                    .find(|p| p.thread.hash() == &of_thread)
                    .ok_or_else(|| StateError::NotFound(format!("thread {}", of_thread)))?;
                page.posts.push(content);
            }
            ContentType::ThreadVote | ContentType::PostVote | ContentType::UserVote => {
                let creator = *content
                    .creator()
                    .ok_or_else(|| StateError::MalformedSnapshot("vote without creator".into()))?;
                match self.users.iter_mut().find(|u| u.pub_key == creator) {
                    Some(user) => user.submissions.push(content),
                    None => self.users.push(UserProfile {
                        pub_key: creator,
                        submissions: vec![content],
                    }),
                }
            }
        }
        self.dirty = true;
        Ok(())
    }

    /// Seal pending edits into a new root. Without pending edits the
    /// current root is returned unchanged.
    pub fn save(&mut self) -> Result<Root, StateError> {
        if self.access == AccessMode::ViewOnly {
            return Err(StateError::NotAllowed(format!(
                "board {} is view-only",
                self.root.pub_key
            )));
        }
        if self.dirty {
            let seq = self.root.seq + 1;
            let hash = crypto::root_hash(&self.root.pub_key, seq, self.contents().map(|c| c.hash()));
            self.root.seq = seq;
            self.root.hash = hash;
            self.dirty = false;
        }
        Ok(self.root)
    }
}

/// The external object store consumed by board instances.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Materialize the tree at `root`. `schema` lists the content types the
    /// caller understands; `key` is required for read-write access.
    async fn unpack(
        &self,
        root: &Root,
        access: AccessMode,
        schema: &[ContentType],
        key: Option<&SecretKey>,
    ) -> Result<Snapshot, StoreError>;

    /// Propagate a saved snapshot. Fire-and-forget.
    async fn publish(&self, snapshot: &Snapshot);

    /// Latest root of `board` whose whole tree is available locally.
    async fn last_full_root(&self, board: &PubKey) -> Result<Root, StoreError>;
}
