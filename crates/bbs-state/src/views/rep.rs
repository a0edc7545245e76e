//! Flattened read-model copies of board content, plus vote aggregates.

use std::collections::HashMap;

use bbs_protocol::{
    BoardBody, Content, ContentHash, ContentType, PostBody, PubKey, ThreadBody, VoteMode,
};
use serde::{Deserialize, Serialize};

use crate::StateError;

// ── Board ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardRep {
    pub pub_key: PubKey,
    pub hash: ContentHash,
    pub name: String,
    pub body: String,
    pub created: i64,
    pub submission_addresses: Vec<String>,
}

impl BoardRep {
    pub fn from_content(pub_key: PubKey, content: &Content) -> Result<Self, StateError> {
        let board = content.as_board().ok_or_else(|| {
            StateError::MalformedSnapshot(format!("expected board, got {}", content.kind()))
        })?;
        Ok(Self::new(pub_key, *content.hash(), board))
    }

    pub fn new(pub_key: PubKey, hash: ContentHash, board: &BoardBody) -> Self {
        Self {
            pub_key,
            hash,
            name: board.name.clone(),
            body: board.body.clone(),
            created: board.created,
            submission_addresses: board.submission_addresses.clone(),
        }
    }

    pub fn view(&self, thread_count: usize) -> BoardRepView {
        BoardRepView {
            public_key: self.pub_key,
            hash: self.hash,
            name: self.name.clone(),
            body: self.body.clone(),
            created: self.created,
            submission_addresses: self.submission_addresses.clone(),
            thread_count,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardRepView {
    pub public_key: PubKey,
    pub hash: ContentHash,
    pub name: String,
    pub body: String,
    pub created: i64,
    pub submission_addresses: Vec<String>,
    pub thread_count: usize,
}

// ── Thread ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadRep {
    pub hash: ContentHash,
    pub name: String,
    pub body: String,
    pub created: i64,
    pub creator: PubKey,
}

impl ThreadRep {
    pub fn from_content(content: &Content) -> Result<Self, StateError> {
        let thread = content.as_thread().ok_or_else(|| {
            StateError::MalformedSnapshot(format!("expected thread, got {}", content.kind()))
        })?;
        Ok(Self::new(*content.hash(), thread))
    }

    pub fn new(hash: ContentHash, thread: &ThreadBody) -> Self {
        Self {
            hash,
            name: thread.name.clone(),
            body: thread.body.clone(),
            created: thread.created,
            creator: thread.creator,
        }
    }

    pub fn view(&self, votes: Option<VoteRepView>, post_count: usize) -> ThreadRepView {
        ThreadRepView {
            hash: self.hash,
            name: self.name.clone(),
            body: self.body.clone(),
            created: self.created,
            creator: self.creator,
            votes,
            post_count,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadRepView {
    pub hash: ContentHash,
    pub name: String,
    pub body: String,
    pub created: i64,
    pub creator: PubKey,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub votes: Option<VoteRepView>,
    pub post_count: usize,
}

// ── Post ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostRep {
    pub hash: ContentHash,
    pub of_thread: ContentHash,
    pub name: String,
    pub body: String,
    pub created: i64,
    pub creator: PubKey,
}

impl PostRep {
    pub fn from_content(content: &Content) -> Result<Self, StateError> {
        let post = content.as_post().ok_or_else(|| {
            StateError::MalformedSnapshot(format!("expected post, got {}", content.kind()))
        })?;
        Ok(Self::new(*content.hash(), post))
    }

    pub fn new(hash: ContentHash, post: &PostBody) -> Self {
        Self {
            hash,
            of_thread: post.of_thread,
            name: post.name.clone(),
            body: post.body.clone(),
            created: post.created,
            creator: post.creator,
        }
    }

    pub fn view(&self, votes: Option<VoteRepView>) -> PostRepView {
        PostRepView {
            hash: self.hash,
            of_thread: self.of_thread,
            name: self.name.clone(),
            body: self.body.clone(),
            created: self.created,
            creator: self.creator,
            votes,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostRepView {
    pub hash: ContentHash,
    pub of_thread: ContentHash,
    pub name: String,
    pub body: String,
    pub created: i64,
    pub creator: PubKey,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub votes: Option<VoteRepView>,
}

// ── Pages ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardPageView {
    pub board: BoardRepView,
    pub threads: Vec<ThreadRepView>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadPageView {
    pub board: BoardRepView,
    pub thread: ThreadRepView,
    pub posts: Vec<PostRepView>,
}

// ── Votes ──────────────────────────────────────────────────────

/// A voter's current vote on one target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoteRecord {
    pub hash: ContentHash,
    pub mode: VoteMode,
    pub created: i64,
}

/// Running tally of the votes cast on one thread or post.
///
/// Holds at most one vote per voter. Tallies are only correct when each
/// vote is folded exactly once, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VotesRep {
    pub target: ContentHash,
    pub kind: ContentType,
    pub votes: HashMap<PubKey, VoteRecord>,
    pub up_count: usize,
    pub down_count: usize,
}

impl VotesRep {
    pub fn new(target: ContentHash, kind: ContentType) -> Self {
        Self {
            target,
            kind,
            votes: HashMap::new(),
            up_count: 0,
            down_count: 0,
        }
    }

    /// Fold one vote from `voter`, superseding their previous vote.
    pub fn add(&mut self, voter: PubKey, vote: VoteRecord) {
        if let Some(old) = self.votes.get(&voter) {
            match old.mode {
                VoteMode::Up => self.up_count -= 1,
                VoteMode::Down => self.down_count -= 1,
                VoteMode::None => {}
            }
        }
        match vote.mode {
            VoteMode::Up => {
                self.votes.insert(voter, vote);
                self.up_count += 1;
            }
            VoteMode::Down => {
                self.votes.insert(voter, vote);
                self.down_count += 1;
            }
            VoteMode::None => {
                self.votes.remove(&voter);
            }
        }
    }

    pub fn view(&self, perspective: Option<&PubKey>) -> VoteRepView {
        let mode = perspective
            .and_then(|pk| self.votes.get(pk))
            .map(|v| v.mode);
        VoteRepView {
            hash: self.target,
            up: VoteCount {
                voted: mode == Some(VoteMode::Up),
                count: self.up_count,
            },
            down: VoteCount {
                voted: mode == Some(VoteMode::Down),
                count: self.down_count,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteCount {
    pub voted: bool,
    pub count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteRepView {
    pub hash: ContentHash,
    #[serde(rename = "up_votes")]
    pub up: VoteCount,
    #[serde(rename = "down_votes")]
    pub down: VoteCount,
}

impl VoteRepView {
    /// Summary for a target nobody has voted on yet.
    pub fn empty(hash: ContentHash) -> Self {
        Self {
            hash,
            up: VoteCount {
                voted: false,
                count: 0,
            },
            down: VoteCount {
                voted: false,
                count: 0,
            },
        }
    }
}
