//! A snapshot paired with the content that is new since its predecessor.

use std::collections::HashSet;

use bbs_protocol::{Content, ContentHash, PubKey};

use crate::changes::Changes;
use crate::store::Snapshot;
use crate::StateError;

/// Content items newly observed in a snapshot, in scan order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diff {
    pub seq: u64,
    pub new: Vec<Content>,
}

impl Diff {
    pub fn is_empty(&self) -> bool {
        self.new.is_empty()
    }

    pub fn len(&self) -> usize {
        self.new.len()
    }
}

/// Owns one snapshot and its diff against the previously installed pack.
///
/// The hash index is captured at construction, so edits later saved into
/// the snapshot still show up as new in the next pack's diff. There is no
/// locking here; the owning board instance serializes all access.
#[derive(Debug)]
pub struct PackInstance {
    snapshot: Snapshot,
    seq: u64,
    known: HashSet<ContentHash>,
    diff: Diff,
}

impl PackInstance {
    /// Build a pack from `snapshot`, diffed against `prev`.
    ///
    /// Without a predecessor every content item counts as new. The new
    /// snapshot's sequence number must be strictly greater than the
    /// predecessor's; anything else is rejected with `InvalidDiff`.
    pub fn new(prev: Option<&PackInstance>, snapshot: Snapshot) -> Result<Self, StateError> {
        let seq = snapshot.seq();
        if let Some(prev) = prev {
            if seq <= prev.seq {
                return Err(StateError::InvalidDiff {
                    current: prev.seq,
                    new: seq,
                });
            }
        }

        let mut known = HashSet::new();
        let mut new = Vec::new();
        for content in snapshot.contents() {
            if !known.insert(*content.hash()) {
                continue;
            }
            let seen_before = prev.is_some_and(|p| p.known.contains(content.hash()));
            if !seen_before {
                new.push(content.clone());
            }
        }

        Ok(Self {
            snapshot,
            seq,
            known,
            diff: Diff { seq, new },
        })
    }

    /// Sequence number the snapshot had when this pack was built.
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Scoped access to the (snapshot, diff) pair.
    pub fn read<R>(&self, action: impl FnOnce(&Snapshot, &Diff) -> R) -> R {
        action(&self.snapshot, &self.diff)
    }

    /// Scoped mutable access to the snapshot, for local edits.
    pub fn edit<R>(&mut self, action: impl FnOnce(&mut Snapshot, &Diff) -> R) -> R {
        action(&mut self.snapshot, &self.diff)
    }

    /// Summary of this pack's diff for live subscribers.
    pub fn changes(&self, board: PubKey) -> Changes {
        Changes {
            board,
            seq: self.seq,
            new: self.diff.new.iter().map(|c| *c.header()).collect(),
        }
    }
}
