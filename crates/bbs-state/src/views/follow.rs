//! Per-user follow state derived from user votes.

use std::collections::HashMap;

use bbs_protocol::{Content, PubKey, VoteMode, FOLLOW_VIEW};
use serde::{Deserialize, Serialize};

use super::{query, required_arg, View, ViewResult};
use crate::pack::Diff;
use crate::store::Snapshot;
use crate::StateError;

/// Latest follow signal one user has issued about another.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FollowEntry {
    pub mode: VoteMode,
    pub tag: String,
}

/// Every follow signal issued by one user, last write wins per target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FollowRep {
    pub user: PubKey,
    pub entries: HashMap<PubKey, FollowEntry>,
}

impl FollowRep {
    pub fn new(user: PubKey) -> Self {
        Self {
            user,
            entries: HashMap::new(),
        }
    }

    pub fn set(&mut self, target: PubKey, mode: VoteMode, tag: String) {
        self.entries.insert(target, FollowEntry { mode, tag });
    }

    pub fn view(&self) -> FollowRepView {
        let mut view = FollowRepView::empty(self.user);
        for (target, entry) in &self.entries {
            let item = FollowEntryView {
                user_public_key: *target,
                tag: entry.tag.clone(),
            };
            match entry.mode {
                VoteMode::Up => view.following.push(item),
                VoteMode::Down => view.avoiding.push(item),
                VoteMode::None => {}
            }
        }
        view.following.sort_by_key(|e| e.user_public_key);
        view.avoiding.sort_by_key(|e| e.user_public_key);
        view
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowEntryView {
    pub user_public_key: PubKey,
    pub tag: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowRepView {
    pub user_public_key: PubKey,
    pub following: Vec<FollowEntryView>,
    pub avoiding: Vec<FollowEntryView>,
}

impl FollowRepView {
    pub fn empty(user: PubKey) -> Self {
        Self {
            user_public_key: user,
            following: Vec::new(),
            avoiding: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FollowView {
    users: HashMap<PubKey, FollowRep>,
}

impl FollowView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn user(&self, user: &PubKey) -> Option<&FollowRep> {
        self.users.get(user)
    }

    fn process(&mut self, content: &Content) {
        if let Some(body) = content.as_user_vote() {
            self.users
                .entry(body.creator)
                .or_insert_with(|| FollowRep::new(body.creator))
                .set(body.of_user, body.mode, body.tag.clone());
        }
    }
}

impl View for FollowView {
    fn id(&self) -> &'static str {
        FOLLOW_VIEW
    }

    fn init(&mut self, snapshot: &Snapshot) -> Result<(), StateError> {
        self.users.clear();
        for user in snapshot.users() {
            for submission in &user.submissions {
                self.process(submission);
            }
        }
        Ok(())
    }

    fn check(&self, _snapshot: &Snapshot, _diff: &Diff) -> Result<(), StateError> {
        Ok(())
    }

    fn update(&mut self, _snapshot: &Snapshot, diff: &Diff) {
        for content in &diff.new {
            self.process(content);
        }
    }

    fn get(&self, query: &str, args: &[String]) -> Result<ViewResult, StateError> {
        if query != query::FOLLOW_PAGE || args.len() != 1 {
            return Err(StateError::NotAllowed(format!(
                "invalid get request '{}' ({:?})",
                query, args
            )));
        }
        let user: PubKey = required_arg(query, args, 0)?;
        let view = match self.users.get(&user) {
            Some(rep) => rep.view(),
            None => FollowRepView::empty(user),
        };
        Ok(ViewResult::FollowPage(view))
    }
}
