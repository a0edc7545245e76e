//! Incrementally maintained, read-optimized projections of a board.
//!
//! A view is built once from a full snapshot (`init`) and then kept in
//! step by folding each diff. Folding is two-phase: every view `check`s
//! the diff first, and only when all of them accept it does each one
//! `update`, which cannot fail. Board instances own a registry of views
//! keyed by [`View::id`] and dispatch reads through [`View::get`].

pub mod content;
pub mod follow;
pub mod rep;

use std::fmt;
use std::str::FromStr;

use bbs_protocol::ProtocolError;
use serde::Serialize;

use crate::pack::Diff;
use crate::store::Snapshot;
use crate::StateError;

pub use content::ContentView;
pub use follow::{FollowRep, FollowRepView, FollowView};
pub use rep::{
    BoardPageView, BoardRep, BoardRepView, PostRep, PostRepView, ThreadPageView, ThreadRep,
    ThreadRepView, VoteRepView, VotesRep,
};

/// Query identifiers accepted by the built-in views.
pub mod query {
    pub const BOARD: &str = "Board";
    pub const BOARD_PAGE: &str = "BoardPage";
    pub const THREAD_PAGE: &str = "ThreadPage";
    pub const VOTES: &str = "Votes";
    pub const FOLLOW_PAGE: &str = "FollowPage";
}

pub trait View: Send + Sync + fmt::Debug {
    /// Registry key of this view.
    fn id(&self) -> &'static str;

    /// Build the view from scratch.
    fn init(&mut self, snapshot: &Snapshot) -> Result<(), StateError>;

    /// Reject a diff this view cannot fold. Must not change the view.
    fn check(&self, snapshot: &Snapshot, diff: &Diff) -> Result<(), StateError>;

    /// Fold the content new in `snapshot` (as listed by `diff`).
    ///
    /// Called only after `check` accepted the same diff, exactly once per
    /// diff, in commit order.
    fn update(&mut self, snapshot: &Snapshot, diff: &Diff);

    fn get(&self, query: &str, args: &[String]) -> Result<ViewResult, StateError>;
}

/// Result of a view query.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ViewResult {
    Board(BoardRepView),
    BoardPage(BoardPageView),
    ThreadPage(ThreadPageView),
    Votes(VoteRepView),
    FollowPage(FollowRepView),
}

/// The views every board instance carries.
pub fn default_views() -> Vec<Box<dyn View>> {
    vec![
        Box::new(ContentView::default()),
        Box::new(FollowView::default()),
    ]
}

/// Parse the required argument at `idx`.
pub(crate) fn required_arg<T>(query: &str, args: &[String], idx: usize) -> Result<T, StateError>
where
    T: FromStr<Err = ProtocolError>,
{
    let raw = args.get(idx).ok_or_else(|| {
        StateError::NotAllowed(format!("invalid get request '{}': missing argument {}", query, idx))
    })?;
    parse_arg(query, raw)
}

/// Parse the optional argument at `idx`; an empty string counts as absent.
pub(crate) fn optional_arg<T>(
    query: &str,
    args: &[String],
    idx: usize,
) -> Result<Option<T>, StateError>
where
    T: FromStr<Err = ProtocolError>,
{
    match args.get(idx) {
        Some(raw) if !raw.is_empty() => parse_arg(query, raw).map(Some),
        _ => Ok(None),
    }
}

/// Reject calls carrying more than `max` arguments.
pub(crate) fn check_arity(query: &str, args: &[String], max: usize) -> Result<(), StateError> {
    if args.len() > max {
        return Err(StateError::NotAllowed(format!(
            "invalid get request '{}' ({:?})",
            query, args
        )));
    }
    Ok(())
}

fn parse_arg<T>(query: &str, raw: &str) -> Result<T, StateError>
where
    T: FromStr<Err = ProtocolError>,
{
    raw.parse()
        .map_err(|e| StateError::NotAllowed(format!("invalid get request '{}': {}", query, e)))
}
