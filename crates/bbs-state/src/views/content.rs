//! Board → threads → posts projection with vote tallies.

use std::collections::HashMap;

use bbs_protocol::{Content, ContentBody, ContentHash, ContentType, PubKey, CONTENT_VIEW};

use super::rep::{
    BoardPageView, BoardRep, BoardRepView, PostRep, ThreadPageView, ThreadRep, ThreadRepView,
    VoteRecord, VoteRepView, VotesRep,
};
use super::{check_arity, optional_arg, query, required_arg, View, ViewResult};
use crate::pack::Diff;
use crate::store::Snapshot;
use crate::StateError;

/// Ordering of the board's threads and each thread's posts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct IndexPage {
    threads: Vec<ContentHash>,
    posts: HashMap<ContentHash, Vec<ContentHash>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentView {
    board: Option<BoardRep>,
    index: IndexPage,
    threads: HashMap<ContentHash, ThreadRep>,
    posts: HashMap<ContentHash, PostRep>,
    votes: HashMap<ContentHash, VotesRep>,
}

impl ContentView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn thread_count(&self) -> usize {
        self.index.threads.len()
    }

    /// Tally for a thread or post, if anyone has voted on it.
    pub fn votes(&self, target: &ContentHash) -> Option<&VotesRep> {
        self.votes.get(target)
    }

    fn add_thread(&mut self, rep: ThreadRep) {
        self.index.threads.push(rep.hash);
        self.index.posts.entry(rep.hash).or_default();
        self.threads.insert(rep.hash, rep);
    }

    fn add_post(&mut self, rep: PostRep) {
        self.index
            .posts
            .entry(rep.of_thread)
            .or_default()
            .push(rep.hash);
        self.posts.insert(rep.hash, rep);
    }

    /// Fold a thread or post vote into its target's tally. Votes for
    /// targets this view has not seen are dropped.
    fn process_vote(&mut self, content: &Content) {
        let Some(vote) = content.as_vote() else {
            return;
        };
        let known = match content.kind() {
            ContentType::ThreadVote => self.threads.contains_key(&vote.target),
            ContentType::PostVote => self.posts.contains_key(&vote.target),
            _ => false,
        };
        if !known {
            tracing::trace!(
                vote = %content.hash(),
                target = %vote.target,
                "dropping vote for unknown target"
            );
            return;
        }
        self.votes
            .entry(vote.target)
            .or_insert_with(|| VotesRep::new(vote.target, content.kind()))
            .add(
                vote.creator,
                VoteRecord {
                    hash: *content.hash(),
                    mode: vote.mode,
                    created: vote.created,
                },
            );
    }

    fn board_view(&self) -> Result<BoardRepView, StateError> {
        self.board
            .as_ref()
            .map(|b| b.view(self.index.threads.len()))
            .ok_or_else(|| StateError::NotFound("board not loaded".into()))
    }

    fn vote_view(&self, target: &ContentHash, perspective: Option<&PubKey>) -> VoteRepView {
        self.votes
            .get(target)
            .map(|v| v.view(perspective))
            .unwrap_or_else(|| VoteRepView::empty(*target))
    }

    fn thread_view(&self, rep: &ThreadRep, perspective: Option<&PubKey>) -> ThreadRepView {
        let post_count = self.index.posts.get(&rep.hash).map_or(0, |p| p.len());
        rep.view(Some(self.vote_view(&rep.hash, perspective)), post_count)
    }

    fn board_page(&self, perspective: Option<&PubKey>) -> Result<BoardPageView, StateError> {
        let threads = self
            .index
            .threads
            .iter()
            .filter_map(|h| self.threads.get(h))
            .map(|t| self.thread_view(t, perspective))
            .collect();
        Ok(BoardPageView {
            board: self.board_view()?,
            threads,
        })
    }

    fn thread_page(
        &self,
        thread: &ContentHash,
        perspective: Option<&PubKey>,
    ) -> Result<ThreadPageView, StateError> {
        let rep = self
            .threads
            .get(thread)
            .ok_or_else(|| StateError::NotFound(format!("thread {}", thread)))?;
        let posts = self
            .index
            .posts
            .get(thread)
            .map(|hashes| {
                hashes
                    .iter()
                    .filter_map(|h| self.posts.get(h))
                    .map(|p| p.view(Some(self.vote_view(&p.hash, perspective))))
                    .collect()
            })
            .unwrap_or_default();
        Ok(ThreadPageView {
            board: self.board_view()?,
            thread: self.thread_view(rep, perspective),
            posts,
        })
    }
}

impl View for ContentView {
    fn id(&self) -> &'static str {
        CONTENT_VIEW
    }

    fn init(&mut self, snapshot: &Snapshot) -> Result<(), StateError> {
        *self = Self::default();
        self.board = Some(BoardRep::from_content(*snapshot.pub_key(), snapshot.board())?);

        for page in snapshot.threads() {
            self.add_thread(ThreadRep::from_content(&page.thread)?);
            for post in &page.posts {
                self.add_post(PostRep::from_content(post)?);
            }
        }

        for user in snapshot.users() {
            for submission in &user.submissions {
                self.process_vote(submission);
            }
        }

        tracing::debug!(
            board = %snapshot.pub_key(),
            threads = self.threads.len(),
            posts = self.posts.len(),
            tallies = self.votes.len(),
            "content view initialized"
        );
        Ok(())
    }

    fn check(&self, snapshot: &Snapshot, _diff: &Diff) -> Result<(), StateError> {
        match snapshot.board().as_board() {
            Some(_) => Ok(()),
            None => Err(StateError::MalformedSnapshot(format!(
                "expected board, got {}",
                snapshot.board().kind()
            ))),
        }
    }

    fn update(&mut self, snapshot: &Snapshot, diff: &Diff) {
        if let Some(board) = snapshot.board().as_board() {
            let hash = *snapshot.board().hash();
            self.board = Some(BoardRep::new(*snapshot.pub_key(), hash, board));
        }

        for content in &diff.new {
            let hash = *content.hash();
            match content.body() {
                ContentBody::Thread(thread) => self.add_thread(ThreadRep::new(hash, thread)),
                ContentBody::Post(post) => self.add_post(PostRep::new(hash, post)),
                ContentBody::ThreadVote(_) | ContentBody::PostVote(_) => self.process_vote(content),
                ContentBody::Board(_) | ContentBody::UserVote(_) => {}
            }
        }
    }

    fn get(&self, query: &str, args: &[String]) -> Result<ViewResult, StateError> {
        match query {
            query::BOARD => {
                check_arity(query, args, 1)?;
                Ok(ViewResult::Board(self.board_view()?))
            }
            query::BOARD_PAGE => {
                check_arity(query, args, 1)?;
                let perspective: Option<PubKey> = optional_arg(query, args, 0)?;
                Ok(ViewResult::BoardPage(self.board_page(perspective.as_ref())?))
            }
            query::THREAD_PAGE => {
                check_arity(query, args, 2)?;
                let thread: ContentHash = required_arg(query, args, 0)?;
                let perspective: Option<PubKey> = optional_arg(query, args, 1)?;
                Ok(ViewResult::ThreadPage(
                    self.thread_page(&thread, perspective.as_ref())?,
                ))
            }
            query::VOTES => {
                check_arity(query, args, 2)?;
                let target: ContentHash = required_arg(query, args, 0)?;
                let perspective: Option<PubKey> = optional_arg(query, args, 1)?;
                if !self.threads.contains_key(&target) && !self.posts.contains_key(&target) {
                    return Err(StateError::NotFound(format!("content {}", target)));
                }
                Ok(ViewResult::Votes(self.vote_view(&target, perspective.as_ref())))
            }
            _ => Err(StateError::NotAllowed(format!(
                "invalid get request '{}' ({:?})",
                query, args
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bbs_protocol::{BoardBody, ContentBody, PostBody, ThreadBody, VoteBody, VoteMode};

    const BOARD: PubKey = PubKey([1; 32]);
    const ALICE: PubKey = PubKey([2; 32]);

    fn snapshot() -> Snapshot {
        let board = Content::new(ContentBody::Board(BoardBody {
            name: "general".into(),
            body: "talk".into(),
            created: 0,
            submission_addresses: Vec::new(),
        }));
        Snapshot::genesis(BOARD, board).unwrap()
    }

    fn thread(name: &str) -> Content {
        Content::new(ContentBody::Thread(ThreadBody {
            of_board: BOARD,
            name: name.into(),
            body: String::new(),
            created: 1,
            creator: ALICE,
        }))
    }

    fn post(of_thread: &Content, name: &str) -> Content {
        Content::new(ContentBody::Post(PostBody {
            of_board: BOARD,
            of_thread: *of_thread.hash(),
            name: name.into(),
            body: String::new(),
            created: 2,
            creator: ALICE,
        }))
    }

    fn thread_vote(target: ContentHash, mode: VoteMode, created: i64) -> Content {
        Content::new(ContentBody::ThreadVote(VoteBody {
            of_board: BOARD,
            target,
            mode,
            created,
            creator: ALICE,
        }))
    }

    #[test]
    fn test_init_orders_threads_and_posts() {
        let mut snap = snapshot();
        let a = thread("a");
        let b = thread("b");
        snap.append(a.clone()).unwrap();
        snap.append(b.clone()).unwrap();
        snap.append(post(&a, "p1")).unwrap();
        snap.append(post(&a, "p2")).unwrap();

        let mut view = ContentView::new();
        view.init(&snap).unwrap();
        let ViewResult::BoardPage(page) = view.get(query::BOARD_PAGE, &[]).unwrap() else {
            panic!("wrong result");
        };
        let names: Vec<_> = page.threads.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(page.threads[0].post_count, 2);
        assert_eq!(page.board.thread_count, 2);
    }

    #[test]
    fn test_update_drops_vote_for_unknown_target() {
        let snap = snapshot();
        let mut view = ContentView::new();
        view.init(&snap).unwrap();
        let missing = ContentHash([9; 32]);
        let diff = Diff {
            seq: 1,
            new: vec![thread_vote(missing, VoteMode::Up, 1)],
        };
        view.check(&snap, &diff).unwrap();
        view.update(&snap, &diff);
        assert!(view.votes(&missing).is_none());
    }

    #[test]
    fn test_empty_diff_changes_nothing() {
        let mut snap = snapshot();
        let a = thread("a");
        snap.append(a.clone()).unwrap();
        snap.append(thread_vote(*a.hash(), VoteMode::Up, 1)).unwrap();
        let mut view = ContentView::new();
        view.init(&snap).unwrap();
        let before = view.clone();
        view.update(&snap, &Diff::default());
        assert_eq!(view, before);
    }

    #[test]
    fn test_unknown_query_not_allowed() {
        let mut view = ContentView::new();
        view.init(&snapshot()).unwrap();
        assert!(matches!(
            view.get("Nope", &[]),
            Err(StateError::NotAllowed(_))
        ));
        assert!(matches!(
            view.get(query::THREAD_PAGE, &["xyz".into()]),
            Err(StateError::NotAllowed(_))
        ));
        assert!(matches!(
            view.get(query::THREAD_PAGE, &[ContentHash([3; 32]).to_hex()]),
            Err(StateError::NotFound(_))
        ));
    }
}
