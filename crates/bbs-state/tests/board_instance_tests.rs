//! Tests for board instances driven through the in-memory store.
//!
//! Covers:
//! - Local edits on a master board and their publication
//! - Followers applying published roots, including vote folding
//! - Sequence monotonicity and all-or-nothing view updates
//! - Change-notification backpressure and wait_seq

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use bbs_protocol::crypto;
use bbs_protocol::{
    BoardBody, Content, ContentBody, ContentHash, ContentType, PubKey, SecretKey, ThreadBody,
    VoteBody, VoteMode, CONTENT_VIEW,
};
use bbs_state::views::{default_views, query, BoardPageView};
use bbs_state::{
    AccessMode, BoardInstance, BoardInstanceConfig, Diff, MemoryStore, ObjectStore, Root,
    Snapshot, StateError, StoreError, View, ViewResult,
};
use tokio_util::sync::CancellationToken;

// ═══════════════════════════════════════════════════════════════
// Fixtures
// ═══════════════════════════════════════════════════════════════

struct Fixture {
    store: Arc<MemoryStore>,
    pk: PubKey,
    sk: SecretKey,
    genesis: Root,
}

fn fixture() -> Fixture {
    let store = Arc::new(MemoryStore::new());
    let (pk, sk) = crypto::generate_keypair();
    let board = Content::new(ContentBody::Board(BoardBody {
        name: "general".into(),
        body: "anything goes".into(),
        created: 0,
        submission_addresses: Vec::new(),
    }));
    let genesis = store.create_board(pk, board).unwrap();
    Fixture {
        store,
        pk,
        sk,
        genesis,
    }
}

async fn master(fx: &Fixture) -> BoardInstance {
    let config = BoardInstanceConfig {
        master: true,
        pub_key: fx.pk,
        sec_key: Some(fx.sk),
    };
    let store: Arc<dyn ObjectStore> = fx.store.clone();
    BoardInstance::new(config, store, &fx.genesis, default_views())
        .await
        .unwrap()
}

async fn follower_with(fx: &Fixture, views: Vec<Box<dyn View>>) -> BoardInstance {
    let config = BoardInstanceConfig {
        master: false,
        pub_key: fx.pk,
        sec_key: None,
    };
    let store: Arc<dyn ObjectStore> = fx.store.clone();
    BoardInstance::new(config, store, &fx.genesis, views)
        .await
        .unwrap()
}

async fn follower(fx: &Fixture) -> BoardInstance {
    follower_with(fx, default_views()).await
}

fn thread(board: PubKey, name: &str) -> Content {
    Content::new(ContentBody::Thread(ThreadBody {
        of_board: board,
        name: name.into(),
        body: String::new(),
        created: 1,
        creator: PubKey([7; 32]),
    }))
}

fn thread_vote(board: PubKey, target: ContentHash, mode: VoteMode, created: i64) -> Content {
    Content::new(ContentBody::ThreadVote(VoteBody {
        of_board: board,
        target,
        mode,
        created,
        creator: PubKey([8; 32]),
    }))
}

/// Append `content` on the master and publish it as a new root.
async fn commit(board: &BoardInstance, content: Content) -> Root {
    board
        .pack_edit(move |snapshot| snapshot.append(content))
        .await
        .unwrap();
    board.update(None).await.unwrap();
    board.pack_read(|snapshot| Ok(*snapshot.root())).await.unwrap()
}

async fn board_page(board: &BoardInstance, perspective: &[String]) -> BoardPageView {
    match board
        .get(CONTENT_VIEW, query::BOARD_PAGE, perspective)
        .await
        .unwrap()
    {
        ViewResult::BoardPage(page) => page,
        other => panic!("unexpected result {:?}", other),
    }
}

// ═══════════════════════════════════════════════════════════════
// Master boards
// ═══════════════════════════════════════════════════════════════

#[tokio::test]
async fn master_publishes_local_edits() {
    let fx = fixture();
    let board = master(&fx).await;
    let changes = board.changes_chan();

    board
        .pack_edit(|snapshot| snapshot.append(thread(fx.pk, "hello")))
        .await
        .unwrap();
    assert!(board.update_needed());

    board.update(None).await.unwrap();
    assert_eq!(board.get_seq(), 1);

    let page = board_page(&board, &[]).await;
    assert_eq!(page.threads.len(), 1);
    assert_eq!(page.threads[0].name, "hello");

    let note = changes.try_recv().expect("change notification");
    assert_eq!(note.board, fx.pk);
    assert_eq!(note.seq, 1);
    assert_eq!(note.new.len(), 1);
    assert_eq!(fx.store.last_full_root(&fx.pk).await.unwrap().seq, 1);
}

#[tokio::test]
async fn master_update_without_edits_is_noop() {
    let fx = fixture();
    let board = master(&fx).await;
    let changes = board.changes_chan();

    board.update(None).await.unwrap();
    assert_eq!(board.get_seq(), 0);
    assert!(changes.is_empty());
}

#[tokio::test]
async fn duplicate_content_rejected() {
    let fx = fixture();
    let board = master(&fx).await;
    let t = thread(fx.pk, "once");
    let again = t.clone();
    board.pack_edit(move |s| s.append(t)).await.unwrap();
    let err = board.pack_edit(move |s| s.append(again)).await.unwrap_err();
    assert!(matches!(err, StateError::AlreadyExists(_)));
}

// ═══════════════════════════════════════════════════════════════
// Followers
// ═══════════════════════════════════════════════════════════════

#[tokio::test]
async fn follower_update_without_root_is_noop() {
    let fx = fixture();
    let board = follower(&fx).await;
    board.update(None).await.unwrap();
    assert_eq!(board.get_seq(), 0);
    assert!(board.changes_chan().is_empty());
}

#[tokio::test]
async fn follower_rejects_local_edits() {
    let fx = fixture();
    let board = follower(&fx).await;
    let err = board
        .pack_edit(|snapshot| snapshot.append(thread(fx.pk, "nope")))
        .await
        .unwrap_err();
    assert!(matches!(err, StateError::NotAllowed(_)));
    assert!(!board.update_needed());
}

#[tokio::test]
async fn follower_folds_votes_across_updates() {
    let fx = fixture();
    let writer = master(&fx).await;
    let reader = follower(&fx).await;

    let t = thread(fx.pk, "poll");
    let target = *t.hash();
    let mut roots = vec![commit(&writer, t).await];
    for (created, mode) in [(2, VoteMode::Up), (3, VoteMode::Down), (4, VoteMode::Up)] {
        roots.push(commit(&writer, thread_vote(fx.pk, target, mode, created)).await);
    }
    for root in roots {
        reader.update(Some(root)).await.unwrap();
    }
    assert_eq!(reader.get_seq(), 4);

    let voter = PubKey([8; 32]).to_hex();
    let result = reader
        .get(CONTENT_VIEW, query::VOTES, &[target.to_hex(), voter])
        .await
        .unwrap();
    let ViewResult::Votes(votes) = result else {
        panic!("unexpected result");
    };
    assert_eq!(votes.up.count, 1);
    assert_eq!(votes.down.count, 0);
    assert!(votes.up.voted);
}

#[tokio::test]
async fn vote_for_unknown_target_is_dropped() {
    let fx = fixture();
    let writer = master(&fx).await;
    let missing = ContentHash([9; 32]);
    commit(&writer, thread_vote(fx.pk, missing, VoteMode::Up, 1)).await;
    assert_eq!(writer.get_seq(), 1);

    let err = writer
        .get(CONTENT_VIEW, query::VOTES, &[missing.to_hex()])
        .await
        .unwrap_err();
    assert!(matches!(err, StateError::NotFound(_)));
}

// ═══════════════════════════════════════════════════════════════
// Sequence monotonicity and atomic updates
// ═══════════════════════════════════════════════════════════════

#[tokio::test]
async fn stale_root_rejected_without_side_effects() {
    let fx = fixture();
    let writer = master(&fx).await;
    let reader = follower(&fx).await;

    let r1 = commit(&writer, thread(fx.pk, "a")).await;
    let r2 = commit(&writer, thread(fx.pk, "b")).await;
    reader.update(Some(r2)).await.unwrap();
    let changes = reader.changes_chan();
    changes.drain();

    for stale in [r1, r2] {
        let err = reader.update(Some(stale)).await.unwrap_err();
        assert!(matches!(err, StateError::InvalidDiff { current: 2, .. }));
    }
    assert_eq!(reader.get_seq(), 2);
    assert_eq!(board_page(&reader, &[]).await.threads.len(), 2);
    assert!(changes.is_empty());
}

#[derive(Debug, Clone)]
struct FailingView;

impl View for FailingView {
    fn id(&self) -> &'static str {
        "failing"
    }

    fn init(&mut self, _snapshot: &Snapshot) -> Result<(), StateError> {
        Ok(())
    }

    fn check(&self, _snapshot: &Snapshot, _diff: &Diff) -> Result<(), StateError> {
        Err(StateError::MalformedSnapshot("refusing update".into()))
    }

    fn update(&mut self, _snapshot: &Snapshot, _diff: &Diff) {
        panic!("update after rejected check");
    }

    fn get(&self, query: &str, _args: &[String]) -> Result<ViewResult, StateError> {
        Err(StateError::NotAllowed(query.to_string()))
    }
}

#[tokio::test]
async fn failing_view_aborts_whole_update() {
    let fx = fixture();
    let writer = master(&fx).await;
    let mut views = default_views();
    views.push(Box::new(FailingView));
    let reader = follower_with(&fx, views).await;

    let r1 = commit(&writer, thread(fx.pk, "a")).await;
    let err = reader.update(Some(r1)).await.unwrap_err();
    assert!(matches!(
        err,
        StateError::Internal {
            context: "failed to update view",
            ..
        }
    ));

    assert_eq!(reader.get_seq(), 0);
    assert!(board_page(&reader, &[]).await.threads.is_empty());
    assert!(reader.changes_chan().is_empty());
}

#[tokio::test]
async fn duplicate_view_ids_rejected() {
    let fx = fixture();
    let mut views = default_views();
    views.extend(default_views());
    let config = BoardInstanceConfig {
        master: false,
        pub_key: fx.pk,
        sec_key: None,
    };
    let store: Arc<dyn ObjectStore> = fx.store.clone();
    let result = BoardInstance::new(config, store, &fx.genesis, views).await;
    assert!(matches!(result, Err(StateError::AlreadyExists(_))));
}

#[tokio::test]
async fn unknown_view_not_found() {
    let fx = fixture();
    let board = follower(&fx).await;
    let err = board.get("missing", query::BOARD, &[]).await.unwrap_err();
    assert!(matches!(err, StateError::NotFound(_)));
}

// ═══════════════════════════════════════════════════════════════
// Change notifications
// ═══════════════════════════════════════════════════════════════

#[tokio::test]
async fn changes_keep_most_recent_under_backpressure() {
    let fx = fixture();
    let writer = master(&fx).await;
    let reader = follower(&fx).await;

    for i in 0..15 {
        commit(&writer, thread(fx.pk, &format!("t{}", i))).await;
    }
    for root in fx.store.roots(&fx.pk).into_iter().skip(1) {
        reader.update(Some(root)).await.unwrap();
    }

    let seqs: Vec<u64> = reader.changes_chan().drain().iter().map(|c| c.seq).collect();
    assert_eq!(seqs, (6..=15).collect::<Vec<_>>());
}

// ═══════════════════════════════════════════════════════════════
// wait_seq
// ═══════════════════════════════════════════════════════════════

#[tokio::test]
async fn wait_seq_already_reached() {
    let fx = fixture();
    let board = follower(&fx).await;
    board.wait_seq(&CancellationToken::new(), 0).await.unwrap();
}

#[tokio::test]
async fn wait_seq_cancelled() {
    let fx = fixture();
    let board = follower(&fx).await;
    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = board.wait_seq(&cancel, 5).await.unwrap_err();
    assert!(matches!(err, StateError::Cancelled));
}

#[tokio::test(start_paused = true)]
async fn wait_seq_observes_later_update() {
    let fx = fixture();
    let writer = master(&fx).await;
    let reader = Arc::new(follower(&fx).await);
    let r1 = commit(&writer, thread(fx.pk, "later")).await;

    let applier = reader.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(2500)).await;
        applier.update(Some(r1)).await.unwrap();
    });

    let cancel = CancellationToken::new();
    tokio::time::timeout(Duration::from_secs(10), reader.wait_seq(&cancel, 1))
        .await
        .expect("wait_seq timed out")
        .unwrap();
    assert_eq!(reader.get_seq(), 1);
}

/// Store whose `unpack` takes three seconds once `slow` is set.
struct SlowStore {
    inner: Arc<MemoryStore>,
    slow: AtomicBool,
    unpacking: AtomicBool,
}

#[async_trait]
impl ObjectStore for SlowStore {
    async fn unpack(
        &self,
        root: &Root,
        access: AccessMode,
        schema: &[ContentType],
        key: Option<&SecretKey>,
    ) -> Result<Snapshot, StoreError> {
        if self.slow.load(Ordering::SeqCst) {
            self.unpacking.store(true, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_secs(3)).await;
        }
        self.inner.unpack(root, access, schema, key).await
    }

    async fn publish(&self, snapshot: &Snapshot) {
        self.inner.publish(snapshot).await
    }

    async fn last_full_root(&self, board: &PubKey) -> Result<Root, StoreError> {
        self.inner.last_full_root(board).await
    }
}

#[tokio::test(start_paused = true)]
async fn wait_seq_cancelled_during_slow_update() {
    let fx = fixture();
    let writer = master(&fx).await;
    let r1 = commit(&writer, thread(fx.pk, "slow")).await;

    let store = Arc::new(SlowStore {
        inner: fx.store.clone(),
        slow: AtomicBool::new(false),
        unpacking: AtomicBool::new(false),
    });
    let config = BoardInstanceConfig {
        master: false,
        pub_key: fx.pk,
        sec_key: None,
    };
    let reader = Arc::new(
        BoardInstance::new(config, store.clone(), &fx.genesis, default_views())
            .await
            .unwrap(),
    );
    store.slow.store(true, Ordering::SeqCst);

    let applier = reader.clone();
    let update = tokio::spawn(async move { applier.update(Some(r1)).await });
    while !store.unpacking.load(Ordering::SeqCst) {
        tokio::task::yield_now().await;
    }

    let cancel = CancellationToken::new();
    let canceller = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(1500)).await;
        canceller.cancel();
    });

    let started = tokio::time::Instant::now();
    let err = reader.wait_seq(&cancel, 100).await.unwrap_err();
    assert!(matches!(err, StateError::Cancelled));
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(reader.get_seq(), 0);
    assert!(!update.is_finished());

    update.await.unwrap().unwrap();
    assert_eq!(reader.get_seq(), 1);
}

#[tokio::test(start_paused = true)]
async fn wait_seq_wakes_on_commit() {
    let fx = fixture();
    let writer = master(&fx).await;
    let reader = Arc::new(follower(&fx).await);
    let r1 = commit(&writer, thread(fx.pk, "prompt")).await;

    let applier = reader.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        applier.update(Some(r1)).await.unwrap();
    });

    let started = tokio::time::Instant::now();
    reader.wait_seq(&CancellationToken::new(), 1).await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(1));
}
