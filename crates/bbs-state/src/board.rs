//! One board: the installed pack, its views and the change stream.
//!
//! All reads and writes of a board go through one exclusive lock so a
//! reader never sees a snapshot paired with half-updated views. The
//! update-needed flag and the committed sequence live outside that lock
//! and never wait on an update.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use bbs_protocol::{ContentType, PubKey, SecretKey, CHANGES_CAPACITY, WAIT_SEQ_INTERVAL_SECS};
use parking_lot::RwLock;
use tokio::sync::{watch, Mutex};
use tokio_util::sync::CancellationToken;

use crate::changes::{ChangesQueue, ChangesReceiver};
use crate::pack::PackInstance;
use crate::store::{AccessMode, ObjectStore, Root, Snapshot};
use crate::views::{View, ViewResult};
use crate::StateError;

/// Interval between sequence checks in [`BoardInstance::wait_seq`].
pub const WAIT_SEQ_INTERVAL: Duration = Duration::from_secs(WAIT_SEQ_INTERVAL_SECS);

#[derive(Debug, Clone)]
pub struct BoardInstanceConfig {
    /// Whether this node holds write authority over the board.
    pub master: bool,
    pub pub_key: PubKey,
    pub sec_key: Option<SecretKey>,
}

struct Inner {
    pack: PackInstance,
    views: BTreeMap<&'static str, Box<dyn View>>,
}

pub struct BoardInstance {
    config: BoardInstanceConfig,
    access: AccessMode,
    store: Arc<dyn ObjectStore>,
    inner: Mutex<Inner>,
    changes: ChangesQueue,
    update_needed: RwLock<bool>,
    /// Sequence of the installed pack, republished on every commit.
    seq: watch::Sender<u64>,
}

impl BoardInstance {
    /// Unpack `root`, then build every view from the resulting snapshot.
    pub async fn new(
        config: BoardInstanceConfig,
        store: Arc<dyn ObjectStore>,
        root: &Root,
        views: Vec<Box<dyn View>>,
    ) -> Result<Self, StateError> {
        let access = if config.master {
            AccessMode::ReadWrite
        } else {
            AccessMode::ViewOnly
        };

        let snapshot = store
            .unpack(root, access, &ContentType::ALL, config.sec_key.as_ref())
            .await?;
        let pack = PackInstance::new(None, snapshot)?;

        let mut registry: BTreeMap<&'static str, Box<dyn View>> = BTreeMap::new();
        for view in views {
            let id = view.id();
            if registry.contains_key(id) {
                return Err(StateError::AlreadyExists(format!("view '{}'", id)));
            }
            registry.insert(id, view);
        }
        for (id, view) in registry.iter_mut() {
            pack.read(|snapshot, _| view.init(snapshot))
                .map_err(|e| StateError::internal("failed to generate view", e))?;
            tracing::debug!(board = %config.pub_key, view = *id, "view loaded");
        }

        tracing::info!(
            board = %config.pub_key,
            seq = pack.seq(),
            master = config.master,
            "board instance ready"
        );

        let (seq, _) = watch::channel(pack.seq());
        Ok(Self {
            config,
            access,
            store,
            inner: Mutex::new(Inner {
                pack,
                views: registry,
            }),
            changes: ChangesQueue::new(CHANGES_CAPACITY),
            update_needed: RwLock::new(false),
            seq,
        })
    }

    pub fn pub_key(&self) -> &PubKey {
        &self.config.pub_key
    }

    pub fn is_master(&self) -> bool {
        self.config.master
    }

    /// Move the board to a newer root.
    ///
    /// With `Some(root)` the root is unpacked, diffed against the installed
    /// pack and folded into every view. With `None` a master first saves
    /// and publishes pending local edits, then applies the store's latest
    /// fully-synced root; a non-master does nothing. Views are only folded
    /// once every one of them has accepted the diff, so either the new pack
    /// and all updated views are installed together, or nothing changes.
    pub async fn update(&self, root: Option<Root>) -> Result<(), StateError> {
        let mut inner = self.inner.lock().await;

        let root = match root {
            Some(root) => root,
            None if self.config.master => {
                let installed = inner.pack.read(|snapshot, _| *snapshot.root());
                let saved = inner.pack.edit(|snapshot, _| snapshot.save())?;
                let published = inner.pack.read(|snapshot, _| snapshot.clone());
                self.store.publish(&published).await;
                tracing::debug!(board = %self.config.pub_key, seq = saved.seq, "published local edits");

                let latest = self.store.last_full_root(&self.config.pub_key).await?;
                if latest.seq == inner.pack.seq() && latest.hash == installed.hash {
                    return Ok(());
                }
                latest
            }
            None => return Ok(()),
        };

        let snapshot = self
            .store
            .unpack(
                &root,
                self.access,
                &ContentType::ALL,
                self.config.sec_key.as_ref(),
            )
            .await?;
        let pack = PackInstance::new(Some(&inner.pack), snapshot)?;

        for view in inner.views.values() {
            pack.read(|snapshot, diff| view.check(snapshot, diff))
                .map_err(|e| StateError::internal("failed to update view", e))?;
        }
        for view in inner.views.values_mut() {
            pack.read(|snapshot, diff| view.update(snapshot, diff));
        }

        let changes = pack.changes(self.config.pub_key);
        tracing::info!(
            board = %self.config.pub_key,
            seq = pack.seq(),
            new = changes.new.len(),
            "board updated"
        );
        let seq = pack.seq();
        inner.pack = pack;
        self.seq.send_replace(seq);
        drop(inner);

        if let Some(evicted) = self.changes.push(changes) {
            tracing::trace!(board = %self.config.pub_key, seq = evicted.seq, "change notification evicted");
        }
        Ok(())
    }

    /// Query a registered view.
    pub async fn get(
        &self,
        view_id: &str,
        query: &str,
        args: &[String],
    ) -> Result<ViewResult, StateError> {
        let inner = self.inner.lock().await;
        let view = inner
            .views
            .get(view_id)
            .ok_or_else(|| StateError::NotFound(format!("view of id '{}'", view_id)))?;
        view.get(query, args)
    }

    /// Read end of the change-notification queue.
    pub fn changes_chan(&self) -> ChangesReceiver {
        self.changes.receiver()
    }

    /// Run `action` against the installed snapshot.
    pub async fn pack_read<R>(
        &self,
        action: impl FnOnce(&Snapshot) -> Result<R, StateError> + Send,
    ) -> Result<R, StateError> {
        let inner = self.inner.lock().await;
        inner.pack.read(|snapshot, _| action(snapshot))
    }

    /// Apply a local edit to the installed snapshot and flag the board
    /// for the next sync pass.
    pub async fn pack_edit<R>(
        &self,
        action: impl FnOnce(&mut Snapshot) -> Result<R, StateError> + Send,
    ) -> Result<R, StateError> {
        let mut inner = self.inner.lock().await;
        let out = inner.pack.edit(|snapshot, _| action(snapshot))?;
        self.set_update_needed();
        Ok(out)
    }

    // ── Update flag ────────────────────────────────────────────────

    pub fn update_needed(&self) -> bool {
        *self.update_needed.read()
    }

    pub fn set_update_needed(&self) {
        *self.update_needed.write() = true;
    }

    pub fn clear_update_needed(&self) {
        *self.update_needed.write() = false;
    }

    // ── Sequence ───────────────────────────────────────────────────

    /// Sequence number of the installed snapshot. Does not wait for an
    /// update in progress.
    pub fn get_seq(&self) -> u64 {
        *self.seq.borrow()
    }

    /// Wait until the installed sequence reaches `goal`, or `cancel` fires.
    ///
    /// The sequence is checked on every commit and on a fixed interval,
    /// never under the board lock, so cancellation is seen even while an
    /// update is running.
    pub async fn wait_seq(&self, cancel: &CancellationToken, goal: u64) -> Result<(), StateError> {
        let mut committed = self.seq.subscribe();
        if *committed.borrow_and_update() >= goal {
            return Ok(());
        }

        let start = tokio::time::Instant::now() + WAIT_SEQ_INTERVAL;
        let mut ticker = tokio::time::interval_at(start, WAIT_SEQ_INTERVAL);
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(StateError::Cancelled),
                _ = committed.changed() => {}
                _ = ticker.tick() => {}
            }
            if *committed.borrow_and_update() >= goal {
                return Ok(());
            }
        }
    }
}
