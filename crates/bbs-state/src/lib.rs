//! BBS State - snapshot synchronization and materialized views
//!
//! Keeps read-optimized projections of a board in lockstep with the
//! versioned snapshots handed out by an external object store:
//! - PackInstance pairs a snapshot with the content new since its predecessor
//! - Views (content, follow) fold those diffs into query-ready state
//! - BoardInstance serializes updates and reads and commits all-or-nothing
//! - ChangesQueue delivers lossy, recency-biased change notifications
//! - RequestDedup coordinates single-flight request/response delivery

pub mod board;
pub mod changes;
pub mod dedup;
pub mod memory_store;
pub mod pack;
pub mod store;
pub mod views;

pub use board::{BoardInstance, BoardInstanceConfig};
pub use changes::{Changes, ChangesQueue, ChangesReceiver};
pub use dedup::{Fingerprinted, RequestDedup};
pub use memory_store::MemoryStore;
pub use pack::{Diff, PackInstance};
pub use store::{AccessMode, ObjectStore, Root, Snapshot, StoreError, ThreadPage, UserProfile};
pub use views::{ContentView, FollowView, View, ViewResult};

use thiserror::Error;

/// Errors originating from the state layer.
#[derive(Error, Debug)]
pub enum StateError {
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Not allowed: {0}")]
    NotAllowed(String),

    #[error("{context}: {source}")]
    Internal {
        context: &'static str,
        #[source]
        source: Box<StateError>,
    },

    #[error("Invalid diff: sequence {new} does not follow {current}")]
    InvalidDiff { current: u64, new: u64 },

    #[error("Malformed snapshot: {0}")]
    MalformedSnapshot(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl StateError {
    /// Wrap a view failure before it propagates out of a board instance.
    pub fn internal(context: &'static str, source: StateError) -> Self {
        StateError::Internal {
            context,
            source: Box::new(source),
        }
    }
}
