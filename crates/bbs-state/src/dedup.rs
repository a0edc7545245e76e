//! Single-flight table for in-flight asynchronous requests.
//!
//! Each outstanding request is registered under its fingerprint (the
//! content hash of the request) and gets a one-slot delivery channel.
//! Delivery is best-effort and at most once per registration.

use std::collections::HashMap;

use bbs_protocol::{ContentHash, Response};
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::StateError;

/// A value that can be matched to the request it completes.
pub trait Fingerprinted {
    fn fingerprint(&self) -> &ContentHash;
}

impl Fingerprinted for Response {
    fn fingerprint(&self) -> &ContentHash {
        &self.hash
    }
}

pub struct RequestDedup<R> {
    store: Mutex<HashMap<ContentHash, mpsc::Sender<R>>>,
}

impl<R: Fingerprinted> RequestDedup<R> {
    pub fn new() -> Self {
        Self {
            store: Mutex::new(HashMap::new()),
        }
    }

    /// Register a request. Fails with `AlreadyExists` if another caller
    /// already owns this fingerprint.
    pub fn add(&self, hash: ContentHash) -> Result<mpsc::Receiver<R>, StateError> {
        let mut store = self.store.lock();
        if store.contains_key(&hash) {
            return Err(StateError::AlreadyExists(format!("request {}", hash)));
        }
        let (tx, rx) = mpsc::channel(1);
        store.insert(hash, tx);
        Ok(rx)
    }

    /// Drop the registration, closing its channel. No-op if absent.
    pub fn remove(&self, hash: &ContentHash) {
        self.store.lock().remove(hash);
    }

    /// Deliver a response to its waiter without blocking. If nobody is
    /// registered, or the slot is already occupied, the response is dropped.
    pub fn satisfy(&self, response: R) {
        let store = self.store.lock();
        let Some(tx) = store.get(response.fingerprint()) else {
            tracing::trace!("no request waiting for response");
            return;
        };
        if let Err(e) = tx.try_send(response) {
            tracing::debug!(error = %e, "response dropped");
        }
    }

    pub fn contains(&self, hash: &ContentHash) -> bool {
        self.store.lock().contains_key(hash)
    }

    pub fn len(&self) -> usize {
        self.store.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<R: Fingerprinted> Default for RequestDedup<R> {
    fn default() -> Self {
        Self::new()
    }
}
