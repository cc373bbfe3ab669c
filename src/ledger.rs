//! Correlates inbound packets with the requests that issued them.

use crate::error::RconError;
use std::collections::HashMap;
use tokio::sync::{oneshot, Mutex};

/// Pending requests keyed by packet id.
///
/// A request is registered before its packet hits the wire and resolved at
/// most once by the inbound dispatch path. Waiters block on a per-id
/// [`oneshot`] channel rather than polling, and an id only becomes reusable
/// once its entry has been resolved or cancelled.
#[derive(Default)]
pub struct RequestLedger {
    pending: Mutex<HashMap<i32, oneshot::Sender<Vec<u8>>>>,
}

impl RequestLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `id` and returns the receiver its raw response frame will
    /// arrive on. Fails if `id` is already awaiting a response.
    pub async fn begin(&self, id: i32) -> Result<oneshot::Receiver<Vec<u8>>, RconError> {
        let mut pending = self.pending.lock().await;
        if pending.contains_key(&id) {
            return Err(RconError::DuplicateRequestId(id));
        }
        let (tx, rx) = oneshot::channel();
        pending.insert(id, tx);
        Ok(rx)
    }

    /// Hands an inbound frame to whoever is waiting on `id`. Returns `false`
    /// and changes nothing if nobody is; that is how unrelated inbound
    /// packets (auth responses, stale replies) get filtered out.
    pub async fn complete(&self, id: i32, raw: Vec<u8>) -> bool {
        match self.pending.lock().await.remove(&id) {
            // a send error means the waiter already gave up; the entry is
            // gone either way
            Some(tx) => {
                let _ = tx.send(raw);
                true
            }
            None => false,
        }
    }

    /// Forgets `id` so it can be reused. Called by a waiter that timed out;
    /// a late response for the id will then be silently dropped.
    pub async fn cancel(&self, id: i32) {
        self.pending.lock().await.remove(&id);
    }

    /// Drops every pending entry, failing all waiters immediately. Called
    /// when the connection goes away.
    pub async fn fail_all(&self) {
        self.pending.lock().await.clear();
    }

    pub async fn is_pending(&self, id: i32) -> bool {
        self.pending.lock().await.contains_key(&id)
    }
}
