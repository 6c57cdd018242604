//! `pending_entries`: bridges the synchronous RPC caller and the
//! asynchronous raft apply path (§9).
//!
//! A caller registers a key before proposing, then awaits the returned
//! receiver; the apply handler resolves the same key once the commit
//! handler has run (including on log replay after a leader change).

use std::collections::HashMap;
use tokio::sync::{oneshot, Mutex};

type Key = (String, u32);

/// `{(op_type, entity_id) -> Result}` with per-key notification.
#[derive(Default)]
pub struct PendingEntries {
    inner: Mutex<HashMap<Key, oneshot::Sender<Result<(), String>>>>,
}

impl PendingEntries {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers interest in `(op_name, entity_id)`, returning a receiver
    /// that resolves once the matching commit runs. Must be called before
    /// the corresponding `propose`, or the resolution may race ahead of it.
    pub async fn register(&self, op_name: &str, entity_id: u32) -> oneshot::Receiver<Result<(), String>> {
        let (tx, rx) = oneshot::channel();
        self.inner.lock().await.insert((op_name.to_string(), entity_id), tx);
        rx
    }

    /// Delivers `result` to whoever registered `(op_name, entity_id)`, if
    /// anyone did. A commit with no registered waiter (e.g. replay on a
    /// follower that never originated the request) is a silent no-op.
    pub async fn resolve(&self, op_name: &str, entity_id: u32, result: Result<(), String>) {
        if let Some(tx) = self.inner.lock().await.remove(&(op_name.to_string(), entity_id)) {
            let _ = tx.send(result);
        }
    }
}
