//! The raft collaborator contract (§6): only the `propose`/`apply` hooks
//! matter to the manager. The replication protocol itself is out of scope.

use async_trait::async_trait;
use snafu::Snafu;

/// Failure surfaced by the raft propose call (timeout, not leader, ...).
#[derive(Debug, Snafu, Clone)]
#[snafu(display("raft propose failed: {}", message))]
pub struct RaftError {
    pub message: String,
}

/// A log entry handed to `propose`/`apply`. Operations serialize themselves
/// to bytes so the real raft library never needs to know the manager's
/// domain types.
pub type LogEntry = Vec<u8>;

/// Hook implemented by the raft library: proposes an entry and, once
/// committed, invokes the registered apply callback exactly once per replica
/// (including on replay after a leader change, so handlers must be
/// idempotent).
#[async_trait]
pub trait RaftHandle: Send + Sync + 'static {
    async fn propose(&self, entry: LogEntry) -> Result<(), RaftError>;
}

/// Single-node stand-in that applies proposals synchronously and in-order,
/// used by tests and the demo binary in place of a real raft group.
pub struct LocalRaft<F> {
    apply: F,
}

impl<F> LocalRaft<F>
where
    F: Fn(LogEntry) -> futures::future::BoxFuture<'static, Result<(), RaftError>>
        + Send
        + Sync
        + 'static,
{
    pub fn new(apply: F) -> Self {
        Self { apply }
    }
}

#[async_trait]
impl<F> RaftHandle for LocalRaft<F>
where
    F: Fn(LogEntry) -> futures::future::BoxFuture<'static, Result<(), RaftError>>
        + Send
        + Sync
        + 'static,
{
    async fn propose(&self, entry: LogEntry) -> Result<(), RaftError> {
        (self.apply)(entry).await
    }
}
