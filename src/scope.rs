//! The `ScopeAllocator` collaborator contract (§6): monotonic ID issuance.

use async_trait::async_trait;
use snafu::Snafu;
use std::sync::atomic::{AtomicU32, Ordering};

/// Failure surfaced by the scope/ID allocator.
#[derive(Debug, Snafu, Clone)]
#[snafu(display("scope allocation error: {}", message))]
pub struct ScopeError {
    pub message: String,
}

/// Issues monotonically increasing id ranges for a named scope (e.g.
/// `"diskid"`, `"nodeid"`).
#[async_trait]
pub trait ScopeAllocator: Send + Sync + 'static {
    /// Returns a range `[base+1, top]` of freshly allocated ids.
    async fn alloc(&self, scope_name: &str, count: u32) -> Result<(u32, u32), ScopeError>;
}

/// Simple in-process allocator keyed by scope name, sufficient for tests and
/// single-node demos. A real deployment proposes the range through raft so
/// every replica agrees on the allocation.
#[derive(Default)]
pub struct SequentialScopeAllocator {
    disk_counter: AtomicU32,
    node_counter: AtomicU32,
}

#[async_trait]
impl ScopeAllocator for SequentialScopeAllocator {
    async fn alloc(&self, scope_name: &str, count: u32) -> Result<(u32, u32), ScopeError> {
        let counter = match scope_name {
            "diskid" => &self.disk_counter,
            "nodeid" => &self.node_counter,
            other => {
                return Err(ScopeError {
                    message: format!("unknown scope '{}'", other),
                })
            }
        };
        let base = counter.fetch_add(count, Ordering::SeqCst);
        Ok((base, base + count))
    }
}
