//! The `Persistence` collaborator contract (§6).
//!
//! The manager treats the durable key-value backend as opaque: this module
//! only defines the trait boundary and, for tests, an in-memory fake. The
//! real rocksdb-backed implementation is out of scope for this crate.

use crate::ids::{DiskId, NodeId};
use crate::model::{Disk, DiskStatus, Node};
use async_trait::async_trait;
use snafu::Snafu;
use std::collections::{HashMap, HashSet};
use tokio::sync::Mutex;

/// Failure surfaced by the persistence backend.
#[derive(Debug, Snafu, Clone)]
#[snafu(display("persistence backend error: {}", message))]
pub struct PersistError {
    pub message: String,
}

impl PersistError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

/// Durable single-entity writes the state machine depends on.
///
/// Each call is a synchronous-from-the-caller's-perspective, durable write;
/// consistency between multiple calls is not required (callers that need
/// atomicity across several keys make that correctness argument themselves).
#[async_trait]
pub trait Persistence: Send + Sync + 'static {
    async fn add_disk_no_locked(&self, disk: &Disk) -> Result<(), PersistError>;
    async fn update_disk_no_locked(&self, disk: &Disk) -> Result<(), PersistError>;
    async fn update_disk_status_no_locked(
        &self,
        disk_id: DiskId,
        status: DiskStatus,
    ) -> Result<(), PersistError>;
    async fn update_node_no_locked(&self, node: &Node) -> Result<(), PersistError>;
    async fn add_dropping_disk(&self, disk_id: DiskId) -> Result<(), PersistError>;
    async fn add_dropping_node(&self, node_id: NodeId) -> Result<(), PersistError>;
    async fn is_dropping_disk(&self, disk_id: DiskId) -> Result<bool, PersistError>;
    async fn is_dropping_node(&self, node_id: NodeId) -> Result<bool, PersistError>;
    async fn dropped_disk(&self, disk_id: DiskId) -> Result<(), PersistError>;
    async fn dropped_node(&self, node_id: NodeId) -> Result<(), PersistError>;
}

/// In-memory stand-in used by tests and the demo binary.
#[derive(Default)]
pub struct InMemoryPersistence {
    dropping_disks: Mutex<HashSet<DiskId>>,
    dropping_nodes: Mutex<HashSet<NodeId>>,
    disks: Mutex<HashMap<DiskId, Disk>>,
    nodes: Mutex<HashMap<NodeId, Node>>,
}

impl InMemoryPersistence {
    /// Snapshot of a persisted disk record, for tests asserting that a
    /// mutation was actually written through.
    pub async fn get_disk(&self, disk_id: DiskId) -> Option<Disk> {
        self.disks.lock().await.get(&disk_id).cloned()
    }
}

#[async_trait]
impl Persistence for InMemoryPersistence {
    async fn add_disk_no_locked(&self, disk: &Disk) -> Result<(), PersistError> {
        self.disks.lock().await.insert(disk.disk_id, disk.clone());
        Ok(())
    }

    async fn update_disk_no_locked(&self, disk: &Disk) -> Result<(), PersistError> {
        self.disks.lock().await.insert(disk.disk_id, disk.clone());
        Ok(())
    }

    async fn update_disk_status_no_locked(
        &self,
        disk_id: DiskId,
        status: DiskStatus,
    ) -> Result<(), PersistError> {
        if let Some(disk) = self.disks.lock().await.get_mut(&disk_id) {
            disk.status = status;
        }
        Ok(())
    }

    async fn update_node_no_locked(&self, node: &Node) -> Result<(), PersistError> {
        self.nodes.lock().await.insert(node.node_id, node.clone());
        Ok(())
    }

    async fn add_dropping_disk(&self, disk_id: DiskId) -> Result<(), PersistError> {
        self.dropping_disks.lock().await.insert(disk_id);
        Ok(())
    }

    async fn add_dropping_node(&self, node_id: NodeId) -> Result<(), PersistError> {
        self.dropping_nodes.lock().await.insert(node_id);
        Ok(())
    }

    async fn is_dropping_disk(&self, disk_id: DiskId) -> Result<bool, PersistError> {
        Ok(self.dropping_disks.lock().await.contains(&disk_id))
    }

    async fn is_dropping_node(&self, node_id: NodeId) -> Result<bool, PersistError> {
        Ok(self.dropping_nodes.lock().await.contains(&node_id))
    }

    async fn dropped_disk(&self, disk_id: DiskId) -> Result<(), PersistError> {
        self.dropping_disks.lock().await.remove(&disk_id);
        Ok(())
    }

    async fn dropped_node(&self, node_id: NodeId) -> Result<(), PersistError> {
        self.dropping_nodes.lock().await.remove(&node_id);
        Ok(())
    }
}
