//! `EntityStore`: the authoritative in-memory index of disks and nodes.
//!
//! Ground truth: `agents/core/src/core/registry.rs` and
//! `agents/core/src/core/wrapper.rs` in the teacher, which hold a
//! `RwLock<HashMap<NodeId, Arc<Mutex<NodeWrapper>>>>` as the single source of
//! truth and wrap each entity in its own lock. Here the locking order from
//! §4.1/§5 additionally requires disks and nodes to carry independent
//! reader-writer locks rather than sharing one per-node mutex.

use crate::error::{
    DiskAlreadyExistsSnafu, IllegalArgumentDiskPathSnafu, IllegalArgumentNodeHostSnafu,
    ManagerError, NodeAlreadyExistsSnafu,
};
use crate::ids::{DiskId, NodeId};
use crate::model::{Disk, DiskStatus, DiskType, Node, NodeStatus};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Filter criteria for [`EntityStore::list_disks`], mirroring the teacher's
/// `mbus_api::v0::Filter` pattern (`Filter::Node`/`Filter::Pool`) adapted to
/// disks. `None` fields are unconstrained.
#[derive(Debug, Clone, Default)]
pub struct DiskFilter {
    pub status: Option<DiskStatus>,
    pub idc: Option<String>,
    pub rack: Option<String>,
    pub node_id: Option<NodeId>,
}

impl DiskFilter {
    fn matches(&self, disk: &Disk) -> bool {
        self.status.map_or(true, |s| disk.status == s)
            && self.idc.as_deref().map_or(true, |idc| disk.idc == idc)
            && self.rack.as_deref().map_or(true, |rack| disk.rack == rack)
            && self.node_id.map_or(true, |n| disk.node_id == n)
    }
}

/// Filter criteria for [`EntityStore::list_nodes`].
#[derive(Debug, Clone, Default)]
pub struct NodeFilter {
    pub status: Option<NodeStatus>,
    pub idc: Option<String>,
    pub rack: Option<String>,
    pub disk_type: Option<DiskType>,
}

impl NodeFilter {
    fn matches(&self, node: &Node) -> bool {
        self.status.map_or(true, |s| node.status == s)
            && self.idc.as_deref().map_or(true, |idc| node.idc == idc)
            && self.rack.as_deref().map_or(true, |rack| node.rack == rack)
            && self.disk_type.map_or(true, |t| node.disk_type == t)
    }
}

/// A disk behind its own reader-writer lock, shared (not cloned) by callers.
pub type LockedDisk = Arc<RwLock<crate::model::Disk>>;
/// A node behind its own reader-writer lock, shared (not cloned) by callers.
pub type LockedNode = Arc<RwLock<Node>>;

#[derive(Default)]
struct Identity {
    all_disks: HashMap<DiskId, LockedDisk>,
    all_nodes: HashMap<NodeId, LockedNode>,
}

/// In-memory index over every `Disk` and `Node`, plus the host/path
/// uniqueness filter described in §4.1.
pub struct EntityStore {
    /// `meta_lock`: protects only the identity maps' shape (insert/remove),
    /// not the entities' fields — those use their own lock.
    meta_lock: RwLock<Identity>,
    /// `(host, path) -> disk_id` for every disk that `need_filter()`.
    disk_host_path: RwLock<HashMap<(String, String), DiskId>>,
    /// `(host, disk_type) -> node_id` for every non-dropped node.
    node_host_type: RwLock<HashMap<(String, DiskType), NodeId>>,
}

impl Default for EntityStore {
    fn default() -> Self {
        Self {
            meta_lock: RwLock::new(Identity::default()),
            disk_host_path: RwLock::new(HashMap::new()),
            node_host_type: RwLock::new(HashMap::new()),
        }
    }
}

impl EntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// O(1) read-lock lookup.
    pub async fn get_disk(&self, disk_id: DiskId) -> Option<LockedDisk> {
        self.meta_lock.read().await.all_disks.get(&disk_id).cloned()
    }

    /// O(1) read-lock lookup.
    pub async fn get_node(&self, node_id: NodeId) -> Option<LockedNode> {
        self.meta_lock.read().await.all_nodes.get(&node_id).cloned()
    }

    /// Shallow copy of every disk handle; the disks themselves are shared,
    /// not cloned, so callers can iterate without holding the store lock.
    pub async fn all_disks_snapshot(&self) -> Vec<LockedDisk> {
        self.meta_lock.read().await.all_disks.values().cloned().collect()
    }

    /// Shallow copy of every node handle.
    pub async fn all_nodes_snapshot(&self) -> Vec<LockedNode> {
        self.meta_lock.read().await.all_nodes.values().cloned().collect()
    }

    /// Disks matching `filter`, cloned out from under their locks (§10.5).
    pub async fn list_disks(&self, filter: &DiskFilter) -> Vec<Disk> {
        let mut out = Vec::new();
        for disk in self.all_disks_snapshot().await {
            let guard = disk.read().await;
            if filter.matches(&guard) {
                out.push(guard.clone());
            }
        }
        out
    }

    /// Nodes matching `filter`, cloned out from under their locks (§10.5).
    pub async fn list_nodes(&self, filter: &NodeFilter) -> Vec<Node> {
        let mut out = Vec::new();
        for node in self.all_nodes_snapshot().await {
            let guard = node.read().await;
            if filter.matches(&guard) {
                out.push(guard.clone());
            }
        }
        out
    }

    /// Checks whether `disk_id` may be added for `node_id` at `(host, path,
    /// idc, rack)`.
    ///
    /// Returns:
    /// - `Ok(None)` — the disk does not yet exist and its `(host, path)` is
    ///   free: the caller should insert it.
    /// - `Ok(Some(existing))` — a "compatible re-registration": an existing
    ///   disk with `node_id = INVALID_NODE` is being re-claimed by a real
    ///   node at the same locality; no changes are required.
    /// - `Err(DiskAlreadyExists)` — the id exists and is not a compatible
    ///   re-registration.
    /// - `Err(IllegalArgumentDiskPath)` — `(host, path)` is already claimed
    ///   by a different disk id.
    pub async fn check_disk_dup(
        &self,
        disk_id: DiskId,
        host: &str,
        path: &str,
        idc: &str,
        rack: &str,
        node_id: NodeId,
    ) -> Result<Option<LockedDisk>, ManagerError> {
        if let Some(existing) = self.get_disk(disk_id).await {
            let guard = existing.read().await;
            let compatible = guard.node_id.is_invalid()
                && !node_id.is_invalid()
                && guard.host == host
                && guard.idc == idc
                && guard.rack == rack;
            drop(guard);
            return if compatible {
                Ok(Some(existing))
            } else {
                DiskAlreadyExistsSnafu { disk_id }.fail()
            };
        }
        let filter = self.disk_host_path.read().await;
        if filter.contains_key(&(host.to_string(), path.to_string())) {
            return IllegalArgumentDiskPathSnafu {
                host: host.to_string(),
                path: path.to_string(),
            }
            .fail();
        }
        Ok(None)
    }

    /// Registers a brand-new disk: inserts it into the identity map and
    /// claims its `(host, path)` slot. Callers must have already validated
    /// uniqueness via [`Self::check_disk_dup`].
    pub async fn insert_disk(&self, disk: crate::model::Disk) -> LockedDisk {
        let disk_id = disk.disk_id;
        let key = (disk.host.clone(), disk.path.clone());
        let locked = Arc::new(RwLock::new(disk));
        self.meta_lock.write().await.all_disks.insert(disk_id, locked.clone());
        self.disk_host_path.write().await.insert(key, disk_id);
        locked
    }

    /// Checks whether `node_id` may be added at `(host, disk_type)`, without
    /// mutating anything. Unlike [`Self::check_disk_dup`], a node has no
    /// "compatible re-registration" case: an existing id is always a
    /// conflict.
    pub async fn check_node_dup(
        &self,
        node_id: NodeId,
        host: &str,
        disk_type: DiskType,
    ) -> Result<(), ManagerError> {
        if self.get_node(node_id).await.is_some() {
            return NodeAlreadyExistsSnafu { node_id }.fail();
        }
        let host_type = self.node_host_type.read().await;
        if let Some(existing) = host_type.get(&(host.to_string(), disk_type)) {
            if *existing != node_id {
                return IllegalArgumentNodeHostSnafu { host: host.to_string(), disk_type }.fail();
            }
        }
        Ok(())
    }

    /// Registers a brand-new node, claiming its `(host, disk_type)` slot.
    pub async fn insert_node(&self, node: Node) -> Result<LockedNode, ManagerError> {
        let key = (node.host.clone(), node.disk_type);
        let mut host_type = self.node_host_type.write().await;
        if let Some(existing) = host_type.get(&key) {
            if *existing != node.node_id {
                return crate::error::IllegalArgumentNodeHostSnafu {
                    host: node.host.clone(),
                    disk_type: node.disk_type,
                }
                .fail();
            }
        }
        let node_id = node.node_id;
        host_type.insert(key, node_id);
        drop(host_type);
        let locked = Arc::new(RwLock::new(node));
        self.meta_lock.write().await.all_nodes.insert(node_id, locked.clone());
        Ok(locked)
    }

    /// Removes a disk's `(host, path)` claim once it is no longer
    /// filterable (Repaired or Dropped). Idempotent.
    pub async fn release_disk_host_path(&self, host: &str, path: &str) {
        self.disk_host_path
            .write()
            .await
            .remove(&(host.to_string(), path.to_string()));
    }

    /// Whether `(host, path)` is currently claimed by a filterable disk.
    pub async fn disk_host_path_contains(&self, host: &str, path: &str) -> bool {
        self.disk_host_path
            .read()
            .await
            .contains_key(&(host.to_string(), path.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BlobNodeHeartbeat, Disk, DiskStatus, HeartbeatExtra};
    use std::time::{Duration, SystemTime};

    fn sample_disk(id: u32, host: &str, path: &str, node: u32) -> Disk {
        Disk {
            disk_id: DiskId(id),
            node_id: NodeId(node),
            host: host.into(),
            path: path.into(),
            idc: "z0".into(),
            rack: "r1".into(),
            status: DiskStatus::Normal,
            readonly: false,
            dropping: false,
            expire_time: SystemTime::now() + Duration::from_secs(30),
            last_expire_time: SystemTime::now(),
            extra: HeartbeatExtra::BlobNode(BlobNodeHeartbeat::default()),
            disk_set_id: None,
        }
    }

    #[tokio::test]
    async fn duplicate_host_path_is_rejected() {
        let store = EntityStore::new();
        let d1 = sample_disk(10, "h1", "/d1", 1);
        assert!(store.check_disk_dup(d1.disk_id, &d1.host, &d1.path, &d1.idc, &d1.rack, d1.node_id)
            .await
            .unwrap()
            .is_none());
        store.insert_disk(d1).await;

        let err = store
            .check_disk_dup(DiskId(11), "h1", "/d1", "z0", "r1", NodeId(2))
            .await
            .unwrap_err();
        assert!(matches!(err, ManagerError::IllegalArgumentDiskPath { .. }));
    }

    #[tokio::test]
    async fn legacy_disk_compatible_reregistration() {
        let store = EntityStore::new();
        let mut legacy = sample_disk(10, "h1", "/d1", 0);
        legacy.node_id = crate::ids::INVALID_NODE;
        store.insert_disk(legacy).await;

        let result = store
            .check_disk_dup(DiskId(10), "h1", "/d1", "z0", "r1", NodeId(7))
            .await
            .unwrap();
        assert!(result.is_some());
    }

    #[tokio::test]
    async fn list_disks_filters_by_idc_and_status() {
        let store = EntityStore::new();
        let mut broken = sample_disk(20, "h2", "/d2", 1);
        broken.status = DiskStatus::Broken;
        broken.idc = "z1".into();
        store.insert_disk(sample_disk(10, "h1", "/d1", 1)).await;
        store.insert_disk(broken).await;

        let normal_in_z0 = store
            .list_disks(&DiskFilter { status: Some(DiskStatus::Normal), idc: Some("z0".into()), ..Default::default() })
            .await;
        assert_eq!(normal_in_z0.len(), 1);
        assert_eq!(normal_in_z0[0].disk_id, DiskId(10));

        let broken_disks = store
            .list_disks(&DiskFilter { status: Some(DiskStatus::Broken), ..Default::default() })
            .await;
        assert_eq!(broken_disks.len(), 1);
        assert_eq!(broken_disks[0].disk_id, DiskId(20));
    }

    #[tokio::test]
    async fn mismatched_locality_is_not_compatible() {
        let store = EntityStore::new();
        let mut legacy = sample_disk(10, "h1", "/d1", 0);
        legacy.node_id = crate::ids::INVALID_NODE;
        store.insert_disk(legacy).await;

        let err = store
            .check_disk_dup(DiskId(10), "h1", "/d1", "other-idc", "r1", NodeId(7))
            .await
            .unwrap_err();
        assert!(matches!(err, ManagerError::DiskAlreadyExists { .. }));
    }
}
