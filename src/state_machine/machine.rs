//! Propose/commit handlers for every mutating operation (§4.3).
//!
//! Ground truth: the teacher's `pool::service::Service` / `node::service`
//! pair of "validate against the Registry, then mutate it" methods, wired
//! the same way here but split explicitly into a `precheck` (runs before
//! `raft.propose`) and a `commit` (runs from the raft apply callback, must
//! tolerate replay).

use super::operations::{AddDiskParams, AddNodeParams, Operation};
use super::pending::PendingEntries;
use crate::config::ManagerConfig;
use crate::error::{
    ChangeDiskStatusNotAllowSnafu, DiskAbnormalOrNotReadOnlySnafu, DiskNotFoundSnafu,
    ManagerError, NodeIsDroppingSnafu, NodeNotFoundSnafu, PersistenceErrorSnafu,
};
use crate::ids::{DiskId, NodeId};
use crate::model::{Disk, DiskStatus, DiskType, HeartbeatExtra, Node, NodeStatus};
use crate::persistence::Persistence;
use crate::store::EntityStore;
use crate::topology::{CopySetConfig, TopologyIndex};
use snafu::{OptionExt, ResultExt};
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{error, info, instrument, warn};

/// Propose/commit handlers for `Operation`, plus the out-of-band heartbeat
/// path. Holds no lock of its own: all mutation goes through `EntityStore`'s
/// and `TopologyIndex`'s locks, acquired in the node -> disk -> topology
/// order required by §5.
pub struct StateMachine {
    store: Arc<EntityStore>,
    topology: Arc<TopologyIndex>,
    persistence: Arc<dyn Persistence>,
    config: Arc<ManagerConfig>,
    pending: PendingEntries,
}

impl StateMachine {
    pub fn new(
        store: Arc<EntityStore>,
        topology: Arc<TopologyIndex>,
        persistence: Arc<dyn Persistence>,
        config: Arc<ManagerConfig>,
    ) -> Self {
        Self { store, topology, persistence, config, pending: PendingEntries::new() }
    }

    pub fn pending(&self) -> &PendingEntries {
        &self.pending
    }

    fn copyset_config(&self) -> CopySetConfig {
        CopySetConfig {
            node_set_cap: self.config.node_set_cap,
            node_set_rack_cap: self.config.node_set_rack_cap,
            disk_set_cap: self.config.disk_set_cap,
            disk_count_per_node_in_disk_set: self.config.disk_count_per_node_in_disk_set,
            rack_aware: self.config.rack_aware,
        }
    }

    // ---- pre-check (rejects early, never mutates) ----------------------

    #[instrument(level = "debug", skip(self), err)]
    pub async fn precheck(&self, op: &Operation) -> Result<(), ManagerError> {
        match op {
            Operation::AddNode(p) => self.precheck_add_node(p).await,
            Operation::AddDisk(p) => self.precheck_add_disk(p).await,
            Operation::SetStatus { disk_id, status } => {
                self.precheck_set_status(*disk_id, *status).await
            }
            Operation::SwitchReadonly { disk_id, .. } => self.precheck_disk_exists(*disk_id).await,
            Operation::DroppingDisk { disk_id } => self.precheck_dropping_disk(*disk_id).await,
            Operation::DroppedDisk { disk_id } => self.precheck_disk_exists(*disk_id).await,
            Operation::DroppingNode { node_id } => self.precheck_dropping_node(*node_id).await,
            Operation::DroppedNode { node_id } => self.precheck_node_exists(*node_id).await,
        }
    }

    async fn precheck_add_node(&self, p: &AddNodeParams) -> Result<(), ManagerError> {
        self.store.check_node_dup(p.node_id, &p.host, p.disk_type).await
    }

    async fn precheck_add_disk(&self, p: &AddDiskParams) -> Result<(), ManagerError> {
        self.store
            .check_disk_dup(p.disk_id, &p.host, &p.path, &p.idc, &p.rack, p.node_id)
            .await
            .map(|_| ())
    }

    async fn precheck_disk_exists(&self, disk_id: DiskId) -> Result<(), ManagerError> {
        self.store.get_disk(disk_id).await.map(|_| ()).context(DiskNotFoundSnafu { disk_id })
    }

    async fn precheck_node_exists(&self, node_id: NodeId) -> Result<(), ManagerError> {
        self.store.get_node(node_id).await.map(|_| ()).context(NodeNotFoundSnafu { node_id })
    }

    async fn precheck_set_status(
        &self,
        disk_id: DiskId,
        new_status: DiskStatus,
    ) -> Result<(), ManagerError> {
        let disk = self.store.get_disk(disk_id).await.context(DiskNotFoundSnafu { disk_id })?;
        let guard = disk.read().await;
        if guard.status == new_status {
            return Ok(());
        }
        if guard.dropping && new_status != DiskStatus::Dropped {
            return ChangeDiskStatusNotAllowSnafu { disk_id, from: guard.status, to: new_status }
                .fail();
        }
        if !guard.status.can_transition_to(new_status) {
            return ChangeDiskStatusNotAllowSnafu { disk_id, from: guard.status, to: new_status }
                .fail();
        }
        Ok(())
    }

    async fn precheck_dropping_disk(&self, disk_id: DiskId) -> Result<(), ManagerError> {
        let disk = self.store.get_disk(disk_id).await.context(DiskNotFoundSnafu { disk_id })?;
        let guard = disk.read().await;
        if guard.dropping {
            return Ok(());
        }
        if guard.status != DiskStatus::Normal || !guard.readonly {
            return DiskAbnormalOrNotReadOnlySnafu { disk_id }.fail();
        }
        Ok(())
    }

    async fn precheck_dropping_node(&self, node_id: NodeId) -> Result<(), ManagerError> {
        let node = self.store.get_node(node_id).await.context(NodeNotFoundSnafu { node_id })?;
        let guard = node.read().await;
        if !guard.status.is_using() {
            return NodeNotFoundSnafu { node_id }.fail();
        }
        if guard.dropping {
            return NodeIsDroppingSnafu { node_id }.fail();
        }
        Ok(())
    }

    // ---- commit (idempotent, replay-tolerant) ---------------------------

    /// Dispatches a committed `Operation` to its handler and resolves its
    /// `pending_entries` key with the result. Wired as the raft apply
    /// callback; failures are logged, never propagated to the caller of
    /// `apply` (§7), except via the pending-entries channel.
    #[instrument(level = "debug", skip(self))]
    pub async fn apply(&self, op: Operation) {
        let op_name = op.op_name();
        let entity_id = op.entity_id();
        let result = self.commit(op).await;
        if let Err(ref e) = result {
            error!(op_name, entity_id, error = %e, "state machine commit failed");
        }
        self.pending.resolve(op_name, entity_id, result.map_err(|e| e.to_string())).await;
    }

    async fn commit(&self, op: Operation) -> Result<(), ManagerError> {
        match op {
            Operation::AddNode(p) => self.commit_add_node(p).await,
            Operation::AddDisk(p) => self.commit_add_disk(p).await,
            Operation::SetStatus { disk_id, status } => {
                self.commit_set_status(disk_id, status).await
            }
            Operation::SwitchReadonly { disk_id, readonly } => {
                self.commit_switch_readonly(disk_id, readonly).await
            }
            Operation::DroppingDisk { disk_id } => self.commit_dropping_disk(disk_id).await,
            Operation::DroppedDisk { disk_id } => self.commit_dropped_disk(disk_id).await,
            Operation::DroppingNode { node_id } => self.commit_dropping_node(node_id).await,
            Operation::DroppedNode { node_id } => self.commit_dropped_node(node_id).await,
        }
    }

    async fn commit_add_node(&self, p: AddNodeParams) -> Result<(), ManagerError> {
        if self.store.get_node(p.node_id).await.is_some() {
            // Replay after a leader change: already applied.
            return Ok(());
        }
        let cfg = self.copyset_config();
        let node_set_id =
            self.topology.alloc_node_set_id(p.disk_type, &p.rack, &cfg).await;

        let mut node = Node::new(p.node_id, p.host, p.idc, p.rack, p.disk_type, p.role);
        node.status = NodeStatus::Normal;
        node.node_set_id = Some(node_set_id);

        self.persistence.update_node_no_locked(&node).await.context(PersistenceErrorSnafu)?;
        let rack = node.rack.clone();
        self.store.insert_node(node).await?;
        self.topology.add_node_to_node_set(p.disk_type, node_set_id, p.node_id, &rack).await;
        info!(node_id = %p.node_id, node_set_id = node_set_id.0, "node added");
        Ok(())
    }

    async fn commit_add_disk(&self, p: AddDiskParams) -> Result<(), ManagerError> {
        let existing = self
            .store
            .check_disk_dup(p.disk_id, &p.host, &p.path, &p.idc, &p.rack, p.node_id)
            .await;

        let locked = match existing {
            Ok(Some(locked)) => {
                // Compatible re-registration: a legacy disk is adopted by
                // its real owning node.
                let snapshot = {
                    let mut guard = locked.write().await;
                    guard.node_id = p.node_id;
                    guard.clone()
                };
                self.persistence.update_disk_no_locked(&snapshot).await.context(PersistenceErrorSnafu)?;
                locked
            }
            Ok(None) => {
                let now = SystemTime::now();
                let disk = Disk {
                    disk_id: p.disk_id,
                    node_id: p.node_id,
                    host: p.host.clone(),
                    path: p.path.clone(),
                    idc: p.idc.clone(),
                    rack: p.rack.clone(),
                    status: DiskStatus::Normal,
                    readonly: false,
                    dropping: false,
                    expire_time: now + self.config.heartbeat_expire_interval,
                    last_expire_time: now,
                    extra: HeartbeatExtra::default(),
                    disk_set_id: None,
                };
                self.persistence.add_disk_no_locked(&disk).await.context(PersistenceErrorSnafu)?;
                self.store.insert_disk(disk).await
            }
            Err(ManagerError::DiskAlreadyExists { .. }) => {
                // Replay: the disk is already fully registered.
                return Ok(());
            }
            Err(other) => return Err(other),
        };

        if let Some(node) = self.store.get_node(p.node_id).await {
            let (node_set_id, disk_type) = {
                let guard = node.read().await;
                (guard.node_set_id, guard.disk_type)
            };
            if let Some(node_set_id) = node_set_id {
                let cfg = self.copyset_config();
                let disk_set_id = self
                    .topology
                    .add_disk_to_disk_set(disk_type, node_set_id, p.disk_id, p.node_id, &p.idc, &cfg)
                    .await;
                locked.write().await.disk_set_id = Some(disk_set_id);
            }
            node.write().await.disks.insert(p.disk_id);
        }
        info!(disk_id = %p.disk_id, node_id = %p.node_id, "disk added");
        Ok(())
    }

    async fn commit_set_status(
        &self,
        disk_id: DiskId,
        new_status: DiskStatus,
    ) -> Result<(), ManagerError> {
        let disk = self.store.get_disk(disk_id).await.context(DiskNotFoundSnafu { disk_id })?;

        let (from, need_filter, host, path, disk_set_id, node_id) = {
            let mut guard = disk.write().await;
            if guard.status == new_status {
                return Ok(());
            }
            if guard.dropping && new_status != DiskStatus::Dropped {
                warn!(%disk_id, "dropping disk rejected a non-Dropped status change on replay");
                return Ok(());
            }
            if !guard.status.can_transition_to(new_status) {
                // A leader already validated this in precheck; on replay a
                // violation here would diverge replicas, so it is a warning
                // rather than a rejected commit (§4.6).
                warn!(%disk_id, from = ?guard.status, to = ?new_status, "ignoring illegal status transition on replay");
                return Ok(());
            }

            if new_status == DiskStatus::Dropped {
                self.persistence.dropped_disk(disk_id).await.context(PersistenceErrorSnafu)?;
            } else {
                self.persistence
                    .update_disk_status_no_locked(disk_id, new_status)
                    .await
                    .context(PersistenceErrorSnafu)?;
            }

            let from = guard.status;
            guard.status = new_status;
            if new_status == DiskStatus::Dropped {
                // SetStatus(Dropped) is reachable directly on a dropping disk
                // (precheck allows the Dropped-jump exception regardless of
                // `dropping`), so the flag must be cleared here too, not only
                // in `commit_dropped_disk` (§3: Dropped implies !dropping).
                guard.dropping = false;
            }
            (from, guard.need_filter(), guard.host.clone(), guard.path.clone(), guard.disk_set_id, guard.node_id)
        };

        if !need_filter {
            self.store.release_disk_host_path(&host, &path).await;
        }
        if new_status == DiskStatus::Dropped {
            if let Some(disk_set_id) = disk_set_id {
                if let Some(node) = self.store.get_node(node_id).await {
                    let disk_type = node.read().await.disk_type;
                    self.topology.remove_disk_from_disk_set(disk_type, disk_set_id, disk_id, node_id).await;
                }
            }
        }
        info!(%disk_id, ?from, to = ?new_status, "disk status changed");
        Ok(())
    }

    async fn commit_switch_readonly(&self, disk_id: DiskId, readonly: bool) -> Result<(), ManagerError> {
        let disk = self.store.get_disk(disk_id).await.context(DiskNotFoundSnafu { disk_id })?;

        let previous = {
            let mut guard = disk.write().await;
            let previous = guard.readonly;
            guard.readonly = readonly;
            previous
        };

        let snapshot = disk.read().await.clone();
        if let Err(source) = self.persistence.update_disk_no_locked(&snapshot).await {
            // Roll back the in-memory bit: the durable write is the source
            // of truth and must not silently diverge from it.
            disk.write().await.readonly = previous;
            return Err(ManagerError::PersistenceError { source });
        }
        info!(%disk_id, readonly, "disk readonly bit switched");
        Ok(())
    }

    async fn commit_dropping_disk(&self, disk_id: DiskId) -> Result<(), ManagerError> {
        let disk = self.store.get_disk(disk_id).await.context(DiskNotFoundSnafu { disk_id })?;

        let (already, eligible) = {
            let guard = disk.read().await;
            (guard.dropping, guard.status == DiskStatus::Normal && guard.readonly)
        };
        if already {
            return Ok(());
        }
        if !eligible {
            warn!(%disk_id, "ignoring DroppingDisk on replay: preconditions no longer hold");
            return Ok(());
        }

        self.persistence.add_dropping_disk(disk_id).await.context(PersistenceErrorSnafu)?;
        let (disk_set_id, node_id) = {
            let mut guard = disk.write().await;
            guard.dropping = true;
            (guard.disk_set_id, guard.node_id)
        };
        if let Some(disk_set_id) = disk_set_id {
            if let Some(node) = self.store.get_node(node_id).await {
                let disk_type = node.read().await.disk_type;
                self.topology.remove_disk_from_disk_set(disk_type, disk_set_id, disk_id, node_id).await;
            }
        }
        info!(%disk_id, "disk marked dropping");
        Ok(())
    }

    async fn commit_dropped_disk(&self, disk_id: DiskId) -> Result<(), ManagerError> {
        let is_dropping =
            self.persistence.is_dropping_disk(disk_id).await.context(PersistenceErrorSnafu)?;
        if !is_dropping {
            // Concurrently dropped through another path; nothing to do.
            return Ok(());
        }
        self.commit_set_status(disk_id, DiskStatus::Dropped).await?;
        if let Some(disk) = self.store.get_disk(disk_id).await {
            disk.write().await.dropping = false;
        }
        Ok(())
    }

    async fn commit_dropping_node(&self, node_id: NodeId) -> Result<(), ManagerError> {
        let node = self.store.get_node(node_id).await.context(NodeNotFoundSnafu { node_id })?;

        let (already, using) = {
            let guard = node.read().await;
            (guard.dropping, guard.status.is_using())
        };
        if already || !using {
            return Ok(());
        }

        // Snapshot the disk-id list under the node's read lock, then release
        // it before touching any disk lock, per §5's lock ordering.
        let disk_ids: Vec<DiskId> = node.read().await.disks.iter().copied().collect();

        for disk_id in disk_ids {
            let Some(disk) = self.store.get_disk(disk_id).await else { continue };
            let is_normal = disk.read().await.status == DiskStatus::Normal;
            if !is_normal {
                continue;
            }
            // SwitchReadonly+DroppingDisk is normally a two-step operator
            // action; a node-level drain forces readonly first so the
            // DroppingDisk precondition is met.
            disk.write().await.readonly = true;
            if let Err(e) = self.commit_dropping_disk(disk_id).await {
                warn!(%disk_id, error = %e, "failed to cascade DroppingDisk during node drain");
            }
        }

        self.persistence.add_dropping_node(node_id).await.context(PersistenceErrorSnafu)?;
        node.write().await.dropping = true;
        info!(%node_id, "node marked dropping");
        Ok(())
    }

    async fn commit_dropped_node(&self, node_id: NodeId) -> Result<(), ManagerError> {
        let node = self.store.get_node(node_id).await.context(NodeNotFoundSnafu { node_id })?;

        let disk_ids: Vec<DiskId> = node.read().await.disks.iter().copied().collect();
        for disk_id in disk_ids {
            if let Some(disk) = self.store.get_disk(disk_id).await {
                if disk.read().await.need_filter() {
                    // At least one disk is still in use; the drop cannot
                    // proceed yet. This flows from the apply path, so it is
                    // logged rather than returned as an error (§9).
                    warn!(%node_id, %disk_id, "DroppedNode aborted: disk still in use");
                    return Ok(());
                }
            }
        }

        self.persistence.dropped_node(node_id).await.context(PersistenceErrorSnafu)?;
        let disk_type = {
            let mut guard = node.write().await;
            guard.status = NodeStatus::Dropped;
            guard.dropping = false;
            guard.disk_type
        };
        if let Some(node_set_id) = node.read().await.node_set_id {
            let rack = node.read().await.rack.clone();
            self.topology.remove_node_from_node_set(disk_type, node_set_id, node_id, &rack).await;
        }
        info!(%node_id, "node dropped");
        Ok(())
    }

    // ---- heartbeat (bypasses propose; see module docs) ------------------

    /// Applies a heartbeat directly to the owning disk's lock, without going
    /// through raft (§4.3).
    #[instrument(level = "debug", skip(self, extra), err)]
    pub async fn apply_heartbeat(&self, disk_id: DiskId, extra: HeartbeatExtra) -> Result<(), ManagerError> {
        let disk = self.store.get_disk(disk_id).await.context(DiskNotFoundSnafu { disk_id })?;
        disk.write().await.refresh_heartbeat(extra, self.config.heartbeat_expire_interval);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{DiskId, NodeId};
    use crate::model::NodeRole;
    use crate::persistence::InMemoryPersistence;

    fn machine() -> StateMachine {
        StateMachine::new(
            Arc::new(EntityStore::new()),
            Arc::new(TopologyIndex::new()),
            Arc::new(InMemoryPersistence::default()),
            Arc::new(ManagerConfig::default()),
        )
    }

    fn machine_with_persistence() -> (StateMachine, Arc<InMemoryPersistence>) {
        let persistence = Arc::new(InMemoryPersistence::default());
        let sm = StateMachine::new(
            Arc::new(EntityStore::new()),
            Arc::new(TopologyIndex::new()),
            persistence.clone(),
            Arc::new(ManagerConfig::default()),
        );
        (sm, persistence)
    }

    async fn add_node(sm: &StateMachine, node_id: u32, host: &str, rack: &str) {
        let op = Operation::AddNode(AddNodeParams {
            node_id: NodeId(node_id),
            host: host.into(),
            idc: "z0".into(),
            rack: rack.into(),
            disk_type: DiskType::Hdd,
            role: NodeRole::Storage,
        });
        sm.precheck(&op).await.unwrap();
        sm.commit(op).await.unwrap();
    }

    async fn add_disk(sm: &StateMachine, disk_id: u32, node_id: u32, host: &str, path: &str) {
        let op = Operation::AddDisk(AddDiskParams {
            disk_id: DiskId(disk_id),
            node_id: NodeId(node_id),
            host: host.into(),
            path: path.into(),
            idc: "z0".into(),
            rack: "r1".into(),
        });
        sm.precheck(&op).await.unwrap();
        sm.commit(op).await.unwrap();
    }

    #[tokio::test]
    async fn add_and_drop_a_disk_end_to_end() {
        let sm = machine();
        add_node(&sm, 1, "h1", "r1").await;
        add_disk(&sm, 10, 1, "h1", "/d1").await;

        sm.commit_switch_readonly(DiskId(10), true).await.unwrap();
        sm.commit_dropping_disk(DiskId(10)).await.unwrap();
        sm.commit_dropped_disk(DiskId(10)).await.unwrap();

        let disk = sm.store.get_disk(DiskId(10)).await.unwrap();
        let guard = disk.read().await;
        assert_eq!(guard.status, DiskStatus::Dropped);
        assert!(!guard.dropping);
        assert!(!sm.store.disk_host_path_contains("h1", "/d1").await);
    }

    #[tokio::test]
    async fn reject_backward_status() {
        let sm = machine();
        add_node(&sm, 1, "h1", "r1").await;
        add_disk(&sm, 10, 1, "h1", "/d1").await;
        sm.commit_set_status(DiskId(10), DiskStatus::Broken).await.unwrap();
        sm.commit_set_status(DiskId(10), DiskStatus::Repairing).await.unwrap();

        let err = sm
            .precheck(&Operation::SetStatus { disk_id: DiskId(10), status: DiskStatus::Normal })
            .await
            .unwrap_err();
        assert!(matches!(err, ManagerError::ChangeDiskStatusNotAllow { .. }));
    }

    #[tokio::test]
    async fn reject_non_adjacent_forward_but_allow_dropped_jump() {
        let sm = machine();
        add_node(&sm, 1, "h1", "r1").await;
        add_disk(&sm, 10, 1, "h1", "/d1").await;

        let err = sm
            .precheck(&Operation::SetStatus { disk_id: DiskId(10), status: DiskStatus::Repairing })
            .await
            .unwrap_err();
        assert!(matches!(err, ManagerError::ChangeDiskStatusNotAllow { .. }));

        sm.precheck(&Operation::SetStatus { disk_id: DiskId(10), status: DiskStatus::Dropped })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn duplicate_host_path_is_rejected_at_precheck() {
        let sm = machine();
        add_node(&sm, 1, "h1", "r1").await;
        add_disk(&sm, 10, 1, "h1", "/d1").await;

        let op = Operation::AddDisk(AddDiskParams {
            disk_id: DiskId(11),
            node_id: NodeId(1),
            host: "h1".into(),
            path: "/d1".into(),
            idc: "z0".into(),
            rack: "r1".into(),
        });
        let err = sm.precheck(&op).await.unwrap_err();
        assert!(matches!(err, ManagerError::IllegalArgumentDiskPath { .. }));
    }

    #[tokio::test]
    async fn dropping_node_cascades_to_its_disks() {
        let sm = machine();
        add_node(&sm, 1, "h1", "r1").await;
        add_disk(&sm, 10, 1, "h1", "/d1").await;
        add_disk(&sm, 11, 1, "h1", "/d2").await;

        sm.commit_dropping_node(NodeId(1)).await.unwrap();

        for id in [10u32, 11] {
            let disk = sm.store.get_disk(DiskId(id)).await.unwrap();
            assert!(disk.read().await.dropping);
        }
        assert!(sm.store.get_node(NodeId(1)).await.unwrap().read().await.dropping);
    }

    #[tokio::test]
    async fn commit_is_idempotent_on_replay() {
        let sm = machine();
        add_node(&sm, 1, "h1", "r1").await;
        add_disk(&sm, 10, 1, "h1", "/d1").await;

        // Replaying AddNode/AddDisk must not error or duplicate state.
        add_node(&sm, 1, "h1", "r1").await;
        let op = Operation::AddDisk(AddDiskParams {
            disk_id: DiskId(10),
            node_id: NodeId(1),
            host: "h1".into(),
            path: "/d1".into(),
            idc: "z0".into(),
            rack: "r1".into(),
        });
        sm.commit(op).await.unwrap();
    }

    #[tokio::test]
    async fn set_status_dropped_clears_the_dropping_flag() {
        let sm = machine();
        add_node(&sm, 1, "h1", "r1").await;
        add_disk(&sm, 10, 1, "h1", "/d1").await;

        sm.commit_switch_readonly(DiskId(10), true).await.unwrap();
        sm.commit_dropping_disk(DiskId(10)).await.unwrap();
        // SetStatus(Dropped) is reachable directly on a dropping disk,
        // bypassing DroppedDisk entirely.
        sm.commit_set_status(DiskId(10), DiskStatus::Dropped).await.unwrap();

        let disk = sm.store.get_disk(DiskId(10)).await.unwrap();
        let guard = disk.read().await;
        assert_eq!(guard.status, DiskStatus::Dropped);
        assert!(!guard.dropping);
    }

    #[tokio::test]
    async fn legacy_disk_adoption_is_persisted() {
        let (sm, persistence) = machine_with_persistence();
        add_node(&sm, 1, "h1", "r1").await;

        let now = SystemTime::now();
        let legacy = Disk {
            disk_id: DiskId(10),
            node_id: crate::ids::INVALID_NODE,
            host: "h1".into(),
            path: "/d1".into(),
            idc: "z0".into(),
            rack: "r1".into(),
            status: DiskStatus::Normal,
            readonly: false,
            dropping: false,
            expire_time: now + std::time::Duration::from_secs(30),
            last_expire_time: now,
            extra: HeartbeatExtra::default(),
            disk_set_id: None,
        };
        sm.store.insert_disk(legacy).await;

        let op = Operation::AddDisk(AddDiskParams {
            disk_id: DiskId(10),
            node_id: NodeId(1),
            host: "h1".into(),
            path: "/d1".into(),
            idc: "z0".into(),
            rack: "r1".into(),
        });
        sm.precheck(&op).await.unwrap();
        sm.commit(op).await.unwrap();

        let disk = sm.store.get_disk(DiskId(10)).await.unwrap();
        assert_eq!(disk.read().await.node_id, NodeId(1));

        let persisted = persistence.get_disk(DiskId(10)).await.unwrap();
        assert_eq!(persisted.node_id, NodeId(1));
    }
}
