//! `Manager`: the top-level facade wiring every component together (§2, §5).
//!
//! Ground truth: the teacher's `core::server` binding a `Registry` plus its
//! background poller into one long-lived handle with a `close()` lifecycle.
//! Here the same shape wraps `EntityStore` + `TopologyIndex` + `StateMachine`
//! + `Allocator` + `HeartbeatMonitor` around the `Persistence`/`ScopeAllocator`
//! collaborators, with an in-process `LocalRaft` standing in for the real
//! replication library (out of scope, §1).

use crate::allocator::Allocator;
use crate::config::ManagerConfig;
use crate::error::{ManagerError, RaftErrorSnafu, ScopeErrorSnafu};
use crate::heartbeat::{HeartbeatEvent, HeartbeatMonitor};
use crate::ids::{DiskId, NodeId};
use crate::model::{Disk, DiskStatus, DiskType, HeartbeatExtra, Node, NodeRole};
use crate::persistence::Persistence;
use crate::raft::{LocalRaft, LogEntry, RaftError, RaftHandle};
use crate::scope::ScopeAllocator;
use crate::state_machine::{AddDiskParams, AddNodeParams, Operation, StateMachine};
use crate::store::{DiskFilter, EntityStore, NodeFilter};
use crate::topology::TopologyIndex;
use snafu::ResultExt;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// The replicated disk & node manager. Cloning is not supported; share it
/// behind an `Arc` (returned by [`Manager::new`]) across tasks instead.
pub struct Manager {
    config: Arc<ManagerConfig>,
    store: Arc<EntityStore>,
    state_machine: Arc<StateMachine>,
    allocator: Allocator,
    heartbeat: Arc<HeartbeatMonitor>,
    scope: Arc<dyn ScopeAllocator>,
    raft: Arc<dyn RaftHandle>,
    heartbeat_events_rx: Mutex<mpsc::UnboundedReceiver<HeartbeatEvent>>,
    heartbeat_events_tx: mpsc::UnboundedSender<HeartbeatEvent>,
    shutdown: broadcast::Sender<()>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    /// Cancels any in-flight `propose` call on `close()`, so a pending RPC
    /// handler doesn't hang waiting on a commit that will never arrive (§5).
    cancel: CancellationToken,
}

impl Manager {
    /// Builds a manager around the given collaborators, with an in-process
    /// single-node raft stand-in (see module docs). `persistence` and
    /// `scope` are the real durable backends in production; tests typically
    /// pass [`crate::persistence::InMemoryPersistence`] and
    /// [`crate::scope::SequentialScopeAllocator`].
    pub fn new(
        config: ManagerConfig,
        persistence: Arc<dyn Persistence>,
        scope: Arc<dyn ScopeAllocator>,
    ) -> Arc<Self> {
        let config = Arc::new(config);
        let store = Arc::new(EntityStore::new());
        let topology = Arc::new(TopologyIndex::new());
        let state_machine =
            Arc::new(StateMachine::new(store.clone(), topology, persistence, config.clone()));

        let apply_sm = state_machine.clone();
        let raft: Arc<dyn RaftHandle> = Arc::new(LocalRaft::new(move |entry: LogEntry| {
            let sm = apply_sm.clone();
            Box::pin(async move {
                let op: Operation = serde_json::from_slice(&entry).map_err(|e| RaftError {
                    message: format!("malformed log entry: {}", e),
                })?;
                sm.apply(op).await;
                Ok(())
            })
        }));

        let allocator = Allocator::new(config.clone());
        let heartbeat = Arc::new(HeartbeatMonitor::new(config.heartbeat_expire_interval));
        let (heartbeat_events_tx, heartbeat_events_rx) = mpsc::unbounded_channel();
        let (shutdown, _) = broadcast::channel(1);

        Arc::new(Self {
            config,
            store,
            state_machine,
            allocator,
            heartbeat,
            scope,
            raft,
            heartbeat_events_rx: Mutex::new(heartbeat_events_rx),
            heartbeat_events_tx,
            shutdown,
            tasks: Mutex::new(Vec::new()),
            cancel: CancellationToken::new(),
        })
    }

    /// Starts the allocator rebuild loop and the heartbeat sweep loop.
    /// Idempotent to call once; calling twice duplicates the tasks.
    pub async fn spawn_background_tasks(self: &Arc<Self>) {
        let allocator_task =
            self.allocator.clone().spawn_rebuild_loop(self.store.clone(), self.shutdown.subscribe());
        let heartbeat_task = self.heartbeat.clone().spawn_sweep_loop(
            self.store.clone(),
            self.config.allocator_rebuild_period.min(self.config.heartbeat_expire_interval),
            self.heartbeat_events_tx.clone(),
            self.shutdown.subscribe(),
        );
        self.tasks.lock().await.extend([allocator_task, heartbeat_task]);
    }

    /// Signals every background task to stop, cancels any in-flight
    /// `propose` call, and joins the background tasks. Mirrors the
    /// teacher's `Registry`/poller shutdown (§5's resource-lifecycle note).
    pub async fn close(&self) {
        let _ = self.shutdown.send(());
        self.cancel.cancel();
        let mut tasks = self.tasks.lock().await;
        for task in tasks.drain(..) {
            let _ = task.await;
        }
    }

    async fn propose(&self, op: Operation) -> Result<(), ManagerError> {
        self.state_machine.precheck(&op).await?;

        let op_name = op.op_name();
        let entity_id = op.entity_id();
        let rx = self.state_machine.pending().register(op_name, entity_id).await;

        let bytes = serde_json::to_vec(&op)
            .map_err(|e| ManagerError::CommitFailed { message: e.to_string() })?;

        tokio::select! {
            result = self.raft.propose(bytes) => result.context(RaftErrorSnafu)?,
            _ = self.cancel.cancelled() => {
                return Err(ManagerError::RaftError {
                    source: RaftError { message: "manager is closing".into() },
                });
            }
        }

        tokio::select! {
            resolved = rx => match resolved {
                Ok(Ok(())) => Ok(()),
                Ok(Err(message)) => Err(ManagerError::CommitFailed { message }),
                Err(_) => Err(ManagerError::CommitFailed {
                    message: "commit result channel dropped before resolving".into(),
                }),
            },
            _ = self.cancel.cancelled() => {
                Err(ManagerError::RaftError {
                    source: RaftError { message: "manager is closing".into() },
                })
            }
        }
    }

    // ---- mutating operations (§4.3) -------------------------------------

    pub async fn add_node(
        &self,
        host: impl Into<String>,
        idc: impl Into<String>,
        rack: impl Into<String>,
        disk_type: DiskType,
        role: NodeRole,
    ) -> Result<NodeId, ManagerError> {
        let (_, top) = self.scope.alloc("nodeid", 1).await.context(ScopeErrorSnafu)?;
        let node_id = NodeId(top);
        let op = Operation::AddNode(AddNodeParams {
            node_id,
            host: host.into(),
            idc: idc.into(),
            rack: rack.into(),
            disk_type,
            role,
        });
        self.propose(op).await?;
        Ok(node_id)
    }

    pub async fn add_disk(
        &self,
        node_id: NodeId,
        host: impl Into<String>,
        path: impl Into<String>,
        idc: impl Into<String>,
        rack: impl Into<String>,
    ) -> Result<DiskId, ManagerError> {
        let (_, top) = self.scope.alloc("diskid", 1).await.context(ScopeErrorSnafu)?;
        let disk_id = DiskId(top);
        let op = Operation::AddDisk(AddDiskParams {
            disk_id,
            node_id,
            host: host.into(),
            path: path.into(),
            idc: idc.into(),
            rack: rack.into(),
        });
        self.propose(op).await?;
        Ok(disk_id)
    }

    pub async fn set_status(&self, disk_id: DiskId, status: DiskStatus) -> Result<(), ManagerError> {
        self.propose(Operation::SetStatus { disk_id, status }).await
    }

    pub async fn switch_readonly(&self, disk_id: DiskId, readonly: bool) -> Result<(), ManagerError> {
        self.propose(Operation::SwitchReadonly { disk_id, readonly }).await
    }

    pub async fn dropping_disk(&self, disk_id: DiskId) -> Result<(), ManagerError> {
        self.propose(Operation::DroppingDisk { disk_id }).await
    }

    pub async fn dropped_disk(&self, disk_id: DiskId) -> Result<(), ManagerError> {
        self.propose(Operation::DroppedDisk { disk_id }).await
    }

    pub async fn dropping_node(&self, node_id: NodeId) -> Result<(), ManagerError> {
        self.propose(Operation::DroppingNode { node_id }).await
    }

    pub async fn dropped_node(&self, node_id: NodeId) -> Result<(), ManagerError> {
        self.propose(Operation::DroppedNode { node_id }).await
    }

    /// Applies a heartbeat directly, bypassing raft (§4.3): heartbeats are
    /// too frequent to pay consensus latency on, and are naturally
    /// idempotent (last-write-wins on `expire_time`).
    pub async fn heartbeat(&self, disk_id: DiskId, extra: HeartbeatExtra) -> Result<(), ManagerError> {
        self.state_machine.apply_heartbeat(disk_id, extra).await
    }

    // ---- queries ---------------------------------------------------------

    pub async fn get_disk(&self, disk_id: DiskId) -> Option<Disk> {
        let locked = self.store.get_disk(disk_id).await?;
        Some(locked.read().await.clone())
    }

    pub async fn get_node(&self, node_id: NodeId) -> Option<Node> {
        let locked = self.store.get_node(node_id).await?;
        Some(locked.read().await.clone())
    }

    /// Disks matching `filter` (§10.5).
    pub async fn list_disks(&self, filter: &DiskFilter) -> Vec<Disk> {
        self.store.list_disks(filter).await
    }

    /// Nodes matching `filter` (§10.5).
    pub async fn list_nodes(&self, filter: &NodeFilter) -> Vec<Node> {
        self.store.list_nodes(filter).await
    }

    /// One sweep of the heartbeat monitor, returning edges crossed since the
    /// last call. Exposed both for direct polling by an external sink and
    /// as what the background sweep loop calls internally (§6).
    pub async fn get_heartbeat_change_disks(&self) -> Vec<HeartbeatEvent> {
        self.heartbeat.get_heartbeat_change_disks(&self.store).await
    }

    /// Drains events accumulated by the background sweep loop since the
    /// last call. A no-op (returns empty) if `spawn_background_tasks` was
    /// never called.
    pub async fn drain_heartbeat_events(&self) -> Vec<HeartbeatEvent> {
        let mut rx = self.heartbeat_events_rx.lock().await;
        let mut out = Vec::new();
        while let Ok(event) = rx.try_recv() {
            out.push(event);
        }
        out
    }

    pub async fn refresh_expire_time(&self) {
        self.heartbeat.refresh_expire_time(&self.store).await
    }

    /// Forces an immediate allocator rebuild, ahead of its regular cadence.
    pub async fn rebuild_allocator(&self) {
        self.allocator.rebuild(&self.store).await
    }

    pub fn select(&self, disk_type: DiskType, count: usize) -> Result<Vec<DiskId>, ManagerError> {
        self.allocator.select(disk_type, count)
    }

    pub fn writable_space(&self, disk_type: DiskType) -> u64 {
        self.allocator.writable_space(disk_type)
    }

    pub fn idle_disks(&self, disk_type: DiskType) -> Vec<DiskId> {
        self.allocator.idle_disks(disk_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BlobNodeHeartbeat, NodeRole};
    use crate::persistence::InMemoryPersistence;
    use crate::scope::SequentialScopeAllocator;

    fn manager() -> Arc<Manager> {
        Manager::new(
            ManagerConfig::default(),
            Arc::new(InMemoryPersistence::default()),
            Arc::new(SequentialScopeAllocator::default()),
        )
    }

    #[tokio::test]
    async fn add_node_then_add_disk_round_trips() {
        let mgr = manager();
        let node_id = mgr.add_node("h1", "z0", "r1", DiskType::Hdd, NodeRole::Storage).await.unwrap();
        let disk_id = mgr.add_disk(node_id, "h1", "/d1", "z0", "r1").await.unwrap();

        let disk = mgr.get_disk(disk_id).await.unwrap();
        assert_eq!(disk.status, DiskStatus::Normal);
        assert_eq!(disk.node_id, node_id);

        let node = mgr.get_node(node_id).await.unwrap();
        assert!(node.disks.contains(&disk_id));
    }

    #[tokio::test]
    async fn reject_backward_status_through_the_public_api() {
        let mgr = manager();
        let node_id = mgr.add_node("h1", "z0", "r1", DiskType::Hdd, NodeRole::Storage).await.unwrap();
        let disk_id = mgr.add_disk(node_id, "h1", "/d1", "z0", "r1").await.unwrap();
        mgr.set_status(disk_id, DiskStatus::Broken).await.unwrap();

        let err = mgr.set_status(disk_id, DiskStatus::Normal).await.unwrap_err();
        assert!(matches!(err, ManagerError::ChangeDiskStatusNotAllow { .. }));
    }

    #[tokio::test]
    async fn heartbeat_bypasses_propose_and_resets_expiry() {
        let mgr = manager();
        let node_id = mgr.add_node("h1", "z0", "r1", DiskType::Hdd, NodeRole::Storage).await.unwrap();
        let disk_id = mgr.add_disk(node_id, "h1", "/d1", "z0", "r1").await.unwrap();

        let extra = HeartbeatExtra::BlobNode(BlobNodeHeartbeat {
            free: 1024,
            size: 2048,
            free_chunk_cnt: 10,
            oversold_free_chunk_cnt: 0,
            max_chunk_cnt: 20,
        });
        mgr.heartbeat(disk_id, extra).await.unwrap();
        let disk = mgr.get_disk(disk_id).await.unwrap();
        assert_eq!(disk.extra.free(), 1024);
    }
}
