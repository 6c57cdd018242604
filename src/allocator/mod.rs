//! Placement & capacity engine (§4.4), rebuilt periodically from an
//! `EntityStore` snapshot and published via atomic pointer swap (§5, §9).

mod stats;
mod tree;
mod writable;

pub use stats::DiskStatInfo;
pub use tree::{AllocationTree, DiskLeaf};

use crate::config::ManagerConfig;
use crate::error::{ManagerError, NoEnoughSpaceSnafu};
use crate::ids::DiskId;
use crate::model::DiskType;
use crate::store::EntityStore;
use snafu::OptionExt;
use std::collections::HashMap;
use std::sync::{Arc, RwLock as StdRwLock};
use tracing::{debug, instrument};

/// Snapshot-rebuilt allocator state for one `disk_type`.
#[derive(Default)]
struct Snapshot {
    tree: AllocationTree,
    idc_stats: HashMap<String, DiskStatInfo>,
    writable_bytes: u64,
    /// Disks below the low-watermark free-space ratio, reported (not
    /// auto-transitioned) so operators can act — §10.5 supplement.
    idle_disks: Vec<DiskId>,
}

/// Placement & capacity engine. Cheap to clone: it only holds an `Arc` to
/// the latest rebuilt snapshot per disk type.
#[derive(Clone)]
pub struct Allocator {
    config: Arc<ManagerConfig>,
    snapshots: Arc<StdRwLock<HashMap<DiskType, Arc<Snapshot>>>>,
    /// Free-space ratio below which a disk is reported via `idle_disks()`.
    low_watermark: f64,
}

impl Allocator {
    pub fn new(config: Arc<ManagerConfig>) -> Self {
        Self {
            config,
            snapshots: Arc::new(StdRwLock::new(HashMap::new())),
            low_watermark: 0.1,
        }
    }

    /// Rebuilds the allocation tree and capacity stats for every disk type
    /// present in the store, then atomically swaps in the new snapshot.
    /// Budgeted at O(disks * log disks) per cycle (§9).
    #[instrument(level = "debug", skip(self, store))]
    pub async fn rebuild(&self, store: &EntityStore) {
        let disks = store.all_disks_snapshot().await;
        let nodes = store.all_nodes_snapshot().await;

        let mut node_locality: HashMap<crate::ids::NodeId, (String, String, String, DiskType)> =
            HashMap::new();
        for node in &nodes {
            let guard = node.read().await;
            node_locality.insert(
                guard.node_id,
                (guard.host.clone(), guard.idc.clone(), guard.rack.clone(), guard.disk_type),
            );
        }

        let mut by_type: HashMap<DiskType, (Vec<DiskLeaf>, HashMap<String, DiskStatInfo>, Vec<DiskId>)> =
            HashMap::new();

        for disk in &disks {
            let guard = disk.read().await;
            let (host, idc, rack, disk_type) = node_locality
                .get(&guard.node_id)
                .cloned()
                .unwrap_or((guard.host.clone(), guard.idc.clone(), guard.rack.clone(), DiskType::Hdd));

            let entry = by_type.entry(disk_type).or_default();
            entry.1.entry(idc.clone()).or_default().record(&guard);

            let ratio = if guard.extra.size() > 0 {
                guard.extra.free() as f64 / guard.extra.size() as f64
            } else {
                0.0
            };
            if ratio < self.low_watermark {
                entry.2.push(guard.disk_id);
            }

            if guard.is_allocatable() {
                entry.0.push(DiskLeaf {
                    disk_id: guard.disk_id,
                    host,
                    rack,
                    idc,
                    free_items: guard.extra.free_item_cnt(),
                });
            }
        }

        let dominant = self.config.dominant_code_mode();
        let idc_count = by_type
            .values()
            .map(|(_, stats, _)| stats.len() as u64)
            .max()
            .unwrap_or(1)
            .max(1);
        let idc_su_count = (dominant.total() as u64 / idc_count).max(1);

        let mut new_snapshots = HashMap::new();
        for (disk_type, (leaves, idc_stats, idle)) in by_type {
            let tree = AllocationTree::build(leaves);

            let per_idc_free_items: Vec<Vec<u64>> = tree
                .idcs
                .iter()
                .map(|idc| {
                    idc.racks
                        .iter()
                        .flat_map(|r| r.nodes.iter().map(|n| n.weight))
                        .collect()
                })
                .collect();
            let writable_bytes = writable::calculate_writable(
                &per_idc_free_items,
                idc_su_count,
                self.config.item_size,
                dominant.n as u64,
                self.config.host_aware,
            );

            debug!(?disk_type, writable_bytes, idle = idle.len(), "allocator snapshot rebuilt");
            new_snapshots.insert(
                disk_type,
                Arc::new(Snapshot { tree, idc_stats, writable_bytes, idle_disks: idle }),
            );
        }

        *self.snapshots.write().expect("allocator lock poisoned") = new_snapshots;
    }

    /// Selects `count` disks for a stripe, enforcing host/rack awareness per
    /// the current configuration.
    pub fn select(&self, disk_type: DiskType, count: usize) -> Result<Vec<DiskId>, ManagerError> {
        let snapshots = self.snapshots.read().expect("allocator lock poisoned");
        let snapshot = snapshots.get(&disk_type).context(NoEnoughSpaceSnafu)?;
        let mut rng = rand::thread_rng();
        snapshot
            .tree
            .select(&mut rng, count, self.config.host_aware, self.config.rack_aware)
            .context(NoEnoughSpaceSnafu)
    }

    /// Cluster-wide writable bytes for `disk_type`, from the last rebuild.
    pub fn writable_space(&self, disk_type: DiskType) -> u64 {
        self.snapshots
            .read()
            .expect("allocator lock poisoned")
            .get(&disk_type)
            .map(|s| s.writable_bytes)
            .unwrap_or(0)
    }

    /// Disks below the low free-space watermark, from the last rebuild.
    pub fn idle_disks(&self, disk_type: DiskType) -> Vec<DiskId> {
        self.snapshots
            .read()
            .expect("allocator lock poisoned")
            .get(&disk_type)
            .map(|s| s.idle_disks.clone())
            .unwrap_or_default()
    }

    /// Per-IDC capacity counters from the last rebuild.
    pub fn idc_stats(&self, disk_type: DiskType, idc: &str) -> Option<DiskStatInfo> {
        self.snapshots
            .read()
            .expect("allocator lock poisoned")
            .get(&disk_type)?
            .idc_stats
            .get(idc)
            .cloned()
    }

    /// Spawns the periodic rebuild loop, stopping when `shutdown` fires.
    pub fn spawn_rebuild_loop(
        self,
        store: Arc<EntityStore>,
        mut shutdown: tokio::sync::broadcast::Receiver<()>,
    ) -> tokio::task::JoinHandle<()> {
        let period = self.config.allocator_rebuild_period;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                tokio::select! {
                    _ = ticker.tick() => self.rebuild(&store).await,
                    _ = shutdown.recv() => break,
                }
            }
        })
    }
}
