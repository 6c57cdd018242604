//! A `DiskSet`: a copy-set of disks drawn from a single NodeSet/IDC.

use crate::ids::{DiskId, DiskSetId, NodeId, NodeSetId};
use std::collections::{BTreeSet, HashMap};

/// A bucket of disks from a single `NodeSet`, bounded by `disk_set_cap` and
/// `disk_count_per_node_in_disk_set`.
#[derive(Debug, Clone)]
pub struct DiskSet {
    pub id: DiskSetId,
    pub node_set_id: NodeSetId,
    pub idc: String,
    pub disk_set_cap: usize,
    pub disk_count_per_node_in_disk_set: usize,
    pub disks: BTreeSet<DiskId>,
    /// How many disks each node currently contributes to this set.
    pub per_node_counts: HashMap<NodeId, usize>,
}

impl DiskSet {
    pub fn new(
        id: DiskSetId,
        node_set_id: NodeSetId,
        idc: String,
        disk_set_cap: usize,
        disk_count_per_node_in_disk_set: usize,
    ) -> Self {
        Self {
            id,
            node_set_id,
            idc,
            disk_set_cap,
            disk_count_per_node_in_disk_set,
            disks: BTreeSet::new(),
            per_node_counts: HashMap::new(),
        }
    }

    pub fn has_capacity(&self) -> bool {
        self.disks.len() < self.disk_set_cap
    }

    pub fn node_has_capacity(&self, node_id: NodeId) -> bool {
        self.per_node_counts.get(&node_id).copied().unwrap_or(0)
            < self.disk_count_per_node_in_disk_set
    }

    pub fn add_disk(&mut self, disk_id: DiskId, node_id: NodeId) {
        self.disks.insert(disk_id);
        *self.per_node_counts.entry(node_id).or_insert(0) += 1;
    }

    pub fn remove_disk(&mut self, disk_id: DiskId, node_id: NodeId) {
        if self.disks.remove(&disk_id) {
            if let Some(count) = self.per_node_counts.get_mut(&node_id) {
                *count = count.saturating_sub(1);
            }
        }
    }
}
