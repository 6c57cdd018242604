//! `TopologyIndex`: assigns nodes/disks to NodeSets/DiskSets and answers
//! topology queries (§4.2).
//!
//! Ground truth: the teacher's `core::registry::Registry` pattern of a
//! single `RwLock`-guarded collection keyed by a stable id, generalized here
//! to a nested NodeSet → DiskSet hierarchy instead of a flat node map.

use crate::ids::{DiskId, DiskSetId, NodeId, NodeSetId};
use crate::model::DiskType;
use crate::topology::{disk_set::DiskSet, node_set::NodeSet};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Sizing and placement-awareness knobs for NodeSet/DiskSet allocation,
/// sourced from `ManagerConfig` (§10.3).
#[derive(Debug, Clone, Copy)]
pub struct CopySetConfig {
    pub node_set_cap: usize,
    pub node_set_rack_cap: usize,
    pub disk_set_cap: usize,
    pub disk_count_per_node_in_disk_set: usize,
    pub rack_aware: bool,
}

#[derive(Default)]
struct PerDiskType {
    node_sets: Vec<NodeSet>,
    disk_sets: Vec<DiskSet>,
    next_node_set_id: u32,
    next_disk_set_id: u32,
}

/// Topology state for every `disk_type`, protected by one lock (the
/// `topology_lock` in §5's ordering).
#[derive(Default)]
pub struct TopologyIndex {
    by_type: RwLock<HashMap<DiskType, PerDiskType>>,
}

impl TopologyIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Chooses (allocating a new one if needed) the NodeSet a node should
    /// join: the existing NodeSet of the same `disk_type` with the fewest
    /// nodes that has spare capacity and, under `rack_aware` placement,
    /// has not already reached `node_set_rack_cap` nodes from this rack.
    pub async fn alloc_node_set_id(
        &self,
        disk_type: DiskType,
        rack: &str,
        cfg: &CopySetConfig,
    ) -> NodeSetId {
        let mut by_type = self.by_type.write().await;
        let entry = by_type.entry(disk_type).or_default();

        let candidate = entry
            .node_sets
            .iter()
            .filter(|ns| ns.has_capacity())
            .filter(|ns| !cfg.rack_aware || ns.rack_count(rack) < cfg.node_set_rack_cap)
            .min_by_key(|ns| ns.nodes.len())
            .map(|ns| ns.id);

        if let Some(id) = candidate {
            return id;
        }

        entry.next_node_set_id += 1;
        let id = NodeSetId(entry.next_node_set_id);
        entry.node_sets.push(NodeSet::new(id, disk_type, cfg.node_set_cap));
        id
    }

    pub async fn add_node_to_node_set(
        &self,
        disk_type: DiskType,
        node_set_id: NodeSetId,
        node_id: NodeId,
        rack: &str,
    ) {
        let mut by_type = self.by_type.write().await;
        if let Some(entry) = by_type.get_mut(&disk_type) {
            if let Some(ns) = entry.node_sets.iter_mut().find(|ns| ns.id == node_set_id) {
                ns.add_node(node_id, rack);
            }
        }
    }

    pub async fn remove_node_from_node_set(
        &self,
        disk_type: DiskType,
        node_set_id: NodeSetId,
        node_id: NodeId,
        rack: &str,
    ) {
        let mut by_type = self.by_type.write().await;
        if let Some(entry) = by_type.get_mut(&disk_type) {
            if let Some(ns) = entry.node_sets.iter_mut().find(|ns| ns.id == node_set_id) {
                ns.remove_node(node_id, rack);
            }
        }
    }

    /// Chooses (allocating a new one if needed) the DiskSet a disk should
    /// join, scoped to the node's NodeSet and respecting
    /// `disk_count_per_node_in_disk_set`.
    pub async fn add_disk_to_disk_set(
        &self,
        disk_type: DiskType,
        node_set_id: NodeSetId,
        disk_id: DiskId,
        node_id: NodeId,
        idc: &str,
        cfg: &CopySetConfig,
    ) -> DiskSetId {
        let mut by_type = self.by_type.write().await;
        let entry = by_type.entry(disk_type).or_default();

        let candidate = entry
            .disk_sets
            .iter()
            .filter(|ds| ds.node_set_id == node_set_id && ds.idc == idc)
            .filter(|ds| ds.has_capacity() && ds.node_has_capacity(node_id))
            .min_by_key(|ds| ds.disks.len())
            .map(|ds| ds.id);

        let disk_set_id = match candidate {
            Some(id) => id,
            None => {
                entry.next_disk_set_id += 1;
                let id = DiskSetId(entry.next_disk_set_id);
                entry.disk_sets.push(DiskSet::new(
                    id,
                    node_set_id,
                    idc.to_string(),
                    cfg.disk_set_cap,
                    cfg.disk_count_per_node_in_disk_set,
                ));
                id
            }
        };

        if let Some(ds) = entry.disk_sets.iter_mut().find(|ds| ds.id == disk_set_id) {
            ds.add_disk(disk_id, node_id);
        }
        disk_set_id
    }

    pub async fn remove_disk_from_disk_set(
        &self,
        disk_type: DiskType,
        disk_set_id: DiskSetId,
        disk_id: DiskId,
        node_id: NodeId,
    ) {
        let mut by_type = self.by_type.write().await;
        if let Some(entry) = by_type.get_mut(&disk_type) {
            if let Some(ds) = entry.disk_sets.iter_mut().find(|ds| ds.id == disk_set_id) {
                ds.remove_disk(disk_id, node_id);
            }
        }
    }

    pub async fn validate_node_set_id(&self, disk_type: DiskType, node_set_id: NodeSetId) -> bool {
        let by_type = self.by_type.read().await;
        by_type
            .get(&disk_type)
            .map(|entry| entry.node_sets.iter().any(|ns| ns.id == node_set_id))
            .unwrap_or(false)
    }

    pub async fn get_node_set_ids(&self, disk_type: DiskType) -> Vec<NodeSetId> {
        let by_type = self.by_type.read().await;
        by_type
            .get(&disk_type)
            .map(|entry| entry.node_sets.iter().map(|ns| ns.id).collect())
            .unwrap_or_default()
    }

    pub async fn get_disk_set_ids(&self, disk_type: DiskType) -> Vec<DiskSetId> {
        let by_type = self.by_type.read().await;
        by_type
            .get(&disk_type)
            .map(|entry| entry.disk_sets.iter().map(|ds| ds.id).collect())
            .unwrap_or_default()
    }

    pub async fn get_all_node_sets(&self, disk_type: DiskType) -> Vec<NodeSet> {
        let by_type = self.by_type.read().await;
        by_type
            .get(&disk_type)
            .map(|entry| entry.node_sets.clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> CopySetConfig {
        CopySetConfig {
            node_set_cap: 2,
            node_set_rack_cap: 1,
            disk_set_cap: 2,
            disk_count_per_node_in_disk_set: 1,
            rack_aware: true,
        }
    }

    #[tokio::test]
    async fn fills_node_set_then_opens_a_new_one() {
        let topo = TopologyIndex::new();
        let cfg = cfg();
        let a = topo.alloc_node_set_id(DiskType::Hdd, "r1", &cfg).await;
        topo.add_node_to_node_set(DiskType::Hdd, a, NodeId(1), "r1").await;

        // second node, different rack: same node set (cap=2, rack cap respected)
        let b = topo.alloc_node_set_id(DiskType::Hdd, "r2", &cfg).await;
        assert_eq!(a, b);
        topo.add_node_to_node_set(DiskType::Hdd, b, NodeId(2), "r2").await;

        // third node: node set full, a new one is created
        let c = topo.alloc_node_set_id(DiskType::Hdd, "r3", &cfg).await;
        assert_ne!(a, c);
    }

    #[tokio::test]
    async fn rack_aware_avoids_doubling_up_a_rack() {
        let topo = TopologyIndex::new();
        let cfg = cfg();
        let a = topo.alloc_node_set_id(DiskType::Hdd, "r1", &cfg).await;
        topo.add_node_to_node_set(DiskType::Hdd, a, NodeId(1), "r1").await;

        // same rack again: node_set_rack_cap=1 means this must open a new set
        let b = topo.alloc_node_set_id(DiskType::Hdd, "r1", &cfg).await;
        assert_ne!(a, b);
    }
}
