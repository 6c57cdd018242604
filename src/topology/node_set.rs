//! A `NodeSet`: a fault-isolation bucket of nodes of one disk type.

use crate::ids::NodeId;
use crate::model::DiskType;
use std::collections::BTreeSet;

/// A bucket of nodes of a single `disk_type`, bounded by `node_set_cap`.
#[derive(Debug, Clone)]
pub struct NodeSet {
    pub id: crate::ids::NodeSetId,
    pub disk_type: DiskType,
    pub node_set_cap: usize,
    pub nodes: BTreeSet<NodeId>,
    /// Racks already represented, each capped at `node_set_rack_cap` when
    /// `rack_aware` placement is enabled.
    pub rack_counts: std::collections::HashMap<String, usize>,
}

impl NodeSet {
    pub fn new(id: crate::ids::NodeSetId, disk_type: DiskType, node_set_cap: usize) -> Self {
        Self {
            id,
            disk_type,
            node_set_cap,
            nodes: BTreeSet::new(),
            rack_counts: std::collections::HashMap::new(),
        }
    }

    pub fn has_capacity(&self) -> bool {
        self.nodes.len() < self.node_set_cap
    }

    pub fn rack_count(&self, rack: &str) -> usize {
        self.rack_counts.get(rack).copied().unwrap_or(0)
    }

    pub fn add_node(&mut self, node_id: NodeId, rack: &str) {
        self.nodes.insert(node_id);
        *self.rack_counts.entry(rack.to_string()).or_insert(0) += 1;
    }

    pub fn remove_node(&mut self, node_id: NodeId, rack: &str) {
        if self.nodes.remove(&node_id) {
            if let Some(count) = self.rack_counts.get_mut(rack) {
                *count = count.saturating_sub(1);
            }
        }
    }
}
