//! The `Node` entity.

use crate::ids::{DiskId, NodeId, NodeSetId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Lifecycle status of a node. Simpler than a disk's: a node is either in
/// use or has been fully retired.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum NodeStatus {
    Normal,
    Dropped,
}

impl NodeStatus {
    /// Whether the node still participates in topology/allocation.
    pub fn is_using(&self) -> bool {
        matches!(self, NodeStatus::Normal)
    }
}

impl Default for NodeStatus {
    fn default() -> Self {
        NodeStatus::Normal
    }
}

/// Backend family a node's disks report capacity as.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum DiskType {
    Hdd,
    Ssd,
}

/// Role a node plays in the cluster.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum NodeRole {
    Storage,
    Gateway,
}

/// A physical host tracked by the manager, owning zero or more disks.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Node {
    pub node_id: NodeId,
    pub host: String,
    pub idc: String,
    pub rack: String,
    pub disk_type: DiskType,
    pub role: NodeRole,
    pub status: NodeStatus,
    pub dropping: bool,
    pub node_set_id: Option<NodeSetId>,
    /// Disk ids owned by this node. Disks themselves live only in the
    /// `EntityStore`'s disk map; this is an index, not an owning reference.
    pub disks: BTreeSet<DiskId>,
}

impl Node {
    /// Create a freshly registered node with no disks and no NodeSet yet.
    pub fn new(
        node_id: NodeId,
        host: String,
        idc: String,
        rack: String,
        disk_type: DiskType,
        role: NodeRole,
    ) -> Self {
        Self {
            node_id,
            host,
            idc,
            rack,
            disk_type,
            role,
            status: NodeStatus::Normal,
            dropping: false,
            node_set_id: None,
            disks: BTreeSet::new(),
        }
    }
}
