//! The discriminated request proposed to raft for every mutation (§4.3).
//!
//! `Heartbeat` is deliberately absent: per §4.3 it "applies on every
//! heartbeat tick, not necessarily through raft", so it is a direct method
//! on [`super::StateMachine`] rather than a proposed `Operation`.

use crate::ids::{DiskId, NodeId};
use crate::model::{DiskStatus, DiskType, NodeRole};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AddNodeParams {
    pub node_id: NodeId,
    pub host: String,
    pub idc: String,
    pub rack: String,
    pub disk_type: DiskType,
    pub role: NodeRole,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AddDiskParams {
    pub disk_id: DiskId,
    pub node_id: NodeId,
    pub host: String,
    pub path: String,
    pub idc: String,
    pub rack: String,
}

/// One proposed mutation. Serialized to bytes (`serde_json`) as the
/// [`crate::raft::LogEntry`] handed to `RaftHandle::propose`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum Operation {
    AddNode(AddNodeParams),
    AddDisk(AddDiskParams),
    SetStatus { disk_id: DiskId, status: DiskStatus },
    SwitchReadonly { disk_id: DiskId, readonly: bool },
    DroppingDisk { disk_id: DiskId },
    DroppedDisk { disk_id: DiskId },
    DroppingNode { node_id: NodeId },
    DroppedNode { node_id: NodeId },
}

impl Operation {
    /// Stable name used as half of a `pending_entries` key.
    pub fn op_name(&self) -> &'static str {
        match self {
            Operation::AddNode(_) => "add_node",
            Operation::AddDisk(_) => "add_disk",
            Operation::SetStatus { .. } => "set_status",
            Operation::SwitchReadonly { .. } => "switch_readonly",
            Operation::DroppingDisk { .. } => "dropping_disk",
            Operation::DroppedDisk { .. } => "dropped_disk",
            Operation::DroppingNode { .. } => "dropping_node",
            Operation::DroppedNode { .. } => "dropped_node",
        }
    }

    /// The other half of a `pending_entries` key: disk or node id, erased to
    /// its raw integer since the two id types never mix within one op.
    pub fn entity_id(&self) -> u32 {
        match self {
            Operation::AddNode(p) => p.node_id.0,
            Operation::AddDisk(p) => p.disk_id.0,
            Operation::SetStatus { disk_id, .. } => disk_id.0,
            Operation::SwitchReadonly { disk_id, .. } => disk_id.0,
            Operation::DroppingDisk { disk_id } => disk_id.0,
            Operation::DroppedDisk { disk_id } => disk_id.0,
            Operation::DroppingNode { node_id } => node_id.0,
            Operation::DroppedNode { node_id } => node_id.0,
        }
    }
}
