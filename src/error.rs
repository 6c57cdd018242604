//! Crate-wide error type.
//!
//! Mirrors the teacher's `SvcError` (one `snafu` enum covering every
//! collaborator failure plus the domain rejections in the state machine).

use crate::ids::{DiskId, NodeId};
use snafu::Snafu;

/// Error kinds returned by the disk & node manager.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
#[allow(missing_docs)]
pub enum ManagerError {
    #[snafu(display("Disk '{}' not found", disk_id))]
    DiskNotFound { disk_id: DiskId },

    #[snafu(display("Node '{}' not found", node_id))]
    NodeNotFound { node_id: NodeId },

    #[snafu(display("Disk '{}' already exists", disk_id))]
    DiskAlreadyExists { disk_id: DiskId },

    #[snafu(display("Node '{}' already exists", node_id))]
    NodeAlreadyExists { node_id: NodeId },

    #[snafu(display(
        "Illegal argument: (host, path) = ({}, {}) is already claimed by another disk",
        host,
        path
    ))]
    IllegalArgumentDiskPath { host: String, path: String },

    #[snafu(display(
        "Illegal argument: (host, disk_type) = ({}, {:?}) is already claimed by another node",
        host,
        disk_type
    ))]
    IllegalArgumentNodeHost {
        host: String,
        disk_type: crate::model::node::DiskType,
    },

    #[snafu(display("Invalid disk status code '{}'", code))]
    InvalidStatus { code: u8 },

    #[snafu(display(
        "Cannot change disk '{}' status from {:?} to {:?}",
        disk_id,
        from,
        to
    ))]
    ChangeDiskStatusNotAllow {
        disk_id: DiskId,
        from: crate::model::disk::DiskStatus,
        to: crate::model::disk::DiskStatus,
    },

    #[snafu(display(
        "Disk '{}' must be Normal and readonly before it can be dropped",
        disk_id
    ))]
    DiskAbnormalOrNotReadOnly { disk_id: DiskId },

    #[snafu(display("Node '{}' is already dropping", node_id))]
    NodeIsDropping { node_id: NodeId },

    #[snafu(display("Not enough space to satisfy the allocation request"))]
    NoEnoughSpace,

    #[snafu(display("Persistence operation failed: {}", source))]
    PersistenceError { source: crate::persistence::PersistError },

    #[snafu(display("Scope allocation failed: {}", source))]
    ScopeError { source: crate::scope::ScopeError },

    #[snafu(display("Raft propose failed: {}", source))]
    RaftError { source: crate::raft::RaftError },

    #[snafu(display("Operation commit failed: {}", message))]
    CommitFailed { message: String },
}

/// Convenience alias used throughout the crate.
pub type Result<T, E = ManagerError> = std::result::Result<T, E>;
