//! The `Disk` entity and its lifecycle status.

use crate::ids::{DiskId, DiskSetId, NodeId};
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime};

/// Lifecycle status of a disk.
///
/// Ordinals encode the allowed forward-only ladder:
/// `Normal(0) < Broken(1) < Repairing(2) < Repaired(3) < Dropped(4)`.
/// Any status may jump directly to `Dropped`.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum DiskStatus {
    Normal,
    Broken,
    Repairing,
    Repaired,
    Dropped,
}

impl DiskStatus {
    /// Position on the status ladder.
    pub fn ordinal(&self) -> u8 {
        match self {
            DiskStatus::Normal => 0,
            DiskStatus::Broken => 1,
            DiskStatus::Repairing => 2,
            DiskStatus::Repaired => 3,
            DiskStatus::Dropped => 4,
        }
    }

    /// Whether moving from `self` to `next` is a legal single proposal.
    ///
    /// Forward steps of exactly one ordinal are allowed, plus a direct jump
    /// to `Dropped` from any non-dropped status.
    pub fn can_transition_to(&self, next: DiskStatus) -> bool {
        if *self == next {
            return true;
        }
        let before = self.ordinal();
        let after = next.ordinal();
        if before > after {
            return false;
        }
        after - before == 1 || next == DiskStatus::Dropped
    }
}

impl Default for DiskStatus {
    fn default() -> Self {
        DiskStatus::Normal
    }
}

/// Heartbeat payload reported by a blob-node style backend: capacity is
/// tracked in fixed-size chunks.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq)]
pub struct BlobNodeHeartbeat {
    pub free: u64,
    pub size: u64,
    pub free_chunk_cnt: u32,
    pub oversold_free_chunk_cnt: u32,
    pub max_chunk_cnt: u32,
}

/// Heartbeat payload reported by a shard-node style backend: capacity is
/// tracked in fixed-size shards.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq)]
pub struct ShardNodeHeartbeat {
    pub free: u64,
    pub size: u64,
    pub free_shard_cnt: u32,
    pub max_shard_cnt: u32,
}

/// Polymorphic heartbeat statistics. Matched by pattern, never downcast.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub enum HeartbeatExtra {
    BlobNode(BlobNodeHeartbeat),
    ShardNode(ShardNodeHeartbeat),
}

impl HeartbeatExtra {
    /// Free bytes regardless of the concrete backend.
    pub fn free(&self) -> u64 {
        match self {
            HeartbeatExtra::BlobNode(b) => b.free,
            HeartbeatExtra::ShardNode(s) => s.free,
        }
    }

    /// Total size in bytes regardless of the concrete backend.
    pub fn size(&self) -> u64 {
        match self {
            HeartbeatExtra::BlobNode(b) => b.size,
            HeartbeatExtra::ShardNode(s) => s.size,
        }
    }

    /// Number of free allocation items (chunks or shards).
    pub fn free_item_cnt(&self) -> u32 {
        match self {
            HeartbeatExtra::BlobNode(b) => b.free_chunk_cnt,
            HeartbeatExtra::ShardNode(s) => s.free_shard_cnt,
        }
    }
}

impl Default for HeartbeatExtra {
    fn default() -> Self {
        HeartbeatExtra::BlobNode(BlobNodeHeartbeat::default())
    }
}

/// A single physical disk tracked by the manager.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Disk {
    pub disk_id: DiskId,
    /// Owning node, or [`crate::ids::INVALID_NODE`] for legacy disks.
    pub node_id: NodeId,
    pub host: String,
    pub path: String,
    pub idc: String,
    pub rack: String,
    pub status: DiskStatus,
    pub readonly: bool,
    pub dropping: bool,
    #[serde(with = "humantime_serde_system_time")]
    pub expire_time: SystemTime,
    #[serde(with = "humantime_serde_system_time")]
    pub last_expire_time: SystemTime,
    pub extra: HeartbeatExtra,
    /// DiskSet this disk currently belongs to, if any.
    pub disk_set_id: Option<DiskSetId>,
}

impl Disk {
    /// A disk still occupies its `(host, path)` slot while it is in
    /// `{Normal, Broken, Repairing}`.
    pub fn need_filter(&self) -> bool {
        matches!(
            self.status,
            DiskStatus::Normal | DiskStatus::Broken | DiskStatus::Repairing
        )
    }

    /// Whether the disk's heartbeat lease has lapsed.
    pub fn is_expire(&self) -> bool {
        self.expire_time <= SystemTime::now()
    }

    /// Whether the disk is eligible for allocation: `Normal`, writable, and
    /// has a live heartbeat.
    pub fn is_allocatable(&self) -> bool {
        self.status == DiskStatus::Normal && !self.readonly && !self.is_expire()
    }

    /// Renew the heartbeat lease, recording the previous deadline.
    pub fn refresh_heartbeat(&mut self, extra: HeartbeatExtra, expire_interval: Duration) {
        self.extra = extra;
        self.last_expire_time = self.expire_time;
        self.expire_time = SystemTime::now() + expire_interval;
    }
}

/// `serde_with`-style helper module so `SystemTime` can round-trip through
/// the opaque persistence blob without pulling in `chrono`.
mod humantime_serde_system_time {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::{SystemTime, UNIX_EPOCH};

    pub fn serialize<S: Serializer>(t: &SystemTime, s: S) -> Result<S::Ok, S::Error> {
        let since_epoch = t.duration_since(UNIX_EPOCH).unwrap_or_default();
        since_epoch.as_secs_f64().serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<SystemTime, D::Error> {
        let secs = f64::deserialize(d)?;
        Ok(UNIX_EPOCH + std::time::Duration::from_secs_f64(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ladder_forward_one_step_allowed() {
        assert!(DiskStatus::Normal.can_transition_to(DiskStatus::Broken));
        assert!(DiskStatus::Broken.can_transition_to(DiskStatus::Repairing));
        assert!(DiskStatus::Repairing.can_transition_to(DiskStatus::Repaired));
    }

    #[test]
    fn ladder_rejects_backward() {
        assert!(!DiskStatus::Repairing.can_transition_to(DiskStatus::Normal));
        assert!(!DiskStatus::Dropped.can_transition_to(DiskStatus::Normal));
    }

    #[test]
    fn ladder_rejects_non_adjacent_forward() {
        assert!(!DiskStatus::Normal.can_transition_to(DiskStatus::Repairing));
    }

    #[test]
    fn ladder_allows_dropped_jump() {
        assert!(DiskStatus::Normal.can_transition_to(DiskStatus::Dropped));
        assert!(DiskStatus::Broken.can_transition_to(DiskStatus::Dropped));
    }

    #[test]
    fn ladder_is_reflexive() {
        assert!(DiskStatus::Repairing.can_transition_to(DiskStatus::Repairing));
    }
}
