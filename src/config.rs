//! Manager configuration (§10.3).
//!
//! The teacher loads its per-binary options through `structopt` CLI flags
//! (`agents/core/src/server.rs`'s `CliArgs`, with `humantime::Duration`
//! fields for periods). We keep that shape for the binary entry point and
//! additionally make the resulting `ManagerConfig` `serde`-deserializable so
//! it can be loaded from a config file when embedding the manager as a
//! library.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use structopt::StructOpt;

/// An erasure-coding scheme: data, parity and local-parity shard counts.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodeMode {
    pub n: u32,
    pub m: u32,
    pub l: u32,
}

impl CodeMode {
    pub fn total(&self) -> u32 {
        self.n + self.m + self.l
    }
}

/// Tunables for topology sizing, placement awareness, and the allocator's
/// writable-space estimator.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ManagerConfig {
    /// How long a disk's heartbeat lease lasts before it is considered
    /// expired (§4.5).
    pub heartbeat_expire_interval: Duration,
    /// Cadence at which the allocator tree is rebuilt from a fresh
    /// `EntityStore` snapshot (§4.4, default 300s).
    pub allocator_rebuild_period: Duration,
    /// Maximum nodes in one NodeSet.
    pub node_set_cap: usize,
    /// Maximum nodes from a single rack within one NodeSet, when
    /// `rack_aware` is enabled.
    pub node_set_rack_cap: usize,
    /// Maximum disks in one DiskSet.
    pub disk_set_cap: usize,
    /// Maximum disks a single node may contribute to one DiskSet.
    pub disk_count_per_node_in_disk_set: usize,
    pub rack_aware: bool,
    pub host_aware: bool,
    /// Available erasure-coding schemes; the writable-space estimator uses
    /// the one with the largest `n + m + l` (§4.4).
    pub code_modes: Vec<CodeMode>,
    /// Bytes per allocation unit (chunk for blob nodes, shard for shard
    /// nodes).
    pub item_size: u64,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            heartbeat_expire_interval: Duration::from_secs(30),
            allocator_rebuild_period: Duration::from_secs(300),
            node_set_cap: 20,
            node_set_rack_cap: 6,
            disk_set_cap: 6,
            disk_count_per_node_in_disk_set: 1,
            rack_aware: true,
            host_aware: true,
            code_modes: vec![CodeMode { n: 9, m: 3, l: 0 }],
            item_size: 16 << 20,
        }
    }
}

impl ManagerConfig {
    /// The code mode with the largest `n + m + l`, per §4.4.
    pub fn dominant_code_mode(&self) -> CodeMode {
        *self
            .code_modes
            .iter()
            .max_by_key(|c| c.total())
            .unwrap_or(&CodeMode { n: 1, m: 0, l: 0 })
    }
}

/// CLI surface for the `disk-manager` binary, mirroring the teacher's
/// `CliArgs` (`agents/core/src/server.rs`).
#[derive(Debug, StructOpt)]
pub struct CliArgs {
    /// How long a disk's heartbeat lease lasts before it is considered
    /// expired.
    #[structopt(long, default_value = "30s")]
    pub heartbeat_expire_interval: humantime::Duration,

    /// Cadence at which the allocator tree is rebuilt.
    #[structopt(long, default_value = "300s")]
    pub allocator_rebuild_period: humantime::Duration,

    #[structopt(long, default_value = "20")]
    pub node_set_cap: usize,

    #[structopt(long, default_value = "6")]
    pub node_set_rack_cap: usize,

    #[structopt(long, default_value = "6")]
    pub disk_set_cap: usize,

    #[structopt(long, default_value = "1")]
    pub disk_count_per_node_in_disk_set: usize,

    #[structopt(long)]
    pub rack_aware: bool,

    #[structopt(long)]
    pub host_aware: bool,
}

impl From<CliArgs> for ManagerConfig {
    fn from(args: CliArgs) -> Self {
        Self {
            heartbeat_expire_interval: args.heartbeat_expire_interval.into(),
            allocator_rebuild_period: args.allocator_rebuild_period.into(),
            node_set_cap: args.node_set_cap,
            node_set_rack_cap: args.node_set_rack_cap,
            disk_set_cap: args.disk_set_cap,
            disk_count_per_node_in_disk_set: args.disk_count_per_node_in_disk_set,
            rack_aware: args.rack_aware,
            host_aware: args.host_aware,
            ..ManagerConfig::default()
        }
    }
}
