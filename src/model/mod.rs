//! Entity definitions shared by the store, topology index and state machine.

pub mod disk;
pub mod node;

pub use disk::{Disk, DiskStatus, HeartbeatExtra};
pub use node::{DiskType, Node, NodeRole, NodeStatus};
