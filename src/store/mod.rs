//! The in-memory index over every disk and node (§4.1).

mod entity_store;

pub use entity_store::{DiskFilter, EntityStore, LockedDisk, LockedNode, NodeFilter};
