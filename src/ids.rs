//! Scalar identifiers used across the entity store and topology index.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Sentinel used by legacy disks that were registered before their owning
/// node was known.
pub const INVALID_NODE: NodeId = NodeId(0);

macro_rules! scalar_id {
    ($Name:ident, $Doc:literal) => {
        #[doc = $Doc]
        #[derive(
            Serialize,
            Deserialize,
            Debug,
            Default,
            Clone,
            Copy,
            Eq,
            PartialEq,
            Hash,
            PartialOrd,
            Ord,
        )]
        pub struct $Name(pub u32);

        impl fmt::Display for $Name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u32> for $Name {
            fn from(id: u32) -> Self {
                $Name(id)
            }
        }

        impl From<$Name> for u32 {
            fn from(id: $Name) -> Self {
                id.0
            }
        }
    };
}

scalar_id!(DiskId, "unique identifier of a disk, issued by the ScopeAllocator");
scalar_id!(NodeId, "unique identifier of a node, issued by the ScopeAllocator");
scalar_id!(NodeSetId, "identifier of a NodeSet bucket");
scalar_id!(DiskSetId, "identifier of a DiskSet bucket");

impl NodeId {
    /// Whether this id is the legacy "no owning node" sentinel.
    pub fn is_invalid(&self) -> bool {
        *self == INVALID_NODE
    }
}
