//! Three-level placement tree (`IdcAllocator -> RackAllocator ->
//! NodeAllocator -> [Disk]`) and weighted-random-without-replacement
//! selection (§4.4).

use crate::ids::DiskId;
use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;
use std::collections::HashMap;

/// A single allocatable disk as seen by the placement tree.
#[derive(Debug, Clone)]
pub struct DiskLeaf {
    pub disk_id: DiskId,
    pub host: String,
    pub rack: String,
    pub idc: String,
    pub free_items: u32,
}

#[derive(Debug, Clone, Default)]
pub struct NodeAllocator {
    pub host: String,
    pub disks: Vec<DiskLeaf>,
    pub weight: u64,
}

#[derive(Debug, Clone, Default)]
pub struct RackAllocator {
    /// `{idc}-{rack}`, disambiguating racks with the same name across IDCs.
    pub rack_key: String,
    pub nodes: Vec<NodeAllocator>,
    pub weight: u64,
}

#[derive(Debug, Clone, Default)]
pub struct IdcAllocator {
    pub idc: String,
    pub racks: Vec<RackAllocator>,
    pub weight: u64,
}

/// The rebuilt, immutable placement tree. Published behind an atomic
/// pointer swap (§5, §9) so readers never observe a tree half-way through a
/// rebuild.
#[derive(Debug, Clone, Default)]
pub struct AllocationTree {
    pub idcs: Vec<IdcAllocator>,
}

impl AllocationTree {
    /// Buckets allocatable disk leaves into the three-level tree.
    pub fn build(leaves: Vec<DiskLeaf>) -> Self {
        let mut by_idc: HashMap<String, HashMap<String, HashMap<String, Vec<DiskLeaf>>>> =
            HashMap::new();
        for leaf in leaves {
            by_idc
                .entry(leaf.idc.clone())
                .or_default()
                .entry(format!("{}-{}", leaf.idc, leaf.rack))
                .or_default()
                .entry(leaf.host.clone())
                .or_default()
                .push(leaf);
        }

        let mut idcs = Vec::new();
        for (idc, racks) in by_idc {
            let mut rack_allocators = Vec::new();
            let mut idc_weight = 0u64;
            for (rack_key, hosts) in racks {
                let mut node_allocators = Vec::new();
                let mut rack_weight = 0u64;
                for (host, disks) in hosts {
                    let weight: u64 = disks.iter().map(|d| d.free_items as u64).sum();
                    rack_weight += weight;
                    node_allocators.push(NodeAllocator { host, disks, weight });
                }
                idc_weight += rack_weight;
                rack_allocators.push(RackAllocator {
                    rack_key,
                    nodes: node_allocators,
                    weight: rack_weight,
                });
            }
            idcs.push(IdcAllocator { idc, racks: rack_allocators, weight: idc_weight });
        }

        Self { idcs }
    }

    /// Selects `count` disks via weighted random choice without
    /// replacement, spreading the picks across IDCs proportionally to their
    /// weight and optionally enforcing `host_aware`/`rack_aware` exclusivity
    /// (at most one disk per host/rack in the returned stripe).
    pub fn select<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        count: usize,
        host_aware: bool,
        rack_aware: bool,
    ) -> Option<Vec<DiskId>> {
        let mut used_hosts = std::collections::HashSet::new();
        let mut used_racks = std::collections::HashSet::new();
        let mut picked = Vec::with_capacity(count);

        let idc_weights: Vec<u64> = self.idcs.iter().map(|i| i.weight).collect();
        if idc_weights.iter().all(|w| *w == 0) {
            return None;
        }

        for _ in 0..count {
            let candidate_idcs: Vec<usize> = self
                .idcs
                .iter()
                .enumerate()
                .filter(|(_, idc)| idc.weight > 0)
                .map(|(i, _)| i)
                .collect();
            if candidate_idcs.is_empty() {
                return None;
            }
            let weights: Vec<u64> =
                candidate_idcs.iter().map(|&i| self.idcs[i].weight).collect();
            let dist = WeightedIndex::new(&weights).ok()?;
            let idc = &self.idcs[candidate_idcs[dist.sample(rng)]];

            let rack_candidates: Vec<&RackAllocator> = idc
                .racks
                .iter()
                .filter(|r| r.weight > 0)
                .filter(|r| !rack_aware || !used_racks.contains(&r.rack_key))
                .collect();
            let rack_candidates = if rack_candidates.is_empty() { idc.racks.iter().filter(|r| r.weight > 0).collect() } else { rack_candidates };
            if rack_candidates.is_empty() {
                return None;
            }
            let rack_weights: Vec<u64> = rack_candidates.iter().map(|r| r.weight).collect();
            let rack_dist = WeightedIndex::new(&rack_weights).ok()?;
            let rack = rack_candidates[rack_dist.sample(rng)];

            let node_candidates: Vec<&NodeAllocator> = rack
                .nodes
                .iter()
                .filter(|n| n.weight > 0)
                .filter(|n| !host_aware || !used_hosts.contains(&n.host))
                .collect();
            if node_candidates.is_empty() {
                return None;
            }
            let node_weights: Vec<u64> = node_candidates.iter().map(|n| n.weight).collect();
            let node_dist = WeightedIndex::new(&node_weights).ok()?;
            let node = node_candidates[node_dist.sample(rng)];

            let disk = node.disks.iter().max_by_key(|d| d.free_items)?;
            picked.push(disk.disk_id);
            used_hosts.insert(node.host.clone());
            used_racks.insert(rack.rack_key.clone());
        }

        Some(picked)
    }
}
