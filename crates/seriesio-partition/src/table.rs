//! Slot partition table
//!
//! Nodes are arranged on a ring ordered by node identifier. Every node heads
//! one replica group made of itself plus the next `replication_num - 1` ring
//! nodes; slots are owned by header groups. The table keeps the invariant
//! that the owned-slot sets of all header groups partition `[0, SLOT_NUM)`
//! exactly.

use crate::group::PartitionGroup;
use seriesio_common::config::SLOT_NUM;
use seriesio_common::{Node, Slot};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info};

/// Outcome of removing a node from the table.
///
/// `removed_group` is the dissolved group that used to own the reassigned
/// slots; receivers pull the corresponding file snapshots from its members.
/// `new_slot_owners` maps each receiving group's header to the slots that
/// group gained.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeRemovalResult {
    pub removed_group: PartitionGroup,
    pub new_slot_owners: HashMap<Node, Vec<Slot>>,
}

/// Maps every slot to its owning replica group.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SlotPartitionTable {
    replication_num: usize,
    /// All nodes sorted by identifier
    ring: Vec<Node>,
    /// Header node -> slots owned by the group it heads
    node_slot_map: HashMap<Node, Vec<Slot>>,
    /// Slot -> header node of the owning group
    slot_map: Vec<Node>,
}

impl SlotPartitionTable {
    /// Build a table over `nodes`, splitting the slot universe evenly among
    /// the header groups.
    ///
    /// # Panics
    /// Panics if `nodes` is empty.
    #[must_use]
    pub fn new(mut nodes: Vec<Node>, replication_num: usize) -> Self {
        assert!(!nodes.is_empty(), "partition table requires at least one node");
        nodes.sort();
        nodes.dedup();

        let count = nodes.len();
        let avg = SLOT_NUM as usize / count;
        let mut node_slot_map: HashMap<Node, Vec<Slot>> = HashMap::new();
        let mut slot_map: Vec<Node> = Vec::with_capacity(SLOT_NUM as usize);
        for (i, node) in nodes.iter().enumerate() {
            let start = i * avg;
            let end = if i == count - 1 { SLOT_NUM as usize } else { (i + 1) * avg };
            let slots: Vec<Slot> = (start as Slot..end as Slot).collect();
            for _ in &slots {
                slot_map.push(node.clone());
            }
            node_slot_map.insert(node.clone(), slots);
        }

        info!(nodes = count, replication = replication_num, "partition table initialized");
        Self {
            replication_num,
            ring: nodes,
            node_slot_map,
            slot_map,
        }
    }

    /// All nodes in ring order.
    #[must_use]
    pub fn ring(&self) -> &[Node] {
        &self.ring
    }

    /// The group headed by `header`: `replication_num` consecutive ring
    /// nodes starting at the header, wrapping around the ring.
    #[must_use]
    pub fn header_group(&self, header: &Node) -> Option<PartitionGroup> {
        let start = self.ring.iter().position(|n| n == header)?;
        let take = self.replication_num.min(self.ring.len());
        let group = (0..take)
            .map(|i| self.ring[(start + i) % self.ring.len()].clone())
            .collect();
        Some(group)
    }

    /// Every header group of the table, in ring order.
    #[must_use]
    pub fn groups(&self) -> Vec<PartitionGroup> {
        self.ring
            .iter()
            .filter_map(|n| self.header_group(n))
            .collect()
    }

    /// Slots owned by the group headed by `header`.
    #[must_use]
    pub fn slots_of(&self, header: &Node) -> &[Slot] {
        self.node_slot_map
            .get(header)
            .map_or(&[], Vec::as_slice)
    }

    /// Header of the group owning `slot`.
    #[must_use]
    pub fn owner_of(&self, slot: Slot) -> &Node {
        &self.slot_map[slot as usize]
    }

    /// Slot a storage group partition maps to.
    #[must_use]
    pub fn slot_of(storage_group: &str, partition_id: i64) -> Slot {
        let mut hash: i64 = 0;
        for b in storage_group.bytes() {
            hash = hash.wrapping_mul(31).wrapping_add(i64::from(b));
        }
        hash = hash.wrapping_mul(31).wrapping_add(partition_id);
        (hash.rem_euclid(i64::from(SLOT_NUM))) as Slot
    }

    /// Whether the group headed by `header` owns the slot of
    /// `(storage_group, partition_id)`.
    #[must_use]
    pub fn is_managed_by(&self, header: &Node, storage_group: &str, partition_id: i64) -> bool {
        self.owner_of(Self::slot_of(storage_group, partition_id)) == header
    }

    /// Add a node to the ring. The new node heads a fresh group which takes
    /// an even share of slots from every existing group. Returns the slots
    /// the new group gained, keyed by the previous owner's header.
    pub fn add_node(&mut self, node: Node) -> HashMap<Node, Vec<Slot>> {
        if self.ring.contains(&node) {
            return HashMap::new();
        }
        let pos = self.ring.partition_point(|n| n < &node);
        self.ring.insert(pos, node.clone());

        let new_count = self.ring.len();
        let mut taken: HashMap<Node, Vec<Slot>> = HashMap::new();
        let mut gained: Vec<Slot> = Vec::new();
        for header in &self.ring {
            if header == &node {
                continue;
            }
            let owned = self
                .node_slot_map
                .get_mut(header)
                .expect("every header owns a slot list");
            let to_move = owned.len() / new_count;
            let moved: Vec<Slot> = owned.split_off(owned.len() - to_move);
            for &slot in &moved {
                self.slot_map[slot as usize] = node.clone();
            }
            gained.extend(&moved);
            taken.insert(header.clone(), moved);
        }
        debug!(node = %node, slots = gained.len(), "node added to partition table");
        self.node_slot_map.insert(node, gained);
        taken
    }

    /// Remove a node from the ring, dissolving the group it heads. The
    /// dissolved group's slots are spread evenly over the remaining groups.
    pub fn remove_node(&mut self, node: &Node) -> Option<NodeRemovalResult> {
        if !self.ring.contains(node) {
            return None;
        }
        let removed_group = self
            .header_group(node)
            .expect("ring membership was just checked");
        let orphaned = self.node_slot_map.remove(node).unwrap_or_default();
        self.ring.retain(|n| n != node);

        let mut new_slot_owners: HashMap<Node, Vec<Slot>> = HashMap::new();
        if !self.ring.is_empty() {
            let per_group = orphaned.len() / self.ring.len();
            let mut rest = orphaned.len() % self.ring.len();
            let mut cursor = orphaned.into_iter();
            for header in &self.ring {
                let mut share = per_group;
                if rest > 0 {
                    share += 1;
                    rest -= 1;
                }
                let slots: Vec<Slot> = cursor.by_ref().take(share).collect();
                for &slot in &slots {
                    self.slot_map[slot as usize] = header.clone();
                }
                self.node_slot_map
                    .get_mut(header)
                    .expect("every header owns a slot list")
                    .extend(&slots);
                new_slot_owners.insert(header.clone(), slots);
            }
        }

        info!(node = %node, "node removed from partition table");
        Some(NodeRemovalResult {
            removed_group,
            new_slot_owners,
        })
    }
}
