//! Replica group representation

use seriesio_common::Node;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Index;

/// An ordered set of nodes that redundantly store the same slots.
///
/// The first node is the **header**; it identifies the group and is the key
/// under which the group owns slots in the partition table.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PartitionGroup {
    nodes: Vec<Node>,
}

impl PartitionGroup {
    #[must_use]
    pub fn new(nodes: Vec<Node>) -> Self {
        Self { nodes }
    }

    /// The header node identifying this group.
    ///
    /// # Panics
    /// Panics if the group is empty; groups produced by the partition table
    /// always carry at least one node.
    #[must_use]
    pub fn header(&self) -> &Node {
        &self.nodes[0]
    }

    /// The last node of the group, used by the add-node tie-break.
    #[must_use]
    pub fn last(&self) -> &Node {
        &self.nodes[self.nodes.len() - 1]
    }

    #[must_use]
    pub fn contains(&self, node: &Node) -> bool {
        self.nodes.contains(node)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter()
    }

    #[must_use]
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Insert `node` at `index`, keeping group order.
    pub fn insert(&mut self, index: usize, node: Node) {
        self.nodes.insert(index, node);
    }

    /// Remove `node` if present, keeping group order.
    pub fn remove(&mut self, node: &Node) -> bool {
        match self.nodes.iter().position(|n| n == node) {
            Some(pos) => {
                self.nodes.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Drop the last node of the group.
    pub fn pop(&mut self) -> Option<Node> {
        self.nodes.pop()
    }

    pub fn push(&mut self, node: Node) {
        self.nodes.push(node);
    }
}

impl Index<usize> for PartitionGroup {
    type Output = Node;

    fn index(&self, index: usize) -> &Node {
        &self.nodes[index]
    }
}

impl<'a> IntoIterator for &'a PartitionGroup {
    type Item = &'a Node;
    type IntoIter = std::slice::Iter<'a, Node>;

    fn into_iter(self) -> Self::IntoIter {
        self.nodes.iter()
    }
}

impl FromIterator<Node> for PartitionGroup {
    fn from_iter<T: IntoIterator<Item = Node>>(iter: T) -> Self {
        Self {
            nodes: iter.into_iter().collect(),
        }
    }
}

impl fmt::Display for PartitionGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, node) in self.nodes.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{node}")?;
        }
        write!(f, "]")
    }
}
