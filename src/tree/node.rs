//! Arena nodes of the logical tree
//!
//! Node = `num_bins` bins over one key sub-range at one level.
//! Bin = leaf (partial sum) or internal (arena index of the child).

use std::fmt;

/// State of one bin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Bin {
    /// Final bin: number of keys strictly before its span.
    Leaf {
        /// Partial sum stored in the table.
        partial_sum: u32,
    },

    /// Split bin: refers to the child covering exactly its span.
    Internal {
        /// Arena index of the child.
        child: u32,
    },
}

impl Bin {
    /// Child index, if internal.
    #[inline]
    pub fn child(&self) -> Option<u32> {
        match *self {
            Bin::Internal { child } => Some(child),
            Bin::Leaf { .. } => None,
        }
    }
}

/// One node of the logical tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Node {
    /// Distance from the root.
    pub level: u32,

    /// First addressable offset (relative to `min_key`).
    pub lower: u64,

    /// Exactly `num_bins` bins once resolved.
    pub bins: Vec<Bin>,
}

impl Node {
    /// Unresolved node; bins are filled in by the resolver.
    pub fn new(level: u32, lower: u64) -> Self {
        Self {
            level,
            lower,
            bins: Vec::new(),
        }
    }

    /// Arena indices of all children, in bin order.
    pub fn children(&self) -> impl Iterator<Item = u32> + '_ {
        self.bins.iter().filter_map(Bin::child)
    }

    /// Check if every bin is a leaf
    #[inline]
    pub fn is_terminal(&self) -> bool {
        self.bins.iter().all(|bin| bin.child().is_none())
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}@{} [", self.level, self.lower)?;
        for (idx, bin) in self.bins.iter().enumerate() {
            if idx > 0 {
                write!(f, " ")?;
            }
            match bin {
                Bin::Leaf { partial_sum } => write!(f, "{}", partial_sum)?,
                Bin::Internal { child } => write!(f, "->{}", child)?,
            }
        }
        write!(f, "]")
    }
}

/// Resolved logical tree: arena in breadth-first allocation order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LogicalTree {
    nodes: Vec<Node>,
    num_bins: usize,
}

impl LogicalTree {
    pub fn from_nodes(nodes: Vec<Node>, num_bins: usize) -> Self {
        debug_assert!(!nodes.is_empty(), "tree needs a root");
        debug_assert!(nodes.iter().all(|node| node.bins.len() == num_bins));
        Self { nodes, num_bins }
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn num_bins(&self) -> usize {
        self.num_bins
    }

    /// Deepest level present. Breadth-first order puts it last.
    pub fn max_level(&self) -> u32 {
        self.nodes.last().map_or(0, |node| node.level)
    }

    /// Number of levels (root only = 1).
    pub fn depth(&self) -> u32 {
        self.max_level() + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_children_skip_leaves() {
        let node = Node {
            level: 0,
            lower: 0,
            bins: vec![
                Bin::Leaf { partial_sum: 0 },
                Bin::Internal { child: 1 },
                Bin::Leaf { partial_sum: 9 },
                Bin::Internal { child: 2 },
            ],
        };
        assert_eq!(node.children().collect::<Vec<_>>(), vec![1, 2]);
        assert!(!node.is_terminal());
        assert_eq!(node.to_string(), "L0@0 [0 ->1 9 ->2]");
    }

    #[test]
    fn test_depth_follows_last_node() {
        let leaf = |level, lower| Node {
            level,
            lower,
            bins: vec![Bin::Leaf { partial_sum: 0 }; 2],
        };
        let root = Node {
            level: 0,
            lower: 0,
            bins: vec![Bin::Internal { child: 1 }, Bin::Leaf { partial_sum: 3 }],
        };
        let tree = LogicalTree::from_nodes(vec![root, leaf(1, 0)], 2);
        assert_eq!(tree.len(), 2);
        assert_eq!(tree.depth(), 2);
        assert!(tree.nodes()[1].is_terminal());
    }
}
