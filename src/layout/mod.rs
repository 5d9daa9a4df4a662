//! Physical table layouts
//!
//! The logical tree is flattened into one contiguous `Vec<u32>`, `num_bins`
//! words per node. Layouts only choose which slot each node occupies; every
//! layout answers lookups identically.

mod cache_oblivious;
mod table;

pub use table::{Word, LEAF_TAG, MAX_TABLE_WORDS, PAYLOAD_MASK};

use tracing::debug;

use crate::tree::LogicalTree;
use crate::ChtError;

/// Node placement strategy for the flattened table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum LayoutMode {
    /// Nodes in allocation (breadth-first) order.
    #[default]
    Linear,

    /// Recursive level-split order that keeps root-to-leaf paths compact.
    CacheOblivious,
}

impl LayoutMode {
    pub(crate) fn as_byte(self) -> u8 {
        match self {
            LayoutMode::Linear => 0,
            LayoutMode::CacheOblivious => 1,
        }
    }

    pub(crate) fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(LayoutMode::Linear),
            1 => Some(LayoutMode::CacheOblivious),
            _ => None,
        }
    }
}

/// Flatten `tree` into its table under `mode`.
pub(crate) fn flatten(
    tree: &LogicalTree,
    mode: LayoutMode,
    log_num_bins: u32,
) -> Result<Vec<u32>, ChtError> {
    let order = match mode {
        LayoutMode::Linear => (0..tree.len() as u32).collect(),
        LayoutMode::CacheOblivious => cache_oblivious::order(tree),
    };
    let table = table::encode(tree, &order, log_num_bins)?;

    debug!(layout = ?mode, nodes = tree.len(), words = table.len(), "flattened table");
    Ok(table)
}
