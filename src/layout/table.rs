//! Tagged 32-bit table words
//!
//! Leaf word:     `1 | partial_sum:31`
//! Internal word: `0 | child_offset:31`, where `child_offset = slot << log_num_bins`

use crate::tree::{Bin, LogicalTree};
use crate::ChtError;

/// Tag bit marking a leaf word.
pub const LEAF_TAG: u32 = 1 << 31;

/// Payload bits of a word.
pub const PAYLOAD_MASK: u32 = LEAF_TAG - 1;

/// Upper bound on table length so that every child offset keeps the tag bit clear.
pub const MAX_TABLE_WORDS: u64 = 1 << 31;

/// Decoded table word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Word {
    /// Number of keys before the bin.
    Leaf(u32),
    /// Table offset of the child node's first word.
    Child(u32),
}

impl Word {
    /// Decode a raw table word.
    #[inline]
    pub fn decode(raw: u32) -> Self {
        if raw & LEAF_TAG != 0 {
            Word::Leaf(raw & PAYLOAD_MASK)
        } else {
            Word::Child(raw)
        }
    }

    /// Encode into a raw table word.
    #[inline]
    pub fn encode(self) -> u32 {
        match self {
            Word::Leaf(partial_sum) => {
                debug_assert!(partial_sum <= PAYLOAD_MASK);
                LEAF_TAG | partial_sum
            }
            Word::Child(offset) => {
                debug_assert!(offset <= PAYLOAD_MASK);
                offset
            }
        }
    }
}

/// Flatten `tree` with node `i` stored at slot `order[i]`.
pub(crate) fn encode(tree: &LogicalTree, order: &[u32], log_num_bins: u32) -> Result<Vec<u32>, ChtError> {
    debug_assert_eq!(order.len(), tree.len());
    let words = (tree.len() as u64) << log_num_bins;
    if words > MAX_TABLE_WORDS {
        return Err(ChtError::TableTooLarge {
            nodes: tree.len(),
            num_bins: tree.num_bins(),
        });
    }

    let mut table = vec![0u32; words as usize];
    for (index, node) in tree.nodes().iter().enumerate() {
        let base = (order[index] as usize) << log_num_bins;
        for (slot, bin) in table[base..base + tree.num_bins()].iter_mut().zip(&node.bins) {
            let word = match *bin {
                Bin::Leaf { partial_sum } => Word::Leaf(partial_sum),
                Bin::Internal { child } => Word::Child(order[child as usize] << log_num_bins),
            };
            *slot = word.encode();
        }
    }

    Ok(table)
}
