//! Logical hist-tree
//!
//! Intermediate, node-indexed form of the index. Nodes live in an arena
//! (`Vec<Node>`) and refer to their children by index; the arena order is
//! breadth-first, so every child is allocated after its parent and all nodes
//! of one level inside a subtree form a contiguous index run.
//!
//! Two bin sources feed the same breadth-first resolver:
//! - [`offline`]: rescans the buffered keys of each bin,
//! - [`streaming`]: reads sparse bin counters accumulated one key at a time.

mod node;
mod offline;
mod resolve;
mod streaming;

pub(crate) use node::{Bin, LogicalTree, Node};
pub(crate) use offline::build_offline;
pub(crate) use streaming::StreamingTree;

use crate::builder::IndexConfig;
use crate::util::Log2;
use crate::ChtError;

/// Bit geometry shared by construction and lookup.
///
/// Each level consumes `log_num_bins` bits of `key - min_key`; `shift` is the
/// width left below the root's bin bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Geometry {
    pub min_key: u64,
    pub max_key: u64,
    pub num_bins: usize,
    pub log_num_bins: u32,
    pub max_error: usize,
    pub shift: u32,
}

impl Geometry {
    /// Derive the geometry for keys in `[min_key, max_key]`.
    ///
    /// The root width covers the bit length of `max_key - min_key`, so
    /// `max_key` itself always maps to a valid root bin. A range narrower
    /// than the branching factor clamps the shift to zero.
    pub fn new(min_key: u64, max_key: u64, config: &IndexConfig) -> Result<Self, ChtError> {
        if min_key > max_key {
            return Err(ChtError::InvalidConfiguration(format!(
                "min_key {} exceeds max_key {}",
                min_key, max_key
            )));
        }
        let range_bits = (max_key - min_key).bit_length();
        let log_num_bins = config.log_num_bins();

        Ok(Self {
            min_key,
            max_key,
            num_bins: config.num_bins(),
            log_num_bins,
            max_error: config.max_error(),
            shift: range_bits.saturating_sub(log_num_bins),
        })
    }

    /// Remaining width of a node at `level`.
    #[inline]
    pub fn width_at(&self, level: u32) -> u32 {
        self.shift
            .saturating_sub(level.saturating_mul(self.log_num_bins))
    }

    /// Offset of `key` relative to `min_key`.
    #[inline]
    pub fn offset(&self, key: u64) -> u64 {
        debug_assert!(key >= self.min_key);
        key - self.min_key
    }

    /// Bin of `offset` in a node starting at `lower` with the given width.
    #[inline]
    pub fn bin_of(&self, offset: u64, lower: u64, width: u32) -> usize {
        let bin = ((offset - lower) >> width) as usize;
        debug_assert!(bin < self.num_bins, "bin {} out of range", bin);
        bin
    }

    /// First offset addressed by the child of `bin`.
    #[inline]
    pub fn child_lower(&self, lower: u64, bin: usize, width: u32) -> u64 {
        lower + ((bin as u64) << width)
    }

    /// Whether a bin holding `size` keys in a node of `width` becomes internal.
    ///
    /// Width exhaustion forces a leaf even above the error bound.
    #[inline]
    pub fn splits(&self, size: usize, width: u32) -> bool {
        width > 0 && size >= self.max_error
    }
}
