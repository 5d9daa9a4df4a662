//! # Compact Hist-Tree
//!
//! A succinct, error-bounded radix index over a sorted array of `u32` or
//! `u64` keys. Given a key, the index returns a half-open range of array
//! positions that contains the key if it is present, at most
//! `max_error + 1` positions wide. It replaces or narrows binary search over
//! sorted runs.
//!
//! ## Structure
//!
//! 1. **Histogram tree**: each node splits its key sub-range into
//!    `num_bins` equal-width bins; a bin holding at least `max_error` keys is
//!    split again one level deeper.
//! 2. **Two build modes**: offline (keys buffered, tree built breadth-first at
//!    finalize) or single-pass (per-bin counters updated as keys stream in).
//! 3. **Two layouts**: nodes flattened into one `Vec<u32>` either in
//!    breadth-first order or in a cache-oblivious recursive order.
//! 4. **Lookup**: a branch-light walk from the root, consuming
//!    `log2(num_bins)` key bits per level.
//!
//! ## Usage Example
//!
//! ```
//! use cht::{Builder, IndexConfig};
//!
//! let keys: Vec<u64> = (0..10_000).map(|k| k * 7).collect();
//! let config = IndexConfig::new(64, 16)?;
//!
//! let mut builder = Builder::new(keys[0], keys[keys.len() - 1], config)?;
//! builder.add_keys(keys.iter().copied())?;
//! let index = builder.finalize()?;
//!
//! let bound = index.get_search_bound(700);
//! assert!(bound.contains(100));
//! assert_eq!(index.lower_bound_in(&keys, 701), 101);
//! # Ok::<(), cht::ChtError>(())
//! ```

#![warn(missing_docs, missing_debug_implementations)]

pub mod builder; // Configuration and key ingestion
pub mod index; // Read-only index, lookup, dump/reload
pub mod layout; // Table word encoding and node placement
mod tree; // Logical tree and split resolution
pub mod util; // Bit helpers and key trait

pub use builder::{BuildMode, Builder, IndexConfig};
pub use index::{CompactHistTree, SearchBound};
pub use layout::LayoutMode;
pub use util::Key;

use thiserror::Error;

/// Errors raised while configuring, building or reloading an index
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChtError {
    /// Rejected configuration or key bounds
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Key smaller than its predecessor
    #[error("Key {key} arrived after larger key {previous}")]
    OutOfOrderKey {
        /// Rejected key
        key: u64,
        /// Last accepted key
        previous: u64,
    },

    /// Key outside the builder's bounds
    #[error("Key {key} outside [{min_key}, {max_key}]")]
    KeyOutOfRange {
        /// Rejected key
        key: u64,
        /// Lower bound
        min_key: u64,
        /// Upper bound
        max_key: u64,
    },

    /// More keys than a table word can count
    #[error("Too many keys: at most {limit} are supported")]
    TooManyKeys {
        /// Maximum number of keys
        limit: usize,
    },

    /// Table exceeds the addressable word range
    #[error("Table too large: {nodes} nodes of {num_bins} bins")]
    TableTooLarge {
        /// Node count reached
        nodes: usize,
        /// Bins per node
        num_bins: usize,
    },

    /// Dump failed validation on reload
    #[error("Corrupt dump: {0}")]
    CorruptDump(String),
}
