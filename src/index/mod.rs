//! Read-only Compact Hist-Tree
//!
//! The index is a flat `Vec<u32>` plus a handful of scalars. A lookup walks
//! from the root consuming `log_num_bins` key bits per level until it reaches
//! a leaf word, whose payload is the first candidate position.

mod persist;

use std::fmt;
use std::ops::Range;

use crate::builder::{Builder, IndexConfig};
use crate::layout::{LayoutMode, LEAF_TAG, PAYLOAD_MASK};
use crate::tree::Geometry;
use crate::util::Key;
use crate::ChtError;

/// Half-open candidate range `[begin, end)` of positions in the sorted keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SearchBound {
    /// First candidate position.
    pub begin: usize,
    /// One past the last candidate position.
    pub end: usize,
}

impl SearchBound {
    /// Number of candidate positions.
    #[inline]
    pub fn len(&self) -> usize {
        self.end - self.begin
    }

    /// Check if the bound holds no position
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.begin == self.end
    }

    /// Whether `position` lies inside the bound.
    #[inline]
    pub fn contains(&self, position: usize) -> bool {
        self.begin <= position && position < self.end
    }

    /// The bound as a range, for slicing the key array.
    #[inline]
    pub fn as_range(&self) -> Range<usize> {
        self.begin..self.end
    }
}

impl fmt::Display for SearchBound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.begin, self.end)
    }
}

/// Immutable, error-bounded radix index over sorted keys.
///
/// For every key present in the indexed array, [`get_search_bound`] returns
/// a range that contains the key's first position and is at most
/// `max_error + 1` wide. The index is `Send + Sync` and needs no locking.
///
/// [`get_search_bound`]: CompactHistTree::get_search_bound
#[derive(Clone, PartialEq, Eq)]
pub struct CompactHistTree<K: Key> {
    min_key: K,
    max_key: K,
    num_keys: usize,
    num_bins: usize,
    log_num_bins: u32,
    max_error: usize,
    shift: u32,
    max_key_present: bool,
    layout: LayoutMode,
    table: Vec<u32>,
}

impl<K: Key> CompactHistTree<K> {
    pub(crate) fn assemble(
        geometry: &Geometry,
        (min_key, max_key): (K, K),
        num_keys: usize,
        max_key_present: bool,
        layout: LayoutMode,
        table: Vec<u32>,
    ) -> Self {
        debug_assert_eq!(table.len() % geometry.num_bins, 0);
        Self {
            min_key,
            max_key,
            num_keys,
            num_bins: geometry.num_bins,
            log_num_bins: geometry.log_num_bins,
            max_error: geometry.max_error,
            shift: geometry.shift,
            max_key_present,
            layout,
            table,
        }
    }

    /// Build an index over an already sorted slice.
    ///
    /// Bounds are the first and last element; an empty slice yields an
    /// empty index.
    pub fn from_sorted(keys: &[K], config: IndexConfig) -> Result<Self, ChtError> {
        let (min_key, max_key) = match (keys.first(), keys.last()) {
            (Some(&first), Some(&last)) => (first, last),
            _ => (K::MIN, K::MIN),
        };
        let mut builder = Builder::new(min_key, max_key, config)?;
        builder.add_keys(keys.iter().copied())?;
        builder.finalize()
    }

    /// Candidate range for `key`.
    ///
    /// Total: keys outside `[min_key, max_key]` clamp to the ends, and an
    /// empty index always answers `[0, 0)`.
    pub fn get_search_bound(&self, key: K) -> SearchBound {
        if self.num_keys == 0 {
            return SearchBound::default();
        }

        let begin = if key <= self.min_key {
            0
        } else if key > self.max_key || (key == self.max_key && !self.max_key_present) {
            self.num_keys
        } else {
            self.descend(key.to_u64() - self.min_key.to_u64())
        };

        SearchBound {
            begin,
            end: begin
                .saturating_add(self.max_error + 1)
                .min(self.num_keys),
        }
    }

    #[inline]
    fn descend(&self, mut offset: u64) -> usize {
        let mut width = self.shift;
        let mut base = 0usize;

        loop {
            let bin = (offset >> width) as usize;
            let word = self.table[base + bin];
            if word & LEAF_TAG != 0 {
                return (word & PAYLOAD_MASK) as usize;
            }
            base = word as usize;
            offset -= (bin as u64) << width;
            width = width.saturating_sub(self.log_num_bins);
        }
    }

    /// First position in `keys` holding a value `>= key`.
    ///
    /// `keys` must be the slice this index was built over. Only the candidate
    /// range is searched.
    pub fn lower_bound_in(&self, keys: &[K], key: K) -> usize {
        let bound = self.get_search_bound(key);
        let end = bound.end.min(keys.len());
        let begin = bound.begin.min(end);
        begin + keys[begin..end].partition_point(|&probe| probe < key)
    }

    /// Heap and inline footprint of the index.
    pub fn size_in_bytes(&self) -> usize {
        std::mem::size_of::<Self>() + self.table.len() * std::mem::size_of::<u32>()
    }

    /// Smallest representable key.
    pub fn min_key(&self) -> K {
        self.min_key
    }

    /// Largest representable key.
    pub fn max_key(&self) -> K {
        self.max_key
    }

    /// Number of indexed keys.
    pub fn num_keys(&self) -> usize {
        self.num_keys
    }

    /// Check if no key was indexed
    pub fn is_empty(&self) -> bool {
        self.num_keys == 0
    }

    /// Bins per node.
    pub fn num_bins(&self) -> usize {
        self.num_bins
    }

    /// Maximum error of a search bound.
    pub fn max_error(&self) -> usize {
        self.max_error
    }

    /// Width of the root node in bits.
    pub fn shift(&self) -> u32 {
        self.shift
    }

    /// Layout of the table.
    pub fn layout(&self) -> LayoutMode {
        self.layout
    }

    /// Whether `max_key` is one of the indexed keys.
    pub fn max_key_present(&self) -> bool {
        self.max_key_present
    }

    /// Number of tree nodes in the table.
    pub fn node_count(&self) -> usize {
        self.table.len() >> self.log_num_bins
    }

    /// Raw flattened table words.
    pub fn table(&self) -> &[u32] {
        &self.table
    }
}

impl<K: Key> fmt::Debug for CompactHistTree<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompactHistTree")
            .field("min_key", &self.min_key)
            .field("max_key", &self.max_key)
            .field("num_keys", &self.num_keys)
            .field("num_bins", &self.num_bins)
            .field("max_error", &self.max_error)
            .field("shift", &self.shift)
            .field("layout", &self.layout)
            .field("nodes", &self.node_count())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::BuildMode;

    fn index(keys: &[u64], num_bins: usize, max_error: usize) -> CompactHistTree<u64> {
        let config = IndexConfig::new(num_bins, max_error).unwrap();
        CompactHistTree::from_sorted(keys, config).unwrap()
    }

    #[test]
    fn test_bound_covers_every_key() {
        let keys: Vec<u64> = (0..500).map(|k| k * k).collect();
        let index = index(&keys, 8, 4);

        for (position, &key) in keys.iter().enumerate() {
            let bound = index.get_search_bound(key);
            assert!(bound.contains(position), "key {} bound {}", key, bound);
            assert!(bound.len() <= 5);
        }
    }

    #[test]
    fn test_empty_index_answers_empty_bound() {
        let index = index(&[], 4, 4);
        assert!(index.is_empty());
        assert_eq!(index.get_search_bound(0), SearchBound { begin: 0, end: 0 });
        assert_eq!(index.get_search_bound(u64::MAX), SearchBound::default());
        assert_eq!(index.lower_bound_in(&[], 9), 0);
    }

    #[test]
    fn test_keys_outside_bounds_clamp_to_ends() {
        let keys: Vec<u64> = (100..200).collect();
        let index = index(&keys, 4, 8);

        assert_eq!(index.get_search_bound(3).begin, 0);
        assert_eq!(index.get_search_bound(100).begin, 0);
        let past = index.get_search_bound(500);
        assert_eq!(past, SearchBound { begin: 100, end: 100 });
    }

    #[test]
    fn test_absent_max_key_maps_past_the_end() {
        let config = IndexConfig::new(4, 2).unwrap();
        let mut builder = Builder::new(0u32, 1_000, config).unwrap();
        builder.add_keys([1, 5, 600]).unwrap();
        let index = builder.finalize().unwrap();

        assert!(!index.max_key_present());
        assert_eq!(index.get_search_bound(1_000), SearchBound { begin: 3, end: 3 });
        assert!(index.get_search_bound(600).contains(2));
    }

    #[test]
    fn test_duplicates_resolve_to_first_occurrence() {
        let mut keys = vec![7u64; 50];
        keys.extend([8, 9, 10]);
        keys.extend(vec![11u64; 30]);
        let index = index(&keys, 2, 3);

        assert_eq!(index.get_search_bound(7).begin, 0);
        assert!(index.get_search_bound(11).contains(53));
        assert_eq!(index.lower_bound_in(&keys, 11), 53);
    }

    #[test]
    fn test_lower_bound_matches_partition_point() {
        let keys: Vec<u64> = (0..400).map(|k| k * 5 + (k % 3)).collect();
        let index = index(&keys, 16, 6);

        for probe in 0..2_100 {
            let expected = keys.partition_point(|&key| key < probe);
            assert_eq!(index.lower_bound_in(&keys, probe), expected, "probe {}", probe);
        }
    }

    #[test]
    fn test_size_accounts_for_table_words() {
        let keys: Vec<u64> = (0..1_000).collect();
        let index = index(&keys, 4, 4);
        assert_eq!(
            index.size_in_bytes(),
            std::mem::size_of::<CompactHistTree<u64>>() + index.table().len() * 4
        );
        assert_eq!(index.node_count() * 4, index.table().len());
    }

    #[test]
    fn test_from_sorted_honours_single_pass() {
        let keys: Vec<u32> = (0..300).map(|k| k * 13).collect();
        let offline = CompactHistTree::from_sorted(&keys, IndexConfig::new(8, 4).unwrap()).unwrap();
        let streamed = CompactHistTree::from_sorted(
            &keys,
            IndexConfig::new(8, 4)
                .unwrap()
                .with_build_mode(BuildMode::SinglePass),
        )
        .unwrap();
        assert_eq!(offline, streamed);
    }

    #[test]
    fn test_index_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<CompactHistTree<u32>>();
        assert_send_sync::<CompactHistTree<u64>>();
    }
}
