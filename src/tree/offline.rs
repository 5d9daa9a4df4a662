//! Offline construction over fully buffered keys.

use std::ops::Range;

use super::resolve::{resolve, BinRun, BinSource, NodeFrame};
use super::{Geometry, LogicalTree};
use crate::layout::PAYLOAD_MASK;
use crate::util::Key;
use crate::ChtError;

/// Buffered, sorted keys; every node rescans only its own sub-range.
struct BufferedKeys<'a, K> {
    keys: &'a [K],
    geometry: &'a Geometry,
}

impl<K: Key> BinSource for BufferedKeys<'_, K> {
    type Cursor = ();

    fn root(&self) {}

    fn runs(&self, _cursor: (), frame: NodeFrame, span: Range<u32>, out: &mut Vec<BinRun>) {
        let keys = &self.keys[span.start as usize..span.end as usize];

        // Sorted input visits bins in non-decreasing order.
        for &key in keys {
            let offset = self.geometry.offset(key.to_u64());
            let bin = self.geometry.bin_of(offset, frame.lower, frame.width);
            match out.last_mut() {
                Some(run) if run.bin == bin => run.count += 1,
                _ => {
                    debug_assert!(out.last().map_or(true, |run| run.bin < bin));
                    out.push(BinRun { bin, count: 1 });
                }
            }
        }
    }

    fn descend(&self, _cursor: (), _bin: usize) -> Option<()> {
        Some(())
    }
}

/// Build the logical tree from sorted `keys` inside `geometry`'s bounds.
pub(crate) fn build_offline<K: Key>(
    keys: &[K],
    geometry: &Geometry,
) -> Result<LogicalTree, ChtError> {
    if keys.len() > PAYLOAD_MASK as usize {
        return Err(ChtError::TooManyKeys {
            limit: PAYLOAD_MASK as usize,
        });
    }
    resolve(&BufferedKeys { keys, geometry }, geometry, keys.len() as u32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::IndexConfig;
    use crate::tree::Bin;

    fn geometry(min: u64, max: u64, num_bins: usize, max_error: usize) -> Geometry {
        let config = IndexConfig::new(num_bins, max_error).unwrap();
        Geometry::new(min, max, &config).unwrap()
    }

    #[test]
    fn test_sparse_keys_split_dense_bin() {
        let keys: Vec<u64> = vec![
            2, 3, 6, 10, 13, 17, 20, 21, 25, 30, 32, 40, 41, 51, 56, 60, 67, 68, 120, 140, 200,
            400,
        ];
        let geometry = geometry(2, 400, 4, 4);
        let tree = build_offline(&keys, &geometry).unwrap();

        // Root bins are 128 offsets wide: 19 keys, then 2, 0 and 1.
        let root = &tree.nodes()[0];
        assert_eq!(root.bins[0], Bin::Internal { child: 1 });
        assert_eq!(root.bins[1], Bin::Leaf { partial_sum: 19 });
        assert_eq!(root.bins[2], Bin::Leaf { partial_sum: 21 });
        assert_eq!(root.bins[3], Bin::Leaf { partial_sum: 21 });
        assert_eq!(tree.nodes()[1].level, 1);
        assert_eq!(tree.nodes()[1].lower, 0);
    }

    #[test]
    fn test_duplicates_stop_at_exhausted_width() {
        let keys = vec![5u32; 8];
        let geometry = geometry(5, 5, 4, 2);
        let tree = build_offline(&keys, &geometry).unwrap();

        assert_eq!(tree.len(), 1);
        assert_eq!(tree.nodes()[0].bins[0], Bin::Leaf { partial_sum: 0 });
        assert!(tree.nodes()[0].is_terminal());
    }

    #[test]
    fn test_children_sit_one_level_deeper() {
        let keys: Vec<u64> = (0..500u64).map(|k| k * k).collect();
        let geometry = geometry(0, 499 * 499, 8, 3);
        let tree = build_offline(&keys, &geometry).unwrap();

        for node in tree.nodes() {
            assert_eq!(node.bins.len(), 8);
            for child in node.children() {
                assert!(child as usize > 0 && (child as usize) < tree.len());
                assert_eq!(tree.nodes()[child as usize].level, node.level + 1);
            }
        }
        // Breadth-first: levels never decrease along the arena.
        assert!(tree
            .nodes()
            .windows(2)
            .all(|pair| pair[0].level <= pair[1].level));
    }

    #[test]
    fn test_empty_input_yields_single_leaf_root() {
        let keys: Vec<u64> = Vec::new();
        let geometry = geometry(0, 0, 4, 4);
        let tree = build_offline(&keys, &geometry).unwrap();
        assert_eq!(tree.len(), 1);
        assert!(tree.nodes()[0]
            .bins
            .iter()
            .all(|bin| *bin == Bin::Leaf { partial_sum: 0 }));
    }
}
