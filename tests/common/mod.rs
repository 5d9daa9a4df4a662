#![allow(dead_code)]

use cht::{Builder, CompactHistTree, IndexConfig, Key, SearchBound};

/// Deterministic 64-bit mixer for reproducible key sets.
pub fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9E37_79B9_7F4A_7C15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// `count` sorted pseudo-random keys below `limit`, duplicates included.
pub fn random_keys(seed: u64, count: usize, limit: u64) -> Vec<u64> {
    let mut state = seed;
    let mut keys: Vec<u64> = (0..count).map(|_| splitmix64(&mut state) % limit).collect();
    keys.sort_unstable();
    keys
}

/// Index built with explicit bounds `[min_key, max_key]`.
pub fn build_with_bounds<K: Key>(
    keys: &[K],
    min_key: K,
    max_key: K,
    config: IndexConfig,
) -> CompactHistTree<K> {
    let mut builder = Builder::new(min_key, max_key, config).expect("builder initialises");
    builder
        .add_keys(keys.iter().copied())
        .expect("sorted keys are accepted");
    builder.finalize().expect("finalize succeeds")
}

/// Position of the first occurrence of `key`.
pub fn first_position<K: Key>(keys: &[K], key: K) -> usize {
    keys.partition_point(|&probe| probe < key)
}

/// Assert coverage and width for every indexed key.
pub fn assert_covers_all<K: Key>(index: &CompactHistTree<K>, keys: &[K]) {
    for &key in keys {
        let position = first_position(keys, key);
        let bound = index.get_search_bound(key);
        assert!(
            bound.contains(position),
            "key {} at {} outside {}",
            key,
            position,
            bound
        );
        assert_width(index, bound);
    }
}

pub fn assert_width<K: Key>(index: &CompactHistTree<K>, bound: SearchBound) {
    assert!(bound.begin <= bound.end);
    assert!(bound.end <= index.num_keys());
    assert!(bound.len() <= index.max_error() + 1, "bound {} too wide", bound);
}
