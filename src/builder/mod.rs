//! Index construction
//!
//! A [`Builder`] consumes a non-decreasing key stream and is consumed once
//! by [`Builder::finalize`], which resolves the logical tree, flattens it and
//! returns the read-only [`CompactHistTree`].

mod config;

pub use config::{BuildMode, IndexConfig, DEFAULT_MAX_ERROR, DEFAULT_NUM_BINS, MAX_NUM_BINS};

use tracing::debug;

use crate::index::CompactHistTree;
use crate::layout::{self, PAYLOAD_MASK};
use crate::tree::{self, Geometry, StreamingTree};
use crate::util::Key;
use crate::ChtError;

/// Transient per-mode state, released by `finalize`.
#[derive(Debug)]
enum Ingest<K> {
    Buffered(Vec<K>),
    Streaming(StreamingTree),
}

/// Builds a [`CompactHistTree`] from sorted keys.
///
/// Keys must arrive in non-decreasing order and, when bounds were given,
/// inside `[min_key, max_key]`. A rejected key leaves the builder unchanged.
#[derive(Debug)]
pub struct Builder<K: Key> {
    config: IndexConfig,
    bounds: Option<(K, K)>,
    ingest: Ingest<K>,
    num_keys: usize,
    prev_key: Option<K>,
}

impl<K: Key> Builder<K> {
    /// Create a builder for keys in `[min_key, max_key]`.
    pub fn new(min_key: K, max_key: K, config: IndexConfig) -> Result<Self, ChtError> {
        let geometry = Geometry::new(min_key.to_u64(), max_key.to_u64(), &config)?;
        let ingest = match config.build_mode() {
            BuildMode::Offline => Ingest::Buffered(Vec::new()),
            BuildMode::SinglePass => Ingest::Streaming(StreamingTree::new(geometry)),
        };

        Ok(Self {
            config,
            bounds: Some((min_key, max_key)),
            ingest,
            num_keys: 0,
            prev_key: None,
        })
    }

    /// Create an offline builder whose bounds are the first and last key added.
    pub fn with_inferred_bounds(config: IndexConfig) -> Result<Self, ChtError> {
        if config.build_mode() == BuildMode::SinglePass {
            return Err(ChtError::InvalidConfiguration(
                "single-pass construction requires explicit key bounds".to_string(),
            ));
        }

        Ok(Self {
            config,
            bounds: None,
            ingest: Ingest::Buffered(Vec::new()),
            num_keys: 0,
            prev_key: None,
        })
    }

    /// Configuration in use.
    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    /// Number of keys accepted so far.
    pub fn num_keys(&self) -> usize {
        self.num_keys
    }

    /// Add the next key.
    pub fn add_key(&mut self, key: K) -> Result<(), ChtError> {
        if let Some((min_key, max_key)) = self.bounds {
            if key < min_key || key > max_key {
                return Err(ChtError::KeyOutOfRange {
                    key: key.to_u64(),
                    min_key: min_key.to_u64(),
                    max_key: max_key.to_u64(),
                });
            }
        }
        if let Some(previous) = self.prev_key {
            if key < previous {
                return Err(ChtError::OutOfOrderKey {
                    key: key.to_u64(),
                    previous: previous.to_u64(),
                });
            }
        }
        if self.num_keys >= PAYLOAD_MASK as usize {
            return Err(ChtError::TooManyKeys {
                limit: PAYLOAD_MASK as usize,
            });
        }

        match &mut self.ingest {
            Ingest::Buffered(keys) => keys.push(key),
            Ingest::Streaming(stream) => stream.insert(key.to_u64())?,
        }
        self.num_keys += 1;
        self.prev_key = Some(key);
        Ok(())
    }

    /// Add every key of `keys`, stopping at the first rejected one.
    pub fn add_keys<I>(&mut self, keys: I) -> Result<(), ChtError>
    where
        I: IntoIterator<Item = K>,
    {
        keys.into_iter().try_for_each(|key| self.add_key(key))
    }

    /// Build the read-only index, consuming the builder.
    pub fn finalize(self) -> Result<CompactHistTree<K>, ChtError> {
        let (min_key, max_key) = match (self.bounds, &self.ingest) {
            (Some(bounds), _) => bounds,
            (None, Ingest::Buffered(keys)) => match (keys.first(), keys.last()) {
                (Some(&first), Some(&last)) => (first, last),
                _ => (K::MIN, K::MIN),
            },
            (None, Ingest::Streaming(stream)) => {
                let geometry = stream.geometry();
                match (K::from_u64(geometry.min_key), K::from_u64(geometry.max_key)) {
                    (Some(min_key), Some(max_key)) => (min_key, max_key),
                    _ => (K::MIN, K::MIN),
                }
            }
        };
        let max_key_present = self.prev_key == Some(max_key);

        let (geometry, logical) = match &self.ingest {
            Ingest::Buffered(keys) => {
                let geometry = Geometry::new(min_key.to_u64(), max_key.to_u64(), &self.config)?;
                (geometry, tree::build_offline(keys, &geometry)?)
            }
            Ingest::Streaming(stream) => {
                debug!(shadow_nodes = stream.node_count(), "resolving streamed counters");
                (*stream.geometry(), stream.resolve()?)
            }
        };
        debug!(
            num_keys = self.num_keys,
            nodes = logical.len(),
            depth = logical.depth(),
            mode = ?self.config.build_mode(),
            "built logical tree"
        );

        let table = layout::flatten(&logical, self.config.layout(), geometry.log_num_bins)?;

        Ok(CompactHistTree::assemble(
            &geometry,
            (min_key, max_key),
            self.num_keys,
            max_key_present,
            self.config.layout(),
            table,
        ))
    }
}
