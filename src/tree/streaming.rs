//! Single-pass construction from a sorted key stream
//!
//! Keys are not retained. Every key walks from the root, bumping the counter
//! of its bin at each level and lazily creating children while width
//! remains. Because the stream is sorted, the bins a node sees arrive in
//! non-decreasing order, so each node keeps an append-only list of runs
//! instead of `num_bins` dense counters.
//!
//! The max-error split decision is deferred to [`StreamingTree::resolve`],
//! which runs the same breadth-first pass as the offline build over these
//! counters.

use std::ops::Range;

use super::resolve::{resolve, BinRun, BinSource, NodeFrame};
use super::{Geometry, LogicalTree};
use crate::layout::PAYLOAD_MASK;
use crate::ChtError;

const NO_CHILD: u32 = u32::MAX;

#[derive(Debug, Clone, Copy)]
struct StreamRun {
    bin: u32,
    count: u32,
    child: u32,
}

#[derive(Debug)]
struct StreamNode {
    lower: u64,
    /// Keys seen before the first key reached this node.
    start: u32,
    runs: Vec<StreamRun>,
}

impl StreamNode {
    fn new(lower: u64, start: u32) -> Self {
        Self {
            lower,
            start,
            runs: Vec::new(),
        }
    }
}

/// Shadow tree of per-bin counters built one key at a time.
#[derive(Debug)]
pub(crate) struct StreamingTree {
    geometry: Geometry,
    nodes: Vec<StreamNode>,
    num_keys: u32,
}

impl StreamingTree {
    pub fn new(geometry: Geometry) -> Self {
        Self {
            geometry,
            nodes: vec![StreamNode::new(0, 0)],
            num_keys: 0,
        }
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    /// Number of shadow nodes allocated so far.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Record `key`, which must not precede the previous key.
    ///
    /// Nothing is modified when an error is returned.
    pub fn insert(&mut self, key: u64) -> Result<(), ChtError> {
        if self.num_keys >= PAYLOAD_MASK {
            return Err(ChtError::TooManyKeys {
                limit: PAYLOAD_MASK as usize,
            });
        }
        let depth = self.geometry.shift.div_ceil(self.geometry.log_num_bins) as usize;
        if self.nodes.len() + depth > NO_CHILD as usize {
            return Err(ChtError::TableTooLarge {
                nodes: self.nodes.len() + depth,
                num_bins: self.geometry.num_bins,
            });
        }

        let offset = self.geometry.offset(key);
        let mut node = 0usize;
        let mut level = 0u32;

        loop {
            let width = self.geometry.width_at(level);
            let lower = self.nodes[node].lower;
            let bin = self.geometry.bin_of(offset, lower, width) as u32;

            let runs = &mut self.nodes[node].runs;
            let run = match runs.last() {
                Some(last) if last.bin == bin => runs.len() - 1,
                _ => {
                    debug_assert!(runs.last().map_or(true, |last| last.bin < bin));
                    runs.push(StreamRun {
                        bin,
                        count: 0,
                        child: NO_CHILD,
                    });
                    runs.len() - 1
                }
            };
            runs[run].count += 1;

            if width == 0 {
                break;
            }

            let mut child = runs[run].child;
            if child == NO_CHILD {
                child = self.nodes.len() as u32;
                let child_lower = self.geometry.child_lower(lower, bin as usize, width);
                self.nodes.push(StreamNode::new(child_lower, self.num_keys));
                self.nodes[node].runs[run].child = child;
            }

            node = child as usize;
            level += 1;
        }

        self.num_keys += 1;
        Ok(())
    }

    /// Apply the max-error split rule and return the logical tree.
    pub fn resolve(&self) -> Result<LogicalTree, ChtError> {
        resolve(self, &self.geometry, self.num_keys)
    }
}

impl BinSource for StreamingTree {
    type Cursor = u32;

    fn root(&self) -> u32 {
        0
    }

    fn runs(&self, cursor: u32, frame: NodeFrame, span: Range<u32>, out: &mut Vec<BinRun>) {
        let node = &self.nodes[cursor as usize];
        debug_assert_eq!(node.lower, frame.lower);
        debug_assert!(span.is_empty() || node.start == span.start);

        out.extend(node.runs.iter().map(|run| BinRun {
            bin: run.bin as usize,
            count: run.count,
        }));
    }

    fn descend(&self, cursor: u32, bin: usize) -> Option<u32> {
        let runs = &self.nodes[cursor as usize].runs;
        runs.binary_search_by_key(&(bin as u32), |run| run.bin)
            .ok()
            .map(|idx| runs[idx].child)
            .filter(|&child| child != NO_CHILD)
    }
}
