//! Breadth-first split resolution shared by both build modes.

use std::collections::VecDeque;
use std::ops::Range;

use tracing::trace;

use super::{Bin, Geometry, LogicalTree, Node};
use crate::layout::MAX_TABLE_WORDS;
use crate::ChtError;

/// Maximal group of consecutive keys sharing a bin at one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct BinRun {
    pub bin: usize,
    pub count: u32,
}

/// Node being resolved, as seen by a [`BinSource`].
#[derive(Debug, Clone, Copy)]
pub(crate) struct NodeFrame {
    pub lower: u64,
    pub width: u32,
}

/// Supplies the per-bin key counts of a node.
///
/// `Cursor` locates the node inside the source (nothing for buffered keys,
/// the shadow node for streaming counters).
pub(crate) trait BinSource {
    type Cursor: Copy;

    fn root(&self) -> Self::Cursor;

    /// Push the runs of the node covering `span`, in ascending bin order.
    fn runs(
        &self,
        cursor: Self::Cursor,
        frame: NodeFrame,
        span: Range<u32>,
        out: &mut Vec<BinRun>,
    );

    /// Cursor of the child below `bin`, if the source has one.
    fn descend(&self, cursor: Self::Cursor, bin: usize) -> Option<Self::Cursor>;
}

/// Expand runs into one span per bin; untouched bins get an empty span at
/// the running position.
fn spans_from_runs(start: u32, runs: &[BinRun], num_bins: usize, out: &mut Vec<Range<u32>>) {
    out.clear();
    let mut cursor = start;
    let mut runs = runs.iter().peekable();

    for bin in 0..num_bins {
        let count = runs.next_if(|run| run.bin == bin).map_or(0, |run| run.count);
        out.push(cursor..cursor + count);
        cursor += count;
    }
    debug_assert!(runs.next().is_none(), "run beyond the last bin");
}

/// Build the logical tree over `num_keys` keys.
///
/// Nodes are appended in breadth-first order. A bin turns internal when it
/// holds at least `max_error` keys and its node still has width to split.
pub(crate) fn resolve<S: BinSource>(
    source: &S,
    geometry: &Geometry,
    num_keys: u32,
) -> Result<LogicalTree, ChtError> {
    let num_bins = geometry.num_bins;
    let max_nodes = (MAX_TABLE_WORDS >> geometry.log_num_bins) as usize;

    let mut nodes = vec![Node::new(0, 0)];
    let mut queue = VecDeque::new();
    queue.push_back((0usize, source.root(), 0..num_keys));

    let mut runs = Vec::new();
    let mut spans = Vec::with_capacity(num_bins);

    while let Some((index, cursor, span)) = queue.pop_front() {
        let Node { level, lower, .. } = nodes[index];
        let width = geometry.width_at(level);

        runs.clear();
        source.runs(cursor, NodeFrame { lower, width }, span.clone(), &mut runs);
        debug_assert_eq!(
            runs.iter().map(|run| run.count as usize).sum::<usize>(),
            span.len(),
            "runs must cover the node span"
        );
        spans_from_runs(span.start, &runs, num_bins, &mut spans);

        let mut bins = Vec::with_capacity(num_bins);
        for (bin, bin_span) in spans.iter().enumerate() {
            let child_cursor = if geometry.splits(bin_span.len(), width) {
                source.descend(cursor, bin)
            } else {
                None
            };

            match child_cursor {
                Some(child_cursor) => {
                    if nodes.len() >= max_nodes {
                        return Err(ChtError::TableTooLarge {
                            nodes: nodes.len() + 1,
                            num_bins,
                        });
                    }
                    let child = nodes.len();
                    nodes.push(Node::new(
                        level + 1,
                        geometry.child_lower(lower, bin, width),
                    ));
                    queue.push_back((child, child_cursor, bin_span.clone()));
                    bins.push(Bin::Internal {
                        child: child as u32,
                    });
                }
                None => bins.push(Bin::Leaf {
                    partial_sum: bin_span.start,
                }),
            }
        }

        nodes[index].bins = bins;
        trace!(node = index, bins = %nodes[index], "resolved node");
    }

    Ok(LogicalTree::from_nodes(nodes, num_bins))
}
