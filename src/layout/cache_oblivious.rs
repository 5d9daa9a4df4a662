//! Cache-oblivious node order
//!
//! Recursive level splitting in the spirit of the van Emde Boas layout: the
//! top half of a subtree's levels is laid out first, then every bottom
//! subtree, each piece recursively split the same way. Root-to-leaf paths
//! then touch few memory blocks at every block size.
//!
//! Relies on the arena being in breadth-first order: children follow their
//! parents, and the nodes of one level inside any subtree form a contiguous
//! index run.

use tracing::debug;

use crate::tree::LogicalTree;

/// Subtree nodes living on one level.
#[derive(Debug, Clone, Copy)]
struct LevelRun {
    first: u32,
    count: u32,
}

const UNPLACED: u32 = u32::MAX;

impl LevelRun {
    const EMPTY: Self = Self {
        first: u32::MAX,
        count: 0,
    };
}

struct Placement<'a> {
    tree: &'a LogicalTree,
    levels: usize,
    /// `runs[node * levels + level]`: the node's subtree on that level.
    runs: Vec<LevelRun>,
    /// Slot per arena index; `UNPLACED` until filled.
    order: Vec<u32>,
    next_slot: u32,
}

impl<'a> Placement<'a> {
    fn new(tree: &'a LogicalTree) -> Self {
        let levels = tree.depth() as usize;
        let mut runs = vec![LevelRun::EMPTY; tree.len() * levels];

        // Reverse arena order is bottom-up.
        for vertex in (0..tree.len()).rev() {
            let node = &tree.nodes()[vertex];
            let base = vertex * levels;
            let own_level = node.level as usize;
            runs[base + own_level] = LevelRun {
                first: vertex as u32,
                count: 1,
            };

            for child in node.children() {
                let child_base = child as usize * levels;
                for level in own_level + 1..levels {
                    let below = runs[child_base + level];
                    if below.count == 0 {
                        break;
                    }
                    let run = &mut runs[base + level];
                    run.first = run.first.min(below.first);
                    run.count += below.count;
                }
            }
        }

        Self {
            tree,
            levels,
            runs,
            order: vec![UNPLACED; tree.len()],
            next_slot: 0,
        }
    }

    #[inline]
    fn run(&self, node: usize, level: usize) -> LevelRun {
        self.runs[node * self.levels + level]
    }

    fn place(&mut self, node: usize) {
        debug_assert_eq!(self.order[node], UNPLACED, "node {} placed twice", node);
        self.order[node] = self.next_slot;
        self.next_slot += 1;
    }

    /// Lay out the subtree of `node` restricted to levels `[lh, uh)`.
    fn fill(&mut self, node: usize, lh: usize, uh: usize) {
        if uh - lh == 1 || self.tree.nodes()[node].is_terminal() {
            self.place(node);
            return;
        }

        // One past the deepest populated level below `uh`.
        let mut deepest = uh;
        while deepest > lh && self.run(node, deepest - 1).count == 0 {
            deepest -= 1;
        }
        if deepest == lh {
            self.place(node);
            return;
        }

        let split = (lh + deepest) / 2;
        self.fill(node, lh, split);

        let LevelRun { first, count } = self.run(node, split);
        for bottom in first..first + count {
            self.fill(bottom as usize, split, uh);
        }
    }
}

/// Permutation mapping arena index to table slot.
pub(crate) fn order(tree: &LogicalTree) -> Vec<u32> {
    let mut placement = Placement::new(tree);
    placement.fill(0, 0, placement.levels);

    debug_assert_eq!(placement.next_slot as usize, tree.len());
    debug!(
        nodes = tree.len(),
        levels = placement.levels,
        "computed cache-oblivious order"
    );
    placement.order
}
