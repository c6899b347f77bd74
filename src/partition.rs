//! # Recursive partitioning of the index domain
//!
//! The partitioner turns a coordinate list into a tree of row/column ranges.
//! Internal nodes bisect their range along one axis; leaves hold the
//! non-zeros of their range in a [`LeafBlock`].
//!
//! ## Splitting rules
//!
//! - An axis whose extent is at or below `min_extent` is never split.
//! - When both axes can be split, the larger one is chosen if it is at least
//!   [`AXIS_BIAS_RATIO`] times the other; otherwise rows are split at even
//!   depths and columns at odd depths.
//! - The split key is the key of the median entry along the axis, so both
//!   children receive comparable work. If the median key equals the smallest
//!   key present, the next larger key is used instead. If every entry shares
//!   one key on the axis, the other axis is tried.
//! - A leaf is emitted when `nnz <= leaf_threshold`, when neither axis may be
//!   split, or when the entries cannot be separated on either axis.
//!
//! Every split gives two non-empty children, so empty sub-ranges are never
//! materialized. The tree is built with an explicit work-list into an index
//! arena, keeping stack usage flat on pathological inputs.

use std::ops::Range;

use log::debug;

use crate::constants::AXIS_BIAS_RATIO;
use crate::matrix::config::{BlockConfig, Scalar, SymmetryMode};
use crate::matrix::coo::{canonicalize, Entry};
use crate::matrix::leaf::LeafBlock;

/// Axis an internal node splits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitAxis {
    Rows,
    Cols,
}

impl SplitAxis {
    fn key<T>(self, e: &Entry<T>) -> usize {
        match self {
            SplitAxis::Rows => e.0,
            SplitAxis::Cols => e.1,
        }
    }

    fn other(self) -> Self {
        match self {
            SplitAxis::Rows => SplitAxis::Cols,
            SplitAxis::Cols => SplitAxis::Rows,
        }
    }
}

/// A node of the partition tree
#[derive(Debug, Clone)]
pub enum Node<T> {
    /// A bisected range; children are arena indices
    Internal {
        rows: Range<usize>,
        cols: Range<usize>,
        axis: SplitAxis,
        split: usize,
        children: [usize; 2],
    },
    /// A range holding non-zeros
    Leaf {
        rows: Range<usize>,
        cols: Range<usize>,
        block: LeafBlock<T>,
    },
    /// A range without non-zeros (only the root of an empty matrix)
    Empty {
        rows: Range<usize>,
        cols: Range<usize>,
    },
}

impl<T> Node<T> {
    /// Row range covered by this node
    pub fn rows(&self) -> &Range<usize> {
        match self {
            Node::Internal { rows, .. } | Node::Leaf { rows, .. } | Node::Empty { rows, .. } => {
                rows
            }
        }
    }

    /// Column range covered by this node
    pub fn cols(&self) -> &Range<usize> {
        match self {
            Node::Internal { cols, .. } | Node::Leaf { cols, .. } | Node::Empty { cols, .. } => {
                cols
            }
        }
    }
}

/// The recursive block structure of one matrix
#[derive(Debug, Clone)]
pub struct PartitionTree<T> {
    nodes: Vec<Node<T>>,
    leaf_ids: Vec<usize>,
    nnz: usize,
    depth: usize,
}

/// Pending range on the work-list
struct Task {
    node: usize,
    rows: Range<usize>,
    cols: Range<usize>,
    depth: usize,
    entries: Range<usize>,
}

/// Candidate axes for a range, most preferred first
fn axis_order(
    rows: &Range<usize>,
    cols: &Range<usize>,
    depth: usize,
    min_extent: usize,
) -> Vec<SplitAxis> {
    let row_ok = rows.len() > min_extent;
    let col_ok = cols.len() > min_extent;
    match (row_ok, col_ok) {
        (true, true) => {
            let first = if rows.len() >= AXIS_BIAS_RATIO.saturating_mul(cols.len()) {
                SplitAxis::Rows
            } else if cols.len() >= AXIS_BIAS_RATIO.saturating_mul(rows.len()) {
                SplitAxis::Cols
            } else if depth % 2 == 0 {
                SplitAxis::Rows
            } else {
                SplitAxis::Cols
            };
            vec![first, first.other()]
        }
        (true, false) => vec![SplitAxis::Rows],
        (false, true) => vec![SplitAxis::Cols],
        (false, false) => Vec::new(),
    }
}

/// Split key for entries sorted along `axis`, if they can be separated
fn split_key<T>(sorted: &[Entry<T>], axis: SplitAxis) -> Option<usize> {
    let first = axis.key(sorted.first()?);
    let median = axis.key(&sorted[sorted.len() / 2]);
    if median > first {
        return Some(median);
    }
    // more than half the entries sit on the smallest key
    let next = sorted.partition_point(|e| axis.key(e) <= first);
    sorted.get(next).map(|e| axis.key(e))
}

impl<T: Scalar> PartitionTree<T> {
    /// Builds the tree for `entries` over a `rows × cols` domain.
    ///
    /// Duplicates are summed and, for symmetric storage, only the lower
    /// triangle is kept. Indices must already be validated against the shape.
    pub fn build(
        entries: Vec<Entry<T>>,
        rows: usize,
        cols: usize,
        symmetry: SymmetryMode,
        config: &BlockConfig,
    ) -> Self {
        let mut entries = canonicalize(entries, symmetry);
        let nnz = entries.len();
        let min_extent = config.min_extent.max(1);

        let mut nodes: Vec<Node<T>> = vec![Node::Empty {
            rows: 0..rows,
            cols: 0..cols,
        }];
        let mut depth = 0;

        if nnz > 0 {
            let mut work = vec![Task {
                node: 0,
                rows: 0..rows,
                cols: 0..cols,
                depth: 0,
                entries: 0..nnz,
            }];

            while let Some(task) = work.pop() {
                depth = depth.max(task.depth);
                let slice = &mut entries[task.entries.clone()];

                let mut chosen = None;
                if slice.len() > config.leaf_threshold {
                    for axis in axis_order(&task.rows, &task.cols, task.depth, min_extent) {
                        slice.sort_unstable_by_key(|e| axis.key(e));
                        if let Some(key) = split_key(slice, axis) {
                            chosen = Some((axis, key));
                            break;
                        }
                    }
                }

                let Some((axis, split)) = chosen else {
                    nodes[task.node] = Node::Leaf {
                        rows: task.rows,
                        cols: task.cols,
                        block: LeafBlock::build(slice, config.csr_min_row_density),
                    };
                    continue;
                };

                let mid = task.entries.start + slice.partition_point(|e| axis.key(e) < split);
                let (left_rows, left_cols, right_rows, right_cols) = match axis {
                    SplitAxis::Rows => (
                        task.rows.start..split,
                        task.cols.clone(),
                        split..task.rows.end,
                        task.cols.clone(),
                    ),
                    SplitAxis::Cols => (
                        task.rows.clone(),
                        task.cols.start..split,
                        task.rows.clone(),
                        split..task.cols.end,
                    ),
                };

                let left = nodes.len();
                let right = left + 1;
                nodes.push(Node::Empty {
                    rows: left_rows.clone(),
                    cols: left_cols.clone(),
                });
                nodes.push(Node::Empty {
                    rows: right_rows.clone(),
                    cols: right_cols.clone(),
                });
                nodes[task.node] = Node::Internal {
                    rows: task.rows,
                    cols: task.cols,
                    axis,
                    split,
                    children: [left, right],
                };

                // right first so the left child is processed next
                work.push(Task {
                    node: right,
                    rows: right_rows,
                    cols: right_cols,
                    depth: task.depth + 1,
                    entries: mid..task.entries.end,
                });
                work.push(Task {
                    node: left,
                    rows: left_rows,
                    cols: left_cols,
                    depth: task.depth + 1,
                    entries: task.entries.start..mid,
                });
            }
        }

        let leaf_ids = collect_leaves(&nodes);
        debug!(
            "partitioned {}x{} matrix with {} nnz into {} leaves (depth {})",
            rows,
            cols,
            nnz,
            leaf_ids.len(),
            depth
        );

        Self {
            nodes,
            leaf_ids,
            nnz,
            depth,
        }
    }

    /// Number of stored non-zeros
    pub fn nnz(&self) -> usize {
        self.nnz
    }

    /// Number of leaf blocks
    pub fn leaf_count(&self) -> usize {
        self.leaf_ids.len()
    }

    /// Depth of the deepest node (the root has depth 0)
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// The root node
    pub fn root(&self) -> &Node<T> {
        &self.nodes[0]
    }

    /// All nodes in arena order
    pub fn nodes(&self) -> &[Node<T>] {
        &self.nodes
    }

    /// Leaf blocks in depth-first (left to right) order
    pub fn leaves(&self) -> impl Iterator<Item = &LeafBlock<T>> + '_ {
        self.leaf_ids.iter().filter_map(|&id| match &self.nodes[id] {
            Node::Leaf { block, .. } => Some(block),
            _ => None,
        })
    }

    /// Mutable leaf blocks; the structure itself cannot change
    pub fn leaves_mut(&mut self) -> impl Iterator<Item = &mut LeafBlock<T>> + '_ {
        self.nodes.iter_mut().filter_map(|node| match node {
            Node::Leaf { block, .. } => Some(block),
            _ => None,
        })
    }

    /// Ranges of the terminal nodes (leaves and empty nodes)
    ///
    /// These tile the whole `rows × cols` domain.
    pub fn tiles(&self) -> Vec<(Range<usize>, Range<usize>)> {
        self.nodes
            .iter()
            .filter(|n| !matches!(n, Node::Internal { .. }))
            .map(|n| (n.rows().clone(), n.cols().clone()))
            .collect()
    }

    fn locate_id(&self, row: usize, col: usize) -> Option<usize> {
        let root = &self.nodes[0];
        if !root.rows().contains(&row) || !root.cols().contains(&col) {
            return None;
        }
        let mut id = 0;
        loop {
            match &self.nodes[id] {
                Node::Internal {
                    axis,
                    split,
                    children,
                    ..
                } => {
                    let key = match axis {
                        SplitAxis::Rows => row,
                        SplitAxis::Cols => col,
                    };
                    id = if key < *split { children[0] } else { children[1] };
                }
                _ => return Some(id),
            }
        }
    }

    /// The leaf whose range contains `(row, col)`, if that range holds data
    pub fn locate(&self, row: usize, col: usize) -> Option<&LeafBlock<T>> {
        match &self.nodes[self.locate_id(row, col)?] {
            Node::Leaf { block, .. } => Some(block),
            _ => None,
        }
    }

    /// Mutable access to the leaf whose range contains `(row, col)`
    pub fn locate_mut(&mut self, row: usize, col: usize) -> Option<&mut LeafBlock<T>> {
        let id = self.locate_id(row, col)?;
        match &mut self.nodes[id] {
            Node::Leaf { block, .. } => Some(block),
            _ => None,
        }
    }

    /// Every stored entry in global coordinates, leaf by leaf
    pub fn entries(&self) -> Vec<Entry<T>> {
        let mut out = Vec::with_capacity(self.nnz);
        for leaf in self.leaves() {
            leaf.for_each_entry(|r, c, v| out.push((r, c, v)));
        }
        out
    }
}

/// Leaf ids in depth-first, left-to-right order
fn collect_leaves<T>(nodes: &[Node<T>]) -> Vec<usize> {
    let mut out = Vec::new();
    let mut stack = vec![0];
    while let Some(id) = stack.pop() {
        match &nodes[id] {
            Node::Internal { children, .. } => {
                stack.push(children[1]);
                stack.push(children[0]);
            }
            Node::Leaf { .. } => out.push(id),
            Node::Empty { .. } => {}
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(leaf_threshold: usize, min_extent: usize) -> BlockConfig {
        BlockConfig {
            leaf_threshold,
            min_extent,
            ..BlockConfig::default()
        }
    }

    fn diagonal(n: usize) -> Vec<Entry<f64>> {
        (0..n).map(|i| (i, i, 1.0 + i as f64)).collect()
    }

    fn assert_tiles(tree: &PartitionTree<f64>, rows: usize, cols: usize) {
        let tiles = tree.tiles();
        let area: usize = tiles.iter().map(|(r, c)| r.len() * c.len()).sum();
        assert_eq!(area, rows * cols);
        for (i, a) in tiles.iter().enumerate() {
            for b in &tiles[i + 1..] {
                let row_overlap = a.0.start < b.0.end && b.0.start < a.0.end;
                let col_overlap = a.1.start < b.1.end && b.1.start < a.1.end;
                assert!(!(row_overlap && col_overlap), "{:?} overlaps {:?}", a, b);
            }
        }
    }

    #[test]
    fn test_single_leaf_when_threshold_covers_nnz() {
        let tree = PartitionTree::build(diagonal(100), 100, 100, SymmetryMode::General, &config(100, 4));
        assert_eq!(tree.leaf_count(), 1);
        assert_eq!(tree.depth(), 0);
        assert_eq!(tree.nnz(), 100);
    }

    #[test]
    fn test_split_balances_nnz() {
        let tree = PartitionTree::build(diagonal(128), 128, 128, SymmetryMode::General, &config(16, 1));
        assert!(tree.leaf_count() >= 8);
        for leaf in tree.leaves() {
            assert!(leaf.nnz() <= 16);
            assert!(leaf.nnz() >= 4, "unbalanced leaf with {} nnz", leaf.nnz());
        }
        let total: usize = tree.leaves().map(|l| l.nnz()).sum();
        assert_eq!(total, 128);
        assert_tiles(&tree, 128, 128);
    }

    #[test]
    fn test_min_extent_stops_recursion() {
        // a fully dense 8x8 block cannot be split below an extent of 8
        let mut entries = Vec::new();
        for i in 0..8 {
            for j in 0..8 {
                entries.push((i, j, 1.0f64));
            }
        }
        let tree = PartitionTree::build(entries, 8, 8, SymmetryMode::General, &config(1, 8));
        assert_eq!(tree.leaf_count(), 1);
    }

    #[test]
    fn test_single_row_splits_columns() {
        let entries: Vec<_> = (0..1000).map(|j| (0, j * 7, 1.0f64)).collect();
        let tree = PartitionTree::build(entries, 1, 7000, SymmetryMode::General, &config(100, 1));
        assert!(tree.leaf_count() >= 10);
        for node in tree.nodes() {
            if let Node::Internal { axis, .. } = node {
                assert_eq!(*axis, SplitAxis::Cols);
            }
        }
        assert_tiles(&tree, 1, 7000);
    }

    #[test]
    fn test_empty_matrix_has_no_leaves() {
        let tree = PartitionTree::<f64>::build(Vec::new(), 5, 7, SymmetryMode::General, &config(1, 1));
        assert_eq!(tree.leaf_count(), 0);
        assert_eq!(tree.nnz(), 0);
        assert_tiles(&tree, 5, 7);
        assert!(tree.locate(2, 3).is_none());
    }

    #[test]
    fn test_locate_finds_owning_leaf() {
        let entries: Vec<_> = (0..64).flat_map(|i| [(i, i, 1.0f64), (i, 63 - i, 2.0)]).collect();
        let tree = PartitionTree::build(entries.clone(), 64, 64, SymmetryMode::General, &config(8, 1));
        for (r, c, _) in sum_check(entries) {
            let leaf = tree.locate(r, c).expect("entry must have a leaf");
            assert!(leaf.get(r, c).is_some());
        }
    }

    fn sum_check(entries: Vec<Entry<f64>>) -> Vec<Entry<f64>> {
        crate::matrix::coo::sum_duplicates(entries)
    }

    #[test]
    fn test_symmetric_keeps_lower_triangle() {
        let entries = vec![(0, 1, 5.0f64), (1, 0, 5.0), (1, 1, 2.0)];
        let tree = PartitionTree::build(entries, 2, 2, SymmetryMode::Symmetric, &config(10, 1));
        assert_eq!(tree.nnz(), 2);
        for (r, c, _) in tree.entries() {
            assert!(r >= c);
        }
    }
}
