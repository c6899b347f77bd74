//! Leaf blocks: the terminal nodes of the partition tree
//!
//! A leaf owns the non-zeros of one index range. It stores them relative to
//! the bounding box of its entries, in one of two layouts chosen per leaf:
//!
//! - **CSR**: row pointers plus column indices, used when rows carry several
//!   entries on average so the row pointer array pays for itself.
//! - **COO**: explicit row and column index per entry, used for very sparse
//!   leaves where most rows are empty or hold a single entry.
//!
//! Values sit in a cache-line aligned buffer shared by both layouts.

use std::ops::Range;

use aligned_vec::AVec;

use crate::constants::LEAF_VALUE_ALIGNMENT;
use crate::matrix::config::Scalar;
use crate::matrix::coo::Entry;
use crate::utils::exclusive_scan;

/// Index layout of a leaf
#[derive(Debug, Clone, PartialEq)]
pub enum LeafLayout {
    /// Compressed rows; `row_ptr.len() == n_rows + 1`
    Csr {
        row_ptr: Vec<usize>,
        col_idx: Vec<usize>,
    },
    /// Coordinate list, sorted row-major
    Coo {
        row_idx: Vec<usize>,
        col_idx: Vec<usize>,
    },
}

/// Layout tag without the index data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutKind {
    Csr,
    Coo,
}

/// How a leaf applies its entries during multiplication
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeafOp {
    /// Multiply by the transpose of the stored block
    pub transpose: bool,
    /// Also apply the mirrored contribution of off-diagonal entries
    pub mirror: bool,
}

/// The non-zeros of one index range
#[derive(Debug, Clone)]
pub struct LeafBlock<T> {
    row_offset: usize,
    col_offset: usize,
    n_rows: usize,
    n_cols: usize,
    layout: LeafLayout,
    values: AVec<T>,
}

/// `y[yi..yi+nrhs] += v * x[xi..xi+nrhs]`
#[inline(always)]
fn axpy<T: Scalar>(y: &mut [T], yi: usize, x: &[T], xi: usize, v: T, nrhs: usize) {
    if nrhs == 1 {
        y[yi] += v * x[xi];
        return;
    }
    let ys = &mut y[yi..yi + nrhs];
    let xs = &x[xi..xi + nrhs];
    for (yk, &xk) in ys.iter_mut().zip(xs) {
        *yk += v * xk;
    }
}

/// Applies one stored entry under `op`
#[inline(always)]
#[allow(clippy::too_many_arguments)]
fn apply_entry<T: Scalar>(
    x: &[T],
    y: &mut [T],
    y_base: usize,
    nrhs: usize,
    op: LeafOp,
    row: usize,
    col: usize,
    v: T,
) {
    if op.mirror {
        axpy(y, (row - y_base) * nrhs, x, col * nrhs, v, nrhs);
        if row != col {
            axpy(y, (col - y_base) * nrhs, x, row * nrhs, v, nrhs);
        }
    } else if op.transpose {
        axpy(y, (col - y_base) * nrhs, x, row * nrhs, v, nrhs);
    } else {
        axpy(y, (row - y_base) * nrhs, x, col * nrhs, v, nrhs);
    }
}

impl<T: Scalar> LeafBlock<T> {
    /// Builds a leaf from entries given in global coordinates
    ///
    /// The entries must be non-empty and free of duplicates. The layout is
    /// CSR when the entries per row of the bounding box reach
    /// `csr_min_row_density`, COO otherwise. Index storage is therefore
    /// bounded by the entry count for any positive density.
    pub(crate) fn build(entries: &[Entry<T>], csr_min_row_density: f64) -> Self {
        debug_assert!(!entries.is_empty());

        let mut row_min = usize::MAX;
        let mut row_max = 0;
        let mut col_min = usize::MAX;
        let mut col_max = 0;
        for &(r, c, _) in entries {
            row_min = row_min.min(r);
            row_max = row_max.max(r);
            col_min = col_min.min(c);
            col_max = col_max.max(c);
        }
        let n_rows = row_max - row_min + 1;
        let n_cols = col_max - col_min + 1;

        let mut local: Vec<Entry<T>> = entries
            .iter()
            .map(|&(r, c, v)| (r - row_min, c - col_min, v))
            .collect();
        local.sort_unstable_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)));

        let values = AVec::from_iter(LEAF_VALUE_ALIGNMENT, local.iter().map(|e| e.2));
        let col_idx: Vec<usize> = local.iter().map(|e| e.1).collect();

        let avg_per_row = local.len() as f64 / n_rows as f64;

        let layout = if avg_per_row >= csr_min_row_density {
            let mut counts = vec![0usize; n_rows];
            for e in &local {
                counts[e.0] += 1;
            }
            LeafLayout::Csr {
                row_ptr: exclusive_scan(&counts),
                col_idx,
            }
        } else {
            LeafLayout::Coo {
                row_idx: local.iter().map(|e| e.0).collect(),
                col_idx,
            }
        };

        Self {
            row_offset: row_min,
            col_offset: col_min,
            n_rows,
            n_cols,
            layout,
            values,
        }
    }

    /// Number of stored entries
    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    /// Global rows covered by the entries' bounding box
    pub fn row_range(&self) -> Range<usize> {
        self.row_offset..self.row_offset + self.n_rows
    }

    /// Global columns covered by the entries' bounding box
    pub fn col_range(&self) -> Range<usize> {
        self.col_offset..self.col_offset + self.n_cols
    }

    /// Fraction of the bounding box that is non-zero
    pub fn density(&self) -> f64 {
        let area = self.n_rows as f64 * self.n_cols as f64;
        if area == 0.0 {
            0.0
        } else {
            self.nnz() as f64 / area
        }
    }

    /// Which layout was chosen
    pub fn layout_kind(&self) -> LayoutKind {
        match self.layout {
            LeafLayout::Csr { .. } => LayoutKind::Csr,
            LeafLayout::Coo { .. } => LayoutKind::Coo,
        }
    }

    /// The index layout
    pub fn layout(&self) -> &LeafLayout {
        &self.layout
    }

    /// Stored values in layout order
    pub fn values(&self) -> &[T] {
        &self.values
    }

    /// Stored values in layout order, for in-place updates
    pub fn values_mut(&mut self) -> &mut [T] {
        &mut self.values
    }

    /// Output rows this leaf writes to under `op`
    pub fn output_span(&self, op: LeafOp) -> Range<usize> {
        if self.nnz() == 0 {
            return 0..0;
        }
        let rows = self.row_range();
        let cols = self.col_range();
        if op.mirror {
            rows.start.min(cols.start)..rows.end.max(cols.end)
        } else if op.transpose {
            cols
        } else {
            rows
        }
    }

    /// Calls `f(row, col, value)` for every entry, in global coordinates
    pub fn for_each_entry<F: FnMut(usize, usize, T)>(&self, mut f: F) {
        match &self.layout {
            LeafLayout::Csr { row_ptr, col_idx } => {
                for lr in 0..self.n_rows {
                    for p in row_ptr[lr]..row_ptr[lr + 1] {
                        f(
                            self.row_offset + lr,
                            self.col_offset + col_idx[p],
                            self.values[p],
                        );
                    }
                }
            }
            LeafLayout::Coo { row_idx, col_idx } => {
                for p in 0..self.values.len() {
                    f(
                        self.row_offset + row_idx[p],
                        self.col_offset + col_idx[p],
                        self.values[p],
                    );
                }
            }
        }
    }

    /// Position of the global coordinate in the value buffer, if stored
    pub fn position(&self, row: usize, col: usize) -> Option<usize> {
        if !self.row_range().contains(&row) || !self.col_range().contains(&col) {
            return None;
        }
        let lr = row - self.row_offset;
        let lc = col - self.col_offset;
        match &self.layout {
            LeafLayout::Csr { row_ptr, col_idx } => {
                let start = row_ptr[lr];
                let end = row_ptr[lr + 1];
                col_idx[start..end]
                    .binary_search(&lc)
                    .ok()
                    .map(|k| start + k)
            }
            LeafLayout::Coo { row_idx, col_idx } => {
                // entries are sorted row-major
                let start = row_idx.partition_point(|&r| r < lr);
                let end = row_idx.partition_point(|&r| r <= lr);
                col_idx[start..end]
                    .binary_search(&lc)
                    .ok()
                    .map(|k| start + k)
            }
        }
    }

    /// Value at a global coordinate, if stored
    pub fn get(&self, row: usize, col: usize) -> Option<T> {
        self.position(row, col).map(|p| self.values[p])
    }

    /// Accumulates this leaf's contribution: `y += op(block) * x`
    ///
    /// `x` holds the whole dense operand in row-major order with `nrhs`
    /// columns. `y` holds output rows starting at global row `y_base` and must
    /// cover [`output_span`](Self::output_span).
    pub fn multiply(&self, x: &[T], y: &mut [T], y_base: usize, nrhs: usize, op: LeafOp) {
        match &self.layout {
            LeafLayout::Csr { row_ptr, col_idx } => {
                for lr in 0..self.n_rows {
                    let row = self.row_offset + lr;
                    for p in row_ptr[lr]..row_ptr[lr + 1] {
                        let col = self.col_offset + col_idx[p];
                        apply_entry(x, y, y_base, nrhs, op, row, col, self.values[p]);
                    }
                }
            }
            LeafLayout::Coo { row_idx, col_idx } => {
                for p in 0..self.values.len() {
                    let row = self.row_offset + row_idx[p];
                    let col = self.col_offset + col_idx[p];
                    apply_entry(x, y, y_base, nrhs, op, row, col, self.values[p]);
                }
            }
        }
    }
}
