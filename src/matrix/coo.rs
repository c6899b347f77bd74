//! Coordinate (triplet) input and its canonicalization

use log::debug;

use crate::error::{Result, RsbError};
use crate::matrix::config::{Scalar, SymmetryMode};

/// A single `(row, col, value)` non-zero
pub type Entry<T> = (usize, usize, T);

/// Coordinate input as three parallel arrays
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Triplets<T> {
    /// Row index of each entry (0-based)
    pub row_indices: Vec<usize>,
    /// Column index of each entry (0-based)
    pub col_indices: Vec<usize>,
    /// Value of each entry
    pub values: Vec<T>,
}

impl<T: Scalar> Triplets<T> {
    /// Creates triplets from parallel arrays
    ///
    /// Fails with `InvalidInput` if the arrays differ in length.
    pub fn new(row_indices: Vec<usize>, col_indices: Vec<usize>, values: Vec<T>) -> Result<Self> {
        if row_indices.len() != col_indices.len() || row_indices.len() != values.len() {
            return Err(RsbError::invalid(format!(
                "array lengths differ: {} row indices, {} column indices, {} values",
                row_indices.len(),
                col_indices.len(),
                values.len()
            )));
        }
        Ok(Self {
            row_indices,
            col_indices,
            values,
        })
    }

    /// Creates empty triplets with room for `capacity` entries
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            row_indices: Vec::with_capacity(capacity),
            col_indices: Vec::with_capacity(capacity),
            values: Vec::with_capacity(capacity),
        }
    }

    /// Creates triplets from a list of entries
    pub fn from_entries(entries: &[Entry<T>]) -> Self {
        let mut t = Self::with_capacity(entries.len());
        for &(r, c, v) in entries {
            t.push(r, c, v);
        }
        t
    }

    /// Appends one entry
    pub fn push(&mut self, row: usize, col: usize, value: T) {
        self.row_indices.push(row);
        self.col_indices.push(col);
        self.values.push(value);
    }

    /// Number of entries, duplicates included
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether there are no entries
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Checks that every index lies inside `[0, rows) × [0, cols)`
    pub fn validate(&self, rows: usize, cols: usize) -> Result<()> {
        if self.row_indices.len() != self.values.len() || self.col_indices.len() != self.values.len()
        {
            return Err(RsbError::invalid("triplet arrays differ in length"));
        }
        for (k, (&r, &c)) in self.row_indices.iter().zip(&self.col_indices).enumerate() {
            if r >= rows {
                return Err(RsbError::invalid(format!(
                    "entry {}: row index {} out of range (rows = {})",
                    k, r, rows
                )));
            }
            if c >= cols {
                return Err(RsbError::invalid(format!(
                    "entry {}: column index {} out of range (cols = {})",
                    k, c, cols
                )));
            }
        }
        Ok(())
    }

    /// The entries as `(row, col, value)` tuples, in input order
    pub fn entries(&self) -> Vec<Entry<T>> {
        self.row_indices
            .iter()
            .zip(&self.col_indices)
            .zip(&self.values)
            .map(|((&r, &c), &v)| (r, c, v))
            .collect()
    }
}

/// Sorts entries row-major and sums the values of repeated coordinates
pub fn sum_duplicates<T: Scalar>(mut entries: Vec<Entry<T>>) -> Vec<Entry<T>> {
    entries.sort_unstable_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)));

    let mut combined: Vec<Entry<T>> = Vec::with_capacity(entries.len());
    for (row, col, val) in entries {
        match combined.last_mut() {
            Some(last) if last.0 == row && last.1 == col => last.2 += val,
            _ => combined.push((row, col, val)),
        }
    }
    combined
}

/// Keeps only the lower triangle (`row >= col`) for symmetric storage
///
/// Returns the kept entries and how many upper-triangle entries were dropped.
pub fn canonical_triangle<T: Scalar>(
    entries: Vec<Entry<T>>,
    symmetry: SymmetryMode,
) -> (Vec<Entry<T>>, usize) {
    if !symmetry.is_symmetric_storage() {
        return (entries, 0);
    }
    let before = entries.len();
    let kept: Vec<_> = entries.into_iter().filter(|e| e.0 >= e.1).collect();
    let dropped = before - kept.len();
    (kept, dropped)
}

/// Canonical form used by the partitioner: triangle filtered, sorted, duplicates summed
pub fn canonicalize<T: Scalar>(entries: Vec<Entry<T>>, symmetry: SymmetryMode) -> Vec<Entry<T>> {
    let (kept, dropped) = canonical_triangle(entries, symmetry);
    if dropped > 0 {
        debug!(
            "dropped {} upper-triangle entries for {:?} storage",
            dropped, symmetry
        );
    }
    sum_duplicates(kept)
}
