//! The RSB matrix handle and its builder
//!
//! An [`RsbMatrix`] owns the partition tree of one sparse matrix together with
//! its shape, symmetry mode and block configuration. The shape never changes
//! after construction. Values can be updated in place; re-tuning may rebuild
//! the tree with a different leaf threshold while keeping every entry.

use std::fmt;
use std::marker::PhantomData;

use log::debug;
use ndarray::{Array2, ArrayView2, ArrayViewMut2};

use crate::constants::MAX_DISPLAY_LEAVES;
use crate::context::EngineContext;
use crate::error::{Result, RsbError};
use crate::matrix::config::{BlockConfig, Scalar, SymmetryMode, SystemParameters, ValueType};
use crate::matrix::coo::Triplets;
use crate::matrix::csr::SparseMatrixCSR;
use crate::matrix::leaf::LeafBlock;
use crate::parallel;
use crate::partition::PartitionTree;

/// A sparse matrix stored as recursive sparse blocks
#[derive(Debug, Clone)]
pub struct RsbMatrix<T> {
    rows: usize,
    cols: usize,
    symmetry: SymmetryMode,
    config: BlockConfig,
    tree: PartitionTree<T>,
}

impl<T: Scalar> RsbMatrix<T> {
    /// Builds a matrix from coordinate input with the default configuration
    ///
    /// Duplicate coordinates are summed. For symmetric storage only the lower
    /// triangle of the input is kept.
    ///
    /// # Errors
    ///
    /// `InvalidInput` if an index lies outside `shape`, if the arrays differ in
    /// length, or if symmetric storage is requested for a non-square shape.
    pub fn from_triplets(
        triplets: &Triplets<T>,
        shape: (usize, usize),
        symmetry: SymmetryMode,
    ) -> Result<Self> {
        Self::with_config(triplets, shape, symmetry, BlockConfig::default())
    }

    /// Builds a matrix from coordinate input with an explicit configuration
    pub fn with_config(
        triplets: &Triplets<T>,
        shape: (usize, usize),
        symmetry: SymmetryMode,
        config: BlockConfig,
    ) -> Result<Self> {
        let (rows, cols) = shape;
        config.validate()?;
        if symmetry.is_symmetric_storage() && rows != cols {
            return Err(RsbError::invalid(format!(
                "{:?} storage requires a square matrix, got {}x{}",
                symmetry, rows, cols
            )));
        }
        triplets.validate(rows, cols)?;

        let tree = PartitionTree::build(triplets.entries(), rows, cols, symmetry, &config);
        Ok(Self {
            rows,
            cols,
            symmetry,
            config,
            tree,
        })
    }

    /// Number of stored non-zeros (after summing duplicates)
    pub fn nnz(&self) -> usize {
        self.tree.nnz()
    }

    /// `(rows, cols)`
    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Number of leaf blocks in the partition tree
    pub fn leaf_count(&self) -> usize {
        self.tree.leaf_count()
    }

    /// Whether only the lower triangle is stored
    pub fn is_symmetric_storage(&self) -> bool {
        self.symmetry.is_symmetric_storage()
    }

    /// Whether the matrix is stored as general (both triangles explicit)
    pub fn is_unsymmetric(&self) -> bool {
        !self.is_symmetric_storage()
    }

    pub fn symmetry(&self) -> SymmetryMode {
        self.symmetry
    }

    pub fn value_type(&self) -> ValueType {
        T::VALUE_TYPE
    }

    /// The current block configuration
    pub fn config(&self) -> &BlockConfig {
        &self.config
    }

    /// The partition tree
    pub fn tree(&self) -> &PartitionTree<T> {
        &self.tree
    }

    /// Leaf blocks in depth-first order
    pub fn leaves(&self) -> impl Iterator<Item = &LeafBlock<T>> + '_ {
        self.tree.leaves()
    }

    /// Stored entries as triplets, sorted row-major
    ///
    /// For symmetric storage only the lower triangle is returned.
    pub fn find(&self) -> Triplets<T> {
        let mut entries = self.tree.entries();
        entries.sort_unstable_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)));
        Triplets::from_entries(&entries)
    }

    /// Maps a coordinate to the one that is actually stored
    fn canonical(&self, row: usize, col: usize) -> Result<(usize, usize)> {
        if row >= self.rows || col >= self.cols {
            return Err(RsbError::invalid(format!(
                "index ({}, {}) out of range for {}x{} matrix",
                row, col, self.rows, self.cols
            )));
        }
        if self.is_symmetric_storage() && row < col {
            Ok((col, row))
        } else {
            Ok((row, col))
        }
    }

    /// Value at `(row, col)`; zero when nothing is stored there
    pub fn get(&self, row: usize, col: usize) -> Result<T> {
        let (r, c) = self.canonical(row, col)?;
        Ok(self
            .tree
            .locate(r, c)
            .and_then(|leaf| leaf.get(r, c))
            .unwrap_or_else(T::zero))
    }

    /// Overwrites a stored value without touching the structure
    ///
    /// # Errors
    ///
    /// `InvalidInput` if the coordinate is out of range or holds no stored
    /// entry.
    pub fn set_value(&mut self, row: usize, col: usize, value: T) -> Result<()> {
        let (r, c) = self.canonical(row, col)?;
        let slot = self.tree.locate_mut(r, c).and_then(|leaf| {
            let p = leaf.position(r, c)?;
            leaf.values_mut().get_mut(p)
        });
        match slot {
            Some(v) => {
                *v = value;
                Ok(())
            }
            None => Err(RsbError::invalid(format!(
                "no stored entry at ({}, {})",
                row, col
            ))),
        }
    }

    /// Multiplies every stored value by `alpha`
    pub fn scale(&mut self, alpha: T) {
        self.map_values(|v| v * alpha);
    }

    /// Replaces every stored value `v` with `f(v)`
    pub fn map_values<F: Fn(T) -> T>(&mut self, f: F) {
        for leaf in self.tree.leaves_mut() {
            for v in leaf.values_mut() {
                *v = f(*v);
            }
        }
    }

    /// Dense copy with both triangles materialized
    pub fn to_dense(&self) -> Array2<T> {
        let mut dense = Array2::zeros((self.rows, self.cols));
        let mirror = self.is_symmetric_storage();
        for leaf in self.tree.leaves() {
            leaf.for_each_entry(|r, c, v| {
                dense[[r, c]] = v;
                if mirror && r != c {
                    dense[[c, r]] = v;
                }
            });
        }
        dense
    }

    /// Flat CSR copy with both triangles materialized
    pub fn to_csr(&self) -> SparseMatrixCSR<T> {
        let mirror = self.is_symmetric_storage();
        let mut entries = Vec::with_capacity(if mirror { 2 * self.nnz() } else { self.nnz() });
        for leaf in self.tree.leaves() {
            leaf.for_each_entry(|r, c, v| {
                entries.push((r, c, v));
                if mirror && r != c {
                    entries.push((c, r, v));
                }
            });
        }
        SparseMatrixCSR::from_entries(self.rows, self.cols, entries)
    }

    /// Rebuilds the tree with a new leaf threshold, keeping every entry
    pub(crate) fn repartition(&mut self, leaf_threshold: usize) -> Result<()> {
        let config = BlockConfig {
            leaf_threshold,
            ..self.config.clone()
        };
        self.reconfigure(config)
    }

    /// Sets the number of SpMV work groups; `None` uses the whole pool
    pub fn set_thread_count(&mut self, n_threads: Option<usize>) -> Result<()> {
        if n_threads == Some(0) {
            return Err(RsbError::invalid("thread count must be at least 1"));
        }
        self.config.n_threads = n_threads;
        Ok(())
    }

    /// Applies a new block configuration
    ///
    /// The tree is rebuilt only when a partitioning parameter changed.
    pub fn reconfigure(&mut self, config: BlockConfig) -> Result<()> {
        config.validate()?;
        let rebuild = config.leaf_threshold != self.config.leaf_threshold
            || config.min_extent != self.config.min_extent
            || config.csr_min_row_density != self.config.csr_min_row_density;

        if rebuild {
            debug!(
                "repartitioning {}x{} matrix: leaf_threshold {} -> {}",
                self.rows, self.cols, self.config.leaf_threshold, config.leaf_threshold
            );
            let entries = self.tree.entries();
            self.tree = PartitionTree::build(entries, self.rows, self.cols, self.symmetry, &config);
        }
        self.config = config;
        Ok(())
    }

    /// `y += A * x` on the context's worker pool
    pub fn multiply_into(
        &self,
        ctx: &EngineContext,
        x: ArrayView2<T>,
        y: ArrayViewMut2<T>,
    ) -> Result<()> {
        parallel::spmv(ctx, self, x, y, false)
    }

    /// `A * x` for a single right-hand side
    pub fn multiply_vec(&self, ctx: &EngineContext, x: &[T]) -> Result<Vec<T>> {
        let x = ArrayView2::from_shape((x.len(), 1), x)
            .map_err(|e| RsbError::invalid(format!("bad operand shape: {}", e)))?;
        let mut y = Array2::zeros((self.rows, 1));
        parallel::spmv(ctx, self, x, y.view_mut(), false)?;
        Ok(y.into_raw_vec())
    }
}

impl<T: Scalar> fmt::Display for RsbMatrix<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "RSB matrix {}x{} ({}, {}): nnz {}, {} leaves, depth {}",
            self.rows,
            self.cols,
            T::VALUE_TYPE,
            self.symmetry.mtx_keyword(),
            self.nnz(),
            self.leaf_count(),
            self.tree.depth()
        )?;

        for (i, leaf) in self.tree.leaves().take(MAX_DISPLAY_LEAVES).enumerate() {
            let rows = leaf.row_range();
            let cols = leaf.col_range();
            writeln!(
                f,
                "  leaf {}: rows [{}, {}) cols [{}, {}) nnz {} {:?} density {:.3}",
                i,
                rows.start,
                rows.end,
                cols.start,
                cols.end,
                leaf.nnz(),
                leaf.layout_kind(),
                leaf.density()
            )?;
        }
        if self.leaf_count() > MAX_DISPLAY_LEAVES {
            writeln!(f, "  ... ({} more leaves)", self.leaf_count() - MAX_DISPLAY_LEAVES)?;
        }
        Ok(())
    }
}

/// Step-by-step construction of an [`RsbMatrix`]
///
/// ```
/// use rsb::{MatrixBuilder, SymmetryMode, Triplets};
///
/// let t = Triplets::new(vec![0, 1], vec![0, 1], vec![1.0f64, 2.0]).unwrap();
/// let a = MatrixBuilder::new(2, 2)
///     .symmetry(SymmetryMode::Symmetric)
///     .leaf_threshold(1)
///     .build(&t)
///     .unwrap();
/// assert_eq!(a.nnz(), 2);
/// ```
#[derive(Debug, Clone)]
pub struct MatrixBuilder<T> {
    shape: (usize, usize),
    symmetry: SymmetryMode,
    config: BlockConfig,
    _marker: PhantomData<T>,
}

impl<T: Scalar> MatrixBuilder<T> {
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            shape: (rows, cols),
            symmetry: SymmetryMode::General,
            config: BlockConfig::default(),
            _marker: PhantomData,
        }
    }

    pub fn symmetry(mut self, symmetry: SymmetryMode) -> Self {
        self.symmetry = symmetry;
        self
    }

    pub fn leaf_threshold(mut self, leaf_threshold: usize) -> Self {
        self.config.leaf_threshold = leaf_threshold;
        self
    }

    pub fn min_extent(mut self, min_extent: usize) -> Self {
        self.config.min_extent = min_extent;
        self
    }

    pub fn csr_min_row_density(mut self, density: f64) -> Self {
        self.config.csr_min_row_density = density;
        self
    }

    pub fn n_threads(mut self, n_threads: Option<usize>) -> Self {
        self.config.n_threads = n_threads;
        self
    }

    /// Sizes the leaf threshold to the cache of the given system
    pub fn with_system(mut self, params: &SystemParameters) -> Self {
        self.config.leaf_threshold =
            BlockConfig::for_system(params, T::VALUE_TYPE).leaf_threshold;
        self
    }

    /// Replaces the whole configuration
    pub fn config(mut self, config: BlockConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self, triplets: &Triplets<T>) -> Result<RsbMatrix<T>> {
        RsbMatrix::with_config(triplets, self.shape, self.symmetry, self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small() -> Triplets<f64> {
        // [[1, 0, 2],
        //  [0, 3, 0],
        //  [4, 0, 5]]
        Triplets::new(
            vec![0, 0, 1, 2, 2],
            vec![0, 2, 1, 0, 2],
            vec![1.0, 2.0, 3.0, 4.0, 5.0],
        )
        .unwrap()
    }

    #[test]
    fn test_get_and_find() {
        let a = RsbMatrix::from_triplets(&small(), (3, 3), SymmetryMode::General).unwrap();
        assert_eq!(a.nnz(), 5);
        assert_eq!(a.get(2, 0).unwrap(), 4.0);
        assert_eq!(a.get(1, 0).unwrap(), 0.0);
        assert!(a.get(3, 0).is_err());

        let t = a.find();
        assert_eq!(t.row_indices, vec![0, 0, 1, 2, 2]);
        assert_eq!(t.col_indices, vec![0, 2, 1, 0, 2]);
    }

    #[test]
    fn test_symmetric_requires_square() {
        let t = Triplets::<f64>::with_capacity(0);
        let err = RsbMatrix::from_triplets(&t, (3, 4), SymmetryMode::Symmetric).unwrap_err();
        assert!(matches!(err, RsbError::InvalidInput(_)));
    }

    #[test]
    fn test_symmetric_get_mirrors() {
        let t = Triplets::new(vec![1, 1], vec![0, 1], vec![7.0f64, 2.0]).unwrap();
        let mut a = RsbMatrix::from_triplets(&t, (2, 2), SymmetryMode::Symmetric).unwrap();
        assert_eq!(a.get(0, 1).unwrap(), 7.0);

        a.set_value(0, 1, 9.0).unwrap();
        assert_eq!(a.get(1, 0).unwrap(), 9.0);
        assert_eq!(a.to_dense()[[0, 1]], 9.0);
    }

    #[test]
    fn test_set_value_requires_stored_entry() {
        let mut a = RsbMatrix::from_triplets(&small(), (3, 3), SymmetryMode::General).unwrap();
        a.set_value(1, 1, -3.0).unwrap();
        assert_eq!(a.get(1, 1).unwrap(), -3.0);
        assert!(matches!(a.set_value(0, 1, 1.0), Err(RsbError::InvalidInput(_))));
    }

    #[test]
    fn test_scale_and_map() {
        let mut a = RsbMatrix::from_triplets(&small(), (3, 3), SymmetryMode::General).unwrap();
        a.scale(2.0);
        assert_eq!(a.get(2, 2).unwrap(), 10.0);
        a.map_values(|v| v - 1.0);
        assert_eq!(a.get(0, 0).unwrap(), 1.0);
        assert_eq!(a.nnz(), 5);
    }

    #[test]
    fn test_reconfigure_keeps_entries() {
        let n = 200;
        let mut t = Triplets::with_capacity(n);
        for i in 0..n {
            t.push(i, (i * 7) % n, i as f64 + 1.0);
        }
        let mut a = MatrixBuilder::new(n, n).leaf_threshold(n).min_extent(1).build(&t).unwrap();
        assert_eq!(a.leaf_count(), 1);
        let before = a.to_dense();

        a.repartition(10).unwrap();
        assert!(a.leaf_count() >= n / 10);
        assert_eq!(a.nnz(), n);
        assert_eq!(a.to_dense(), before);

        assert!(a.reconfigure(BlockConfig { leaf_threshold: 0, ..BlockConfig::default() }).is_err());
        assert!(a.set_thread_count(Some(0)).is_err());
    }

    #[test]
    fn test_display_summary() {
        let a = RsbMatrix::from_triplets(&small(), (3, 3), SymmetryMode::General).unwrap();
        let s = a.to_string();
        assert!(s.starts_with("RSB matrix 3x3 (double, general): nnz 5, 1 leaves"));
        assert!(s.contains("leaf 0"));
    }
}
