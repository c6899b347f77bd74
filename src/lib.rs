//! # RSB: Recursive Sparse Blocks
//!
//! RSB stores a sparse matrix as a tree of rectangular blocks. Each leaf of
//! the tree holds the non-zeros of one index range in a layout chosen for
//! that leaf, small enough to stay in cache while it is being multiplied.
//! Sparse matrix-vector and matrix-multivector products (SpMV/SpMM) then run
//! leaf by leaf on a thread pool.
//!
//! ## Overview
//!
//! This library implements the RSB engine in Rust, with a focus on:
//!
//! - Cache-sized leaf blocks built by recursive bisection of the index domain
//! - Per-leaf choice between compressed-row and coordinate layouts
//! - Parallel SpMV/SpMM with thread-local partial outputs
//! - Symmetric storage that keeps only the lower triangle
//! - Runtime autotuning of leaf size and thread count
//!
//! ## Components
//!
//! 1. **Partitioning** ([`partition`]): splits coordinate input into a tree
//!    of row/column ranges.
//!
//! 2. **Leaf blocks** ([`matrix::leaf`]): CSR or COO storage of one range.
//!
//! 3. **Matrix handle** ([`RsbMatrix`], [`MatrixBuilder`]): construction,
//!    queries and in-place value updates.
//!
//! 4. **Multiplication** ([`spmv`], [`multiply`]): parallel products on an
//!    [`EngineContext`].
//!
//! 5. **Autotuning** ([`autotune`]): picks the fastest leaf threshold and
//!    thread count for a matrix and caches the choice.
//!
//! 6. **Matrix Market** ([`mtx`]): text exchange format.
//!
//! ## Usage
//!
//! ```
//! use ndarray::array;
//! use rsb::{make_matrix, multiply, EngineContext};
//!
//! let ctx = EngineContext::with_defaults().unwrap();
//!
//! // [[4, 0],
//! //  [1, 3]]
//! let a = make_matrix(vec![0, 1, 1], vec![0, 0, 1], vec![4.0f64, 1.0, 3.0], (2, 2), false).unwrap();
//! assert_eq!(a.nnz(), 3);
//!
//! let y = multiply(&ctx, &a, array![[1.0], [2.0]].view()).unwrap();
//! assert_eq!(y, array![[4.0], [7.0]]);
//! ```

pub mod constants;
pub mod context;
pub mod error;
pub mod matrix;
pub mod mtx;
pub mod parallel;
pub mod partition;
pub mod tuning;
pub mod utils;

// Re-export primary components
pub use context::{global_context, lib_exit, lib_init, ContextConfig, EngineContext};
pub use error::{Result, RsbError};
pub use matrix::config::{BlockConfig, Scalar, SymmetryMode, SystemParameters, ValueType};
pub use matrix::{random_matrix, MatrixBuilder, RsbMatrix, SparseMatrixCSR, Triplets};
pub use mtx::{load_file, load_from_text, save_file, save_to_text, MtxData};
pub use parallel::{multiply, spmv};
pub use partition::PartitionTree;
pub use tuning::{autotune, autotune_with, Measure, TuneOptions, TuneReport, TuneStatus, TuningProfile};
pub use utils::{to_sprs_csr, wall_time};

/// Builds an RSB matrix from coordinate arrays
///
/// This is the main construction entry point. Duplicate coordinates are
/// summed. With `symmetric` set, the matrix is stored symmetric and only the
/// lower triangle (`row >= col`) of the input is kept.
///
/// # Errors
///
/// `InvalidInput` if the arrays differ in length, an index is out of range,
/// or a symmetric matrix is not square.
///
/// # Examples
///
/// ```
/// use rsb::make_matrix;
///
/// let a = make_matrix(vec![0, 2, 2], vec![0, 0, 2], vec![1.0f64, 4.0, 5.0], (3, 3), true).unwrap();
/// assert_eq!(a.shape(), (3, 3));
/// assert_eq!(a.get(0, 2).unwrap(), 4.0);
/// ```
pub fn make_matrix<T: Scalar>(
    row_indices: Vec<usize>,
    col_indices: Vec<usize>,
    values: Vec<T>,
    shape: (usize, usize),
    symmetric: bool,
) -> Result<RsbMatrix<T>> {
    let triplets = Triplets::new(row_indices, col_indices, values)?;
    let symmetry = if symmetric {
        SymmetryMode::Symmetric
    } else {
        SymmetryMode::General
    };
    RsbMatrix::from_triplets(&triplets, shape, symmetry)
}

/// Version information for the RSB library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
