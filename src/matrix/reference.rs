//! Reference implementation of SpMV on the flat CSR form
//!
//! This provides a baseline for correctness testing and performance comparison.
//! It walks the rows one by one with no blocking and no threads.

use ndarray::{Array2, ArrayView2};
use num_traits::Num;
use std::ops::AddAssign;

use crate::matrix::SparseMatrixCSR;

/// Computes `op(A) * x` with a simple row-by-row loop
///
/// `x` has one row per column of `op(A)` and `nrhs` columns. The matrix is
/// taken as stored; symmetric matrices must be expanded to both triangles
/// first.
pub fn reference_spmv<T>(a: &SparseMatrixCSR<T>, x: ArrayView2<T>, transpose: bool) -> Array2<T>
where
    T: Copy + Num + AddAssign,
{
    let (out_rows, in_rows) = if transpose {
        (a.n_cols, a.n_rows)
    } else {
        (a.n_rows, a.n_cols)
    };
    assert_eq!(
        x.nrows(),
        in_rows,
        "Operand rows must match the matrix dimension"
    );

    let nrhs = x.ncols();
    let mut y = Array2::zeros((out_rows, nrhs));

    for i in 0..a.n_rows {
        for (j, &val) in a.row_iter(i) {
            // Scatter for the transpose, gather otherwise
            let (dst, src) = if transpose { (j, i) } else { (i, j) };
            for k in 0..nrhs {
                y[[dst, k]] += val * x[[src, k]];
            }
        }
    }

    y
}

/// Dense matrix product used to cross-check sparse results in tests
pub fn dense_spmv<T>(a: &Array2<T>, x: ArrayView2<T>) -> Array2<T>
where
    T: Copy + Num + AddAssign,
{
    assert_eq!(a.ncols(), x.nrows(), "Matrix dimensions must be compatible for multiplication");
    let mut y = Array2::zeros((a.nrows(), x.ncols()));
    for i in 0..a.nrows() {
        for j in 0..a.ncols() {
            let v = a[[i, j]];
            if v.is_zero() {
                continue;
            }
            for k in 0..x.ncols() {
                y[[i, k]] += v * x[[j, k]];
            }
        }
    }
    y
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_reference_spmv_identity() {
        let a = SparseMatrixCSR::<f64>::identity(3);
        let x = array![[1.0, 2.0], [3.0, 4.0], [5.0, 6.0]];
        let y = reference_spmv(&a, x.view(), false);
        assert_eq!(y, x);
    }

    #[test]
    fn test_reference_spmv_transpose() {
        // [[1, 2, 0],
        //  [0, 0, 3]]
        let a = SparseMatrixCSR::new(2, 3, vec![0, 2, 3], vec![0, 1, 2], vec![1.0f64, 2.0, 3.0]);

        let x = array![[1.0], [1.0], [1.0]];
        assert_eq!(reference_spmv(&a, x.view(), false), array![[3.0], [3.0]]);

        let x = array![[1.0], [2.0]];
        assert_eq!(reference_spmv(&a, x.view(), true), array![[1.0], [2.0], [6.0]]);
    }

    #[test]
    fn test_dense_matches_reference() {
        let a = SparseMatrixCSR::new(
            3, 3,
            vec![0, 2, 3, 5],
            vec![0, 1, 1, 0, 2],
            vec![1.0f64, 2.0, 3.0, 4.0, 5.0],
        );
        let x = array![[1.0, 0.5], [2.0, -1.0], [3.0, 4.0]];
        assert_eq!(
            reference_spmv(&a, x.view(), false),
            dense_spmv(&a.to_dense(), x.view())
        );
    }
}
