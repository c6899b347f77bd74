//! Utilities for converting between our matrix formats and external libraries

use sprs::CsMat;

use crate::error::Result;
use crate::matrix::{RsbMatrix, Scalar, SparseMatrixCSR, SymmetryMode, Triplets};

/// Converts our flat CSR matrix to sprs CsMat format
pub fn csr_to_sprs<T: Scalar>(matrix: &SparseMatrixCSR<T>) -> CsMat<T> {
    CsMat::new(
        (matrix.n_rows, matrix.n_cols),
        matrix.row_ptr.clone(),
        matrix.col_idx.clone(),
        matrix.values.clone(),
    )
}

/// Converts an RSB matrix to sprs CsMat format (CSR storage)
///
/// Symmetric storage is expanded, so the result holds both triangles.
pub fn to_sprs_csr<T: Scalar>(matrix: &RsbMatrix<T>) -> CsMat<T> {
    csr_to_sprs(&matrix.to_csr())
}

/// Builds an RSB matrix from a sprs CsMat in either storage order
///
/// With symmetric `symmetry`, entries above the diagonal are ignored.
pub fn from_sprs_csr<T: Scalar>(matrix: CsMat<T>, symmetry: SymmetryMode) -> Result<RsbMatrix<T>> {
    // Ensure matrix is in CSR format
    let matrix = if matrix.is_csr() {
        matrix
    } else {
        matrix.to_csr()
    };

    let shape = matrix.shape();
    let mut triplets = Triplets::with_capacity(matrix.nnz());
    for (i, row) in matrix.outer_iterator().enumerate() {
        for (j, &val) in row.iter() {
            triplets.push(i, j, val);
        }
    }

    RsbMatrix::from_triplets(&triplets, shape, symmetry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::BlockConfig;

    fn sample() -> Triplets<f64> {
        Triplets::new(
            vec![0, 0, 1, 2, 2],
            vec![0, 1, 1, 0, 2],
            vec![1.0, 2.0, 3.0, 4.0, 5.0],
        )
        .unwrap()
    }

    #[test]
    fn test_sprs_roundtrip() {
        let config = BlockConfig {
            leaf_threshold: 2,
            min_extent: 1,
            ..BlockConfig::default()
        };
        let original =
            RsbMatrix::with_config(&sample(), (3, 3), SymmetryMode::General, config).unwrap();

        let sprs_mat = to_sprs_csr(&original);
        assert_eq!(sprs_mat.nnz(), 5);
        assert_eq!(sprs_mat.get(2, 2), Some(&5.0));
        assert!(sprs_mat.is_csr());

        let roundtrip = from_sprs_csr(sprs_mat, SymmetryMode::General).unwrap();
        assert_eq!(roundtrip.shape(), original.shape());
        assert_eq!(roundtrip.find(), original.find());
    }

    #[test]
    fn test_symmetric_expands_both_triangles() {
        let t = Triplets::new(vec![0, 1, 2], vec![0, 0, 1], vec![1.0f64, 2.0, 3.0]).unwrap();
        let a = RsbMatrix::from_triplets(&t, (3, 3), SymmetryMode::Symmetric).unwrap();

        let sprs_mat = to_sprs_csr(&a);
        assert_eq!(sprs_mat.nnz(), 5);
        assert_eq!(sprs_mat.get(0, 1), Some(&2.0));
        assert_eq!(sprs_mat.get(1, 2), Some(&3.0));

        let back = from_sprs_csr(sprs_mat, SymmetryMode::Symmetric).unwrap();
        assert_eq!(back.nnz(), 3);
    }

    #[test]
    fn test_sprs_multiply_via_conversion() {
        // A = [1 2; 0 3], A*A = [1 8; 0 9]
        let t = Triplets::new(vec![0, 0, 1], vec![0, 1, 1], vec![1.0f64, 2.0, 3.0]).unwrap();
        let a = RsbMatrix::from_triplets(&t, (2, 2), SymmetryMode::General).unwrap();

        let sprs_a = to_sprs_csr(&a);
        let product = &sprs_a * &sprs_a;
        let c = from_sprs_csr(product, SymmetryMode::General).unwrap();

        assert!((c.get(0, 0).unwrap() - 1.0).abs() < 1.0e-10);
        assert!((c.get(0, 1).unwrap() - 8.0).abs() < 1.0e-10);
        assert!((c.get(1, 1).unwrap() - 9.0).abs() < 1.0e-10);
        assert_eq!(c.get(1, 0).unwrap(), 0.0);
    }
}
