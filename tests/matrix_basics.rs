//! Basic tests for matrix construction, queries and small products

use ndarray::{array, Array2};
use rsb::{
    make_matrix, multiply, ContextConfig, EngineContext, MatrixBuilder, RsbError, RsbMatrix,
    SymmetryMode, Triplets, ValueType,
};

fn context() -> EngineContext {
    EngineContext::new(ContextConfig::with_threads(2)).unwrap()
}

#[test]
fn test_identity_times_vector() {
    let ctx = context();
    let a = make_matrix(vec![0, 1, 2], vec![0, 1, 2], vec![1.0f64; 3], (3, 3), false).unwrap();

    let y = a.multiply_vec(&ctx, &[1.0, 2.0, 3.0]).unwrap();
    assert_eq!(y, vec![1.0, 2.0, 3.0]);
}

#[test]
fn test_diagonal_general_and_symmetric_agree() {
    let ctx = context();
    let general = make_matrix(vec![0, 1], vec![0, 1], vec![2.0f64, 3.0], (2, 2), false).unwrap();
    let symmetric = make_matrix(vec![0, 1], vec![0, 1], vec![2.0f64, 3.0], (2, 2), true).unwrap();

    assert_eq!(general.nnz(), 2);
    assert_eq!(symmetric.nnz(), 2);
    assert!(general.is_unsymmetric());
    assert!(symmetric.is_symmetric_storage());

    let x = array![[1.0], [1.0]];
    let y_general = multiply(&ctx, &general, x.view()).unwrap();
    let y_symmetric = multiply(&ctx, &symmetric, x.view()).unwrap();
    assert_eq!(y_general, array![[2.0], [3.0]]);
    assert_eq!(y_symmetric, y_general);
}

#[test]
fn test_leaf_count_follows_threshold() {
    let n = 64;
    let mut t = Triplets::with_capacity(2 * n);
    for i in 0..n {
        t.push(i, i, 1.0f64);
        t.push(i, (i + 5) % n, 0.5);
    }
    let nnz = 2 * n;

    let split = MatrixBuilder::new(n, n).leaf_threshold(nnz / 4).build(&t).unwrap();
    assert!(split.leaf_count() > 1);

    let single = MatrixBuilder::new(n, n).leaf_threshold(nnz).build(&t).unwrap();
    assert_eq!(single.leaf_count(), 1);

    let larger = MatrixBuilder::new(n, n).leaf_threshold(10 * nnz).build(&t).unwrap();
    assert_eq!(larger.leaf_count(), 1);
}

#[test]
fn test_tiny_matrix_splits_below_threshold() {
    let a = MatrixBuilder::new(2, 2)
        .leaf_threshold(1)
        .build(&Triplets::new(vec![0, 1], vec![0, 1], vec![1.0f64, 1.0]).unwrap())
        .unwrap();
    assert_eq!(a.leaf_count(), 2);
}

#[test]
fn test_duplicates_are_summed() {
    let a = make_matrix(
        vec![0, 1, 0, 1, 0],
        vec![0, 1, 0, 1, 1],
        vec![1.0f64, 2.0, 3.0, 4.0, 5.0],
        (2, 2),
        false,
    )
    .unwrap();
    assert_eq!(a.nnz(), 3);
    assert_eq!(a.get(0, 0).unwrap(), 4.0);
    assert_eq!(a.get(1, 1).unwrap(), 6.0);
    assert_eq!(a.get(0, 1).unwrap(), 5.0);
}

#[test]
fn test_nnz_invariant_under_reordering() {
    let rows = vec![3, 0, 2, 3, 1, 0];
    let cols = vec![1, 0, 2, 1, 3, 0];
    let vals = vec![1.0f64, 2.0, 3.0, 4.0, 5.0, 6.0];
    let a = make_matrix(rows.clone(), cols.clone(), vals.clone(), (4, 4), false).unwrap();

    let mut order: Vec<usize> = (0..rows.len()).collect();
    order.reverse();
    let b = make_matrix(
        order.iter().map(|&k| rows[k]).collect(),
        order.iter().map(|&k| cols[k]).collect(),
        order.iter().map(|&k| vals[k]).collect(),
        (4, 4),
        false,
    )
    .unwrap();

    assert_eq!(a.nnz(), 4);
    assert_eq!(b.nnz(), 4);
    assert_eq!(a.find(), b.find());
}

#[test]
fn test_explicit_zeros_are_stored() {
    let a = make_matrix(vec![0, 1], vec![0, 1], vec![0.0f64, 1.0], (2, 2), false).unwrap();
    assert_eq!(a.nnz(), 2);
}

#[test]
fn test_empty_matrix() {
    let ctx = context();
    let a = RsbMatrix::<f64>::from_triplets(&Triplets::default(), (4, 3), SymmetryMode::General)
        .unwrap();
    assert_eq!(a.nnz(), 0);
    assert_eq!(a.shape(), (4, 3));
    assert_eq!(a.leaf_count(), 0);

    let y = multiply(&ctx, &a, Array2::from_elem((3, 2), 1.0).view()).unwrap();
    assert_eq!(y, Array2::<f64>::zeros((4, 2)));
}

#[test]
fn test_invalid_input() {
    // out-of-range row
    let err = make_matrix(vec![2], vec![0], vec![1.0f64], (2, 2), false).unwrap_err();
    assert!(matches!(err, RsbError::InvalidInput(_)));

    // out-of-range column
    let err = make_matrix(vec![0], vec![5], vec![1.0f64], (2, 2), false).unwrap_err();
    assert!(matches!(err, RsbError::InvalidInput(_)));

    // length mismatch
    let err = make_matrix(vec![0, 1], vec![0, 1], vec![1.0f64], (2, 2), false).unwrap_err();
    assert!(matches!(err, RsbError::InvalidInput(_)));

    // zero leaf threshold
    let t = Triplets::new(vec![0], vec![0], vec![1.0f64]).unwrap();
    assert!(MatrixBuilder::new(1, 1).leaf_threshold(0).build(&t).is_err());
}

#[test]
fn test_single_precision() {
    let ctx = context();
    let a = make_matrix(vec![0, 1, 1], vec![0, 0, 1], vec![1.0f32, 2.0, 3.0], (2, 2), false).unwrap();
    assert_eq!(a.value_type(), ValueType::F32);
    let y = a.multiply_vec(&ctx, &[1.0, 1.0]).unwrap();
    assert_eq!(y, vec![1.0, 5.0]);
}

#[test]
fn test_multiply_into_accumulates() {
    let ctx = context();
    let a = make_matrix(vec![0, 1], vec![1, 0], vec![1.0f64, 1.0], (2, 2), false).unwrap();
    let x = array![[1.0, 2.0], [3.0, 4.0]];
    let mut y = array![[10.0, 10.0], [10.0, 10.0]];
    a.multiply_into(&ctx, x.view(), y.view_mut()).unwrap();
    assert_eq!(y, array![[13.0, 14.0], [11.0, 12.0]]);
}

#[test]
fn test_value_updates_without_rebuild() {
    let ctx = context();
    let mut a = make_matrix(vec![0, 1, 1], vec![0, 0, 1], vec![1.0f64, 2.0, 3.0], (2, 2), false).unwrap();
    let leaves = a.leaf_count();

    a.set_value(1, 0, 4.0).unwrap();
    a.scale(0.5);
    assert_eq!(a.leaf_count(), leaves);
    assert_eq!(a.to_dense(), array![[0.5, 0.0], [2.0, 1.5]]);

    let y = a.multiply_vec(&ctx, &[2.0, 2.0]).unwrap();
    assert_eq!(y, vec![1.0, 7.0]);
}

#[test]
fn test_huge_dimensions_with_few_entries() {
    let n = 1usize << 62;
    let a = make_matrix(vec![0, n - 1], vec![0, n - 1], vec![1.0f64, 2.0], (n, n), false).unwrap();

    assert_eq!(a.shape(), (n, n));
    assert_eq!(a.nnz(), 2);
    assert_eq!(a.get(0, 0).unwrap(), 1.0);
    assert_eq!(a.get(n - 1, n - 1).unwrap(), 2.0);
    assert_eq!(a.get(n / 2, n / 2).unwrap(), 0.0);
    assert!(a.leaves().all(|leaf| leaf.density().is_finite()));
}
