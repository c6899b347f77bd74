//! SpMV/SpMM results checked against a dense reference

use ndarray::{Array2, ShapeBuilder};
use rsb::constants::SPMV_RELATIVE_TOLERANCE_F64;
use rsb::matrix::{dense_spmv, reference_spmv, MatrixGenerator};
use rsb::{
    random_matrix, spmv, ContextConfig, EngineContext, MatrixBuilder, RsbMatrix, SymmetryMode,
    Triplets,
};

fn context(threads: usize) -> EngineContext {
    EngineContext::new(ContextConfig::with_threads(threads)).unwrap()
}

/// Deterministic operand with distinct entries
fn operand(rows: usize, nrhs: usize) -> Array2<f64> {
    Array2::from_shape_fn((rows, nrhs), |(i, k)| ((i * 7 + k * 3) % 11) as f64 - 5.0)
}

fn assert_close(actual: &Array2<f64>, expected: &Array2<f64>) {
    assert_eq!(actual.dim(), expected.dim());
    let scale = expected.iter().fold(1.0f64, |m, v| m.max(v.abs()));
    for ((idx, a), e) in actual.indexed_iter().zip(expected.iter()) {
        assert!(
            (a - e).abs() <= SPMV_RELATIVE_TOLERANCE_F64 * scale,
            "mismatch at {:?}: {} vs {}",
            idx,
            a,
            e
        );
    }
}

fn build(t: &Triplets<f64>, shape: (usize, usize), leaf_threshold: usize) -> RsbMatrix<f64> {
    MatrixBuilder::new(shape.0, shape.1)
        .leaf_threshold(leaf_threshold)
        .build(t)
        .unwrap()
}

#[test]
fn test_random_shapes_against_dense() {
    let ctx = context(4);
    let shapes = [(50, 50), (120, 40), (33, 200), (1, 500), (500, 1)];
    let densities = [0.01, 0.1, 0.5];

    for (seed, &(rows, cols)) in shapes.iter().enumerate() {
        for &density in &densities {
            let t = random_matrix::<f64>(rows, cols, density, seed as u64).unwrap();
            let a = build(&t, (rows, cols), 16);
            let dense = a.to_dense();

            for nrhs in [1, 3] {
                let x = operand(cols, nrhs);
                let mut y = Array2::zeros((rows, nrhs));
                spmv(&ctx, &a, x.view(), y.view_mut(), false).unwrap();
                assert_close(&y, &dense_spmv(&dense, x.view()));
            }
        }
    }
}

#[test]
fn test_transpose_against_reference() {
    let ctx = context(3);
    let t = random_matrix::<f64>(80, 130, 0.05, 11).unwrap();
    let a = build(&t, (80, 130), 25);
    let csr = a.to_csr();

    let x = operand(80, 2);
    let mut y = Array2::zeros((130, 2));
    spmv(&ctx, &a, x.view(), y.view_mut(), true).unwrap();
    assert_close(&y, &reference_spmv(&csr, x.view(), true));
}

#[test]
fn test_symmetric_matches_materialized_general() {
    let ctx = context(4);
    let n = 150;
    let lower = MatrixGenerator::new(5).symmetric::<f64>(n, 0.04).unwrap();

    let symmetric = MatrixBuilder::new(n, n)
        .symmetry(SymmetryMode::Symmetric)
        .leaf_threshold(20)
        .build(&lower)
        .unwrap();

    // both triangles stored explicitly
    let mut full = Triplets::with_capacity(2 * lower.len());
    for (r, c, v) in lower.entries() {
        full.push(r, c, v);
        if r != c {
            full.push(c, r, v);
        }
    }
    let general = build(&full, (n, n), 20);
    assert_eq!(symmetric.nnz(), lower.len());
    assert_eq!(general.nnz(), full.len());

    for nrhs in [1, 4] {
        let x = operand(n, nrhs);
        let mut y_sym = Array2::zeros((n, nrhs));
        let mut y_gen = Array2::zeros((n, nrhs));
        spmv(&ctx, &symmetric, x.view(), y_sym.view_mut(), false).unwrap();
        spmv(&ctx, &general, x.view(), y_gen.view_mut(), false).unwrap();
        assert_close(&y_sym, &y_gen);
    }
}

#[test]
fn test_thread_counts_agree() {
    let ctx = context(8);
    let t = MatrixGenerator::new(3).banded::<f64>(400, 9);
    let mut a = build(&t, (400, 400), 64);
    assert!(a.leaf_count() >= 8);

    let x = operand(400, 2);
    let expected = dense_spmv(&a.to_dense(), x.view());

    for threads in [1, 2, 3, 5, 8] {
        a.set_thread_count(Some(threads)).unwrap();
        let mut y = Array2::zeros((400, 2));
        spmv(&ctx, &a, x.view(), y.view_mut(), false).unwrap();
        assert_close(&y, &expected);
    }
}

#[test]
fn test_non_standard_layouts() {
    let ctx = context(2);
    let t = random_matrix::<f64>(60, 40, 0.1, 2).unwrap();
    let a = build(&t, (60, 40), 30);

    // column-major operand and output
    let x_std = operand(40, 3);
    let mut x_f = Array2::zeros((40, 3).f());
    x_f.assign(&x_std);
    let mut y = Array2::zeros((60, 3).f());
    spmv(&ctx, &a, x_f.view(), y.view_mut(), false).unwrap();

    let mut expected = dense_spmv(&a.to_dense(), x_std.view());
    assert_close(&y.as_standard_layout().to_owned(), &expected);

    // accumulation on top of existing output
    spmv(&ctx, &a, x_std.view(), y.view_mut(), false).unwrap();
    expected.mapv_inplace(|v| 2.0 * v);
    assert_close(&y.as_standard_layout().to_owned(), &expected);
}

#[test]
fn test_single_precision_tolerance() {
    let ctx = context(2);
    let t = random_matrix::<f32>(100, 100, 0.05, 9).unwrap();
    let a = MatrixBuilder::new(100, 100).leaf_threshold(40).build(&t).unwrap();

    let x = Array2::from_shape_fn((100, 1), |(i, _)| (i % 5) as f32 * 0.25);
    let mut y = Array2::<f32>::zeros((100, 1));
    spmv(&ctx, &a, x.view(), y.view_mut(), false).unwrap();

    let expected = dense_spmv(&a.to_dense(), x.view());
    for (a, e) in y.iter().zip(expected.iter()) {
        assert!((a - e).abs() <= 1e-4 * e.abs().max(1.0));
    }
}
