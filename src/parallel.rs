//! # Parallel SpMV/SpMM over the leaf blocks of an RSB matrix
//!
//! Leaves are statically assigned to contiguous work groups whose boundaries
//! balance cumulative non-zeros. Each group accumulates into a private
//! partial buffer covering only the output rows it touches, and a reduction
//! phase adds the partials into `y`. A single group writes straight into `y`.
//!
//! Symmetric storage applies each off-diagonal entry twice (`y[r] += v x[c]`
//! and `y[c] += v x[r]`), so the omitted triangle is never materialized. The
//! transpose flag has no effect on symmetric storage.

use std::ops::Range;

use ndarray::{Array2, ArrayView2, ArrayViewMut2};
use rayon::prelude::*;

use crate::context::EngineContext;
use crate::error::{Result, RsbError};
use crate::matrix::config::Scalar;
use crate::matrix::handle::RsbMatrix;
use crate::matrix::leaf::{LeafBlock, LeafOp};

/// Performs `y += op(A) * x` on the context's worker pool
///
/// `x` is `op(A).cols × nrhs` and `y` is `op(A).rows × nrhs`, where `op` is
/// the transpose when `transpose` is set and the matrix is stored as general.
///
/// # Errors
///
/// - `InvalidInput` when the operand shapes do not match
/// - `ResourceExhausted` when a partial buffer cannot be allocated
/// - `ContextClosed` when the context was shut down
///
/// # Examples
///
/// ```
/// use ndarray::array;
/// use rsb::{spmv, EngineContext, ContextConfig, make_matrix};
///
/// let ctx = EngineContext::new(ContextConfig::with_threads(2)).unwrap();
/// let a = make_matrix(vec![0, 1], vec![0, 1], vec![2.0f64, 3.0], (2, 2), false).unwrap();
///
/// let x = array![[1.0], [1.0]];
/// let mut y = array![[1.0], [0.0]];
/// spmv(&ctx, &a, x.view(), y.view_mut(), false).unwrap();
/// assert_eq!(y, array![[3.0], [3.0]]);
/// ```
pub fn spmv<T: Scalar>(
    ctx: &EngineContext,
    a: &RsbMatrix<T>,
    x: ArrayView2<T>,
    mut y: ArrayViewMut2<T>,
    transpose: bool,
) -> Result<()> {
    if ctx.is_closed() {
        return Err(RsbError::ContextClosed);
    }

    let transpose = transpose && !a.is_symmetric_storage();
    let (out_rows, in_rows) = if transpose {
        (a.cols(), a.rows())
    } else {
        (a.rows(), a.cols())
    };
    if x.nrows() != in_rows {
        return Err(RsbError::invalid(format!(
            "operand has {} rows, matrix needs {}",
            x.nrows(),
            in_rows
        )));
    }
    if y.nrows() != out_rows {
        return Err(RsbError::invalid(format!(
            "output has {} rows, matrix produces {}",
            y.nrows(),
            out_rows
        )));
    }
    if x.ncols() != y.ncols() {
        return Err(RsbError::invalid(format!(
            "operand has {} columns but output has {}",
            x.ncols(),
            y.ncols()
        )));
    }

    let nrhs = x.ncols();
    if nrhs == 0 || a.nnz() == 0 {
        return Ok(());
    }

    let x = x.as_standard_layout();
    let x = x
        .as_slice()
        .ok_or_else(|| RsbError::invalid("operand is not contiguous"))?;

    let op = LeafOp {
        transpose,
        mirror: a.is_symmetric_storage(),
    };
    let leaves: Vec<&LeafBlock<T>> = a.leaves().collect();
    let nnz: Vec<usize> = leaves.iter().map(|l| l.nnz()).collect();
    let workers = ctx.worker_count();
    let requested = a.config().n_threads.unwrap_or(workers).min(workers);
    let groups = assign_groups(&nnz, requested);

    match y.as_slice_mut() {
        Some(out) => accumulate(ctx, &leaves, &groups, x, out, nrhs, op),
        None => {
            // strided output: accumulate into a dense copy, then add it in
            let mut tmp = Array2::zeros(y.raw_dim());
            let out = tmp
                .as_slice_mut()
                .ok_or_else(|| RsbError::invalid("scratch output is not contiguous"))?;
            accumulate(ctx, &leaves, &groups, x, out, nrhs, op)?;
            y.zip_mut_with(&tmp, |dst, &src| *dst += src);
            Ok(())
        }
    }
}

/// Computes `A * x` into a fresh array
pub fn multiply<T: Scalar>(ctx: &EngineContext, a: &RsbMatrix<T>, x: ArrayView2<T>) -> Result<Array2<T>> {
    let mut y = Array2::zeros((a.rows(), x.ncols()));
    spmv(ctx, a, x, y.view_mut(), false)?;
    Ok(y)
}

/// Splits leaves into at most `groups` contiguous ranges of similar nnz
///
/// Every range is non-empty. A leaf goes to the earlier group when its
/// midpoint lies at or before that group's share of the cumulative total.
pub fn assign_groups(nnz: &[usize], groups: usize) -> Vec<Range<usize>> {
    let n = nnz.len();
    if n == 0 {
        return Vec::new();
    }
    let groups = groups.clamp(1, n);
    let total: usize = nnz.iter().sum();

    let mut bounds = Vec::with_capacity(groups + 1);
    bounds.push(0);
    let mut prefix = 0usize;
    let mut idx = 0usize;
    for g in 1..groups {
        let target = total as f64 * g as f64 / groups as f64;
        // leave at least one leaf for each remaining group
        let max_end = n - (groups - g);

        prefix += nnz[idx];
        idx += 1;
        while idx < max_end && prefix as f64 + nnz[idx] as f64 / 2.0 <= target {
            prefix += nnz[idx];
            idx += 1;
        }
        bounds.push(idx);
    }
    bounds.push(n);

    bounds.windows(2).map(|w| w[0]..w[1]).collect()
}

/// Output rows touched by a run of leaves
fn group_span<T: Scalar>(leaves: &[&LeafBlock<T>], op: LeafOp) -> Range<usize> {
    let mut start = usize::MAX;
    let mut end = 0;
    for leaf in leaves {
        let span = leaf.output_span(op);
        if !span.is_empty() {
            start = start.min(span.start);
            end = end.max(span.end);
        }
    }
    if start >= end {
        0..0
    } else {
        start..end
    }
}

/// Zero-filled buffer whose allocation failure is reported, not aborted on
fn zeroed_buffer<T: Scalar>(len: usize) -> Result<Vec<T>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len).map_err(|e| {
        RsbError::ResourceExhausted(format!("partial buffer of {} values: {}", len, e))
    })?;
    buf.resize(len, T::zero());
    Ok(buf)
}

fn accumulate<T: Scalar>(
    ctx: &EngineContext,
    leaves: &[&LeafBlock<T>],
    groups: &[Range<usize>],
    x: &[T],
    y: &mut [T],
    nrhs: usize,
    op: LeafOp,
) -> Result<()> {
    if groups.len() <= 1 {
        for leaf in leaves {
            leaf.multiply(x, y, 0, nrhs, op);
        }
        return Ok(());
    }

    let partials: Vec<Result<(Range<usize>, Vec<T>)>> = ctx.install(|| {
        groups
            .par_iter()
            .map(|group| -> Result<(Range<usize>, Vec<T>)> {
                let members = &leaves[group.clone()];
                let span = group_span(members, op);
                let mut partial = zeroed_buffer(span.len() * nrhs)?;
                for leaf in members {
                    leaf.multiply(x, &mut partial, span.start, nrhs, op);
                }
                Ok((span, partial))
            })
            .collect()
    })?;

    for partial in partials {
        let (span, values) = partial?;
        let dst = &mut y[span.start * nrhs..span.end * nrhs];
        for (d, &s) in dst.iter_mut().zip(&values) {
            *d += s;
        }
    }
    Ok(())
}
