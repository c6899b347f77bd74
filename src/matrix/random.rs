//! Seeded random sparse matrix generators
//!
//! Used by tests and benchmarks. Every generator is driven by a
//! `ChaCha8Rng`, so a seed always reproduces the same matrix.

use num_traits::NumCast;
use rand::distributions::{Distribution, Uniform};
use rand::seq::index;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::error::{Result, RsbError};
use crate::matrix::config::Scalar;
use crate::matrix::coo::Triplets;

/// Generates random coordinate input with reproducible structure and values
pub struct MatrixGenerator {
    rng: ChaCha8Rng,
    values: Uniform<f64>,
}

impl MatrixGenerator {
    /// A generator with values uniform in `[0, 1)`
    pub fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            values: Uniform::from(0.0..1.0),
        }
    }

    /// A generator with values uniform in `[low, high)`
    pub fn with_value_range(seed: u64, low: f64, high: f64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            values: Uniform::from(low..high),
        }
    }

    fn value<T: Scalar>(&mut self) -> T {
        <T as NumCast>::from(self.values.sample(&mut self.rng)).unwrap_or_else(T::zero)
    }

    /// Exactly `round(density * rows * cols)` distinct positions, uniformly placed
    pub fn uniform<T: Scalar>(&mut self, rows: usize, cols: usize, density: f64) -> Result<Triplets<T>> {
        if !(0.0..=1.0).contains(&density) {
            return Err(RsbError::invalid(format!(
                "density must lie in [0, 1], got {}",
                density
            )));
        }
        let cells = rows.checked_mul(cols).ok_or_else(|| {
            RsbError::invalid(format!("{}x{} matrix has too many cells", rows, cols))
        })?;
        let nnz = ((cells as f64) * density).round() as usize;
        let nnz = nnz.min(cells);

        let mut positions = index::sample(&mut self.rng, cells, nnz).into_vec();
        positions.sort_unstable();

        let mut triplets = Triplets::with_capacity(nnz);
        for p in positions {
            let v = self.value();
            triplets.push(p / cols, p % cols, v);
        }
        Ok(triplets)
    }

    /// Lower triangle of a random symmetric matrix with a full diagonal
    pub fn symmetric<T: Scalar>(&mut self, n: usize, density: f64) -> Result<Triplets<T>> {
        let full = self.uniform::<T>(n, n, density)?;
        let mut triplets = Triplets::with_capacity(full.len() + n);
        for i in 0..n {
            let v = self.value();
            triplets.push(i, i, v);
        }
        for (r, c, v) in full.entries() {
            if r > c {
                triplets.push(r, c, v);
            }
        }
        Ok(triplets)
    }

    /// Banded matrix: every `(i, j)` with `|i - j| <= bandwidth / 2`
    pub fn banded<T: Scalar>(&mut self, n: usize, bandwidth: usize) -> Triplets<T> {
        let half = bandwidth / 2;
        let mut triplets = Triplets::with_capacity(n * (2 * half + 1));
        for i in 0..n {
            let col_start = i.saturating_sub(half);
            let col_end = (i + half + 1).min(n);
            for j in col_start..col_end {
                let v = self.value();
                triplets.push(i, j, v);
            }
        }
        triplets
    }

    /// Block diagonal matrix with 70% fill inside each block
    pub fn block_diagonal<T: Scalar>(&mut self, n: usize, block_size: usize) -> Triplets<T> {
        let block_size = block_size.max(1);
        let mut triplets = Triplets::with_capacity(n * block_size);
        for block_start in (0..n).step_by(block_size) {
            let block_end = (block_start + block_size).min(n);
            for i in block_start..block_end {
                for j in block_start..block_end {
                    if self.rng.gen_bool(0.7) {
                        let v = self.value();
                        triplets.push(i, j, v);
                    }
                }
            }
        }
        triplets
    }
}

/// Random `rows × cols` coordinate input with the given density
///
/// Positions are distinct and uniformly distributed; values are uniform in
/// `[0, 1)`. The same seed always gives the same matrix.
pub fn random_matrix<T: Scalar>(rows: usize, cols: usize, density: f64, seed: u64) -> Result<Triplets<T>> {
    MatrixGenerator::new(seed).uniform(rows, cols, density)
}
