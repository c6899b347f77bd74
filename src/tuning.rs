//! # Autotuning of leaf size and thread count
//!
//! The tuner measures the throughput (non-zeros processed per second) of a
//! set of candidate `(leaf_threshold, thread_count)` configurations for one
//! matrix and keeps the best one. The current configuration is measured first
//! as the baseline, and the matrix only switches when the winner beats it by
//! more than a noise margin. Measured throughput therefore never goes down.
//!
//! Measurement goes through the [`Measure`] trait. [`TimedMeasure`] times
//! real multiplications; tests inject deterministic oracles. Selection itself
//! ([`select_best`]) is a pure function of the trials.
//!
//! Chosen profiles are cached in the [`EngineContext`] under a [`TuningKey`],
//! so tuning a matrix of the same kind again applies the cached profile
//! without measuring.

use std::cmp::Ordering;

use log::{debug, info, warn};
use ndarray::Array2;

use crate::constants::*;
use crate::context::EngineContext;
use crate::error::{Result, RsbError};
use crate::matrix::config::{BlockConfig, Scalar, ValueType};
use crate::matrix::handle::RsbMatrix;
use crate::parallel::spmv;
use crate::utils::wall_time;

/// Which multiplication a profile was tuned for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    /// `y += A x` on general storage
    Multiply,
    /// `y += A^T x` on general storage
    TransposeMultiply,
    /// `y += A x` on symmetric storage (transpose is the same operation)
    SymmetricMultiply,
}

/// Identifies matrices that share a tuning profile
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TuningKey {
    pub rows: usize,
    pub cols: usize,
    /// `floor(log2(density))`, or `i32::MIN` for an empty matrix
    pub density_class: i32,
    pub nrhs: usize,
    pub operation: OperationKind,
    pub value_type: ValueType,
}

impl TuningKey {
    /// The key of `a` for the multiplication described by `options`
    pub fn new<T: Scalar>(a: &RsbMatrix<T>, options: &TuneOptions) -> Self {
        let operation = if a.is_symmetric_storage() {
            OperationKind::SymmetricMultiply
        } else if options.transpose {
            OperationKind::TransposeMultiply
        } else {
            OperationKind::Multiply
        };
        Self {
            rows: a.rows(),
            cols: a.cols(),
            density_class: density_class(a.nnz(), a.rows(), a.cols()),
            nrhs: options.nrhs,
            operation,
            value_type: a.value_type(),
        }
    }
}

/// Power-of-two bucket of the fill ratio
pub fn density_class(nnz: usize, rows: usize, cols: usize) -> i32 {
    let area = rows as f64 * cols as f64;
    if nnz == 0 || area == 0.0 {
        return i32::MIN;
    }
    (nnz as f64 / area).log2().floor() as i32
}

/// A chosen configuration and how fast it ran
#[derive(Debug, Clone, PartialEq)]
pub struct TuningProfile {
    pub leaf_threshold: usize,
    pub thread_count: usize,
    /// Non-zeros processed per second
    pub throughput: f64,
}

/// Options for [`autotune`]
#[derive(Debug, Clone)]
pub struct TuneOptions {
    /// Right-hand sides per multiplication
    pub nrhs: usize,
    /// Tune the transposed product
    pub transpose: bool,
    /// Log every trial at info level
    pub verbose: bool,
    /// Look up and store profiles in the context cache
    pub use_cache: bool,
    /// Relative gain over the baseline needed to switch configuration
    pub noise_margin: f64,
}

impl Default for TuneOptions {
    fn default() -> Self {
        Self {
            nrhs: 1,
            transpose: false,
            verbose: false,
            use_cache: true,
            noise_margin: TUNE_NOISE_MARGIN,
        }
    }
}

/// One configuration to try
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate {
    pub leaf_threshold: usize,
    pub thread_count: usize,
}

/// A measured candidate
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Trial {
    pub candidate: Candidate,
    pub throughput: f64,
}

/// Outcome of an [`autotune`] call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TuneStatus {
    /// A candidate beat the baseline and was applied
    Improved,
    /// Nothing beat the baseline; the prior configuration was kept
    Degraded,
    /// A cached profile was applied without measuring
    Cached,
}

/// What [`autotune`] did
#[derive(Debug, Clone)]
pub struct TuneReport {
    pub status: TuneStatus,
    /// The configuration the matrix ended up with
    pub profile: TuningProfile,
    /// Throughput of the configuration before tuning (the cached value on a hit)
    pub baseline: f64,
    /// Successful trials in measurement order
    pub trials: Vec<Trial>,
    /// Measurements that failed and were skipped, baseline included
    pub failed_trials: usize,
    pub key: TuningKey,
}

/// Measures the throughput of a matrix in its current configuration
pub trait Measure<T: Scalar> {
    /// Non-zeros processed per second for `op(a) * x` with `nrhs` columns
    fn measure(
        &mut self,
        ctx: &EngineContext,
        a: &RsbMatrix<T>,
        nrhs: usize,
        transpose: bool,
    ) -> Result<f64>;
}

/// Times repeated multiplications with the monotonic clock
#[derive(Debug, Clone)]
pub struct TimedMeasure {
    /// Untimed runs before measuring
    pub warmup: usize,
    /// Timed runs
    pub repetitions: usize,
}

impl Default for TimedMeasure {
    fn default() -> Self {
        Self {
            warmup: TUNE_WARMUP_REPETITIONS,
            repetitions: TUNE_TRIAL_REPETITIONS,
        }
    }
}

impl<T: Scalar> Measure<T> for TimedMeasure {
    fn measure(
        &mut self,
        ctx: &EngineContext,
        a: &RsbMatrix<T>,
        nrhs: usize,
        transpose: bool,
    ) -> Result<f64> {
        let transpose = transpose && !a.is_symmetric_storage();
        let (out_rows, in_rows) = if transpose {
            (a.cols(), a.rows())
        } else {
            (a.rows(), a.cols())
        };
        let x = Array2::<T>::ones((in_rows, nrhs));
        let mut y = Array2::<T>::zeros((out_rows, nrhs));

        for _ in 0..self.warmup {
            spmv(ctx, a, x.view(), y.view_mut(), transpose)?;
        }

        let repetitions = self.repetitions.max(1);
        let start = wall_time();
        for _ in 0..repetitions {
            spmv(ctx, a, x.view(), y.view_mut(), transpose)?;
        }
        let elapsed = (wall_time() - start).max(f64::EPSILON);

        Ok((a.nnz() * nrhs * repetitions) as f64 / elapsed)
    }
}

/// Candidate configurations around `current_threshold`
///
/// Thread counts are 1, 2, 4, ... up to `pool_size`, plus `pool_size` itself.
/// Leaf thresholds are the current one scaled by 1/4, 1/2, 1, 2 and 4,
/// clamped to at least 1 and deduplicated.
pub fn candidate_set(current_threshold: usize, pool_size: usize) -> Vec<Candidate> {
    let pool_size = pool_size.max(1);
    let mut threads = Vec::new();
    let mut t = 1;
    while t <= pool_size {
        threads.push(t);
        t *= 2;
    }
    if !pool_size.is_power_of_two() {
        threads.push(pool_size);
    }

    let mut thresholds: Vec<usize> = TUNE_LEAF_SCALE_EXPONENTS
        .iter()
        .map(|&e| {
            if e < 0 {
                current_threshold >> e.unsigned_abs()
            } else {
                current_threshold.saturating_mul(1 << e)
            }
        })
        .map(|v| v.max(1))
        .collect();
    thresholds.sort_unstable();
    thresholds.dedup();

    thresholds
        .iter()
        .flat_map(|&leaf_threshold| {
            threads.iter().map(move |&thread_count| Candidate {
                leaf_threshold,
                thread_count,
            })
        })
        .collect()
}

/// Orders trials so that the preferred one compares greatest
///
/// Higher throughput wins; throughputs within [`TUNE_TIE_EPSILON`] of each
/// other tie, and ties go to fewer threads, then to the smaller threshold.
fn preference(a: &Trial, b: &Trial) -> Ordering {
    let scale = a.throughput.abs().max(b.throughput.abs());
    let tied = (a.throughput - b.throughput).abs() <= TUNE_TIE_EPSILON * scale;
    if !tied {
        return a
            .throughput
            .partial_cmp(&b.throughput)
            .unwrap_or(Ordering::Equal);
    }
    b.candidate
        .thread_count
        .cmp(&a.candidate.thread_count)
        .then(b.candidate.leaf_threshold.cmp(&a.candidate.leaf_threshold))
}

/// The best trial, if any
pub fn select_best(trials: &[Trial]) -> Option<&Trial> {
    trials.iter().reduce(|best, t| {
        if preference(t, best) == Ordering::Greater {
            t
        } else {
            best
        }
    })
}

/// Tunes `a` with the default timing oracle
pub fn autotune<T: Scalar>(
    ctx: &EngineContext,
    a: &mut RsbMatrix<T>,
    options: &TuneOptions,
) -> Result<TuneReport> {
    autotune_with(ctx, a, options, &mut TimedMeasure::default())
}

/// Tunes `a`, measuring with `oracle`
///
/// # Errors
///
/// `InvalidInput` for `nrhs == 0` and `ContextClosed` after shutdown.
/// Measurement failures are counted in `failed_trials` rather than reported.
/// A failed baseline measures as zero, so any working candidate improves on
/// it; when every measurement fails the original configuration is kept and
/// reported as `Degraded`.
pub fn autotune_with<T: Scalar, M: Measure<T>>(
    ctx: &EngineContext,
    a: &mut RsbMatrix<T>,
    options: &TuneOptions,
    oracle: &mut M,
) -> Result<TuneReport> {
    if options.nrhs == 0 {
        return Err(RsbError::invalid("nrhs must be at least 1"));
    }
    if ctx.is_closed() {
        return Err(RsbError::ContextClosed);
    }

    let key = TuningKey::new(a, options);

    if options.use_cache {
        if let Some(profile) = ctx.cached_profile(&key) {
            debug!("tuning cache hit for {:?}", key);
            a.reconfigure(BlockConfig {
                leaf_threshold: profile.leaf_threshold,
                n_threads: Some(profile.thread_count),
                ..a.config().clone()
            })?;
            return Ok(TuneReport {
                status: TuneStatus::Cached,
                baseline: profile.throughput,
                profile,
                trials: Vec::new(),
                failed_trials: 0,
                key,
            });
        }
    }

    let original = a.config().clone();
    let pool_size = ctx.worker_count();
    let baseline_threads = original.n_threads.unwrap_or(pool_size).min(pool_size);
    let mut failed_trials = 0;

    // a failed baseline counts as zero throughput
    let baseline = match oracle.measure(ctx, a, options.nrhs, options.transpose) {
        Ok(throughput) if throughput.is_finite() && throughput >= 0.0 => throughput,
        Ok(throughput) => {
            warn!("discarding baseline measurement: throughput {}", throughput);
            failed_trials += 1;
            0.0
        }
        Err(e) => {
            warn!("baseline measurement failed: {}", e);
            failed_trials += 1;
            0.0
        }
    };
    if options.verbose {
        info!(
            "baseline: leaf_threshold {} threads {} -> {:.3e} nnz/s",
            original.leaf_threshold, baseline_threads, baseline
        );
    }

    let mut trials = Vec::new();
    let candidates = candidate_set(original.leaf_threshold, pool_size);

    for candidate in &candidates {
        let outcome = a
            .repartition(candidate.leaf_threshold)
            .and_then(|_| a.set_thread_count(Some(candidate.thread_count)))
            .and_then(|_| oracle.measure(ctx, a, options.nrhs, options.transpose));

        match outcome {
            Ok(throughput) if throughput.is_finite() && throughput >= 0.0 => {
                if options.verbose {
                    info!(
                        "trial: leaf_threshold {} threads {} ({} leaves) -> {:.3e} nnz/s",
                        candidate.leaf_threshold,
                        candidate.thread_count,
                        a.leaf_count(),
                        throughput
                    );
                }
                trials.push(Trial {
                    candidate: *candidate,
                    throughput,
                });
            }
            Ok(throughput) => {
                warn!("discarding trial {:?}: throughput {}", candidate, throughput);
                failed_trials += 1;
            }
            Err(e) => {
                warn!("trial {:?} failed: {}", candidate, e);
                failed_trials += 1;
            }
        }
    }

    let winner = select_best(&trials)
        .filter(|best| best.throughput > baseline * (1.0 + options.noise_margin))
        .copied();

    let (status, profile) = match winner {
        Some(best) => {
            a.reconfigure(BlockConfig {
                leaf_threshold: best.candidate.leaf_threshold,
                n_threads: Some(best.candidate.thread_count),
                ..original
            })?;
            let profile = TuningProfile {
                leaf_threshold: best.candidate.leaf_threshold,
                thread_count: best.candidate.thread_count,
                throughput: best.throughput,
            };
            (TuneStatus::Improved, profile)
        }
        None => {
            a.reconfigure(original.clone())?;
            let profile = TuningProfile {
                leaf_threshold: original.leaf_threshold,
                thread_count: baseline_threads,
                throughput: baseline,
            };
            (TuneStatus::Degraded, profile)
        }
    };

    if options.verbose {
        info!(
            "autotune {:?}: leaf_threshold {} threads {} ({} of {} trials succeeded)",
            status,
            profile.leaf_threshold,
            profile.thread_count,
            trials.len(),
            candidates.len()
        );
    }

    if options.use_cache && !trials.is_empty() {
        ctx.store_profile(key.clone(), profile.clone());
    }

    Ok(TuneReport {
        status,
        profile,
        baseline,
        trials,
        failed_trials,
        key,
    })
}
