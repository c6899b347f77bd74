//! Centralized constants for the RSB sparse matrix library
//!
//! This module contains the hardcoded defaults used throughout the codebase.
//! New constants should be added here rather than scattered through the code.
//! Constants are organized by category for easy reference and maintenance.

// ============================================================================
// MEMORY AND CACHE CONSTANTS
// ============================================================================

/// Common cache line size in bytes
pub const DEFAULT_CACHE_LINE_SIZE: usize = 64;

/// Default L2 cache size (256KB)
pub const DEFAULT_L2_CACHE_SIZE: usize = 256_000;

/// Alignment used for leaf value buffers
pub const LEAF_VALUE_ALIGNMENT: usize = 64;

/// Upper bound on entries reserved up front from a Matrix Market size line
pub const MTX_MAX_PREALLOCATED_ENTRIES: usize = 1 << 20;

// ============================================================================
// PARTITIONING CONSTANTS
// ============================================================================

/// Default maximum number of non-zeros held by one leaf block
pub const DEFAULT_LEAF_THRESHOLD: usize = 16_384;

/// Default extent at or below which an axis is never split
///
/// With 1, only single rows or columns stop the recursion, so the leaf
/// threshold alone decides the leaf size.
pub const DEFAULT_MIN_EXTENT: usize = 1;

/// Extent ratio above which the larger axis is always split first
pub const AXIS_BIAS_RATIO: usize = 2;

/// Average non-zeros per occupied row at which a leaf switches to CSR layout
pub const CSR_MIN_ROW_DENSITY: f64 = 2.0;

/// Lower bound for leaf thresholds derived from the cache size
pub const MIN_CACHE_LEAF_THRESHOLD: usize = 64;

// ============================================================================
// AUTOTUNING CONSTANTS
// ============================================================================

/// Leaf threshold scaling factors tried around the current threshold
pub const TUNE_LEAF_SCALE_EXPONENTS: [i32; 5] = [-2, -1, 0, 1, 2];

/// Relative improvement a candidate needs over the baseline to be adopted
pub const TUNE_NOISE_MARGIN: f64 = 0.05;

/// Relative difference under which two throughputs count as tied
pub const TUNE_TIE_EPSILON: f64 = 1e-9;

/// Timed repetitions per tuning trial
pub const TUNE_TRIAL_REPETITIONS: usize = 5;

/// Untimed warm-up repetitions before each trial
pub const TUNE_WARMUP_REPETITIONS: usize = 1;

// ============================================================================
// FLOATING POINT TOLERANCES
// ============================================================================

/// Relative tolerance for double precision SpMV checks
pub const SPMV_RELATIVE_TOLERANCE_F64: f64 = 1e-9;

// ============================================================================
// DISPLAY AND DEBUG CONSTANTS
// ============================================================================

/// Maximum rows to print in debug display
pub const MAX_DISPLAY_ROWS: usize = 5;

/// Maximum elements per row in debug display
pub const MAX_DISPLAY_ELEMENTS_PER_ROW: usize = 5;

/// Maximum leaves to print in the matrix summary
pub const MAX_DISPLAY_LEAVES: usize = 5;

/// Thread name prefix for engine workers
pub const WORKER_THREAD_PREFIX: &str = "rsb-worker";
