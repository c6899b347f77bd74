//! Configuration, value types and system parameters for RSB

use std::fmt;
use std::fmt::{Debug, Display};
use std::ops::{AddAssign, MulAssign};
use std::str::FromStr;

use num_traits::Float;

use crate::constants::*;
use crate::error::{Result, RsbError};

/// Floating point width of the stored values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    /// Single precision
    F32,
    /// Double precision
    F64,
}

impl ValueType {
    /// Size of one value in bytes
    pub fn size_bytes(&self) -> usize {
        match self {
            ValueType::F32 => 4,
            ValueType::F64 => 8,
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::F32 => write!(f, "float"),
            ValueType::F64 => write!(f, "double"),
        }
    }
}

/// Value types the engine is instantiated for.
///
/// The set is closed: only `f32` and `f64` implement it, so the value type of
/// a matrix is fixed statically at construction.
pub trait Scalar:
    Float + AddAssign + MulAssign + Default + Debug + Display + FromStr + Send + Sync + 'static
{
    /// Runtime tag for this type
    const VALUE_TYPE: ValueType;
}

impl Scalar for f32 {
    const VALUE_TYPE: ValueType = ValueType::F32;
}

impl Scalar for f64 {
    const VALUE_TYPE: ValueType = ValueType::F64;
}

/// How the matrix relates to its transpose
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SymmetryMode {
    /// Both triangles stored explicitly
    #[default]
    General,
    /// A = A^T, only the lower triangle is stored
    Symmetric,
    /// A = A^H, only the lower triangle is stored (same as symmetric for real values)
    Hermitian,
}

impl SymmetryMode {
    /// Whether only the canonical (lower) triangle is stored
    pub fn is_symmetric_storage(&self) -> bool {
        !matches!(self, SymmetryMode::General)
    }

    /// The Matrix Market header keyword for this mode
    pub fn mtx_keyword(&self) -> &'static str {
        match self {
            SymmetryMode::General => "general",
            SymmetryMode::Symmetric => "symmetric",
            SymmetryMode::Hermitian => "hermitian",
        }
    }
}

/// System parameters detected from the host
#[derive(Debug, Clone)]
pub struct SystemParameters {
    /// Size of cache line in bytes
    pub cache_line_size: usize,
    /// Size of L2 cache in bytes
    pub l2_cache_size: usize,
    /// Number of logical cores
    pub n_threads: usize,
    /// Number of physical cores
    pub physical_cores: usize,
    /// Whether more than one NUMA node was found
    pub numa_available: bool,
}

impl Default for SystemParameters {
    fn default() -> Self {
        Self {
            cache_line_size: DEFAULT_CACHE_LINE_SIZE,
            l2_cache_size: DEFAULT_L2_CACHE_SIZE,
            n_threads: num_cpus::get().max(1),
            physical_cores: num_cpus::get_physical().max(1),
            numa_available: detect_numa(),
        }
    }
}

/// Partitioning and execution configuration of one matrix
#[derive(Debug, Clone, PartialEq)]
pub struct BlockConfig {
    /// Maximum non-zeros per leaf before a range is split
    pub leaf_threshold: usize,

    /// Ranges with an extent at or below this are not split along that axis
    pub min_extent: usize,

    /// Average non-zeros per row at which a leaf uses the CSR layout
    pub csr_min_row_density: f64,

    /// Number of work groups used by SpMV; `None` uses every pool worker
    pub n_threads: Option<usize>,
}

impl Default for BlockConfig {
    fn default() -> Self {
        Self {
            leaf_threshold: DEFAULT_LEAF_THRESHOLD,
            min_extent: DEFAULT_MIN_EXTENT,
            csr_min_row_density: CSR_MIN_ROW_DENSITY,
            n_threads: None,
        }
    }
}

impl BlockConfig {
    /// A config whose leaves fit comfortably in the L2 cache of `params`
    pub fn for_system(params: &SystemParameters, value_type: ValueType) -> Self {
        // value plus two indices per entry, half the cache left for x and y
        let entry_bytes = value_type.size_bytes() + 2 * std::mem::size_of::<usize>();
        let leaf_threshold = (params.l2_cache_size / 2 / entry_bytes).max(MIN_CACHE_LEAF_THRESHOLD);
        Self {
            leaf_threshold,
            ..Self::default()
        }
    }

    /// Checks that every field is usable
    pub fn validate(&self) -> Result<()> {
        if self.leaf_threshold == 0 {
            return Err(RsbError::invalid("leaf_threshold must be at least 1"));
        }
        if self.min_extent == 0 {
            return Err(RsbError::invalid("min_extent must be at least 1"));
        }
        if !(self.csr_min_row_density.is_finite() && self.csr_min_row_density > 0.0) {
            return Err(RsbError::invalid(format!(
                "csr_min_row_density must be positive, got {}",
                self.csr_min_row_density
            )));
        }
        if self.n_threads == Some(0) {
            return Err(RsbError::invalid("n_threads must be at least 1"));
        }
        Ok(())
    }
}

/// Detects whether the host exposes more than one NUMA node
pub fn detect_numa() -> bool {
    #[cfg(target_os = "linux")]
    {
        std::path::Path::new("/sys/devices/system/node/node1").exists()
    }
    #[cfg(not(target_os = "linux"))]
    {
        false
    }
}
