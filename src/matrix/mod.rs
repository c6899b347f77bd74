// Matrix data structures and operations

pub mod config;
pub mod coo;
pub mod csr;
pub mod handle;
pub mod leaf;
pub mod random;
pub mod reference;

pub use config::{BlockConfig, Scalar, SymmetryMode, SystemParameters, ValueType};
pub use coo::{Entry, Triplets};
pub use csr::SparseMatrixCSR;
pub use handle::{MatrixBuilder, RsbMatrix};
pub use leaf::{LayoutKind, LeafBlock, LeafLayout, LeafOp};
pub use random::{random_matrix, MatrixGenerator};
pub use reference::{dense_spmv, reference_spmv};
