//! # Matrix Market exchange format
//!
//! Reads and writes the `coordinate` flavour of the Matrix Market text format:
//!
//! ```text
//! %%MatrixMarket matrix coordinate real symmetric
//! % comments
//! 3 3 2
//! 1 1 1.0
//! 3 2 5.0
//! ```
//!
//! Fields `real`, `double`, `integer` and `pattern` are accepted (pattern
//! entries get the value 1). Symmetric and hermitian files keep only the
//! lower triangle: entries written above the diagonal are swapped below it.
//! Indices in the text are 1-based.
//!
//! Loading is all-or-nothing: any malformed line fails the whole load with a
//! [`RsbError::Format`] carrying its line number.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, ErrorKind, Write};
use std::path::Path;

use log::debug;

use crate::constants::MTX_MAX_PREALLOCATED_ENTRIES;
use crate::error::{Result, RsbError};
use crate::matrix::config::{BlockConfig, Scalar, SymmetryMode};
use crate::matrix::coo::Triplets;
use crate::matrix::handle::RsbMatrix;

const BANNER: &str = "%%matrixmarket";

/// Value field declared in the header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MtxField {
    /// `real` or `double`
    Real,
    Integer,
    /// No values; every entry is 1
    Pattern,
}

/// Parsed contents of a Matrix Market file
#[derive(Debug, Clone, PartialEq)]
pub struct MtxData<T> {
    pub rows: usize,
    pub cols: usize,
    pub field: MtxField,
    pub symmetry: SymmetryMode,
    /// 0-based entries; lower triangle only for symmetric files
    pub triplets: Triplets<T>,
}

impl<T: Scalar> MtxData<T> {
    /// Builds a matrix with the default block configuration
    pub fn into_matrix(self) -> Result<RsbMatrix<T>> {
        self.into_matrix_with(BlockConfig::default())
    }

    /// Builds a matrix with an explicit block configuration
    pub fn into_matrix_with(self, config: BlockConfig) -> Result<RsbMatrix<T>> {
        RsbMatrix::with_config(&self.triplets, (self.rows, self.cols), self.symmetry, config)
    }
}

fn parse_header(line: &str) -> Result<(MtxField, SymmetryMode)> {
    let tokens: Vec<String> = line.split_whitespace().map(str::to_lowercase).collect();
    if tokens.first().map(String::as_str) != Some(BANNER) {
        return Err(RsbError::format(1, "missing %%MatrixMarket header"));
    }
    if tokens.len() != 5 {
        return Err(RsbError::format(
            1,
            format!("header needs 5 tokens, found {}", tokens.len()),
        ));
    }
    if tokens[1] != "matrix" {
        return Err(RsbError::format(1, format!("unknown object '{}'", tokens[1])));
    }
    match tokens[2].as_str() {
        "coordinate" => {}
        "array" => {
            return Err(RsbError::Unsupported(
                "Matrix Market array (dense) format".to_string(),
            ))
        }
        other => return Err(RsbError::format(1, format!("unknown format '{}'", other))),
    }
    let field = match tokens[3].as_str() {
        "real" | "double" => MtxField::Real,
        "integer" => MtxField::Integer,
        "pattern" => MtxField::Pattern,
        "complex" => return Err(RsbError::Unsupported("complex values".to_string())),
        other => return Err(RsbError::format(1, format!("unknown field '{}'", other))),
    };
    let symmetry = match tokens[4].as_str() {
        "general" => SymmetryMode::General,
        "symmetric" => SymmetryMode::Symmetric,
        "hermitian" => SymmetryMode::Hermitian,
        "skew-symmetric" => {
            return Err(RsbError::Unsupported(
                "skew-symmetric matrices".to_string(),
            ))
        }
        other => return Err(RsbError::format(1, format!("unknown symmetry '{}'", other))),
    };
    Ok((field, symmetry))
}

fn parse_index(token: &str, bound: usize, what: &str, line: usize) -> Result<usize> {
    let idx: usize = token
        .parse()
        .map_err(|_| RsbError::format(line, format!("bad {} index '{}'", what, token)))?;
    if idx == 0 || idx > bound {
        return Err(RsbError::format(
            line,
            format!("{} index {} outside 1..={}", what, idx, bound),
        ));
    }
    Ok(idx - 1)
}

fn io_error(e: std::io::Error, line: usize) -> RsbError {
    if e.kind() == ErrorKind::InvalidData {
        RsbError::format(line, "input is not valid UTF-8")
    } else {
        RsbError::Io(e)
    }
}

/// Reads Matrix Market text from `reader`
pub fn read<T: Scalar, R: BufRead>(reader: R) -> Result<MtxData<T>> {
    let mut lines = reader.lines().enumerate().map(|(i, l)| (i + 1, l));

    let (field, symmetry) = match lines.next() {
        Some((line_no, line)) => parse_header(&line.map_err(|e| io_error(e, line_no))?)?,
        None => return Err(RsbError::format(1, "empty input")),
    };

    let mut size: Option<(usize, usize, usize)> = None;
    let mut triplets = Triplets::with_capacity(0);

    for (line_no, line) in lines {
        let line = line.map_err(|e| io_error(e, line_no))?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('%') {
            continue;
        }
        let tokens: Vec<&str> = line.split_whitespace().collect();

        let Some((rows, cols, nnz)) = size else {
            if tokens.len() != 3 {
                return Err(RsbError::format(line_no, "size line needs 'rows cols nnz'"));
            }
            let mut dims = [0usize; 3];
            for (d, t) in dims.iter_mut().zip(&tokens) {
                *d = t
                    .parse()
                    .map_err(|_| RsbError::format(line_no, format!("bad size value '{}'", t)))?;
            }
            if symmetry.is_symmetric_storage() && dims[0] != dims[1] {
                return Err(RsbError::format(
                    line_no,
                    format!("{} matrix must be square", symmetry.mtx_keyword()),
                ));
            }
            if dims[0].checked_mul(dims[1]).map_or(false, |cells| dims[2] > cells) {
                return Err(RsbError::format(
                    line_no,
                    format!(
                        "{} entries do not fit a {}x{} matrix",
                        dims[2], dims[0], dims[1]
                    ),
                ));
            }
            triplets = Triplets::with_capacity(dims[2].min(MTX_MAX_PREALLOCATED_ENTRIES));
            size = Some((dims[0], dims[1], dims[2]));
            continue;
        };

        if triplets.len() == nnz {
            return Err(RsbError::format(
                line_no,
                format!("more entries than the declared {}", nnz),
            ));
        }

        let expected = if field == MtxField::Pattern { 2 } else { 3 };
        if tokens.len() != expected {
            return Err(RsbError::format(
                line_no,
                format!("expected {} tokens, found {}", expected, tokens.len()),
            ));
        }
        let mut row = parse_index(tokens[0], rows, "row", line_no)?;
        let mut col = parse_index(tokens[1], cols, "column", line_no)?;
        let value = if field == MtxField::Pattern {
            T::one()
        } else {
            tokens[2]
                .parse::<T>()
                .map_err(|_| RsbError::format(line_no, format!("bad value '{}'", tokens[2])))?
        };
        if symmetry.is_symmetric_storage() && row < col {
            std::mem::swap(&mut row, &mut col);
        }
        triplets.push(row, col, value);
    }

    let Some((rows, cols, nnz)) = size else {
        return Err(RsbError::format(0, "missing size line"));
    };
    if triplets.len() != nnz {
        return Err(RsbError::format(
            0,
            format!("expected {} entries, found {}", nnz, triplets.len()),
        ));
    }

    debug!(
        "read Matrix Market {}x{} with {} entries ({:?}, {:?})",
        rows, cols, nnz, field, symmetry
    );
    Ok(MtxData {
        rows,
        cols,
        field,
        symmetry,
        triplets,
    })
}

/// Parses Matrix Market text
pub fn parse<T: Scalar>(text: &str) -> Result<MtxData<T>> {
    read(text.as_bytes())
}

/// Renders a matrix as Matrix Market text
///
/// Symmetric storage writes the lower triangle under a `symmetric` (or
/// `hermitian`) header. Values use the shortest text that reads back to the
/// same number.
pub fn serialize<T: Scalar>(a: &RsbMatrix<T>) -> String {
    let entries = a.find();
    let mut out = String::with_capacity(64 + entries.len() * 24);
    out.push_str("%%MatrixMarket matrix coordinate real ");
    out.push_str(a.symmetry().mtx_keyword());
    out.push('\n');
    out.push_str(&format!("{} {} {}\n", a.rows(), a.cols(), entries.len()));
    for ((r, c), v) in entries
        .row_indices
        .iter()
        .zip(&entries.col_indices)
        .zip(&entries.values)
    {
        out.push_str(&format!("{} {} {}\n", r + 1, c + 1, v));
    }
    out
}

/// Writes a matrix as Matrix Market text
pub fn write<T: Scalar, W: Write>(a: &RsbMatrix<T>, mut writer: W) -> Result<()> {
    writer.write_all(serialize(a).as_bytes())?;
    writer.flush()?;
    Ok(())
}

/// Builds a matrix from Matrix Market bytes
pub fn load_from_text<T: Scalar>(bytes: &[u8]) -> Result<RsbMatrix<T>> {
    read(bytes)?.into_matrix()
}

/// Matrix Market bytes for a matrix
pub fn save_to_text<T: Scalar>(a: &RsbMatrix<T>) -> Vec<u8> {
    serialize(a).into_bytes()
}

/// Loads a matrix from a Matrix Market file
pub fn load_file<T: Scalar, P: AsRef<Path>>(path: P) -> Result<RsbMatrix<T>> {
    let file = File::open(path.as_ref())?;
    read(BufReader::new(file))?.into_matrix()
}

/// Saves a matrix to a Matrix Market file
pub fn save_file<T: Scalar, P: AsRef<Path>>(path: P, a: &RsbMatrix<T>) -> Result<()> {
    let file = File::create(path.as_ref())?;
    write(a, BufWriter::new(file))
}
