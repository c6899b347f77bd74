//! Error types for RSB

use thiserror::Error;

/// Result type alias using the crate's error
pub type Result<T> = std::result::Result<T, RsbError>;

/// Errors that can occur while building, multiplying, tuning or loading matrices
#[derive(Error, Debug)]
pub enum RsbError {
    /// Mismatched array lengths, out-of-range index or bad dimension
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Malformed Matrix Market text
    #[error("Format error at line {line}: {reason}")]
    Format {
        /// 1-based line number in the input (0 when the input ended early)
        line: usize,
        /// What was wrong with it
        reason: String,
    },

    /// Allocation or thread pool creation failed
    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    /// Requested value type, symmetry or operation is not implemented
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// The engine context was shut down
    #[error("Engine context has been shut down")]
    ContextClosed,

    /// I/O failure in the file helpers
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RsbError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        RsbError::InvalidInput(msg.into())
    }

    pub(crate) fn format(line: usize, reason: impl Into<String>) -> Self {
        RsbError::Format {
            line,
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = RsbError::invalid("row index 7 out of range");
        assert_eq!(err.to_string(), "Invalid input: row index 7 out of range");

        let err = RsbError::format(3, "expected 3 tokens");
        assert_eq!(err.to_string(), "Format error at line 3: expected 3 tokens");

        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: RsbError = io.into();
        assert!(matches!(err, RsbError::Io(_)));
    }
}
