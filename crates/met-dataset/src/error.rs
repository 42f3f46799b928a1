//! Error types for dataset handling.

use std::path::PathBuf;

use thiserror::Error;

/// Result type for dataset operations.
pub type DatasetResult<T> = Result<T, DatasetError>;

/// Errors that can occur while building, reading or writing a dataset.
#[derive(Error, Debug)]
pub enum DatasetError {
    /// File I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The dataset file does not exist
    #[error("dataset not found: {}", .0.display())]
    NotFound(PathBuf),

    /// The file exists but is not a valid encoding
    #[error("invalid dataset format: {0}")]
    InvalidFormat(String),

    /// A variable the caller asked for is absent
    #[error("missing variable: {0}")]
    MissingVariable(String),

    /// A variable with the same name already exists
    #[error("variable already exists: {0}")]
    DuplicateVariable(String),

    /// A variable references an unknown dimension or a conflicting length
    #[error("dimension error: {0}")]
    Dimension(String),

    /// Data length does not match the product of the variable's dimensions
    #[error("shape mismatch for {name}: expected {expected} values, got {actual}")]
    ShapeMismatch {
        name: String,
        expected: usize,
        actual: usize,
    },

    /// Backend-specific failure (or a backend that is not compiled in)
    #[error("backend error: {0}")]
    Backend(String),
}

impl DatasetError {
    /// Create an InvalidFormat error.
    pub fn invalid_format(msg: impl Into<String>) -> Self {
        Self::InvalidFormat(msg.into())
    }

    /// Create a Backend error.
    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }
}

impl From<serde_json::Error> for DatasetError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidFormat(err.to_string())
    }
}
