//! Error types for the pipeline.
//!
//! Only [`PipelineError::InvalidRange`] and [`PipelineError::Config`] abort a
//! run, and both are raised before the first unit is processed. Every other
//! variant is caught at the unit boundary and recorded as a failed
//! [`JobResult`](crate::report::JobResult).

use std::path::{Path, PathBuf};

use geosfp_common::CalendarError;
use met_dataset::DatasetError;
use thiserror::Error;

/// Errors that can occur while running the pipeline.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Invalid range: {0}")]
    InvalidRange(#[from] CalendarError),

    #[error("Remote unavailable ({location}): {message}")]
    RemoteUnavailable { location: String, message: String },

    #[error("Missing input: {}", .0.display())]
    MissingInput(PathBuf),

    #[error("Transform failed: {0}")]
    Transform(String),

    #[error("Failed to write {}: {message}", path.display())]
    Write { path: PathBuf, message: String },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// Create a RemoteUnavailable error.
    pub fn remote(location: impl Into<String>, message: impl Into<String>) -> Self {
        Self::RemoteUnavailable {
            location: location.into(),
            message: message.into(),
        }
    }

    /// Create a Transform error.
    pub fn transform(msg: impl Into<String>) -> Self {
        Self::Transform(msg.into())
    }

    /// Create a Write error.
    pub fn write(path: impl AsRef<Path>, message: impl ToString) -> Self {
        Self::Write {
            path: path.as_ref().to_path_buf(),
            message: message.to_string(),
        }
    }

    /// Create a Config error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Map a failure to read an input dataset.
    ///
    /// An absent file is a missing input; anything else means the input
    /// exists but cannot be used, which is a transform failure.
    pub fn from_read(path: &Path, err: DatasetError) -> Self {
        match err {
            DatasetError::NotFound(_) => Self::MissingInput(path.to_path_buf()),
            other => Self::Transform(format!("cannot read {}: {}", path.display(), other)),
        }
    }

    /// Whether this error aborts the whole run.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::InvalidRange(_) | Self::Config(_))
    }

    /// Short machine-readable kind, used in reports and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidRange(_) => "invalid_range",
            Self::RemoteUnavailable { .. } => "remote_unavailable",
            Self::MissingInput(_) => "missing_input",
            Self::Transform(_) => "transform",
            Self::Write { .. } => "write",
            Self::Config(_) => "config",
            Self::Io(_) => "io",
        }
    }
}

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;
