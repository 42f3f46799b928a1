//! Error types for calendar and layout handling.

use thiserror::Error;

/// Result type alias using CalendarError.
pub type CalendarResult<T> = Result<T, CalendarError>;

/// Errors raised while building calendar units, ranges or output targets.
///
/// All of these are configuration errors: they are detected before any
/// unit is processed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CalendarError {
    #[error("Invalid calendar key '{0}': expected YYYYMMDD or YYYYMM")]
    InvalidKey(String),

    #[error("Invalid calendar date {year:04}-{month:02}-{day:02}")]
    InvalidDate { year: i32, month: u32, day: u32 },

    #[error("Invalid range {start}..{end}: {reason}")]
    InvalidRange {
        start: String,
        end: String,
        reason: String,
    },

    #[error("Invalid output target '{0}': expected LABEL=DIR or LABEL=DIR:COARSEN")]
    InvalidTarget(String),
}

impl CalendarError {
    /// Create an InvalidRange error.
    pub fn invalid_range(
        start: impl Into<String>,
        end: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidRange {
            start: start.into(),
            end: end.into(),
            reason: reason.into(),
        }
    }
}
