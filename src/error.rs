//! Error types for ethogram

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Ethogram error types
#[derive(Error, Debug)]
pub enum Error {
    /// Query parsing error (SQL front-end)
    #[error("SQL parse error: {0}")]
    Parse(String),

    /// Caller-supplied input is malformed or out of range
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Not enough data to run a computation
    #[error("Insufficient data for {context}: need {needed}, got {got}")]
    InsufficientData {
        /// What was being computed
        context: String,
        /// Minimum amount required
        needed: usize,
        /// Amount actually available
        got: usize,
    },

    /// A model fit failed to converge or produced a degenerate result
    #[error("{model} fit failed: {reason}")]
    Fit {
        /// Which model was being fitted
        model: String,
        /// Why the fit failed
        reason: String,
    },

    /// Duplicate key on the weight insert path
    #[error("Duplicate weight record for subject {subject_id}, session {session_id}, trial {trial_id}")]
    DuplicateWeight {
        /// Subject the record belongs to
        subject_id: String,
        /// Session the record belongs to
        session_id: String,
        /// Trial index within the session
        trial_id: u64,
    },

    /// Storage error (Parquet/Arrow)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Figure rendering error
    #[error("Report error: {0}")]
    Report(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Arrow/Parquet error
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// Generic error
    #[error("{0}")]
    Other(String),
}
