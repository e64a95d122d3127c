//! Store error types.

use std::io;
use std::path::PathBuf;

use crate::database::StructuralError;

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors from loading, validating or updating the pinned database
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("pinned database is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("pinned database not found: {0}")]
    NotFound(PathBuf),

    #[error("pinned database failed validation ({} problem(s)): {}", .0.len(), summarize(.0))]
    Invalid(Vec<StructuralError>),

    #[error("JCS canonicalization error: {0}")]
    Canonicalization(String),
}

impl StoreError {
    /// Whether the error means the document itself is broken, as opposed to
    /// the filesystem failing underneath it.
    pub fn is_corrupt(&self) -> bool {
        matches!(self, StoreError::Json(_) | StoreError::Invalid(_))
    }
}

fn summarize(errors: &[StructuralError]) -> String {
    match errors {
        [] => String::new(),
        [only] => only.to_string(),
        [first, ..] => format!("{} (first)", first),
    }
}
