//! Error types for notebook export.

use std::path::PathBuf;

/// Result type for export operations.
pub type ExportResult<T> = Result<T, ExportError>;

/// Errors that can occur during export.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    /// Failed to write output file.
    #[error("Failed to write file {path}: {message}")]
    WriteError { path: PathBuf, message: String },

    /// Failed to serialize JSON.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}
