//! Error types for folio-core.
//!
//! Cell failures never show up here: they are recorded on the cell as a
//! [`CellFailure`](crate::output::CellFailure). This type only covers misuse of
//! the mutation surface and I/O done on behalf of the host.

use thiserror::Error;

use crate::document::CellId;

/// Result type for folio-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in folio-core.
#[derive(Debug, Error)]
pub enum Error {
    /// Cell not found.
    #[error("cell not found: {0}")]
    CellNotFound(CellId),

    /// Insert or move target outside the notebook.
    #[error("index {index} is out of bounds for a notebook with {len} cells")]
    InvalidIndex { index: usize, len: usize },

    /// Cell type that cannot be written to a delimiter line.
    #[error("invalid cell type '{0}': must be non-empty without whitespace or ']'")]
    InvalidCellType(String),

    /// Empty cell property key.
    #[error("invalid property key '{0}': must be non-empty")]
    InvalidPropertyKey(String),

    /// The notebook instance was shut down; its handle can no longer be used.
    #[error("notebook instance has been shut down")]
    NotebookClosed,

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Render the error together with a short recovery hint for end users.
    pub fn with_hint(&self) -> String {
        let hint = match self {
            Error::CellNotFound(_) => {
                "the cell may have been removed; refresh the notebook snapshot"
            }
            Error::InvalidIndex { .. } => {
                "indices are zero-based and may equal the cell count to append"
            }
            Error::InvalidCellType(_) => "use a single word such as 'markdown' or 'json'",
            Error::InvalidPropertyKey(_) => "give the property a name",
            Error::NotebookClosed => "reopen the notebook to get a fresh handle",
            Error::Io(_) => "check that the file exists and is readable",
            Error::Json(_) => "the value must be valid JSON",
        };
        format!("{self}\n  hint: {hint}")
    }
}
