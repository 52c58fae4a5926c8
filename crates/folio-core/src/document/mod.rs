//! Document model for Folio notebooks.
//!
//! This module provides:
//! - Persisted content types (`NotebookContent`, `CellContent`)
//! - Property maps with truthiness reads
//! - The live `DocumentModel` with run state and version tracking

mod content;
mod model;
mod properties;

pub use content::{
    CURRENT_FORMAT_VERSION, CellContent, CellMetadata, DEFAULT_CELL_TYPE_KEY, FALLBACK_CELL_TYPE,
    NotebookContent,
};
pub use model::{Cell, CellId, DocumentModel, RunState};
pub use properties::{Properties, is_truthy};
