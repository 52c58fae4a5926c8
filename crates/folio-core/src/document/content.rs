//! Persisted notebook content: what the text format reads and writes.

use serde::{Deserialize, Serialize};

use super::Properties;

/// Current version of the text format.
pub const CURRENT_FORMAT_VERSION: u32 = 1;

/// Cell type used when nothing else is known about a block of text.
pub const FALLBACK_CELL_TYPE: &str = "markdown";

/// Notebook metadata key selecting the cell type for untyped text.
pub const DEFAULT_CELL_TYPE_KEY: &str = "default_cell_type";

/// The notebook as stored on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotebookContent {
    /// Text format version.
    pub format_version: u32,
    /// Cells in document order.
    pub cells: Vec<CellContent>,
    /// Notebook-level metadata.
    #[serde(default)]
    pub metadata: Properties,
}

impl NotebookContent {
    /// An empty notebook at the current format version.
    pub fn new() -> Self {
        Self {
            format_version: CURRENT_FORMAT_VERSION,
            cells: Vec::new(),
            metadata: Properties::new(),
        }
    }

    /// Append a cell, builder style.
    pub fn with_cell(mut self, cell: CellContent) -> Self {
        self.cells.push(cell);
        self
    }

    /// Cell type for text that carries no explicit type.
    pub fn default_cell_type(&self) -> &str {
        self.metadata
            .get(DEFAULT_CELL_TYPE_KEY)
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .unwrap_or(FALLBACK_CELL_TYPE)
    }
}

impl Default for NotebookContent {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-cell metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CellMetadata {
    /// Handler configuration and editor flags.
    #[serde(default)]
    pub properties: Properties,
}

/// A cell as stored on disk. Identifiers are assigned on load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellContent {
    pub cell_type: String,
    pub content: String,
    #[serde(default)]
    pub metadata: CellMetadata,
}

impl CellContent {
    pub fn new(cell_type: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            cell_type: cell_type.into(),
            content: content.into(),
            metadata: CellMetadata::default(),
        }
    }

    /// Set an inline property, builder style.
    pub fn with_property(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.metadata.properties.insert(key, value);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_cell_type_falls_back_to_markdown() {
        let mut content = NotebookContent::new();
        assert_eq!(content.default_cell_type(), "markdown");

        content.metadata.insert(DEFAULT_CELL_TYPE_KEY, "javascript");
        assert_eq!(content.default_cell_type(), "javascript");

        content.metadata.insert(DEFAULT_CELL_TYPE_KEY, 3);
        assert_eq!(content.default_cell_type(), "markdown");
    }
}
