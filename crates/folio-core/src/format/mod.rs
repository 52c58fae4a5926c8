//! Plain-text notebook format.
//!
//! ```text
//! ---
//! {
//!   "continue_on_error": true
//! }
//! ---
//! # %% [markdown] collapsed=true
//! # Title
//!
//! # %% [json] run_on_load=true
//! {"x": 1}
//! ```
//!
//! An optional JSON metadata block fenced by `---` lines is followed by cell
//! blocks. Each block starts with a delimiter line carrying the cell type and
//! inline `key=value` properties. Parsing never fails: anything it cannot make
//! sense of is kept as content and reported as a [`ParseAnomaly`].

mod parser;
mod serializer;

use serde::{Deserialize, Serialize};

use crate::document::NotebookContent;

pub use parser::parse;
pub use serializer::serialize;

/// Prefix of every cell delimiter line.
pub const CELL_MARKER: &str = "# %%";

/// Line fencing the metadata block.
pub const METADATA_FENCE: &str = "---";

/// Reserved metadata key carrying the format version.
pub const FORMAT_VERSION_KEY: &str = "format_version";

/// Result of parsing: the document plus anything that looked wrong.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedDocument {
    pub content: NotebookContent,
    pub anomalies: Vec<ParseAnomaly>,
}

impl ParsedDocument {
    /// Whether the text parsed without any anomaly.
    pub fn is_clean(&self) -> bool {
        self.anomalies.is_empty()
    }
}

/// Category of a recoverable parse problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    /// A line starting with the cell marker that is not a valid delimiter.
    MalformedDelimiter,
    /// The metadata block is not a JSON object.
    InvalidMetadata,
    /// The metadata block has no closing fence.
    UnterminatedMetadata,
    /// `format_version` is not a non-negative integer.
    InvalidFormatVersion,
    /// Text before the first cell delimiter.
    OrphanContent,
}

/// A recoverable problem found while parsing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseAnomaly {
    pub kind: AnomalyKind,
    /// 1-based line number.
    pub line: usize,
    pub message: String,
}

impl std::fmt::Display for ParseAnomaly {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "line {}: {}", self.line, self.message)
    }
}
