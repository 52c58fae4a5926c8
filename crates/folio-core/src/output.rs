//! Cell output representation.
//!
//! Everything here is serializable so the last known outputs can be exported
//! or shipped to a UI as-is.

use serde::{Deserialize, Serialize};

/// Output attached to a cell after its handler settles.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CellOutput {
    /// Plain text representation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// HTML representation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html: Option<String>,
    /// Structured JSON data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json: Option<serde_json::Value>,
    /// Console lines written while the cell was running.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub console: Vec<ConsoleEntry>,
    /// Failure detail when the run ended in `Error`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<CellFailure>,
}

impl CellOutput {
    /// Output with no representation at all.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn html(html: impl Into<String>) -> Self {
        Self {
            html: Some(html.into()),
            ..Self::default()
        }
    }

    pub fn json(value: serde_json::Value) -> Self {
        Self {
            json: Some(value),
            ..Self::default()
        }
    }

    /// Output recording a failure.
    pub fn failed(failure: CellFailure) -> Self {
        Self {
            failure: Some(failure),
            ..Self::default()
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_html(mut self, html: impl Into<String>) -> Self {
        self.html = Some(html.into());
        self
    }

    pub fn with_json(mut self, value: serde_json::Value) -> Self {
        self.json = Some(value);
        self
    }

    pub fn is_failure(&self) -> bool {
        self.failure.is_some()
    }

    /// Whether there is nothing to render.
    pub fn is_empty(&self) -> bool {
        self.text.is_none()
            && self.html.is_none()
            && self.json.is_none()
            && self.console.is_empty()
            && self.failure.is_none()
    }
}

/// Why a cell's run failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// No handler is registered for the cell's type.
    UnknownCellType,
    /// The handler returned an error.
    HandlerExecution,
}

/// Cell-scoped failure detail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl CellFailure {
    pub fn unknown_cell_type(cell_type: &str) -> Self {
        Self {
            kind: FailureKind::UnknownCellType,
            message: format!("no handler registered for cell type '{cell_type}'"),
        }
    }

    pub fn handler(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::HandlerExecution,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for CellFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

/// Severity of a console line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsoleLevel {
    Log,
    Warn,
    Error,
}

/// One line written to the console by a running cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsoleEntry {
    pub level: ConsoleLevel,
    pub message: String,
}
