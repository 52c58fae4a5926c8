//! Jupyter notebook (.ipynb) generation.
//!
//! Converts a notebook snapshot to nbformat 4.5.

use std::fs;
use std::path::Path;

use folio_core::execute::{CellView, NotebookSnapshot};
use folio_core::output::{ConsoleLevel, FailureKind};
use folio_core::{CellOutput as FolioOutput, RunState};
use serde::{Deserialize, Serialize};

use crate::error::{ExportError, ExportResult};

/// Folio cell type exported as a Jupyter markdown cell.
const MARKDOWN_CELL_TYPE: &str = "markdown";

/// A Jupyter notebook.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JupyterNotebook {
    /// Notebook metadata
    pub metadata: JupyterMetadata,

    /// Format version (always 4)
    pub nbformat: u32,

    /// Minor format version
    pub nbformat_minor: u32,

    /// Notebook cells
    pub cells: Vec<JupyterCell>,
}

/// Jupyter notebook metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JupyterMetadata {
    pub kernelspec: KernelSpec,

    pub language_info: LanguageInfo,

    /// Folio metadata carried along for reference
    #[serde(skip_serializing_if = "Option::is_none")]
    pub folio: Option<FolioMetadata>,
}

/// Kernel specification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KernelSpec {
    pub display_name: String,
    pub language: String,
    pub name: String,
}

/// Language information.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LanguageInfo {
    pub file_extension: String,
    pub mimetype: String,
    pub name: String,
}

/// Folio notebook-level metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FolioMetadata {
    /// Source file path
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_file: Option<String>,

    /// Exporter version
    pub version: String,

    /// Text format version of the source
    pub format_version: u32,

    /// The notebook's own metadata block
    #[serde(skip_serializing_if = "serde_json::Map::is_empty", default)]
    pub notebook: serde_json::Map<String, serde_json::Value>,
}

/// A Jupyter cell.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JupyterCell {
    /// Cell id (required since nbformat 4.5)
    pub id: String,

    /// "markdown" or "code"
    pub cell_type: String,

    pub metadata: CellMetadata,

    /// Cell source (lines, newline kept on all but the last)
    pub source: Vec<String>,

    /// Cell outputs (code cells only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outputs: Option<Vec<CellOutput>>,

    /// Execution count (code cells only; `null` when never run)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_count: Option<Option<u32>>,
}

/// Cell metadata.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CellMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub folio: Option<FolioCellMetadata>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

/// Folio cell metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FolioCellMetadata {
    /// Folio cell type (the Jupyter type is only markdown or code)
    pub cell_type: String,

    /// Run state at export time
    pub state: RunState,

    /// Inline cell properties
    #[serde(skip_serializing_if = "serde_json::Map::is_empty", default)]
    pub properties: serde_json::Map<String, serde_json::Value>,
}

/// Cell output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "output_type")]
pub enum CellOutput {
    /// Standard output/error
    #[serde(rename = "stream")]
    Stream { name: String, text: Vec<String> },

    /// Rich result of the cell
    #[serde(rename = "execute_result")]
    ExecuteResult {
        execution_count: u32,
        data: OutputData,
        metadata: serde_json::Value,
    },

    /// Error output
    #[serde(rename = "error")]
    Error {
        ename: String,
        evalue: String,
        traceback: Vec<String>,
    },
}

/// Output data with multiple representations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutputData {
    #[serde(rename = "text/plain", skip_serializing_if = "Option::is_none")]
    pub text_plain: Option<Vec<String>>,

    #[serde(rename = "text/html", skip_serializing_if = "Option::is_none")]
    pub text_html: Option<Vec<String>>,

    #[serde(rename = "application/json", skip_serializing_if = "Option::is_none")]
    pub application_json: Option<serde_json::Value>,
}

impl OutputData {
    fn is_empty(&self) -> bool {
        self.text_plain.is_none() && self.text_html.is_none() && self.application_json.is_none()
    }
}

impl JupyterNotebook {
    /// Create a new empty notebook.
    pub fn new() -> Self {
        Self {
            metadata: JupyterMetadata::default(),
            nbformat: 4,
            nbformat_minor: 5,
            cells: Vec::new(),
        }
    }

    /// Write the notebook to a file.
    pub fn write_to_file(&self, path: impl AsRef<Path>) -> ExportResult<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).map_err(|e| ExportError::WriteError {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Ok(())
    }
}

impl Default for JupyterNotebook {
    fn default() -> Self {
        Self::new()
    }
}

impl Default for JupyterMetadata {
    fn default() -> Self {
        Self {
            kernelspec: KernelSpec {
                display_name: "Folio".to_string(),
                language: "text".to_string(),
                name: "folio".to_string(),
            },
            language_info: LanguageInfo {
                file_extension: ".folio".to_string(),
                mimetype: "text/plain".to_string(),
                name: "folio".to_string(),
            },
            folio: None,
        }
    }
}

/// Export settings.
#[derive(Debug, Clone)]
pub struct ExportConfig {
    /// Include last outputs of executed cells.
    pub include_outputs: bool,
    /// Include outputs of cells edited since they ran.
    pub include_stale_outputs: bool,
    /// Recorded in the notebook metadata.
    pub source_file: Option<String>,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            include_outputs: true,
            include_stale_outputs: true,
            source_file: None,
        }
    }
}

/// Generator for Jupyter notebooks from Folio snapshots.
pub struct IpynbGenerator {
    config: ExportConfig,
    /// Execution counter
    execution_count: u32,
}

impl IpynbGenerator {
    pub fn new(config: ExportConfig) -> Self {
        Self {
            config,
            execution_count: 1,
        }
    }

    /// Generate a Jupyter notebook from a snapshot.
    pub fn generate(&mut self, snapshot: &NotebookSnapshot) -> JupyterNotebook {
        let mut notebook = JupyterNotebook::new();
        notebook.metadata.folio = Some(FolioMetadata {
            source_file: self.config.source_file.clone(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            format_version: snapshot.content.format_version,
            notebook: snapshot.content.metadata.clone().into_json_map(),
        });

        for cell in &snapshot.cells {
            notebook.cells.push(self.convert_cell(cell));
        }
        notebook
    }

    /// Convert a Folio cell to a Jupyter cell.
    fn convert_cell(&mut self, cell: &CellView) -> JupyterCell {
        let metadata = CellMetadata {
            folio: Some(FolioCellMetadata {
                cell_type: cell.cell_type.clone(),
                state: cell.state,
                properties: cell.properties.clone().into_json_map(),
            }),
            tags: None,
        };

        if cell.cell_type == MARKDOWN_CELL_TYPE {
            return JupyterCell {
                id: cell.id.to_string(),
                cell_type: "markdown".to_string(),
                metadata,
                source: source_lines(&cell.content),
                outputs: None,
                execution_count: None,
            };
        }

        let output = cell.output.as_ref().filter(|_| self.exports_output(cell.state));
        let (outputs, execution_count) = match output {
            Some(output) => {
                let count = self.execution_count;
                self.execution_count += 1;
                (convert_output(output, count), Some(count))
            }
            None => (Vec::new(), None),
        };

        JupyterCell {
            id: cell.id.to_string(),
            cell_type: "code".to_string(),
            metadata,
            source: source_lines(&cell.content),
            outputs: Some(outputs),
            execution_count: Some(execution_count),
        }
    }

    fn exports_output(&self, state: RunState) -> bool {
        match state {
            RunState::Done | RunState::Error => self.config.include_outputs,
            RunState::Stale => self.config.include_outputs && self.config.include_stale_outputs,
            RunState::Idle | RunState::Queued | RunState::Running => false,
        }
    }
}

impl Default for IpynbGenerator {
    fn default() -> Self {
        Self::new(ExportConfig::default())
    }
}

/// Console first, then the rich result, then the failure.
fn convert_output(output: &FolioOutput, execution_count: u32) -> Vec<CellOutput> {
    let mut outputs = Vec::new();

    for (name, lines) in console_streams(output) {
        outputs.push(CellOutput::Stream { name, text: lines });
    }

    let data = OutputData {
        text_plain: output.text.as_deref().map(source_lines),
        text_html: output.html.as_deref().map(source_lines),
        application_json: output.json.clone(),
    };
    if !data.is_empty() {
        outputs.push(CellOutput::ExecuteResult {
            execution_count,
            data,
            metadata: serde_json::json!({}),
        });
    }

    if let Some(failure) = &output.failure {
        let ename = match failure.kind {
            FailureKind::UnknownCellType => "UnknownCellType",
            FailureKind::HandlerExecution => "HandlerExecution",
        };
        outputs.push(CellOutput::Error {
            ename: ename.to_string(),
            evalue: failure.message.clone(),
            traceback: Vec::new(),
        });
    }

    outputs
}

/// Group consecutive console entries into stdout/stderr streams.
fn console_streams(output: &FolioOutput) -> Vec<(String, Vec<String>)> {
    let mut streams: Vec<(String, Vec<String>)> = Vec::new();
    for entry in &output.console {
        let name = match entry.level {
            ConsoleLevel::Log => "stdout",
            ConsoleLevel::Warn | ConsoleLevel::Error => "stderr",
        };
        let line = format!("{}\n", entry.message);
        match streams.last_mut() {
            Some((last, lines)) if last == name => lines.push(line),
            _ => streams.push((name.to_string(), vec![line])),
        }
    }
    streams
}

/// Split text the way nbformat stores multiline strings.
fn source_lines(text: &str) -> Vec<String> {
    text.split_inclusive('\n').map(str::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use folio_core::document::{CellId, NotebookContent, Properties};
    use folio_core::execute::QueueState;
    use folio_core::output::{CellFailure, ConsoleEntry};
    use serde_json::json;

    fn view(id: u64, cell_type: &str, content: &str, state: RunState) -> CellView {
        CellView {
            id: CellId::new(id),
            cell_type: cell_type.to_string(),
            content: content.to_string(),
            properties: Properties::new(),
            state,
            output: None,
        }
    }

    fn snapshot(cells: Vec<CellView>) -> NotebookSnapshot {
        NotebookSnapshot {
            version: 0,
            dirty: false,
            content: NotebookContent::new(),
            cells,
            queue: QueueState::default(),
        }
    }

    #[test]
    fn test_empty_notebook() {
        let notebook = JupyterNotebook::new();
        assert_eq!(notebook.nbformat, 4);
        assert_eq!(notebook.nbformat_minor, 5);
        assert!(notebook.cells.is_empty());
    }

    #[test]
    fn test_markdown_cell() {
        let mut generator = IpynbGenerator::default();
        let cell = generator.convert_cell(&view(0, "markdown", "# Hello\n\nText", RunState::Idle));

        assert_eq!(cell.cell_type, "markdown");
        assert_eq!(cell.source, vec!["# Hello\n", "\n", "Text"]);
        assert!(cell.outputs.is_none());
        assert!(cell.execution_count.is_none());
    }

    #[test]
    fn test_unexecuted_code_cell() {
        let mut generator = IpynbGenerator::default();
        let cell = generator.convert_cell(&view(1, "json", "{}", RunState::Idle));

        assert_eq!(cell.cell_type, "code");
        assert_eq!(cell.outputs, Some(Vec::new()));
        assert_eq!(cell.execution_count, Some(None));

        let json = serde_json::to_value(&cell).unwrap();
        assert!(json["execution_count"].is_null());
        assert_eq!(json["metadata"]["folio"]["cell_type"], "json");
    }

    #[test]
    fn test_outputs_are_converted() {
        let mut cell = view(2, "html", "<b>x</b>", RunState::Done);
        cell.output = Some(FolioOutput {
            console: vec![
                ConsoleEntry {
                    level: ConsoleLevel::Log,
                    message: "one".into(),
                },
                ConsoleEntry {
                    level: ConsoleLevel::Log,
                    message: "two".into(),
                },
                ConsoleEntry {
                    level: ConsoleLevel::Warn,
                    message: "careful".into(),
                },
            ],
            ..FolioOutput::html("<b>x</b>").with_json(json!({"x": 1}))
        });

        let mut generator = IpynbGenerator::default();
        let converted = generator.convert_cell(&cell);
        let outputs = converted.outputs.unwrap();

        assert_eq!(
            outputs[0],
            CellOutput::Stream {
                name: "stdout".into(),
                text: vec!["one\n".into(), "two\n".into()],
            }
        );
        assert!(matches!(&outputs[1], CellOutput::Stream { name, .. } if name == "stderr"));
        match &outputs[2] {
            CellOutput::ExecuteResult { data, execution_count, .. } => {
                assert_eq!(*execution_count, 1);
                assert_eq!(data.text_html, Some(vec!["<b>x</b>".to_string()]));
                assert_eq!(data.application_json, Some(json!({"x": 1})));
            }
            other => panic!("expected execute_result, got {other:?}"),
        }
        assert_eq!(converted.execution_count, Some(Some(1)));
    }

    #[test]
    fn test_failure_becomes_error_output() {
        let mut cell = view(3, "mystery", "", RunState::Error);
        cell.output = Some(FolioOutput::failed(CellFailure::unknown_cell_type("mystery")));

        let mut generator = IpynbGenerator::default();
        let outputs = generator.convert_cell(&cell).outputs.unwrap();

        assert_eq!(outputs.len(), 1);
        assert!(matches!(
            &outputs[0],
            CellOutput::Error { ename, .. } if ename == "UnknownCellType"
        ));
    }

    #[test]
    fn test_stale_outputs_can_be_dropped() {
        let mut cell = view(4, "json", "{}", RunState::Stale);
        cell.output = Some(FolioOutput::text("old"));

        let mut generator = IpynbGenerator::new(ExportConfig {
            include_stale_outputs: false,
            ..ExportConfig::default()
        });
        let converted = generator.convert_cell(&cell);
        assert_eq!(converted.outputs, Some(Vec::new()));
    }

    #[test]
    fn test_execution_counts_increase() {
        let mut first = view(0, "json", "{}", RunState::Done);
        first.output = Some(FolioOutput::text("a"));
        let mut second = view(1, "json", "{}", RunState::Done);
        second.output = Some(FolioOutput::text("b"));

        let notebook = IpynbGenerator::default().generate(&snapshot(vec![
            first,
            view(2, "markdown", "text", RunState::Idle),
            second,
        ]));

        let counts: Vec<_> = notebook.cells.iter().map(|c| c.execution_count).collect();
        assert_eq!(counts, vec![Some(Some(1)), None, Some(Some(2))]);
    }

    #[test]
    fn test_notebook_serialization() {
        let notebook = IpynbGenerator::default().generate(&snapshot(Vec::new()));
        let json = serde_json::to_string_pretty(&notebook).unwrap();

        assert!(json.contains("nbformat"));
        assert!(json.contains("\"folio\""));
        assert!(json.contains("cells"));
    }
}
