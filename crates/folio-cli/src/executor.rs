//! Shared notebook execution pipeline for the Folio CLI.
//!
//! Used by `run` and `export`: load the file, open a notebook instance, run a
//! target while printing progress from the event stream, then collect the
//! final snapshot and shut the instance down.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use folio_core::document::{CellId, RunState};
use folio_core::execute::{
    EngineConfig, Notebook, NotebookEvent, NotebookHandle, NotebookSnapshot, RunReport, RunTarget,
};
use folio_core::format::ParseAnomaly;
use tokio::sync::broadcast::error::RecvError;

use crate::colors;

/// A notebook file read from disk.
pub struct LoadedNotebook {
    /// Path as given on the command line.
    pub path: PathBuf,
    /// Raw file text.
    pub source: String,
}

/// Result of one headless run.
pub struct ExecutionInfo {
    /// Final state of every cell.
    pub snapshot: NotebookSnapshot,
    /// Per-target outcomes of the run request.
    pub report: RunReport,
    /// Anomalies found while parsing the file.
    pub anomalies: Vec<ParseAnomaly>,
    pub execution_time: Duration,
}

impl LoadedNotebook {
    pub fn load(notebook_path: &str) -> anyhow::Result<Self> {
        let path = Path::new(notebook_path);
        if !path.exists() {
            anyhow::bail!("Notebook not found: {}", notebook_path);
        }

        let source = fs::read_to_string(path).map_err(folio_core::Error::from)?;
        Ok(Self {
            path: path.to_path_buf(),
            source,
        })
    }

    /// File stem used in headers and default output names.
    pub fn notebook_name(&self) -> String {
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "notebook".to_string())
    }

    pub fn print_header(&self, action: &str) {
        println!(
            "\n{}Folio{} - {} {}{}{}",
            colors::BOLD,
            colors::RESET,
            action,
            colors::CYAN,
            self.notebook_name(),
            colors::RESET
        );
        println!("{}", "─".repeat(50));
    }

    /// Run the whole notebook, or only the 1-based cell `cell`.
    pub async fn execute(
        &self,
        cell: Option<usize>,
        config: EngineConfig,
        progress: bool,
    ) -> anyhow::Result<ExecutionInfo> {
        let notebook = Notebook::open(&self.source)
            .config(config)
            .run_on_load(false)
            .spawn();
        let handle = notebook.handle;

        let before = handle.snapshot().await?;
        let target = match cell {
            None => RunTarget::All,
            Some(n) => match n.checked_sub(1).and_then(|i| before.cells.get(i)) {
                Some(view) => RunTarget::Cell(view.id),
                None => {
                    handle.shutdown().await?;
                    anyhow::bail!(
                        "Cell {} does not exist (notebook has {} cells)",
                        n,
                        before.cells.len()
                    );
                }
            },
        };

        let start = Instant::now();
        let mut events = handle.subscribe();
        let run = handle.run(target).await?;
        let run_id = run.run_id();

        let mut printer = ProgressPrinter::new(&before, progress);
        loop {
            let received = tokio::select! {
                received = events.recv() => received,
                _ = tokio::signal::ctrl_c() => {
                    let cancelled = handle.cancel().await?;
                    println!(
                        "\n{}Interrupted:{} cancelled {} queued cells",
                        colors::YELLOW,
                        colors::RESET,
                        cancelled
                    );
                    continue;
                }
            };
            match received {
                Ok(NotebookEvent::RunFinished { report }) if report.run_id == run_id => break,
                Ok(event) => printer.on_event(event),
                Err(RecvError::Lagged(missed)) => {
                    tracing::debug!("Progress display skipped {} events", missed);
                }
                Err(RecvError::Closed) => break,
            }
        }

        let report = run.wait().await?;
        let execution_time = start.elapsed();
        let snapshot = finish(&handle).await?;

        Ok(ExecutionInfo {
            snapshot,
            report,
            anomalies: notebook.anomalies,
            execution_time,
        })
    }
}

async fn finish(handle: &NotebookHandle) -> anyhow::Result<NotebookSnapshot> {
    let snapshot = handle.snapshot().await?;
    handle.shutdown().await?;
    Ok(snapshot)
}

/// Human label of a cell: its 1-based position and type.
pub fn cell_label(index: usize, cell_type: &str) -> String {
    format!("[{}] {}", index + 1, cell_type)
}

/// Prints one line per cell from the notebook's event stream.
struct ProgressPrinter {
    enabled: bool,
    labels: HashMap<CellId, String>,
    failures: HashMap<CellId, String>,
    running: Option<CellId>,
}

impl ProgressPrinter {
    fn new(snapshot: &NotebookSnapshot, enabled: bool) -> Self {
        let labels = snapshot
            .cells
            .iter()
            .enumerate()
            .map(|(i, view)| (view.id, cell_label(i, &view.cell_type)))
            .collect();
        Self {
            enabled,
            labels,
            failures: HashMap::new(),
            running: None,
        }
    }

    fn label(&self, cell_id: CellId) -> &str {
        self.labels.get(&cell_id).map(String::as_str).unwrap_or("?")
    }

    fn on_event(&mut self, event: NotebookEvent) {
        if !self.enabled {
            return;
        }
        match event {
            NotebookEvent::CellOutputUpdated {
                cell_id,
                output: Some(output),
            } => {
                if let Some(failure) = output.failure {
                    self.failures.insert(cell_id, failure.message);
                }
            }
            NotebookEvent::CellStateChanged { cell_id, state } => self.on_state(cell_id, state),
            _ => {}
        }
    }

    fn on_state(&mut self, cell_id: CellId, state: RunState) {
        match state {
            RunState::Running => {
                print!(
                    "{}  ▶ Running{} {}{}{}... ",
                    colors::CYAN,
                    colors::RESET,
                    colors::BOLD,
                    self.label(cell_id),
                    colors::RESET
                );
                colors::flush_stdout();
                self.running = Some(cell_id);
            }
            RunState::Done | RunState::Stale if self.running == Some(cell_id) => {
                println!("{}✓{}", colors::GREEN, colors::RESET);
                self.running = None;
            }
            RunState::Error => {
                if self.running.take() == Some(cell_id) {
                    println!("{}✗{}", colors::RED, colors::RESET);
                } else {
                    println!(
                        "{}  ✗ Failed{} {}",
                        colors::RED,
                        colors::RESET,
                        self.label(cell_id)
                    );
                }
                if let Some(message) = self.failures.remove(&cell_id) {
                    eprintln!("{}    Error:{} {}", colors::RED, colors::RESET, message);
                }
            }
            _ => {}
        }
    }
}
