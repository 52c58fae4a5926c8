//! Export command: run a notebook and write it as Jupyter `.ipynb`.

use std::path::PathBuf;

use folio_core::execute::{EngineConfig, Notebook, NotebookSnapshot};
use folio_export::{ExportConfig, default_ipynb_path, export_ipynb};

use crate::colors;
use crate::executor::LoadedNotebook;

/// Options of `folio export`.
pub struct ExportOptions<'a> {
    pub output: Option<&'a str>,
    pub run: bool,
    pub include_outputs: bool,
    pub continue_on_error: bool,
}

pub async fn execute(notebook_path: &str, options: ExportOptions<'_>) -> anyhow::Result<()> {
    let notebook = LoadedNotebook::load(notebook_path)?;
    notebook.print_header("Exporting");

    let config = EngineConfig {
        continue_on_error: options.continue_on_error,
        ..EngineConfig::default()
    };
    let snapshot = if options.run {
        let execution = notebook.execute(None, config, true).await?;
        let failed = execution.report.failures().count();
        if failed > 0 {
            println!(
                "{}warning:{} {} cells failed; their errors are exported",
                colors::YELLOW,
                colors::RESET,
                failed
            );
        }
        execution.snapshot
    } else {
        load_only(&notebook, config).await?
    };

    let output_path = options
        .output
        .map(PathBuf::from)
        .unwrap_or_else(|| default_ipynb_path(&notebook.path));

    let export_config = ExportConfig {
        include_outputs: options.include_outputs,
        source_file: notebook
            .path
            .file_name()
            .map(|name| name.to_string_lossy().to_string()),
        ..ExportConfig::default()
    };
    export_ipynb(&snapshot, &output_path, export_config)?;

    println!(
        "{}Exported{} {} cells → {}",
        colors::GREEN,
        colors::RESET,
        snapshot.cells.len(),
        output_path.display()
    );
    Ok(())
}

/// Open the notebook, letting only its run-on-load cells execute.
async fn load_only(
    notebook: &LoadedNotebook,
    config: EngineConfig,
) -> anyhow::Result<NotebookSnapshot> {
    let opened = Notebook::open(&notebook.source).config(config).spawn();
    if let Some(initial) = opened.initial_run {
        let report = initial.wait().await?;
        tracing::info!("Run-on-load settled {} cells", report.outcomes.len());
    }
    let snapshot = opened.handle.snapshot().await?;
    opened.handle.shutdown().await?;
    Ok(snapshot)
}
