//! Static export for Folio notebooks.
//!
//! Converts a notebook snapshot, including the last output of every executed
//! cell, to Jupyter `.ipynb` (nbformat 4.5).
//!
//! # Architecture
//!
//! ```text
//! NotebookHandle::snapshot() ─────► NotebookSnapshot ─────► IpynbGenerator ─────► notebook.ipynb
//!                                   (content + state                │
//!                                    + last outputs)          ExportConfig
//! ```

mod error;
mod ipynb;

pub use error::{ExportError, ExportResult};
pub use ipynb::{
    CellMetadata, CellOutput, ExportConfig, FolioCellMetadata, FolioMetadata, IpynbGenerator,
    JupyterCell, JupyterMetadata, JupyterNotebook, KernelSpec, LanguageInfo, OutputData,
};

use std::path::{Path, PathBuf};

use folio_core::execute::NotebookSnapshot;

/// Export a snapshot to an `.ipynb` file.
pub fn export_ipynb(
    snapshot: &NotebookSnapshot,
    ipynb_path: impl AsRef<Path>,
    config: ExportConfig,
) -> ExportResult<()> {
    let ipynb_path = ipynb_path.as_ref();

    let mut generator = IpynbGenerator::new(config);
    let notebook = generator.generate(snapshot);
    notebook.write_to_file(ipynb_path)?;

    tracing::info!(
        "Exported {} cells → {}",
        notebook.cells.len(),
        ipynb_path.display()
    );

    Ok(())
}

/// Get the default `.ipynb` path for a notebook file.
pub fn default_ipynb_path(notebook_path: impl AsRef<Path>) -> PathBuf {
    notebook_path.as_ref().with_extension("ipynb")
}
