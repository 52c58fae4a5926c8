//! Folio CLI - plain-text notebooks with pluggable cell handlers.

mod check;
mod colors;
mod executor;
mod export;
mod fmt;
mod handlers;
mod run;

use clap::{Parser, Subcommand};
use folio_core::handler::HandlerRegistry;

#[derive(Parser)]
#[command(name = "folio")]
#[command(about = "Plain-text notebooks with pluggable cell handlers")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a notebook and report problems
    Check {
        /// Path to the notebook (.folio file)
        notebook: String,
    },

    /// Rewrite a notebook in canonical form
    Fmt {
        /// Path to the notebook (.folio file)
        notebook: String,

        /// Only report whether the file would change
        #[arg(long)]
        check: bool,

        /// Format even when the file has parse problems
        #[arg(long)]
        force: bool,
    },

    /// Run a notebook headlessly
    Run {
        /// Path to the notebook (.folio file)
        notebook: String,

        /// Run only the cell at this 1-based position
        #[arg(long)]
        cell: Option<usize>,

        /// Keep running after a cell fails
        #[arg(long)]
        continue_on_error: bool,
    },

    /// Export notebook as Jupyter .ipynb
    Export {
        /// Path to the notebook (.folio file)
        notebook: String,

        /// Output path for the .ipynb file
        #[arg(short, long)]
        output: Option<String>,

        /// Export without running (run-on-load cells still run)
        #[arg(long)]
        no_run: bool,

        /// Leave cell outputs out of the export
        #[arg(long)]
        no_outputs: bool,

        /// Keep running after a cell fails
        #[arg(long)]
        continue_on_error: bool,
    },

    /// Create a new notebook from template
    New {
        /// Name of the notebook (without .folio extension)
        name: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        tracing_subscriber::EnvFilter::from_default_env()
            .add_directive(tracing::Level::DEBUG.into())
    } else {
        tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let registry = HandlerRegistry::global();
    handlers::install(&registry);

    // Helper to format folio-core errors with recovery hints
    let format_error = |err: anyhow::Error| -> anyhow::Error {
        if let Some(folio_err) = err.downcast_ref::<folio_core::Error>() {
            anyhow::anyhow!("{}", folio_err.with_hint())
        } else {
            err
        }
    };

    match cli.command {
        Commands::Check { notebook } => {
            check::execute(&notebook, &registry).map_err(format_error)?;
        }

        Commands::Fmt {
            notebook,
            check,
            force,
        } => {
            fmt::execute(&notebook, check, force).map_err(format_error)?;
        }

        Commands::Run {
            notebook,
            cell,
            continue_on_error,
        } => {
            run::execute(&notebook, cell, continue_on_error)
                .await
                .map_err(format_error)?;
        }

        Commands::Export {
            notebook,
            output,
            no_run,
            no_outputs,
            continue_on_error,
        } => {
            let options = export::ExportOptions {
                output: output.as_deref(),
                run: !no_run,
                include_outputs: !no_outputs,
                continue_on_error,
            };
            export::execute(&notebook, options)
                .await
                .map_err(format_error)?;
        }

        Commands::New { name } => {
            create_new_notebook(&name).map_err(format_error)?;
        }
    }

    Ok(())
}

/// Create a new notebook from template.
fn create_new_notebook(name: &str) -> anyhow::Result<()> {
    use std::fs;
    use std::path::{Path, PathBuf};

    use folio_core::document::{CellContent, NotebookContent};
    use folio_core::execute::RUN_ON_LOAD_KEY;
    use folio_core::format::serialize;

    let filename = if name.ends_with(".folio") {
        name.to_string()
    } else {
        format!("{}.folio", name)
    };
    let notebook_path = PathBuf::from(&filename);
    let title = Path::new(&filename)
        .file_stem()
        .unwrap_or_default()
        .to_string_lossy()
        .to_string();

    if notebook_path.exists() {
        anyhow::bail!("File {} already exists", notebook_path.display());
    }

    let mut content = NotebookContent::new()
        .with_cell(CellContent::new(
            handlers::MARKDOWN,
            format!(
                "# {}\n\nA Folio notebook. Cells run top to bottom and share one namespace.",
                title
            ),
        ))
        .with_cell(
            CellContent::new(handlers::JSON, r#"{"greeting": "Hello from Folio!"}"#)
                .with_property(RUN_ON_LOAD_KEY, true),
        )
        .with_cell(CellContent::new(handlers::HTML, "<p>{{greeting}}</p>"));
    content.metadata.insert("title", title);
    let template = serialize(&content);

    fs::write(&notebook_path, template).map_err(folio_core::Error::from)?;
    println!("Created new notebook: {}", notebook_path.display());

    Ok(())
}
