//! Check command: parse a notebook and report problems without running it.

use std::collections::BTreeSet;

use folio_core::format::parse;
use folio_core::handler::HandlerRegistry;

use crate::colors;
use crate::executor::LoadedNotebook;

pub fn execute(notebook_path: &str, registry: &HandlerRegistry) -> anyhow::Result<()> {
    let notebook = LoadedNotebook::load(notebook_path)?;
    notebook.print_header("Checking");

    let parsed = parse(&notebook.source);
    let cells = &parsed.content.cells;
    println!("{} cells", cells.len());

    let unhandled: BTreeSet<&str> = cells
        .iter()
        .map(|c| c.cell_type.as_str())
        .filter(|t| !registry.contains(t))
        .collect();
    for cell_type in &unhandled {
        println!(
            "{}warning:{} no handler for cell type '{}'",
            colors::YELLOW,
            colors::RESET,
            cell_type
        );
    }

    if parsed.is_clean() {
        println!("{}✓ No problems found{}", colors::GREEN, colors::RESET);
        return Ok(());
    }

    for anomaly in &parsed.anomalies {
        println!("{}{}{}", colors::RED, anomaly, colors::RESET);
    }
    anyhow::bail!(
        "{} problem(s) found in {}",
        parsed.anomalies.len(),
        notebook.path.display()
    )
}
