//! Run command implementation for the Folio CLI.
//!
//! Executes a notebook headlessly and prints every cell's output.

use std::time::Instant;

use folio_core::execute::{CancelReason, CellOutcome, CellView, EngineConfig, SkipReason};
use folio_core::output::{CellOutput, ConsoleLevel};

use crate::colors;
use crate::executor::{LoadedNotebook, cell_label};

/// Execute a notebook.
pub async fn execute(
    notebook_path: &str,
    cell: Option<usize>,
    continue_on_error: bool,
) -> anyhow::Result<()> {
    let start = Instant::now();

    let notebook = LoadedNotebook::load(notebook_path)?;
    notebook.print_header("Running");

    let config = EngineConfig {
        continue_on_error,
        ..EngineConfig::default()
    };
    let execution = notebook.execute(cell, config, true).await?;
    if !execution.anomalies.is_empty() {
        println!(
            "{}warning:{} {} parse problem(s); run `folio check` for details",
            colors::YELLOW,
            colors::RESET,
            execution.anomalies.len()
        );
    }

    if execution.snapshot.cells.is_empty() {
        println!(
            "\n{}No cells found in notebook.{}",
            colors::YELLOW,
            colors::RESET
        );
        println!("Cells start with a delimiter line such as `# %% [markdown]`");
        return Ok(());
    }

    println!("\n{}Outputs:{}", colors::BOLD, colors::RESET);
    println!("{}", "─".repeat(50));

    for (index, view) in execution.snapshot.cells.iter().enumerate() {
        let Some(outcome) = execution.report.outcome(view.id) else {
            continue;
        };
        print_cell(index, view, outcome);
    }

    let total = execution.report.outcomes.len();
    let failed = execution.report.failures().count();
    let done = execution
        .report
        .outcomes
        .iter()
        .filter(|r| r.outcome.is_done())
        .count();

    println!("\n{}", "─".repeat(50));
    if failed > 0 {
        anyhow::bail!("{} of {} cells failed", failed, total);
    }
    println!(
        "{}Completed{} {} cells in {:.2}s (execution: {:.2}s)",
        colors::GREEN,
        colors::RESET,
        done,
        start.elapsed().as_secs_f64(),
        execution.execution_time.as_secs_f64()
    );

    Ok(())
}

fn print_cell(index: usize, view: &CellView, outcome: &CellOutcome) {
    let label = cell_label(index, &view.cell_type);
    match outcome {
        CellOutcome::Done | CellOutcome::Error(_) | CellOutcome::Coalesced => {
            println!("\n{}{}{}", colors::BOLD, label, colors::RESET);
            if let Some(output) = &view.output {
                print_output(output);
            }
        }
        CellOutcome::Cancelled(reason) => {
            let why = match reason {
                CancelReason::Requested => "cancelled".to_string(),
                CancelReason::HaltedOnError(_) => "not run: an earlier cell failed".to_string(),
            };
            println!("\n{}{} ({}){}", colors::DIM, label, why, colors::RESET);
        }
        CellOutcome::Skipped(reason) => {
            let why = match reason {
                SkipReason::Removed => "removed",
                SkipReason::Superseded => "superseded",
            };
            println!("\n{}{} (skipped: {}){}", colors::DIM, label, why, colors::RESET);
        }
    }
}

fn print_output(output: &CellOutput) {
    for entry in &output.console {
        let color = match entry.level {
            ConsoleLevel::Log => colors::DIM,
            ConsoleLevel::Warn => colors::YELLOW,
            ConsoleLevel::Error => colors::RED,
        };
        println!("  {}│ {}{}", color, entry.message, colors::RESET);
    }
    if let Some(text) = &output.text {
        for line in text.lines() {
            println!("  {}", line);
        }
    }
    if let Some(html) = &output.html {
        println!("  {}html:{} {}", colors::CYAN, colors::RESET, html);
    }
    if let Some(json) = &output.json {
        let pretty = serde_json::to_string_pretty(json).unwrap_or_else(|_| json.to_string());
        for line in pretty.lines() {
            println!("  {}", line);
        }
    }
    if let Some(failure) = &output.failure {
        println!("  {}error:{} {}", colors::RED, colors::RESET, failure);
    }
}
