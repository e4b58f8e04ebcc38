//! Run command implementation for Quire CLI.
//!
//! Executes a notebook headlessly and prints cell outputs and the resulting
//! project.

use std::path::Path;
use std::time::{Duration, Instant};

use quire_core::{CellId, CellOutput, Error, ExecutionCallback, Notebook, NotebookConfig, SnapshotSummary};
use quire_sync::read_notebook;

use crate::colors::{self, paint};

/// Execute a notebook, up to the cell at 1-based `position` if given.
pub fn execute(
    notebook_path: &str,
    position: Option<usize>,
    config: NotebookConfig,
) -> anyhow::Result<()> {
    let path = Path::new(notebook_path);
    if !path.exists() {
        anyhow::bail!("Notebook not found: {}", notebook_path);
    }

    let start = Instant::now();
    let source = read_notebook(path)?;
    let mut notebook = Notebook::from_source(&source, config);

    println!("\n{} {}", paint(colors::BOLD, "Running"), path.display());
    println!("{}", "─".repeat(50));

    if notebook.is_empty() {
        println!("\n{}", paint(colors::YELLOW, "No cells found in notebook."));
        return Ok(());
    }

    let target = position
        .map(|position| target_cell(&notebook, position))
        .transpose()?;
    notebook.set_callback(Progress::new(notebook.cell_ids()));

    let result = notebook.execute(target);
    print_outputs(&notebook);

    let outcome = match result {
        Ok(outcome) => outcome,
        Err(e) => {
            println!("\n{}", "─".repeat(50));
            anyhow::bail!("Execution failed: {}", e);
        }
    };

    print_summary(&outcome.snapshot.summary());

    println!("\n{}", "─".repeat(50));
    println!(
        "{} {} cells in {:.2}s",
        paint(colors::GREEN, "Completed"),
        outcome.executed.len(),
        start.elapsed().as_secs_f64()
    );

    Ok(())
}

fn target_cell(notebook: &Notebook, position: usize) -> anyhow::Result<CellId> {
    position
        .checked_sub(1)
        .and_then(|index| notebook.cells().get(index))
        .map(|cell| cell.id())
        .ok_or_else(|| {
            anyhow::anyhow!(
                "Cell {} out of range (notebook has {} cells)",
                position,
                notebook.len()
            )
        })
}

fn print_outputs(notebook: &Notebook) {
    let cells: Vec<_> = notebook
        .cells()
        .iter()
        .filter(|cell| !notebook.outputs(cell.id()).is_empty())
        .collect();
    if cells.is_empty() {
        return;
    }

    println!("\n{}", paint(colors::BOLD, "Outputs:"));
    for cell in cells {
        println!("  {}", paint(colors::CYAN, cell.id()));
        for output in notebook.outputs(cell.id()) {
            match output {
                CellOutput::Value { value } => println!("    {}", value),
                CellOutput::Error { message } => {
                    println!("    {}", paint(colors::RED, message))
                }
            }
        }
    }
}

fn print_summary(summary: &SnapshotSummary) {
    println!("\n{}", paint(colors::BOLD, "Project:"));

    let pools: Vec<String> = summary
        .worker_pools
        .iter()
        .map(|(name, workers)| format!("{} ({} workers)", name, workers))
        .collect();
    let sections = [
        ("toolboxes", &summary.toolboxes),
        ("modules", &summary.modules),
        ("connections", &summary.connections),
        ("macros", &summary.macros),
        ("views", &summary.views),
        ("worker pools", &pools),
        ("worksheets", &summary.worksheets),
    ];

    let mut empty = true;
    for (label, items) in sections {
        if items.is_empty() {
            continue;
        }
        empty = false;
        println!("  {}: {}", label, items.join(", "));
    }
    if empty {
        println!("  {}", paint(colors::DIM, "(empty project)"));
    }
    println!("  running resources: {}", summary.running_resources);
}

/// Prints one progress line per cell.
struct Progress {
    ids: Vec<CellId>,
}

impl Progress {
    fn new(ids: Vec<CellId>) -> Self {
        Self { ids }
    }

    fn position(&self, cell_id: CellId) -> usize {
        self.ids
            .iter()
            .position(|id| *id == cell_id)
            .map_or(0, |index| index + 1)
    }
}

impl ExecutionCallback for Progress {
    fn on_batch_started(&self, skipped: usize, _to_run: usize) {
        if skipped > 0 {
            println!("  {}", paint(colors::DIM, format!("{} cached cells skipped", skipped)));
        }
    }

    fn on_cell_started(&self, cell_id: CellId) {
        print!(
            "  [{}/{}] {} ... ",
            self.position(cell_id),
            self.ids.len(),
            cell_id
        );
        colors::flush_stdout();
    }

    fn on_cell_completed(&self, _cell_id: CellId, duration: Duration) {
        println!(
            "{} {}",
            paint(colors::GREEN, "✓"),
            paint(colors::DIM, format!("({:.2}ms)", duration.as_secs_f64() * 1000.0))
        );
    }

    fn on_cell_error(&self, _cell_id: CellId, error: &Error) {
        println!("{}", paint(colors::RED, "✗"));
        tracing::debug!("Cell failed: {}", error);
    }
}
