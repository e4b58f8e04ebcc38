//! Quire CLI - workflow notebooks from the command line.

mod archive;
mod colors;
mod config;
mod run;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use quire_core::config::PLACEHOLDER_BODY;
use quire_core::{CellSource, Notebook, NotebookConfig, NotebookSource};
use quire_sync::{read_notebook, write_notebook};

#[derive(Parser)]
#[command(name = "quire")]
#[command(about = "Workflow notebooks with execution history")]
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
    /// Run a notebook headlessly
    Run {
        /// Path to the notebook (.json or .zip)
        notebook: String,

        /// Run only up to this cell (1-based position)
        #[arg(long)]
        cell: Option<usize>,

        /// Notebook configuration file (JSON)
        #[arg(long)]
        config: Option<String>,
    },

    /// Create a new notebook from template
    New {
        /// Name of the notebook (without .json extension)
        name: String,
    },

    /// Compress a notebook into its archive form
    Pack {
        /// Path to the notebook
        notebook: String,

        /// Output path (default: notebook path with .zip)
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Extract the JSON source from an archive
    Unpack {
        /// Path to the archive
        archive: String,

        /// Output path (default: archive path with .json)
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Print the table of contents from markdown headings
    Toc {
        /// Path to the notebook
        notebook: String,
    },
}

fn main() -> anyhow::Result<()> {
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
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run {
            notebook,
            cell,
            config,
        } => {
            let config = config::load(config.as_deref())?;
            run::execute(&notebook, cell, config)?;
        }

        Commands::New { name } => create_new_notebook(&name)?,

        Commands::Pack { notebook, output } => {
            archive::execute_pack(&notebook, output.as_deref())?;
        }

        Commands::Unpack { archive, output } => {
            archive::execute_unpack(&archive, output.as_deref())?;
        }

        Commands::Toc { notebook } => print_toc(&notebook)?,
    }

    Ok(())
}

/// Create a new notebook from template.
fn create_new_notebook(name: &str) -> anyhow::Result<()> {
    let filename = if name.ends_with(".json") {
        name.to_string()
    } else {
        format!("{}.json", name)
    };
    let path = PathBuf::from(&filename);
    if path.exists() {
        anyhow::bail!("File {} already exists", path.display());
    }

    let title = path
        .file_stem()
        .unwrap_or_default()
        .to_string_lossy()
        .to_string();

    let source = NotebookSource::new(vec![
        CellSource::markdown(format!("# {}\n\nA Quire workflow notebook.", title)),
        CellSource::code(
            "env.install(\"std\");\nproject.add_module(\"source\", \"std/source\");\nproject",
        ),
        CellSource::code(
            "project.add_module(\"sink\", \"std/sink\");\nproject.connect(\"source\", \"sink\");\ncell.emit(\"connected\");\nproject",
        ),
        CellSource::code(PLACEHOLDER_BODY),
    ]);

    write_notebook(&path, &source)?;
    println!("Created new notebook: {}", path.display());
    Ok(())
}

fn print_toc(notebook_path: &str) -> anyhow::Result<()> {
    let source = read_notebook(notebook_path)?;
    let notebook = Notebook::from_source(&source, NotebookConfig::default());

    let toc = notebook.table_of_contents();
    if toc.is_empty() {
        println!("{}", colors::paint(colors::DIM, "No headings."));
        return Ok(());
    }
    for entry in toc {
        let indent = "  ".repeat(usize::from(entry.level.saturating_sub(1)));
        println!("{}{} {}", indent, entry.title, colors::paint(colors::DIM, entry.cell_id));
    }
    Ok(())
}
