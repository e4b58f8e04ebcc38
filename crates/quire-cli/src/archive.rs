//! Pack and unpack commands.
//!
//! Converts between a notebook's JSON source and its archive form.

use std::fs;
use std::path::{Path, PathBuf};

use quire_sync::{pack, read_notebook};

use crate::colors::{self, paint};

/// Write the archive form of a notebook.
pub fn execute_pack(notebook_path: &str, output: Option<&str>) -> anyhow::Result<()> {
    let input = existing(notebook_path)?;
    let output = output
        .map(PathBuf::from)
        .unwrap_or_else(|| input.with_extension("zip"));
    ensure_distinct(input, &output)?;

    let source = read_notebook(input)?;
    let bytes = pack(&source)?;
    fs::write(&output, &bytes)?;

    println!(
        "{} {} → {} ({} cells, {} bytes)",
        paint(colors::GREEN, "Packed"),
        input.display(),
        output.display(),
        source.cells.len(),
        bytes.len()
    );
    Ok(())
}

/// Write the JSON source of an archived notebook.
pub fn execute_unpack(archive_path: &str, output: Option<&str>) -> anyhow::Result<()> {
    let input = existing(archive_path)?;
    let output = output
        .map(PathBuf::from)
        .unwrap_or_else(|| input.with_extension("json"));
    ensure_distinct(input, &output)?;

    let source = read_notebook(input)?;
    fs::write(&output, source.to_json()?)?;

    println!(
        "{} {} → {} ({} cells)",
        paint(colors::GREEN, "Unpacked"),
        input.display(),
        output.display(),
        source.cells.len()
    );
    Ok(())
}

fn existing(path: &str) -> anyhow::Result<&Path> {
    let path = Path::new(path);
    if !path.exists() {
        anyhow::bail!("Notebook not found: {}", path.display());
    }
    Ok(path)
}

fn ensure_distinct(input: &Path, output: &Path) -> anyhow::Result<()> {
    if input == output {
        anyhow::bail!("Output would overwrite {}", input.display());
    }
    Ok(())
}
