//! Notebook files on disk: plain `.json` or packed `.zip`.

use std::fs;
use std::path::Path;

use quire_core::NotebookSource;

use crate::archive;
use crate::error::{SyncError, SyncResult};

/// Whether `path` names a packed notebook.
pub fn is_packed_path(path: impl AsRef<Path>) -> bool {
    path.as_ref()
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("zip"))
}

/// Read a notebook. Packed files are detected by content, not only by name.
pub fn read_notebook(path: impl AsRef<Path>) -> SyncResult<NotebookSource> {
    let path = path.as_ref();
    let bytes = fs::read(path).map_err(|e| SyncError::ReadError {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    if archive::is_archive(&bytes) {
        archive::unpack(&bytes)
    } else {
        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// Write a notebook, packed if the path ends in `.zip`.
pub fn write_notebook(path: impl AsRef<Path>, source: &NotebookSource) -> SyncResult<()> {
    let path = path.as_ref();
    let bytes = if is_packed_path(path) {
        archive::pack(source)?
    } else {
        serde_json::to_vec_pretty(source)?
    };

    fs::write(path, bytes).map_err(|e| SyncError::WriteError {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    tracing::debug!("Wrote {} ({} cells)", path.display(), source.cells.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_packed_path() {
        assert!(is_packed_path("nb.zip"));
        assert!(is_packed_path("nb.ZIP"));
        assert!(!is_packed_path("nb.json"));
        assert!(!is_packed_path("nb"));
    }
}
