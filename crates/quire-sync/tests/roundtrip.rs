//! Integration tests for notebook persistence.
//!
//! Tests files on disk, archives and the file system asset store.

use std::fs;

use quire_core::{CellMode, CellSource, Notebook, NotebookConfig, NotebookSource};
use quire_sync::{
    AssetStore, FsAssetStore, SyncError, load_notebook, read_notebook, save_notebook,
    write_notebook,
};
use tempfile::TempDir;

// =============================================================================
// Test Helpers
// =============================================================================

fn temp_dir() -> TempDir {
    TempDir::new().expect("Failed to create temp directory")
}

fn sample_source() -> NotebookSource {
    NotebookSource::new(vec![
        CellSource::markdown("# Pipeline\nLoads data and filters it."),
        CellSource::code("env.install(\"std\");\nproject.add_module(\"a\", \"std/source\");\nproject"),
        CellSource::code("// |project, cell, env|\nproject"),
    ])
}

// =============================================================================
// Files
// =============================================================================

#[test]
fn test_json_file_roundtrip() {
    let dir = temp_dir();
    let path = dir.path().join("pipeline.json");

    write_notebook(&path, &sample_source()).unwrap();

    let text = fs::read_to_string(&path).unwrap();
    assert!(text.contains("\"mode\": \"markdown\""));
    assert_eq!(read_notebook(&path).unwrap(), sample_source());
}

#[test]
fn test_packed_file_roundtrip() {
    let dir = temp_dir();
    let path = dir.path().join("pipeline.zip");

    write_notebook(&path, &sample_source()).unwrap();

    let bytes = fs::read(&path).unwrap();
    assert_eq!(&bytes[..4], b"PK\x03\x04");
    assert_eq!(read_notebook(&path).unwrap(), sample_source());
}

#[test]
fn test_read_missing_file() {
    let dir = temp_dir();
    let err = read_notebook(dir.path().join("missing.json")).unwrap_err();
    assert!(matches!(err, SyncError::ReadError { .. }));
}

#[test]
fn test_read_invalid_json() {
    let dir = temp_dir();
    let path = dir.path().join("broken.json");
    fs::write(&path, "{ \"cells\": [").unwrap();

    assert!(matches!(read_notebook(&path), Err(SyncError::JsonError(_))));
}

// =============================================================================
// Asset store
// =============================================================================

#[test]
fn test_fs_asset_store_layout() {
    let dir = temp_dir();
    let store = FsAssetStore::new(dir.path());

    let size = save_notebook(&store, "nb-1", &sample_source()).unwrap();

    let path = dir.path().join("nb-1").join("source.zip");
    assert_eq!(fs::metadata(&path).unwrap().len() as usize, size);
    assert_eq!(load_notebook(&store, "nb-1").unwrap(), sample_source());
}

#[test]
fn test_fs_asset_store_overwrites() {
    let dir = temp_dir();
    let store = FsAssetStore::new(dir.path());

    save_notebook(&store, "nb", &sample_source()).unwrap();
    save_notebook(&store, "nb", &NotebookSource::default()).unwrap();

    assert!(load_notebook(&store, "nb").unwrap().cells.is_empty());
    // No temporary files are left behind
    let entries: Vec<_> = fs::read_dir(dir.path().join("nb")).unwrap().collect();
    assert_eq!(entries.len(), 1);
}

#[test]
fn test_fs_asset_store_missing() {
    let dir = temp_dir();
    let store = FsAssetStore::new(dir.path());
    assert!(matches!(store.get("nb"), Err(SyncError::AssetNotFound(_))));
}

#[test]
fn test_saved_notebook_reloads_with_same_cells() {
    let dir = temp_dir();
    let store = FsAssetStore::new(dir.path());
    let notebook = Notebook::from_source(&sample_source(), NotebookConfig::default());

    save_notebook(&store, "nb", &notebook.source()).unwrap();
    let reloaded = Notebook::from_source(
        &load_notebook(&store, "nb").unwrap(),
        NotebookConfig::default(),
    );

    let modes: Vec<CellMode> = reloaded.cells().iter().map(|c| c.mode()).collect();
    assert_eq!(modes, vec![CellMode::Markdown, CellMode::Code, CellMode::Code]);
    assert_eq!(reloaded.source(), notebook.source());
}
