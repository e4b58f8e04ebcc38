//! Asset stores holding notebook archives.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use quire_core::NotebookSource;
use rustc_hash::FxHashMap;

use crate::archive;
use crate::error::{SyncError, SyncResult};

/// File name of an archive inside an asset directory.
pub const ASSET_FILE: &str = "source.zip";

/// Storage for notebook archives, addressed by asset id.
pub trait AssetStore: Send + Sync {
    /// Store `bytes` under `asset_id`, replacing any previous content.
    fn put(&self, asset_id: &str, bytes: &[u8]) -> SyncResult<()>;

    /// Fetch the bytes stored under `asset_id`.
    fn get(&self, asset_id: &str) -> SyncResult<Vec<u8>>;
}

/// Pack `source` and store it. Returns the archive size.
pub fn save_notebook(
    store: &dyn AssetStore,
    asset_id: &str,
    source: &NotebookSource,
) -> SyncResult<usize> {
    let bytes = archive::pack(source)?;
    store.put(asset_id, &bytes)?;
    tracing::info!("Saved {} cells to asset {} ({} bytes)", source.cells.len(), asset_id, bytes.len());
    Ok(bytes.len())
}

/// Fetch and unpack the notebook stored under `asset_id`.
pub fn load_notebook(store: &dyn AssetStore, asset_id: &str) -> SyncResult<NotebookSource> {
    archive::unpack(&store.get(asset_id)?)
}

fn validate_asset_id(asset_id: &str) -> SyncResult<()> {
    let valid = !asset_id.is_empty()
        && asset_id != "."
        && asset_id != ".."
        && !asset_id.contains(['/', '\\']);
    if valid {
        Ok(())
    } else {
        Err(SyncError::InvalidAssetId(asset_id.to_string()))
    }
}

/// Stores each asset as `<root>/<asset_id>/source.zip`.
#[derive(Debug, Clone)]
pub struct FsAssetStore {
    root: PathBuf,
}

impl FsAssetStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the archive for `asset_id`.
    pub fn asset_path(&self, asset_id: &str) -> SyncResult<PathBuf> {
        validate_asset_id(asset_id)?;
        Ok(self.root.join(asset_id).join(ASSET_FILE))
    }
}

impl AssetStore for FsAssetStore {
    fn put(&self, asset_id: &str, bytes: &[u8]) -> SyncResult<()> {
        let path = self.asset_path(asset_id)?;
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }

        // Write beside the target and rename, so readers never see a partial archive.
        let tmp = path.with_extension("zip.tmp");
        fs::write(&tmp, bytes).map_err(|e| SyncError::WriteError {
            path: tmp.clone(),
            message: e.to_string(),
        })?;
        fs::rename(&tmp, &path).map_err(|e| SyncError::WriteError {
            path: path.clone(),
            message: e.to_string(),
        })?;
        Ok(())
    }

    fn get(&self, asset_id: &str) -> SyncResult<Vec<u8>> {
        let path = self.asset_path(asset_id)?;
        if !path.exists() {
            return Err(SyncError::AssetNotFound(asset_id.to_string()));
        }
        fs::read(&path).map_err(|e| SyncError::ReadError {
            path,
            message: e.to_string(),
        })
    }
}

/// In-memory asset store.
#[derive(Debug, Default)]
pub struct MemoryAssetStore {
    assets: Mutex<FxHashMap<String, Vec<u8>>>,
    puts: Mutex<usize>,
}

impl MemoryAssetStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful `put` calls.
    pub fn put_count(&self) -> usize {
        self.puts.lock().map(|n| *n).unwrap_or(0)
    }

    pub fn contains(&self, asset_id: &str) -> bool {
        self.assets
            .lock()
            .map(|assets| assets.contains_key(asset_id))
            .unwrap_or(false)
    }
}

impl AssetStore for MemoryAssetStore {
    fn put(&self, asset_id: &str, bytes: &[u8]) -> SyncResult<()> {
        validate_asset_id(asset_id)?;
        let mut assets = self
            .assets
            .lock()
            .map_err(|_| SyncError::WriteError {
                path: PathBuf::from(asset_id),
                message: "asset store lock poisoned".to_string(),
            })?;
        assets.insert(asset_id.to_string(), bytes.to_vec());
        if let Ok(mut puts) = self.puts.lock() {
            *puts += 1;
        }
        Ok(())
    }

    fn get(&self, asset_id: &str) -> SyncResult<Vec<u8>> {
        validate_asset_id(asset_id)?;
        self.assets
            .lock()
            .ok()
            .and_then(|assets| assets.get(asset_id).cloned())
            .ok_or_else(|| SyncError::AssetNotFound(asset_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_path_like_ids() {
        let store = MemoryAssetStore::new();
        for id in ["", ".", "..", "a/b", "a\\b"] {
            assert!(matches!(
                store.put(id, b"x"),
                Err(SyncError::InvalidAssetId(_))
            ));
        }
    }

    #[test]
    fn test_memory_store_replaces() {
        let store = MemoryAssetStore::new();
        store.put("nb", b"one").unwrap();
        store.put("nb", b"two").unwrap();

        assert_eq!(store.get("nb").unwrap(), b"two");
        assert_eq!(store.put_count(), 2);
    }

    #[test]
    fn test_missing_asset() {
        let store = MemoryAssetStore::new();
        assert!(matches!(store.get("nb"), Err(SyncError::AssetNotFound(_))));
    }
}
