//! Error types for notebook persistence.

use std::path::PathBuf;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur while packing, storing or loading notebooks.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Failed to read source file.
    #[error("Failed to read file {path}: {message}")]
    ReadError { path: PathBuf, message: String },

    /// Failed to write output file.
    #[error("Failed to write file {path}: {message}")]
    WriteError { path: PathBuf, message: String },

    /// Failed to serialize/deserialize JSON.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Failed to write an archive.
    #[error("Zip error: {0}")]
    ZipError(#[from] zip::result::ZipError),

    /// The bytes are not a notebook archive.
    #[error("Invalid archive: {0}")]
    InvalidArchive(String),

    /// Asset ids must be a single non-empty path component.
    #[error("Invalid asset id: {0:?}")]
    InvalidAssetId(String),

    /// No asset stored under this id.
    #[error("Asset not found: {0}")]
    AssetNotFound(String),
}
