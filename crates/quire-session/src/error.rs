//! Error types for Quire sessions.

use quire_sync::SyncError;
use thiserror::Error;

/// Result type for session operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur while handling session requests.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Error from the notebook engine.
    #[error("{0}")]
    Core(#[from] quire_core::Error),

    /// Error while loading or saving the notebook.
    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid operation.
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),
}

impl ServerError {
    /// Whether the error came from running a cell rather than from the request itself.
    pub fn is_execution_error(&self) -> bool {
        matches!(self, Self::Core(e) if e.is_execution_error())
    }
}
