//! Error types for quire-core.

use thiserror::Error;

use crate::cell::CellId;

/// Result type for quire-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in quire-core.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// A code cell body could not be parsed.
    #[error("parse error in {cell} at line {line}: {message}")]
    Parse {
        cell: CellId,
        line: usize,
        message: String,
    },

    /// A code cell body raised an error while running.
    #[error("runtime error in {cell} at line {line}: {message}")]
    Runtime {
        cell: CellId,
        line: usize,
        message: String,
    },

    /// A code cell body did not hand back a project snapshot.
    #[error("{cell} returned a malformed value: {message}")]
    MalformedResult { cell: CellId, message: String },

    /// Cell not found in the notebook.
    #[error("cell not found: {0}")]
    CellNotFound(CellId),

    /// Invalid operation (e.g., executing an empty notebook).
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// The cell an execution error originated from, if any.
    pub fn cell(&self) -> Option<CellId> {
        match self {
            Self::Parse { cell, .. }
            | Self::Runtime { cell, .. }
            | Self::MalformedResult { cell, .. } => Some(*cell),
            Self::CellNotFound(cell) => Some(*cell),
            Self::InvalidOperation(_) | Self::Serialization(_) => None,
        }
    }

    /// Whether this error was raised by a cell body (as opposed to the notebook).
    pub fn is_execution_error(&self) -> bool {
        matches!(
            self,
            Self::Parse { .. } | Self::Runtime { .. } | Self::MalformedResult { .. }
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}
